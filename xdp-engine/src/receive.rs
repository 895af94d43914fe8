//! # Receive Batch
//!
//! Moves up to `batch_size` packets from the rx ring to a handler and gives
//! their frames back to the kernel through the fill ring.
//!
//! The fill slots are reserved before any packet is handed out, so every
//! delivered frame has a place to go. The fill ring is submitted before the
//! rx entries are released: releasing an rx slot does not return its frame,
//! only the fill submission does.

use crate::error::RingError;
use crate::ledger::{Owner, RX_PATH};
use crate::socket::{Notifier, PacketHandler, RxFrame, Socket};

impl<N: Notifier> Socket<N> {
    /// Delivers pending packets to `handler` and recycles their frames.
    ///
    /// Returns the number of packets handled; zero when the rx ring is empty,
    /// in which case the kernel is woken up if it asked for it.
    ///
    /// # Errors
    ///
    /// `RingError::FillStarved` when the fill ring has no room after
    /// `retry_budget` attempts; the packets stay on the rx ring. Protocol
    /// violations abort the endpoint.
    pub fn receive_batch<H>(&mut self, handler: &mut H) -> Result<usize, RingError>
    where
        H: PacketHandler + ?Sized,
    {
        self.ensure_live()?;
        let result = self.receive_batch_(handler);
        self.guard(result)
    }

    fn receive_batch_<H>(&mut self, handler: &mut H) -> Result<usize, RingError>
    where
        H: PacketHandler + ?Sized,
    {
        let (received, rx_start) = self.rx.peek(self.config.batch_size);
        if received == 0 {
            if !self.config.need_wakeup || self.fill.needs_wakeup() {
                self.wakeup_rx();
            }
            return Ok(0);
        }

        let fill_start = match self.reserve_fill(received)? {
            Some(start) => start,
            None => {
                self.rx.cancel(received)?;
                return Err(RingError::FillStarved {
                    needed: received,
                    attempts: self.config.retry_budget,
                });
            }
        };

        let mut bytes = 0u64;
        for i in 0..received {
            let desc = self.rx.read(rx_start.wrapping_add(i))?;
            self.track(desc.addr, RX_PATH, Owner::App)?;
            let data = self.umem.data_at(desc.addr, desc.len)?;
            handler.handle(RxFrame {
                addr: desc.addr,
                len: desc.len,
                options: desc.options,
                data,
            });
            bytes += desc.len as u64;
            let base = self.umem.frame_base(desc.addr);
            self.track(base, &[Owner::App], Owner::FillRing)?;
            self.fill.write(fill_start.wrapping_add(i), base)?;
        }

        self.fill.submit(received)?;
        self.rx.release(received)?;
        self.stats.record_rx(received as u64, bytes);
        log::trace!("received {received} packets ({bytes} bytes)");
        Ok(received as usize)
    }

    /// Reserves exactly `count` fill slots, nudging the kernel between
    /// attempts. `None` once the retry budget is spent.
    fn reserve_fill(&mut self, count: u32) -> Result<Option<u32>, RingError> {
        for attempt in 0..self.config.retry_budget {
            let (reserved, start) = self.fill.reserve(count);
            if reserved == count {
                return Ok(Some(start));
            }
            self.fill.cancel(reserved)?;
            if attempt == 0 {
                self.stats.record_fill_retry();
            }
            if !self.config.need_wakeup || self.fill.needs_wakeup() {
                self.wakeup_rx();
            }
        }
        log::warn!(
            "fill ring stayed short of {count} slots after {} attempts",
            self.config.retry_budget
        );
        Ok(None)
    }
}
