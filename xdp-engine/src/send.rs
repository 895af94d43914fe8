//! # Send Batch and Completion Reclaim
//!
//! ## How it works
//!
//! ```text
//! free list -> source writes payload -> tx ring -> kernel -> completion ring -> free list
//! ```
//!
//! A frame can only be sent again once the kernel confirmed the previous send
//! on the completion ring, so draining completions is what frees both frames
//! and tx slots. When the tx ring is short, `send_batch` drains completions
//! and retries, at most `retry_budget` times, then sends what fits. A batch
//! of zero is backpressure, not an error. Running out of frames is not a
//! full ring: the batch returns after one drain.

use crate::error::{RingError, Violation};
use crate::ledger::{Owner, TX_PATH};
use crate::ring::XdpDesc;
use crate::socket::{Notifier, PacketSource, Socket};

/// Outcome of [`Socket::send_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendBatch {
    /// Packets submitted to the tx ring.
    pub queued: usize,
    /// The source returned `None`.
    pub drained: bool,
    /// Packets dropped because the source claimed more bytes than a frame
    /// holds.
    pub skipped: usize,
}

impl<N: Notifier> Socket<N> {
    /// Sends up to `max` packets produced by `source`.
    ///
    /// Each packet is written straight into a frame owned by the
    /// application; nothing is copied afterwards.
    pub fn send_batch<S>(&mut self, max: usize, source: &mut S) -> Result<SendBatch, RingError>
    where
        S: PacketSource + ?Sized,
    {
        self.ensure_live()?;
        let result = self.send_batch_(max, source);
        self.guard(result)
    }

    fn send_batch_<S>(&mut self, max: usize, source: &mut S) -> Result<SendBatch, RingError>
    where
        S: PacketSource + ?Sized,
    {
        let wanted = (max.min(self.config.batch_size as usize)) as u32;
        if wanted == 0 {
            return Ok(SendBatch::default());
        }

        let mut attempt = 0;
        let (reserved, start) = loop {
            if self.free_frames.len() < wanted as usize {
                self.complete_tx_()?;
            }
            if self.free_frames.is_empty() {
                log::trace!("every transmit frame is in flight, nothing sent");
                return Ok(SendBatch::default());
            }
            let want = wanted.min(self.free_frames.len() as u32);
            let (reserved, start) = self.tx.reserve(want);
            if reserved == want || attempt + 1 >= self.config.retry_budget {
                break (reserved, start);
            }
            self.tx.cancel(reserved)?;
            if attempt == 0 {
                self.stats.record_tx_ring_full();
            }
            self.complete_tx_()?;
            attempt += 1;
        };
        if reserved == 0 {
            log::trace!("tx ring full, nothing sent");
            return Ok(SendBatch::default());
        }

        let frame_size = self.umem.frame_size() as usize;
        let mut batch = SendBatch::default();
        let mut bytes = 0u64;
        for _ in 0..reserved {
            let Some(addr) = self.free_frames.pop() else {
                break;
            };
            let frame = self.umem.frame_mut(addr)?;
            let Some(len) = source.next_packet(frame) else {
                self.free_frames.push(addr);
                batch.drained = true;
                break;
            };
            if len > frame_size {
                log::warn!(
                    "packet source returned {len} bytes for a {frame_size} byte frame, packet skipped"
                );
                self.free_frames.push(addr);
                batch.skipped += 1;
                continue;
            }
            let len = len as u32;
            self.track(addr, &[Owner::App], Owner::TxRing)?;
            let slot = start.wrapping_add(batch.queued as u32);
            self.tx.write(slot, XdpDesc::new(addr, len, 0))?;
            batch.queued += 1;
            bytes += len as u64;
        }

        let queued = batch.queued as u32;
        self.tx.cancel(reserved - queued)?;
        self.tx.submit(queued)?;
        self.tx_in_flight += queued;
        self.stats.record_tx(queued as u64, bytes);
        log::trace!("queued {queued} packets ({bytes} bytes)");

        self.complete_tx_()?;
        Ok(batch)
    }

    /// Reclaims frames the kernel has finished sending.
    ///
    /// Wakes the kernel first if its tx flag asks for it (or always, without
    /// `need_wakeup`), then drains up to one batch of completions into the
    /// free list. Returns the number of frames reclaimed.
    pub fn complete_tx(&mut self) -> Result<usize, RingError> {
        self.ensure_live()?;
        let result = self.complete_tx_();
        self.guard(result)
    }

    fn complete_tx_(&mut self) -> Result<usize, RingError> {
        if self.tx_in_flight > 0 && (!self.config.need_wakeup || self.tx.needs_wakeup()) {
            self.wakeup_tx();
        }
        let (completed, start) = self.completion.peek(self.config.batch_size);
        if completed == 0 {
            return Ok(0);
        }
        for i in 0..completed {
            let addr = self.completion.read(start.wrapping_add(i))?;
            if self.umem.frame_index(addr).is_none() {
                return Err(Violation::InvalidAddress { addr, len: 0 }.into());
            }
            let base = self.umem.frame_base(addr);
            self.track(base, TX_PATH, Owner::App)?;
            self.free_frames.push(base);
        }
        self.completion.release(completed)?;
        self.tx_in_flight = self.tx_in_flight.saturating_sub(completed);
        self.stats.record_completions(completed as u64);
        Ok(completed as usize)
    }
}
