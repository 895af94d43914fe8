//! # In-Process Kernel Peer
//!
//! ## Purpose
//!
//! Runs the endpoint against a simulated kernel so the ring protocol can be
//! exercised without an interface, capabilities or an XDP program.
//!
//! ## How it works
//!
//! `loopback()` creates the four rings with [`local_pair`] and gives the
//! endpoint the same halves it would map from a socket. The opposite halves
//! go to a [`KernelSim`], which the test drives by hand (or from another
//! thread):
//!
//! ```text
//! pull_fill:  fill ring        -> kernel rx backlog
//! deliver:    kernel rx backlog -> rx ring           (payload copied into the frame)
//! transmit:   tx ring          -> kernel tx backlog  (payload copied out)
//! complete:   kernel tx backlog -> completion ring
//! ```
//!
//! Every step is checked against the shared [`FrameLedger`] with the single
//! holder the protocol allows, so any frame the endpoint hands out twice, or
//! hands out while still holding it, fails at the step that sees it.
//!
//! The endpoint's notifier is a condition variable the simulator signals
//! after each step that produces work; wakeup calls are only counted.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::{Direction, XdpConfig};
use crate::error::{Violation, XdpError};
use crate::ledger::{FrameLedger, Owner};
use crate::ring::{ConsRing, ProdRing, XdpDesc, local_pair};
use crate::socket::{Notifier, Readiness, Rings, SharedLedger, Socket};
use crate::umem::Umem;

#[derive(Debug, Default)]
struct Signal {
    seq: Mutex<u64>,
    cond: Condvar,
    rx_wakeups: AtomicU64,
    tx_wakeups: AtomicU64,
}

impl Signal {
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.seq.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        *self.lock() += 1;
        self.cond.notify_all();
    }
}

/// Notification handle of a loopback endpoint.
#[derive(Debug, Clone)]
pub struct LoopbackNotifier {
    signal: Arc<Signal>,
}

impl LoopbackNotifier {
    pub fn rx_wakeups(&self) -> u64 {
        self.signal.rx_wakeups.load(Ordering::Relaxed)
    }

    pub fn tx_wakeups(&self) -> u64 {
        self.signal.tx_wakeups.load(Ordering::Relaxed)
    }
}

impl Notifier for LoopbackNotifier {
    fn wakeup_rx(&self) -> io::Result<()> {
        self.signal.rx_wakeups.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wakeup_tx(&self) -> io::Result<()> {
        self.signal.tx_wakeups.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait(&self, direction: Direction, timeout: Option<Duration>) -> io::Result<Readiness> {
        let guard = self.signal.lock();
        let start = *guard;
        let guard = match timeout {
            Some(timeout) => {
                self.signal
                    .cond
                    .wait_timeout_while(guard, timeout, |seq| *seq == start)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .signal
                .cond
                .wait_while(guard, |seq| *seq == start)
                .unwrap_or_else(PoisonError::into_inner),
        };
        let signalled = *guard != start;
        Ok(Readiness {
            readable: signalled && direction.has_rx(),
            writable: signalled && direction.has_tx(),
        })
    }
}

/// Rings whose wakeup flag the kernel side controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    Fill,
    Tx,
}

/// The kernel's half of a loopback endpoint.
pub struct KernelSim {
    umem: Umem,
    fill: ConsRing<u64>,
    rx: ProdRing<XdpDesc>,
    tx: ConsRing<XdpDesc>,
    completion: ProdRing<u64>,
    ledger: SharedLedger,
    signal: Arc<Signal>,
    rx_backlog: VecDeque<u64>,
    tx_backlog: VecDeque<u64>,
}

/// Builds an endpoint over in-process rings together with its kernel peer.
///
/// Ownership tracking is always on for loopback endpoints, whatever
/// `config.track_ownership` says.
pub fn loopback(config: &XdpConfig) -> Result<(Socket<LoopbackNotifier>, KernelSim), XdpError> {
    config.validate()?;
    let umem = Umem::create(config.frame_size, config.frame_count, config.huge_page)?;
    let (fill, kernel_fill) = local_pair(config.fill_ring_size).map_err(XdpError::Allocation)?;
    let (kernel_completion, completion) =
        local_pair(config.completion_ring_size).map_err(XdpError::Allocation)?;
    let (kernel_rx, rx) = local_pair(config.rx_ring_size).map_err(XdpError::Allocation)?;
    let (tx, kernel_tx) = local_pair(config.tx_ring_size).map_err(XdpError::Allocation)?;

    let ledger = Arc::new(Mutex::new(FrameLedger::new(
        umem.frame_size(),
        umem.frame_count(),
    )));
    let signal = Arc::new(Signal::default());
    let sim = KernelSim {
        umem: umem.share(),
        fill: kernel_fill,
        rx: kernel_rx,
        tx: kernel_tx,
        completion: kernel_completion,
        ledger: ledger.clone(),
        signal: signal.clone(),
        rx_backlog: VecDeque::new(),
        tx_backlog: VecDeque::new(),
    };
    let socket = Socket::from_parts(
        LoopbackNotifier { signal },
        umem,
        Rings {
            fill,
            completion,
            rx,
            tx,
        },
        config.clone(),
        Some(ledger),
    )?;
    Ok((socket, sim))
}

impl KernelSim {
    fn transfer(&self, addr: u64, from: Owner, to: Owner) -> Result<(), Violation> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transfer(addr, &[from], to)
    }

    /// Takes up to `max` frames off the fill ring. Returns how many.
    pub fn pull_fill(&mut self, max: u32) -> Result<u32, Violation> {
        let (count, start) = self.fill.peek(max);
        for i in 0..count {
            let addr = self.fill.read(start.wrapping_add(i))?;
            if self.umem.frame_index(addr).is_none() {
                return Err(Violation::InvalidAddress { addr, len: 0 });
            }
            self.transfer(addr, Owner::FillRing, Owner::KernelRx)?;
            self.rx_backlog.push_back(addr);
        }
        self.fill.release(count)?;
        Ok(count)
    }

    /// Receives `payload` into the next fill frame and posts it on the rx
    /// ring.
    ///
    /// Returns `false` when the packet is dropped: no fill frame, a full rx
    /// ring, or a payload larger than a frame.
    pub fn deliver(&mut self, payload: &[u8]) -> Result<bool, Violation> {
        self.deliver_with(payload.len(), |frame| frame.copy_from_slice(payload))
    }

    /// Like [`KernelSim::deliver`] for a packet of `len` bytes whose content
    /// does not matter.
    pub fn deliver_len(&mut self, len: usize) -> Result<bool, Violation> {
        self.deliver_with(len, |_| {})
    }

    fn deliver_with<F>(&mut self, len: usize, write: F) -> Result<bool, Violation>
    where
        F: FnOnce(&mut [u8]),
    {
        if len > self.umem.frame_size() as usize {
            log::debug!("dropping {len} byte packet, larger than a frame");
            return Ok(false);
        }
        if self.rx_backlog.is_empty() {
            self.pull_fill(self.fill.capacity())?;
        }
        let Some(&addr) = self.rx_backlog.front() else {
            log::trace!("no fill frame, packet dropped");
            return Ok(false);
        };
        let (reserved, slot) = self.rx.reserve(1);
        if reserved == 0 {
            log::trace!("rx ring full, packet dropped");
            return Ok(false);
        }
        self.rx_backlog.pop_front();
        write(self.umem.data_at_mut(addr, len as u32)?);
        self.transfer(addr, Owner::KernelRx, Owner::RxRing)?;
        self.rx.write(slot, XdpDesc::new(addr, len as u32, 0))?;
        self.rx.submit(1)?;
        self.signal.notify();
        Ok(true)
    }

    /// Posts `desc` on the rx ring without any checks, like a misbehaving
    /// driver would. Returns `false` when the rx ring is full.
    pub fn inject_rx(&mut self, desc: XdpDesc) -> Result<bool, Violation> {
        let (reserved, slot) = self.rx.reserve(1);
        if reserved == 0 {
            return Ok(false);
        }
        self.rx.write(slot, desc)?;
        self.rx.submit(1)?;
        self.signal.notify();
        Ok(true)
    }

    /// Posts `addr` on the completion ring without any checks.
    pub fn inject_completion(&mut self, addr: u64) -> Result<bool, Violation> {
        let (reserved, slot) = self.completion.reserve(1);
        if reserved == 0 {
            return Ok(false);
        }
        self.completion.write(slot, addr)?;
        self.completion.submit(1)?;
        self.signal.notify();
        Ok(true)
    }

    /// Sends up to `max` packets from the tx ring and returns their payloads.
    /// The frames stay with the kernel until [`KernelSim::complete`].
    pub fn transmit(&mut self, max: u32) -> Result<Vec<Vec<u8>>, Violation> {
        let (count, start) = self.tx.peek(max);
        let mut packets = Vec::with_capacity(count as usize);
        for i in 0..count {
            let desc = self.tx.read(start.wrapping_add(i))?;
            let data = self.umem.data_at(desc.addr, desc.len)?;
            self.transfer(desc.addr, Owner::TxRing, Owner::KernelTx)?;
            packets.push(data.to_vec());
            self.tx_backlog.push_back(desc.addr);
        }
        self.tx.release(count)?;
        if count > 0 {
            self.signal.notify();
        }
        Ok(packets)
    }

    /// Confirms up to `max` sent frames on the completion ring, oldest first.
    pub fn complete(&mut self, max: u32) -> Result<u32, Violation> {
        let wanted = max.min(self.tx_backlog.len() as u32);
        let (count, start) = self.completion.reserve(wanted);
        for i in 0..count {
            let Some(addr) = self.tx_backlog.pop_front() else {
                break;
            };
            self.transfer(addr, Owner::KernelTx, Owner::CompletionRing)?;
            self.completion.write(start.wrapping_add(i), addr)?;
        }
        self.completion.submit(count)?;
        if count > 0 {
            self.signal.notify();
        }
        Ok(count)
    }

    /// Raises or clears `XDP_RING_NEED_WAKEUP` on a ring the kernel consumes.
    pub fn set_need_wakeup(&self, ring: RingKind, on: bool) {
        match ring {
            RingKind::Fill => self.fill.set_need_wakeup(on),
            RingKind::Tx => self.tx.set_need_wakeup(on),
        }
    }

    /// Frames waiting on the fill ring.
    pub fn fill_pending(&self) -> u32 {
        self.fill.pending()
    }

    /// Packets on the rx ring the endpoint has not released yet.
    pub fn rx_pending(&self) -> u32 {
        self.rx.capacity() - self.rx.free()
    }

    /// Descriptors waiting on the tx ring.
    pub fn tx_pending(&self) -> u32 {
        self.tx.pending()
    }

    /// Completions the endpoint has not released yet.
    pub fn completion_pending(&self) -> u32 {
        self.completion.capacity() - self.completion.free()
    }

    /// Fill frames the kernel holds, waiting for packets.
    pub fn rx_backlog(&self) -> usize {
        self.rx_backlog.len()
    }

    /// Sent frames the kernel has not completed yet.
    pub fn tx_backlog(&self) -> usize {
        self.tx_backlog.len()
    }

    pub fn rx_wakeups(&self) -> u64 {
        self.signal.rx_wakeups.load(Ordering::Relaxed)
    }

    pub fn tx_wakeups(&self) -> u64 {
        self.signal.tx_wakeups.load(Ordering::Relaxed)
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Frames held by `owner` according to the shared ledger.
    pub fn owned_by(&self, owner: Owner) -> usize {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count(owner)
    }
}
