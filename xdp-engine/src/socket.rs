//! # Socket Endpoint
//!
//! ## Purpose
//!
//! A `Socket` binds one frame pool and its four rings to one interface queue
//! and runs the batch protocol over them. It is driven by a single thread;
//! the kernel is the only other party touching its memory.
//!
//! ## How it works
//!
//! Frames are split at construction: receive frames go straight into the
//! fill ring, transmit frames wait in the application's free list. From then
//! on a frame only moves by ring transfer:
//!
//! ```text
//! RX: fill -> kernel -> rx -> handler -> fill ...
//! TX: free list -> source -> tx -> kernel -> completion -> free list ...
//! ```
//!
//! The batch operations live next to this file: `receive.rs`
//! (`receive_batch`), `send.rs` (`send_batch`, `complete_tx`), `kick.rs`
//! (wakeups) and `poll.rs` (readiness). The kernel binding is in `create.rs`
//! and the in-process kernel peer in `loopback.rs`.
//!
//! ## Main components
//!
//! - `Socket<N>`: the endpoint, generic over its notification handle.
//! - `Notifier`: wakeup and wait primitives of a notification handle.
//! - `PacketHandler`, `PacketSource`: callbacks of the receive and send paths.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::{Direction, XdpConfig};
use crate::error::{RingError, Violation, XdpError};
use crate::ledger::{FrameLedger, Owner};
use crate::ring::{ConsRing, ProdRing, XdpDesc};
use crate::stats::Stats;
use crate::umem::Umem;

/// The waitable handle of an endpoint.
///
/// Wakeups are best effort and must not block. `wait` is the only call of
/// the engine that may block.
pub trait Notifier {
    /// Prompts the kernel to resume filling the rx ring.
    fn wakeup_rx(&self) -> io::Result<()>;

    /// Prompts the kernel to resume draining the tx ring.
    fn wakeup_tx(&self) -> io::Result<()>;

    /// Blocks until the handle signals readiness for `direction` or the
    /// timeout expires (`None` blocks indefinitely). A timeout or an
    /// interrupted wait is reported as empty readiness, not as an error.
    fn wait(&self, direction: Direction, timeout: Option<Duration>) -> io::Result<Readiness>;
}

/// Readiness reported by [`Socket::poll`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Received packets are waiting on the rx ring.
    pub readable: bool,
    /// A send batch can make progress.
    pub writable: bool,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable
    }
}

/// A received packet, valid for the duration of the handler call.
#[derive(Debug, Clone, Copy)]
pub struct RxFrame<'a> {
    pub addr: u64,
    pub len: u32,
    pub options: u32,
    pub data: &'a [u8],
}

/// Consumer of received packets.
pub trait PacketHandler {
    fn handle(&mut self, frame: RxFrame<'_>);
}

impl<F> PacketHandler for F
where
    F: FnMut(RxFrame<'_>),
{
    fn handle(&mut self, frame: RxFrame<'_>) {
        self(frame)
    }
}

/// Handler that drops every packet.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl PacketHandler for Discard {
    fn handle(&mut self, _frame: RxFrame<'_>) {}
}

/// Producer of packets to send.
pub trait PacketSource {
    /// Writes one packet into `frame` and returns its length, or `None` when
    /// there is nothing more to send.
    fn next_packet(&mut self, frame: &mut [u8]) -> Option<usize>;
}

impl<F> PacketSource for F
where
    F: FnMut(&mut [u8]) -> Option<usize>,
{
    fn next_packet(&mut self, frame: &mut [u8]) -> Option<usize> {
        self(frame)
    }
}

/// Source with nothing to send.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPackets;

impl PacketSource for NoPackets {
    fn next_packet(&mut self, _frame: &mut [u8]) -> Option<usize> {
        None
    }
}

/// What [`Socket::shutdown`] left behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sends still unconfirmed by the kernel when the drain gave up.
    pub tx_outstanding: u32,
    /// Received packets recycled into the fill ring without a handler.
    pub rx_recycled: u32,
}

pub type SharedLedger = Arc<Mutex<FrameLedger>>;

pub struct Socket<N: Notifier> {
    // Field order is drop order: the notifier owns the socket fd, which must
    // be closed (unbinding the socket) before rings and UMEM are unmapped.
    pub(crate) notifier: N,
    pub(crate) fill: ProdRing<u64>,
    pub(crate) completion: ConsRing<u64>,
    pub(crate) rx: ConsRing<XdpDesc>,
    pub(crate) tx: ProdRing<XdpDesc>,
    pub(crate) umem: Umem,
    pub(crate) free_frames: Vec<u64>,
    pub(crate) rx_frames: u32,
    pub(crate) tx_in_flight: u32,
    pub(crate) ledger: Option<SharedLedger>,
    pub(crate) stats: Arc<Stats>,
    pub(crate) config: XdpConfig,
    pub(crate) aborted: bool,
}

pub(crate) struct Rings {
    pub fill: ProdRing<u64>,
    pub completion: ConsRing<u64>,
    pub rx: ConsRing<XdpDesc>,
    pub tx: ProdRing<XdpDesc>,
}

impl<N: Notifier> Socket<N> {
    /// Assembles an endpoint and hands the receive frames to the fill ring.
    pub(crate) fn from_parts(
        notifier: N,
        umem: Umem,
        rings: Rings,
        config: XdpConfig,
        ledger: Option<SharedLedger>,
    ) -> Result<Self, XdpError> {
        let count = umem.frame_count();
        let rx_share = match config.direction {
            Direction::Rx => count,
            Direction::Tx => 0,
            Direction::Both => count / 2,
        };
        let to_fill = rx_share.min(rings.fill.capacity());
        let mut socket = Socket {
            notifier,
            fill: rings.fill,
            completion: rings.completion,
            rx: rings.rx,
            tx: rings.tx,
            free_frames: Vec::with_capacity(count as usize),
            umem,
            rx_frames: 0,
            tx_in_flight: 0,
            ledger,
            stats: Arc::new(Stats::new()),
            config,
            aborted: false,
        };
        // popped from the back, so the lowest address goes out first
        for index in (to_fill..count).rev() {
            let addr = socket.umem.frame_address(index)?;
            socket.free_frames.push(addr);
        }
        socket.populate_fill(to_fill)?;
        log::debug!(
            "endpoint ready: {} frames in fill ring, {} free for transmit",
            socket.rx_frames,
            socket.free_frames.len()
        );
        Ok(socket)
    }

    fn populate_fill(&mut self, frames: u32) -> Result<(), Violation> {
        let (reserved, start) = self.fill.reserve(frames);
        for i in 0..reserved {
            let addr = self.umem.frame_address(i)?;
            self.track(addr, &[Owner::App], Owner::FillRing)?;
            self.fill.write(start.wrapping_add(i), addr)?;
        }
        self.fill.submit(reserved)?;
        self.rx_frames = reserved;
        // frames the fill ring had no room for stay with the application
        for index in (reserved..frames).rev() {
            self.free_frames.push(self.umem.frame_address(index)?);
        }
        Ok(())
    }

    /// Applies a ledger transfer when ownership tracking is on.
    pub(crate) fn track(&self, addr: u64, from: &[Owner], to: Owner) -> Result<(), Violation> {
        if let Some(ledger) = &self.ledger {
            let mut ledger = ledger.lock().unwrap_or_else(PoisonError::into_inner);
            ledger.transfer(addr, from, to)?;
        }
        Ok(())
    }

    /// Refuses work once a protocol violation was seen.
    pub(crate) fn ensure_live(&self) -> Result<(), RingError> {
        if self.aborted {
            return Err(RingError::Aborted);
        }
        Ok(())
    }

    /// Marks the endpoint aborted when `result` carries a protocol violation.
    pub(crate) fn guard<T>(&mut self, result: Result<T, RingError>) -> Result<T, RingError> {
        if let Err(RingError::ProtocolViolation(v)) = &result {
            log::error!("aborting endpoint: {v}");
            self.aborted = true;
        }
        result
    }

    pub fn config(&self) -> &XdpConfig {
        &self.config
    }

    pub fn direction(&self) -> Direction {
        self.config.direction
    }

    pub fn umem(&self) -> &Umem {
        &self.umem
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn ledger(&self) -> Option<&SharedLedger> {
        self.ledger.as_ref()
    }

    /// Frames circulating through fill, kernel and rx.
    pub fn rx_frames(&self) -> u32 {
        self.rx_frames
    }

    /// Frames submitted for transmission and not yet completed.
    pub fn tx_in_flight(&self) -> u32 {
        self.tx_in_flight
    }

    /// Frames held by the application, ready for transmission.
    pub fn free_frames(&self) -> usize {
        self.free_frames.len()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Drains transmit completions and recycles pending receive entries so
    /// that no frame is left half-way through a ring transfer.
    ///
    /// Gives up on outstanding sends after `retry_budget` waits of
    /// `shutdown_poll` each and reports them. Receive recycling stops after
    /// one ring's worth of packets even if the kernel keeps delivering.
    pub fn shutdown(&mut self) -> Result<ShutdownReport, RingError> {
        let mut report = ShutdownReport::default();
        if self.aborted {
            report.tx_outstanding = self.tx_in_flight;
            return Ok(report);
        }
        let mut attempts = 0;
        while self.tx_in_flight > 0 && attempts < self.config.retry_budget {
            self.complete_tx()?;
            if self.tx_in_flight == 0 {
                break;
            }
            self.wakeup_tx();
            if let Err(e) = self
                .notifier
                .wait(Direction::Tx, Some(self.config.shutdown_poll))
            {
                log::debug!("wait during shutdown failed: {e}");
            }
            attempts += 1;
        }
        if self.direction().has_rx() {
            // the rx ring can hold at most `rx_frames` packets; a kernel that
            // keeps delivering must not hold the shutdown open
            let passes = self.rx_frames.div_ceil(self.config.batch_size) + 1;
            for _ in 0..passes {
                let recycled = self.receive_batch(&mut Discard)?;
                if recycled == 0 {
                    break;
                }
                report.rx_recycled += recycled as u32;
            }
        }
        report.tx_outstanding = self.tx_in_flight;
        if report.tx_outstanding > 0 {
            log::warn!(
                "shutdown left {} sends unconfirmed by the kernel",
                report.tx_outstanding
            );
        }
        log::debug!("endpoint shut down: {report:?}");
        Ok(report)
    }

    /// Shuts the endpoint down and releases it: socket first, memory last.
    pub fn close(mut self) -> Result<ShutdownReport, RingError> {
        let report = self.shutdown();
        drop(self);
        report
    }
}
