//! # Event Loop
//!
//! Drives one endpoint on the calling thread until its cancellation token
//! fires:
//!
//! ```text
//! loop {
//!     cancelled?            -> stop
//!     poll(interest)        -> readable: receive_batch
//!                           -> writable: send_batch (until the source is drained)
//!     sends in flight?      -> complete_tx
//! }
//! shutdown()
//! ```
//!
//! The token is only looked at between iterations, so a batch in progress
//! always finishes. `poll_timeout` bounds how long an idle endpoint takes to
//! notice cancellation; without one the loop still wakes every
//! `CANCEL_CHECK_INTERVAL`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Direction;
use crate::error::{RingError, XdpError};
use crate::socket::{Discard, NoPackets, Notifier, PacketHandler, PacketSource, ShutdownReport, Socket};

/// Longest wait between token checks when `poll_timeout` is `None`.
pub const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Totals of one [`EventLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub iterations: u64,
    pub received: u64,
    pub sent: u64,
    /// Receive batches put off because the fill ring stayed full.
    pub fill_starved: u64,
    pub shutdown: ShutdownReport,
}

pub struct EventLoop<N: Notifier> {
    socket: Socket<N>,
    token: CancellationToken,
}

impl<N: Notifier> EventLoop<N> {
    pub fn new(socket: Socket<N>) -> Self {
        Self::with_token(socket, CancellationToken::new())
    }

    /// Runs under an existing token, for instance a child of the
    /// application's shutdown token.
    pub fn with_token(socket: Socket<N>, token: CancellationToken) -> Self {
        EventLoop { socket, token }
    }

    /// A handle that stops the loop when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn socket(&self) -> &Socket<N> {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut Socket<N> {
        &mut self.socket
    }

    pub fn into_socket(self) -> Socket<N> {
        self.socket
    }

    /// Receives into `handler` and sends from `source` until cancelled.
    ///
    /// A transmit-only loop also ends by itself once `source` is drained and
    /// the kernel has confirmed every send. The endpoint is shut down before
    /// returning, so no frame is left between rings.
    pub fn run<H, S>(&mut self, handler: &mut H, source: &mut S) -> Result<LoopReport, XdpError>
    where
        H: PacketHandler + ?Sized,
        S: PacketSource + ?Sized,
    {
        let direction = self.socket.direction();
        // an unbounded wait would never see the token on an idle queue
        let timeout = Some(
            self.socket
                .config()
                .poll_timeout
                .unwrap_or(CANCEL_CHECK_INTERVAL),
        );
        let batch = self.socket.config().batch_size as usize;
        let mut drained = !direction.has_tx();
        let mut report = LoopReport::default();
        log::debug!("event loop started ({direction:?})");

        while !self.token.is_cancelled() {
            report.iterations += 1;
            let interest = match (direction.has_rx(), !drained) {
                (true, true) => Some(Direction::Both),
                (true, false) => Some(Direction::Rx),
                (false, true) => Some(Direction::Tx),
                (false, false) => None,
            };
            let Some(interest) = interest else {
                if self.socket.tx_in_flight() == 0 {
                    break;
                }
                self.await_completions(timeout)?;
                continue;
            };

            let ready = self.socket.poll(interest, timeout)?;
            // an idle receive call still lets the kernel ask for a wakeup
            if interest.has_rx() && (ready.readable || ready.is_empty()) {
                match self.socket.receive_batch(handler) {
                    Ok(n) => report.received += n as u64,
                    Err(RingError::FillStarved { needed, .. }) => {
                        log::warn!("{needed} received packets wait for fill ring space");
                        report.fill_starved += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            if ready.writable && !drained {
                let sent = self.socket.send_batch(batch, source)?;
                report.sent += sent.queued as u64;
                drained = sent.drained;
                if drained {
                    log::debug!("packet source drained after {} packets", report.sent);
                }
            } else if self.socket.tx_in_flight() > 0 {
                self.socket.complete_tx()?;
            }
        }

        report.shutdown = self.socket.shutdown()?;
        log::debug!("event loop stopped: {report:?}");
        Ok(report)
    }

    /// Receive-only run.
    pub fn run_rx<H>(&mut self, handler: &mut H) -> Result<LoopReport, XdpError>
    where
        H: PacketHandler + ?Sized,
    {
        self.run(handler, &mut NoPackets)
    }

    /// Transmit-only run; received packets, if any, are dropped.
    pub fn run_tx<S>(&mut self, source: &mut S) -> Result<LoopReport, XdpError>
    where
        S: PacketSource + ?Sized,
    {
        self.run(&mut Discard, source)
    }

    fn await_completions(&mut self, timeout: Option<Duration>) -> Result<(), XdpError> {
        if self.socket.complete_tx()? == 0 {
            self.socket.notifier().wait(Direction::Tx, timeout)?;
        }
        Ok(())
    }
}
