//! # Kernel Wakeup
//!
//! ## Purpose
//!
//! With `XDP_USE_NEED_WAKEUP` the kernel stops polling a ring when it runs
//! out of work and raises `XDP_RING_NEED_WAKEUP` in the ring's flags. The
//! application then has to prompt it with a syscall; while the flag is clear
//! the syscall is skipped, which is what keeps batches free of kernel entries.
//!
//! ## How it works
//!
//! The prompt is a zero-length, non-blocking `recvfrom` (rx side) or `sendto`
//! (tx side) on the socket fd. It is best effort: `EAGAIN`, `EBUSY` and
//! `ENOBUFS` mean the kernel is already busy, `ENETDOWN` is logged, and any
//! other failure is logged and counted but never fails the batch, since the
//! next cycle prompts again.
//!
//! ## Main components
//!
//! - `XskFd`: the AF_XDP socket fd as a [`Notifier`].
//! - `Socket::wakeup_rx` / `Socket::wakeup_tx`: prompt and account.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::Duration;
use std::{io, ptr};

use crate::config::Direction;
use crate::socket::{Notifier, Readiness, Socket};

/// Notification handle over an AF_XDP socket fd.
#[derive(Debug)]
pub struct XskFd {
    pub(crate) fd: OwnedFd,
}

impl XskFd {
    pub fn new(fd: OwnedFd) -> Self {
        XskFd { fd }
    }

    fn kick_result(ret: isize) -> io::Result<()> {
        if ret >= 0 {
            return Ok(());
        }
        match io::Error::last_os_error().raw_os_error() {
            None | Some(libc::EBUSY | libc::ENOBUFS | libc::EAGAIN) => Ok(()),
            Some(libc::ENETDOWN) => {
                log::warn!("network interface is down, cannot wake up");
                Ok(())
            }
            Some(e) => Err(io::Error::from_raw_os_error(e)),
        }
    }
}

impl AsRawFd for XskFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Notifier for XskFd {
    fn wakeup_rx(&self) -> io::Result<()> {
        let ret = unsafe {
            libc::recvfrom(
                self.fd.as_raw_fd(),
                ptr::null_mut(),
                0,
                libc::MSG_DONTWAIT,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        Self::kick_result(ret)
    }

    fn wakeup_tx(&self) -> io::Result<()> {
        let ret = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                ptr::null(),
                0,
                libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL,
                ptr::null(),
                0,
            )
        };
        Self::kick_result(ret)
    }

    fn wait(&self, direction: Direction, timeout: Option<Duration>) -> io::Result<Readiness> {
        self.poll_fd(direction, timeout)
    }
}

impl<N: Notifier> Socket<N> {
    /// Prompts the kernel to refill the rx ring. Failures are logged only.
    pub fn wakeup_rx(&self) {
        self.stats.record_rx_wakeup();
        if let Err(e) = self.notifier.wakeup_rx() {
            self.stats.record_wakeup_error();
            log::warn!("rx wakeup failed: {e}");
        }
    }

    /// Prompts the kernel to drain the tx ring. Failures are logged only.
    pub fn wakeup_tx(&self) {
        self.stats.record_tx_wakeup();
        if let Err(e) = self.notifier.wakeup_tx() {
            self.stats.record_wakeup_error();
            log::warn!("tx wakeup failed: {e}");
        }
    }
}
