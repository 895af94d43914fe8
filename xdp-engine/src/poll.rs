//!
//! # Readiness
//!
//! `Socket::poll` first looks at the rings: pending rx entries make the
//! endpoint readable, free tx capacity or pending completions make it
//! writable. Only when neither is true does it block on the notification
//! handle, which for a kernel socket is `poll(2)` on the AF_XDP fd:
//! `POLLIN` for receive, `POLLOUT` for transmit.
//!

use std::io;
use std::os::fd::AsRawFd as _;
use std::time::Duration;

use crate::config::Direction;
use crate::kick::XskFd;
use crate::socket::{Notifier, Readiness, Socket};

impl XskFd {
    /// Waits on the fd with `poll(2)`. Interruptions count as a timeout.
    pub fn poll_fd(&self, direction: Direction, timeout: Option<Duration>) -> io::Result<Readiness> {
        let events = match direction {
            Direction::Rx => libc::POLLIN,
            Direction::Tx => libc::POLLOUT,
            Direction::Both => libc::POLLIN | libc::POLLOUT,
        };
        let timeout_ms = match timeout {
            Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };
        let mut fds = [libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events,
            revents: 0,
        }];
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), 1, timeout_ms) };
        if ret < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::default());
            }
            return Err(e);
        }
        if fds[0].revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            return Err(io::Error::other(format!(
                "AF_XDP socket reported poll events {:#x}",
                fds[0].revents
            )));
        }
        Ok(Readiness {
            readable: fds[0].revents & libc::POLLIN != 0,
            writable: fds[0].revents & libc::POLLOUT != 0,
        })
    }
}

impl<N: Notifier> Socket<N> {
    /// Readiness the rings show right now, without blocking.
    pub fn readiness(&self, direction: Direction) -> Readiness {
        Readiness {
            readable: direction.has_rx() && self.rx.pending() > 0,
            writable: direction.has_tx()
                && ((self.tx.free() > 0 && !self.free_frames.is_empty())
                    || self.completion.pending() > 0),
        }
    }

    /// Waits until the endpoint can make progress in `direction`.
    ///
    /// Returns immediately when the rings already show work. Otherwise the
    /// wait on the notification handle is bounded by `timeout`; an empty
    /// result means it expired.
    pub fn poll(&self, direction: Direction, timeout: Option<Duration>) -> io::Result<Readiness> {
        let ready = self.readiness(direction);
        if !ready.is_empty() {
            return Ok(ready);
        }
        let signalled = self.notifier.wait(direction, timeout)?;
        let ready = self.readiness(direction);
        Ok(Readiness {
            readable: ready.readable || (direction.has_rx() && signalled.readable),
            writable: ready.writable || (direction.has_tx() && signalled.writable),
        })
    }
}
