//! # AF_XDP Socket Creation
//!
//! ## Purpose
//!
//! Binds a [`Socket`] to a real interface queue.
//!
//! ## How it works
//!
//! 1.  Resolves the interface name to an index.
//! 2.  Creates a raw `AF_XDP` socket.
//! 3.  Maps the UMEM and registers it with `XDP_UMEM_REG`.
//! 4.  Sizes the fill, completion, rx and tx rings with `setsockopt`.
//! 5.  Reads the ring offsets (`XDP_MMAP_OFFSETS`) and maps the four rings.
//! 6.  Binds to the interface queue with `XDP_USE_NEED_WAKEUP` and the
//!     zero-copy policy.
//! 7.  Hands the receive frames to the fill ring.
//!
//! The environment must already steer the queue to this socket (an XDP
//! program redirecting into an XSKMAP) for packets to arrive; that is the
//! control plane's job, not this crate's.
//!
//! ## Main components
//!
//! - `Socket::<XskFd>::bind()`: the whole sequence above.
//! - `if_index()`: interface name lookup.
//! - `xdp_features()`: driver capability query (feature `xdp-features`).

use std::ffi::CString;
use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd as _, FromRawFd as _, OwnedFd};
use std::sync::{Arc, Mutex};

use crate::config::XdpConfig;
use crate::error::XdpError;
use crate::kick::XskFd;
use crate::ledger::FrameLedger;
use crate::ring::{RingType, ring_offsets};
use crate::socket::{Rings, Socket};
use crate::umem::Umem;

/// Resolves an interface name to its index.
pub fn if_index(device: &str) -> io::Result<u32> {
    let name = CString::new(device)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name contains NUL"))?;
    match unsafe { libc::if_nametoindex(name.as_ptr()) } {
        0 => Err(io::Error::last_os_error()),
        index => Ok(index),
    }
}

/// `NETDEV_XDP_ACT_XSK_ZEROCOPY` from `include/uapi/linux/netdev.h`.
#[cfg(feature = "xdp-features")]
const NETDEV_XDP_ACT_XSK_ZEROCOPY: u64 = 1 << 3;

/// Queries the XDP feature flags of a driver.
#[cfg(feature = "xdp-features")]
pub fn xdp_features(if_index: u32) -> io::Result<u64> {
    let mut opts: libbpf_sys::bpf_xdp_query_opts = unsafe { std::mem::zeroed() };
    opts.sz = size_of::<libbpf_sys::bpf_xdp_query_opts>() as _;
    let res = unsafe {
        libbpf_sys::bpf_xdp_query(
            if_index as libc::c_int,
            libbpf_sys::XDP_FLAGS_DRV_MODE as libc::c_int,
            &mut opts,
        )
    };
    if res < 0 {
        return Err(io::Error::other(format!(
            "Failed to query XDP features: {}",
            io::Error::from_raw_os_error(-res)
        )));
    }
    Ok(opts.feature_flags as u64)
}

fn bind_flags(config: &XdpConfig, _if_index: u32) -> u16 {
    let zero_copy = match config.zero_copy {
        Some(true) => libc::XDP_ZEROCOPY,
        Some(false) => libc::XDP_COPY,
        #[cfg(feature = "xdp-features")]
        None => match xdp_features(_if_index) {
            Ok(flags) if flags & NETDEV_XDP_ACT_XSK_ZEROCOPY != 0 => libc::XDP_ZEROCOPY,
            Ok(_) => libc::XDP_COPY,
            Err(e) => {
                log::debug!("{e}; leaving copy mode to the kernel");
                0
            }
        },
        #[cfg(not(feature = "xdp-features"))]
        None => 0,
    };
    let need_wakeup = if config.need_wakeup {
        libc::XDP_USE_NEED_WAKEUP
    } else {
        0
    };
    zero_copy | need_wakeup
}

impl Socket<XskFd> {
    /// Creates an AF_XDP socket on `device` queue `queue_id`.
    ///
    /// # Errors
    ///
    /// `XdpError::Config` for an invalid configuration, `XdpError::Allocation`
    /// when the UMEM cannot be mapped or registered, `XdpError::Bind` for
    /// everything else (unknown device, queue out of range, missing
    /// capabilities, unsupported mode).
    pub fn bind(device: &str, queue_id: u32, config: &XdpConfig) -> Result<Self, XdpError> {
        config.validate()?;
        let bind_err = |source: io::Error| XdpError::Bind {
            device: device.to_string(),
            queue_id,
            source,
        };

        let index = if_index(device).map_err(bind_err)?;

        let fd = unsafe {
            let fd = libc::socket(libc::AF_XDP, libc::SOCK_RAW | libc::SOCK_CLOEXEC, 0);
            if fd < 0 {
                return Err(bind_err(io::Error::last_os_error()));
            }
            OwnedFd::from_raw_fd(fd)
        };
        let raw_fd = fd.as_raw_fd();

        let umem = Umem::create(config.frame_size, config.frame_count, config.huge_page)?;
        umem.register(raw_fd)?;

        RingType::Fill
            .set_size(raw_fd, config.fill_ring_size)
            .map_err(bind_err)?;
        RingType::Completion
            .set_size(raw_fd, config.completion_ring_size)
            .map_err(bind_err)?;
        RingType::Rx
            .set_size(raw_fd, config.rx_ring_size)
            .map_err(bind_err)?;
        RingType::Tx
            .set_size(raw_fd, config.tx_ring_size)
            .map_err(bind_err)?;

        let offsets = ring_offsets(raw_fd).map_err(bind_err)?;
        let rings = Rings {
            fill: RingType::Fill
                .mmap_producer(raw_fd, &offsets, config.fill_ring_size)
                .map_err(bind_err)?,
            completion: RingType::Completion
                .mmap_consumer(raw_fd, &offsets, config.completion_ring_size)
                .map_err(bind_err)?,
            rx: RingType::Rx
                .mmap_consumer(raw_fd, &offsets, config.rx_ring_size)
                .map_err(bind_err)?,
            tx: RingType::Tx
                .mmap_producer(raw_fd, &offsets, config.tx_ring_size)
                .map_err(bind_err)?,
        };

        let sxdp = libc::sockaddr_xdp {
            sxdp_family: libc::AF_XDP as libc::sa_family_t,
            sxdp_flags: bind_flags(config, index),
            sxdp_ifindex: index,
            sxdp_queue_id: queue_id,
            sxdp_shared_umem_fd: 0,
        };
        let res = unsafe {
            libc::bind(
                raw_fd,
                &sxdp as *const _ as *const libc::sockaddr,
                size_of::<libc::sockaddr_xdp>() as libc::socklen_t,
            )
        };
        if res < 0 {
            return Err(bind_err(io::Error::last_os_error()));
        }
        log::debug!(
            "AF_XDP socket bound to {device} (ifindex {index}) queue {queue_id}, flags {:#x}",
            sxdp.sxdp_flags
        );

        let ledger = config
            .track_ownership
            .then(|| Arc::new(Mutex::new(FrameLedger::new(umem.frame_size(), umem.frame_count()))));
        Socket::from_parts(XskFd::new(fd), umem, rings, config.clone(), ledger)
    }
}
