//! # Frame Buffer Pool (UMEM)
//!
//! A contiguous, page-aligned region split into `frame_count` frames of
//! `frame_size` bytes. A frame is named by its byte offset into the region
//! (its address); descriptors on every ring carry these addresses.
//!
//! The pool does not track who owns a frame: ownership follows ring
//! membership. Reading or writing a frame is only sound while the caller
//! holds it logically; the [`crate::ledger`] can verify that in tests.

use std::io;
use std::mem::size_of;
use std::sync::Arc;
use std::slice;

use crate::error::{Violation, XdpError};
use crate::mmap::OwnedMmap;

pub struct Umem {
    mmap: Arc<OwnedMmap>,
    frame_size: u32,
    frame_count: u32,
}

impl Umem {
    /// Maps a new region of `frame_size * frame_count` bytes.
    pub fn create(
        frame_size: u32,
        frame_count: u32,
        huge_page: Option<bool>,
    ) -> Result<Self, XdpError> {
        if !frame_size.is_power_of_two() || frame_count == 0 {
            return Err(XdpError::Config(format!(
                "cannot build a pool of {frame_count} frames of {frame_size} bytes"
            )));
        }
        let size = frame_size as usize * frame_count as usize;
        let mmap = OwnedMmap::anonymous(size, huge_page).map_err(XdpError::Allocation)?;
        log::debug!(
            "UMEM of {frame_count} x {frame_size} bytes mapped ({} bytes)",
            mmap.len()
        );
        Ok(Umem {
            mmap: Arc::new(mmap),
            frame_size,
            frame_count,
        })
    }

    /// Registers the region with an AF_XDP socket (`XDP_UMEM_REG`).
    pub fn register(&self, raw_fd: libc::c_int) -> Result<(), XdpError> {
        let reg = unsafe {
            libc::xdp_umem_reg {
                addr: self.mmap.as_void_ptr() as u64,
                len: self.len() as u64,
                chunk_size: self.frame_size,
                ..std::mem::zeroed()
            }
        };
        let res = unsafe {
            libc::setsockopt(
                raw_fd,
                libc::SOL_XDP,
                libc::XDP_UMEM_REG,
                &reg as *const _ as *const libc::c_void,
                size_of::<libc::xdp_umem_reg>() as libc::socklen_t,
            )
        };
        if res < 0 {
            let e = io::Error::last_os_error();
            return Err(XdpError::Allocation(io::Error::new(
                e.kind(),
                format!("Failed to register UMEM: {e}"),
            )));
        }
        Ok(())
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Bytes covered by frames; the mapping itself may be rounded up.
    pub fn len(&self) -> usize {
        self.frame_size as usize * self.frame_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of frame `index`.
    pub fn frame_address(&self, index: u32) -> Result<u64, Violation> {
        if index >= self.frame_count {
            return Err(Violation::InvalidFrameIndex(index));
        }
        Ok(index as u64 * self.frame_size as u64)
    }

    /// Index of the frame containing `addr`, if `addr` is inside the pool.
    pub fn frame_index(&self, addr: u64) -> Option<u32> {
        let index = addr / self.frame_size as u64;
        (index < self.frame_count as u64).then_some(index as u32)
    }

    /// Strips the in-frame offset from `addr`.
    pub fn frame_base(&self, addr: u64) -> u64 {
        addr & !(self.frame_size as u64 - 1)
    }

    fn check_span(&self, addr: u64, len: u32) -> Result<usize, Violation> {
        let base = self.frame_base(addr);
        let in_frame = self.frame_index(addr).is_some()
            && addr - base + len as u64 <= self.frame_size as u64;
        if !in_frame {
            return Err(Violation::InvalidAddress { addr, len });
        }
        Ok(addr as usize)
    }

    /// `len` bytes at `addr`; the span must stay inside one frame.
    pub fn data_at(&self, addr: u64, len: u32) -> Result<&[u8], Violation> {
        let offset = self.check_span(addr, len)?;
        Ok(unsafe { slice::from_raw_parts(self.mmap.as_u8_ptr().add(offset), len as usize) })
    }

    /// Mutable form of [`Umem::data_at`].
    pub fn data_at_mut(&mut self, addr: u64, len: u32) -> Result<&mut [u8], Violation> {
        let offset = self.check_span(addr, len)?;
        Ok(unsafe { slice::from_raw_parts_mut(self.mmap.as_u8_ptr().add(offset), len as usize) })
    }

    /// The whole frame that contains `addr`.
    pub fn frame_mut(&mut self, addr: u64) -> Result<&mut [u8], Violation> {
        let base = self.frame_base(addr);
        self.data_at_mut(base, self.frame_size)
    }

    /// A second handle on the same memory, for the in-process kernel peer.
    pub(crate) fn share(&self) -> Umem {
        Umem {
            mmap: self.mmap.clone(),
            frame_size: self.frame_size,
            frame_count: self.frame_count,
        }
    }
}
