//! # Memory Mappings for UMEM and Rings
//!
//! ## Purpose
//!
//! This module owns every memory mapping the engine creates: the anonymous,
//! page-aligned region that backs the frame pool, the shared mappings of the
//! kernel rings, and the anonymous mappings used by in-process rings.
//!
//! ## How it works
//!
//! `OwnedMmap` wraps a raw pointer and a length and calls `munmap` on drop.
//! Anonymous mappings may be backed by 2 MiB huge pages; when the caller does
//! not say, `/proc/meminfo` decides. Ring mappings of a socket fd are created
//! with `MAP_SHARED | MAP_POPULATE` at the page offset the kernel assigns to
//! each ring.
//!
//! ## Main components
//!
//! - `OwnedMmap`: owner of one mapping.
//! - `get_hugepage_info()`: parser for the huge page lines of `/proc/meminfo`.
//! - `page_size()`: the system page size.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::{io, ptr};

const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Owner of a memory-mapped region; unmapped on drop.
#[derive(Debug)]
pub struct OwnedMmap {
    ptr: *mut libc::c_void,
    len: usize,
}

// The mapping is plain memory; synchronisation of its contents is the job of
// the ring protocol built on top of it.
unsafe impl Send for OwnedMmap {}
unsafe impl Sync for OwnedMmap {}

impl OwnedMmap {
    /// Creates an anonymous, private, zero-filled mapping of at least `size` bytes.
    ///
    /// The size is rounded up to the page size in use. With `huge_page` set to
    /// `None` huge pages are used only when `/proc/meminfo` reports free 2 MiB
    /// pages.
    pub fn anonymous(size: usize, huge_page: Option<bool>) -> io::Result<Self> {
        let huge_tlb = match huge_page {
            Some(yes) => yes,
            None => match get_hugepage_info() {
                Ok(HugePageInfo {
                    free: Some(free),
                    size_kb: Some(2048),
                    ..
                }) => free > 0,
                Ok(_) => false,
                Err(e) => {
                    log::debug!("huge page probe failed, using regular pages: {e}");
                    false
                }
            },
        };
        let page = if huge_tlb { HUGE_PAGE_SIZE } else { page_size() };
        let aligned_size = size.max(1).div_ceil(page) * page;
        let flags = libc::MAP_PRIVATE
            | libc::MAP_ANONYMOUS
            | if huge_tlb {
                libc::MAP_HUGETLB | libc::MAP_HUGE_2MB
            } else {
                0
            };
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                aligned_size,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(OwnedMmap {
            ptr,
            len: aligned_size,
        })
    }

    /// Maps `size` bytes of a socket's ring area at `offset` (one of the
    /// `XDP_*_PGOFF_*` constants).
    pub fn shared_fd(fd: libc::c_int, size: usize, offset: u64) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd,
                offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(OwnedMmap { ptr, len: size })
    }

    pub fn as_void_ptr(&self) -> *mut libc::c_void {
        self.ptr
    }

    pub fn as_u8_ptr(&self) -> *mut u8 {
        self.ptr as *mut u8
    }

    /// Size of the mapping in bytes, after page rounding.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for OwnedMmap {
    fn drop(&mut self) {
        if self.ptr != libc::MAP_FAILED && !self.ptr.is_null() {
            let res = unsafe { libc::munmap(self.ptr, self.len) };
            if res < 0 {
                log::error!("Failed to unmap memory: {}", io::Error::last_os_error());
            }
        }
    }
}

/// The system page size in bytes.
pub fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    }
}

/// Huge page configuration as reported by the kernel.
#[derive(Debug, Default)]
pub struct HugePageInfo {
    /// The size of a huge page in kilobytes.
    pub size_kb: Option<u64>,
    /// The total number of huge pages configured in the system.
    pub total: Option<u64>,
    /// The number of free huge pages.
    pub free: Option<u64>,
}

/// Parses `/proc/meminfo` for the `Hugepagesize`, `HugePages_Total` and
/// `HugePages_Free` keys.
pub fn get_hugepage_info() -> io::Result<HugePageInfo> {
    let file = File::open("/proc/meminfo")?;
    parse_hugepage_info(BufReader::new(file))
}

pub(crate) fn parse_hugepage_info<R: BufRead>(reader: R) -> io::Result<HugePageInfo> {
    let mut info = HugePageInfo::default();
    for line in reader.lines() {
        let line = line?;
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_end_matches(" kB");
        let slot = match key.trim() {
            "Hugepagesize" => &mut info.size_kb,
            "HugePages_Total" => &mut info.total,
            "HugePages_Free" => &mut info.free,
            _ => continue,
        };
        *slot = Some(value.parse().map_err(io::Error::other)?);
    }
    Ok(info)
}
