//! # Single-Producer/Single-Consumer Descriptor Rings
//!
//! ## Purpose
//!
//! AF_XDP moves frame ownership through four rings. Each ring has exactly one
//! writer and one reader, which live in different execution contexts (the
//! kernel driver and a userspace thread) and never take a lock.
//!
//! ## How it works
//!
//! A ring is a power-of-two array of descriptors plus a producer counter, a
//! consumer counter and a flags word. Counters run freely and wrap at
//! `u32::MAX`; the slot of an index is `index & mask`. The number of entries
//! is `producer - consumer`.
//!
//! Both halves keep cached copies of the indices and only touch the shared
//! counters when the cache runs dry:
//!
//! ```text
//! ProdRing: | .. published .>. reserved window .>. cached_prod .. (cached_cons = consumer + size) |
//! ConsRing: | .. released  .>. peeked window   .>. cached_cons .. cached_prod |
//! ```
//!
//! The producer writes descriptors into its reserved window and publishes
//! them with a Release store of the producer counter. The consumer loads
//! the producer counter with Acquire before reading descriptors, and hands
//! slots back with a Release store of the consumer counter.
//!
//! The same code runs over kernel rings mapped from the socket fd and over
//! in-process rings (`local_pair`) that stand in for the kernel in tests.
//!
//! ## Main components
//!
//! - `ProdRing<T>`: `reserve` / `write` / `submit` / `cancel`.
//! - `ConsRing<T>`: `peek` / `read` / `release` / `cancel`.
//! - `XdpDesc`: the Rx/Tx descriptor, layout-identical to `struct xdp_desc`.
//! - `RingType`: sizing and mapping of the kernel rings.

use std::mem::size_of;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::{io, ptr};

use crate::error::Violation;
use crate::mmap::OwnedMmap;

/// Rx/Tx ring descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XdpDesc {
    pub addr: u64,
    pub len: u32,
    pub options: u32,
}

static_assertions::const_assert_eq!(size_of::<XdpDesc>(), 16);

impl XdpDesc {
    pub fn new(addr: u64, len: u32, options: u32) -> Self {
        XdpDesc { addr, len, options }
    }
}

const CACHE_LINE: usize = 64;

/// Shared view of one ring: counters, flags and the descriptor array.
pub struct RingMmap<T> {
    _mmap: Arc<OwnedMmap>,
    producer: *const AtomicU32,
    consumer: *const AtomicU32,
    flags: *const AtomicU32,
    desc: *mut T,
    size: u32,
}

unsafe impl<T: Send> Send for RingMmap<T> {}

impl<T: Copy> RingMmap<T> {
    fn producer(&self) -> &AtomicU32 {
        unsafe { &*self.producer }
    }

    fn consumer(&self) -> &AtomicU32 {
        unsafe { &*self.consumer }
    }

    fn flags(&self) -> &AtomicU32 {
        unsafe { &*self.flags }
    }

    fn slot(&self, index: u32) -> *mut T {
        unsafe { self.desc.add((index & (self.size - 1)) as usize) }
    }

    fn needs_wakeup(&self) -> bool {
        self.flags().load(Ordering::Relaxed) & libc::XDP_RING_NEED_WAKEUP != 0
    }

    fn set_need_wakeup(&self, on: bool) {
        if on {
            self.flags()
                .fetch_or(libc::XDP_RING_NEED_WAKEUP, Ordering::Release);
        } else {
            self.flags()
                .fetch_and(!libc::XDP_RING_NEED_WAKEUP, Ordering::Release);
        }
    }
}

/// Producer half of a ring.
pub struct ProdRing<T> {
    ring: RingMmap<T>,
    cached_prod: u32,
    cached_cons: u32,
    published: u32,
}

impl<T: Copy> ProdRing<T> {
    fn new(ring: RingMmap<T>) -> Self {
        let published = ring.producer().load(Ordering::Relaxed);
        let cached_cons = ring.consumer().load(Ordering::Acquire).wrapping_add(ring.size);
        ProdRing {
            ring,
            cached_prod: published,
            cached_cons,
            published,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.ring.size
    }

    /// Slots reserved and not yet submitted.
    pub fn reserved(&self) -> u32 {
        self.cached_prod.wrapping_sub(self.published)
    }

    /// Free slots as seen by the consumer right now. Does not reserve.
    pub fn free(&self) -> u32 {
        self.ring
            .consumer()
            .load(Ordering::Acquire)
            .wrapping_add(self.ring.size)
            .wrapping_sub(self.cached_prod)
    }

    fn free_entries(&mut self, wanted: u32) -> u32 {
        let free = self.cached_cons.wrapping_sub(self.cached_prod);
        if free >= wanted {
            return free;
        }
        self.cached_cons = self
            .ring
            .consumer()
            .load(Ordering::Acquire)
            .wrapping_add(self.ring.size);
        self.cached_cons.wrapping_sub(self.cached_prod)
    }

    /// Claims up to `n` slots and returns `(count, start_index)`.
    ///
    /// Never blocks; a full ring yields a count of zero.
    pub fn reserve(&mut self, n: u32) -> (u32, u32) {
        let count = n.min(self.free_entries(n));
        let start = self.cached_prod;
        self.cached_prod = self.cached_prod.wrapping_add(count);
        (count, start)
    }

    /// Writes a descriptor into a reserved, unsubmitted slot.
    pub fn write(&mut self, index: u32, value: T) -> Result<(), Violation> {
        if index.wrapping_sub(self.published) >= self.reserved() {
            return Err(Violation::SlotOutOfWindow { index });
        }
        unsafe { ptr::write(self.ring.slot(index), value) };
        Ok(())
    }

    /// Publishes the oldest `n` reserved slots to the consumer.
    pub fn submit(&mut self, n: u32) -> Result<(), Violation> {
        let reserved = self.reserved();
        if n > reserved {
            return Err(Violation::SubmitOverflow {
                requested: n,
                reserved,
            });
        }
        self.published = self.published.wrapping_add(n);
        self.ring.producer().store(self.published, Ordering::Release);
        Ok(())
    }

    /// Gives back the `n` most recently reserved slots.
    pub fn cancel(&mut self, n: u32) -> Result<(), Violation> {
        let reserved = self.reserved();
        if n > reserved {
            return Err(Violation::CancelOverflow {
                requested: n,
                outstanding: reserved,
            });
        }
        self.cached_prod = self.cached_prod.wrapping_sub(n);
        Ok(())
    }

    /// The consumer asked to be woken up (`XDP_RING_NEED_WAKEUP`).
    pub fn needs_wakeup(&self) -> bool {
        self.ring.needs_wakeup()
    }
}

/// Consumer half of a ring.
pub struct ConsRing<T> {
    ring: RingMmap<T>,
    cached_cons: u32,
    cached_prod: u32,
    released: u32,
}

impl<T: Copy> ConsRing<T> {
    fn new(ring: RingMmap<T>) -> Self {
        let released = ring.consumer().load(Ordering::Relaxed);
        let cached_prod = ring.producer().load(Ordering::Acquire);
        ConsRing {
            ring,
            cached_cons: released,
            cached_prod,
            released,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.ring.size
    }

    /// Entries peeked and not yet released.
    pub fn peeked(&self) -> u32 {
        self.cached_cons.wrapping_sub(self.released)
    }

    /// Entries published by the producer and not yet peeked. Does not peek.
    pub fn pending(&self) -> u32 {
        self.ring
            .producer()
            .load(Ordering::Acquire)
            .wrapping_sub(self.cached_cons)
    }

    /// Observes up to `n` entries beyond those already peeked and returns
    /// `(count, start_index)`. Never blocks; an empty ring yields zero.
    pub fn peek(&mut self, n: u32) -> (u32, u32) {
        let mut available = self.cached_prod.wrapping_sub(self.cached_cons);
        if available < n {
            self.cached_prod = self.ring.producer().load(Ordering::Acquire);
            available = self.cached_prod.wrapping_sub(self.cached_cons);
        }
        let count = n.min(available);
        let start = self.cached_cons;
        self.cached_cons = self.cached_cons.wrapping_add(count);
        (count, start)
    }

    /// Reads a descriptor from the peeked, unreleased window.
    pub fn read(&self, index: u32) -> Result<T, Violation> {
        if index.wrapping_sub(self.released) >= self.peeked() {
            return Err(Violation::SlotOutOfWindow { index });
        }
        Ok(unsafe { ptr::read(self.ring.slot(index)) })
    }

    /// Hands the oldest `n` peeked slots back to the producer.
    pub fn release(&mut self, n: u32) -> Result<(), Violation> {
        let peeked = self.peeked();
        if n > peeked {
            return Err(Violation::ReleaseOverflow {
                requested: n,
                peeked,
            });
        }
        self.released = self.released.wrapping_add(n);
        self.ring.consumer().store(self.released, Ordering::Release);
        Ok(())
    }

    /// Un-peeks the `n` most recently peeked entries; the next `peek`
    /// returns them again.
    pub fn cancel(&mut self, n: u32) -> Result<(), Violation> {
        let peeked = self.peeked();
        if n > peeked {
            return Err(Violation::CancelOverflow {
                requested: n,
                outstanding: peeked,
            });
        }
        self.cached_cons = self.cached_cons.wrapping_sub(n);
        Ok(())
    }

    pub fn needs_wakeup(&self) -> bool {
        self.ring.needs_wakeup()
    }

    /// Sets or clears the wakeup flag. The consuming side owns it: the kernel
    /// raises it on the fill and tx rings when its poll loop goes idle.
    pub fn set_need_wakeup(&self, on: bool) {
        self.ring.set_need_wakeup(on)
    }
}

/// Creates the two halves of an in-process ring of `capacity` entries.
pub fn local_pair<T: Copy>(capacity: u32) -> io::Result<(ProdRing<T>, ConsRing<T>)> {
    local_pair_at(capacity, 0)
}

/// Like [`local_pair`], with both counters starting at `initial_index`.
/// Lets tests cross the `u32` wrap point quickly.
#[doc(hidden)]
pub fn local_pair_at<T: Copy>(
    capacity: u32,
    initial_index: u32,
) -> io::Result<(ProdRing<T>, ConsRing<T>)> {
    if !capacity.is_power_of_two() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("ring capacity {capacity} is not a power of two"),
        ));
    }
    // producer, consumer and flags each get their own cache line
    let desc_offset = 3 * CACHE_LINE;
    let size = desc_offset + capacity as usize * size_of::<T>();
    let mmap = Arc::new(OwnedMmap::anonymous(size, Some(false))?);
    let view = || {
        let base = mmap.as_u8_ptr();
        unsafe {
            RingMmap {
                _mmap: mmap.clone(),
                producer: base as *const AtomicU32,
                consumer: base.add(CACHE_LINE) as *const AtomicU32,
                flags: base.add(2 * CACHE_LINE) as *const AtomicU32,
                desc: base.add(desc_offset) as *mut T,
                size: capacity,
            }
        }
    };
    let (prod_view, cons_view) = (view(), view());
    prod_view.producer().store(initial_index, Ordering::Relaxed);
    prod_view.consumer().store(initial_index, Ordering::Release);
    Ok((ProdRing::new(prod_view), ConsRing::new(cons_view)))
}

/// The four kernel rings of an AF_XDP socket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RingType {
    Tx,
    Rx,
    Fill,
    Completion,
}

impl RingType {
    fn as_index(&self) -> libc::c_int {
        match self {
            RingType::Tx => libc::XDP_TX_RING,
            RingType::Rx => libc::XDP_RX_RING,
            RingType::Fill => libc::XDP_UMEM_FILL_RING,
            RingType::Completion => libc::XDP_UMEM_COMPLETION_RING,
        }
    }

    fn as_offset(&self) -> u64 {
        match self {
            RingType::Tx => libc::XDP_PGOFF_TX_RING as u64,
            RingType::Rx => libc::XDP_PGOFF_RX_RING as u64,
            RingType::Fill => libc::XDP_UMEM_PGOFF_FILL_RING as u64,
            RingType::Completion => libc::XDP_UMEM_PGOFF_COMPLETION_RING as u64,
        }
    }

    /// Tells the kernel how many entries this ring has.
    pub fn set_size(self, raw_fd: libc::c_int, ring_size: u32) -> io::Result<()> {
        let res = unsafe {
            libc::setsockopt(
                raw_fd,
                libc::SOL_XDP,
                self.as_index(),
                &ring_size as *const _ as *const libc::c_void,
                size_of::<u32>() as libc::socklen_t,
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn mmap<T: Copy>(
        self,
        raw_fd: libc::c_int,
        offsets: &libc::xdp_mmap_offsets,
        ring_size: u32,
    ) -> io::Result<RingMmap<T>> {
        let offs = match self {
            RingType::Tx => &offsets.tx,
            RingType::Rx => &offsets.rx,
            RingType::Fill => &offsets.fr,
            RingType::Completion => &offsets.cr,
        };
        let map_size = (offs.desc as usize).saturating_add(ring_size as usize * size_of::<T>());
        let mmap = Arc::new(OwnedMmap::shared_fd(raw_fd, map_size, self.as_offset())?);
        let base = mmap.as_u8_ptr();
        unsafe {
            Ok(RingMmap {
                producer: base.add(offs.producer as usize) as *const AtomicU32,
                consumer: base.add(offs.consumer as usize) as *const AtomicU32,
                flags: base.add(offs.flags as usize) as *const AtomicU32,
                desc: base.add(offs.desc as usize) as *mut T,
                size: ring_size,
                _mmap: mmap,
            })
        }
    }

    /// Maps a ring userspace produces into (Fill, Tx).
    pub fn mmap_producer<T: Copy>(
        self,
        raw_fd: libc::c_int,
        offsets: &libc::xdp_mmap_offsets,
        ring_size: u32,
    ) -> io::Result<ProdRing<T>> {
        debug_assert!(matches!(self, RingType::Fill | RingType::Tx));
        Ok(ProdRing::new(self.mmap(raw_fd, offsets, ring_size)?))
    }

    /// Maps a ring userspace consumes from (Rx, Completion).
    pub fn mmap_consumer<T: Copy>(
        self,
        raw_fd: libc::c_int,
        offsets: &libc::xdp_mmap_offsets,
        ring_size: u32,
    ) -> io::Result<ConsRing<T>> {
        debug_assert!(matches!(self, RingType::Rx | RingType::Completion));
        Ok(ConsRing::new(self.mmap(raw_fd, offsets, ring_size)?))
    }
}

/// Reads the ring layout the kernel chose for this socket.
pub fn ring_offsets(raw_fd: libc::c_int) -> io::Result<libc::xdp_mmap_offsets> {
    let mut offsets: libc::xdp_mmap_offsets = unsafe { std::mem::zeroed() };
    let mut optlen = size_of::<libc::xdp_mmap_offsets>() as libc::socklen_t;
    let res = unsafe {
        libc::getsockopt(
            raw_fd,
            libc::SOL_XDP,
            libc::XDP_MMAP_OFFSETS,
            &mut offsets as *mut _ as *mut libc::c_void,
            &mut optlen,
        )
    };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(offsets)
}
