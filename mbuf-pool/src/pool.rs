//! Fixed-population buffer pool.
//!
//! The region is carved into `count` buffers of `buf_len` bytes up front.
//! Each buffer gets one boxed [`Mbuf`] header for the life of the pool; the
//! free list just holds whichever boxes are not out on a ring or with the
//! application.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr::NonNull;

use spin::Mutex;

use crate::mbuf::{Mbuf, MBUF_HEADROOM};
use crate::region::MemoryRegion;
use crate::{PoolError, Result};

/// Pool of equally sized packet buffers.
pub struct MbufPool {
    free: Mutex<Vec<Box<Mbuf>>>,
    total: usize,
    buf_len: u16,
    region: MemoryRegion,
}

impl MbufPool {
    /// Build a pool over caller-provided DMA memory.
    ///
    /// # Safety
    /// `region` must satisfy the contract of [`MemoryRegion::new`] and must
    /// not back any other pool.
    pub unsafe fn new(region: MemoryRegion, buf_len: u16, count: usize) -> Result<Self> {
        Self::check_params(buf_len, count)?;
        if !region.is_usable() || region.size() < buf_len as usize * count {
            return Err(PoolError::InvalidRegion);
        }

        let mut free = Vec::with_capacity(count);
        for i in 0..count {
            let offset = i * buf_len as usize;
            // SAFETY: offset + buf_len <= region.size() checked above.
            let cpu = unsafe { NonNull::new_unchecked(region.cpu_ptr().as_ptr().add(offset)) };
            let mbuf = unsafe { Mbuf::new(cpu, region.bus_addr() + offset as u64, buf_len, i as u32) };
            free.push(Box::new(mbuf));
        }

        Ok(Self {
            free: Mutex::new(free),
            total: count,
            buf_len,
            region,
        })
    }

    /// Build a pool over freshly allocated identity-mapped memory.
    pub fn with_capacity(count: usize, buf_len: u16) -> Result<Self> {
        Self::check_params(buf_len, count)?;
        let region = MemoryRegion::allocate(buf_len as usize * count)?;
        // SAFETY: the region was just allocated for this pool alone.
        unsafe { Self::new(region, buf_len, count) }
    }

    fn check_params(buf_len: u16, count: usize) -> Result<()> {
        if count == 0 {
            return Err(PoolError::ZeroBuffers);
        }
        if count > u32::MAX as usize {
            return Err(PoolError::InvalidRegion);
        }
        if buf_len <= MBUF_HEADROOM {
            return Err(PoolError::BufferTooSmall);
        }
        Ok(())
    }

    /// Take one buffer, reset for `port`.
    pub fn alloc(&self, port: u16) -> Option<Box<Mbuf>> {
        let mut m = self.free.lock().pop()?;
        m.reset(port);
        Some(m)
    }

    /// Fill every slot of `out` or none of them.
    ///
    /// Buffers come back in whatever state they were freed in; callers that
    /// care about the data offset reset them.
    pub fn alloc_bulk(&self, out: &mut [Option<Box<Mbuf>>]) -> Result<()> {
        let mut free = self.free.lock();
        if free.len() < out.len() {
            return Err(PoolError::Exhausted);
        }
        for slot in out.iter_mut() {
            debug_assert!(slot.is_none(), "alloc_bulk into an occupied slot");
            *slot = free.pop();
        }
        Ok(())
    }

    /// Return one detached segment.
    pub fn free_seg(&self, mut m: Box<Mbuf>) {
        if m.next().is_some() {
            return self.free(m);
        }
        m.reset(0);
        self.free.lock().push(m);
    }

    /// Return a buffer and every segment chained behind it.
    pub fn free(&self, mut m: Box<Mbuf>) {
        let mut free = self.free.lock();
        loop {
            let next = m.take_next();
            debug_assert!((m.index() as usize) < self.total, "buffer from a foreign pool");
            m.reset(0);
            free.push(m);
            match next {
                Some(n) => m = n,
                None => break,
            }
        }
    }

    /// Free buffers right now.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Buffers currently owned outside the pool.
    pub fn in_use(&self) -> usize {
        self.total - self.available()
    }

    /// Population of the pool.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Size of each buffer.
    pub fn buf_len(&self) -> u16 {
        self.buf_len
    }

    /// Memory backing the pool.
    pub fn region(&self) -> &MemoryRegion {
        &self.region
    }
}

impl core::fmt::Debug for MbufPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MbufPool")
            .field("total", &self.total)
            .field("available", &self.available())
            .field("buf_len", &self.buf_len)
            .finish()
    }
}
