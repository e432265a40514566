//! DMA-capable memory backing a pool.
//!
//! A region pairs the CPU view of some memory with the address the device
//! uses for it. On identity-mapped platforms the two are equal.

use core::ptr::NonNull;

use alloc::alloc::{alloc_zeroed, Layout};

use crate::{PoolError, Result};

/// Page size (4KB).
pub const PAGE_SIZE: usize = 4096;

/// Align a value up to the given alignment.
#[inline]
pub const fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// A contiguous block of memory the device can reach.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    /// CPU-accessible base pointer.
    cpu: NonNull<u8>,
    /// Device-visible bus address of `cpu`.
    bus: u64,
    /// Size in bytes.
    size: usize,
}

impl MemoryRegion {
    /// Describe an externally provided region.
    ///
    /// # Safety
    /// - `cpu` must be valid for reads and writes of `size` bytes
    /// - `bus` must be the device-visible address of `cpu`
    /// - the memory must stay valid and unused by anything else for the
    ///   rest of the program
    pub unsafe fn new(cpu: NonNull<u8>, bus: u64, size: usize) -> Self {
        Self { cpu, bus, size }
    }

    /// Allocate a zeroed, page-aligned, identity-mapped region.
    ///
    /// The memory is never returned to the allocator: like firmware DMA
    /// memory it lives until the program ends.
    pub fn allocate(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(PoolError::InvalidRegion);
        }
        let layout =
            Layout::from_size_align(align_up(size, PAGE_SIZE), PAGE_SIZE).map_err(|_| PoolError::InvalidRegion)?;

        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let cpu = NonNull::new(ptr).ok_or(PoolError::OutOfMemory)?;

        Ok(Self {
            cpu,
            bus: cpu.as_ptr() as u64,
            size: layout.size(),
        })
    }

    /// CPU pointer to the start of the region.
    pub fn cpu_ptr(&self) -> NonNull<u8> {
        self.cpu
    }

    /// Bus address of the start of the region.
    pub fn bus_addr(&self) -> u64 {
        self.bus
    }

    /// Region size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check if region is usable for DMA (page-aligned bus address, non-empty).
    pub fn is_usable(&self) -> bool {
        self.bus as usize % PAGE_SIZE == 0 && self.size > 0
    }
}

// SAFETY: the region is plain memory; ownership of its contents is handed
// out through the pool, which serialises access.
unsafe impl Send for MemoryRegion {}
unsafe impl Sync for MemoryRegion {}
