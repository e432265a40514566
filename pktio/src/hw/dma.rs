//! Descriptor ring memory.
//!
//! All descriptor accesses are volatile: the device reads and writes the same
//! memory, so the compiler must neither cache nor elide them.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::ptr::NonNull;

use crate::config::ConfigError;
use crate::error::{PktioError, Result};

/// Descriptor rings are aligned to this many bytes.
pub const RING_ALIGN: usize = 128;

/// `len` descriptors of type `D` in device-visible memory.
pub struct DmaRing<D> {
    base: NonNull<D>,
    bus: u64,
    len: u16,
    /// Set when the memory came from `alloc` and must be freed on drop.
    layout: Option<Layout>,
}

impl<D: Copy + Default> DmaRing<D> {
    /// Wrap descriptor memory set up elsewhere (firmware DMA allocation,
    /// driver-owned region).
    ///
    /// # Safety
    /// - `base` must be valid for volatile reads and writes of `len`
    ///   descriptors and suitably aligned for `D`
    /// - `bus` must be the device-visible address of `base`
    /// - the memory must outlive the ring and be used by no other ring
    pub unsafe fn from_raw(base: NonNull<D>, bus: u64, len: u16) -> Self {
        Self {
            base,
            bus,
            len,
            layout: None,
        }
    }

    /// Allocate zeroed, identity-mapped descriptor memory.
    pub fn alloc(len: u16) -> Result<Self> {
        if len == 0 {
            return Err(PktioError::InvalidConfig(ConfigError::RingSizeOutOfRange(0)));
        }
        let align = RING_ALIGN.max(core::mem::align_of::<D>());
        let size = core::mem::size_of::<D>() * len as usize;
        let layout = Layout::from_size_align(size, align).map_err(|_| PktioError::ResourceExhausted)?;

        // SAFETY: size is non-zero for any non-ZST descriptor and len > 0.
        let ptr = unsafe { alloc_zeroed(layout) } as *mut D;
        let base = NonNull::new(ptr).ok_or(PktioError::ResourceExhausted)?;

        Ok(Self {
            base,
            bus: base.as_ptr() as u64,
            len,
            layout: Some(layout),
        })
    }

    /// Number of descriptors.
    #[inline]
    pub fn len(&self) -> u16 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Device-visible address of descriptor 0 (programmed into the base
    /// address registers).
    #[inline]
    pub fn bus_addr(&self) -> u64 {
        self.bus
    }

    /// CPU pointer to descriptor 0.
    #[inline]
    pub fn cpu_ptr(&self) -> NonNull<D> {
        self.base
    }

    /// Pointer to descriptor `idx`, for prefetching.
    #[inline]
    pub fn desc_ptr(&self, idx: u16) -> *const D {
        debug_assert!(idx < self.len);
        self.base.as_ptr().wrapping_add(idx as usize)
    }

    #[inline]
    pub fn read(&self, idx: u16) -> D {
        debug_assert!(idx < self.len);
        // SAFETY: idx < len and the memory is valid per construction.
        unsafe { core::ptr::read_volatile(self.base.as_ptr().add(idx as usize)) }
    }

    #[inline]
    pub fn write(&mut self, idx: u16, desc: D) {
        debug_assert!(idx < self.len);
        // SAFETY: as read(); &mut self makes this the only CPU writer.
        unsafe { core::ptr::write_volatile(self.base.as_ptr().add(idx as usize), desc) }
    }

    /// Overwrite every descriptor with its default (all-zero) value.
    pub fn clear(&mut self) {
        for i in 0..self.len {
            self.write(i, D::default());
        }
    }
}

impl<D> Drop for DmaRing<D> {
    fn drop(&mut self) {
        if let Some(layout) = self.layout.take() {
            // SAFETY: allocated in alloc() with exactly this layout.
            unsafe { dealloc(self.base.as_ptr() as *mut u8, layout) }
        }
    }
}

impl<D> core::fmt::Debug for DmaRing<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaRing")
            .field("bus", &format_args!("{:#x}", self.bus))
            .field("len", &self.len)
            .field("owned", &self.layout.is_some())
            .finish()
    }
}

// SAFETY: the ring exclusively owns (or exclusively borrows, for from_raw)
// its descriptor memory.
unsafe impl<D: Send> Send for DmaRing<D> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{RxDesc, TxDesc, TxFlags};

    #[test]
    fn test_alloc_is_zeroed_and_aligned() {
        let ring = DmaRing::<RxDesc>::alloc(16).unwrap();
        assert_eq!(ring.len(), 16);
        assert_eq!(ring.bus_addr() % RING_ALIGN as u64, 0);
        for i in 0..16 {
            assert_eq!(ring.read(i), RxDesc::default());
        }
    }

    #[test]
    fn test_alloc_zero_len() {
        assert!(DmaRing::<TxDesc>::alloc(0).is_err());
    }

    #[test]
    fn test_write_read_clear() {
        let mut ring = DmaRing::<TxDesc>::alloc(8).unwrap();
        let d = TxDesc::new(0x1000, 64, 0, TxFlags::LAST);
        ring.write(7, d);
        assert_eq!(ring.read(7), d);
        ring.clear();
        assert_eq!(ring.read(7), TxDesc::default());
    }

    #[test]
    fn test_from_raw_borrows_memory() {
        let mut backing = [RxDesc::default(); 8];
        let base = NonNull::new(backing.as_mut_ptr()).unwrap();
        {
            let mut ring = unsafe { DmaRing::from_raw(base, 0x4000, 8) };
            ring.write(3, RxDesc::read(0x200));
            assert_eq!(ring.bus_addr(), 0x4000);
        }
        assert_eq!(backing[3].pkt_addr(), 0x200);
    }
}
