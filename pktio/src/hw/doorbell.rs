//! Tail doorbell.
//!
//! The tail write is the only point where the device learns that new
//! descriptors are ready, so each queue owns exactly one doorbell.

use core::ptr::NonNull;

/// Publishes a ring's producer index to the device.
///
/// Callers issue writes in increasing ring order and only after a store
/// fence covering the descriptors being published.
#[cfg_attr(test, mockall::automock)]
pub trait Doorbell: Send {
    /// Make slots up to `tail` visible to the device.
    fn publish_tail(&mut self, tail: u16);
}

/// Doorbell backed by a 32-bit MMIO tail register.
#[derive(Debug)]
pub struct MmioDoorbell {
    reg: NonNull<u32>,
}

impl MmioDoorbell {
    /// Create a doorbell for the tail register at `addr`.
    ///
    /// # Safety
    /// `addr` must be a mapped, 4-byte aligned device register that stays
    /// valid for the lifetime of the doorbell and is written by nothing else.
    pub unsafe fn new(addr: u64) -> Option<Self> {
        NonNull::new(addr as *mut u32).map(|reg| Self { reg })
    }
}

impl Doorbell for MmioDoorbell {
    #[inline]
    fn publish_tail(&mut self, tail: u16) {
        // SAFETY: register validity is guaranteed by new().
        unsafe { core::ptr::write_volatile(self.reg.as_ptr(), tail as u32) }
    }
}

// SAFETY: the register belongs to one queue; moving the queue to another
// thread moves the only writer.
unsafe impl Send for MmioDoorbell {}
