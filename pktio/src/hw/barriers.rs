//! Memory barriers for descriptor rings.
//!
//! Descriptors live in memory the device writes behind the CPU's back, so
//! ordinary atomics orderings are not enough on their own: the fences below
//! also order against device-visible loads and stores.

use core::sync::atomic::{compiler_fence, Ordering};

/// Order earlier loads before later loads.
///
/// Issue after observing a DD/DONE bit and before reading the rest of the
/// descriptor or the buffer it points to.
#[inline(always)]
pub fn lfence() {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: lfence has no preconditions; SSE2 is baseline on x86_64.
    unsafe {
        core::arch::x86_64::_mm_lfence();
    }
    #[cfg(not(target_arch = "x86_64"))]
    core::sync::atomic::fence(Ordering::Acquire);
    compiler_fence(Ordering::Acquire);
}

/// Order earlier stores before later stores.
///
/// Issue after writing descriptors and before the doorbell write that hands
/// them to the device.
#[inline(always)]
pub fn sfence() {
    compiler_fence(Ordering::Release);
    #[cfg(target_arch = "x86_64")]
    // SAFETY: sfence has no preconditions; SSE is baseline on x86_64.
    unsafe {
        core::arch::x86_64::_mm_sfence();
    }
    #[cfg(not(target_arch = "x86_64"))]
    core::sync::atomic::fence(Ordering::Release);
}

