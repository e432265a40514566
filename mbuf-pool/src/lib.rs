//! Packet buffer pool for ring-based NIC drivers.
//!
//! This crate provides the buffers that move between a driver's descriptor
//! rings and the application, plus the fixed-population pool they come from.
//!
//! # Design
//!
//! - **Fixed population**: every [`Mbuf`] is created once, when the pool is
//!   built. Afterwards buffers only *move* (`Box<Mbuf>` ownership), so the
//!   RX/TX hot paths never touch the heap allocator.
//! - **Bulk allocation**: [`MbufPool::alloc_bulk`] is all-or-nothing, so a
//!   refill either gets its whole batch or leaves the pool untouched.
//! - **Thread-safe**: the free list sits behind a spin lock; it is the only
//!   state shared between queues.
//!
//! # Usage
//!
//! ```ignore
//! use mbuf_pool::{MbufPool, DEFAULT_BUF_SIZE};
//!
//! // Identity-mapped heap memory (hosted builds, tests)
//! let pool = MbufPool::with_capacity(1024, DEFAULT_BUF_SIZE)?;
//!
//! // Or carve the pool out of firmware-provided DMA memory
//! let region = unsafe { MemoryRegion::new(cpu, bus, size) };
//! let pool = unsafe { MbufPool::new(region, DEFAULT_BUF_SIZE, 1024)? };
//!
//! let mut m = pool.alloc(port_id).ok_or(PoolError::Exhausted)?;
//! m.append(frame)?;
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod mbuf;
pub mod pool;
pub mod region;

pub use mbuf::{Mbuf, MbufChain, OlFlags, PacketType, DEFAULT_BUF_SIZE, MBUF_HEADROOM};
pub use pool::MbufPool;
pub use region::{align_up, MemoryRegion, PAGE_SIZE};

use core::fmt;

// ============================================================================
// Error types
// ============================================================================

/// Buffer pool errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Not enough free buffers to satisfy the request.
    Exhausted,
    /// Requested a pool of 0 buffers.
    ZeroBuffers,
    /// Buffer size cannot hold the headroom plus any data.
    BufferTooSmall,
    /// Memory region is empty, misaligned or too small for the pool.
    InvalidRegion,
    /// Backing memory could not be allocated.
    OutOfMemory,
    /// Not enough tailroom in the buffer for the requested data.
    NoRoom,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "Buffer pool exhausted"),
            Self::ZeroBuffers => write!(f, "Pool must hold at least one buffer"),
            Self::BufferTooSmall => write!(f, "Buffer size too small"),
            Self::InvalidRegion => write!(f, "Invalid memory region"),
            Self::OutOfMemory => write!(f, "Out of memory"),
            Self::NoRoom => write!(f, "Not enough room in buffer"),
        }
    }
}

/// Result type for pool operations.
pub type Result<T> = core::result::Result<T, PoolError>;
