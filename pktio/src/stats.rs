//! Queue and port counters.
//!
//! Queue counters are plain integers: a queue is driven by one thread. The
//! port counters are shared between that port's queues and use atomics.

use core::sync::atomic::{AtomicU64, Ordering};

/// Per receive queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxQueueStats {
    /// Packets handed to the application.
    pub packets: u64,
    /// Bytes handed to the application.
    pub bytes: u64,
    /// Refills that failed for lack of buffers.
    pub alloc_failures: u64,
    /// Calls to receive on a started queue.
    pub polls: u64,
    /// Descriptors reporting more bytes than their buffer holds.
    pub length_errors: u64,
}

/// Per transmit queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxQueueStats {
    pub packets: u64,
    pub segments: u64,
    pub bytes: u64,
    /// Segments returned to the pool after completion.
    pub reclaimed: u64,
    /// Batches cut short for lack of free descriptors.
    pub backpressure: u64,
    /// Batches cut short by a malformed packet.
    pub malformed: u64,
    /// Descriptors posted with RS set.
    pub reports: u64,
}

/// Device-wide counters.
#[derive(Debug, Default)]
pub struct PortStats {
    rx_mbuf_alloc_failed: AtomicU64,
}

impl PortStats {
    pub const fn new() -> Self {
        Self {
            rx_mbuf_alloc_failed: AtomicU64::new(0),
        }
    }

    /// RX refills that could not get buffers, across all queues.
    pub fn rx_mbuf_alloc_failed(&self) -> u64 {
        self.rx_mbuf_alloc_failed.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_rx_mbuf_alloc_failed(&self) {
        self.rx_mbuf_alloc_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.rx_mbuf_alloc_failed.store(0, Ordering::Relaxed);
    }
}
