//! Receive queue.
//!
//! # Cursors
//! - `next_dd`: next slot expected to complete
//! - `next_alloc..=next_trigger`: slots the next refill repopulates
//!
//! A poll runs in three steps so that a failed refill leaves nothing to undo:
//!
//! 1. scan completed descriptors without taking any buffer
//! 2. if the scan crossed the trigger (or wrapped), get the whole refill
//!    batch from the pool; on failure roll the cursor back and return 0
//! 3. claim the scanned buffers, then install the refill and ring the
//!    doorbell
//!
//! Partially reassembled packets (scattered mode) are queue state and only
//! change in step 3.

mod refill;
mod scatter;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::debug;
use mbuf_pool::{Mbuf, OlFlags};

use crate::config::RxQueueConfig;
use crate::desc::RxDesc;
use crate::error::{PktioError, Result};
use crate::hw::{lfence, prefetch, sfence, DmaRing, Doorbell};
use crate::offload;
use crate::pool::BufferPool;
use crate::ring;
use crate::stats::{PortStats, RxQueueStats};
use crate::RX_BUF_ALIGN;

pub(crate) use scatter::PartialPacket;

/// Result of the read-only scan.
#[derive(Debug, Clone, Copy)]
struct Scan {
    /// Slot the scan started at.
    start: u16,
    /// Completed descriptors found.
    count: u16,
    /// Passed the last slot of the ring.
    wrapped: bool,
}

/// One receive ring with its shadow array and refill state.
pub struct RxQueue<P: BufferPool, B: Doorbell> {
    config: RxQueueConfig,
    ring: DmaRing<RxDesc>,
    /// Buffer posted in each ring slot.
    sw_ring: Vec<Option<Box<Mbuf>>>,
    /// Refill batch taken from the pool before any slot is claimed.
    staged: Vec<Option<Box<Mbuf>>>,
    /// Descriptors copied out by the scan, consumed by the claim.
    scanned: Vec<RxDesc>,
    /// Packet being reassembled across polls (scattered mode).
    partial: Option<PartialPacket>,
    pool: Arc<P>,
    doorbell: B,
    port_stats: Arc<PortStats>,
    stats: RxQueueStats,
    next_dd: u16,
    next_alloc: u16,
    next_trigger: u16,
    started: bool,
}

impl<P: BufferPool, B: Doorbell> RxQueue<P, B> {
    /// Create a stopped queue.
    pub fn new(
        config: RxQueueConfig,
        ring: DmaRing<RxDesc>,
        pool: Arc<P>,
        doorbell: B,
        port_stats: Arc<PortStats>,
    ) -> Result<Self> {
        config.validate()?;
        if ring.len() != config.nb_desc {
            return Err(PktioError::RingSizeMismatch {
                expected: config.nb_desc,
                actual: ring.len() as usize,
            });
        }

        let n = config.nb_desc as usize;
        let thresh = config.alloc_thresh as usize;
        Ok(Self {
            config,
            ring,
            sw_ring: (0..n).map(|_| None).collect(),
            staged: (0..thresh).map(|_| None).collect(),
            scanned: Vec::with_capacity(thresh),
            partial: None,
            pool,
            doorbell,
            port_stats,
            stats: RxQueueStats::default(),
            next_dd: 0,
            next_alloc: 0,
            next_trigger: config.alloc_thresh - 1,
            started: false,
        })
    }

    /// Post a buffer in every slot and hand the ring to the device.
    ///
    /// A started queue is stopped first.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            self.stop();
        }

        self.pool
            .alloc_bulk(&mut self.sw_ring)
            .map_err(|_| PktioError::ResourceExhausted)?;

        let port = self.config.port_id;
        for i in 0..self.config.nb_desc {
            let Some(m) = self.sw_ring[i as usize].as_deref_mut() else {
                continue;
            };
            m.reset_aligned(port, RX_BUF_ALIGN);
            let addr = m.data_iova();
            if addr % RX_BUF_ALIGN as u64 != 0 {
                self.release_buffers();
                return Err(PktioError::MisalignedBuffer { slot: i });
            }
            self.ring.write(i, RxDesc::read(addr));
        }

        self.next_dd = 0;
        self.next_alloc = 0;
        self.next_trigger = self.config.alloc_thresh - 1;
        debug_assert!(self.partial.is_none());

        sfence();
        self.doorbell.publish_tail(self.config.nb_desc - 1);
        self.started = true;

        debug!(
            "rxq {}/{}: started, {} descriptors, refill batch {}{}",
            self.config.port_id,
            self.config.queue_id,
            self.config.nb_desc,
            self.config.alloc_thresh,
            if self.config.scattered { ", scattered" } else { "" }
        );
        Ok(())
    }

    /// Clear the ring and return every buffer the queue holds to the pool.
    ///
    /// The device must already have stopped using the ring.
    pub fn stop(&mut self) {
        let held = self.held_buffers();
        self.ring.clear();
        self.release_buffers();
        self.next_dd = 0;
        self.next_alloc = 0;
        self.next_trigger = self.config.alloc_thresh - 1;
        if self.started {
            debug!(
                "rxq {}/{}: stopped, {} buffers returned",
                self.config.port_id, self.config.queue_id, held
            );
        }
        self.started = false;
    }

    fn release_buffers(&mut self) {
        for slot in self.sw_ring.iter_mut().chain(self.staged.iter_mut()) {
            if let Some(m) = slot.take() {
                self.pool.free(m);
            }
        }
        if let Some(p) = self.partial.take() {
            self.pool.free(p.into_head());
        }
    }

    /// Receive up to `rx_pkts.len()` packets into the leading empty slots of
    /// `rx_pkts`, returning how many were written.
    ///
    /// At most `alloc_thresh` descriptors are examined per call.
    pub fn receive(&mut self, rx_pkts: &mut [Option<Box<Mbuf>>]) -> u16 {
        if !self.started || rx_pkts.is_empty() {
            return 0;
        }
        self.stats.polls += 1;
        if self.config.scattered {
            self.receive_scattered(rx_pkts)
        } else {
            self.receive_simple(rx_pkts)
        }
    }

    /// Single-buffer packets: one completed descriptor is one packet.
    fn receive_simple(&mut self, rx_pkts: &mut [Option<Box<Mbuf>>]) -> u16 {
        let scan = self.scan(rx_pkts.len());
        if !self.begin_refill(&scan) {
            return 0;
        }

        let decode = self.config.offload_flags;
        let mut nb_rcv = 0usize;
        for k in 0..scan.count {
            let idx = ring::advance(scan.start, k, self.config.nb_desc);
            let desc = self.scanned[k as usize];
            let Some(mut m) = self.sw_ring[idx as usize].take() else {
                continue;
            };

            let fits = self.take_length(&mut m, &desc);
            offload::apply(&mut m, &desc, decode);
            if !fits {
                m.ol_flags |= OlFlags::RX_RECIP_ERR;
            }

            self.stats.packets += 1;
            self.stats.bytes += m.data_len() as u64;
            debug_assert!(rx_pkts[nb_rcv].is_none(), "receive into an occupied slot");
            rx_pkts[nb_rcv] = Some(m);
            nb_rcv += 1;
        }

        self.finish_refill();
        nb_rcv as u16
    }

    /// Set a claimed buffer's length from its descriptor.
    ///
    /// A length beyond the buffer's data room is cut to the room and counted
    /// in `length_errors`; returns false in that case.
    fn take_length(&mut self, m: &mut Mbuf, desc: &RxDesc) -> bool {
        if m.set_data_len(desc.length() as usize).is_ok() {
            return true;
        }
        self.stats.length_errors += 1;
        let room = m.data_room();
        // Cannot fail: the room is the bound set_data_len checks.
        let _ = m.set_data_len(room);
        false
    }

    /// Copy out completed descriptors starting at `next_dd`, advancing the
    /// cursor past them.
    fn scan(&mut self, nb_pkts: usize) -> Scan {
        let n = self.config.nb_desc;
        let limit = nb_pkts.min(self.config.alloc_thresh as usize) as u16;
        let start = self.next_dd;

        self.scanned.clear();
        let mut next_dd = start;
        let mut wrapped = false;
        while (self.scanned.len() as u16) < limit {
            let desc = self.ring.read(next_dd);
            if !desc.is_done() {
                break;
            }
            #[cfg(feature = "debug-rx")]
            dump_rxd(next_dd, &desc);

            self.scanned.push(desc);
            next_dd += 1;
            if next_dd == n {
                next_dd = 0;
                wrapped = true;
            }
            self.prefetch_slot(next_dd);
        }
        lfence();

        self.next_dd = next_dd;
        Scan {
            start,
            count: self.scanned.len() as u16,
            wrapped,
        }
    }

    /// Warm the caches for slot `idx`: its buffer header always, and on a
    /// 4-descriptor boundary the next cache line of descriptors and of
    /// shadow entries.
    #[inline(always)]
    fn prefetch_slot(&self, idx: u16) {
        let i = idx as usize;
        if let Some(m) = self.sw_ring[i].as_deref() {
            prefetch(m as *const Mbuf);
        }
        if idx & 0x3 == 0 {
            prefetch(self.ring.desc_ptr(idx));
            prefetch(self.sw_ring[i..].as_ptr());
        }
    }

    /// Staged refill needed for this scan, if any. Returns false when the
    /// pool could not supply it; the cursor is then rolled back.
    fn begin_refill(&mut self, scan: &Scan) -> bool {
        if !self.refill_due(self.next_dd, scan.wrapped) {
            return true;
        }
        if self.stage_refill().is_ok() {
            return true;
        }
        self.next_dd = rollback_cursor(self.next_dd, scan.count, self.config.nb_desc);
        debug_assert_eq!(self.next_dd, scan.start);
        false
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &RxQueueConfig {
        &self.config
    }

    pub fn stats(&self) -> &RxQueueStats {
        &self.stats
    }

    pub fn port_stats(&self) -> &PortStats {
        &self.port_stats
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Device-visible address of the descriptor ring.
    pub fn ring_bus_addr(&self) -> u64 {
        self.ring.bus_addr()
    }

    pub fn next_dd(&self) -> u16 {
        self.next_dd
    }

    pub fn next_alloc(&self) -> u16 {
        self.next_alloc
    }

    pub fn next_trigger(&self) -> u16 {
        self.next_trigger
    }

    /// A scattered packet is waiting for its last segment.
    pub fn has_partial(&self) -> bool {
        self.partial.is_some()
    }

    /// Buffers owned by the queue: posted slots, staged refill and the
    /// partially reassembled packet.
    pub fn held_buffers(&self) -> usize {
        let posted = self.sw_ring.iter().filter(|s| s.is_some()).count();
        let staged = self.staged.iter().filter(|s| s.is_some()).count();
        let partial = self.partial.as_ref().map_or(0, PartialPacket::segments);
        posted + staged + partial
    }
}

impl<P: BufferPool, B: Doorbell> Drop for RxQueue<P, B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Undo a scan of `count` descriptors ending at `cursor`: the next poll
/// resumes from the first of them.
#[inline]
pub(crate) fn rollback_cursor(cursor: u16, count: u16, nb_desc: u16) -> u16 {
    ring::retreat(cursor, count, nb_desc)
}

#[cfg(feature = "debug-rx")]
fn dump_rxd(idx: u16, d: &RxDesc) {
    log::trace!(
        "rxd[{}]: pkt_info {:#06x} hdr_info {:#06x} rss {:#010x} staterr {:#010x} \
         length {} vlan {} glort {:#x} timestamp {:#x}",
        idx,
        d.pkt_info(),
        d.hdr_info(),
        d.rss(),
        d.staterr(),
        d.length(),
        d.vlan(),
        d.glort(),
        d.timestamp()
    );
}
