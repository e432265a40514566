//! Transmit queue.
//!
//! # Report status
//! Completion is not tracked per packet. Every `rs_thresh` posted segments
//! the last descriptor of a packet gets RS and its index goes into
//! `rs_tracker`. Hardware sets DONE on that descriptor once everything up to
//! it has been sent, and [`TxQueue::reclaim`] then frees the whole batch
//! from `last_free` through it.
//!
//! # Slot accounting
//! One slot always stays unused so that a full ring (tail one behind head)
//! is distinguishable from an empty one: `nb_free + posted == nb_desc - 1`.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::debug;
use mbuf_pool::{Mbuf, OlFlags};

use crate::config::TxQueueConfig;
use crate::desc::{TxDesc, TxFlags};
use crate::error::{PktioError, Result};
use crate::hw::{lfence, sfence, DmaRing, Doorbell};
use crate::pool::BufferPool;
use crate::ring;
use crate::stats::TxQueueStats;

/// One transmit ring with its shadow array and completion tracking.
pub struct TxQueue<P: BufferPool, B: Doorbell> {
    config: TxQueueConfig,
    ring: DmaRing<TxDesc>,
    /// Segment posted in each slot, until reclaimed.
    sw_ring: Vec<Option<Box<Mbuf>>>,
    /// Slots carrying RS, oldest first.
    rs_tracker: VecDeque<u16>,
    pool: Arc<P>,
    doorbell: B,
    stats: TxQueueStats,
    next_free: u16,
    last_free: u16,
    nb_free: u16,
    nb_used: u16,
    started: bool,
}

impl<P: BufferPool, B: Doorbell> TxQueue<P, B> {
    /// Create a stopped queue.
    pub fn new(config: TxQueueConfig, ring: DmaRing<TxDesc>, pool: Arc<P>, doorbell: B) -> Result<Self> {
        config.validate()?;
        if ring.len() != config.nb_desc {
            return Err(PktioError::RingSizeMismatch {
                expected: config.nb_desc,
                actual: ring.len() as usize,
            });
        }

        let n = config.nb_desc as usize;
        Ok(Self {
            config,
            ring,
            sw_ring: (0..n).map(|_| None).collect(),
            rs_tracker: VecDeque::with_capacity(n / config.rs_thresh as usize + 1),
            pool,
            doorbell,
            stats: TxQueueStats::default(),
            next_free: 0,
            last_free: 0,
            nb_free: 0,
            nb_used: 0,
            started: false,
        })
    }

    /// Reset the ring to empty and hand it to the device.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            self.stop();
        }
        self.ring.clear();
        self.rs_tracker.clear();
        self.next_free = 0;
        self.last_free = 0;
        self.nb_used = 0;
        self.nb_free = self.config.nb_desc - 1;

        sfence();
        self.doorbell.publish_tail(0);
        self.started = true;

        debug!(
            "txq {}/{}: started, {} descriptors, rs_thresh {}, free_thresh {}",
            self.config.port_id,
            self.config.queue_id,
            self.config.nb_desc,
            self.config.rs_thresh,
            self.config.free_thresh
        );
        Ok(())
    }

    /// Clear the ring and free every segment not yet reclaimed.
    ///
    /// The device must already have stopped using the ring.
    pub fn stop(&mut self) {
        self.ring.clear();
        let mut freed = 0usize;
        for slot in self.sw_ring.iter_mut() {
            if let Some(m) = slot.take() {
                self.pool.free_seg(m);
                freed += 1;
            }
        }
        self.rs_tracker.clear();
        self.nb_free = 0;
        self.nb_used = 0;
        if self.started {
            debug!(
                "txq {}/{}: stopped, {} unsent segments freed",
                self.config.port_id, self.config.queue_id, freed
            );
        }
        self.started = false;
    }

    /// Post as many whole packets from the front of `tx_pkts` as fit.
    ///
    /// Posted packets are taken out of their slots. The batch stops at the
    /// first packet that does not fit or is malformed (empty slot, zero
    /// segments, chain shorter or longer than `nb_segs`); it and everything
    /// after it stay with the caller. Returns the number posted.
    pub fn transmit(&mut self, tx_pkts: &mut [Option<Box<Mbuf>>]) -> u16 {
        if !self.started {
            return 0;
        }

        let mut count: u16 = 0;
        for slot in tx_pkts.iter_mut() {
            if self.nb_free < self.config.free_thresh {
                self.reclaim();
            }

            let admitted = match slot.as_deref() {
                Some(mb) => self.admit(mb),
                None => Err(PktioError::MalformedPacket),
            };
            match admitted {
                Ok(()) => {}
                Err(PktioError::ResourceExhausted) => {
                    self.stats.backpressure += 1;
                    break;
                }
                Err(_) => {
                    self.stats.malformed += 1;
                    break;
                }
            }

            let Some(mb) = slot.take() else {
                break;
            };
            self.xmit_pkt(mb);
            count += 1;
        }

        if count > 0 {
            sfence();
            self.doorbell.publish_tail(self.next_free);
        }
        count
    }

    /// Check whether `mb` could be posted right now.
    ///
    /// Fails with `QueueNotStarted` on a stopped queue, `ResourceExhausted`
    /// when fewer slots are free than `mb` has segments, and
    /// `MalformedPacket` when `nb_segs` is zero or disagrees with the chain.
    pub fn admit(&self, mb: &Mbuf) -> Result<()> {
        if !self.started {
            return Err(PktioError::QueueNotStarted);
        }
        let nb_segs = mb.nb_segs;
        if self.nb_free < nb_segs {
            return Err(PktioError::ResourceExhausted);
        }
        if nb_segs == 0 || mb.chain_len() != nb_segs as usize {
            return Err(PktioError::MalformedPacket);
        }
        Ok(())
    }

    /// Write one validated packet into the ring.
    fn xmit_pkt(&mut self, mut mb: Box<Mbuf>) {
        let n = self.config.nb_desc;
        let nb_segs = mb.nb_segs;
        let last_id = ring::advance(self.next_free, nb_segs - 1, n);

        let mut last_flags = TxFlags::LAST;
        if self.nb_used + nb_segs >= self.config.rs_thresh {
            last_flags |= TxFlags::RS;
            self.rs_tracker.push_back(last_id);
            self.nb_used = 0;
            self.stats.reports += 1;
        } else {
            self.nb_used += nb_segs;
        }
        self.nb_free -= nb_segs;

        let mut first_flags = TxFlags::empty();
        if mb.ol_flags.intersects(OlFlags::TX_IP_CKSUM | OlFlags::TX_L4_MASK) {
            first_flags |= TxFlags::CSUM;
        }
        let vlan = if mb.ol_flags.contains(OlFlags::TX_VLAN_PKT) {
            mb.vlan_tci
        } else {
            0
        };

        self.stats.packets += 1;
        self.stats.segments += nb_segs as u64;
        self.stats.bytes += mb.pkt_len as u64;

        let mut next = mb.take_next();
        self.post_segment(mb, vlan, first_flags, last_id, last_flags);
        while let Some(mut seg) = next {
            next = seg.take_next();
            self.post_segment(seg, 0, TxFlags::empty(), last_id, last_flags);
        }
    }

    #[inline]
    fn post_segment(&mut self, seg: Box<Mbuf>, vlan: u16, flags: TxFlags, last_id: u16, last_flags: TxFlags) {
        let idx = self.next_free;
        let flags = if idx == last_id { flags | last_flags } else { flags };
        self.ring.write(idx, TxDesc::new(seg.data_iova(), seg.data_len(), vlan, flags));

        let old = self.sw_ring[idx as usize].replace(seg);
        debug_assert!(old.is_none(), "posting into an unreclaimed slot");
        if let Some(old) = old {
            self.pool.free_seg(old);
        }

        self.next_free = ring::advance(idx, 1, self.config.nb_desc);
    }

    /// Free the batch covered by the oldest completion report, if hardware
    /// has finished it. Returns the number of segments freed.
    pub fn reclaim(&mut self) -> u16 {
        let Some(&next_rs) = self.rs_tracker.front() else {
            return 0;
        };
        if !self.ring.read(next_rs).is_done() {
            return 0;
        }
        lfence();
        self.rs_tracker.pop_front();

        let n = self.config.nb_desc;
        let mut freed = 0;
        if self.last_free > next_rs {
            while self.last_free < n {
                self.free_slot(self.last_free);
                self.last_free += 1;
                freed += 1;
            }
            self.last_free = 0;
        }
        while self.last_free <= next_rs {
            self.free_slot(self.last_free);
            self.last_free += 1;
            freed += 1;
        }
        if self.last_free == n {
            self.last_free = 0;
        }

        self.nb_free += freed;
        self.stats.reclaimed += freed as u64;
        freed
    }

    #[inline]
    fn free_slot(&mut self, idx: u16) {
        if let Some(m) = self.sw_ring[idx as usize].take() {
            self.pool.free_seg(m);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &TxQueueConfig {
        &self.config
    }

    pub fn stats(&self) -> &TxQueueStats {
        &self.stats
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Device-visible address of the descriptor ring.
    pub fn ring_bus_addr(&self) -> u64 {
        self.ring.bus_addr()
    }

    pub fn next_free(&self) -> u16 {
        self.next_free
    }

    pub fn last_free(&self) -> u16 {
        self.last_free
    }

    /// Slots available for new segments.
    pub fn nb_free(&self) -> u16 {
        self.nb_free
    }

    /// Segments posted since the last RS request.
    pub fn nb_used(&self) -> u16 {
        self.nb_used
    }

    /// Completion reports requested and not yet reclaimed.
    pub fn pending_reports(&self) -> usize {
        self.rs_tracker.len()
    }

    /// Segments posted and not yet reclaimed.
    pub fn posted(&self) -> usize {
        self.sw_ring.iter().filter(|s| s.is_some()).count()
    }
}

impl<P: BufferPool, B: Doorbell> Drop for TxQueue<P, B> {
    fn drop(&mut self) {
        self.stop();
    }
}
