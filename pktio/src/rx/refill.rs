//! Batched RX refill.
//!
//! Buffers are replaced `alloc_thresh` slots at a time, always the slots
//! `next_alloc..=next_trigger`. The device is told about them with a single
//! tail write.

use log::warn;

use crate::desc::RxDesc;
use crate::error::{PktioError, Result};
use crate::hw::{sfence, Doorbell};
use crate::pool::BufferPool;
use crate::RX_BUF_ALIGN;

use super::RxQueue;

impl<P: BufferPool, B: Doorbell> RxQueue<P, B> {
    /// A scan ending at `next_dd` has consumed the trigger slot.
    #[inline]
    pub(super) fn refill_due(&self, next_dd: u16, wrapped: bool) -> bool {
        next_dd > self.next_trigger || wrapped
    }

    /// Take the next refill batch from the pool, all or nothing.
    pub(super) fn stage_refill(&mut self) -> Result<()> {
        if self.staged.iter().all(Option::is_some) {
            return Ok(());
        }
        match self.pool.alloc_bulk(&mut self.staged) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    "rxq {}/{}: failed to alloc mbuf ({}), {} needed",
                    self.config.port_id,
                    self.config.queue_id,
                    e,
                    self.staged.len()
                );
                self.stats.alloc_failures += 1;
                self.port_stats.inc_rx_mbuf_alloc_failed();
                Err(PktioError::ResourceExhausted)
            }
        }
    }

    /// Post the staged batch into `next_alloc..=next_trigger`, publish it and
    /// move the trigger on. No-op when nothing is staged.
    pub(super) fn finish_refill(&mut self) {
        if self.staged.iter().any(Option::is_none) {
            return;
        }

        let port = self.config.port_id;
        let mut k = 0;
        while self.next_alloc <= self.next_trigger {
            let idx = self.next_alloc;
            if let Some(mut m) = self.staged[k].take() {
                m.reset_aligned(port, RX_BUF_ALIGN);
                debug_assert_eq!(m.data_iova() % RX_BUF_ALIGN as u64, 0);
                self.ring.write(idx, RxDesc::read(m.data_iova()));

                let old = self.sw_ring[idx as usize].replace(m);
                debug_assert!(old.is_none(), "refill into an occupied slot");
                if let Some(old) = old {
                    self.pool.free(old);
                }
            }
            k += 1;
            self.next_alloc += 1;
        }

        sfence();
        self.doorbell.publish_tail(self.next_trigger);

        self.next_trigger += self.config.alloc_thresh;
        if self.next_trigger >= self.config.nb_desc {
            self.next_trigger = self.config.alloc_thresh - 1;
            self.next_alloc = 0;
        }
    }
}
