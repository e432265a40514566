//! Scattered receive: packets spanning several descriptors.

use alloc::boxed::Box;

use mbuf_pool::{Mbuf, MbufChain, OlFlags};

use crate::hw::{prefetch, Doorbell};
use crate::offload;
use crate::pool::BufferPool;
use crate::ring;

use super::RxQueue;

/// Packet whose last segment has not arrived yet.
///
/// Segments are linked at the chain's tail as they complete; the head
/// accounts `pkt_len` and `nb_segs` for all of them.
pub(crate) struct PartialPacket {
    chain: MbufChain,
    /// Some segment was longer than its buffer.
    truncated: bool,
}

impl PartialPacket {
    fn new(head: Box<Mbuf>, truncated: bool) -> Self {
        Self {
            chain: MbufChain::new(head),
            truncated,
        }
    }

    fn push(&mut self, seg: Box<Mbuf>, truncated: bool) {
        self.chain.push(seg);
        self.truncated |= truncated;
    }

    pub(crate) fn segments(&self) -> usize {
        self.chain.segments()
    }

    pub(crate) fn into_head(self) -> Box<Mbuf> {
        self.chain.into_head()
    }
}

impl<P: BufferPool, B: Doorbell> RxQueue<P, B> {
    /// Reassembling receive. Descriptors without EOP extend the packet in
    /// progress, which survives across calls until its EOP descriptor shows
    /// up.
    pub(super) fn receive_scattered(&mut self, rx_pkts: &mut [Option<Box<Mbuf>>]) -> u16 {
        let scan = self.scan(rx_pkts.len());
        if !self.begin_refill(&scan) {
            return 0;
        }

        let decode = self.config.offload_flags;
        let mut partial = self.partial.take();
        let mut nb_rcv = 0usize;
        for k in 0..scan.count {
            let idx = ring::advance(scan.start, k, self.config.nb_desc);
            let desc = self.scanned[k as usize];
            let Some(mut m) = self.sw_ring[idx as usize].take() else {
                continue;
            };

            let fits = self.take_length(&mut m, &desc);
            match partial {
                None => partial = Some(PartialPacket::new(m, !fits)),
                Some(ref mut p) => p.push(m, !fits),
            }

            if !desc.is_eop() {
                continue;
            }

            let Some(p) = partial.take() else {
                continue;
            };
            let truncated = p.truncated;
            let mut head = p.into_head();
            offload::apply(&mut head, &desc, decode);
            if truncated {
                head.ol_flags |= OlFlags::RX_RECIP_ERR;
            }
            prefetch(head.data().as_ptr());

            self.stats.packets += 1;
            self.stats.bytes += head.pkt_len as u64;
            debug_assert!(rx_pkts[nb_rcv].is_none(), "receive into an occupied slot");
            rx_pkts[nb_rcv] = Some(head);
            nb_rcv += 1;
        }
        self.partial = partial;

        self.finish_refill();
        nb_rcv as u16
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{complete, out, queue};
    use mbuf_pool::OlFlags;

    #[test]
    fn test_three_segment_packet() {
        let (mut q, pool) = queue(16, 4, true, 32);
        q.start().unwrap();
        let mut pkts = out(4);

        complete(&mut q, 0, 512, false);
        assert_eq!(q.receive(&mut pkts), 0);
        assert!(q.has_partial());

        complete(&mut q, 1, 512, false);
        assert_eq!(q.receive(&mut pkts), 0);
        assert!(q.has_partial());

        complete(&mut q, 2, 40, true);
        assert_eq!(q.receive(&mut pkts), 1);
        assert!(!q.has_partial());

        let m = pkts[0].take().unwrap();
        assert_eq!(m.pkt_len, 1064);
        assert_eq!(m.nb_segs, 3);
        assert_eq!(m.chain_len(), 3);
        let lens: Vec<u16> = m.segments().map(|s| s.data_len()).collect();
        assert_eq!(lens, [512, 512, 40]);
        pool.free(m);
    }

    #[test]
    fn test_metadata_from_last_descriptor() {
        use crate::desc::{RxDesc, RxStatus};

        let (mut q, pool) = queue(8, 4, true, 16);
        q.start().unwrap();
        complete(&mut q, 0, 1000, false);
        q.ring.write(
            1,
            RxDesc::writeback(RxStatus::DD | RxStatus::EOP | RxStatus::VEXT, 200)
                .with_pkt_info(0x1, 0xCAFE)
                .with_vlan(12),
        );

        let mut pkts = out(4);
        assert_eq!(q.receive(&mut pkts), 1);
        let m = pkts[0].take().unwrap();
        assert_eq!(m.pkt_len, 1200);
        assert_eq!(m.vlan_tci, 12);
        assert_eq!(m.rss_hash, 0xCAFE);
        assert!(m.ol_flags.contains(OlFlags::RX_VLAN_PKT | OlFlags::RX_RSS_HASH));
        pool.free(m);
    }

    #[test]
    fn test_oversized_segment_flags_packet() {
        let (mut q, pool) = queue(8, 4, true, 16);
        q.start().unwrap();
        complete(&mut q, 0, 60000, false);
        complete(&mut q, 1, 100, true);

        let mut pkts = out(4);
        assert_eq!(q.receive(&mut pkts), 1);
        let m = pkts[0].take().unwrap();
        let first = m.data_room();
        assert_eq!(m.data_len() as usize, first);
        assert_eq!(m.pkt_len as usize, first + 100);
        assert!(m.ol_flags.contains(OlFlags::RX_RECIP_ERR));
        assert_eq!(q.stats().length_errors, 1);
        pool.free(m);
    }

    #[test]
    fn test_long_chain_keeps_segment_order() {
        let (mut q, pool) = queue(32, 16, true, 64);
        q.start().unwrap();
        for i in 0..15u16 {
            complete(&mut q, i, 100 + i, i == 14);
        }

        let mut pkts = out(16);
        assert_eq!(q.receive(&mut pkts), 1);
        let m = pkts[0].take().unwrap();
        assert_eq!(m.nb_segs, 15);
        let lens: Vec<u16> = m.segments().map(|s| s.data_len()).collect();
        assert_eq!(lens, (100..115).collect::<Vec<u16>>());
        assert_eq!(m.pkt_len, (100..115u32).sum::<u32>());
        pool.free(m);
    }

    #[test]
    fn test_packets_back_to_back_in_one_poll() {
        let (mut q, pool) = queue(16, 8, true, 32);
        q.start().unwrap();
        complete(&mut q, 0, 100, true);
        complete(&mut q, 1, 300, false);
        complete(&mut q, 2, 300, true);
        complete(&mut q, 3, 50, false);

        let mut pkts = out(8);
        assert_eq!(q.receive(&mut pkts), 2);
        assert!(q.has_partial());
        let sizes: Vec<(u32, u16)> = pkts
            .iter()
            .flatten()
            .map(|m| (m.pkt_len, m.nb_segs))
            .collect();
        assert_eq!(sizes, [(100, 1), (600, 2)]);
        assert_eq!(q.held_buffers(), 13, "12 posted plus the partial head");

        for m in pkts.iter_mut().filter_map(Option::take) {
            pool.free(m);
        }
    }
}
