//! Receive path against the simulated NIC.

mod common;

use common::*;
use mbuf_pool::{OlFlags, PacketType, DEFAULT_BUF_SIZE};
use morpheus_pktio::offload::{PTYPE_IPV4, PTYPE_TCP};
use morpheus_pktio::{RxDesc, RxStatus};

#[test]
fn test_simple_receive_delivers_payload() {
    let pool = pool(32);
    let mut rx = rx_queue(&pool, rx_config(16, 4, false));

    let frame: Vec<u8> = (0..60u8).collect();
    assert!(rx.nic.receive(&frame, true));

    let mut pkts = slots(4);
    assert_eq!(rx.queue.receive(&mut pkts), 1);
    let m = pkts[0].take().unwrap();
    assert_eq!(m.data(), &frame[..]);
    assert_eq!(m.pkt_len, 60);
    assert_eq!(m.nb_segs, 1);
    assert_eq!(m.port, 0);
    pool.free(m);
}

#[test]
fn test_scattered_three_descriptors() {
    let pool = pool(32);
    let mut rx = rx_queue(&pool, rx_config(16, 4, true));
    let mut pkts = slots(4);

    assert!(rx.nic.receive(&[0xA1; 512], false));
    assert_eq!(rx.queue.receive(&mut pkts), 0, "first segment alone is not a packet");
    assert!(rx.nic.receive(&[0xB2; 512], false));
    assert_eq!(rx.queue.receive(&mut pkts), 0, "two segments are not a packet");
    assert!(rx.nic.receive(&[0xC3; 40], true));
    assert_eq!(rx.queue.receive(&mut pkts), 1);

    let m = pkts[0].take().unwrap();
    assert_eq!(m.pkt_len, 1064);
    assert_eq!(m.nb_segs, 3);
    let bytes = flatten(&m);
    assert_eq!(bytes.len(), 1064);
    assert!(bytes[..512].iter().all(|&b| b == 0xA1));
    assert!(bytes[512..1024].iter().all(|&b| b == 0xB2));
    assert!(bytes[1024..].iter().all(|&b| b == 0xC3));
    pool.free(m);
}

#[test]
fn test_failed_refill_reobserves_completions() {
    // 8 slots posted at start, 3 left over for a refill of 4.
    let pool = pool(11);
    let mut rx = rx_queue(&pool, rx_config(8, 4, false));
    let mut pkts = slots(8);

    assert!(rx.nic.receive(&[0x00; 64], true));
    assert_eq!(rx.queue.receive(&mut pkts), 1);
    let held = pkts[0].take().unwrap();

    for b in 1..=3u8 {
        assert!(rx.nic.receive(&[b; 64], true));
    }
    let before = rx.queue.held_buffers();
    assert_eq!(rx.queue.receive(&mut pkts), 0);
    assert_eq!(rx.queue.next_dd(), 1, "cursor rolled back to the first unclaimed slot");
    assert_eq!(rx.queue.held_buffers(), before, "no slot claimed");
    assert_eq!(rx.queue.stats().alloc_failures, 1);
    assert_eq!(rx.port_stats.rx_mbuf_alloc_failed(), 1);
    assert_eq!(rx.doorbell.tails(), [7], "no doorbell for a failed refill");

    // Still short: fails the same way.
    assert_eq!(rx.queue.receive(&mut pkts), 0);
    assert_eq!(rx.queue.next_dd(), 1);
    assert_eq!(rx.port_stats.rx_mbuf_alloc_failed(), 2);

    pool.free(held);
    assert_eq!(rx.queue.receive(&mut pkts), 3);
    for (i, slot) in pkts.iter_mut().take(3).enumerate() {
        let m = slot.take().unwrap();
        assert_eq!(m.data()[0], i as u8 + 1, "same completions, in order");
        pool.free(m);
    }
    assert_eq!(rx.queue.next_dd(), 4);
    assert_eq!(rx.doorbell.tails(), [7, 3]);
}

#[test]
fn test_refill_wraps_around_ring() {
    let pool = pool(16);
    let mut rx = rx_queue(&pool, rx_config(8, 4, false));
    let mut pkts = slots(4);
    let mut seen = 0u32;

    for round in 0..5 {
        for _ in 0..4 {
            assert!(rx.nic.receive(&[round as u8; 100], true), "round {}", round);
        }
        assert_eq!(rx.queue.receive(&mut pkts), 4);
        for m in pkts.iter_mut().filter_map(Option::take) {
            assert_eq!(m.data()[0], round as u8);
            pool.free(m);
            seen += 1;
        }
        assert!(rx.queue.next_dd() < 8);
        assert!(rx.queue.next_trigger() < 8);
    }

    assert_eq!(seen, 20);
    assert_eq!(rx.doorbell.tails(), [7, 3, 7, 3, 7, 3]);
    assert_eq!(rx.queue.held_buffers(), 8);
    assert_eq!(pool.in_use(), 8);
}

#[test]
fn test_empty_poll_changes_nothing() {
    let pool = pool(16);
    let mut rx = rx_queue(&pool, rx_config(8, 4, true));
    let mut pkts = slots(4);

    let cursors = (rx.queue.next_dd(), rx.queue.next_alloc(), rx.queue.next_trigger());
    for _ in 0..10 {
        assert_eq!(rx.queue.receive(&mut pkts), 0);
    }
    assert_eq!(cursors, (rx.queue.next_dd(), rx.queue.next_alloc(), rx.queue.next_trigger()));
    assert!(!rx.queue.has_partial());
    assert_eq!(rx.doorbell.tails(), [7]);
    assert_eq!(rx.queue.stats().polls, 10);
}

#[test]
fn test_offload_decode() {
    let pool = pool(32);
    let mut rx = rx_queue(&pool, rx_config(16, 4, false));
    let mut pkts = slots(4);

    let pkt_info = ((PTYPE_IPV4 | PTYPE_TCP) << 4) | 0x1;
    assert!(rx.nic.receive_with(&[0; 64], true, |d| {
        d.with_pkt_info(pkt_info, 0x5555_AAAA).with_vlan(7)
    }));
    assert_eq!(rx.queue.receive(&mut pkts), 1);

    let m = pkts[0].take().unwrap();
    assert_eq!(m.rss_hash, 0x5555_AAAA);
    assert_eq!(m.ol_flags, OlFlags::RX_RSS_HASH);
    assert_eq!(
        m.packet_type,
        PacketType::L2_ETHER | PacketType::L3_IPV4 | PacketType::L4_TCP
    );
    pool.free(m);
}

#[test]
fn test_offload_decode_disabled() {
    let pool = pool(32);
    let mut config = rx_config(16, 4, false);
    config.offload_flags = false;
    let mut rx = rx_queue(&pool, config);
    let mut pkts = slots(4);

    assert!(rx.nic.receive_with(&[0; 64], true, |d| d.with_pkt_info(0x11, 0x77)));
    assert_eq!(rx.queue.receive(&mut pkts), 1);
    let m = pkts[0].take().unwrap();
    assert_eq!(m.rss_hash, 0x77, "hash is copied regardless");
    assert!(m.ol_flags.is_empty());
    assert!(m.packet_type.is_empty());
    pool.free(m);
}

#[test]
fn test_stop_and_restart() {
    let pool = pool(16);
    let mut rx = rx_queue(&pool, rx_config(8, 4, true));
    let mut pkts = slots(4);

    assert!(rx.nic.receive(&[1; 100], false));
    assert_eq!(rx.queue.receive(&mut pkts), 0);
    assert!(rx.queue.has_partial());

    rx.queue.stop();
    assert!(!rx.queue.is_started());
    assert!(!rx.queue.has_partial());
    assert_eq!(pool.available(), 16);
    assert_eq!(rx.queue.receive(&mut pkts), 0);

    rx.queue.start().unwrap();
    assert_eq!(pool.in_use(), 8);
    assert_eq!(rx.queue.next_dd(), 0);
}

#[test]
fn test_length_beyond_buffer_is_contained() {
    let pool = pool(32);
    let mut rx = rx_queue(&pool, rx_config(16, 4, false));
    let mut pkts = slots(4);

    // Device claims more bytes than any buffer holds.
    rx.nic.write(0, RxDesc::writeback(RxStatus::DD | RxStatus::EOP, DEFAULT_BUF_SIZE + 6440));
    assert_eq!(rx.queue.receive(&mut pkts), 1);

    let m = pkts[0].take().unwrap();
    assert_eq!(m.data().len(), m.data_room());
    assert!(m.data().len() < DEFAULT_BUF_SIZE as usize);
    assert_eq!(m.tailroom(), 0);
    assert!(m.ol_flags.contains(OlFlags::RX_RECIP_ERR));
    assert_eq!(rx.queue.stats().length_errors, 1);
    pool.free(m);
}
