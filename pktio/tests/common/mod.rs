//! Common test utilities: a simulated NIC that plays the device side of the
//! rings, and a doorbell that records every tail write.

#![allow(dead_code)]

use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use mbuf_pool::{Mbuf, MbufPool, DEFAULT_BUF_SIZE};
use morpheus_pktio::{
    DmaRing, Doorbell, PortStats, RxDesc, RxQueue, RxQueueConfig, RxStatus, TxDesc, TxFlags, TxQueue,
    TxQueueConfig,
};

// ============================================================================
// Doorbell
// ============================================================================

/// Doorbell that remembers every published tail.
#[derive(Clone, Default)]
pub struct RecordingDoorbell {
    tails: Arc<Mutex<Vec<u16>>>,
}

impl RecordingDoorbell {
    pub fn tails(&self) -> Vec<u16> {
        self.tails.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<u16> {
        self.tails.lock().unwrap().last().copied()
    }
}

impl Doorbell for RecordingDoorbell {
    fn publish_tail(&mut self, tail: u16) {
        self.tails.lock().unwrap().push(tail);
    }
}

// ============================================================================
// Simulated device, RX side
// ============================================================================

/// Device view of an RX ring. Completes posted slots in order, never
/// touching the slot the tail points at.
pub struct SimRx {
    base: NonNull<RxDesc>,
    len: u16,
    head: u16,
    doorbell: RecordingDoorbell,
}

impl SimRx {
    pub fn read(&self, idx: u16) -> RxDesc {
        assert!(idx < self.len);
        unsafe { std::ptr::read_volatile(self.base.as_ptr().add(idx as usize)) }
    }

    pub fn write(&self, idx: u16, desc: RxDesc) {
        assert!(idx < self.len);
        unsafe { std::ptr::write_volatile(self.base.as_ptr().add(idx as usize), desc) }
    }

    /// Next slot the device will write.
    pub fn head(&self) -> u16 {
        self.head
    }

    /// Slots the device may still fill before reaching the tail.
    pub fn room(&self) -> u16 {
        let tail = self.doorbell.last().unwrap_or(0);
        (tail + self.len - self.head) % self.len
    }

    /// DMA `data` into the next posted buffer and write it back as done.
    /// Returns false when the device owns no free slot.
    pub fn receive(&mut self, data: &[u8], eop: bool) -> bool {
        self.receive_with(data, eop, |d| d)
    }

    /// As `receive`, letting the caller adjust the write-back descriptor.
    pub fn receive_with(&mut self, data: &[u8], eop: bool, edit: impl FnOnce(RxDesc) -> RxDesc) -> bool {
        if self.room() == 0 {
            return false;
        }
        let idx = self.head;
        let posted = self.read(idx);
        assert!(!posted.is_done(), "slot {} not posted", idx);
        assert_eq!(posted.pkt_addr() % 512, 0);

        // Identity-mapped: the bus address is the CPU address.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), posted.pkt_addr() as *mut u8, data.len());
        }
        let mut status = RxStatus::DD;
        if eop {
            status |= RxStatus::EOP;
        }
        self.write(idx, edit(RxDesc::writeback(status, data.len() as u16)));
        self.head = (self.head + 1) % self.len;
        true
    }
}

// ============================================================================
// Simulated device, TX side
// ============================================================================

/// Device view of a TX ring. `process` "sends" everything up to the tail and
/// writes DONE on descriptors that asked for a report.
pub struct SimTx {
    base: NonNull<TxDesc>,
    len: u16,
    head: u16,
    doorbell: RecordingDoorbell,
}

impl SimTx {
    pub fn read(&self, idx: u16) -> TxDesc {
        assert!(idx < self.len);
        unsafe { std::ptr::read_volatile(self.base.as_ptr().add(idx as usize)) }
    }

    pub fn write(&self, idx: u16, desc: TxDesc) {
        assert!(idx < self.len);
        unsafe { std::ptr::write_volatile(self.base.as_ptr().add(idx as usize), desc) }
    }

    /// Bytes of the buffer posted in slot `idx`.
    pub fn buffer(&self, idx: u16) -> Vec<u8> {
        let d = self.read(idx);
        unsafe { std::slice::from_raw_parts(d.addr() as *const u8, d.len() as usize).to_vec() }
    }

    /// Mark slot `idx` as sent.
    pub fn mark_done(&self, idx: u16) {
        let mut d = self.read(idx);
        d.flags |= TxFlags::DONE.bits();
        self.write(idx, d);
    }

    /// Send everything published so far. Returns the frames sent, with
    /// segments of one packet joined.
    pub fn process(&mut self) -> Vec<Vec<u8>> {
        let tail = self.doorbell.last().unwrap_or(0);
        let mut frames = Vec::new();
        let mut frame = Vec::new();
        while self.head != tail {
            let d = self.read(self.head);
            frame.extend_from_slice(&self.buffer(self.head));
            if d.tx_flags().contains(TxFlags::LAST) {
                frames.push(std::mem::take(&mut frame));
            }
            if d.tx_flags().contains(TxFlags::RS) {
                self.mark_done(self.head);
            }
            self.head = (self.head + 1) % self.len;
        }
        frames
    }
}

// ============================================================================
// Setup helpers
// ============================================================================

pub type TestRxQueue = RxQueue<MbufPool, RecordingDoorbell>;
pub type TestTxQueue = TxQueue<MbufPool, RecordingDoorbell>;

pub fn pool(count: usize) -> Arc<MbufPool> {
    Arc::new(MbufPool::with_capacity(count, DEFAULT_BUF_SIZE).expect("pool"))
}

pub struct RxSetup {
    pub queue: TestRxQueue,
    pub nic: SimRx,
    pub doorbell: RecordingDoorbell,
    pub port_stats: Arc<PortStats>,
}

pub fn rx_queue(pool: &Arc<MbufPool>, config: RxQueueConfig) -> RxSetup {
    let ring = DmaRing::<RxDesc>::alloc(config.nb_desc).expect("ring");
    let doorbell = RecordingDoorbell::default();
    let port_stats = Arc::new(PortStats::new());
    let nic = SimRx {
        base: ring.cpu_ptr(),
        len: config.nb_desc,
        head: 0,
        doorbell: doorbell.clone(),
    };
    let mut queue = RxQueue::new(config, ring, pool.clone(), doorbell.clone(), port_stats.clone()).expect("rxq");
    queue.start().expect("start");
    RxSetup {
        queue,
        nic,
        doorbell,
        port_stats,
    }
}

pub fn rx_config(nb_desc: u16, alloc_thresh: u16, scattered: bool) -> RxQueueConfig {
    RxQueueConfig {
        nb_desc,
        alloc_thresh,
        scattered,
        ..Default::default()
    }
}

pub struct TxSetup {
    pub queue: TestTxQueue,
    pub nic: SimTx,
    pub doorbell: RecordingDoorbell,
}

pub fn tx_queue(pool: &Arc<MbufPool>, config: TxQueueConfig) -> TxSetup {
    let ring = DmaRing::<TxDesc>::alloc(config.nb_desc).expect("ring");
    let doorbell = RecordingDoorbell::default();
    let nic = SimTx {
        base: ring.cpu_ptr(),
        len: config.nb_desc,
        head: 0,
        doorbell: doorbell.clone(),
    };
    let mut queue = TxQueue::new(config, ring, pool.clone(), doorbell.clone()).expect("txq");
    queue.start().expect("start");
    TxSetup { queue, nic, doorbell }
}

pub fn tx_config(nb_desc: u16, rs_thresh: u16, free_thresh: u16) -> TxQueueConfig {
    TxQueueConfig {
        nb_desc,
        rs_thresh,
        free_thresh,
        ..Default::default()
    }
}

/// Build a packet from the pool with one segment per entry of `segs`, each
/// filled with its own byte value.
pub fn packet(pool: &MbufPool, segs: &[&[u8]]) -> Option<Box<Mbuf>> {
    let mut head = pool.alloc(0)?;
    head.append(segs[0]).ok()?;
    for data in &segs[1..] {
        let mut seg = pool.alloc(0)?;
        seg.append(data).ok()?;
        head.push_segment(seg);
    }
    Some(head)
}

/// Empty output array for receive.
pub fn slots(n: usize) -> Vec<Option<Box<Mbuf>>> {
    (0..n).map(|_| None).collect()
}

/// Concatenated bytes of every segment.
pub fn flatten(m: &Mbuf) -> Vec<u8> {
    m.segments().flat_map(|s| s.data().iter().copied()).collect()
}
