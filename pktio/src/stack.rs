//! smoltcp device adapter.
//!
//! Exposes one RX/TX queue pair as a `smoltcp::phy::Device` so a
//! `smoltcp::iface::Interface` can run directly on the rings.
//!
//! Single-segment frames are handed to smoltcp in place. Scattered frames
//! are copied into a stack buffer first, since smoltcp wants one slice.
//! Frames longer than [`MTU`] are dropped and counted, never cut short.

use alloc::boxed::Box;
use alloc::sync::Arc;

use mbuf_pool::Mbuf;
use smoltcp::phy::{Device, DeviceCapabilities, Medium, RxToken, TxToken};
use smoltcp::time::Instant;

use crate::hw::Doorbell;
use crate::pool::BufferPool;
use crate::rx::RxQueue;
use crate::tx::TxQueue;

/// Largest frame exchanged with smoltcp, Ethernet header included.
pub const MTU: usize = 1536;

/// An RX/TX queue pair driven by smoltcp.
pub struct PortDevice<P: BufferPool, RB: Doorbell, TB: Doorbell> {
    rx: RxQueue<P, RB>,
    tx: TxQueue<P, TB>,
    pool: Arc<P>,
    rx_oversize_drops: u64,
}

impl<P: BufferPool, RB: Doorbell, TB: Doorbell> PortDevice<P, RB, TB> {
    /// Both queues should already be started.
    pub fn new(rx: RxQueue<P, RB>, tx: TxQueue<P, TB>, pool: Arc<P>) -> Self {
        Self {
            rx,
            tx,
            pool,
            rx_oversize_drops: 0,
        }
    }

    /// Received frames dropped for exceeding [`MTU`].
    pub fn rx_oversize_drops(&self) -> u64 {
        self.rx_oversize_drops
    }

    pub fn rx_queue(&self) -> &RxQueue<P, RB> {
        &self.rx
    }

    pub fn tx_queue(&self) -> &TxQueue<P, TB> {
        &self.tx
    }

    pub fn rx_queue_mut(&mut self) -> &mut RxQueue<P, RB> {
        &mut self.rx
    }

    pub fn tx_queue_mut(&mut self) -> &mut TxQueue<P, TB> {
        &mut self.tx
    }

    pub fn into_queues(self) -> (RxQueue<P, RB>, TxQueue<P, TB>) {
        (self.rx, self.tx)
    }
}

impl<P: BufferPool, RB: Doorbell, TB: Doorbell> Device for PortDevice<P, RB, TB> {
    type RxToken<'a> = PortRxToken<'a, P> where Self: 'a;
    type TxToken<'a> = PortTxToken<'a, P, TB> where Self: 'a;

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.max_transmission_unit = MTU;
        caps.max_burst_size = Some(self.rx.config().alloc_thresh as usize);
        caps.medium = Medium::Ethernet;
        caps
    }

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let mut pkts: [Option<Box<Mbuf>>; 1] = [None];
        for _ in 0..self.rx.config().alloc_thresh {
            if self.rx.receive(&mut pkts) == 0 {
                return None;
            }
            let mbuf = pkts[0].take()?;
            if frame_len(&mbuf) > MTU {
                self.rx_oversize_drops += 1;
                self.pool.free(mbuf);
                continue;
            }
            return Some((
                PortRxToken {
                    mbuf,
                    pool: &self.pool,
                },
                PortTxToken {
                    tx: &mut self.tx,
                    pool: &self.pool,
                },
            ));
        }
        None
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        if !self.tx.is_started() {
            return None;
        }
        if self.tx.nb_free() == 0 {
            self.tx.reclaim();
            if self.tx.nb_free() == 0 {
                return None;
            }
        }
        Some(PortTxToken {
            tx: &mut self.tx,
            pool: &self.pool,
        })
    }
}

fn frame_len(m: &Mbuf) -> usize {
    m.segments().map(|s| s.data_len() as usize).sum()
}

/// A received frame. Its buffers go back to the pool once consumed.
pub struct PortRxToken<'a, P: BufferPool> {
    mbuf: Box<Mbuf>,
    pool: &'a P,
}

impl<'a, P: BufferPool> RxToken for PortRxToken<'a, P> {
    fn consume<R, F>(mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let result = if self.mbuf.next().is_none() {
            f(self.mbuf.data_mut())
        } else {
            // PortDevice::receive only hands out frames of at most MTU bytes.
            let mut buf = [0u8; MTU];
            let mut len = 0;
            for seg in self.mbuf.segments() {
                let data = seg.data();
                buf[len..len + data.len()].copy_from_slice(data);
                len += data.len();
            }
            f(&mut buf[..len])
        };
        self.pool.free(self.mbuf);
        result
    }
}

/// Room for one outgoing frame.
pub struct PortTxToken<'a, P: BufferPool, B: Doorbell> {
    tx: &'a mut TxQueue<P, B>,
    pool: &'a P,
}

impl<'a, P: BufferPool, B: Doorbell> TxToken for PortTxToken<'a, P, B> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let port = self.tx.config().port_id;
        let mut mbuf = match self.pool.alloc(port) {
            Some(m) if m.data_room() >= len => m,
            other => {
                // No buffer to send from: let smoltcp build the frame and
                // drop it, as a lossy link would.
                if let Some(m) = other {
                    self.pool.free(m);
                }
                let mut scratch = [0u8; MTU];
                return f(&mut scratch[..len.min(MTU)]);
            }
        };

        // data_room() was checked above.
        let _ = mbuf.set_data_len(len);
        let result = f(mbuf.data_mut());

        let mut pkts = [Some(mbuf)];
        if self.tx.transmit(&mut pkts) == 0 {
            if let Some(m) = pkts[0].take() {
                self.pool.free(m);
            }
        }
        result
    }
}
