//! Zero-copy descriptor ring packet I/O.
//!
//! Moves packet buffers between a device's RX/TX descriptor rings and a
//! shared [`mbuf_pool::MbufPool`] without touching the heap on the hot path.
//!
//! # Architecture
//!
//! ```text
//!            receive()                                transmit()
//! app <──────────────── RxQueue                TxQueue <──────────── app
//!                        │  ▲                   │  │
//!             claim DD   │  │ refill            │  │ reclaim on DONE
//!                        ▼  │ (alloc_thresh)    ▼  ▼
//!                    [RX ring] ◄── pool ──► [TX ring]
//!                        ▲                      │
//!                        └──── device (DMA) ◄───┘
//! ```
//!
//! # Ownership
//!
//! Every buffer is a `Box<Mbuf>` and lives in exactly one place: the pool's
//! free list, a ring's shadow slot, a queue's partially reassembled packet,
//! or the application. Moving between them is a move of the box.
//!
//! # Polling model
//!
//! Queues are driven by a single thread each. `receive` and `transmit` scan
//! at most a fixed batch, never block and never fail: shortfalls show up as
//! smaller counts and in [`RxQueueStats`]/[`TxQueueStats`].
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use mbuf_pool::{MbufPool, DEFAULT_BUF_SIZE};
//! use morpheus_pktio::{DmaRing, MmioDoorbell, PortStats, RxQueue, RxQueueConfig};
//!
//! let pool = Arc::new(MbufPool::with_capacity(4096, DEFAULT_BUF_SIZE)?);
//! let config = RxQueueConfig::default();
//! let ring = DmaRing::alloc(config.nb_desc)?;
//! // program ring.bus_addr() into the queue's base registers...
//! let doorbell = unsafe { MmioDoorbell::new(rx_tail_reg) }.ok_or(...)?;
//! let mut rxq = RxQueue::new(config, ring, pool, doorbell, Arc::new(PortStats::new()))?;
//! rxq.start()?;
//!
//! let mut pkts: [Option<Box<Mbuf>>; 32] = Default::default();
//! let n = rxq.receive(&mut pkts);
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod desc;
pub mod error;
pub mod hw;
pub mod offload;
pub mod pool;
pub mod ring;
pub mod rx;
pub mod stack;
pub mod stats;
pub mod tx;

pub use config::{ConfigError, RxQueueConfig, TxQueueConfig};
pub use desc::{RxDesc, RxStatus, TxDesc, TxFlags};
pub use error::{PktioError, Result};
pub use hw::{Doorbell, DmaRing, MmioDoorbell};
pub use pool::BufferPool;
pub use rx::RxQueue;
pub use stack::PortDevice;
pub use stats::{PortStats, RxQueueStats, TxQueueStats};
pub use tx::TxQueue;

/// RX buffers must start on this boundary: the low bits of the header
/// address share storage with the DD and EOP status bits.
pub const RX_BUF_ALIGN: u16 = 512;
