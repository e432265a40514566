//! Packet buffer segment.
//!
//! # Layout
//! ```text
//! buf_addr                data_off                         buf_len
//!    |<----- headroom ----->|<---- data_len ---->|<- tailroom ->|
//! ```
//!
//! A packet is a chain of segments linked through owned `next` boxes. The
//! head segment carries the packet-wide fields (`pkt_len`, `nb_segs`,
//! offload flags); the same fields on later segments are ignored.

use alloc::boxed::Box;
use core::ptr::NonNull;

use bitflags::bitflags;

use crate::region::align_up;
use crate::{PoolError, Result};

/// Default headroom reserved in front of packet data.
pub const MBUF_HEADROOM: u16 = 128;

/// Default buffer size: 2KB of data room plus room for 512-byte alignment.
pub const DEFAULT_BUF_SIZE: u16 = 2048 + 512;

bitflags! {
    /// Offload flags carried by a packet (RX results and TX requests).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OlFlags: u64 {
        /// RX: packet carried an 802.1Q tag; `vlan_tci` is valid.
        const RX_VLAN_PKT = 1 << 0;
        /// RX: `rss_hash` holds a valid RSS hash.
        const RX_RSS_HASH = 1 << 1;
        /// RX: L4 checksum was checked and found bad.
        const RX_L4_CKSUM_BAD = 1 << 3;
        /// RX: IPv4 header checksum was checked and found bad.
        const RX_IP_CKSUM_BAD = 1 << 4;
        /// RX: header buffer overflowed.
        const RX_HBUF_OVERFLOW = 1 << 6;
        /// RX: device reported a receive error.
        const RX_RECIP_ERR = 1 << 7;

        /// TX: compute the TCP checksum.
        const TX_TCP_CKSUM = 1 << 52;
        /// TX: compute the UDP checksum.
        const TX_UDP_CKSUM = 1 << 53;
        /// TX: compute the IPv4 header checksum.
        const TX_IP_CKSUM = 1 << 54;
        /// TX: insert `vlan_tci`.
        const TX_VLAN_PKT = 1 << 55;

        /// TX: any L4 checksum request.
        const TX_L4_MASK = Self::TX_TCP_CKSUM.bits() | Self::TX_UDP_CKSUM.bits();
    }
}

bitflags! {
    /// Packet classification reported by the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketType: u32 {
        const L2_ETHER = 1 << 0;
        const L3_IPV4 = 1 << 4;
        const L3_IPV4_EXT = 1 << 5;
        const L3_IPV6 = 1 << 6;
        const L3_IPV6_EXT = 1 << 7;
        const L4_TCP = 1 << 8;
        const L4_UDP = 1 << 9;
    }
}

/// One packet buffer segment.
pub struct Mbuf {
    /// CPU pointer to the start of the buffer.
    buf_addr: NonNull<u8>,
    /// Device-visible address of `buf_addr`.
    buf_iova: u64,
    /// Total buffer size in bytes.
    buf_len: u16,
    /// Offset of packet data from `buf_addr`.
    data_off: u16,
    /// Position within the owning pool.
    index: u32,
    /// Bytes of data in this segment. Only changed through checked setters:
    /// `data_off + data_len <= buf_len` always holds.
    data_len: u16,
    /// Bytes of data in the whole packet (head segment only).
    pub pkt_len: u32,
    /// Segments in the packet (head segment only).
    pub nb_segs: u16,
    /// Port the packet arrived on or leaves through.
    pub port: u16,
    pub ol_flags: OlFlags,
    pub packet_type: PacketType,
    pub rss_hash: u32,
    pub vlan_tci: u16,
    next: Option<Box<Mbuf>>,
}

impl Mbuf {
    /// Create a buffer over pool memory.
    ///
    /// # Safety
    /// - `buf_addr` must be valid for reads and writes of `buf_len` bytes for
    ///   as long as the buffer exists
    /// - `buf_iova` must be the device-visible address of `buf_addr`
    pub(crate) unsafe fn new(buf_addr: NonNull<u8>, buf_iova: u64, buf_len: u16, index: u32) -> Self {
        Self {
            buf_addr,
            buf_iova,
            buf_len,
            data_off: MBUF_HEADROOM.min(buf_len),
            index,
            data_len: 0,
            pkt_len: 0,
            nb_segs: 1,
            port: 0,
            ol_flags: OlFlags::empty(),
            packet_type: PacketType::empty(),
            rss_hash: 0,
            vlan_tci: 0,
            next: None,
        }
    }

    /// Restore the default empty state with the standard headroom.
    pub fn reset(&mut self, port: u16) {
        self.reset_with_offset(port, MBUF_HEADROOM);
    }

    /// Restore the default empty state, placing the data start on an
    /// `align`-byte boundary of the device-visible address.
    ///
    /// `align` must be a power of two.
    pub fn reset_aligned(&mut self, port: u16, align: u16) {
        let start = self.buf_iova as usize + MBUF_HEADROOM as usize;
        let offset = align_up(start, align as usize) - self.buf_iova as usize;
        self.reset_with_offset(port, offset as u16);
    }

    fn reset_with_offset(&mut self, port: u16, data_off: u16) {
        debug_assert!(self.next.is_none(), "reset of a chained segment");
        self.data_off = data_off.min(self.buf_len);
        self.data_len = 0;
        self.pkt_len = 0;
        self.nb_segs = 1;
        self.port = port;
        self.ol_flags = OlFlags::empty();
        self.packet_type = PacketType::empty();
        self.rss_hash = 0;
        self.vlan_tci = 0;
    }

    /// Position within the owning pool.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Total buffer size.
    #[inline]
    pub fn buf_len(&self) -> u16 {
        self.buf_len
    }

    /// Device-visible address of the buffer start.
    #[inline]
    pub fn buf_iova(&self) -> u64 {
        self.buf_iova
    }

    /// Offset of packet data from the buffer start.
    #[inline]
    pub fn data_off(&self) -> u16 {
        self.data_off
    }

    /// Device-visible address of the packet data.
    #[inline]
    pub fn data_iova(&self) -> u64 {
        self.buf_iova + self.data_off as u64
    }

    /// Bytes of data in this segment.
    #[inline]
    pub fn data_len(&self) -> u16 {
        self.data_len
    }

    /// Bytes available after the data in this segment.
    #[inline]
    pub fn tailroom(&self) -> usize {
        (self.buf_len - self.data_off - self.data_len) as usize
    }

    /// Bytes available for data in this segment.
    #[inline]
    pub fn data_room(&self) -> usize {
        (self.buf_len - self.data_off) as usize
    }

    /// Data of this segment.
    pub fn data(&self) -> &[u8] {
        // SAFETY: data_off + data_len <= buf_len is kept by every setter and
        // the buffer memory outlives the Mbuf.
        unsafe {
            core::slice::from_raw_parts(
                self.buf_addr.as_ptr().add(self.data_off as usize),
                self.data_len as usize,
            )
        }
    }

    /// Mutable data of this segment.
    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: see data(); &mut self gives exclusive access.
        unsafe {
            core::slice::from_raw_parts_mut(
                self.buf_addr.as_ptr().add(self.data_off as usize),
                self.data_len as usize,
            )
        }
    }

    /// Set the data length of a single-segment packet.
    pub fn set_data_len(&mut self, len: usize) -> Result<()> {
        if len > self.data_room() {
            return Err(PoolError::NoRoom);
        }
        self.data_len = len as u16;
        self.pkt_len = len as u32;
        Ok(())
    }

    /// Copy `bytes` to the end of this segment's data.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.tailroom() {
            return Err(PoolError::NoRoom);
        }
        let old = self.data_len as usize;
        self.data_len += bytes.len() as u16;
        self.pkt_len += bytes.len() as u32;
        self.data_mut()[old..].copy_from_slice(bytes);
        Ok(())
    }

    /// Next segment, if any.
    #[inline]
    pub fn next(&self) -> Option<&Mbuf> {
        self.next.as_deref()
    }

    /// Detach and return the rest of the chain.
    #[inline]
    pub fn take_next(&mut self) -> Option<Box<Mbuf>> {
        self.next.take()
    }

    fn link_tail(&mut self, seg: Box<Mbuf>) {
        let mut cur = &mut self.next;
        while let Some(next) = cur {
            cur = &mut next.next;
        }
        *cur = Some(seg);
    }

    /// Append a segment at the end of this packet, accounting its length and
    /// segment count on this (head) segment.
    ///
    /// Walks the chain to find its end; use [`MbufChain`] to build a packet
    /// one segment at a time.
    pub fn push_segment(&mut self, seg: Box<Mbuf>) {
        self.pkt_len += seg.data_len as u32;
        self.nb_segs += 1;
        self.link_tail(seg);
    }

    /// Iterate over the segments of the chain starting here.
    pub fn segments(&self) -> impl Iterator<Item = &Mbuf> {
        core::iter::successors(Some(self), |m| m.next())
    }

    /// Number of segments actually linked (as opposed to `nb_segs`).
    pub fn chain_len(&self) -> usize {
        self.segments().count()
    }
}

impl core::fmt::Debug for Mbuf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mbuf")
            .field("index", &self.index)
            .field("data_off", &self.data_off)
            .field("data_len", &self.data_len)
            .field("pkt_len", &self.pkt_len)
            .field("nb_segs", &self.nb_segs)
            .field("ol_flags", &self.ol_flags)
            .field("chained", &self.next.is_some())
            .finish()
    }
}

// SAFETY: an Mbuf exclusively owns its slice of pool memory; moving it
// between threads moves that ownership.
unsafe impl Send for Mbuf {}
unsafe impl Sync for Mbuf {}

// ============================================================================
// Chain builder
// ============================================================================

/// A packet assembled one segment at a time.
///
/// Remembers the last segment so each append is constant time however long
/// the chain grows. Accounting (`pkt_len`, `nb_segs`) goes to the head.
pub struct MbufChain {
    head: NonNull<Mbuf>,
    tail: NonNull<Mbuf>,
}

impl MbufChain {
    /// Start a packet at `head`. Segments already linked to it stay.
    pub fn new(head: Box<Mbuf>) -> Self {
        let head = NonNull::from(Box::leak(head));
        let mut tail = head;
        // SAFETY: head was just leaked from a Box and every segment reachable
        // from it is owned by the chain.
        unsafe {
            while let Some(next) = (*tail.as_ptr()).next.as_deref_mut() {
                tail = NonNull::from(next);
            }
        }
        Self { head, tail }
    }

    /// Link a single segment after the current last one.
    pub fn push(&mut self, seg: Box<Mbuf>) {
        debug_assert!(seg.next.is_none(), "push of a chained segment");
        let len = seg.data_len as u32;
        // SAFETY: head and tail point at segments owned by this chain, and
        // `&mut self` excludes every other access to them.
        unsafe {
            let head = self.head.as_ptr();
            (*head).pkt_len += len;
            (*head).nb_segs += 1;
            let slot = (*self.tail.as_ptr()).next.insert(seg);
            self.tail = NonNull::from(&mut **slot);
        }
    }

    /// Head segment.
    pub fn head(&self) -> &Mbuf {
        // SAFETY: the chain owns the head for as long as it exists.
        unsafe { self.head.as_ref() }
    }

    /// Segments linked so far, head included.
    pub fn segments(&self) -> usize {
        self.head().nb_segs as usize
    }

    /// Hand the finished packet out.
    pub fn into_head(self) -> Box<Mbuf> {
        let head = self.head;
        core::mem::forget(self);
        // SAFETY: head came from Box::leak in new() and ownership has not
        // been given away; forget() above skips our Drop.
        unsafe { Box::from_raw(head.as_ptr()) }
    }
}

impl Drop for MbufChain {
    fn drop(&mut self) {
        // SAFETY: see into_head().
        drop(unsafe { Box::from_raw(self.head.as_ptr()) });
    }
}

impl core::fmt::Debug for MbufChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MbufChain")
            .field("head", self.head())
            .field("segments", &self.segments())
            .finish()
    }
}

// SAFETY: the chain owns its segments exactly like a Box<Mbuf> would.
unsafe impl Send for MbufChain {}
unsafe impl Sync for MbufChain {}
