//! Hardware descriptor layouts.
//!
//! Both layouts are little-endian in memory. Accessors convert so the rest of
//! the crate deals in native integers.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

// ═══════════════════════════════════════════════════════════════════════════
// RX DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════

bitflags! {
    /// RX write-back status and error bits (`staterr`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RxStatus: u32 {
        /// Descriptor done: hardware has written this slot.
        const DD = 1 << 0;
        /// End of packet.
        const EOP = 1 << 1;
        /// L4 checksum computed.
        const L4CS = 1 << 4;
        /// IPv4 header checksum computed.
        const IPCS = 1 << 5;
        /// Inner L4 checksum computed.
        const L4CS2 = 1 << 6;
        /// Receive error.
        const RXE = 1 << 8;
        /// Header buffer overflow.
        const HBO = 1 << 9;
        /// VLAN tag stripped into `vlan`.
        const VEXT = 1 << 10;
        /// Inner L4 checksum error.
        const L4E2 = 1 << 11;
        /// Inner IPv4 checksum error.
        const IPE2 = 1 << 12;
        /// Switched locally.
        const SWITCH = 1 << 13;
        /// L4 checksum error.
        const L4E = 1 << 14;
        /// IPv4 header checksum error.
        const IPE = 1 << 15;
    }
}

/// RSS type field of `pkt_info`.
pub const PKT_INFO_RSS_TYPE_MASK: u16 = 0x000F;
/// Packet type field of `pkt_info`.
pub const PKT_INFO_PTYPE_SHIFT: u16 = 4;
pub const PKT_INFO_PTYPE_MASK: u16 = 0x03F0;

/// Receive descriptor.
///
/// Read format (software to hardware): `qw[0]` packet buffer address,
/// `qw[1]` header buffer address.
///
/// Write-back format (hardware to software):
/// ```text
/// qw[0]  pkt_info:16  hdr_info:16  rss:32
/// qw[1]  staterr:32   length:16    vlan:16
/// qw[2]  glort:32     reserved:32
/// qw[3]  timestamp:64
/// ```
#[repr(C, align(32))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxDesc {
    qw: [u64; 4],
}

const_assert_eq!(core::mem::size_of::<RxDesc>(), 32);

impl RxDesc {
    /// Read-format descriptor posting a buffer at `addr`.
    ///
    /// The header address doubles as the status word once written, so with a
    /// 512-byte aligned `addr` both DD and EOP read as clear.
    #[inline]
    pub const fn read(addr: u64) -> Self {
        Self {
            qw: [addr.to_le(), addr.to_le(), 0, 0],
        }
    }

    /// Write-back descriptor as hardware would leave it.
    pub fn writeback(status: RxStatus, length: u16) -> Self {
        let qw1 = status.bits() as u64 | (length as u64) << 32;
        Self {
            qw: [0, qw1.to_le(), 0, 0],
        }
    }

    /// Set `pkt_info` and `rss` on a write-back descriptor.
    pub fn with_pkt_info(mut self, pkt_info: u16, rss: u32) -> Self {
        let qw0 = u64::from_le(self.qw[0]) & 0x0000_0000_FFFF_0000;
        self.qw[0] = (qw0 | pkt_info as u64 | (rss as u64) << 32).to_le();
        self
    }

    /// Set the stripped VLAN tag on a write-back descriptor.
    pub fn with_vlan(mut self, vlan: u16) -> Self {
        let qw1 = u64::from_le(self.qw[1]) & 0x0000_FFFF_FFFF_FFFF;
        self.qw[1] = (qw1 | (vlan as u64) << 48).to_le();
        self
    }

    #[inline]
    pub fn pkt_addr(&self) -> u64 {
        u64::from_le(self.qw[0])
    }

    #[inline]
    pub fn hdr_addr(&self) -> u64 {
        u64::from_le(self.qw[1])
    }

    #[inline]
    pub fn pkt_info(&self) -> u16 {
        u64::from_le(self.qw[0]) as u16
    }

    #[inline]
    pub fn hdr_info(&self) -> u16 {
        (u64::from_le(self.qw[0]) >> 16) as u16
    }

    #[inline]
    pub fn rss(&self) -> u32 {
        (u64::from_le(self.qw[0]) >> 32) as u32
    }

    #[inline]
    pub fn staterr(&self) -> u32 {
        u64::from_le(self.qw[1]) as u32
    }

    #[inline]
    pub fn status(&self) -> RxStatus {
        RxStatus::from_bits_retain(self.staterr())
    }

    #[inline]
    pub fn length(&self) -> u16 {
        (u64::from_le(self.qw[1]) >> 32) as u16
    }

    #[inline]
    pub fn vlan(&self) -> u16 {
        (u64::from_le(self.qw[1]) >> 48) as u16
    }

    #[inline]
    pub fn glort(&self) -> u32 {
        u64::from_le(self.qw[2]) as u32
    }

    #[inline]
    pub fn timestamp(&self) -> u64 {
        u64::from_le(self.qw[3])
    }

    /// Hardware has completed this slot.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.staterr() & RxStatus::DD.bits() != 0
    }

    /// Last descriptor of a packet.
    #[inline]
    pub fn is_eop(&self) -> bool {
        self.staterr() & RxStatus::EOP.bits() != 0
    }

    #[inline]
    pub fn rss_type(&self) -> u16 {
        self.pkt_info() & PKT_INFO_RSS_TYPE_MASK
    }

    #[inline]
    pub fn ptype(&self) -> u16 {
        (self.pkt_info() & PKT_INFO_PTYPE_MASK) >> PKT_INFO_PTYPE_SHIFT
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TX DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════

bitflags! {
    /// TX descriptor flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxFlags: u8 {
        /// Interrupt on completion.
        const INT = 0x01;
        /// Timestamp the frame.
        const TIME = 0x02;
        /// Insert checksums.
        const CSUM = 0x04;
        /// Frame carries an FTAG.
        const FTAG = 0x10;
        /// Report status: hardware sets DONE once this slot is sent.
        const RS = 0x20;
        /// Last descriptor of the packet.
        const LAST = 0x40;
        /// Written back by hardware.
        const DONE = 0x80;
    }
}

/// Transmit descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxDesc {
    pub buffer_addr: u64,
    pub buflen: u16,
    pub vlan: u16,
    pub mss: u16,
    pub hdrlen: u8,
    pub flags: u8,
}

const_assert_eq!(core::mem::size_of::<TxDesc>(), 16);

impl TxDesc {
    #[inline]
    pub fn new(addr: u64, len: u16, vlan: u16, flags: TxFlags) -> Self {
        Self {
            buffer_addr: addr.to_le(),
            buflen: len.to_le(),
            vlan: vlan.to_le(),
            mss: 0,
            hdrlen: 0,
            flags: flags.bits(),
        }
    }

    #[inline]
    pub fn addr(&self) -> u64 {
        u64::from_le(self.buffer_addr)
    }

    #[inline]
    pub fn len(&self) -> u16 {
        u16::from_le(self.buflen)
    }

    #[inline]
    pub fn vlan_tci(&self) -> u16 {
        u16::from_le(self.vlan)
    }

    #[inline]
    pub fn tx_flags(&self) -> TxFlags {
        TxFlags::from_bits_retain(self.flags)
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.flags & TxFlags::DONE.bits() != 0
    }
}
