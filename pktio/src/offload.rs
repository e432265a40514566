//! RX metadata decode.
//!
//! Status words are mapped to mbuf flags through fixed lookup tables built at
//! compile time, so decoding is a handful of loads with no data-dependent
//! branches.

use mbuf_pool::{Mbuf, OlFlags, PacketType};

use crate::desc::{RxDesc, RxStatus};

// ═══════════════════════════════════════════════════════════════════════════
// PACKET TYPE FIELD
// ═══════════════════════════════════════════════════════════════════════════

/// L3 codes in the low 3 bits of the packet type field.
pub const PTYPE_OTHER: u16 = 0;
pub const PTYPE_IPV4: u16 = 1;
pub const PTYPE_IPV4_EX: u16 = 2;
pub const PTYPE_IPV6: u16 = 3;
pub const PTYPE_IPV6_EX: u16 = 4;
pub const PTYPE_L3_MASK: u16 = 0x07;
/// L4 bits.
pub const PTYPE_TCP: u16 = 0x08;
pub const PTYPE_UDP: u16 = 0x10;

const PTYPE_TABLE_LEN: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════
// TABLES
// ═══════════════════════════════════════════════════════════════════════════

/// Indexed by `IPCS << 3 | IPE << 2 | L4CS << 1 | L4E`.
///
/// A checksum is bad only when the device both checked it and flagged an
/// error; an error bit without the matching checked bit means nothing.
static CKSUM_TABLE: [OlFlags; 16] = build_cksum_table();

/// Indexed by `VEXT << 2 | HBO << 1 | RXE`.
static STATUS_TABLE: [OlFlags; 8] = build_status_table();

/// Indexed by the 6-bit packet type field. Unlisted codes classify as
/// nothing.
static PTYPE_TABLE: [PacketType; PTYPE_TABLE_LEN] = build_ptype_table();

const fn build_cksum_table() -> [OlFlags; 16] {
    let mut table = [OlFlags::empty(); 16];
    let mut i = 0;
    while i < 16 {
        let mut bits = 0;
        if i & 0b1100 == 0b1100 {
            bits |= OlFlags::RX_IP_CKSUM_BAD.bits();
        }
        if i & 0b0011 == 0b0011 {
            bits |= OlFlags::RX_L4_CKSUM_BAD.bits();
        }
        table[i] = OlFlags::from_bits_retain(bits);
        i += 1;
    }
    table
}

const fn build_status_table() -> [OlFlags; 8] {
    let mut table = [OlFlags::empty(); 8];
    let mut i = 0;
    while i < 8 {
        let mut bits = 0;
        if i & 0b100 != 0 {
            bits |= OlFlags::RX_VLAN_PKT.bits();
        }
        if i & 0b010 != 0 {
            bits |= OlFlags::RX_HBUF_OVERFLOW.bits();
        }
        if i & 0b001 != 0 {
            bits |= OlFlags::RX_RECIP_ERR.bits();
        }
        table[i] = OlFlags::from_bits_retain(bits);
        i += 1;
    }
    table
}

const fn build_ptype_table() -> [PacketType; PTYPE_TABLE_LEN] {
    const ETHER: u32 = PacketType::L2_ETHER.bits();
    const V4: u32 = ETHER | PacketType::L3_IPV4.bits();
    const V6: u32 = ETHER | PacketType::L3_IPV6.bits();
    const TCP: u32 = PacketType::L4_TCP.bits();
    const UDP: u32 = PacketType::L4_UDP.bits();

    let mut raw = [0u32; PTYPE_TABLE_LEN];
    raw[PTYPE_OTHER as usize] = ETHER;
    raw[PTYPE_IPV4 as usize] = V4;
    raw[PTYPE_IPV4_EX as usize] = ETHER | PacketType::L3_IPV4_EXT.bits();
    raw[PTYPE_IPV6 as usize] = V6;
    raw[PTYPE_IPV6_EX as usize] = ETHER | PacketType::L3_IPV6_EXT.bits();
    raw[(PTYPE_IPV4 | PTYPE_TCP) as usize] = V4 | TCP;
    raw[(PTYPE_IPV6 | PTYPE_TCP) as usize] = V6 | TCP;
    raw[(PTYPE_IPV4 | PTYPE_UDP) as usize] = V4 | UDP;
    raw[(PTYPE_IPV6 | PTYPE_UDP) as usize] = V6 | UDP;

    let mut table = [PacketType::empty(); PTYPE_TABLE_LEN];
    let mut i = 0;
    while i < PTYPE_TABLE_LEN {
        table[i] = PacketType::from_bits_retain(raw[i]);
        i += 1;
    }
    table
}

// ═══════════════════════════════════════════════════════════════════════════
// DECODE
// ═══════════════════════════════════════════════════════════════════════════

#[inline(always)]
fn bit(staterr: u32, flag: RxStatus) -> usize {
    (staterr & flag.bits() != 0) as usize
}

/// Offload flags implied by a write-back descriptor.
#[inline]
pub fn ol_flags(desc: &RxDesc) -> OlFlags {
    let s = desc.staterr();

    let cksum = bit(s, RxStatus::IPCS) << 3
        | bit(s, RxStatus::IPE) << 2
        | bit(s, RxStatus::L4CS) << 1
        | bit(s, RxStatus::L4E);
    let status = bit(s, RxStatus::VEXT) << 2 | bit(s, RxStatus::HBO) << 1 | bit(s, RxStatus::RXE);
    let rss = if desc.rss_type() != 0 {
        OlFlags::RX_RSS_HASH
    } else {
        OlFlags::empty()
    };

    CKSUM_TABLE[cksum] | STATUS_TABLE[status] | rss
}

/// Packet classification implied by a write-back descriptor.
#[inline]
pub fn packet_type(desc: &RxDesc) -> PacketType {
    PTYPE_TABLE[desc.ptype() as usize]
}

/// Write the descriptor's metadata onto the head of a received packet.
///
/// With `decode` off only the RSS hash is copied and flags are cleared.
#[inline]
pub fn apply(m: &mut Mbuf, desc: &RxDesc, decode: bool) {
    m.rss_hash = desc.rss();
    if decode {
        m.ol_flags = ol_flags(desc);
        m.packet_type = packet_type(desc);
        if m.ol_flags.contains(OlFlags::RX_VLAN_PKT) {
            m.vlan_tci = desc.vlan();
        }
    } else {
        m.ol_flags = OlFlags::empty();
        m.packet_type = PacketType::empty();
    }
}
