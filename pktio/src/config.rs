//! Queue configuration.

use core::fmt;

// ═══════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════

/// Smallest supported ring.
pub const MIN_RING_SIZE: u16 = 8;

/// Largest supported ring.
pub const MAX_RING_SIZE: u16 = 4096;

/// Ring sizes must be a multiple of this.
pub const RING_SIZE_MULTIPLE: u16 = 8;

pub const DEFAULT_RING_SIZE: u16 = 512;
pub const DEFAULT_ALLOC_THRESH: u16 = 32;
pub const DEFAULT_RS_THRESH: u16 = 32;
pub const DEFAULT_FREE_THRESH: u16 = 32;

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

/// Why a queue configuration was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Ring size outside `MIN_RING_SIZE..=MAX_RING_SIZE`.
    RingSizeOutOfRange(u16),
    /// Ring size not a multiple of `RING_SIZE_MULTIPLE`.
    RingSizeNotMultiple(u16),
    /// RX refill batch is zero, too large, or does not divide the ring.
    AllocThresh(u16),
    /// TX free threshold is zero or leaves fewer than 3 slots.
    FreeThresh(u16),
    /// TX report threshold is zero, above the free threshold, too large, or
    /// does not divide the ring.
    RsThresh(u16),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingSizeOutOfRange(n) => {
                write!(f, "ring size {} not in {}..={}", n, MIN_RING_SIZE, MAX_RING_SIZE)
            }
            Self::RingSizeNotMultiple(n) => {
                write!(f, "ring size {} not a multiple of {}", n, RING_SIZE_MULTIPLE)
            }
            Self::AllocThresh(t) => write!(f, "invalid alloc_thresh {}", t),
            Self::FreeThresh(t) => write!(f, "invalid free_thresh {}", t),
            Self::RsThresh(t) => write!(f, "invalid rs_thresh {}", t),
        }
    }
}

fn check_ring_size(nb_desc: u16) -> Result<(), ConfigError> {
    if !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&nb_desc) {
        return Err(ConfigError::RingSizeOutOfRange(nb_desc));
    }
    if nb_desc % RING_SIZE_MULTIPLE != 0 {
        return Err(ConfigError::RingSizeNotMultiple(nb_desc));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// RX
// ═══════════════════════════════════════════════════════════════════════════

/// Receive queue configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxQueueConfig {
    /// Port the queue belongs to; stamped on every received mbuf.
    pub port_id: u16,
    pub queue_id: u16,
    /// Descriptors in the ring.
    pub nb_desc: u16,
    /// Refill batch size. Also caps the packets returned by one poll.
    pub alloc_thresh: u16,
    /// Reassemble packets spanning several descriptors.
    pub scattered: bool,
    /// Decode checksum/VLAN/RSS/packet-type metadata into the mbuf.
    pub offload_flags: bool,
}

impl Default for RxQueueConfig {
    fn default() -> Self {
        Self {
            port_id: 0,
            queue_id: 0,
            nb_desc: DEFAULT_RING_SIZE,
            alloc_thresh: DEFAULT_ALLOC_THRESH,
            scattered: false,
            offload_flags: true,
        }
    }
}

impl RxQueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ring_size(self.nb_desc)?;
        let t = self.alloc_thresh;
        if t == 0 || t > self.nb_desc - 1 || self.nb_desc % t != 0 {
            return Err(ConfigError::AllocThresh(t));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TX
// ═══════════════════════════════════════════════════════════════════════════

/// Transmit queue configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxQueueConfig {
    pub port_id: u16,
    pub queue_id: u16,
    /// Descriptors in the ring.
    pub nb_desc: u16,
    /// Request a completion report every `rs_thresh` posted segments.
    pub rs_thresh: u16,
    /// Try to reclaim before posting when fewer slots than this are free.
    pub free_thresh: u16,
}

impl Default for TxQueueConfig {
    fn default() -> Self {
        Self {
            port_id: 0,
            queue_id: 0,
            nb_desc: DEFAULT_RING_SIZE,
            rs_thresh: DEFAULT_RS_THRESH,
            free_thresh: DEFAULT_FREE_THRESH,
        }
    }
}

impl TxQueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ring_size(self.nb_desc)?;
        let n = self.nb_desc;

        let free = self.free_thresh;
        if free == 0 || free > n - 3 {
            return Err(ConfigError::FreeThresh(free));
        }

        let rs = self.rs_thresh;
        if rs == 0 || rs > (n - 2).min(free) || n % rs != 0 {
            return Err(ConfigError::RsThresh(rs));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RxQueueConfig::default().validate().is_ok());
        assert!(TxQueueConfig::default().validate().is_ok());
    }

    #[test]
    fn test_ring_size_bounds() {
        let mut rx = RxQueueConfig { alloc_thresh: 4, ..Default::default() };
        rx.nb_desc = 0;
        assert_eq!(rx.validate(), Err(ConfigError::RingSizeOutOfRange(0)));
        rx.nb_desc = 8192;
        assert_eq!(rx.validate(), Err(ConfigError::RingSizeOutOfRange(8192)));
        rx.nb_desc = 12;
        assert_eq!(rx.validate(), Err(ConfigError::RingSizeNotMultiple(12)));
        rx.nb_desc = 8;
        assert!(rx.validate().is_ok());
    }

    #[test]
    fn test_alloc_thresh_rules() {
        let mut rx = RxQueueConfig { nb_desc: 64, ..Default::default() };
        for bad in [0, 64, 24] {
            rx.alloc_thresh = bad;
            assert_eq!(rx.validate(), Err(ConfigError::AllocThresh(bad)), "alloc_thresh {}", bad);
        }
        for good in [1, 8, 32] {
            rx.alloc_thresh = good;
            assert!(rx.validate().is_ok(), "alloc_thresh {}", good);
        }
    }

    #[test]
    fn test_tx_thresh_rules() {
        let mut tx = TxQueueConfig { nb_desc: 16, rs_thresh: 4, free_thresh: 4, ..Default::default() };
        assert!(tx.validate().is_ok());

        tx.free_thresh = 14;
        assert_eq!(tx.validate(), Err(ConfigError::FreeThresh(14)));
        tx.free_thresh = 2;
        assert_eq!(tx.validate(), Err(ConfigError::RsThresh(4)), "rs_thresh above free_thresh");
        tx.free_thresh = 13;
        tx.rs_thresh = 3;
        assert_eq!(tx.validate(), Err(ConfigError::RsThresh(3)), "rs_thresh must divide the ring");
        tx.rs_thresh = 8;
        assert!(tx.validate().is_ok());
    }
}
