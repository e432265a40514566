//! Packet I/O error types

use core::fmt;

use crate::config::ConfigError;

pub type Result<T> = core::result::Result<T, PktioError>;

/// Errors surfaced by queue setup, lifecycle and admission checks.
///
/// The receive and transmit hot paths never return these: they report
/// "processed fewer than requested" through their counts and counters.
/// [`TxQueue::admit`](crate::TxQueue::admit) gives the reason per packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PktioError {
    /// The buffer pool could not satisfy a bulk allocation.
    ResourceExhausted,
    /// A transmit packet had zero segments or a chain that disagrees with
    /// its `nb_segs`.
    MalformedPacket,
    /// Queue configuration rejected.
    InvalidConfig(ConfigError),
    /// Descriptor memory does not match the configured ring size.
    RingSizeMismatch {
        /// Descriptors the configuration asks for.
        expected: u16,
        /// Descriptors the ring memory holds.
        actual: usize,
    },
    /// A receive buffer's DMA address is not 512-byte aligned.
    MisalignedBuffer {
        /// Ring slot the buffer was meant for.
        slot: u16,
    },
    /// Operation needs a started queue.
    QueueNotStarted,
}

impl From<ConfigError> for PktioError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e)
    }
}

impl fmt::Display for PktioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted => write!(f, "Buffer pool exhausted"),
            Self::MalformedPacket => write!(f, "Malformed packet"),
            Self::InvalidConfig(e) => write!(f, "Invalid queue configuration: {}", e),
            Self::RingSizeMismatch { expected, actual } => {
                write!(f, "Ring holds {} descriptors, configuration expects {}", actual, expected)
            }
            Self::MisalignedBuffer { slot } => write!(f, "RX buffer for slot {} is not 512-byte aligned", slot),
            Self::QueueNotStarted => write!(f, "Queue not started"),
        }
    }
}
