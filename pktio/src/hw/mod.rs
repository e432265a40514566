//! Device-facing primitives: descriptor memory, fences, prefetch and the
//! tail doorbell.

pub mod barriers;
pub mod cache;
pub mod dma;
pub mod doorbell;

pub use barriers::{lfence, sfence};
pub use cache::prefetch;
pub use dma::DmaRing;
pub use doorbell::{Doorbell, MmioDoorbell};

#[cfg(test)]
pub use doorbell::MockDoorbell;
