//! Circular index arithmetic shared by the RX and TX rings.
//!
//! Every cursor lives in `0..size`. Sizes are not required to be powers of
//! two, so wrapping is done by comparison rather than masking.

/// Step `idx` forward by `n` slots.
#[inline]
pub const fn advance(idx: u16, n: u16, size: u16) -> u16 {
    let next = idx as u32 + n as u32;
    (next % size as u32) as u16
}

/// Step `idx` back by `n` slots.
#[inline]
pub const fn retreat(idx: u16, n: u16, size: u16) -> u16 {
    let n = n % size;
    ((idx as u32 + size as u32 - n as u32) % size as u32) as u16
}
