//! Buffer pool seam.
//!
//! Queues only need bulk allocation and freeing, so they are generic over
//! this trait rather than tied to [`MbufPool`].

use alloc::boxed::Box;

use mbuf_pool::{Mbuf, MbufPool, PoolError};

/// Source of packet buffers shared between queues.
#[cfg_attr(test, mockall::automock)]
pub trait BufferPool: Send + Sync {
    /// Fill every slot of `out` or leave all of them empty.
    fn alloc_bulk(&self, out: &mut [Option<Box<Mbuf>>]) -> Result<(), PoolError>;

    /// Take one buffer reset for `port`.
    fn alloc(&self, port: u16) -> Option<Box<Mbuf>>;

    /// Return one detached segment.
    fn free_seg(&self, m: Box<Mbuf>);

    /// Return a whole chain.
    fn free(&self, m: Box<Mbuf>);
}

impl BufferPool for MbufPool {
    #[inline]
    fn alloc_bulk(&self, out: &mut [Option<Box<Mbuf>>]) -> Result<(), PoolError> {
        MbufPool::alloc_bulk(self, out)
    }

    #[inline]
    fn alloc(&self, port: u16) -> Option<Box<Mbuf>> {
        MbufPool::alloc(self, port)
    }

    #[inline]
    fn free_seg(&self, m: Box<Mbuf>) {
        MbufPool::free_seg(self, m)
    }

    #[inline]
    fn free(&self, m: Box<Mbuf>) {
        MbufPool::free(self, m)
    }
}
