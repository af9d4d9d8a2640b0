// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Buffer traits and the pools frame copies are allocated from.

#[cfg(any(doc, test, feature = "test_buffer"))]
mod limited;

#[cfg(any(doc, test, feature = "test_buffer"))]
pub use limited::LimitedPool;

use core::fmt::Debug;
use std::error::Error;
use tracing::trace;

/// Trait representing the ability to get the unused headroom in a buffer.
pub trait Headroom {
    /// Get the (unused) headroom in a buffer.
    fn headroom(&self) -> u16;
}

/// Trait representing the ability to prepend data to a buffer.
pub trait Prepend {
    /// Error which may occur when attempting to prepend data to the buffer.
    type Error: Debug + Error;
    /// Grow the buffer at the front, if possible.
    ///
    /// If successful, this method returns a slice to the new start of the buffer.
    /// The bytes exposed are the ones which were already present in the headroom.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if there is not enough headroom available.
    fn prepend(&mut self, len: u16) -> Result<&mut [u8], Self::Error>;
}

/// Trait representing the ability to trim data from the start of a buffer.
pub trait TrimFromStart {
    /// Error which may occur when attempting to trim data from the start of the buffer.
    type Error: Debug + Error;
    /// Trim data from the start of the buffer if possible.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the buffer does not have `len` bytes in it to begin with.
    fn trim_from_start(&mut self, len: u16) -> Result<&mut [u8], Self::Error>;
}

/// A source of backing memory for frames.
///
/// Allocation happens on the packet path, so implementations must never block: they either hand
/// out memory right away or fail.
pub trait BufferPool: Send + Sync + Debug {
    /// Provide a zeroed buffer of exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BufferAllocationError`] if the memory can not be provided.
    fn allocate(&self, len: usize) -> Result<Vec<u8>, BufferAllocationError>;
}

/// A [`BufferPool`] backed by the global allocator.
///
/// Allocation failure is reported instead of aborting the process.
#[derive(Debug, Default, Clone, Copy)]
#[non_exhaustive]
pub struct HeapPool;

impl HeapPool {
    /// Create a new [`HeapPool`].
    #[must_use]
    pub const fn new() -> HeapPool {
        HeapPool
    }
}

impl BufferPool for HeapPool {
    fn allocate(&self, len: usize) -> Result<Vec<u8>, BufferAllocationError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|e| {
            trace!("heap allocation of {len} bytes failed: {e}");
            BufferAllocationError { requested: len }
        })?;
        buf.resize(len, 0);
        Ok(buf)
    }
}

/// Error indicating that a buffer could not be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unable to allocate buffer of {requested} bytes")]
pub struct BufferAllocationError {
    /// The number of bytes which were requested.
    pub requested: usize,
}

/// Error indicating that there is not enough headroom in a buffer for the requested operation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Not enough head room in memory buffer")]
pub struct NotEnoughHeadRoom;

/// Error indicating that the buffer is not long enough to perform the requested operation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("MemoryBuffer not long enough to remove required number of bytes")]
pub struct MemoryBufferNotLongEnough;

#[cfg(test)]
mod test {
    use crate::buffer::{BufferPool, HeapPool};

    #[test]
    fn heap_pool_hands_out_zeroed_buffers() {
        bolero::check!()
            .with_type::<u16>()
            .cloned()
            .for_each(|len| {
                let buf = HeapPool::new().allocate(usize::from(len)).unwrap();
                assert_eq!(buf.len(), usize::from(len));
                assert!(buf.iter().all(|b| *b == 0));
            });
    }

    #[test]
    fn heap_pool_reports_impossible_requests() {
        let err = HeapPool::new().allocate(usize::MAX).unwrap_err();
        assert_eq!(err.requested, usize::MAX);
    }
}
