// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::buffer::{BufferAllocationError, BufferPool, HeapPool};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A [`BufferPool`] which serves a fixed number of allocations and then fails.
///
/// Used to exercise the allocation failure paths of frame duplication.
#[derive(Debug)]
pub struct LimitedPool {
    remaining: AtomicUsize,
}

impl LimitedPool {
    /// Create a pool which will serve `budget` allocations.
    #[must_use]
    pub fn new(budget: usize) -> LimitedPool {
        LimitedPool {
            remaining: AtomicUsize::new(budget),
        }
    }

    /// A pool which never serves anything.
    #[must_use]
    pub fn exhausted() -> LimitedPool {
        LimitedPool::new(0)
    }

    /// The number of allocations this pool will still serve.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Relaxed)
    }
}

impl BufferPool for LimitedPool {
    fn allocate(&self, len: usize) -> Result<Vec<u8>, BufferAllocationError> {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| BufferAllocationError { requested: len })?;
        HeapPool::new().allocate(len)
    }
}

#[cfg(test)]
mod test {
    use crate::buffer::{BufferPool, LimitedPool};

    #[test]
    fn budget_is_respected() {
        let pool = LimitedPool::new(2);
        assert!(pool.allocate(10).is_ok());
        assert!(pool.allocate(10).is_ok());
        assert_eq!(pool.remaining(), 0);
        let err = pool.allocate(10).unwrap_err();
        assert_eq!(err.requested, 10);
        assert_eq!(pool.remaining(), 0);
    }
}
