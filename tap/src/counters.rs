// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::sync::atomic::{AtomicU64, Ordering};

/// A snapshot of the tap's counters.
///
/// Every observation ends up in exactly one of `mirrored`, `skipped_inactive`, `skipped_loop`,
/// `skipped_exclusive`, `duplication_failures` or `transmit_drops`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TapStats {
    /// Frames the tap was shown.
    pub observed: u64,
    /// Duplicates accepted by the sink.
    pub mirrored: u64,
    /// Frames ignored because the source was the sink itself.
    pub skipped_loop: u64,
    /// Frames ignored because nobody else held a reference to them.
    pub skipped_exclusive: u64,
    /// Frames ignored because the tap was not active.
    pub skipped_inactive: u64,
    /// Frames which could not be duplicated.
    pub duplication_failures: u64,
    /// Duplicates the transmit path dropped.
    pub transmit_drops: u64,
}

impl TapStats {
    /// Sum of all outcome counters.  Equals `observed` once no observation is in flight.
    #[must_use]
    pub fn outcomes(&self) -> u64 {
        self.mirrored
            + self.skipped_loop
            + self.skipped_exclusive
            + self.skipped_inactive
            + self.duplication_failures
            + self.transmit_drops
    }
}

#[derive(Debug, Default)]
pub(crate) struct TapCounters {
    pub(crate) observed: AtomicU64,
    pub(crate) mirrored: AtomicU64,
    pub(crate) skipped_loop: AtomicU64,
    pub(crate) skipped_exclusive: AtomicU64,
    pub(crate) skipped_inactive: AtomicU64,
    pub(crate) duplication_failures: AtomicU64,
    pub(crate) transmit_drops: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl TapCounters {
    pub(crate) fn snapshot(&self) -> TapStats {
        TapStats {
            observed: self.observed.load(Ordering::Relaxed),
            mirrored: self.mirrored.load(Ordering::Relaxed),
            skipped_loop: self.skipped_loop.load(Ordering::Relaxed),
            skipped_exclusive: self.skipped_exclusive.load(Ordering::Relaxed),
            skipped_inactive: self.skipped_inactive.load(Ordering::Relaxed),
            duplication_failures: self.duplication_failures.load(Ordering::Relaxed),
            transmit_drops: self.transmit_drops.load(Ordering::Relaxed),
        }
    }
}
