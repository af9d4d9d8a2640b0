// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use host::device::DeviceStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transmit counters of a [`VirtualInterface`](crate::VirtualInterface).
///
/// Counters only ever grow.  Frames and bytes are written by the transmit path, errors by the
/// stall handler; all of them are read through [`TxCounters::snapshot`].
#[derive(Debug, Default)]
pub struct TxCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

impl TxCounters {
    pub(crate) fn count_frame(&self, len: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn count_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.  Each counter is read atomically, the set is not.
    #[must_use]
    pub fn snapshot(&self) -> DeviceStats {
        DeviceStats {
            tx_packets: self.packets.load(Ordering::Relaxed),
            tx_bytes: self.bytes.load(Ordering::Relaxed),
            tx_errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
