// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Transmit stall detection.

use crate::device::{DeviceFlags, NetDevice};
use tracing::{debug, trace};

/// Watches one device's transmit queue.
///
/// The watchdog is driven by a monotonic tick counter supplied by the host.  A queue which stays
/// stopped for the device's [`watchdog_timeout`](NetDevice::watchdog_timeout) is reported to the
/// device through [`NetDevice::handle_timeout`], once per stall.
#[derive(Debug, Default)]
pub struct Watchdog {
    stalled_since: Option<u64>,
}

impl Watchdog {
    /// Create a new [`Watchdog`].
    #[must_use]
    pub fn new() -> Watchdog {
        Watchdog::default()
    }

    /// Check the device at tick `now`.  Returns true if the device was told it stalled.
    pub fn poll(&mut self, now: u64, device: &dyn NetDevice) -> bool {
        let up = device.flags().contains(DeviceFlags::UP);
        if !up || !device.is_queue_stopped() {
            self.stalled_since = None;
            return false;
        }
        let since = *self.stalled_since.get_or_insert(now);
        if now.saturating_sub(since) < device.watchdog_timeout() {
            trace!("queue of {} stopped since tick {since}", device.name());
            return false;
        }
        debug!(
            "transmit queue of {} stalled for {} ticks",
            device.name(),
            now - since
        );
        device.handle_timeout();
        self.stalled_since = None;
        true
    }
}

#[cfg(test)]
mod test {
    use crate::device::NetDevice;
    use crate::stub::Stub;
    use crate::watchdog::Watchdog;
    use std::sync::atomic::Ordering;

    #[test]
    fn running_queue_never_fires() {
        let stub = Stub::new("stub0");
        let mut watchdog = Watchdog::new();
        for now in 0..100 {
            assert!(!watchdog.poll(now, &stub));
        }
        assert_eq!(stub.timeouts.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn fires_once_per_stall() {
        let stub = Stub::new("stub0");
        let mut watchdog = Watchdog::new();
        stub.stop_queue();
        let fired: Vec<u64> = (10..30).filter(|now| watchdog.poll(*now, &stub)).collect();
        assert_eq!(fired, vec![15]);
        assert!(!stub.is_queue_stopped());
        stub.stop_queue();
        let fired: Vec<u64> = (30..50).filter(|now| watchdog.poll(*now, &stub)).collect();
        assert_eq!(fired, vec![35]);
        assert_eq!(stub.timeouts.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn down_devices_do_not_stall() {
        let stub = Stub::new("stub0");
        stub.stop_queue();
        stub.up.store(false, Ordering::Relaxed);
        let mut watchdog = Watchdog::new();
        assert!((0..20).all(|now| !watchdog.poll(now, &stub)));
    }
}
