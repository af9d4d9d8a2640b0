// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use net::eth::mac::Mac;
use net::interface::InterfaceName;

/// Identity and tuning of a [`VirtualInterface`](crate::VirtualInterface).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VifConfig {
    /// Name the interface is registered under.
    pub interface_name: InterfaceName,
    /// Hardware address assigned when the interface comes up.
    pub mac: Mac,
    /// Ticks a stopped queue may stay stopped before the interface is told it stalled.
    pub watchdog_ticks: u64,
}

impl VifConfig {
    /// Default interface name.
    pub const DEFAULT_NAME: &str = "netmirror";
    /// Default hardware address: the ASCII bytes of `NETMIR`.
    pub const DEFAULT_MAC: Mac = Mac(*b"NETMIR");
    /// Default stall threshold.
    pub const DEFAULT_WATCHDOG_TICKS: u64 = 5;
}

impl Default for VifConfig {
    fn default() -> Self {
        #[allow(clippy::unwrap_used)] // constant name, covered by test
        let interface_name = InterfaceName::try_from(VifConfig::DEFAULT_NAME).unwrap();
        VifConfig {
            interface_name,
            mac: VifConfig::DEFAULT_MAC,
            watchdog_ticks: VifConfig::DEFAULT_WATCHDOG_TICKS,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::VifConfig;

    #[test]
    fn defaults() {
        let config = VifConfig::default();
        assert_eq!(config.interface_name.as_ref(), "netmirror");
        assert_eq!(config.mac.to_string(), "4e:45:54:4d:49:52");
        assert_eq!(config.watchdog_ticks, 5);
    }
}
