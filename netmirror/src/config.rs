// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mirror configuration.

use net::eth::mac::Mac;
use net::interface::InterfaceName;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use vif::VifConfig;

/// Everything needed to set up a [`Mirror`](crate::Mirror) and the process around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Name of the mirror sink.
    pub interface_name: InterfaceName,
    /// Hardware address of the mirror sink.
    pub mac: Mac,
    /// Ticks a stopped sink queue may stay stopped before it is reported as stalled.
    pub watchdog_ticks: u64,
    /// Length of a watchdog tick, in milliseconds.
    pub tick_ms: u64,
    /// Bring the sink up as soon as it is registered.
    pub auto_up: bool,
    /// Where to serve prometheus metrics.  No metrics are served if unset.
    pub metrics_address: Option<SocketAddr>,
}

/// Errors which may occur while loading or validating a [`MirrorConfig`].
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// The file which was read.
        path: PathBuf,
        /// The underlying io error.
        source: std::io::Error,
    },
    /// The configuration is not valid YAML or has unknown or malformed fields.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    /// The hardware address can not be used by an interface.
    #[error("{0} is not a legal interface address (must be unicast and non-zero)")]
    IllegalMac(Mac),
    /// A zero watchdog threshold would report stalls on every tick.
    #[error("watchdog_ticks must be at least 1")]
    ZeroWatchdog,
    /// Ticks must have a length.
    #[error("tick_ms must be at least 1")]
    ZeroTick,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        let vif = VifConfig::default();
        MirrorConfig {
            interface_name: vif.interface_name,
            mac: vif.mac,
            watchdog_ticks: vif.watchdog_ticks,
            tick_ms: MirrorConfig::DEFAULT_TICK_MS,
            auto_up: true,
            metrics_address: None,
        }
    }
}

impl MirrorConfig {
    /// Default watchdog tick length in milliseconds.
    pub const DEFAULT_TICK_MS: u64 = 4;

    /// Parse a configuration from YAML.  Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the YAML is malformed or the result is not valid.
    pub fn from_yaml(yaml: &str) -> Result<MirrorConfig, ConfigError> {
        let config: MirrorConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file can not be read or its content is not valid.
    pub fn load(path: &Path) -> Result<MirrorConfig, ConfigError> {
        debug!("loading configuration from {}", path.display());
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        MirrorConfig::from_yaml(&yaml)
    }

    /// Check the configuration for values the mirror can not work with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mac.is_valid_src() {
            return Err(ConfigError::IllegalMac(self.mac));
        }
        if self.watchdog_ticks == 0 {
            return Err(ConfigError::ZeroWatchdog);
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }

    /// The sink's part of the configuration.
    #[must_use]
    pub fn vif(&self) -> VifConfig {
        VifConfig {
            interface_name: self.interface_name.clone(),
            mac: self.mac,
            watchdog_ticks: self.watchdog_ticks,
        }
    }

    /// Length of a watchdog tick.
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Render as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

#[cfg(test)]
mod test {
    use crate::config::{ConfigError, MirrorConfig};
    use net::eth::mac::Mac;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn defaults() {
        let config = MirrorConfig::default();
        assert_eq!(config.interface_name.as_ref(), "netmirror");
        assert_eq!(config.mac, Mac(*b"NETMIR"));
        assert_eq!(config.watchdog_ticks, 5);
        assert_eq!(config.tick(), Duration::from_millis(4));
        assert!(config.auto_up);
        assert_eq!(config.metrics_address, None);
        config.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = MirrorConfig::from_yaml(
            "interface_name: mirror0\nauto_up: false\nmetrics_address: 127.0.0.1:9464\n",
        )
        .unwrap();
        assert_eq!(config.interface_name.as_ref(), "mirror0");
        assert!(!config.auto_up);
        assert_eq!(config.metrics_address, Some(([127, 0, 0, 1], 9464).into()));
        assert_eq!(config.mac, Mac(*b"NETMIR"));
        assert_eq!(config.vif().interface_name.as_ref(), "mirror0");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            MirrorConfig::from_yaml("colour: blue"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            MirrorConfig::from_yaml("interface_name: far-too-long-for-linux"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            MirrorConfig::from_yaml("mac: \"01:00:5e:00:00:01\""),
            Err(ConfigError::IllegalMac(_))
        ));
        assert!(matches!(
            MirrorConfig::from_yaml("watchdog_ticks: 0"),
            Err(ConfigError::ZeroWatchdog)
        ));
        assert!(matches!(
            MirrorConfig::from_yaml("tick_ms: 0"),
            Err(ConfigError::ZeroTick)
        ));
    }

    #[test]
    fn yaml_round_trip() {
        let config = MirrorConfig {
            watchdog_ticks: 17,
            ..MirrorConfig::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(MirrorConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn missing_file() {
        let err = MirrorConfig::load(std::path::Path::new("/nonexistent/netmirror.yaml"));
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }
}
