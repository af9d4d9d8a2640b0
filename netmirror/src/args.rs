// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line arguments.

use crate::config::{ConfigError, MirrorConfig};
pub use clap::Parser;
use net::eth::mac::Mac;
use net::interface::InterfaceName;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command line arguments of the `netmirror` binary.
#[derive(Debug, Parser)]
#[command(name = "netmirror")]
#[command(version)]
#[command(about = "Mirror all traffic seen by this host onto one virtual interface", long_about = None)]
pub struct CmdArgs {
    #[arg(long, value_name = "PATH", help = "YAML configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "NAME",
        value_parser = |s: &str| InterfaceName::try_from(s).map_err(|e| e.to_string()),
        help = "Name of the mirror interface (default: netmirror)"
    )]
    interface_name: Option<InterfaceName>,

    #[arg(
        long,
        value_name = "MAC",
        help = "Hardware address of the mirror interface (default: 4e:45:54:4d:49:52)"
    )]
    mac: Option<Mac>,

    #[arg(
        long,
        value_name = "TICKS",
        help = "Ticks a stalled transmit queue is tolerated before it is reported (default: 5)"
    )]
    watchdog_ticks: Option<u64>,

    #[arg(
        long,
        default_value_t = false,
        help = "Leave the mirror interface down after registration"
    )]
    no_auto_up: bool,

    #[arg(
        long,
        value_name = "ADDRESS:PORT",
        help = "Bind address and port for the Prometheus metrics HTTP endpoint"
    )]
    metrics_address: Option<SocketAddr>,

    #[arg(
        long,
        value_name = "FILTER",
        help = "Log filter, e.g. info or netmirror_tap=trace (default: RUST_LOG, then info)"
    )]
    log_level: Option<String>,

    #[arg(
        long,
        default_value_t = false,
        help = "Print the effective configuration and exit"
    )]
    show_config: bool,
}

impl CmdArgs {
    /// The log filter, if one was given.
    #[must_use]
    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    /// Whether to print the configuration and exit.
    #[must_use]
    pub fn show_config(&self) -> bool {
        self.show_config
    }

    /// Overlay the command line on top of `config`.
    #[must_use]
    pub fn apply(&self, mut config: MirrorConfig) -> MirrorConfig {
        if let Some(name) = &self.interface_name {
            config.interface_name = name.clone();
        }
        if let Some(mac) = self.mac {
            config.mac = mac;
        }
        if let Some(ticks) = self.watchdog_ticks {
            config.watchdog_ticks = ticks;
        }
        if self.no_auto_up {
            config.auto_up = false;
        }
        if let Some(address) = self.metrics_address {
            config.metrics_address = Some(address);
        }
        config
    }

    /// Build the effective configuration: defaults, then the configuration file, then the
    /// command line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file can not be loaded or the result is not valid.
    pub fn resolve(&self) -> Result<MirrorConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => MirrorConfig::load(path)?,
            None => MirrorConfig::default(),
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use crate::args::{CmdArgs, Parser};
    use crate::config::ConfigError;
    use net::eth::mac::Mac;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_without_flags() {
        let args = CmdArgs::try_parse_from(["netmirror"]).unwrap();
        let config = args.resolve().unwrap();
        assert_eq!(config, crate::config::MirrorConfig::default());
        assert!(!args.show_config());
        assert_eq!(args.log_level(), None);
    }

    #[test]
    fn config_file_is_read_by_resolve() {
        let args =
            CmdArgs::try_parse_from(["netmirror", "--config", "/nonexistent/netmirror.yaml"])
                .unwrap();
        assert!(matches!(args.resolve(), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn flags_override() {
        let args = CmdArgs::try_parse_from([
            "netmirror",
            "--interface-name",
            "mon0",
            "--mac",
            "02:00:00:00:00:42",
            "--watchdog-ticks",
            "9",
            "--no-auto-up",
            "--metrics-address",
            "[::1]:9464",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let config = args.resolve().unwrap();
        assert_eq!(config.interface_name.as_ref(), "mon0");
        assert_eq!(config.mac, Mac([2, 0, 0, 0, 0, 0x42]));
        assert_eq!(config.watchdog_ticks, 9);
        assert!(!config.auto_up);
        assert!(config.metrics_address.is_some());
        assert_eq!(args.log_level(), Some("debug"));
    }

    #[test]
    fn illegal_values() {
        assert!(CmdArgs::try_parse_from(["netmirror", "--interface-name", "a/b"]).is_err());
        assert!(CmdArgs::try_parse_from(["netmirror", "--mac", "nonsense"]).is_err());
        let args = CmdArgs::try_parse_from(["netmirror", "--watchdog-ticks", "0"]).unwrap();
        assert!(matches!(args.resolve(), Err(ConfigError::ZeroWatchdog)));
    }
}
