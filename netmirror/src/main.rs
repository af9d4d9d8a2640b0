// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]
#![allow(rustdoc::missing_crate_level_docs)]

use miette::{IntoDiagnostic, WrapErr};
use netmirror::Mirror;
use netmirror::args::{CmdArgs, Parser};
use netmirror::drivers::kernel::KernelHost;
use netmirror::statistics;
use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// How often counters are published.
const PUBLISH_INTERVAL: Duration = Duration::from_secs(1);

fn init_logging(args: &CmdArgs) {
    let filter = match args.log_level() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

fn main() -> miette::Result<()> {
    let args = CmdArgs::parse();
    init_logging(&args);

    let config = args.resolve()?;
    if args.show_config() {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }
    info!(" ━━━━━━ netmirror for '{}' started ━━━━━━", config.interface_name);

    if let Some(address) = config.metrics_address {
        statistics::serve(address)
            .into_diagnostic()
            .wrap_err("failed to start metrics server")?;
    }

    let (stop_tx, stop_rx) = channel();
    ctrlc::set_handler(move || {
        if stop_tx.send(()).is_err() {
            error!("Error sending shutdown signal");
        }
    })
    .into_diagnostic()
    .wrap_err("failed to set SIGINT handler")?;

    let host = Arc::new(KernelHost::new());
    let mut mirror = Mirror::initialize(host.clone(), &config)?;
    if let Err(e) = host.start(config.tick()) {
        mirror.shutdown();
        return Err(e.into());
    }

    loop {
        match stop_rx.recv_timeout(PUBLISH_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {
                statistics::publish(&mirror.device_stats(), &mirror.tap_stats());
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("Shutting down netmirror");
    host.stop();
    mirror.shutdown();
    let stats = mirror.tap_stats();
    info!(
        "mirrored {} of {} observed frames ({} duplication failures, {} transmit drops)",
        stats.mirrored, stats.observed, stats.duplication_failures, stats.transmit_drops
    );
    Ok(())
}
