// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Metrics publication.

#![allow(clippy::cast_precision_loss)]

use host::device::DeviceStats;
use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use tap::TapStats;
use tracing::info;

/// Frames transmitted by the sink.
pub const TX_FRAMES: &str = "netmirror_tx_frames";
/// Bytes transmitted by the sink.
pub const TX_BYTES: &str = "netmirror_tx_bytes";
/// Transmit stalls of the sink.
pub const TX_ERRORS: &str = "netmirror_tx_errors";
/// Frames shown to the tap.
pub const TAP_OBSERVED: &str = "netmirror_tap_observed";
/// Duplicates accepted by the sink.
pub const TAP_MIRRORED: &str = "netmirror_tap_mirrored";
/// Frames not mirrored because they came from the sink.
pub const TAP_SKIPPED_LOOP: &str = "netmirror_tap_skipped_loop";
/// Frames not mirrored because nobody else held them.
pub const TAP_SKIPPED_EXCLUSIVE: &str = "netmirror_tap_skipped_exclusive";
/// Frames not mirrored because the tap was inactive.
pub const TAP_SKIPPED_INACTIVE: &str = "netmirror_tap_skipped_inactive";
/// Frames which could not be duplicated.
pub const TAP_DUPLICATION_FAILURES: &str = "netmirror_tap_duplication_failures";
/// Duplicates dropped by the transmit path.
pub const TAP_TRANSMIT_DROPS: &str = "netmirror_tap_transmit_drops";

const DESCRIPTIONS: [(&str, &str); 10] = [
    (TX_FRAMES, "Frames transmitted by the mirror interface"),
    (TX_BYTES, "Bytes transmitted by the mirror interface"),
    (TX_ERRORS, "Transmit stalls of the mirror interface"),
    (TAP_OBSERVED, "Frames observed by the mirror tap"),
    (TAP_MIRRORED, "Frames mirrored onto the mirror interface"),
    (TAP_SKIPPED_LOOP, "Frames not mirrored because they came from the mirror interface"),
    (TAP_SKIPPED_EXCLUSIVE, "Frames not mirrored because they were not shared"),
    (TAP_SKIPPED_INACTIVE, "Frames not mirrored because the tap was inactive"),
    (TAP_DUPLICATION_FAILURES, "Frames which could not be duplicated"),
    (TAP_TRANSMIT_DROPS, "Mirrored frames dropped by the transmit path"),
];

/// Pair every counter with its metric name.
#[must_use]
pub fn samples(device: &DeviceStats, tap: &TapStats) -> [(&'static str, u64); 10] {
    [
        (TX_FRAMES, device.tx_packets),
        (TX_BYTES, device.tx_bytes),
        (TX_ERRORS, device.tx_errors),
        (TAP_OBSERVED, tap.observed),
        (TAP_MIRRORED, tap.mirrored),
        (TAP_SKIPPED_LOOP, tap.skipped_loop),
        (TAP_SKIPPED_EXCLUSIVE, tap.skipped_exclusive),
        (TAP_SKIPPED_INACTIVE, tap.skipped_inactive),
        (TAP_DUPLICATION_FAILURES, tap.duplication_failures),
        (TAP_TRANSMIT_DROPS, tap.transmit_drops),
    ]
}

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    for (name, description) in DESCRIPTIONS {
        describe_gauge!(name, description);
    }
}

/// Publish the current counters as gauges.
pub fn publish(device: &DeviceStats, tap: &TapStats) {
    for (name, value) in samples(device, tap) {
        gauge!(name).set(value as f64);
    }
}

/// Serve prometheus metrics on `address`.
///
/// # Errors
///
/// Returns a [`BuildError`] if the exporter can not be installed.
#[tracing::instrument(level = "info")]
pub fn serve(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    describe();
    info!("serving metrics on http://{address}/metrics");
    Ok(())
}
