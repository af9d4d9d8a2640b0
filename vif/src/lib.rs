// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The mirror sink: a software network interface which accounts for and discards every frame
//! handed to it.
//!
//! Monitoring tools attach to this interface to see mirrored traffic.  The interface itself never
//! originates traffic.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod config;
mod stats;
mod vif;

pub use config::VifConfig;
pub use stats::TxCounters;
pub use vif::VirtualInterface;
