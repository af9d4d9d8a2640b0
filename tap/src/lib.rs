// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The mirror tap: a packet hook which copies every frame the stack shows it onto the mirror
//! sink.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod counters;
mod tap;

pub use counters::TapStats;
pub use tap::{MirrorTap, TapState};
