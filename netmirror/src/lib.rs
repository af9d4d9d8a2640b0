// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mirror every frame the host sees onto one virtual interface.
//!
//! A [`Mirror`] registers the [`VirtualInterface`](vif::VirtualInterface) sink with a host stack
//! and installs a [`MirrorTap`](tap::MirrorTap) as an all-protocols hook.  Monitoring tools then
//! attach to the sink instead of to every interface.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod args;
pub mod config;
pub mod drivers;
mod mirror;
pub mod statistics;

pub use mirror::{InitError, Mirror};
