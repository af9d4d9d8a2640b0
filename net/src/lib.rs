// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Frames, buffers and link-layer identities shared by the mirror crates.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod buffer;
pub mod eth;
pub mod frame;
pub mod interface;
