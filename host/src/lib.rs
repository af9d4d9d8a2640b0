// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The boundary between the mirror and the host network stack.
//!
//! The mirror only ever talks to the stack through the traits defined here: a device registry
//! which hands out names and indices, a hook table which shows every frame to the installed
//! hooks, and a transmit path which routes frames to devices.  Devices in turn expose their
//! control surface through [`NetDevice`](device::NetDevice).

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod device;
pub mod hook;
pub mod registry;
#[cfg(test)]
mod stub;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod watchdog;
pub mod xmit;

use crate::hook::HookRegistry;
use crate::registry::DeviceRegistry;
use crate::xmit::Transmit;

/// Everything the mirror needs from a host network stack.
pub trait Host: DeviceRegistry + HookRegistry + Transmit + Send + Sync + 'static {}

impl<T> Host for T where T: DeviceRegistry + HookRegistry + Transmit + Send + Sync + 'static {}
