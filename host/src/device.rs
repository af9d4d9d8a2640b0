// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The capability set a network device offers to the host stack.

use bitflags::bitflags;
use net::eth::mac::Mac;
use net::frame::Frame;
use net::interface::{InterfaceIndex, InterfaceName};
use std::fmt::Debug;

bitflags! {
    /// Interface flags, using the kernel's bit assignments.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct DeviceFlags: u32 {
        /// The interface is administratively up.
        const UP = 1 << 0;
        /// The interface can send to the broadcast address.
        const BROADCAST = 1 << 1;
        /// The interface never resolves link-layer addresses.
        const NOARP = 1 << 7;
        /// The interface supports multicast.
        const MULTICAST = 1 << 12;
    }
}

bitflags! {
    /// Offload features a device advertises.  Informational only.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct DeviceFeatures: u64 {
        /// The device checksums any protocol in hardware.
        const HW_CSUM = 1 << 3;
    }
}

/// Result of handing a frame to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// The device took the frame.
    Ok,
    /// The device could not take the frame right now.
    Busy,
}

/// Link carrier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Carrier present.
    Up,
    /// No carrier.
    Down,
}

/// A snapshot of a device's transmit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Frames transmitted.
    pub tx_packets: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
    /// Transmit errors (stalls).
    pub tx_errors: u64,
}

/// Low level hardware settings, as set by `SIOCSIFMAP`.
///
/// Software devices have no hardware to configure, but they still get asked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfMap {
    /// Start of shared memory.
    pub mem_start: u64,
    /// End of shared memory.
    pub mem_end: u64,
    /// Base I/O address.  Part of the device identity.
    pub base_addr: u16,
    /// Interrupt line.
    pub irq: u8,
    /// DMA channel.
    pub dma: u8,
    /// Port selector.
    pub port: u8,
}

/// A device specific control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    /// The command code.
    pub code: u32,
    /// Opaque request payload.
    pub payload: Vec<u8>,
}

/// Reply to a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    /// The command code which was handled.
    pub code: u32,
}

/// Errors a device reports to control-plane requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The request can not be honored while the device is up.
    #[error("device is busy")]
    Busy,
    /// The device does not support the request.
    #[error("operation not supported by device")]
    NotSupported,
}

/// A network device as seen by the host stack.
///
/// All methods take `&self`: the stack calls them concurrently from control and data paths, and
/// implementations keep whatever state they need in atomics.
pub trait NetDevice: Send + Sync + Debug {
    /// The name the device was created with.
    fn name(&self) -> &InterfaceName;
    /// The current hardware address.
    fn mac(&self) -> Mac;
    /// Record the index the registry assigned.
    fn attach(&self, ifindex: InterfaceIndex);
    /// The index assigned by the registry, if registered.
    fn ifindex(&self) -> Option<InterfaceIndex>;
    /// The current interface flags.
    fn flags(&self) -> DeviceFlags;
    /// The advertised offload features.
    fn features(&self) -> DeviceFeatures;
    /// Number of ticks a stopped queue may stay stopped before the device is told it stalled.
    fn watchdog_timeout(&self) -> u64;
    /// Returns true if the transmit queue is disabled.
    fn is_queue_stopped(&self) -> bool;
    /// Disable the transmit queue (flow control).
    fn stop_queue(&self);
    /// Bring the device up.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the device refuses.
    fn bring_up(&self) -> Result<(), DeviceError>;
    /// Bring the device down.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the device refuses.
    fn bring_down(&self) -> Result<(), DeviceError>;
    /// Hand a frame to the device.  Ownership moves to the device.
    fn transmit(&self, frame: Frame) -> TxStatus;
    /// Read the transmit counters.
    fn stats(&self) -> DeviceStats;
    /// Called by the [`Watchdog`](crate::watchdog::Watchdog) when the queue stalled.
    fn handle_timeout(&self);
    /// Apply low level hardware settings.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the settings can not be applied.
    fn reconfigure(&self, map: &IfMap) -> Result<(), DeviceError>;
    /// Handle a device specific control request.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the request is refused.
    fn control(&self, command: &ControlCommand) -> Result<ControlReply, DeviceError>;
    /// The link carrier state.
    fn link_state(&self) -> LinkState;
}
