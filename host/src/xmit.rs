// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The host transmit path.

use crate::device::{DeviceFlags, NetDevice, TxStatus};
use net::frame::Frame;
use net::interface::InterfaceIndex;
use tracing::trace;

/// Why the transmit path dropped a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    /// The frame was not addressed to any interface.
    #[error("frame has no destination interface")]
    NoDestination,
    /// No device is registered at the destination index.
    #[error("no device at interface index {0}")]
    NoDevice(InterfaceIndex),
    /// The destination device is down.
    #[error("device {0} is down")]
    DeviceDown(InterfaceIndex),
    /// The destination device has disabled its queue.
    #[error("transmit queue of device {0} is stopped")]
    QueueStopped(InterfaceIndex),
    /// The device refused the frame.
    #[error("device {0} is busy")]
    Busy(InterfaceIndex),
    /// The host failed to put the frame on the wire.
    #[error("host failed to emit frame on device {0}")]
    Emit(InterfaceIndex),
}

/// Outcome of [`Transmit::dev_transmit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum XmitOutcome {
    /// The destination device accepted the frame.
    Transmitted,
    /// The frame was dropped.
    Dropped(DropReason),
}

/// The host's transmit path.
pub trait Transmit: Send + Sync {
    /// Send `frame` to the device it is addressed to (see [`Frame::dev`]).
    ///
    /// The transmit path owns the frame from here on, whatever the outcome.
    fn dev_transmit(&self, frame: Frame) -> XmitOutcome;
}

/// Check whether `device` may be handed a frame right now.
///
/// Devices are never transmitted to while down, before registration, or with their queue
/// stopped.
///
/// # Errors
///
/// Returns the [`DropReason`] if the frame has to be dropped.
pub fn admit(device: &dyn NetDevice) -> Result<InterfaceIndex, DropReason> {
    let Some(ifindex) = device.ifindex() else {
        trace!("device {} is not registered", device.name());
        return Err(DropReason::NoDestination);
    };
    if !device.flags().contains(DeviceFlags::UP) {
        return Err(DropReason::DeviceDown(ifindex));
    }
    if device.is_queue_stopped() {
        return Err(DropReason::QueueStopped(ifindex));
    }
    Ok(ifindex)
}

/// Hand `frame` to an admitted device and map its answer.
///
/// The device is checked again right before the hand-over, so a bring-down which landed after
/// [`admit`] drops the frame.  A bring-down racing with [`NetDevice::transmit`] itself is not
/// caught here: callers which take a device down while transmitting to it quiesce their own
/// transmitters first.
pub fn hand_over(device: &dyn NetDevice, ifindex: InterfaceIndex, frame: Frame) -> XmitOutcome {
    if let Err(reason) = admit(device) {
        trace!("device {} changed state before hand-over: {reason}", device.name());
        return XmitOutcome::Dropped(reason);
    }
    match device.transmit(frame) {
        TxStatus::Ok => XmitOutcome::Transmitted,
        TxStatus::Busy => XmitOutcome::Dropped(DropReason::Busy(ifindex)),
    }
}
