// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Device allocation and registration.

use crate::device::NetDevice;
use net::interface::{InterfaceIndex, InterfaceName};
use std::sync::Arc;

/// A reserved, not yet registered device slot.
///
/// A slot must either be registered or handed back through [`DeviceRegistry::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct DeviceSlot {
    name: InterfaceName,
}

impl DeviceSlot {
    /// Reserve a slot for a device called `name`.  Only registries create slots.
    pub fn new(name: InterfaceName) -> DeviceSlot {
        DeviceSlot { name }
    }

    /// The name the slot was reserved for.
    #[must_use]
    pub fn name(&self) -> &InterfaceName {
        &self.name
    }
}

/// Error returned when no device slot could be reserved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no resources left to allocate device {name}")]
pub struct AllocError {
    /// The name the slot was requested for.
    pub name: InterfaceName,
}

/// Reasons the registry refuses to register a device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Another interface already uses the name.
    #[error("interface name {0} is already in use")]
    NameInUse(InterfaceName),
    /// No interface has the given index.
    #[error("no interface with index {0}")]
    NoSuchInterface(InterfaceIndex),
    /// The registry ran out of interface indices.
    #[error("interface indices exhausted")]
    IndicesExhausted,
    /// The host refused for its own reasons.
    #[error("host refused registration: {0}")]
    Refused(String),
}

/// A refused registration.  Carries the slot back so the caller can release it.
#[derive(Debug, thiserror::Error)]
#[error("failed to register {}: {error}", .slot.name())]
pub struct RegistrationRefused {
    /// The slot which was to be registered.
    pub slot: DeviceSlot,
    /// Why registration failed.
    pub error: RegistryError,
}

/// The host's device registry.
pub trait DeviceRegistry: Send + Sync {
    /// Reserve a device slot.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the registry has no resources left.
    fn allocate(&self, name: &InterfaceName) -> Result<DeviceSlot, AllocError>;

    /// Register `device` into `slot`, making it visible to the stack.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationRefused`], holding the unused slot, if registration fails.
    fn register(
        &self,
        slot: DeviceSlot,
        device: Arc<dyn NetDevice>,
    ) -> Result<InterfaceIndex, RegistrationRefused>;

    /// Hand back a slot which is not (or no longer) registered.
    fn release(&self, slot: DeviceSlot);

    /// Remove a registered device from the stack, returning its slot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoSuchInterface`] if nothing is registered at `ifindex`.
    fn unregister(&self, ifindex: InterfaceIndex) -> Result<DeviceSlot, RegistryError>;
}
