// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An in-memory host stack.
//!
//! [`SimHost`] keeps a device registry, a hook table and a transmit path in memory.  It behaves
//! like the kernel where the mirror can tell the difference: received frames reach the hooks with
//! their link-layer header already consumed and a second reference held by the stack, and frames
//! transmitted to a device are shown to the hooks with that device as their source.

use crate::device::NetDevice;
use crate::hook::{HookError, HookId, HookRegistry, HookTable, PacketHook, ProtocolFilter};
use crate::registry::{AllocError, DeviceRegistry, DeviceSlot, RegistrationRefused, RegistryError};
use crate::xmit::{DropReason, Transmit, XmitOutcome, admit, hand_over};
use net::frame::{Frame, FrameError, FrameRef};
use net::interface::{InterfaceIndex, InterfaceName};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info, trace};

/// Errors from [`SimHost::receive`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// No port or device has the given index.
    #[error("no interface with index {0}")]
    NoSuchInterface(InterfaceIndex),
    /// The bytes are not a frame.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

enum Entry {
    Port(InterfaceName),
    Device(Arc<dyn NetDevice>),
}

impl Entry {
    fn name(&self) -> &InterfaceName {
        match self {
            Entry::Port(name) => name,
            Entry::Device(device) => device.name(),
        }
    }
}

/// An in-memory host stack.
pub struct SimHost {
    capacity: usize,
    slots: Mutex<Vec<InterfaceName>>,
    interfaces: RwLock<BTreeMap<InterfaceIndex, Entry>>,
    next_ifindex: AtomicU32,
    hooks: HookTable,
    refuse_registration: AtomicBool,
    refuse_hooks: AtomicBool,
    delivered: Mutex<Vec<(InterfaceIndex, Vec<u8>)>>,
    captures: Mutex<HashMap<InterfaceIndex, Vec<Vec<u8>>>>,
    drops: Mutex<Vec<DropReason>>,
}

impl std::fmt::Debug for SimHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimHost")
            .field("capacity", &self.capacity)
            .field("interfaces", &self.interfaces.read().len())
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl Default for SimHost {
    fn default() -> Self {
        SimHost::new()
    }
}

impl SimHost {
    /// Number of device slots a default [`SimHost`] offers.
    pub const DEFAULT_CAPACITY: usize = 8;

    /// Create an empty host.
    #[must_use]
    pub fn new() -> SimHost {
        SimHost::with_capacity(SimHost::DEFAULT_CAPACITY)
    }

    /// Create an empty host which can allocate at most `capacity` device slots at a time.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> SimHost {
        SimHost {
            capacity,
            slots: Mutex::new(Vec::new()),
            interfaces: RwLock::new(BTreeMap::new()),
            next_ifindex: AtomicU32::new(1),
            hooks: HookTable::new(),
            refuse_registration: AtomicBool::new(false),
            refuse_hooks: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
            captures: Mutex::new(HashMap::new()),
            drops: Mutex::new(Vec::new()),
        }
    }

    /// Make subsequent registrations fail (or succeed again).
    pub fn refuse_registration(&self, refuse: bool) {
        self.refuse_registration.store(refuse, Ordering::Relaxed);
    }

    /// Make subsequent hook installations fail (or succeed again).
    pub fn refuse_hooks(&self, refuse: bool) {
        self.refuse_hooks.store(refuse, Ordering::Relaxed);
    }

    fn next_index(&self) -> Result<InterfaceIndex, RegistryError> {
        let raw = self.next_ifindex.fetch_add(1, Ordering::Relaxed);
        InterfaceIndex::try_new(raw).map_err(|_| RegistryError::IndicesExhausted)
    }

    fn name_in_use(interfaces: &BTreeMap<InterfaceIndex, Entry>, name: &InterfaceName) -> bool {
        interfaces.values().any(|entry| entry.name() == name)
    }

    /// Add a plain port (think `eth0`) frames can be received on.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the name is taken or no index is left.
    pub fn add_port(&self, name: &str) -> Result<InterfaceIndex, RegistryError> {
        let name = InterfaceName::try_from(name)
            .map_err(|e| RegistryError::Refused(e.to_string()))?;
        let mut interfaces = self.interfaces.write();
        if SimHost::name_in_use(&interfaces, &name) {
            return Err(RegistryError::NameInUse(name));
        }
        let ifindex = self.next_index()?;
        debug!("added port {name} at index {ifindex}");
        interfaces.insert(ifindex, Entry::Port(name));
        Ok(ifindex)
    }

    /// Look up a registered device.
    #[must_use]
    pub fn device(&self, ifindex: InterfaceIndex) -> Option<Arc<dyn NetDevice>> {
        match self.interfaces.read().get(&ifindex) {
            Some(Entry::Device(device)) => Some(device.clone()),
            _ => None,
        }
    }

    /// Look up an interface index by name.
    #[must_use]
    pub fn ifindex(&self, name: &str) -> Option<InterfaceIndex> {
        self.interfaces
            .read()
            .iter()
            .find(|(_, entry)| entry.name().as_ref() == name)
            .map(|(ifindex, _)| *ifindex)
    }

    /// Number of registered devices (ports not included).
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.interfaces
            .read()
            .values()
            .filter(|entry| matches!(entry, Entry::Device(_)))
            .count()
    }

    /// Number of allocated slots, registered or not.
    #[must_use]
    pub fn allocated_slots(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of installed hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Frames delivered to the local stack, in order, as wire bytes.
    #[must_use]
    pub fn delivered(&self) -> Vec<(InterfaceIndex, Vec<u8>)> {
        self.delivered.lock().clone()
    }

    /// Frames which were put on the wire of `ifindex`, in order.
    #[must_use]
    pub fn captures(&self, ifindex: InterfaceIndex) -> Vec<Vec<u8>> {
        self.captures
            .lock()
            .get(&ifindex)
            .cloned()
            .unwrap_or_default()
    }

    /// Reasons for every frame the transmit path dropped, in order.
    #[must_use]
    pub fn drops(&self) -> Vec<DropReason> {
        self.drops.lock().clone()
    }

    /// Receive `wire` (a frame starting at its ethernet header) on interface `ifindex`.
    ///
    /// The link-layer header is consumed, every hook gets a reference, then the frame is
    /// delivered to the local stack.  Returns the number of hooks which saw the frame.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiveError`] if the interface does not exist or the frame is truncated.
    pub fn receive(&self, ifindex: InterfaceIndex, wire: &[u8]) -> Result<usize, ReceiveError> {
        if !self.interfaces.read().contains_key(&ifindex) {
            return Err(ReceiveError::NoSuchInterface(ifindex));
        }
        let frame = FrameRef::new(Frame::received(wire, ifindex)?);
        trace!("received {} bytes on {ifindex}", wire.len());
        let seen = self.hooks.run(&frame, ifindex, None);
        let bytes = frame.mac_header().unwrap_or(frame.as_ref()).to_vec();
        self.delivered.lock().push((ifindex, bytes));
        frame.release();
        Ok(seen)
    }

    fn drop_frame(&self, reason: DropReason) -> XmitOutcome {
        debug!("dropped frame: {reason}");
        self.drops.lock().push(reason);
        XmitOutcome::Dropped(reason)
    }
}

impl DeviceRegistry for SimHost {
    fn allocate(&self, name: &InterfaceName) -> Result<DeviceSlot, AllocError> {
        let mut slots = self.slots.lock();
        if slots.len() >= self.capacity {
            debug!("no slot left for {name}");
            return Err(AllocError { name: name.clone() });
        }
        slots.push(name.clone());
        Ok(DeviceSlot::new(name.clone()))
    }

    fn register(
        &self,
        slot: DeviceSlot,
        device: Arc<dyn NetDevice>,
    ) -> Result<InterfaceIndex, RegistrationRefused> {
        if self.refuse_registration.load(Ordering::Relaxed) {
            let error = RegistryError::Refused("registration disabled".to_string());
            return Err(RegistrationRefused { slot, error });
        }
        let mut interfaces = self.interfaces.write();
        if SimHost::name_in_use(&interfaces, slot.name()) {
            let error = RegistryError::NameInUse(slot.name().clone());
            return Err(RegistrationRefused { slot, error });
        }
        let ifindex = match self.next_index() {
            Ok(ifindex) => ifindex,
            Err(error) => return Err(RegistrationRefused { slot, error }),
        };
        info!("registered device {} at index {ifindex}", slot.name());
        interfaces.insert(ifindex, Entry::Device(device));
        Ok(ifindex)
    }

    fn release(&self, slot: DeviceSlot) {
        let mut slots = self.slots.lock();
        if let Some(pos) = slots.iter().position(|name| name == slot.name()) {
            slots.swap_remove(pos);
            debug!("released slot of {}", slot.name());
        }
    }

    fn unregister(&self, ifindex: InterfaceIndex) -> Result<DeviceSlot, RegistryError> {
        let mut interfaces = self.interfaces.write();
        match interfaces.remove(&ifindex) {
            Some(Entry::Device(device)) => {
                info!("unregistered device {} from index {ifindex}", device.name());
                Ok(DeviceSlot::new(device.name().clone()))
            }
            Some(port @ Entry::Port(_)) => {
                interfaces.insert(ifindex, port);
                Err(RegistryError::NoSuchInterface(ifindex))
            }
            None => Err(RegistryError::NoSuchInterface(ifindex)),
        }
    }
}

impl HookRegistry for SimHost {
    fn add_hook(
        &self,
        filter: ProtocolFilter,
        hook: Arc<dyn PacketHook>,
    ) -> Result<HookId, HookError> {
        if self.refuse_hooks.load(Ordering::Relaxed) {
            return Err(HookError::Refused("hooks disabled".to_string()));
        }
        Ok(self.hooks.install(filter, hook))
    }

    fn remove_hook(&self, id: HookId) -> Result<(), HookError> {
        self.hooks.uninstall(id)
    }
}

impl Transmit for SimHost {
    fn dev_transmit(&self, frame: Frame) -> XmitOutcome {
        let Some(target) = frame.dev() else {
            return self.drop_frame(DropReason::NoDestination);
        };
        let Some(device) = self.device(target) else {
            return self.drop_frame(DropReason::NoDevice(target));
        };
        let ifindex = match admit(device.as_ref()) {
            Ok(ifindex) => ifindex,
            Err(reason) => return self.drop_frame(reason),
        };
        // outgoing frames are shown to the hooks before the device gets them
        let outgoing = FrameRef::new(frame);
        self.hooks.run(&outgoing, ifindex, None);
        self.captures
            .lock()
            .entry(ifindex)
            .or_default()
            .push(outgoing.as_ref().to_vec());
        let frame = outgoing
            .try_into_inner()
            .unwrap_or_else(|shared| Frame::clone(&shared));
        match hand_over(device.as_ref(), ifindex, frame) {
            XmitOutcome::Dropped(reason) => self.drop_frame(reason),
            outcome @ XmitOutcome::Transmitted => outcome,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::device::NetDevice;
    use crate::hook::{Disposition, HookError, HookRegistry, PacketHook, ProtocolFilter};
    use crate::registry::{DeviceRegistry, RegistryError};
    use crate::sim::{ReceiveError, SimHost};
    use crate::stub::Stub;
    use crate::xmit::{DropReason, Transmit, XmitOutcome};
    use net::frame::{Frame, FrameRef};
    use net::interface::{InterfaceIndex, InterfaceName};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// Remembers what it was shown.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(InterfaceIndex, bool, Vec<u8>)>>,
    }

    impl PacketHook for Recorder {
        fn on_frame(
            &self,
            frame: FrameRef,
            source: InterfaceIndex,
            _: Option<InterfaceIndex>,
        ) -> Disposition {
            let shared = frame.is_shared();
            self.seen.lock().push((source, shared, frame.as_ref().to_vec()));
            Disposition::Consumed
        }
    }

    fn wire(len: usize) -> Vec<u8> {
        let mut wire = vec![0x02, 0, 0, 0, 0, 2, 0x02, 0, 0, 0, 0, 1, 0x08, 0x00];
        wire.resize(len, 0x5a);
        wire
    }

    fn register_stub(host: &SimHost, name: &str) -> (Arc<Stub>, InterfaceIndex) {
        let stub = Arc::new(Stub::new(name));
        let slot = host.allocate(stub.name()).unwrap();
        let ifindex = host.register(slot, stub.clone()).unwrap();
        stub.attach(ifindex);
        (stub, ifindex)
    }

    #[test]
    fn hooks_see_received_frames_shared_and_headerless() {
        let host = SimHost::new();
        let eth0 = host.add_port("eth0").unwrap();
        let recorder = Arc::new(Recorder::default());
        host.add_hook(ProtocolFilter::All, recorder.clone()).unwrap();
        let bytes = wire(100);
        assert_eq!(host.receive(eth0, &bytes).unwrap(), 1);
        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, eth0);
        assert!(seen[0].1);
        assert_eq!(seen[0].2, bytes[14..].to_vec());
        assert_eq!(host.delivered(), vec![(eth0, bytes)]);
    }

    #[test]
    fn receive_errors() {
        let host = SimHost::new();
        let eth0 = host.add_port("eth0").unwrap();
        let nowhere = InterfaceIndex::try_new(77).unwrap();
        assert_eq!(
            host.receive(nowhere, &wire(60)),
            Err(ReceiveError::NoSuchInterface(nowhere))
        );
        assert!(matches!(
            host.receive(eth0, &[0; 10]),
            Err(ReceiveError::Frame(_))
        ));
        assert!(host.delivered().is_empty());
    }

    #[test]
    fn registry_enforces_capacity_and_names() {
        let host = SimHost::with_capacity(1);
        host.add_port("eth0").unwrap();
        let name = InterfaceName::try_from("eth0").unwrap();
        let slot = host.allocate(&name).unwrap();
        assert!(host.allocate(&name).is_err());
        let refused = host
            .register(slot, Arc::new(Stub::new("eth0")))
            .unwrap_err();
        assert_eq!(refused.error, RegistryError::NameInUse(name));
        host.release(refused.slot);
        assert_eq!(host.allocated_slots(), 0);
        assert_eq!(host.device_count(), 0);
    }

    #[test]
    fn unregister_returns_the_slot() {
        let host = SimHost::new();
        let (_, ifindex) = register_stub(&host, "dev0");
        assert_eq!(host.device_count(), 1);
        let slot = host.unregister(ifindex).unwrap();
        assert_eq!(slot.name().as_ref(), "dev0");
        host.release(slot);
        assert_eq!(host.allocated_slots(), 0);
        assert_eq!(
            host.unregister(ifindex),
            Err(RegistryError::NoSuchInterface(ifindex))
        );
    }

    #[test]
    fn hooks_can_be_removed_once() {
        let host = SimHost::new();
        let id = host
            .add_hook(ProtocolFilter::All, Arc::new(Recorder::default()))
            .unwrap();
        assert_eq!(host.hook_count(), 1);
        host.remove_hook(id).unwrap();
        assert_eq!(host.remove_hook(id), Err(HookError::UnknownHook(id)));
        host.refuse_hooks(true);
        assert!(
            host.add_hook(ProtocolFilter::All, Arc::new(Recorder::default()))
                .is_err()
        );
    }

    #[test]
    fn transmit_routes_and_shows_outgoing_frames() {
        let host = SimHost::new();
        let (stub, ifindex) = register_stub(&host, "dev0");
        let recorder = Arc::new(Recorder::default());
        host.add_hook(ProtocolFilter::All, recorder.clone()).unwrap();
        let bytes = wire(64);
        let outcome = host.dev_transmit(Frame::new(&bytes, ifindex));
        assert_eq!(outcome, XmitOutcome::Transmitted);
        assert_eq!(*stub.transmitted.lock(), vec![bytes.clone()]);
        assert_eq!(host.captures(ifindex), vec![bytes.clone()]);
        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, ifindex);
        assert!(seen[0].1);
    }

    #[test]
    fn transmit_drops() {
        let host = SimHost::new();
        let (stub, ifindex) = register_stub(&host, "dev0");
        let nowhere = InterfaceIndex::try_new(50).unwrap();
        assert_eq!(
            host.dev_transmit(Frame::new(&wire(60), nowhere)),
            XmitOutcome::Dropped(DropReason::NoDevice(nowhere))
        );
        stub.stop_queue();
        assert_eq!(
            host.dev_transmit(Frame::new(&wire(60), ifindex)),
            XmitOutcome::Dropped(DropReason::QueueStopped(ifindex))
        );
        stub.bring_down().unwrap();
        assert_eq!(
            host.dev_transmit(Frame::new(&wire(60), ifindex)),
            XmitOutcome::Dropped(DropReason::DeviceDown(ifindex))
        );
        assert_eq!(host.drops().len(), 3);
        assert!(stub.transmitted.lock().is_empty());
        assert!(host.captures(ifindex).is_empty());
    }
}
