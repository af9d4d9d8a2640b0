// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kernel host driver
//!
//! [`KernelHost`] implements the host boundary on top of a Linux kernel:
//!  * the mirror sink is backed by a TAP device.  Duplicates are sent out of it through a packet
//!    socket, so the kernel transmits them and never receives them.  Whatever the kernel
//!    transmits on the TAP device is read back and dropped.
//!  * every kernel interface gets its own `AF_PACKET` socket, polled on an IO thread
//!  * the interface list is read again periodically, so interfaces created later are observed
//!  * frames read from the sockets are shown to the installed hooks
//!  * the IO thread also drives the transmit watchdog of every registered device and mirrors
//!    its up/down state and address onto the TAP device

mod port;
mod tuntap;

use crate::drivers::kernel::port::{Port, PortTable, get_interface_ifindex, transmit_socket};
use crate::drivers::kernel::tuntap::TapDevice;
use afpacket::sync::RawPacketStream;
use host::device::{DeviceFlags, NetDevice};
use host::hook::{HookError, HookId, HookRegistry, HookTable, PacketHook, ProtocolFilter};
use host::registry::{AllocError, DeviceRegistry, DeviceSlot, RegistrationRefused, RegistryError};
use host::watchdog::Watchdog;
use host::xmit::{DropReason, Transmit, XmitOutcome, admit, hand_over};
use mio::Events;
use net::frame::{Frame, FrameRef};
use net::interface::{InterfaceIndex, InterfaceName};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Largest frame read from a packet socket.
const MAX_FRAME: usize = 65_536;

/// How often the kernel interface list is read again.
const RESCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Errors from the kernel driver's IO thread.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum KernelError {
    /// The poller could not be created.
    #[error("failed to create poller: {0}")]
    Poll(io::Error),
    /// The IO thread could not be spawned.
    #[error("failed to spawn kernel driver IO thread: {0}")]
    Spawn(io::Error),
    /// The IO thread is already running.
    #[error("kernel driver IO thread already started")]
    AlreadyStarted,
}

struct Sink {
    device: Arc<dyn NetDevice>,
    tap: TapDevice,
    /// Sends duplicates out of the TAP device.
    out: RawPacketStream,
    /// Whether the kernel link was last set up.
    link_up: AtomicBool,
}

impl Sink {
    /// Bring the kernel link in line with the device: up with the device's address once the
    /// device is up, down once it is down.  Failures are logged and not retried.
    fn sync_link(&self) {
        let up = self.device.flags().contains(DeviceFlags::UP);
        if up == self.link_up.load(Ordering::Relaxed) {
            return;
        }
        let result = if up {
            self.tap
                .set_mac(self.device.mac())
                .and_then(|()| self.tap.set_link(true))
        } else {
            self.tap.set_link(false)
        };
        if let Err(e) = result {
            let state = if up { "up" } else { "down" };
            warn!("failed to set link of {} {state}: {e}", self.tap.name());
        }
        self.link_up.store(up, Ordering::Relaxed);
    }
}

/// The Linux kernel as host stack.
pub struct KernelHost {
    capacity: usize,
    allocated: Mutex<HashMap<InterfaceName, TapDevice>>,
    sinks: RwLock<HashMap<InterfaceIndex, Sink>>,
    hooks: HookTable,
    stop: AtomicBool,
    io: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for KernelHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelHost")
            .field("capacity", &self.capacity)
            .field("sinks", &self.sinks.read().len())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Default for KernelHost {
    fn default() -> Self {
        KernelHost::new()
    }
}

impl KernelHost {
    /// Number of TAP devices a [`KernelHost`] manages at a time.
    pub const DEFAULT_CAPACITY: usize = 4;

    /// Create a kernel host.  Nothing is observed until [`KernelHost::start`].
    #[must_use]
    pub fn new() -> KernelHost {
        KernelHost {
            capacity: KernelHost::DEFAULT_CAPACITY,
            allocated: Mutex::new(HashMap::new()),
            sinks: RwLock::new(HashMap::new()),
            hooks: HookTable::new(),
            stop: AtomicBool::new(false),
            io: Mutex::new(None),
        }
    }

    /// Spawn the IO thread.  It observes every kernel interface and polls the watchdogs every
    /// `tick`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] if the thread is already running or can not be started.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn start(self: &Arc<Self>, tick: Duration) -> Result<(), KernelError> {
        let mut io = self.io.lock();
        if io.is_some() {
            return Err(KernelError::AlreadyStarted);
        }
        let mut ports = PortTable::new().map_err(KernelError::Poll)?;
        ports.sync(&netdev::get_interfaces());
        if ports.len() == 0 {
            warn!(">>>>> Not observing any kernel interface yet <<<<<");
        }
        info!("Kernel interface configuration is:\n{ports}");

        self.stop.store(false, Ordering::Relaxed);
        let host = Arc::downgrade(self);
        let handle = thread::Builder::new()
            .name("netmirror-io".to_string())
            .spawn(move || io_loop(&host, ports, tick))
            .map_err(KernelError::Spawn)?;
        *io = Some(handle);
        info!("Kernel driver IO thread spawned");
        Ok(())
    }

    /// Stop the IO thread and wait for it to exit.  Does nothing if it is not running.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn stop(&self) {
        let Some(handle) = self.io.lock().take() else {
            return;
        };
        self.stop.store(true, Ordering::Relaxed);
        if handle.join().is_err() {
            error!("kernel driver IO thread panicked");
        }
        info!("Kernel driver IO thread stopped");
    }

    fn drop_frame(reason: DropReason) -> XmitOutcome {
        debug!("dropped frame: {reason}");
        XmitOutcome::Dropped(reason)
    }

    /// Read every pending frame of `port` and show it to the hooks.
    ///
    /// Returns false if the socket failed and the port should no longer be observed.
    fn drain(&self, port: &mut Port, raw: &mut [u8]) -> bool {
        loop {
            match port.sock.read(raw) {
                Ok(0) => return true,
                Ok(bytes) => match Frame::received(&raw[..bytes], port.ifindex) {
                    Ok(frame) => {
                        let frame = FrameRef::new(frame);
                        trace!("RX {bytes} bytes on {}", port.name);
                        self.hooks.run(&frame, port.ifindex, None);
                        frame.release();
                    }
                    Err(e) => trace!("ignoring frame on {}: {e}", port.name),
                },
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("Read error on '{}': {e}", port.name);
                    return false;
                }
            }
        }
    }

    /// Poll the watchdog of every registered device and sync its kernel link.
    fn watch(&self, now: u64, watchdogs: &mut HashMap<InterfaceIndex, Watchdog>) {
        let sinks = self.sinks.read();
        watchdogs.retain(|ifindex, _| sinks.contains_key(ifindex));
        for (ifindex, sink) in sinks.iter() {
            sink.sync_link();
            watchdogs
                .entry(*ifindex)
                .or_default()
                .poll(now, sink.device.as_ref());
        }
    }

    /// Drop what the kernel transmitted on the TAP devices.
    fn discard_sink_output(&self, raw: &mut [u8]) {
        for sink in self.sinks.read().values() {
            let frames = sink.tap.discard(raw);
            if frames > 0 {
                trace!("dropped {frames} frames transmitted on {}", sink.tap.name());
            }
        }
    }
}

/// The IO thread: read frames from the packet sockets and tick the watchdogs.
fn io_loop(host: &Weak<KernelHost>, mut ports: PortTable, tick: Duration) {
    let mut events = Events::with_capacity(256);
    let mut raw = vec![0u8; MAX_FRAME];
    let mut watchdogs = HashMap::new();
    let mut now = 0u64;
    let mut last_tick = Instant::now();
    let mut last_scan = Instant::now();
    loop {
        let Some(host) = host.upgrade() else {
            debug!("kernel host dropped, exiting");
            return;
        };
        if host.stop.load(Ordering::Relaxed) {
            return;
        }

        if let Err(e) = ports.poll.poll(&mut events, Some(tick)) {
            if e.kind() != io::ErrorKind::Interrupted {
                warn!("Poll error: {e}");
            }
            continue;
        }
        let mut failed = Vec::new();
        for event in events.iter().filter(|event| event.is_readable()) {
            if let Some(port) = ports.get_mut(event.token())
                && !host.drain(port, &mut raw)
            {
                failed.push(port.ifindex);
            }
        }
        for ifindex in failed {
            ports.remove(ifindex);
        }
        host.discard_sink_output(&mut raw);

        if last_tick.elapsed() >= tick {
            last_tick = Instant::now();
            now += 1;
            host.watch(now, &mut watchdogs);
            trace!(tick = now, ports = ports.len(), "tick");
        }
        if last_scan.elapsed() >= RESCAN_INTERVAL {
            last_scan = Instant::now();
            ports.sync(&netdev::get_interfaces());
        }
    }
}

impl DeviceRegistry for KernelHost {
    #[tracing::instrument(level = "debug", skip(self))]
    fn allocate(&self, name: &InterfaceName) -> Result<DeviceSlot, AllocError> {
        let mut allocated = self.allocated.lock();
        if allocated.len() + self.sinks.read().len() >= self.capacity {
            warn!("no tap device left for {name}");
            return Err(AllocError { name: name.clone() });
        }
        if get_interface_ifindex(&netdev::get_interfaces(), name.as_ref()).is_some() {
            warn!("kernel interface {name} already exists");
            return Err(AllocError { name: name.clone() });
        }
        match TapDevice::create(name) {
            Ok(tap) => {
                allocated.insert(name.clone(), tap);
                Ok(DeviceSlot::new(name.clone()))
            }
            Err(e) => {
                warn!("failed to create tap device {name}: {e}");
                Err(AllocError { name: name.clone() })
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, device))]
    fn register(
        &self,
        slot: DeviceSlot,
        device: Arc<dyn NetDevice>,
    ) -> Result<InterfaceIndex, RegistrationRefused> {
        let Some(tap) = self.allocated.lock().remove(slot.name()) else {
            let error = RegistryError::Refused("slot has no tap device".to_string());
            return Err(RegistrationRefused { slot, error });
        };
        let refuse = |tap: TapDevice,
                      slot: DeviceSlot,
                      error: RegistryError|
         -> Result<InterfaceIndex, RegistrationRefused> {
            self.allocated.lock().insert(slot.name().clone(), tap);
            Err(RegistrationRefused { slot, error })
        };
        let Some(ifindex) = get_interface_ifindex(&netdev::get_interfaces(), slot.name().as_ref())
        else {
            let error = RegistryError::Refused(format!("{} vanished", slot.name()));
            return refuse(tap, slot, error);
        };
        if let Err(e) = tap.disable_ipv6() {
            warn!("IPv6 stays enabled on {}: {e}", slot.name());
        }
        if let Err(e) = tap.set_noarp(device.flags().contains(DeviceFlags::NOARP)) {
            return refuse(tap, slot, RegistryError::Refused(e.to_string()));
        }
        let out = match transmit_socket(slot.name()) {
            Ok(out) => out,
            Err(e) => return refuse(tap, slot, RegistryError::Refused(e.to_string())),
        };
        info!("registered device {} at index {ifindex}", slot.name());
        let sink = Sink {
            device,
            tap,
            out,
            link_up: AtomicBool::new(false),
        };
        sink.sync_link();
        self.sinks.write().insert(ifindex, sink);
        Ok(ifindex)
    }

    fn release(&self, slot: DeviceSlot) {
        if self.allocated.lock().remove(slot.name()).is_some() {
            debug!("released tap device {}", slot.name());
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn unregister(&self, ifindex: InterfaceIndex) -> Result<DeviceSlot, RegistryError> {
        let Some(sink) = self.sinks.write().remove(&ifindex) else {
            return Err(RegistryError::NoSuchInterface(ifindex));
        };
        if let Err(e) = sink.tap.set_link(false) {
            warn!("failed to set {} down: {e}", sink.tap.name());
        }
        let slot = DeviceSlot::new(sink.tap.name().clone());
        // the tap device is destroyed once the slot is released
        self.allocated.lock().insert(slot.name().clone(), sink.tap);
        info!("unregistered device {} from index {ifindex}", slot.name());
        Ok(slot)
    }
}

impl HookRegistry for KernelHost {
    fn add_hook(
        &self,
        filter: ProtocolFilter,
        hook: Arc<dyn PacketHook>,
    ) -> Result<HookId, HookError> {
        Ok(self.hooks.install(filter, hook))
    }

    fn remove_hook(&self, id: HookId) -> Result<(), HookError> {
        self.hooks.uninstall(id)
    }
}

impl Transmit for KernelHost {
    fn dev_transmit(&self, frame: Frame) -> XmitOutcome {
        let Some(target) = frame.dev() else {
            return KernelHost::drop_frame(DropReason::NoDestination);
        };
        let sinks = self.sinks.read();
        let Some(sink) = sinks.get(&target) else {
            return KernelHost::drop_frame(DropReason::NoDevice(target));
        };
        let ifindex = match admit(sink.device.as_ref()) {
            Ok(ifindex) => ifindex,
            Err(reason) => return KernelHost::drop_frame(reason),
        };
        sink.sync_link();
        // the sink's own port sees the frame leave, with the sink as source
        if let Err(e) = (&sink.out).write_all(frame.as_ref()) {
            debug!("TX failed for frame ({} octets) on {}: {e}", frame.len(), sink.tap.name());
            return KernelHost::drop_frame(DropReason::Emit(ifindex));
        }
        trace!("TX {} bytes on {}", frame.len(), sink.tap.name());
        match hand_over(sink.device.as_ref(), ifindex, frame) {
            XmitOutcome::Dropped(reason) => KernelHost::drop_frame(reason),
            outcome @ XmitOutcome::Transmitted => outcome,
        }
    }
}

impl Drop for KernelHost {
    fn drop(&mut self) {
        // the IO thread may hold the last reference, so it is told to exit but not joined
        self.stop.store(true, Ordering::Relaxed);
    }
}
