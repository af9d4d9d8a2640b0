// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{TxCounters, VifConfig};
use host::device::{
    ControlCommand, ControlReply, DeviceError, DeviceFeatures, DeviceFlags, DeviceStats, IfMap,
    LinkState, NetDevice, TxStatus,
};
use net::eth::classify;
use net::eth::mac::Mac;
use net::frame::Frame;
use net::interface::{InterfaceIndex, InterfaceName};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info, trace};

/// The mirror sink.
///
/// A software ethernet interface with a fixed hardware address.  It never resolves addresses and
/// never originates traffic; every frame handed to it is classified, counted and dropped.
#[derive(Debug)]
pub struct VirtualInterface {
    name: InterfaceName,
    mac: Mac,
    dev_addr: OnceLock<Mac>,
    ifindex: OnceLock<InterfaceIndex>,
    flags: AtomicU32,
    queue_stopped: AtomicBool,
    watchdog_ticks: u64,
    base_addr: u16,
    counters: TxCounters,
}

impl VirtualInterface {
    /// Interface flags before the first bring-up.
    pub const INITIAL_FLAGS: DeviceFlags = DeviceFlags::BROADCAST
        .union(DeviceFlags::MULTICAST)
        .union(DeviceFlags::NOARP);

    /// Create a new, down, unregistered interface.
    #[must_use]
    pub fn new(config: &VifConfig) -> VirtualInterface {
        VirtualInterface {
            name: config.interface_name.clone(),
            mac: config.mac,
            dev_addr: OnceLock::new(),
            ifindex: OnceLock::new(),
            flags: AtomicU32::new(VirtualInterface::INITIAL_FLAGS.bits()),
            queue_stopped: AtomicBool::new(true),
            watchdog_ticks: config.watchdog_ticks,
            base_addr: 0,
            counters: TxCounters::default(),
        }
    }

    fn is_up(&self) -> bool {
        self.flags().contains(DeviceFlags::UP)
    }

    fn wake_queue(&self) {
        self.queue_stopped.store(false, Ordering::Release);
    }
}

impl NetDevice for VirtualInterface {
    fn name(&self) -> &InterfaceName {
        &self.name
    }

    fn mac(&self) -> Mac {
        self.dev_addr.get().copied().unwrap_or(Mac::ZERO)
    }

    fn attach(&self, ifindex: InterfaceIndex) {
        if let Err(ifindex) = self.ifindex.set(ifindex) {
            debug!("{} already attached, ignoring index {ifindex}", self.name);
        }
    }

    fn ifindex(&self) -> Option<InterfaceIndex> {
        self.ifindex.get().copied()
    }

    fn flags(&self) -> DeviceFlags {
        DeviceFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    fn features(&self) -> DeviceFeatures {
        DeviceFeatures::HW_CSUM
    }

    fn watchdog_timeout(&self) -> u64 {
        self.watchdog_ticks
    }

    fn is_queue_stopped(&self) -> bool {
        self.queue_stopped.load(Ordering::Acquire)
    }

    fn stop_queue(&self) {
        self.queue_stopped.store(true, Ordering::Release);
    }

    #[tracing::instrument(level = "debug", skip(self), fields(name = %self.name))]
    fn bring_up(&self) -> Result<(), DeviceError> {
        let _ = self.dev_addr.set(self.mac);
        self.wake_queue();
        self.flags.fetch_or(DeviceFlags::UP.bits(), Ordering::AcqRel);
        info!("{} is up with address {}", self.name, self.mac());
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(name = %self.name))]
    fn bring_down(&self) -> Result<(), DeviceError> {
        self.stop_queue();
        let was = self
            .flags
            .fetch_and(!DeviceFlags::UP.bits(), Ordering::AcqRel);
        if was & DeviceFlags::UP.bits() != 0 {
            info!("{} is down", self.name);
        }
        Ok(())
    }

    fn transmit(&self, mut frame: Frame) -> TxStatus {
        match classify(frame.as_ref(), self.mac()) {
            Ok(classification) => frame.set_classification(classification),
            Err(e) => trace!("{}: unclassified frame: {e}", self.name),
        }
        self.counters.count_frame(frame.len());
        trace!("{} consumed {} byte frame", self.name, frame.len());
        TxStatus::Ok
    }

    fn stats(&self) -> DeviceStats {
        self.counters.snapshot()
    }

    fn handle_timeout(&self) {
        self.counters.count_error();
        debug!("{}: transmit timeout, waking queue", self.name);
        self.wake_queue();
    }

    fn reconfigure(&self, map: &IfMap) -> Result<(), DeviceError> {
        if self.is_up() {
            return Err(DeviceError::Busy);
        }
        if map.base_addr != self.base_addr {
            debug!(
                "{}: refusing to move base address to {:#x}",
                self.name, map.base_addr
            );
            return Err(DeviceError::NotSupported);
        }
        Ok(())
    }

    fn control(&self, command: &ControlCommand) -> Result<ControlReply, DeviceError> {
        trace!(
            "{}: control command {:#x} with {} byte payload",
            self.name,
            command.code,
            command.payload.len()
        );
        Ok(ControlReply { code: command.code })
    }

    fn link_state(&self) -> LinkState {
        LinkState::Up
    }
}
