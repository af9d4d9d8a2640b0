// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A bare device for exercising the host side in tests.

use crate::device::{
    ControlCommand, ControlReply, DeviceError, DeviceFeatures, DeviceFlags, DeviceStats, IfMap,
    LinkState, NetDevice, TxStatus,
};
use net::eth::mac::Mac;
use net::frame::Frame;
use net::interface::{InterfaceIndex, InterfaceName};
use parking_lot::Mutex;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct Stub {
    name: InterfaceName,
    ifindex: OnceLock<InterfaceIndex>,
    pub(crate) up: AtomicBool,
    stopped: AtomicBool,
    pub(crate) timeouts: AtomicU64,
    pub(crate) transmitted: Mutex<Vec<Vec<u8>>>,
}

impl Stub {
    pub(crate) fn new(name: &str) -> Stub {
        Stub {
            name: InterfaceName::try_from(name).unwrap(),
            ifindex: OnceLock::new(),
            up: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            timeouts: AtomicU64::new(0),
            transmitted: Mutex::new(Vec::new()),
        }
    }
}

impl NetDevice for Stub {
    fn name(&self) -> &InterfaceName {
        &self.name
    }
    fn mac(&self) -> Mac {
        Mac::ZERO
    }
    fn attach(&self, ifindex: InterfaceIndex) {
        let _ = self.ifindex.set(ifindex);
    }
    fn ifindex(&self) -> Option<InterfaceIndex> {
        self.ifindex.get().copied()
    }
    fn flags(&self) -> DeviceFlags {
        if self.up.load(Ordering::Relaxed) {
            DeviceFlags::UP
        } else {
            DeviceFlags::empty()
        }
    }
    fn features(&self) -> DeviceFeatures {
        DeviceFeatures::empty()
    }
    fn watchdog_timeout(&self) -> u64 {
        5
    }
    fn is_queue_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
    fn stop_queue(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
    fn bring_up(&self) -> Result<(), DeviceError> {
        self.up.store(true, Ordering::Relaxed);
        Ok(())
    }
    fn bring_down(&self) -> Result<(), DeviceError> {
        self.up.store(false, Ordering::Relaxed);
        Ok(())
    }
    fn transmit(&self, frame: Frame) -> TxStatus {
        self.transmitted.lock().push(frame.as_ref().to_vec());
        TxStatus::Ok
    }
    fn stats(&self) -> DeviceStats {
        DeviceStats::default()
    }
    fn handle_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.stopped.store(false, Ordering::Relaxed);
    }
    fn reconfigure(&self, _: &IfMap) -> Result<(), DeviceError> {
        Err(DeviceError::NotSupported)
    }
    fn control(&self, command: &ControlCommand) -> Result<ControlReply, DeviceError> {
        Ok(ControlReply { code: command.code })
    }
    fn link_state(&self) -> LinkState {
        LinkState::Up
    }
}
