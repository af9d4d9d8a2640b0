// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::config::MirrorConfig;
use host::Host;
use host::device::{DeviceError, DeviceStats, NetDevice};
use host::hook::{HookError, HookId, ProtocolFilter};
use host::registry::{AllocError, RegistryError};
use host::xmit::Transmit;
use net::buffer::{BufferPool, HeapPool};
use net::interface::{InterfaceIndex, InterfaceName};
use std::sync::Arc;
use tap::{MirrorTap, TapStats};
use tracing::{debug, info, warn};
use vif::VirtualInterface;

/// Errors which may occur while setting up a [`Mirror`].
///
/// Whatever step fails, everything done by earlier steps has been undone when this is returned.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum InitError {
    /// The host has no resources left for another device.
    #[error("failed to allocate the mirror interface")]
    ResourceExhausted(#[from] AllocError),
    /// The host refused to register the mirror interface.
    #[error("failed to register mirror interface {name}")]
    RegistrationFailed {
        /// Name of the mirror interface.
        name: InterfaceName,
        /// Why the registry refused.
        #[source]
        source: RegistryError,
    },
    /// The mirror interface refused to come up.
    #[error("failed to bring up mirror interface {name}")]
    BringUp {
        /// Name of the mirror interface.
        name: InterfaceName,
        /// Why the interface refused.
        #[source]
        source: DeviceError,
    },
    /// The host refused to install the mirror hook.
    #[error("failed to install the mirror hook")]
    ActivationFailed(#[from] HookError),
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    ifindex: InterfaceIndex,
    hook: HookId,
}

/// A running mirror: the sink registered with a host and the tap installed in its hook table.
///
/// Dropping a [`Mirror`] shuts it down.
#[derive(Debug)]
pub struct Mirror<H: Host> {
    host: Arc<H>,
    device: Arc<VirtualInterface>,
    tap: Arc<MirrorTap>,
    registration: Option<Registration>,
}

/// Take a registered sink out of the host: down, unregistered, released.
fn retire<H: Host>(host: &H, device: &VirtualInterface, ifindex: InterfaceIndex) {
    if let Err(e) = device.bring_down() {
        warn!("failed to bring down {}: {e}", device.name());
    }
    match host.unregister(ifindex) {
        Ok(slot) => host.release(slot),
        Err(e) => warn!("failed to unregister {}: {e}", device.name()),
    }
}

impl<H: Host> Mirror<H> {
    /// Set up a mirror on `host`, allocating duplicates from the heap.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if any step fails.
    pub fn initialize(host: Arc<H>, config: &MirrorConfig) -> Result<Mirror<H>, InitError> {
        Mirror::initialize_with_pool(host, config, Arc::new(HeapPool::new()))
    }

    /// Set up a mirror on `host`, allocating duplicates from `pool`.
    ///
    /// The sink is allocated and registered first and the tap is installed last, so that no frame
    /// is ever mirrored onto an interface the host does not know.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if any step fails.
    #[tracing::instrument(level = "info", skip(host, pool))]
    pub fn initialize_with_pool(
        host: Arc<H>,
        config: &MirrorConfig,
        pool: Arc<dyn BufferPool>,
    ) -> Result<Mirror<H>, InitError> {
        let name = config.interface_name.clone();
        let slot = host.allocate(&name)?;
        let device = Arc::new(VirtualInterface::new(&config.vif()));
        let ifindex = match host.register(slot, device.clone()) {
            Ok(ifindex) => ifindex,
            Err(refused) => {
                host.release(refused.slot);
                return Err(InitError::RegistrationFailed {
                    name,
                    source: refused.error,
                });
            }
        };
        device.attach(ifindex);
        if config.auto_up
            && let Err(source) = device.bring_up()
        {
            retire(host.as_ref(), &device, ifindex);
            return Err(InitError::BringUp { name, source });
        }

        let transmit: Arc<dyn Transmit> = host.clone();
        let tap = Arc::new(MirrorTap::new(transmit, pool));
        tap.activate(ifindex);
        let hook = match host.add_hook(ProtocolFilter::All, tap.clone()) {
            Ok(hook) => hook,
            Err(e) => {
                tap.deactivate();
                retire(host.as_ref(), &device, ifindex);
                return Err(e.into());
            }
        };
        info!("mirroring all traffic onto {name} (index {ifindex})");
        Ok(Mirror {
            host,
            device,
            tap,
            registration: Some(Registration { ifindex, hook }),
        })
    }

    /// The mirror sink.
    #[must_use]
    pub fn device(&self) -> &Arc<VirtualInterface> {
        &self.device
    }

    /// Index of the mirror sink, while the mirror is running.
    #[must_use]
    pub fn ifindex(&self) -> Option<InterfaceIndex> {
        self.registration.map(|registration| registration.ifindex)
    }

    /// Returns true until [`Mirror::shutdown`] has run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.registration.is_some()
    }

    /// Transmit counters of the sink.
    #[must_use]
    pub fn device_stats(&self) -> DeviceStats {
        self.device.stats()
    }

    /// Counters of the tap.
    #[must_use]
    pub fn tap_stats(&self) -> TapStats {
        self.tap.stats()
    }

    /// Tear the mirror down: the hook goes first, then the sink.
    ///
    /// Observations in flight are waited for, so that no duplicate reaches the sink after it was
    /// unregistered.  Calling this again does nothing.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn shutdown(&mut self) {
        let Some(Registration { ifindex, hook }) = self.registration.take() else {
            debug!("mirror already shut down");
            return;
        };
        if let Err(e) = self.host.remove_hook(hook) {
            warn!("failed to remove mirror hook: {e}");
        }
        self.tap.deactivate();
        retire(self.host.as_ref(), &self.device, ifindex);
        info!("stopped mirroring onto {}", self.device.name());
    }
}

impl<H: Host> Drop for Mirror<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
