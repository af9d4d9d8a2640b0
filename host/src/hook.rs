// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packet hooks: callbacks the stack invokes for every frame it handles.

use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::eth::{FrameProtocol, classify};
use net::frame::{Frame, FrameRef};
use net::interface::InterfaceIndex;
use parking_lot::RwLock;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Which frames a hook wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFilter {
    /// Every frame, whatever it carries.
    All,
    /// Only ethernet II frames carrying the given ethertype.
    EthType(EthType),
}

impl ProtocolFilter {
    /// Returns true if `frame` passes this filter.
    #[must_use]
    pub fn matches(&self, frame: &Frame) -> bool {
        match self {
            ProtocolFilter::All => true,
            ProtocolFilter::EthType(wanted) => {
                let protocol = match frame.classification() {
                    Some(class) => Some(class.protocol),
                    None => frame
                        .mac_header()
                        .and_then(|header| classify(header, Mac::ZERO).ok())
                        .map(|class| class.protocol),
                };
                protocol == Some(FrameProtocol::Ethernet(*wanted))
            }
        }
    }
}

/// What a hook did with the frame it was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The hook is done with its reference.
    Consumed,
}

/// Identifies an installed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

impl HookId {
    /// Wrap a raw hook id.  Only hook registries create ids.
    #[must_use]
    pub const fn new(raw: u64) -> HookId {
        HookId(raw)
    }
}

impl Display for HookId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "hook-{}", self.0)
    }
}

/// Errors from the hook table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// The host refused to install the hook.
    #[error("host refused to install hook: {0}")]
    Refused(String),
    /// No hook with the given id is installed.
    #[error("{0} is not installed")]
    UnknownHook(HookId),
}

/// A callback the stack invokes for every frame matching its [`ProtocolFilter`].
///
/// The hook receives its own reference to the frame.  Other consumers may hold references to the
/// same frame at the same time, so the frame must be treated as read only.
pub trait PacketHook: Send + Sync {
    /// Observe a frame.
    ///
    /// `source` is the interface the frame was received on (or is being sent through),
    /// `destination` is the interface the frame is headed to, if the stack knows it.
    fn on_frame(
        &self,
        frame: FrameRef,
        source: InterfaceIndex,
        destination: Option<InterfaceIndex>,
    ) -> Disposition;
}

/// The host's table of installed hooks.
pub trait HookRegistry: Send + Sync {
    /// Install a hook.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Refused`] if the host does not accept the hook.
    fn add_hook(
        &self,
        filter: ProtocolFilter,
        hook: Arc<dyn PacketHook>,
    ) -> Result<HookId, HookError>;

    /// Remove a hook.  Once this returns the stack starts no new invocations of the hook, though
    /// invocations already in flight may still be running.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownHook`] if `id` is not installed.
    fn remove_hook(&self, id: HookId) -> Result<(), HookError>;
}

struct Installed {
    id: HookId,
    filter: ProtocolFilter,
    hook: Arc<dyn PacketHook>,
}

/// The installed hooks of a host, in installation order.
///
/// Hosts build their [`HookRegistry`] on top of this.
pub struct HookTable {
    hooks: RwLock<Vec<Installed>>,
    next: AtomicU64,
}

impl Debug for HookTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookTable")
            .field("hooks", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for HookTable {
    fn default() -> Self {
        HookTable::new()
    }
}

impl HookTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> HookTable {
        HookTable {
            hooks: RwLock::new(Vec::new()),
            next: AtomicU64::new(1),
        }
    }

    /// Install `hook` and return its id.
    pub fn install(&self, filter: ProtocolFilter, hook: Arc<dyn PacketHook>) -> HookId {
        let id = HookId::new(self.next.fetch_add(1, Ordering::Relaxed));
        self.hooks.write().push(Installed { id, filter, hook });
        debug!("installed {id} for {filter:?}");
        id
    }

    /// Remove the hook with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownHook`] if `id` is not installed.
    pub fn uninstall(&self, id: HookId) -> Result<(), HookError> {
        let mut hooks = self.hooks.write();
        let Some(pos) = hooks.iter().position(|installed| installed.id == id) else {
            return Err(HookError::UnknownHook(id));
        };
        hooks.remove(pos);
        debug!("removed {id}");
        Ok(())
    }

    /// Number of installed hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Returns true if no hook is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Show `frame` to every matching hook and return how many saw it.
    ///
    /// The table lock is not held while hooks run, so hooks may transmit (and thereby re-enter
    /// the table).  The caller keeps its own reference, so every hook sees the frame as shared.
    pub fn run(
        &self,
        frame: &FrameRef,
        source: InterfaceIndex,
        destination: Option<InterfaceIndex>,
    ) -> usize {
        let matching: Vec<_> = self
            .hooks
            .read()
            .iter()
            .filter(|installed| installed.filter.matches(frame))
            .map(|installed| installed.hook.clone())
            .collect();
        for hook in &matching {
            match hook.on_frame(frame.clone(), source, destination) {
                Disposition::Consumed => {}
            }
        }
        matching.len()
    }
}
