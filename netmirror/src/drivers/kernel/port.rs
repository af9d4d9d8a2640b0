// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packet sockets observing kernel interfaces.

use afpacket::sync::RawPacketStream;
use mio::unix::SourceFd;
use mio::{Interest, Poll, Token};
use net::interface::{InterfaceIndex, InterfaceName};
use netdev::Interface;
use std::collections::HashMap;
use std::fmt::Display;
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, info, warn};

/// One kernel interface, observed through its own `AF_PACKET` socket.
pub(crate) struct Port {
    pub(crate) name: InterfaceName,
    pub(crate) ifindex: InterfaceIndex,
    pub(crate) sock: RawPacketStream,
    raw_fd: RawFd,
    token: Token,
}

impl Port {
    /// Open and bind a non-blocking packet socket for interface `name`.
    fn new(ifindex: InterfaceIndex, name: &InterfaceName, token: Token) -> std::io::Result<Port> {
        let mut sock = RawPacketStream::new()?;
        sock.set_non_blocking()?;
        sock.bind(name.as_ref())?;
        let raw_fd = sock.as_raw_fd();
        debug!("opened packet socket for {name}");
        Ok(Port {
            name: name.clone(),
            ifindex,
            sock,
            raw_fd,
            token,
        })
    }
}

/// `ret #0`: a socket filter which accepts nothing.
const REJECT_ALL: afpacket::sync::Filter = (0x06, 0, 0, 0);

/// Open a non-blocking packet socket which sends frames out of interface `name` and never
/// queues any it could receive.
pub(crate) fn transmit_socket(name: &InterfaceName) -> std::io::Result<RawPacketStream> {
    let mut sock = RawPacketStream::new()?;
    sock.set_bpf_filter(vec![REJECT_ALL])?;
    // frames queued before the filter was attached
    sock.drain();
    sock.bind(name.as_ref())?;
    sock.set_non_blocking()?;
    debug!("opened transmit socket for {name}");
    Ok(sock)
}

/// The observed ports, keyed by their poller [`Token`].
pub(crate) struct PortTable {
    pub(crate) poll: Poll,
    by_token: HashMap<Token, Port>,
    next_token: usize,
}

impl PortTable {
    pub(crate) fn new() -> std::io::Result<PortTable> {
        Ok(PortTable {
            poll: Poll::new()?,
            by_token: HashMap::new(),
            next_token: 1,
        })
    }

    /// Observe interface `name`.
    pub(crate) fn add(&mut self, ifindex: InterfaceIndex, name: &InterfaceName) -> std::io::Result<()> {
        let token = Token(self.next_token);
        let port = Port::new(ifindex, name, token)?;
        self.poll
            .registry()
            .register(&mut SourceFd(&port.raw_fd), token, Interest::READABLE)?;
        self.by_token.insert(token, port);
        self.next_token += 1;
        debug!("observing {name} with token {token:?}");
        Ok(())
    }

    /// Compare the observed ports against `inventory`.
    ///
    /// Returns the interfaces which are not observed yet and the indices of the ports whose
    /// interface is gone.  A renamed interface shows up in both.
    pub(crate) fn changes(
        &self,
        inventory: &[Interface],
    ) -> (Vec<(InterfaceIndex, InterfaceName)>, Vec<InterfaceIndex>) {
        let current: Vec<(InterfaceIndex, InterfaceName)> = inventory
            .iter()
            .filter_map(|interface| {
                let name = InterfaceName::try_from(interface.name.as_str()).ok()?;
                let ifindex = InterfaceIndex::try_new(interface.index).ok()?;
                Some((ifindex, name))
            })
            .collect();
        let observed = |ifindex: InterfaceIndex, name: &InterfaceName| {
            self.by_token
                .values()
                .any(|port| port.ifindex == ifindex && port.name == *name)
        };
        let vanished = self
            .by_token
            .values()
            .filter(|port| {
                !current
                    .iter()
                    .any(|(ifindex, name)| port.ifindex == *ifindex && port.name == *name)
            })
            .map(|port| port.ifindex)
            .collect();
        let added = current
            .into_iter()
            .filter(|(ifindex, name)| !observed(*ifindex, name))
            .collect();
        (added, vanished)
    }

    /// Make the observed ports match `inventory`.  Interfaces which can not be opened are
    /// retried on the next call.
    pub(crate) fn sync(&mut self, inventory: &[Interface]) {
        let (added, vanished) = self.changes(inventory);
        for ifindex in vanished {
            self.remove(ifindex);
        }
        for (ifindex, name) in added {
            match self.add(ifindex, &name) {
                Ok(()) => info!("observing {name} (index {ifindex})"),
                Err(e) => debug!("not observing {name} yet: {e}"),
            }
        }
    }

    /// Stop observing the port with index `ifindex`.
    pub(crate) fn remove(&mut self, ifindex: InterfaceIndex) {
        let Some(token) = self
            .by_token
            .values()
            .find(|port| port.ifindex == ifindex)
            .map(|port| port.token)
        else {
            return;
        };
        if let Some(port) = self.by_token.remove(&token) {
            if let Err(e) = self.poll.registry().deregister(&mut SourceFd(&port.raw_fd)) {
                warn!("failed to deregister {}: {e}", port.name);
            }
            debug!("no longer observing {}", port.name);
        }
    }

    pub(crate) fn get_mut(&mut self, token: Token) -> Option<&mut Port> {
        self.by_token.get_mut(&token)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_token.len()
    }
}

macro_rules! PORT_FMT {
    () => {
        "   {:<16} {:<8} {:<6}"
    };
}

impl Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            PORT_FMT!(),
            self.name.to_string(),
            self.ifindex.to_string(),
            self.token.0
        )
    }
}

impl Display for PortTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "━━━━━━━━━━━━━━━━━━━━━ observed interfaces ━━━━━━━━━━━━━━━━━━━━━"
        )?;
        writeln!(f, PORT_FMT!(), "interface", "ifindex", "token")?;
        let mut ports: Vec<_> = self.by_token.values().collect();
        ports.sort_by_key(|port| port.ifindex);
        for port in ports {
            port.fmt(f)?;
        }
        writeln!(
            f,
            "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
        )
    }
}

/// Get the ifindex of the kernel interface with the given name.
pub(crate) fn get_interface_ifindex(interfaces: &[Interface], name: &str) -> Option<InterfaceIndex> {
    interfaces
        .iter()
        .find(|interface| interface.name == name)
        .and_then(|interface| InterfaceIndex::try_new(interface.index).ok())
}
