// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! TAP devices backing the mirror interface on Linux.

#![allow(unsafe_code)] // ioctls

use net::eth::mac::Mac;
use net::interface::InterfaceName;
use nix::libc;
use nix::sys::socket::{AddressFamily, SockFlag, SockType, socket};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use tracing::{debug, info, trace};

const TUN_PATH: &str = "/dev/net/tun";

#[allow(clippy::cast_possible_truncation)] // both flags fit in the low 16 bits
const TAP_FLAGS: libc::c_short = (libc::IFF_TAP | libc::IFF_NO_PI) as libc::c_short;

#[allow(clippy::cast_possible_truncation)]
const LINK_UP: libc::c_short = libc::IFF_UP as libc::c_short;

#[allow(clippy::cast_possible_truncation)]
const NOARP: libc::c_short = libc::IFF_NOARP as libc::c_short;

/// An `ifreq` carrying an interface name and either a flags word or a hardware address.
///
/// <div class=warning>
///
/// This type is handed to the kernel by pointer and must stay transparent.
/// </div>
#[repr(transparent)]
struct InterfaceRequest(libc::ifreq);

nix::ioctl_write_ptr_bad!(
    /// Attach a tun file to a new tap device
    make_tap_device,
    libc::TUNSETIFF,
    InterfaceRequest
);

nix::ioctl_read_bad!(
    /// Read the flags of an interface
    get_interface_flags,
    libc::SIOCGIFFLAGS,
    InterfaceRequest
);

nix::ioctl_write_ptr_bad!(
    /// Write the flags of an interface
    set_interface_flags,
    libc::SIOCSIFFLAGS,
    InterfaceRequest
);

nix::ioctl_write_ptr_bad!(
    /// Write the hardware address of an interface
    set_hardware_address,
    libc::SIOCSIFHWADDR,
    InterfaceRequest
);

impl InterfaceRequest {
    fn new(name: &InterfaceName, flags: libc::c_short) -> InterfaceRequest {
        InterfaceRequest::build(name, libc::__c_anonymous_ifr_ifru { ifru_flags: flags })
    }

    fn with_hardware_address(name: &InterfaceName, mac: Mac) -> InterfaceRequest {
        let mut hwaddr = libc::sockaddr {
            sa_family: libc::ARPHRD_ETHER,
            sa_data: [0; 14],
        };
        for (slot, byte) in hwaddr.sa_data.iter_mut().zip(mac.0) {
            #[allow(clippy::cast_possible_wrap)]
            {
                *slot = byte as libc::c_char;
            }
        }
        InterfaceRequest::build(name, libc::__c_anonymous_ifr_ifru { ifru_hwaddr: hwaddr })
    }

    fn build(name: &InterfaceName, ifru: libc::__c_anonymous_ifr_ifru) -> InterfaceRequest {
        // we cannot support any platform for which this condition does not hold
        static_assertions::const_assert_eq!(libc::IF_NAMESIZE, InterfaceName::MAX_LEN + 1);
        let mut ifreq = libc::ifreq {
            ifr_name: [0; libc::IF_NAMESIZE],
            ifr_ifru: ifru,
        };
        for (slot, byte) in ifreq.ifr_name.iter_mut().zip(name.as_ref().as_bytes()) {
            // interface names are ASCII
            #[allow(clippy::cast_possible_wrap)]
            {
                *slot = *byte as libc::c_char;
            }
        }
        InterfaceRequest(ifreq)
    }

    fn flags(&self) -> libc::c_short {
        // only read back from requests built with `new`
        unsafe { self.0.ifr_ifru.ifru_flags }
    }
}

/// A datagram socket to carry interface ioctls.
fn control_socket() -> io::Result<std::os::fd::OwnedFd> {
    Ok(socket(
        AddressFamily::Inet,
        SockType::Datagram,
        SockFlag::SOCK_CLOEXEC,
        None,
    )?)
}

/// A non-persistent TAP device.  The device disappears when this is dropped.
pub(crate) struct TapDevice {
    name: InterfaceName,
    file: File,
}

impl std::fmt::Debug for TapDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapDevice")
            .field("name", &self.name)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

impl TapDevice {
    /// Create the TAP device `name`.
    #[cold]
    #[tracing::instrument(level = "debug")]
    pub(crate) fn create(name: &InterfaceName) -> std::io::Result<TapDevice> {
        trace!("opening {TUN_PATH}");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(false)
            .truncate(false)
            .custom_flags(libc::O_NONBLOCK)
            .open(TUN_PATH)?;
        let request = InterfaceRequest::new(name, TAP_FLAGS);
        unsafe { make_tap_device(file.as_raw_fd(), &raw const request)? };
        info!("created tap device {name}");
        Ok(TapDevice {
            name: name.clone(),
            file,
        })
    }

    #[must_use]
    pub(crate) fn name(&self) -> &InterfaceName {
        &self.name
    }

    /// Set the flags in `set` and clear those in `clear`.
    fn update_flags(&self, set: libc::c_short, clear: libc::c_short) -> io::Result<()> {
        let sock = control_socket()?;
        let mut request = InterfaceRequest::new(&self.name, 0);
        unsafe { get_interface_flags(sock.as_raw_fd(), &raw mut request)? };
        let request = InterfaceRequest::new(&self.name, (request.flags() | set) & !clear);
        unsafe { set_interface_flags(sock.as_raw_fd(), &raw const request)? };
        Ok(())
    }

    /// Set or clear the administrative up flag of the device.
    pub(crate) fn set_link(&self, up: bool) -> io::Result<()> {
        if up {
            self.update_flags(LINK_UP, 0)?;
        } else {
            self.update_flags(0, LINK_UP)?;
        }
        debug!("set link of {} {}", self.name, if up { "up" } else { "down" });
        Ok(())
    }

    /// Set or clear the no-ARP flag of the device.
    pub(crate) fn set_noarp(&self, noarp: bool) -> io::Result<()> {
        if noarp {
            self.update_flags(NOARP, 0)
        } else {
            self.update_flags(0, NOARP)
        }
    }

    /// Give the device the hardware address `mac`.
    pub(crate) fn set_mac(&self, mac: Mac) -> io::Result<()> {
        let sock = control_socket()?;
        let request = InterfaceRequest::with_hardware_address(&self.name, mac);
        unsafe { set_hardware_address(sock.as_raw_fd(), &raw const request)? };
        debug!("set address of {} to {mac}", self.name);
        Ok(())
    }

    /// Keep the kernel from configuring IPv6 on the device.  Hosts without IPv6 have nothing to
    /// disable.
    pub(crate) fn disable_ipv6(&self) -> io::Result<()> {
        let path = format!("/proc/sys/net/ipv6/conf/{}/disable_ipv6", self.name);
        match std::fs::write(path, "1") {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no IPv6 on {}", self.name);
                Ok(())
            }
            result => result,
        }
    }

    /// Read and drop every frame the kernel transmitted on the device.  Returns the number of
    /// frames dropped.
    pub(crate) fn discard(&self, buf: &mut [u8]) -> usize {
        let mut frames = 0;
        loop {
            match (&self.file).read(buf) {
                Ok(0) => return frames,
                Ok(_) => frames += 1,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock {
                        debug!("read error on {}: {e}", self.name);
                    }
                    return frames;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::drivers::kernel::tuntap::{InterfaceRequest, TAP_FLAGS};
    use net::eth::mac::Mac;
    use net::interface::InterfaceName;
    use nix::libc;

    #[test]
    fn interface_request_new_contract() {
        bolero::check!()
            .with_type()
            .for_each(|name: &InterfaceName| {
                let request = InterfaceRequest::new(name, TAP_FLAGS);
                let raw = &request.0.ifr_name;
                let len = name.as_ref().len();
                assert_eq!(raw[raw.len() - 1], 0);
                assert_eq!(raw[len], 0, "memory integrity error");
                #[allow(clippy::cast_sign_loss)]
                let bytes: Vec<u8> = raw[..len].iter().map(|c| *c as u8).collect();
                assert_eq!(bytes, name.as_ref().as_bytes());
                assert_eq!(request.flags(), TAP_FLAGS);
            });
    }

    #[test]
    fn hardware_address_request_contract() {
        bolero::check!()
            .with_type()
            .for_each(|(name, mac): &(InterfaceName, Mac)| {
                let request = InterfaceRequest::with_hardware_address(name, *mac);
                let len = name.as_ref().len();
                assert_eq!(request.0.ifr_name[len], 0);
                let hwaddr = unsafe { request.0.ifr_ifru.ifru_hwaddr };
                assert_eq!(hwaddr.sa_family, libc::ARPHRD_ETHER);
                #[allow(clippy::cast_sign_loss)]
                let bytes: Vec<u8> = hwaddr.sa_data[..6].iter().map(|c| *c as u8).collect();
                assert_eq!(bytes, mac.0);
                assert!(hwaddr.sa_data[6..].iter().all(|c| *c == 0));
            });
    }
}
