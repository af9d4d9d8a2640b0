// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet types

pub mod ethtype;
pub mod mac;

use crate::eth::ethtype::EthType;
use crate::eth::mac::Mac;
use etherparse::Ethernet2Header;
use tracing::trace;

/// Length of an ethernet II header.
#[allow(clippy::cast_possible_truncation)] // 14 fits
pub const ETH_HLEN: u16 = Ethernet2Header::LEN as u16;

/// The protocol a frame carries, as far as its link-layer header tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameProtocol {
    /// Ethernet II frame carrying the given ethertype.
    Ethernet(EthType),
    /// 802.3 frame without an LLC header (raw IPX).
    Ieee8023,
    /// 802.3 frame carrying an 802.2 LLC header.
    Ieee8022,
}

/// Who a frame is addressed to, relative to the interface handling it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Addressed to the interface itself.
    #[default]
    Host,
    /// Addressed to everyone.
    Broadcast,
    /// Addressed to a multicast group.
    Multicast,
    /// Addressed to some other host.
    OtherHost,
}

/// The result of classifying a frame by its link-layer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Payload protocol.
    pub protocol: FrameProtocol,
    /// Addressing relative to the classifying interface.
    pub pkt_type: PacketType,
}

/// Error returned when a frame is too short to hold an ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame of {actual} bytes is too short for an ethernet header (14 bytes)")]
pub struct TruncatedHeader {
    /// Length of the offending frame.
    pub actual: usize,
}

/// Classify a frame starting at its link-layer header on behalf of the interface with address
/// `local`.
///
/// This is bookkeeping only: no header is consumed or altered.
///
/// # Errors
///
/// Returns [`TruncatedHeader`] if `frame` can not hold an ethernet header.
pub fn classify(frame: &[u8], local: Mac) -> Result<Classification, TruncatedHeader> {
    let (header, payload) =
        Ethernet2Header::from_slice(frame).map_err(|_| TruncatedHeader {
            actual: frame.len(),
        })?;
    let destination = Mac(header.destination);
    let pkt_type = if destination.is_broadcast() {
        PacketType::Broadcast
    } else if destination.is_multicast() {
        PacketType::Multicast
    } else if destination == local {
        PacketType::Host
    } else {
        PacketType::OtherHost
    };
    let protocol = match EthType::new(header.ether_type.0) {
        Ok(eth_type) => FrameProtocol::Ethernet(eth_type),
        // length field: look at the start of the payload to tell raw 802.3 from 802.2 LLC
        Err(_) if payload.starts_with(&[0xff, 0xff]) => FrameProtocol::Ieee8023,
        Err(_) => FrameProtocol::Ieee8022,
    };
    trace!("classified frame as {protocol:?} / {pkt_type:?}");
    Ok(Classification { protocol, pkt_type })
}

#[cfg(test)]
mod test {
    use crate::eth::ethtype::EthType;
    use crate::eth::mac::Mac;
    use crate::eth::{ETH_HLEN, FrameProtocol, PacketType, TruncatedHeader, classify};

    const LOCAL: Mac = Mac([0x4e, 0x45, 0x54, 0x4d, 0x49, 0x52]);

    fn frame(dst: Mac, ether_type: [u8; 2], payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&dst.0);
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 1]);
        frame.extend_from_slice(&ether_type);
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn ipv4_to_local_host() {
        let class = classify(&frame(LOCAL, [0x08, 0x00], &[0; 20]), LOCAL).unwrap();
        assert_eq!(class.protocol, FrameProtocol::Ethernet(EthType::IPV4));
        assert_eq!(class.pkt_type, PacketType::Host);
    }

    #[test]
    fn addressing() {
        let bcast = classify(&frame(Mac::BROADCAST, [0x08, 0x06], &[]), LOCAL).unwrap();
        assert_eq!(bcast.pkt_type, PacketType::Broadcast);
        assert_eq!(bcast.protocol, FrameProtocol::Ethernet(EthType::ARP));
        let mcast = classify(&frame(Mac([0x01, 0, 0x5e, 0, 0, 1]), [0x86, 0xdd], &[]), LOCAL);
        assert_eq!(mcast.unwrap().pkt_type, PacketType::Multicast);
        let other = classify(&frame(Mac([0x02, 0, 0, 0, 0, 9]), [0x86, 0xdd], &[]), LOCAL);
        assert_eq!(other.unwrap().pkt_type, PacketType::OtherHost);
    }

    #[test]
    fn length_frames() {
        let raw = classify(&frame(LOCAL, [0x00, 0x40], &[0xff, 0xff, 0]), LOCAL).unwrap();
        assert_eq!(raw.protocol, FrameProtocol::Ieee8023);
        let llc = classify(&frame(LOCAL, [0x00, 0x40], &[0x42, 0x42, 0x03]), LOCAL).unwrap();
        assert_eq!(llc.protocol, FrameProtocol::Ieee8022);
    }

    #[test]
    fn short_frames_are_rejected() {
        bolero::check!().with_type::<Vec<u8>>().for_each(|bytes| {
            let result = classify(bytes, LOCAL);
            if bytes.len() < usize::from(ETH_HLEN) {
                assert_eq!(
                    result,
                    Err(TruncatedHeader {
                        actual: bytes.len()
                    })
                );
            } else {
                assert!(result.is_ok());
            }
        });
    }
}
