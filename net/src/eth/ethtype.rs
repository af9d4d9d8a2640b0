// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The type/length field of an ethernet header.

use etherparse::EtherType;
use std::fmt::{Display, Formatter};

/// An ethertype: a type/length field value which names the payload protocol.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EthType(pub(crate) EtherType);

/// Type/length field values which are not ethertypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EthTypeError {
    /// An 802.3 frame: the field holds the payload length.
    #[error("{0} is an 802.3 payload length, not an ethertype")]
    Length(u16),
    /// Neither a length nor an ethertype (1501 to 1535).
    #[error("{0:#06x} is neither a payload length nor an ethertype")]
    Undefined(u16),
}

impl Display for EthType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0.0)
    }
}

impl EthType {
    /// Address resolution protocol.
    pub const ARP: EthType = EthType(EtherType::ARP);
    /// IPv4.
    pub const IPV4: EthType = EthType(EtherType::IPV4);
    /// IPv6.
    pub const IPV6: EthType = EthType(EtherType::IPV6);
    /// 802.1Q tagged frame.
    pub const VLAN: EthType = EthType(EtherType::VLAN_TAGGED_FRAME);

    /// Largest 802.3 payload length.
    pub const MAX_LENGTH: u16 = 1500;
    /// Smallest ethertype.
    pub const MIN: u16 = 0x0600;

    /// Interpret a type/length field value (host byte order).
    ///
    /// # Errors
    ///
    /// Returns an [`EthTypeError`] if `raw` is a payload length or undefined.
    pub const fn new(raw: u16) -> Result<EthType, EthTypeError> {
        if raw <= EthType::MAX_LENGTH {
            Err(EthTypeError::Length(raw))
        } else if raw < EthType::MIN {
            Err(EthTypeError::Undefined(raw))
        } else {
            Ok(EthType(EtherType(raw)))
        }
    }

    /// The field value in host byte order.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self.0.0
    }
}

impl TryFrom<u16> for EthType {
    type Error = EthTypeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        EthType::new(value)
    }
}

impl From<EthType> for u16 {
    fn from(value: EthType) -> Self {
        value.to_u16()
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::eth::ethtype::EthType;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for EthType {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let raw = driver.produce::<u16>()?.max(EthType::MIN);
            EthType::new(raw).ok()
        }
    }
}
