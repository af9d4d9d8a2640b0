// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Hardware addresses.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// An ethernet hardware address.
///
/// Serialized in the usual colon separated hex notation (`4e:45:54:4d:49:52`).
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// Every station.
    pub const BROADCAST: Mac = Mac([u8::MAX; 6]);
    /// No station.  Used where an address is required but none is known.
    pub const ZERO: Mac = Mac([0; 6]);

    const GROUP_BIT: u8 = 0x01;
    const LOCAL_BIT: u8 = 0x02;

    /// Addressed to every station.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        *self == Mac::BROADCAST
    }

    /// Addressed to a group of stations (broadcast included).
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & Mac::GROUP_BIT != 0
    }

    /// Addressed to a single station.
    #[must_use]
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// All zeros.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Mac::ZERO
    }

    /// Locally administered rather than assigned by a vendor.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0[0] & Mac::LOCAL_BIT != 0
    }

    /// Usable as the address of an interface: unicast and not zero.
    #[must_use]
    pub fn is_valid_src(&self) -> bool {
        !self.is_zero() && self.is_unicast()
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Errors which may occur while parsing a [`Mac`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacParseError {
    /// The string did not hold six colon separated octets.
    #[error("expected six colon separated octets, found {0}")]
    WrongLength(usize),
    /// One of the octets is not a two digit hex number.
    #[error("illegal octet '{0}'")]
    IllegalOctet(String),
}

impl FromStr for Mac {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(MacParseError::WrongLength(parts.len()));
        }
        let mut mac = [0u8; 6];
        for (octet, part) in mac.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(MacParseError::IllegalOctet(part.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| MacParseError::IllegalOctet(part.to_string()))?;
        }
        Ok(Mac(mac))
    }
}

impl TryFrom<String> for Mac {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Mac::from_str(&value)
    }
}

impl From<Mac> for String {
    fn from(value: Mac) -> Self {
        value.to_string()
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::eth::mac::Mac;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for Mac {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            Some(Mac(driver.produce()?))
        }
    }
}
