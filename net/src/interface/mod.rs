// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface identity: names and indices.

use std::fmt::{Display, Formatter};
use std::num::NonZero;

/// A validated network interface name.
///
/// Names are non-empty, at most [`InterfaceName::MAX_LEN`] bytes of printable ASCII, and contain
/// neither `/`, `:` nor whitespace.  They are passed to the kernel as null terminated strings, so
/// these rules are not negotiable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

/// Reasons a string is not a legal [`InterfaceName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalInterfaceName {
    /// The name is empty.
    #[error("interface name is empty")]
    Empty,
    /// The name is longer than [`InterfaceName::MAX_LEN`].
    #[error("interface name '{0}' is longer than {max} bytes", max = InterfaceName::MAX_LEN)]
    TooLong(String),
    /// The name contains a character the kernel refuses.
    #[error("interface name '{0}' contains illegal characters")]
    IllegalCharacters(String),
    /// `.` and `..` are reserved.
    #[error("interface name '{0}' is reserved")]
    Reserved(String),
}

impl InterfaceName {
    /// Maximum length of an interface name, not counting the null terminator.
    pub const MAX_LEN: usize = 15;
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if value.len() > InterfaceName::MAX_LEN {
            return Err(IllegalInterfaceName::TooLong(value.to_string()));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_graphic() && c != '/' && c != ':')
        {
            return Err(IllegalInterfaceName::IllegalCharacters(value.to_string()));
        }
        if value == "." || value == ".." {
            return Err(IllegalInterfaceName::Reserved(value.to_string()));
        }
        Ok(InterfaceName(value.to_string()))
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        InterfaceName::try_from(value.as_str())
    }
}

impl From<InterfaceName> for String {
    fn from(value: InterfaceName) -> Self {
        value.0
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A kernel-style interface index.  Zero is never a valid index.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceIndex(NonZero<u32>);

/// Error returned when zero is used as an [`InterfaceIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("zero is not a legal interface index")]
pub struct InvalidInterfaceIndex;

impl InterfaceIndex {
    /// Build an [`InterfaceIndex`] from a raw value.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInterfaceIndex`] if `raw` is zero.
    pub const fn try_new(raw: u32) -> Result<InterfaceIndex, InvalidInterfaceIndex> {
        match NonZero::new(raw) {
            Some(index) => Ok(InterfaceIndex(index)),
            None => Err(InvalidInterfaceIndex),
        }
    }

    /// The raw value of this index.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        self.0.get()
    }
}

impl Display for InterfaceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::interface::{InterfaceIndex, InterfaceName};
    use bolero::{Driver, TypeGenerator};
    use std::ops::Bound;

    impl TypeGenerator for InterfaceName {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-_";
            let len = driver.gen_usize(
                Bound::Included(&1),
                Bound::Included(&InterfaceName::MAX_LEN),
            )?;
            let mut name = String::with_capacity(len);
            for _ in 0..len {
                let pick =
                    driver.gen_usize(Bound::Included(&0), Bound::Excluded(&ALPHABET.len()))?;
                name.push(char::from(ALPHABET[pick]));
            }
            InterfaceName::try_from(name).ok()
        }
    }

    impl TypeGenerator for InterfaceIndex {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let raw = driver.gen_u32(Bound::Included(&1), Bound::Included(&u32::MAX))?;
            InterfaceIndex::try_new(raw).ok()
        }
    }
}

#[cfg(test)]
mod test {
    use crate::interface::{IllegalInterfaceName, InterfaceIndex, InterfaceName};

    #[test]
    fn generated_names_survive_round_trip() {
        bolero::check!()
            .with_type()
            .for_each(|name: &InterfaceName| {
                assert!(name.as_ref().len() <= InterfaceName::MAX_LEN);
                let back = InterfaceName::try_from(name.to_string()).unwrap();
                assert_eq!(name, &back);
            });
    }

    #[test]
    fn illegal_names() {
        assert_eq!(InterfaceName::try_from(""), Err(IllegalInterfaceName::Empty));
        assert!(matches!(
            InterfaceName::try_from("a-name-which-is-too-long"),
            Err(IllegalInterfaceName::TooLong(_))
        ));
        assert!(matches!(
            InterfaceName::try_from("eth 0"),
            Err(IllegalInterfaceName::IllegalCharacters(_))
        ));
        assert!(matches!(
            InterfaceName::try_from("eth/0"),
            Err(IllegalInterfaceName::IllegalCharacters(_))
        ));
        assert!(matches!(
            InterfaceName::try_from(".."),
            Err(IllegalInterfaceName::Reserved(_))
        ));
        assert!(InterfaceName::try_from("netmirror").is_ok());
    }

    #[test]
    fn index_zero_is_illegal() {
        assert!(InterfaceIndex::try_new(0).is_err());
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|index: InterfaceIndex| {
                assert_ne!(index.to_u32(), 0);
                assert_eq!(InterfaceIndex::try_new(index.to_u32()), Ok(index));
            });
    }

    #[test]
    fn deserializes_from_yaml() {
        let name: InterfaceName = serde_yaml_ng::from_str("netmirror").unwrap();
        assert_eq!(name.as_ref(), "netmirror");
        assert!(serde_yaml_ng::from_str::<InterfaceName>("way-too-long-interface").is_err());
    }
}
