//! Mesh network addresses.
//!
//! The address space is 16 bits wide and split into ranges:
//!
//! ```text
//! 0x0000            unassigned (never a legal allocation)
//! 0x0001 - 0x7FFF   unicast (one per element)
//! 0x8000 - 0xBFFF   virtual (unused here)
//! 0xC000 - 0xFEFF   group
//! 0xFF00 - 0xFFFE   fixed group
//! 0xFFFF            all nodes
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IdError;

/// The broadcast destination reaching every node.
pub const ALL_NODES_ADDRESS: u16 = 0xFFFF;

/// A validated unicast element address.
///
/// A device occupies one unicast address per element, starting at its
/// primary address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct UnicastAddress(u16);

impl UnicastAddress {
    /// Lowest legal unicast address.
    pub const MIN: u16 = 0x0001;
    /// Highest legal unicast address.
    pub const MAX: u16 = 0x7FFF;

    /// Validate a raw address.
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidUnicast` for zero and anything above `0x7FFF`.
    pub const fn new(raw: u16) -> Result<Self, IdError> {
        if Self::is_valid(raw) {
            Ok(Self(raw))
        } else {
            Err(IdError::InvalidUnicast(raw))
        }
    }

    /// Check whether a raw value is a legal unicast address.
    #[must_use]
    pub const fn is_valid(raw: u16) -> bool {
        raw >= Self::MIN && raw <= Self::MAX
    }

    /// Return the raw 16-bit value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Address of the element `index` positions after this one.
    ///
    /// Returns `None` if the result leaves the unicast range.
    #[must_use]
    pub fn offset(self, index: u16) -> Option<Self> {
        self.0
            .checked_add(index)
            .and_then(|raw| Self::new(raw).ok())
    }

    /// Check whether a range of `element_count` addresses starting here stays
    /// inside the unicast range.
    #[must_use]
    pub fn fits(self, element_count: u16) -> bool {
        element_count == 0 || self.offset(element_count - 1).is_some()
    }
}

impl fmt::Debug for UnicastAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnicastAddress(0x{:04X})", self.0)
    }
}

impl fmt::Display for UnicastAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl TryFrom<u16> for UnicastAddress {
    type Error = IdError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UnicastAddress> for u16 {
    fn from(addr: UnicastAddress) -> Self {
        addr.0
    }
}

/// A validated group address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct GroupAddress(u16);

impl GroupAddress {
    /// Lowest group address.
    pub const MIN: u16 = 0xC000;
    /// Highest group address (fixed groups included, broadcast excluded).
    pub const MAX: u16 = 0xFFFE;

    /// Validate a raw group address.
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidGroup` if the value is outside `0xC000..=0xFFFE`.
    pub const fn new(raw: u16) -> Result<Self, IdError> {
        if raw >= Self::MIN && raw <= Self::MAX {
            Ok(Self(raw))
        } else {
            Err(IdError::InvalidGroup(raw))
        }
    }

    /// Return the raw 16-bit value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupAddress(0x{:04X})", self.0)
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl TryFrom<u16> for GroupAddress {
    type Error = IdError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupAddress> for u16 {
    fn from(addr: GroupAddress) -> Self {
        addr.0
    }
}

/// Where an application message is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// A single element.
    Unicast(UnicastAddress),
    /// Every element subscribed to a group.
    Group(GroupAddress),
    /// Every node (`0xFFFF`).
    AllNodes,
}

impl Destination {
    /// Return the raw 16-bit destination.
    #[must_use]
    pub const fn raw(self) -> u16 {
        match self {
            Self::Unicast(addr) => addr.get(),
            Self::Group(addr) => addr.get(),
            Self::AllNodes => ALL_NODES_ADDRESS,
        }
    }

    /// Classify a raw destination value.
    ///
    /// # Errors
    ///
    /// Returns an error for `0x0000` and virtual addresses.
    pub fn from_raw(raw: u16) -> Result<Self, IdError> {
        if raw == ALL_NODES_ADDRESS {
            Ok(Self::AllNodes)
        } else if UnicastAddress::is_valid(raw) {
            Ok(Self::Unicast(UnicastAddress(raw)))
        } else {
            GroupAddress::new(raw).map(Self::Group)
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.raw())
    }
}

impl From<UnicastAddress> for Destination {
    fn from(addr: UnicastAddress) -> Self {
        Self::Unicast(addr)
    }
}

impl From<GroupAddress> for Destination {
    fn from(addr: GroupAddress) -> Self {
        Self::Group(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicast_bounds() {
        assert!(UnicastAddress::new(0).is_err());
        assert!(UnicastAddress::new(0x0001).is_ok());
        assert!(UnicastAddress::new(0x7FFF).is_ok());
        assert_eq!(
            UnicastAddress::new(0x8000),
            Err(IdError::InvalidUnicast(0x8000))
        );
        assert!(UnicastAddress::new(ALL_NODES_ADDRESS).is_err());
    }

    #[test]
    fn unicast_offset_stays_in_range() {
        let addr = UnicastAddress::new(0x7FFE).unwrap();
        assert_eq!(addr.offset(1).map(UnicastAddress::get), Some(0x7FFF));
        assert!(addr.offset(2).is_none());
        assert!(addr.fits(2));
        assert!(!addr.fits(3));
    }

    #[test]
    fn group_bounds() {
        assert!(GroupAddress::new(0xBFFF).is_err());
        assert!(GroupAddress::new(0xC000).is_ok());
        assert!(GroupAddress::new(0xFFFE).is_ok());
        assert!(GroupAddress::new(0xFFFF).is_err());
    }

    #[test]
    fn destination_classification() {
        assert_eq!(Destination::from_raw(0xFFFF), Ok(Destination::AllNodes));
        assert!(matches!(
            Destination::from_raw(0x0005),
            Ok(Destination::Unicast(_))
        ));
        assert!(matches!(
            Destination::from_raw(0xC002),
            Ok(Destination::Group(_))
        ));
        assert!(Destination::from_raw(0x0000).is_err());
        assert!(Destination::from_raw(0x8001).is_err());
        assert_eq!(Destination::AllNodes.raw(), 0xFFFF);
    }

    #[test]
    fn unicast_serde_rejects_zero() {
        let addr: UnicastAddress = serde_json::from_str("256").unwrap();
        assert_eq!(addr.get(), 0x0100);
        assert!(serde_json::from_str::<UnicastAddress>("0").is_err());
    }
}
