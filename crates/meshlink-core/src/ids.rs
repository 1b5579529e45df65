//! Core identifier types for meshlink.
//!
//! This module provides strongly-typed identifiers for devices, scenes and
//! application keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IdError;

/// A 16-byte device UUID, taken from the unprovisioned advertising payload.
///
/// Displayed as 32 lowercase hex characters without separators.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceUuid(uuid::Uuid);

impl DeviceUuid {
    /// Create a new `DeviceUuid` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    /// Create a `DeviceUuid` from the first 16 bytes of a slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is shorter than 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let arr: [u8; 16] = bytes
            .get(..16)
            .and_then(|head| head.try_into().ok())
            .ok_or(IdError::InvalidLength {
                expected: 16,
                got: bytes.len(),
            })?;
        Ok(Self::from_bytes(arr))
    }

    /// Parse a `DeviceUuid` from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not exactly 32 characters.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
        let arr: [u8; 16] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: 16,
            got: s.len() / 2,
        })?;
        Ok(Self::from_bytes(arr))
    }

    /// Return the underlying bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Return the hex-encoded string representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl FromStr for DeviceUuid {
    type Err = IdError;

    /// Accepts plain hex as well as the hyphenated UUID form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('-') {
            let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
            Ok(Self(uuid))
        } else {
            Self::from_hex(s)
        }
    }
}

impl fmt::Debug for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceUuid({})", self.to_hex())
    }
}

impl fmt::Display for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for DeviceUuid {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceUuid> for String {
    fn from(id: DeviceUuid) -> Self {
        id.to_hex()
    }
}

impl AsRef<[u8]> for DeviceUuid {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// A scene number. Zero is prohibited on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct SceneId(u16);

impl SceneId {
    /// Validate a raw scene number.
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidScene` for zero.
    pub const fn new(raw: u16) -> Result<Self, IdError> {
        if raw == 0 {
            Err(IdError::InvalidScene(raw))
        } else {
            Ok(Self(raw))
        }
    }

    /// Return the raw scene number.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SceneId({})", self.0)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for SceneId {
    type Error = IdError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SceneId> for u16 {
    fn from(id: SceneId) -> Self {
        id.0
    }
}

/// Index of an application key in the network's key list (12 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct AppKeyIndex(u16);

impl AppKeyIndex {
    /// Highest legal key index.
    pub const MAX: u16 = 0x0FFF;

    /// Validate a raw key index.
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidAppKeyIndex` if the value does not fit in 12 bits.
    pub const fn new(raw: u16) -> Result<Self, IdError> {
        if raw > Self::MAX {
            Err(IdError::InvalidAppKeyIndex(raw))
        } else {
            Ok(Self(raw))
        }
    }

    /// Return the raw key index.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for AppKeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for AppKeyIndex {
    type Error = IdError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AppKeyIndex> for u16 {
    fn from(idx: AppKeyIndex) -> Self {
        idx.0
    }
}
