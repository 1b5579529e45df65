//! Feature identifiers exposed by device elements.
//!
//! SIG models are 16-bit; vendor models carry the company identifier in the
//! upper 16 bits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A SIG or vendor model identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(u32);

impl ModelId {
    /// Generic OnOff Server.
    pub const GENERIC_ON_OFF_SERVER: Self = Self(0x1000);
    /// Generic Level Server.
    pub const GENERIC_LEVEL_SERVER: Self = Self(0x1002);
    /// Time Server.
    pub const TIME_SERVER: Self = Self(0x1200);
    /// Scene Server.
    pub const SCENE_SERVER: Self = Self(0x1203);
    /// Scene Setup Server.
    pub const SCENE_SETUP_SERVER: Self = Self(0x1204);
    /// Scheduler Server.
    pub const SCHEDULER_SERVER: Self = Self(0x1206);
    /// Light Lightness Server.
    pub const LIGHT_LIGHTNESS_SERVER: Self = Self(0x1300);
    /// Light CTL Server.
    pub const LIGHT_CTL_SERVER: Self = Self(0x1303);
    /// Light CTL Temperature Server.
    pub const LIGHT_CTL_TEMPERATURE_SERVER: Self = Self(0x1306);
    /// Light HSL Server.
    pub const LIGHT_HSL_SERVER: Self = Self(0x1307);

    /// A 16-bit SIG model.
    #[must_use]
    pub const fn sig(id: u16) -> Self {
        Self(id as u32)
    }

    /// A vendor model: company identifier plus vendor-assigned model number.
    #[must_use]
    pub const fn vendor(company_id: u16, model: u16) -> Self {
        Self(((company_id as u32) << 16) | model as u32)
    }

    /// Return the raw identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this is a SIG-defined model.
    #[must_use]
    pub const fn is_sig(self) -> bool {
        self.0 <= 0xFFFF
    }
}

impl fmt::Debug for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sig() {
            write!(f, "ModelId(0x{:04X})", self.0)
        } else {
            write!(f, "ModelId(0x{:08X})", self.0)
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sig() {
            write!(f, "0x{:04X}", self.0)
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

impl From<u32> for ModelId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
