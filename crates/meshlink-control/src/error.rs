//! Error types for the orchestration core.
//!
//! Every failure in this crate resolves to a returned error or a terminal
//! onboarding phase. Errors are grouped into the kinds reported by
//! [`ControlError::kind`].

use meshlink_core::{DeviceUuid, IdError, ModelId, SceneId, UnicastAddress};
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Coarse classification of a [`ControlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected before any network operation was attempted.
    Precondition,
    /// The transport declined to send.
    Dispatch,
    /// The remote device reported failure or timed out.
    Protocol,
    /// The registry could not be persisted.
    Storage,
}

/// Errors that can occur in orchestration operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// No node with this primary address is in the registry.
    #[error("device not found: {0}")]
    DeviceNotFound(UnicastAddress),

    /// No discovered candidate carries this UUID.
    #[error("candidate not found: {0}")]
    CandidateNotFound(DeviceUuid),

    /// The device has no element implementing the requested model.
    #[error("device {address} cannot serve model {model}")]
    NotResolvable {
        /// Primary address of the device.
        address: UnicastAddress,
        /// The requested model.
        model: ModelId,
    },

    /// The allocator produced an address outside the unicast range.
    #[error("invalid address allocation: 0x{0:04X}")]
    InvalidAllocation(u16),

    /// The device's address range overlaps an existing node.
    #[error("address range of {address} ({element_count} elements) overlaps an existing node")]
    AddressConflict {
        /// Primary address of the new device.
        address: UnicastAddress,
        /// Number of elements of the new device.
        element_count: u8,
    },

    /// A scene batch was submitted without target devices.
    #[error("scene {0} has no target devices")]
    EmptyScene(SceneId),

    /// No scene with this number exists.
    #[error("scene not found: {0}")]
    SceneNotFound(SceneId),

    /// Another onboarding session is in flight.
    #[error("onboarding already in progress for {0}")]
    OnboardingBusy(DeviceUuid),

    /// The transport declined to send a request.
    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    /// The owner loop has stopped.
    #[error("mesh runtime stopped")]
    RuntimeStopped,

    /// The remote side reported failure.
    #[error("protocol failure: {0}")]
    Protocol(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] meshlink_store::StoreError),

    /// Identifier validation error.
    #[error("invalid identifier: {0}")]
    Id(#[from] IdError),
}

impl ControlError {
    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceNotFound(_)
            | Self::CandidateNotFound(_)
            | Self::NotResolvable { .. }
            | Self::InvalidAllocation(_)
            | Self::AddressConflict { .. }
            | Self::EmptyScene(_)
            | Self::SceneNotFound(_)
            | Self::OnboardingBusy(_)
            | Self::Id(_) => ErrorKind::Precondition,
            Self::DispatchFailed(_) | Self::RuntimeStopped => ErrorKind::Dispatch,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Store(_) => ErrorKind::Storage,
        }
    }

    /// Returns true if no network operation was attempted.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self.kind(), ErrorKind::Precondition)
    }
}
