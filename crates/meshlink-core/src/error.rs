//! Common error types for meshlink.
//!
//! Every identifier and address constructor validates its input and reports
//! failures through [`IdError`].

/// A result type using `IdError`.
pub type Result<T> = std::result::Result<T, IdError>;

/// Errors that can occur when parsing or validating identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string contains invalid hexadecimal characters.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The value is outside the unicast address range.
    #[error("0x{0:04X} is not a valid unicast address")]
    InvalidUnicast(u16),

    /// The value is outside the group address range.
    #[error("0x{0:04X} is not a valid group address")]
    InvalidGroup(u16),

    /// Scene number zero is prohibited.
    #[error("scene number 0x{0:04X} is prohibited")]
    InvalidScene(u16),

    /// Application key indices are 12 bits wide.
    #[error("app key index {0} exceeds 0x0FFF")]
    InvalidAppKeyIndex(u16),
}
