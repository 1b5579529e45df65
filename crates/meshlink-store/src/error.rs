//! Registry storage errors.

use meshlink_core::DeviceUuid;
use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised while reading or writing the registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No static OOB value is stored for the device.
    #[error("no OOB value stored for device {0}")]
    OobNotFound(DeviceUuid),

    /// The database was opened without one of the registry's column families.
    #[error("registry column family missing: {0}")]
    MissingColumnFamily(String),

    /// RocksDB rejected a read or write.
    #[error("registry database error: {0}")]
    Database(String),

    /// A record could not be encoded or decoded as CBOR.
    #[error("registry record encoding error: {0}")]
    Serialization(String),
}
