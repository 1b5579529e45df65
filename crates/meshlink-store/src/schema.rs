//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Provisioned nodes, keyed by big-endian primary address.
    pub const NODES: &str = "nodes";

    /// Authored scenes, keyed by big-endian scene number.
    pub const SCENES: &str = "scenes";

    /// Network-wide singleton values.
    pub const META: &str = "meta";

    /// Static OOB values, keyed by the 16 raw UUID bytes.
    pub const OOB: &str = "oob";
}

/// Keys inside the `meta` column family.
pub mod meta {
    /// The `NetworkMeta` record.
    pub const NETWORK: &[u8] = b"network";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::NODES, cf::SCENES, cf::META, cf::OOB]
}
