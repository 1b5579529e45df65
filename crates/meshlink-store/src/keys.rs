//! Key encoding utilities for `RocksDB`.
//!
//! Addresses and scene numbers are stored big-endian so that iteration order
//! matches numeric order.

use meshlink_core::{DeviceUuid, SceneId, UnicastAddress};

/// Encode a node key from its primary address.
#[must_use]
pub fn node_key(address: UnicastAddress) -> [u8; 2] {
    address.get().to_be_bytes()
}

/// Encode a scene key from its number.
#[must_use]
pub fn scene_key(id: SceneId) -> [u8; 2] {
    id.get().to_be_bytes()
}

/// Encode an OOB key (the raw UUID bytes).
#[must_use]
pub fn oob_key(uuid: &DeviceUuid) -> [u8; 16] {
    *uuid.as_bytes()
}
