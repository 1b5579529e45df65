//! Fast-bind trust cache.
//!
//! Maps device identifiers to composition data known ahead of time, so binding
//! can skip live composition discovery.

use std::collections::HashMap;

use meshlink_core::DeviceUuid;
use meshlink_store::CompositionData;
use parking_lot::RwLock;

/// Source of pre-trusted composition data.
pub trait TrustCache: Send + Sync {
    /// Composition data trusted for this device, if any.
    fn lookup(&self, device_uuid: &DeviceUuid) -> Option<CompositionData>;
}

/// A trust cache that never trusts anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrust;

impl TrustCache for NoTrust {
    fn lookup(&self, _device_uuid: &DeviceUuid) -> Option<CompositionData> {
        None
    }
}

/// An in-memory trust cache.
///
/// Entries are matched by exact UUID first, then by the company and product
/// identifiers carried little-endian in the first four UUID bytes.
#[derive(Debug, Default)]
pub struct StaticTrustCache {
    devices: RwLock<HashMap<DeviceUuid, CompositionData>>,
    products: RwLock<HashMap<(u16, u16), CompositionData>>,
}

impl StaticTrustCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust composition data for one device.
    pub fn trust_device(&self, device_uuid: DeviceUuid, composition: CompositionData) {
        self.devices.write().insert(device_uuid, composition);
    }

    /// Trust composition data for every device of a product.
    pub fn trust_product(&self, composition: CompositionData) {
        self.products
            .write()
            .insert((composition.cid, composition.pid), composition);
    }

    fn product_key(device_uuid: &DeviceUuid) -> (u16, u16) {
        let b = device_uuid.as_bytes();
        (
            u16::from_le_bytes([b[0], b[1]]),
            u16::from_le_bytes([b[2], b[3]]),
        )
    }
}

impl TrustCache for StaticTrustCache {
    fn lookup(&self, device_uuid: &DeviceUuid) -> Option<CompositionData> {
        if let Some(cps) = self.devices.read().get(device_uuid) {
            return Some(cps.clone());
        }
        self.products
            .read()
            .get(&Self::product_key(device_uuid))
            .cloned()
    }
}
