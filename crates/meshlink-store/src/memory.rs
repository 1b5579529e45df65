//! In-memory storage implementation.
//!
//! Used by tests and by tools that never need durability. Writes can be made
//! to fail on demand to exercise persistence error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use meshlink_core::{DeviceUuid, SceneId, UnicastAddress};
use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::types::{MeshInfo, NodeRecord, OobPair, Scene};
use crate::Store;

/// A `Store` kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    mesh: RwLock<MeshInfo>,
    oob: RwLock<HashMap<DeviceUuid, OobPair>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `mesh`.
    #[must_use]
    pub fn with_mesh(mesh: MeshInfo) -> Self {
        Self {
            mesh: RwLock::new(mesh),
            ..Self::default()
        }
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save_mesh` calls.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Database("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Store for MemoryStore {
    fn load_mesh(&self) -> Result<MeshInfo> {
        let mut mesh = self.mesh.read().clone();
        mesh.nodes.sort_by_key(|n| n.unicast_address);
        mesh.scenes.sort_by_key(|s| s.id);
        Ok(mesh)
    }

    fn save_mesh(&self, mesh: &MeshInfo) -> Result<()> {
        self.check_writable()?;
        *self.mesh.write() = mesh.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_node(&self, address: UnicastAddress) -> Result<Option<NodeRecord>> {
        Ok(self
            .mesh
            .read()
            .nodes
            .iter()
            .find(|n| n.unicast_address == address)
            .cloned())
    }

    fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        Ok(self.load_mesh()?.nodes)
    }

    fn get_scene(&self, id: SceneId) -> Result<Option<Scene>> {
        Ok(self.mesh.read().scenes.iter().find(|s| s.id == id).cloned())
    }

    fn list_scenes(&self) -> Result<Vec<Scene>> {
        Ok(self.load_mesh()?.scenes)
    }

    fn put_oob(&self, pair: &OobPair) -> Result<()> {
        self.check_writable()?;
        self.oob.write().insert(pair.device_uuid, pair.clone());
        Ok(())
    }

    fn get_oob(&self, uuid: &DeviceUuid) -> Result<Option<OobPair>> {
        Ok(self.oob.read().get(uuid).cloned())
    }

    fn list_oob(&self) -> Result<Vec<OobPair>> {
        Ok(self.oob.read().values().cloned().collect())
    }

    fn delete_oob(&self, uuid: &DeviceUuid) -> Result<()> {
        self.check_writable()?;
        self.oob
            .write()
            .remove(uuid)
            .map(|_| ())
            .ok_or(StoreError::OobNotFound(*uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_writes_leave_state_untouched() {
        let store = MemoryStore::new();
        let mut mesh = MeshInfo::default();
        mesh.meta.next_provision_address = 0x0010;
        store.save_mesh(&mesh).unwrap();

        store.set_fail_writes(true);
        mesh.meta.next_provision_address = 0x0020;
        assert!(matches!(
            store.save_mesh(&mesh),
            Err(StoreError::Database(_))
        ));
        assert_eq!(store.load_mesh().unwrap().meta.next_provision_address, 0x0010);
        assert_eq!(store.save_count(), 1);
    }
}
