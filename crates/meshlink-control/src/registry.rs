//! Registry facade.
//!
//! Holds the in-memory image of the mesh and writes it through a [`Store`].
//! Mutations touch memory only; [`MeshRegistry::persist`] makes them durable.
//! A failed persist restores the last durable image, so memory never runs
//! ahead of storage.

use std::sync::Arc;

use meshlink_core::{AppKeyIndex, DeviceUuid, SceneId, UnicastAddress};
use meshlink_store::{MeshInfo, NodeRecord, OnOffState, OobPair, Scene, SceneState, Store};

use crate::allocator::AddressAllocator;
use crate::error::{ControlError, Result};

/// Durable list of nodes, scenes and network values.
pub struct MeshRegistry<S: Store> {
    store: Arc<S>,
    mesh: MeshInfo,
    durable: MeshInfo,
    allocator: AddressAllocator,
}

impl<S: Store> MeshRegistry<S> {
    /// Load the registry from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(store: Arc<S>) -> Result<Self> {
        let mesh = store.load_mesh()?;
        let allocator = AddressAllocator::seed(mesh.meta.next_provision_address, &mesh.nodes);
        tracing::info!(
            nodes = mesh.nodes.len(),
            scenes = mesh.scenes.len(),
            cursor = allocator.cursor(),
            "Mesh registry loaded"
        );
        Ok(Self {
            store,
            durable: mesh.clone(),
            mesh,
            allocator,
        })
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All nodes.
    #[must_use]
    pub fn nodes(&self) -> &[NodeRecord] {
        &self.mesh.nodes
    }

    /// Nodes whose cached on/off state is not `Offline`.
    pub fn online_nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.mesh.nodes.iter().filter(|n| !n.is_offline())
    }

    /// Node by primary address.
    #[must_use]
    pub fn find(&self, address: UnicastAddress) -> Option<&NodeRecord> {
        self.mesh
            .nodes
            .iter()
            .find(|n| n.unicast_address == address)
    }

    /// Node by primary address, for mutation.
    pub fn find_mut(&mut self, address: UnicastAddress) -> Option<&mut NodeRecord> {
        self.mesh
            .nodes
            .iter_mut()
            .find(|n| n.unicast_address == address)
    }

    /// Node owning the element at `address`.
    pub fn find_by_element_mut(&mut self, address: UnicastAddress) -> Option<&mut NodeRecord> {
        self.mesh
            .nodes
            .iter_mut()
            .find(|n| n.occupies(address.get()))
    }

    /// Node by device UUID.
    #[must_use]
    pub fn find_by_uuid(&self, uuid: &DeviceUuid) -> Option<&NodeRecord> {
        self.mesh.nodes.iter().find(|n| n.device_uuid == *uuid)
    }

    /// All scenes.
    #[must_use]
    pub fn scenes(&self) -> &[Scene] {
        &self.mesh.scenes
    }

    /// Scene by number.
    #[must_use]
    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.mesh.scenes.iter().find(|s| s.id == id)
    }

    /// Application key bound to new nodes.
    #[must_use]
    pub const fn default_app_key_index(&self) -> AppKeyIndex {
        self.mesh.meta.default_app_key_index
    }

    /// The next primary address to provision.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidAllocation` once the unicast range is
    /// exhausted.
    pub fn next_provision_address(&mut self) -> Result<UnicastAddress> {
        self.allocator.next(&self.mesh.nodes)
    }

    /// The allocator cursor.
    #[must_use]
    pub const fn cursor(&self) -> u16 {
        self.allocator.cursor()
    }

    /// Static OOB value stored for a device.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn oob(&self, uuid: &DeviceUuid) -> Result<Option<OobPair>> {
        Ok(self.store.get_oob(uuid)?)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add a freshly provisioned node and advance the allocator past it.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::AddressConflict` if the node's range overlaps an
    /// existing node; nothing changes in that case.
    pub fn insert_device(&mut self, node: NodeRecord) -> Result<()> {
        if self.mesh.nodes.iter().any(|n| n.overlaps(&node)) {
            return Err(ControlError::AddressConflict {
                address: node.unicast_address,
                element_count: node.element_count,
            });
        }
        if !node.unicast_address.fits(u16::from(node.element_count)) {
            return Err(ControlError::InvalidAllocation(node.unicast_address.get()));
        }
        self.allocator.advance(node.element_count);
        self.mesh.nodes.push(node);
        Ok(())
    }

    /// Replace a stored node with an updated copy.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::DeviceNotFound` if no node has that address.
    pub fn update_device(&mut self, node: NodeRecord) -> Result<()> {
        let slot = self
            .find_mut(node.unicast_address)
            .ok_or(ControlError::DeviceNotFound(node.unicast_address))?;
        *slot = node;
        Ok(())
    }

    /// Remove a node.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::DeviceNotFound` if no node has that address.
    pub fn remove_device(&mut self, address: UnicastAddress) -> Result<NodeRecord> {
        let index = self
            .mesh
            .nodes
            .iter()
            .position(|n| n.unicast_address == address)
            .ok_or(ControlError::DeviceNotFound(address))?;
        Ok(self.mesh.nodes.remove(index))
    }

    /// Insert or replace a device's state inside a scene, creating the scene
    /// if needed.
    pub fn append_scene_state(&mut self, id: SceneId, state: SceneState) {
        let index = match self.mesh.scenes.iter().position(|s| s.id == id) {
            Some(index) => index,
            None => {
                self.mesh.scenes.push(Scene::new(id));
                self.mesh.scenes.len() - 1
            }
        };
        let scene = &mut self.mesh.scenes[index];
        match scene.states.iter_mut().find(|s| s.address == state.address) {
            Some(existing) => *existing = state,
            None => scene.states.push(state),
        }
    }

    /// Insert or replace a whole scene. An empty scene is removed instead.
    pub fn put_scene(&mut self, scene: Scene) {
        self.mesh.scenes.retain(|s| s.id != scene.id);
        if !scene.states.is_empty() {
            self.mesh.scenes.push(scene);
        }
    }

    /// Drop a device's state from a scene, removing the scene once empty.
    pub fn remove_scene_state(&mut self, id: SceneId, address: UnicastAddress) {
        if let Some(scene) = self.mesh.scenes.iter_mut().find(|s| s.id == id) {
            scene.states.retain(|s| s.address != address);
        }
        self.mesh.scenes.retain(|s| !s.states.is_empty());
    }

    /// Remove a scene.
    pub fn remove_scene(&mut self, id: SceneId) -> Option<Scene> {
        let index = self.mesh.scenes.iter().position(|s| s.id == id)?;
        Some(self.mesh.scenes.remove(index))
    }

    /// Mark a node online or offline from an on/off report.
    pub fn set_on_off(&mut self, address: UnicastAddress, state: OnOffState) -> bool {
        match self.find_by_element_mut(address) {
            Some(node) => {
                node.status.on_off = state;
                true
            }
            None => false,
        }
    }

    /// Write the in-memory image to storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write. The in-memory image is
    /// rolled back to the last persisted state.
    pub fn persist(&mut self) -> Result<()> {
        self.mesh.meta.next_provision_address = self.allocator.cursor();
        self.mesh.scenes.retain(|s| !s.states.is_empty());
        match self.store.save_mesh(&self.mesh) {
            Ok(()) => {
                self.durable = self.mesh.clone();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persist failed, rolling back registry");
                self.mesh = self.durable.clone();
                self.allocator =
                    AddressAllocator::seed(self.mesh.meta.next_provision_address, &self.mesh.nodes);
                Err(e.into())
            }
        }
    }
}
