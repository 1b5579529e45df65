//! `RocksDB` storage layer for meshlink.
//!
//! This crate persists the mesh registry: provisioned nodes, scenes, static
//! OOB values and the address allocation cursor.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `nodes`: Node records, keyed by primary unicast address
//! - `scenes`: Scene records, keyed by scene number
//! - `meta`: Network-wide values (allocation cursor, default app key)
//! - `oob`: Static OOB values, keyed by device UUID
//!
//! The registry is written as a whole through [`Store::save_mesh`], which
//! commits in a single atomic batch.
//!
//! # Example
//!
//! ```no_run
//! use meshlink_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/meshlink-db").unwrap();
//! let mesh = store.load_mesh().unwrap();
//! println!("next address: 0x{:04X}", mesh.meta.next_provision_address);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use types::{
    CompositionData, DeviceKey, Element, MeshInfo, NetworkMeta, NodeRecord, NodeStatus,
    OnOffState, OobImportMode, OobPair, PublishConfig, Scene, SceneState, Scheduler,
    SchedulerAction, MAX_SCHEDULERS,
};

use meshlink_core::{DeviceUuid, SceneId, UnicastAddress};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Registry Operations
    // =========================================================================

    /// Load the complete registry image.
    ///
    /// An empty database yields `MeshInfo::default()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or a record is corrupt.
    fn load_mesh(&self) -> Result<MeshInfo>;

    /// Replace the stored registry with `mesh`.
    ///
    /// Nodes and scenes absent from `mesh` are deleted. The write is atomic.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn save_mesh(&self, mesh: &MeshInfo) -> Result<()>;

    /// Get a node by primary address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_node(&self, address: UnicastAddress) -> Result<Option<NodeRecord>>;

    /// List all nodes in address order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes(&self) -> Result<Vec<NodeRecord>>;

    /// Get a scene by number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_scene(&self, id: SceneId) -> Result<Option<Scene>>;

    /// List all scenes in scene-number order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_scenes(&self) -> Result<Vec<Scene>>;

    // =========================================================================
    // OOB Operations
    // =========================================================================

    /// Insert or replace a static OOB value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_oob(&self, pair: &OobPair) -> Result<()>;

    /// Get the static OOB value for a device.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_oob(&self, uuid: &DeviceUuid) -> Result<Option<OobPair>>;

    /// List all static OOB values.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_oob(&self) -> Result<Vec<OobPair>>;

    /// Delete the static OOB value for a device.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::OobNotFound` if no value is stored.
    fn delete_oob(&self, uuid: &DeviceUuid) -> Result<()>;
}
