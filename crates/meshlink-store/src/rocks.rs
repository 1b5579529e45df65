//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use meshlink_core::{DeviceUuid, SceneId, UnicastAddress};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf, meta};
use crate::types::{MeshInfo, NetworkMeta, NodeRecord, OobPair, Scene};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::MissingColumnFamily(name.to_string()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read a single value from a column family.
    fn get_value<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Deserialize every value in a column family, in key order.
    fn scan_values<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    /// Collect every key in a column family.
    fn scan_keys(&self, name: &str) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf(name)?;
        let mut found = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            found.push(key);
        }
        Ok(found)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Registry Operations
    // =========================================================================

    fn load_mesh(&self) -> Result<MeshInfo> {
        let meta = self
            .get_value::<NetworkMeta>(cf::META, meta::NETWORK)?
            .unwrap_or_default();
        let nodes = self.list_nodes()?;
        let scenes = self.list_scenes()?;

        tracing::debug!(
            nodes = nodes.len(),
            scenes = scenes.len(),
            next_address = meta.next_provision_address,
            "Loaded mesh registry"
        );

        Ok(MeshInfo {
            meta,
            nodes,
            scenes,
        })
    }

    fn save_mesh(&self, mesh: &MeshInfo) -> Result<()> {
        let cf_nodes = self.cf(cf::NODES)?;
        let cf_scenes = self.cf(cf::SCENES)?;
        let cf_meta = self.cf(cf::META)?;

        let mut batch = WriteBatch::default();

        let mut live_nodes = HashSet::with_capacity(mesh.nodes.len());
        for node in &mesh.nodes {
            let key = keys::node_key(node.unicast_address);
            batch.put_cf(&cf_nodes, key, Self::serialize(node)?);
            live_nodes.insert(key.to_vec());
        }
        for key in self.scan_keys(cf::NODES)? {
            if !live_nodes.contains(&*key) {
                batch.delete_cf(&cf_nodes, &key);
            }
        }

        let mut live_scenes = HashSet::with_capacity(mesh.scenes.len());
        for scene in &mesh.scenes {
            let key = keys::scene_key(scene.id);
            batch.put_cf(&cf_scenes, key, Self::serialize(scene)?);
            live_scenes.insert(key.to_vec());
        }
        for key in self.scan_keys(cf::SCENES)? {
            if !live_scenes.contains(&*key) {
                batch.delete_cf(&cf_scenes, &key);
            }
        }

        batch.put_cf(&cf_meta, meta::NETWORK, Self::serialize(&mesh.meta)?);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_node(&self, address: UnicastAddress) -> Result<Option<NodeRecord>> {
        self.get_value(cf::NODES, &keys::node_key(address))
    }

    fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        self.scan_values(cf::NODES)
    }

    fn get_scene(&self, id: SceneId) -> Result<Option<Scene>> {
        self.get_value(cf::SCENES, &keys::scene_key(id))
    }

    fn list_scenes(&self) -> Result<Vec<Scene>> {
        self.scan_values(cf::SCENES)
    }

    // =========================================================================
    // OOB Operations
    // =========================================================================

    fn put_oob(&self, pair: &OobPair) -> Result<()> {
        let cf = self.cf(cf::OOB)?;
        let value = Self::serialize(pair)?;
        self.db
            .put_cf(&cf, keys::oob_key(&pair.device_uuid), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_oob(&self, uuid: &DeviceUuid) -> Result<Option<OobPair>> {
        self.get_value(cf::OOB, &keys::oob_key(uuid))
    }

    fn list_oob(&self) -> Result<Vec<OobPair>> {
        self.scan_values(cf::OOB)
    }

    fn delete_oob(&self, uuid: &DeviceUuid) -> Result<()> {
        if self.get_oob(uuid)?.is_none() {
            return Err(StoreError::OobNotFound(*uuid));
        }
        let cf = self.cf(cf::OOB)?;
        self.db
            .delete_cf(&cf, keys::oob_key(uuid))
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}
