//! Domain types stored in the database.
//!
//! These types represent the persisted state of the mesh: provisioned nodes,
//! authored scenes, static OOB values and the network-wide allocation cursor.

use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Utc};
use meshlink_core::{AppKeyIndex, DeviceUuid, GroupAddress, ModelId, SceneId, UnicastAddress};
use serde::{Deserialize, Serialize};

/// Maximum number of scheduler entries a node can hold.
pub const MAX_SCHEDULERS: u8 = 16;

/// One addressable sub-unit of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Location descriptor.
    #[serde(default)]
    pub location: u16,
    /// SIG models implemented by this element.
    #[serde(default)]
    pub sig_models: Vec<ModelId>,
    /// Vendor models implemented by this element.
    #[serde(default)]
    pub vendor_models: Vec<ModelId>,
}

impl Element {
    /// Create an element from its SIG model list.
    #[must_use]
    pub fn with_sig_models(models: impl IntoIterator<Item = ModelId>) -> Self {
        Self {
            location: 0,
            sig_models: models.into_iter().collect(),
            vendor_models: Vec::new(),
        }
    }

    /// Whether the model appears in either the SIG or the vendor list.
    #[must_use]
    pub fn supports(&self, model: ModelId) -> bool {
        self.sig_models.contains(&model) || self.vendor_models.contains(&model)
    }
}

/// A device's declared list of elements and the features each implements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionData {
    /// Company identifier.
    pub cid: u16,
    /// Product identifier.
    pub pid: u16,
    /// Product version identifier.
    pub vid: u16,
    /// Minimum replay protection list size.
    pub crpl: u16,
    /// Feature bitmask (relay, proxy, friend, low power).
    pub features: u16,
    /// Elements in declaration order; element `i` sits at `primary + i`.
    pub elements: Vec<Element>,
}

impl CompositionData {
    const FEATURE_LOW_POWER: u16 = 0b1000;

    /// Create composition data from an element list.
    #[must_use]
    pub fn from_elements(elements: Vec<Element>) -> Self {
        Self {
            elements,
            ..Self::default()
        }
    }

    /// Whether the device declares low-power node support.
    #[must_use]
    pub const fn low_power_support(&self) -> bool {
        self.features & Self::FEATURE_LOW_POWER != 0
    }
}

/// Cached on/off state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnOffState {
    /// The node reported off.
    Off,
    /// The node reported on.
    On,
    /// No status heard from the node.
    #[default]
    Offline,
}

impl OnOffState {
    /// Display label for UI listings.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Offline => "OFFLINE",
        }
    }
}

impl From<bool> for OnOffState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// Last known status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Power state.
    pub on_off: OnOffState,
    /// Lightness in percent (0-100).
    pub lightness: u8,
    /// Color temperature in percent of the supported range (0-100).
    pub temperature: u8,
}

/// A model publication installed on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Element that publishes.
    pub element_address: UnicastAddress,
    /// Raw destination of the publication.
    pub publish_address: u16,
    /// Application key used for publication.
    pub app_key_index: AppKeyIndex,
    /// Publish period in milliseconds.
    pub period_ms: u32,
    /// Model whose state is published.
    pub model: ModelId,
}

/// What a scheduler entry does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerAction {
    /// Turn off.
    Off,
    /// Turn on.
    On,
    /// Recall the configured scene.
    SceneRecall,
    /// Do nothing.
    NoAction,
}

/// A scheduler register entry stored on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheduler {
    /// Register index (0-15).
    pub index: u8,
    /// Year (last two digits), `0x64` for any year.
    pub year: u8,
    /// Month bitmask.
    pub month: u16,
    /// Day of month, 0 for any day.
    pub day: u8,
    /// Hour.
    pub hour: u8,
    /// Minute.
    pub minute: u8,
    /// Second.
    pub second: u8,
    /// Weekday bitmask.
    pub week: u8,
    /// Action to take.
    pub action: SchedulerAction,
    /// Transition time (encoded).
    pub transition_time: u8,
    /// Scene to recall for `SceneRecall`.
    pub scene: Option<SceneId>,
}

/// Per-session device key installed during provisioning.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKey(pub [u8; 16]);

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceKey(..)")
    }
}

/// A provisioned node stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Primary element unicast address.
    pub unicast_address: UnicastAddress,
    /// Device UUID from the advertising payload.
    pub device_uuid: DeviceUuid,
    /// Transport handle (MAC address) seen while scanning.
    #[serde(default)]
    pub mac_address: Option<String>,
    /// Device key from provisioning.
    #[serde(default)]
    pub device_key: Option<DeviceKey>,
    /// Number of elements, i.e. consecutive addresses occupied.
    pub element_count: u8,
    /// Composition data, once known.
    #[serde(default)]
    pub composition: Option<CompositionData>,
    /// Whether the application key is bound.
    pub bound: bool,
    /// Whether binding used trusted composition data instead of discovery.
    #[serde(default)]
    pub default_bound: bool,
    /// Cached last known status.
    #[serde(default)]
    pub status: NodeStatus,
    /// Group subscriptions.
    #[serde(default)]
    pub subscriptions: Vec<GroupAddress>,
    /// Scheduler entries.
    #[serde(default)]
    pub schedulers: Vec<Scheduler>,
    /// Status publication, if configured.
    #[serde(default)]
    pub publication: Option<PublishConfig>,
    /// Whether relay is enabled.
    #[serde(default = "NodeRecord::default_relay")]
    pub relay_enabled: bool,
    /// When the node was provisioned.
    pub provisioned_at: DateTime<Utc>,
}

impl NodeRecord {
    const fn default_relay() -> bool {
        true
    }

    /// Create a fresh record for a device about to be provisioned.
    #[must_use]
    pub fn new(unicast_address: UnicastAddress, device_uuid: DeviceUuid) -> Self {
        Self {
            unicast_address,
            device_uuid,
            mac_address: None,
            device_key: None,
            element_count: 0,
            composition: None,
            bound: false,
            default_bound: false,
            status: NodeStatus::default(),
            subscriptions: Vec::new(),
            schedulers: Vec::new(),
            publication: None,
            relay_enabled: true,
            provisioned_at: Utc::now(),
        }
    }

    /// Addresses occupied by this node.
    ///
    /// A node always holds at least its primary address, even before its
    /// element count is known.
    #[must_use]
    pub fn address_range(&self) -> Range<u32> {
        let start = u32::from(self.unicast_address.get());
        start..start + u32::from(self.element_count.max(1))
    }

    /// Whether `address` belongs to one of this node's elements.
    #[must_use]
    pub fn occupies(&self, address: u16) -> bool {
        self.address_range().contains(&u32::from(address))
    }

    /// Whether the address ranges of two nodes intersect.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let a = self.address_range();
        let b = other.address_range();
        a.start < b.end && b.start < a.end
    }

    /// Whether the node is currently considered offline.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.status.on_off == OnOffState::Offline
    }

    /// Display label of the power state.
    #[must_use]
    pub const fn on_off_description(&self) -> &'static str {
        self.status.on_off.description()
    }

    /// `cid-XXXX pid-XXXX` (little-endian hex) for bound nodes.
    #[must_use]
    pub fn product_description(&self) -> String {
        match (&self.composition, self.bound) {
            (Some(cps), true) => format!(
                "cid-{} pid-{}",
                hex::encode_upper(cps.cid.to_le_bytes()),
                hex::encode_upper(cps.pid.to_le_bytes())
            ),
            _ => "(unbound)".to_string(),
        }
    }

    /// Whether the node is a low-power node.
    #[must_use]
    pub fn is_low_power(&self) -> bool {
        self.composition
            .as_ref()
            .is_some_and(CompositionData::low_power_support)
    }

    /// Look up a scheduler entry by register index.
    #[must_use]
    pub fn scheduler(&self, index: u8) -> Option<&Scheduler> {
        self.schedulers.iter().find(|s| s.index == index)
    }

    /// Insert or replace a scheduler entry with the same index.
    pub fn save_scheduler(&mut self, scheduler: Scheduler) {
        match self
            .schedulers
            .iter_mut()
            .find(|s| s.index == scheduler.index)
        {
            Some(existing) => *existing = scheduler,
            None => self.schedulers.push(scheduler),
        }
    }

    /// Lowest free scheduler index, or `None` if all 16 are used.
    #[must_use]
    pub fn allocate_scheduler_index(&self) -> Option<u8> {
        (0..MAX_SCHEDULERS).find(|i| self.scheduler(*i).is_none())
    }
}

/// Snapshot of one device's state inside a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneState {
    /// Primary address of the device.
    pub address: UnicastAddress,
    /// Power state at authoring time.
    pub on_off: OnOffState,
    /// Lightness at authoring time.
    pub lightness: u8,
    /// Temperature at authoring time.
    pub temperature: u8,
}

impl SceneState {
    /// Capture the cached status of a node.
    #[must_use]
    pub const fn capture(node: &NodeRecord) -> Self {
        Self {
            address: node.unicast_address,
            on_off: node.status.on_off,
            lightness: node.status.lightness,
            temperature: node.status.temperature,
        }
    }
}

/// A recallable snapshot of several devices' states.
///
/// A scene with no states is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Scene number.
    pub id: SceneId,
    /// Per-device states in authoring order.
    pub states: Vec<SceneState>,
}

impl Scene {
    /// Create an empty scene.
    #[must_use]
    pub const fn new(id: SceneId) -> Self {
        Self {
            id,
            states: Vec::new(),
        }
    }

    /// Primary addresses of the devices in this scene.
    pub fn addresses(&self) -> impl Iterator<Item = UnicastAddress> + '_ {
        self.states.iter().map(|s| s.address)
    }
}

/// Network-wide values persisted alongside the node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMeta {
    /// Allocation cursor: the next primary address to hand out.
    pub next_provision_address: u16,
    /// Application key bound to new nodes.
    pub default_app_key_index: AppKeyIndex,
}

impl Default for NetworkMeta {
    fn default() -> Self {
        Self {
            // 0x0001 belongs to the local provisioner.
            next_provision_address: 0x0002,
            default_app_key_index: AppKeyIndex::default(),
        }
    }
}

/// How a static OOB value entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OobImportMode {
    /// Typed in by an operator.
    Manual,
    /// Batch imported from a file.
    File,
}

/// A static OOB authentication value for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OobPair {
    /// Device the value belongs to.
    pub device_uuid: DeviceUuid,
    /// OOB value.
    pub oob: Vec<u8>,
    /// Import source.
    pub import_mode: OobImportMode,
    /// Import time.
    pub imported_at: DateTime<Utc>,
}

/// The complete in-memory registry image written by `Store::save_mesh`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshInfo {
    /// Network-wide values.
    pub meta: NetworkMeta,
    /// Provisioned nodes.
    pub nodes: Vec<NodeRecord>,
    /// Authored scenes.
    pub scenes: Vec<Scene>,
}
