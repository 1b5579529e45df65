//! Configuration and request/outcome types for orchestration operations.

use std::time::Duration;

use meshlink_core::{UnicastAddress, ALL_NODES_ADDRESS};
use serde::{Deserialize, Serialize};

/// Configuration for the mesh orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Scan duration passed to the transport.
    #[serde(default = "MeshConfig::default_scan_timeout")]
    pub scan_timeout_seconds: u64,
    /// How long to wait for a publication status reply.
    #[serde(default = "MeshConfig::default_publish_timeout")]
    pub publish_timeout_seconds: u64,
    /// Period of the time-model publication.
    #[serde(default = "MeshConfig::default_time_publish_period")]
    pub time_publish_period_ms: u32,
    /// Destination of the time-model publication.
    #[serde(default = "MeshConfig::default_time_publish_address")]
    pub time_publish_address: u16,
    /// Consult the fast-bind trust cache after provisioning.
    #[serde(default)]
    pub fast_bind_enabled: bool,
    /// Provision without OOB when no static OOB value is stored.
    #[serde(default)]
    pub auto_use_no_oob: bool,
    /// Whether nodes report status on their own. When false, on/off
    /// commands request acknowledgement from every online node.
    #[serde(default)]
    pub online_status_enabled: bool,
    /// Start the next queued onboarding session once one finishes.
    #[serde(default = "MeshConfig::default_auto_advance")]
    pub auto_advance: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            scan_timeout_seconds: Self::default_scan_timeout(),
            publish_timeout_seconds: Self::default_publish_timeout(),
            time_publish_period_ms: Self::default_time_publish_period(),
            time_publish_address: Self::default_time_publish_address(),
            fast_bind_enabled: false,
            auto_use_no_oob: false,
            online_status_enabled: false,
            auto_advance: Self::default_auto_advance(),
        }
    }
}

impl MeshConfig {
    const fn default_scan_timeout() -> u64 {
        10
    }

    const fn default_publish_timeout() -> u64 {
        5
    }

    const fn default_time_publish_period() -> u32 {
        30_000
    }

    const fn default_time_publish_address() -> u16 {
        ALL_NODES_ADDRESS
    }

    const fn default_auto_advance() -> bool {
        true
    }

    /// Scan timeout as a `Duration`.
    #[must_use]
    pub const fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_seconds)
    }

    /// Publication status timeout as a `Duration`.
    #[must_use]
    pub const fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_seconds)
    }
}

/// Direction of a group subscription change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOp {
    /// Subscribe the device to the group.
    Add,
    /// Unsubscribe the device from the group.
    Remove,
}

/// What a scene batch does on each device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneOp {
    /// Store the device's current state under the scene number.
    Store,
    /// Remove the scene number from the device.
    Delete,
}

/// Result of one entry of a per-device scene operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// The command was handed to the transport.
    Dispatched,
    /// The device is no longer in the registry.
    DeviceNotFound,
    /// The device has no scene server element.
    NotResolvable,
    /// The transport declined to send.
    DispatchFailed,
}

/// Per-device outcomes of a scene recall or scene deletion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SceneReport {
    /// One entry per stored device, in scene order.
    pub entries: Vec<(UnicastAddress, EntryOutcome)>,
}

impl SceneReport {
    /// Whether every entry was dispatched.
    #[must_use]
    pub fn all_dispatched(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, outcome)| *outcome == EntryOutcome::Dispatched)
    }

    /// Addresses whose command was dispatched.
    pub fn dispatched(&self) -> impl Iterator<Item = UnicastAddress> + '_ {
        self.entries
            .iter()
            .filter(|(_, outcome)| *outcome == EntryOutcome::Dispatched)
            .map(|(address, _)| *address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_config_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.scan_timeout(), Duration::from_secs(10));
        assert_eq!(config.publish_timeout(), Duration::from_secs(5));
        assert_eq!(config.time_publish_period_ms, 30_000);
        assert_eq!(config.time_publish_address, 0xFFFF);
        assert!(config.auto_advance);
        assert!(!config.fast_bind_enabled);
    }

    #[test]
    fn mesh_config_partial_json() {
        let config: MeshConfig =
            serde_json::from_str(r#"{"publish_timeout_seconds": 2, "fast_bind_enabled": true}"#)
                .unwrap();
        assert_eq!(config.publish_timeout_seconds, 2);
        assert!(config.fast_bind_enabled);
        assert_eq!(config.scan_timeout_seconds, 10);
        assert!(config.auto_advance);
    }

    #[test]
    fn scene_report_summary() {
        let a = UnicastAddress::new(0x0002).unwrap();
        let b = UnicastAddress::new(0x0003).unwrap();
        let report = SceneReport {
            entries: vec![(a, EntryOutcome::Dispatched), (b, EntryOutcome::NotResolvable)],
        };
        assert!(!report.all_dispatched());
        assert_eq!(report.dispatched().collect::<Vec<_>>(), vec![a]);
        assert!(SceneReport::default().all_dispatched());
    }
}
