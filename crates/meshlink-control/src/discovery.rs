//! Discovery of unprovisioned devices.
//!
//! Raw advertising reports are reduced to [`CandidateDevice`]s keyed by the
//! device UUID carried in the Mesh Provisioning Service data.

use meshlink_core::DeviceUuid;
use serde::{Deserialize, Serialize};

/// AD type for 16-bit UUID service data.
const AD_SERVICE_DATA_16: u8 = 0x16;
/// Mesh Provisioning Service UUID.
const MESH_PROVISIONING_SERVICE: u16 = 0x1827;

/// An advertising report as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisingReport {
    /// Transport handle (MAC address) of the advertiser.
    pub handle: String,
    /// Advertised local name, if any.
    #[serde(default)]
    pub name: Option<String>,
    /// Received signal strength in dBm.
    pub rssi: i8,
    /// Raw advertising payload.
    pub scan_record: Vec<u8>,
}

/// A device awaiting onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDevice {
    /// UUID from the provisioning service data.
    pub device_uuid: DeviceUuid,
    /// Transport handle of the advertiser.
    pub handle: String,
    /// Signal strength of the first report.
    pub rssi: i8,
    /// Raw advertising payload of the first report.
    pub scan_record: Vec<u8>,
}

/// Extract the Mesh Provisioning Service data from an advertising payload.
///
/// Walks the `[length][type][data..]` structures and returns the bytes that
/// follow the service UUID. A malformed structure ends the walk.
#[must_use]
pub fn mesh_service_data(scan_record: &[u8]) -> Option<&[u8]> {
    let mut rest = scan_record;
    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len);
        if len == 0 || tail.len() < len {
            return None;
        }
        let (structure, next) = tail.split_at(len);
        if let [AD_SERVICE_DATA_16, lo, hi, data @ ..] = structure {
            if u16::from_le_bytes([*lo, *hi]) == MESH_PROVISIONING_SERVICE {
                return Some(data);
            }
        }
        rest = next;
    }
    None
}

/// Deduplicating table of candidates seen during the current scan.
#[derive(Debug, Default)]
pub struct DiscoveryTable {
    candidates: Vec<CandidateDevice>,
}

impl DiscoveryTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every candidate. Called when a scan (re)starts.
    pub fn reset(&mut self) {
        self.candidates.clear();
    }

    /// Record an advertising report.
    ///
    /// Returns the new candidate if the report carries a previously unseen
    /// UUID. Reports without at least 16 bytes of provisioning service data
    /// are dropped.
    pub fn observe(&mut self, report: AdvertisingReport) -> Option<&CandidateDevice> {
        let data = mesh_service_data(&report.scan_record)?;
        let device_uuid = DeviceUuid::from_slice(data).ok()?;

        if self.contains(&device_uuid) {
            tracing::trace!(uuid = %device_uuid, "Duplicate advertising report");
            return None;
        }

        tracing::debug!(uuid = %device_uuid, handle = %report.handle, rssi = report.rssi, "Candidate discovered");
        self.candidates.push(CandidateDevice {
            device_uuid,
            handle: report.handle,
            rssi: report.rssi,
            scan_record: report.scan_record,
        });
        self.candidates.last()
    }

    /// Whether a candidate with this UUID is waiting.
    #[must_use]
    pub fn contains(&self, uuid: &DeviceUuid) -> bool {
        self.candidates.iter().any(|c| c.device_uuid == *uuid)
    }

    /// Remove and return a candidate. Called when onboarding starts.
    pub fn take(&mut self, uuid: &DeviceUuid) -> Option<CandidateDevice> {
        let index = self.candidates.iter().position(|c| c.device_uuid == *uuid)?;
        Some(self.candidates.remove(index))
    }

    /// Candidates in discovery order.
    #[must_use]
    pub fn candidates(&self) -> &[CandidateDevice] {
        &self.candidates
    }
}
