//! Onboarding lifecycle state machine.
//!
//! This module defines the phases a device passes through while joining the
//! network and validates every transition between them.
//!
//! # State Machine
//!
//! ```text
//! Idle ─▶ Waiting ─▶ Provisioning ─▶ ProvisionSucceeded ─▶ Binding ─▶ PublishConfiguring
//!            │            │                  │               │  │         │        │
//!            └─────┬──────┘                  └───────┬───────┘  │         ▼        ▼
//!                  ▼                                 ▼          ▼    Configured  ConfigFailed
//!           ProvisionFailed                      BindFailed  BindSucceeded
//! ```

use chrono::{DateTime, Utc};
use meshlink_core::DeviceUuid;
use meshlink_store::NodeRecord;
use serde::{Deserialize, Serialize};

use crate::discovery::CandidateDevice;

/// Phase of an onboarding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Discovered, not selected for onboarding.
    Idle,
    /// Queued behind another session.
    Waiting,
    /// Provisioning request issued.
    Provisioning,
    /// Provisioning failed.
    ProvisionFailed,
    /// Provisioned and persisted; binding is about to start.
    ProvisionSucceeded,
    /// Binding request issued.
    Binding,
    /// Binding failed.
    BindFailed,
    /// Bound, no publication step needed.
    BindSucceeded,
    /// Publication request issued, awaiting the status reply.
    PublishConfiguring,
    /// Publication confirmed.
    PublishConfigured,
    /// Publication rejected or timed out.
    PublishConfigFailed,
}

/// Check if a phase transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: Phase, to: Phase) -> bool {
    use Phase::{
        BindFailed, BindSucceeded, Binding, Idle, ProvisionFailed, ProvisionSucceeded,
        Provisioning, PublishConfigFailed, PublishConfigured, PublishConfiguring, Waiting,
    };

    matches!(
        (from, to),
        (Idle, Waiting)
            | (Idle | Waiting, Provisioning)
            // Invalid allocation or a refused request never reaches the transport
            | (Waiting | Provisioning, ProvisionFailed)
            | (Provisioning, ProvisionSucceeded)
            | (ProvisionSucceeded, Binding | BindFailed)
            | (Binding, BindSucceeded | BindFailed | PublishConfiguring)
            | (PublishConfiguring, PublishConfigured | PublishConfigFailed)
    )
}

/// Returns the list of valid target phases from the given phase.
#[must_use]
pub fn valid_transitions_from(phase: Phase) -> Vec<Phase> {
    use Phase::{
        BindFailed, BindSucceeded, Binding, Idle, ProvisionFailed, ProvisionSucceeded,
        Provisioning, PublishConfigFailed, PublishConfigured, PublishConfiguring, Waiting,
    };

    match phase {
        Idle => vec![Waiting, Provisioning],
        Waiting => vec![Provisioning, ProvisionFailed],
        Provisioning => vec![ProvisionFailed, ProvisionSucceeded],
        ProvisionSucceeded => vec![Binding, BindFailed],
        Binding => vec![BindSucceeded, BindFailed, PublishConfiguring],
        PublishConfiguring => vec![PublishConfigured, PublishConfigFailed],
        ProvisionFailed | BindFailed | BindSucceeded | PublishConfigured | PublishConfigFailed => {
            Vec::new()
        }
    }
}

/// Returns true if the session has finished, successfully or not.
#[must_use]
pub const fn is_terminal(phase: Phase) -> bool {
    matches!(
        phase,
        Phase::ProvisionFailed
            | Phase::BindFailed
            | Phase::BindSucceeded
            | Phase::PublishConfigured
            | Phase::PublishConfigFailed
    )
}

/// Returns true if the session is waiting on the network.
#[must_use]
pub const fn is_in_flight(phase: Phase) -> bool {
    matches!(
        phase,
        Phase::Provisioning | Phase::ProvisionSucceeded | Phase::Binding | Phase::PublishConfiguring
    )
}

/// Returns true if the terminal phase counts as a failure.
#[must_use]
pub const fn is_failure(phase: Phase) -> bool {
    matches!(
        phase,
        Phase::ProvisionFailed | Phase::BindFailed | Phase::PublishConfigFailed
    )
}

/// Category of a session diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    /// Discovery.
    Scan,
    /// Provisioning.
    Provision,
    /// Key binding.
    Bind,
    /// Publication setup.
    PublishSet,
}

/// One diagnostic entry of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Category.
    pub category: LogCategory,
    /// Message.
    pub message: String,
    /// When the entry was recorded.
    pub at: DateTime<Utc>,
}

/// A device moving through onboarding.
///
/// Sessions are retained after reaching a terminal phase so their log stays
/// available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingSession {
    /// The discovered device.
    pub candidate: CandidateDevice,
    /// Working node record, present once an address has been allocated.
    pub node: Option<NodeRecord>,
    phase: Phase,
    log: Vec<LogEntry>,
}

impl OnboardingSession {
    /// Create a session for a freshly discovered device.
    #[must_use]
    pub fn new(candidate: CandidateDevice) -> Self {
        let mut session = Self {
            candidate,
            node: None,
            phase: Phase::Idle,
            log: Vec::new(),
        };
        session.record(LogCategory::Scan, "device selected for onboarding");
        session
    }

    /// The device's UUID.
    #[must_use]
    pub const fn device_uuid(&self) -> DeviceUuid {
        self.candidate.device_uuid
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Diagnostic log in append order.
    #[must_use]
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Append a diagnostic entry.
    pub fn record(&mut self, category: LogCategory, message: impl Into<String>) {
        self.log.push(LogEntry {
            category,
            message: message.into(),
            at: Utc::now(),
        });
    }

    /// Move to `to` if the state machine allows it.
    ///
    /// Returns false, leaving the phase unchanged, otherwise.
    pub fn advance(&mut self, to: Phase) -> bool {
        if !is_valid_transition(self.phase, to) {
            tracing::warn!(
                uuid = %self.device_uuid(),
                from = ?self.phase,
                to = ?to,
                "Rejected onboarding transition"
            );
            return false;
        }
        tracing::debug!(uuid = %self.device_uuid(), from = ?self.phase, to = ?to, "Onboarding transition");
        self.phase = to;
        true
    }
}
