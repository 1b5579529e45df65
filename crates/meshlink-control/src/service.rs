//! The mesh controller.
//!
//! [`MeshController`] ties the orchestration components together. Every
//! protocol event and every caller command goes through it on a single
//! owner, so registry mutations never race.

use meshlink_core::{Destination, DeviceUuid, GroupAddress, ModelId, SceneId, UnicastAddress};
use meshlink_store::{NodeRecord, NodeStatus, OnOffState, Scene, Store};
use tokio::time::Instant;

use crate::capability::Capability;
use crate::context::MeshContext;
use crate::discovery::{AdvertisingReport, CandidateDevice, DiscoveryTable};
use crate::error::{ControlError, Result};
use crate::events::{Notification, ProtocolEvent, StatusMessage};
use crate::lifecycle::{OnboardingSession, Phase};
use crate::light;
use crate::onboarding::Onboarding;
use crate::registry::MeshRegistry;
use crate::sequencer;
use crate::transport::Transport;
use crate::types::{GroupOp, MeshConfig, SceneOp, SceneReport};

/// Orchestrates discovery, onboarding, group and scene commands.
pub struct MeshController<S: Store, T: Transport> {
    ctx: MeshContext<S, T>,
    discovery: DiscoveryTable,
    onboarding: Onboarding,
    scanning: bool,
}

impl<S: Store, T: Transport> MeshController<S, T> {
    /// Create a controller over a context.
    #[must_use]
    pub fn new(ctx: MeshContext<S, T>) -> Self {
        Self {
            ctx,
            discovery: DiscoveryTable::new(),
            onboarding: Onboarding::new(),
            scanning: false,
        }
    }

    /// The registry.
    #[must_use]
    pub const fn registry(&self) -> &MeshRegistry<S> {
        &self.ctx.registry
    }

    /// The transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.ctx.transport
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &MeshConfig {
        &self.ctx.config
    }

    /// All stored nodes.
    #[must_use]
    pub fn nodes(&self) -> &[NodeRecord] {
        self.ctx.registry.nodes()
    }

    /// Nodes not known to be offline.
    #[must_use]
    pub fn online_nodes(&self) -> Vec<&NodeRecord> {
        self.ctx.registry.online_nodes().collect()
    }

    /// All stored scenes.
    #[must_use]
    pub fn scenes(&self) -> &[Scene] {
        self.ctx.registry.scenes()
    }

    /// Candidates seen during the current scan.
    #[must_use]
    pub fn candidates(&self) -> &[CandidateDevice] {
        self.discovery.candidates()
    }

    /// Onboarding sessions in creation order.
    #[must_use]
    pub fn sessions(&self) -> &[OnboardingSession] {
        self.onboarding.sessions()
    }

    /// Most recent onboarding session for a device.
    #[must_use]
    pub fn session(&self, uuid: &DeviceUuid) -> Option<&OnboardingSession> {
        self.onboarding.session(uuid)
    }

    /// Attempt number and deadline of the outstanding publication request.
    #[must_use]
    pub fn publish_deadline(&self) -> Option<(u64, Instant)> {
        self.onboarding.publish_deadline()
    }

    /// Whether a scan is running.
    #[must_use]
    pub const fn is_scanning(&self) -> bool {
        self.scanning
    }

    // =========================================================================
    // Protocol events
    // =========================================================================

    /// Process one protocol event.
    pub fn handle_event(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::DeviceFound(report) => self.on_device_found(report),
            ProtocolEvent::ScanTimeout => self.on_scan_timeout(),
            ProtocolEvent::ProvisionBegin { device_uuid } => {
                self.onboarding.on_provision_begin(&self.ctx, device_uuid);
            }
            ProtocolEvent::ProvisionSuccess {
                device_uuid,
                element_count,
                device_key,
            } => self.onboarding.on_provision_success(
                &mut self.ctx,
                device_uuid,
                element_count,
                device_key,
            ),
            ProtocolEvent::ProvisionFail {
                device_uuid,
                reason,
            } => self
                .onboarding
                .on_provision_fail(&mut self.ctx, device_uuid, reason),
            ProtocolEvent::BindSuccess {
                address,
                composition,
            } => self
                .onboarding
                .on_bind_success(&mut self.ctx, address, composition),
            ProtocolEvent::BindFail { address, reason } => {
                self.onboarding.on_bind_fail(&mut self.ctx, address, reason);
            }
            ProtocolEvent::StatusNotification(status) => self.on_status(status),
            ProtocolEvent::PublishTimeout { attempt } => {
                self.onboarding.on_publish_timeout(&mut self.ctx, attempt);
            }
        }
    }

    fn on_device_found(&mut self, report: AdvertisingReport) {
        let Some(candidate) = self.discovery.observe(report) else {
            return;
        };
        tracing::info!(uuid = %candidate.device_uuid, handle = %candidate.handle, rssi = candidate.rssi, "Device found");
        self.ctx.notifier.emit(Notification::DeviceFound {
            handle: candidate.handle.clone(),
            device_uuid: candidate.device_uuid,
            rssi: candidate.rssi,
            scan_record: candidate.scan_record.clone(),
        });
    }

    fn on_scan_timeout(&mut self) {
        self.scanning = false;
        tracing::info!(candidates = self.discovery.candidates().len(), "Scan timed out");
        self.ctx.notifier.emit(Notification::ScanTimeout);
        self.ctx.transport.auto_connect();
    }

    fn on_status(&mut self, status: StatusMessage) {
        match status {
            StatusMessage::ModelPublication { source, status } => {
                self.onboarding
                    .on_publication_status(&mut self.ctx, source, status);
            }
            StatusMessage::OnOff { source, on } => {
                self.update_status(source, |s| s.on_off = OnOffState::from(on));
            }
            StatusMessage::Lightness { source, lightness } => {
                self.update_status(source, |s| {
                    s.lightness = light::level_to_percent(lightness);
                });
            }
            StatusMessage::CtlTemperature { source, kelvin } => {
                self.update_status(source, |s| {
                    s.temperature = light::kelvin_to_percent(kelvin);
                });
            }
        }
    }

    fn update_status(&mut self, source: UnicastAddress, apply: impl FnOnce(&mut NodeStatus)) {
        let Some(node) = self.ctx.registry.find_by_element_mut(source) else {
            tracing::debug!(source = %source, "Status from unknown node");
            return;
        };
        let before = node.status;
        apply(&mut node.status);
        let address = node.unicast_address;
        let status = node.status;
        if status == before {
            return;
        }
        if let Err(e) = self.ctx.registry.persist() {
            tracing::warn!(address = %address, error = %e, "Status not persisted");
            return;
        }
        tracing::debug!(address = %address, on_off = status.on_off.description(), "Node status changed");
        self.ctx
            .notifier
            .emit(Notification::NodeStatusChanged { address, status });
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Forget previous candidates and start scanning.
    pub fn start_scan(&mut self) {
        self.discovery.reset();
        self.scanning = true;
        tracing::info!(timeout_secs = self.ctx.config.scan_timeout_seconds, "Scan started");
        self.ctx.transport.start_scan(self.ctx.config.scan_timeout());
    }

    /// Stop scanning and reconnect to the network.
    pub fn stop_scan(&mut self) {
        self.scanning = false;
        self.ctx.transport.stop_scan();
        self.ctx.transport.auto_connect();
        tracing::info!("Scan stopped");
    }

    // =========================================================================
    // Onboarding
    // =========================================================================

    /// Onboard a discovered device.
    ///
    /// The device is queued if another one is in flight. Returns the phase of
    /// the new session.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::CandidateNotFound` if the device was not
    /// discovered, or the reason provisioning could not start.
    pub fn start_onboarding(&mut self, uuid: &DeviceUuid) -> Result<Phase> {
        let candidate = self
            .discovery
            .take(uuid)
            .ok_or(ControlError::CandidateNotFound(*uuid))?;
        if self.scanning {
            self.scanning = false;
            self.ctx.transport.stop_scan();
        }
        self.onboarding.enqueue(&mut self.ctx, candidate)
    }

    /// Start the oldest queued session by hand.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::OnboardingBusy` while a session is in flight.
    pub fn start_next(&mut self) -> Result<Option<DeviceUuid>> {
        self.onboarding.start_next(&mut self.ctx)
    }

    // =========================================================================
    // Groups and scenes
    // =========================================================================

    /// Subscribe a device to a group or unsubscribe it.
    ///
    /// # Errors
    ///
    /// See [`sequencer::change_group`].
    pub fn change_group(
        &mut self,
        group: GroupAddress,
        address: UnicastAddress,
        op: GroupOp,
        model: Option<ModelId>,
    ) -> Result<()> {
        sequencer::change_group(&mut self.ctx, group, address, op, model)
    }

    /// Store or delete a scene across devices, one at a time.
    ///
    /// # Errors
    ///
    /// See [`sequencer::set_scene`].
    pub fn set_scene(
        &mut self,
        scene: SceneId,
        targets: &[UnicastAddress],
        op: SceneOp,
    ) -> Result<()> {
        sequencer::set_scene(&mut self.ctx, scene, targets, op)
    }

    /// Recall a stored scene.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::SceneNotFound` if the scene is not stored.
    pub fn recall_scene(&mut self, scene: SceneId) -> Result<SceneReport> {
        sequencer::recall_scene(&mut self.ctx, scene)
    }

    /// Delete a stored scene from its devices.
    ///
    /// # Errors
    ///
    /// See [`sequencer::delete_scene`].
    pub fn delete_scene(&mut self, scene: SceneId) -> Result<SceneReport> {
        sequencer::delete_scene(&mut self.ctx, scene)
    }

    /// Reset a node and remove it.
    ///
    /// # Errors
    ///
    /// See [`sequencer::kick_out`].
    pub fn kick_out(&mut self, address: UnicastAddress) -> Result<()> {
        sequencer::kick_out(&mut self.ctx, address)
    }

    // =========================================================================
    // Light control
    // =========================================================================

    /// Switch a destination on or off.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::DispatchFailed` if the transport declined.
    pub fn set_on_off(&self, destination: Destination, on: bool) -> Result<()> {
        light::set_on_off(&self.ctx, destination, on)
    }

    /// Set a node's lightness in percent.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound`, `NotResolvable` or `DispatchFailed`.
    pub fn set_lightness(&self, address: UnicastAddress, percent: u8) -> Result<()> {
        light::set_lightness(&self.ctx, address, percent)
    }

    /// Ramp a node's lightness or color temperature by a signed percent.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound`, `NotResolvable` or `DispatchFailed`.
    pub fn step_level(
        &self,
        address: UnicastAddress,
        capability: Capability,
        delta_percent: i8,
    ) -> Result<()> {
        light::step_level(&self.ctx, address, capability, delta_percent)
    }

    /// Set a node's color temperature in percent.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound`, `NotResolvable` or `DispatchFailed`.
    pub fn set_temperature(&self, address: UnicastAddress, percent: u8) -> Result<()> {
        light::set_temperature(&self.ctx, address, percent)
    }

    /// Set a node's color.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound`, `NotResolvable` or `DispatchFailed`.
    pub fn set_hsl(
        &self,
        address: UnicastAddress,
        hue: u16,
        saturation: u8,
        lightness: u8,
    ) -> Result<()> {
        light::set_hsl(&self.ctx, address, hue, saturation, lightness)
    }
}
