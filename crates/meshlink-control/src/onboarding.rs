//! Onboarding orchestration.
//!
//! Drives each [`OnboardingSession`] through provisioning, binding and
//! time-publication setup as protocol events arrive. Only one session is in
//! flight at a time; others wait in `Waiting` until it reaches a terminal
//! phase.

use meshlink_core::{DeviceUuid, ModelId, UnicastAddress};
use meshlink_store::{DeviceKey, NodeRecord, PublishConfig, Store};
use tokio::time::Instant;

use crate::capability;
use crate::context::MeshContext;
use crate::discovery::CandidateDevice;
use crate::error::{ControlError, Result};
use crate::events::Notification;
use crate::lifecycle::{self, LogCategory, OnboardingSession, Phase};
use crate::transport::{BindingRequest, MeshMessage, ProvisioningRequest, Transport};

/// An outstanding publication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAttempt {
    /// Attempt number; a timeout only applies to the attempt it was armed for.
    pub attempt: u64,
    /// Node the request went to.
    pub node: UnicastAddress,
    /// Publication requested.
    pub config: PublishConfig,
    /// When the wait for a status reply ends.
    pub deadline: Instant,
}

/// Onboarding sessions and the single in-flight slot.
#[derive(Debug, Default)]
pub struct Onboarding {
    sessions: Vec<OnboardingSession>,
    active: Option<usize>,
    pending_publish: Option<PublishAttempt>,
    attempts: u64,
}

impl Onboarding {
    /// Create an empty orchestrator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session, finished ones included, in creation order.
    #[must_use]
    pub fn sessions(&self) -> &[OnboardingSession] {
        &self.sessions
    }

    /// Most recent session for a device.
    #[must_use]
    pub fn session(&self, uuid: &DeviceUuid) -> Option<&OnboardingSession> {
        self.sessions.iter().rev().find(|s| s.device_uuid() == *uuid)
    }

    /// The in-flight session, if any.
    #[must_use]
    pub fn active(&self) -> Option<&OnboardingSession> {
        self.active.and_then(|i| self.sessions.get(i))
    }

    /// The outstanding publication request, if any.
    #[must_use]
    pub const fn pending_publish(&self) -> Option<&PublishAttempt> {
        self.pending_publish.as_ref()
    }

    /// Attempt number and deadline of the outstanding publication request.
    #[must_use]
    pub fn publish_deadline(&self) -> Option<(u64, Instant)> {
        self.pending_publish
            .as_ref()
            .map(|p| (p.attempt, p.deadline))
    }

    // =========================================================================
    // Starting sessions
    // =========================================================================

    /// Queue a candidate behind any waiting sessions.
    ///
    /// If nothing is in flight the oldest waiting session starts, which is
    /// the new one only when nothing else waits. Returns the phase the new
    /// session is in.
    ///
    /// # Errors
    ///
    /// Returns the reason the new session could not start. The session is
    /// then in `ProvisionFailed` and a failure notification has been emitted.
    pub fn enqueue<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
        candidate: CandidateDevice,
    ) -> Result<Phase> {
        let mut session = OnboardingSession::new(candidate);
        session.advance(Phase::Waiting);
        self.sessions.push(session);
        let index = self.sessions.len() - 1;

        if self.active.is_some() {
            tracing::info!(uuid = %self.sessions[index].device_uuid(), "Onboarding queued");
            return Ok(Phase::Waiting);
        }
        while let Some(next) = self
            .sessions
            .iter()
            .position(|s| s.phase() == Phase::Waiting)
        {
            match self.start(ctx, next) {
                Ok(()) => break,
                Err(e) if next == index => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Waiting session could not start");
                }
            }
        }
        Ok(self.sessions[index].phase())
    }

    /// Start the oldest waiting session.
    ///
    /// Returns the UUID of the started device, or `None` if nothing waits.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::OnboardingBusy` if a session is in flight, or
    /// the reason the waiting session could not start.
    pub fn start_next<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
    ) -> Result<Option<DeviceUuid>> {
        if let Some(active) = self.active() {
            return Err(ControlError::OnboardingBusy(active.device_uuid()));
        }
        let Some(index) = self
            .sessions
            .iter()
            .position(|s| s.phase() == Phase::Waiting)
        else {
            return Ok(None);
        };
        self.start(ctx, index)?;
        Ok(Some(self.sessions[index].device_uuid()))
    }

    fn start<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
        index: usize,
    ) -> Result<()> {
        let uuid = self.sessions[index].device_uuid();

        let address = match ctx.registry.next_provision_address() {
            Ok(address) => address,
            Err(e) => {
                self.abort(ctx, index, &e);
                return Err(e);
            }
        };
        let static_oob = match ctx.registry.oob(&uuid) {
            Ok(pair) => pair.map(|p| p.oob),
            Err(e) => {
                self.abort(ctx, index, &e);
                return Err(e);
            }
        };

        let session = &mut self.sessions[index];
        let mut node = NodeRecord::new(address, uuid);
        node.mac_address = Some(session.candidate.handle.clone());
        session.node = Some(node);
        session.advance(Phase::Provisioning);
        session.record(
            LogCategory::Provision,
            format!(
                "provisioning as {address} ({})",
                if static_oob.is_some() { "static oob" } else { "no oob" }
            ),
        );

        let request = ProvisioningRequest {
            device_uuid: uuid,
            handle: session.candidate.handle.clone(),
            address,
            static_oob,
            auto_use_no_oob: ctx.config.auto_use_no_oob,
        };
        if !ctx.transport.start_provisioning(request) {
            let e = ControlError::DispatchFailed("provisioning request refused".to_string());
            self.abort(ctx, index, &e);
            return Err(e);
        }

        tracing::info!(uuid = %uuid, address = %address, "Provisioning started");
        self.active = Some(index);
        Ok(())
    }

    /// Fail a session that never reached the transport.
    fn abort<S: Store, T: Transport>(
        &mut self,
        ctx: &MeshContext<S, T>,
        index: usize,
        error: &ControlError,
    ) {
        let session = &mut self.sessions[index];
        session.record(LogCategory::Provision, error.to_string());
        session.advance(Phase::ProvisionFailed);
        tracing::warn!(uuid = %session.device_uuid(), error = %error, "Onboarding aborted");
        ctx.notifier.emit(Notification::ProvisionFailed {
            device_uuid: session.device_uuid(),
            reason: error.to_string(),
        });
    }

    /// Release the in-flight slot and, if configured, start the next session.
    fn settle<S: Store, T: Transport>(&mut self, ctx: &mut MeshContext<S, T>) {
        self.active = None;
        if !ctx.config.auto_advance {
            return;
        }
        // A session that fails to start is terminal, so this always ends.
        while let Err(e) = self.start_next(ctx) {
            tracing::warn!(error = %e, "Queued onboarding could not start");
            if matches!(e, ControlError::OnboardingBusy(_)) {
                break;
            }
        }
    }

    /// Index of the in-flight session if it is in `phase` and matches.
    fn active_in(&self, phase: Phase, matches: impl Fn(&OnboardingSession) -> bool) -> Option<usize> {
        let index = self.active?;
        let session = self.sessions.get(index)?;
        (session.phase() == phase && matches(session)).then_some(index)
    }

    fn node_address(session: &OnboardingSession) -> Option<UnicastAddress> {
        session.node.as_ref().map(|n| n.unicast_address)
    }

    // =========================================================================
    // Provisioning events
    // =========================================================================

    /// The stack began the provisioning exchange.
    pub fn on_provision_begin<S: Store, T: Transport>(
        &mut self,
        ctx: &MeshContext<S, T>,
        uuid: DeviceUuid,
    ) {
        let Some(index) = self.active_in(Phase::Provisioning, |s| s.device_uuid() == uuid) else {
            tracing::debug!(uuid = %uuid, "Ignoring provision begin for unknown session");
            return;
        };
        let session = &mut self.sessions[index];
        session.record(LogCategory::Provision, "provisioning begin");
        if let Some(address) = Self::node_address(session) {
            ctx.notifier.emit(Notification::ProvisionStarted {
                device_uuid: uuid,
                address,
            });
        }
    }

    /// Provisioning completed: persist the node, then start binding.
    pub fn on_provision_success<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
        uuid: DeviceUuid,
        element_count: u8,
        device_key: DeviceKey,
    ) {
        let Some(index) = self.active_in(Phase::Provisioning, |s| s.device_uuid() == uuid) else {
            tracing::debug!(uuid = %uuid, "Ignoring provision success for unknown session");
            return;
        };
        let Some(mut node) = self.sessions[index].node.clone() else {
            return;
        };
        node.element_count = element_count;
        node.device_key = Some(device_key);
        node.provisioned_at = chrono::Utc::now();
        let address = node.unicast_address;

        let stored = ctx
            .registry
            .insert_device(node.clone())
            .and_then(|()| ctx.registry.persist());
        if let Err(e) = stored {
            let session = &mut self.sessions[index];
            session.record(LogCategory::Provision, format!("persist failed: {e}"));
            session.advance(Phase::ProvisionFailed);
            tracing::warn!(uuid = %uuid, address = %address, error = %e, "Provisioned node not persisted");
            ctx.notifier.emit(Notification::ProvisionFailed {
                device_uuid: uuid,
                reason: e.to_string(),
            });
            self.settle(ctx);
            return;
        }

        tracing::info!(uuid = %uuid, address = %address, elements = element_count, "Provisioning succeeded");
        ctx.notifier.emit(Notification::ProvisionSucceeded {
            device_uuid: uuid,
            address,
        });

        let trusted = if ctx.config.fast_bind_enabled {
            ctx.trust.lookup(&uuid)
        } else {
            None
        };
        if trusted.is_some() {
            node.default_bound = true;
            node.composition.clone_from(&trusted);
        }

        let session = &mut self.sessions[index];
        session.advance(Phase::ProvisionSucceeded);
        session.record(
            LogCategory::Provision,
            format!("provisioned as {address} with {element_count} elements"),
        );
        let request = BindingRequest {
            address,
            device_uuid: uuid,
            handle: session.candidate.handle.clone(),
            app_key_index: ctx.registry.default_app_key_index(),
            trusted_composition: trusted,
        };
        session.record(
            LogCategory::Bind,
            if request.is_default_bound() {
                "binding with trusted composition"
            } else {
                "binding"
            },
        );
        session.node = Some(node);

        if !ctx.transport.start_binding(request) {
            let reason = "binding request refused".to_string();
            session.record(LogCategory::Bind, reason.clone());
            session.advance(Phase::BindFailed);
            ctx.notifier
                .emit(Notification::BindFailed { address, reason });
            self.settle(ctx);
            return;
        }
        session.advance(Phase::Binding);
        ctx.notifier.emit(Notification::BindStarted { address });
    }

    /// Provisioning failed. No retry is made.
    pub fn on_provision_fail<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
        uuid: DeviceUuid,
        reason: String,
    ) {
        let Some(index) = self.active_in(Phase::Provisioning, |s| s.device_uuid() == uuid) else {
            tracing::debug!(uuid = %uuid, "Ignoring provision failure for unknown session");
            return;
        };
        let session = &mut self.sessions[index];
        session.record(LogCategory::Provision, format!("provisioning failed: {reason}"));
        session.advance(Phase::ProvisionFailed);
        tracing::warn!(uuid = %uuid, reason = %reason, "Provisioning failed");
        ctx.notifier.emit(Notification::ProvisionFailed {
            device_uuid: uuid,
            reason,
        });
        self.settle(ctx);
    }

    // =========================================================================
    // Binding events
    // =========================================================================

    /// Binding completed: adopt composition data, then set up time
    /// publication if the device has a time server.
    pub fn on_bind_success<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
        address: UnicastAddress,
        composition: Option<meshlink_store::CompositionData>,
    ) {
        let Some(index) = self.active_in(Phase::Binding, |s| Self::node_address(s) == Some(address))
        else {
            tracing::debug!(address = %address, "Ignoring bind success for unknown session");
            return;
        };
        let Some(mut node) = self.sessions[index].node.clone() else {
            return;
        };
        node.bound = true;
        if !node.default_bound {
            node.composition = composition;
        }
        if let Some(cps) = &node.composition {
            if cps.elements.len() != usize::from(node.element_count) {
                tracing::warn!(
                    address = %address,
                    declared = cps.elements.len(),
                    provisioned = node.element_count,
                    "Composition element count differs from provisioning"
                );
            }
        }

        let stored = ctx
            .registry
            .update_device(node.clone())
            .and_then(|()| ctx.registry.persist());
        if let Err(e) = stored {
            let session = &mut self.sessions[index];
            let reason = format!("persist failed: {e}");
            session.record(LogCategory::Bind, reason.clone());
            session.advance(Phase::BindFailed);
            ctx.notifier.emit(Notification::BindFailed { address, reason });
            self.settle(ctx);
            return;
        }

        tracing::info!(address = %address, default_bound = node.default_bound, "Binding succeeded");
        ctx.notifier.emit(Notification::BindSucceeded { address });

        let time_element = node
            .composition
            .as_ref()
            .and_then(|cps| capability::resolve(address, cps, ModelId::TIME_SERVER));
        let session = &mut self.sessions[index];
        session.record(LogCategory::Bind, "bound");
        session.node = Some(node);

        let Some(element) = time_element else {
            session.advance(Phase::BindSucceeded);
            self.settle(ctx);
            return;
        };
        if self.pending_publish.is_some() {
            tracing::warn!(address = %address, "Publication already in flight, skipping");
            session.advance(Phase::BindSucceeded);
            self.settle(ctx);
            return;
        }

        let config = PublishConfig {
            element_address: element,
            publish_address: ctx.config.time_publish_address,
            app_key_index: ctx.registry.default_app_key_index(),
            period_ms: ctx.config.time_publish_period_ms,
            model: ModelId::TIME_SERVER,
        };
        session.advance(Phase::PublishConfiguring);
        session.record(
            LogCategory::PublishSet,
            format!("publishing time from {element} to 0x{:04X}", config.publish_address),
        );
        let dispatched = ctx.transport.send(MeshMessage::ModelPublicationSet {
            node: address,
            config: config.clone(),
        });
        if !dispatched {
            self.fail_publish(ctx, index, "publication request not dispatched");
            return;
        }

        self.attempts += 1;
        self.pending_publish = Some(PublishAttempt {
            attempt: self.attempts,
            node: address,
            config,
            deadline: Instant::now() + ctx.config.publish_timeout(),
        });
        tracing::debug!(address = %address, attempt = self.attempts, "Publication timer armed");
    }

    /// Binding failed. No retry is made.
    pub fn on_bind_fail<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
        address: UnicastAddress,
        reason: String,
    ) {
        let Some(index) = self.active_in(Phase::Binding, |s| Self::node_address(s) == Some(address))
        else {
            tracing::debug!(address = %address, "Ignoring bind failure for unknown session");
            return;
        };
        let session = &mut self.sessions[index];
        session.record(LogCategory::Bind, format!("binding failed: {reason}"));
        session.advance(Phase::BindFailed);
        tracing::warn!(address = %address, reason = %reason, "Binding failed");
        ctx.notifier.emit(Notification::BindFailed { address, reason });
        self.settle(ctx);
    }

    // =========================================================================
    // Publication events
    // =========================================================================

    /// A publication status reply arrived.
    ///
    /// Ignored unless a request to `source` is outstanding.
    pub fn on_publication_status<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
        source: UnicastAddress,
        status: u8,
    ) {
        let Some(pending) = self.pending_publish.take_if(|p| p.node == source) else {
            tracing::debug!(source = %source, status, "Ignoring publication status, none pending");
            return;
        };
        let Some(index) =
            self.active_in(Phase::PublishConfiguring, |s| Self::node_address(s) == Some(source))
        else {
            return;
        };

        if status != 0 {
            self.fail_publish(ctx, index, &format!("status 0x{status:02X}"));
            return;
        }

        let Some(mut node) = self.sessions[index].node.clone() else {
            return;
        };
        node.publication = Some(pending.config);
        let stored = ctx
            .registry
            .update_device(node.clone())
            .and_then(|()| ctx.registry.persist());
        if let Err(e) = stored {
            self.fail_publish(ctx, index, &format!("persist failed: {e}"));
            return;
        }

        let session = &mut self.sessions[index];
        session.node = Some(node);
        session.record(LogCategory::PublishSet, "publication configured");
        session.advance(Phase::PublishConfigured);
        tracing::info!(address = %source, "Time publication configured");
        ctx.notifier
            .emit(Notification::PublishConfigured { address: source });
        self.settle(ctx);
    }

    /// The wait for a publication status elapsed.
    ///
    /// Ignored unless `attempt` is the outstanding one.
    pub fn on_publish_timeout<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
        attempt: u64,
    ) {
        let Some(pending) = self.pending_publish.take_if(|p| p.attempt == attempt) else {
            tracing::debug!(attempt, "Ignoring stale publication timeout");
            return;
        };
        let Some(index) = self.active_in(Phase::PublishConfiguring, |s| {
            Self::node_address(s) == Some(pending.node)
        }) else {
            return;
        };
        self.fail_publish(ctx, index, "timeout");
    }

    /// Persist the node as it stands and fail the session.
    fn fail_publish<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
        index: usize,
        reason: &str,
    ) {
        self.pending_publish = None;
        if let Err(e) = ctx.registry.persist() {
            tracing::warn!(error = %e, "Persist after publication failure failed");
        }

        let session = &mut self.sessions[index];
        session.record(LogCategory::PublishSet, format!("publication failed: {reason}"));
        session.advance(Phase::PublishConfigFailed);
        if let Some(address) = Self::node_address(session) {
            tracing::warn!(address = %address, reason, "Time publication failed");
            ctx.notifier.emit(Notification::PublishConfigFailed {
                address,
                reason: reason.to_string(),
            });
        }
        self.settle(ctx);
    }

    /// Whether any session is still in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active()
            .is_some_and(|s| lifecycle::is_in_flight(s.phase()))
    }
}
