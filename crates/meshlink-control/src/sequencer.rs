//! Group and scene command sequencing.
//!
//! Commands go out one device at a time. A scene batch is an explicit queue
//! of [`SceneStep`]s; each step completes (dispatch outcome known, registry
//! persisted) before the next one is taken, because scene completions are
//! correlated by scene number alone.

use std::collections::VecDeque;

use meshlink_core::{Destination, GroupAddress, ModelId, SceneId, UnicastAddress};
use meshlink_store::{NodeRecord, Scene, SceneState, Store};

use crate::capability;
use crate::context::MeshContext;
use crate::error::{ControlError, Result};
use crate::events::Notification;
use crate::transport::{MeshMessage, SubscriptionOp, Transport};
use crate::types::{EntryOutcome, GroupOp, SceneOp, SceneReport};

/// Element of `node` implementing `model`.
fn resolve_element(node: &NodeRecord, model: ModelId) -> Result<UnicastAddress> {
    node.composition
        .as_ref()
        .and_then(|cps| capability::resolve(node.unicast_address, cps, model))
        .ok_or(ControlError::NotResolvable {
            address: node.unicast_address,
            model,
        })
}

// =============================================================================
// Group subscriptions
// =============================================================================

/// Subscribe a device to a group or unsubscribe it.
///
/// `model` defaults to the generic on/off server. The subscription list is
/// updated and persisted only once the command was dispatched.
///
/// # Errors
///
/// Returns `DeviceNotFound` or `NotResolvable` without contacting the
/// transport, `DispatchFailed` if the transport declined, or a storage error.
/// A `GroupChangeFailed` notification accompanies every error.
pub fn change_group<S: Store, T: Transport>(
    ctx: &mut MeshContext<S, T>,
    group: GroupAddress,
    address: UnicastAddress,
    op: GroupOp,
    model: Option<ModelId>,
) -> Result<()> {
    let result = try_change_group(ctx, group, address, op, model.unwrap_or(ModelId::GENERIC_ON_OFF_SERVER));
    match &result {
        Ok(()) => {
            tracing::info!(group = %group, address = %address, op = ?op, "Group change dispatched");
            ctx.notifier
                .emit(Notification::GroupChangeSucceeded { group, address, op });
        }
        Err(e) => {
            tracing::warn!(group = %group, address = %address, op = ?op, error = %e, "Group change failed");
            ctx.notifier
                .emit(Notification::GroupChangeFailed { group, address });
        }
    }
    result
}

fn try_change_group<S: Store, T: Transport>(
    ctx: &mut MeshContext<S, T>,
    group: GroupAddress,
    address: UnicastAddress,
    op: GroupOp,
    model: ModelId,
) -> Result<()> {
    let mut node = ctx
        .registry
        .find(address)
        .cloned()
        .ok_or(ControlError::DeviceNotFound(address))?;
    let element = resolve_element(&node, model)?;

    let dispatched = ctx.transport.send(MeshMessage::ModelSubscriptionSet {
        node: address,
        element,
        group,
        model,
        op: match op {
            GroupOp::Add => SubscriptionOp::Add,
            GroupOp::Remove => SubscriptionOp::Delete,
        },
    });
    if !dispatched {
        return Err(ControlError::DispatchFailed(format!(
            "subscription change for {group} on {address}"
        )));
    }

    match op {
        GroupOp::Add => {
            if !node.subscriptions.contains(&group) {
                node.subscriptions.push(group);
            }
        }
        GroupOp::Remove => node.subscriptions.retain(|g| *g != group),
    }
    ctx.registry.update_device(node)?;
    ctx.registry.persist()
}

// =============================================================================
// Scene authoring
// =============================================================================

/// One device of a scene batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneStep {
    /// Position of the device in the submitted list.
    pub index: usize,
    /// Primary address of the device.
    pub address: UnicastAddress,
}

/// A scene batch in progress.
#[derive(Debug)]
pub struct SceneBatch {
    scene: Scene,
    op: SceneOp,
    steps: VecDeque<SceneStep>,
    total: usize,
}

impl SceneBatch {
    /// Plan a batch over `targets` in order.
    ///
    /// Both operations start from the stored scene, if any, so storing on
    /// more devices extends it rather than replacing it.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::EmptyScene` if `targets` is empty.
    pub fn new<S: Store>(
        registry: &crate::registry::MeshRegistry<S>,
        id: SceneId,
        targets: &[UnicastAddress],
        op: SceneOp,
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(ControlError::EmptyScene(id));
        }
        let scene = registry.scene(id).cloned().unwrap_or_else(|| Scene::new(id));
        let steps = targets
            .iter()
            .enumerate()
            .map(|(index, &address)| SceneStep { index, address })
            .collect();
        Ok(Self {
            scene,
            op,
            steps,
            total: targets.len(),
        })
    }

    /// Scene number.
    #[must_use]
    pub const fn id(&self) -> SceneId {
        self.scene.id
    }

    /// Steps not yet taken.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// Take and run the next step.
    ///
    /// Returns the completed step, or `None` once the batch is exhausted.
    ///
    /// # Errors
    ///
    /// Returns why the step failed. The failing step is consumed and the
    /// batch should be abandoned; earlier steps stay applied.
    pub fn step<S: Store, T: Transport>(
        &mut self,
        ctx: &mut MeshContext<S, T>,
    ) -> Result<Option<SceneStep>> {
        let Some(step) = self.steps.pop_front() else {
            return Ok(None);
        };
        let id = self.scene.id;
        let node = ctx
            .registry
            .find(step.address)
            .ok_or(ControlError::DeviceNotFound(step.address))?;
        let state = SceneState::capture(node);
        let element = resolve_element(node, ModelId::SCENE_SERVER)?;
        let app_key_index = ctx.registry.default_app_key_index();

        let message = match self.op {
            SceneOp::Store => MeshMessage::SceneStore {
                element,
                scene: id,
                app_key_index,
            },
            SceneOp::Delete => MeshMessage::SceneDelete {
                element,
                scene: id,
                app_key_index,
            },
        };
        if !ctx.transport.send(message) {
            return Err(ControlError::DispatchFailed(format!(
                "scene {id} on {}",
                step.address
            )));
        }

        match self.op {
            SceneOp::Store => match self
                .scene
                .states
                .iter_mut()
                .find(|s| s.address == state.address)
            {
                Some(existing) => *existing = state,
                None => self.scene.states.push(state),
            },
            SceneOp::Delete => self.scene.states.retain(|s| s.address != step.address),
        }
        ctx.registry.put_scene(self.scene.clone());
        ctx.registry.persist()?;

        tracing::debug!(scene = %id, index = step.index, address = %step.address, "Scene step done");
        Ok(Some(step))
    }
}

/// Store or delete a scene on each target device, one at a time.
///
/// Emits `SceneStepSucceeded` for every device but the last and
/// `SceneSetSucceeded` after the last one. Stops at the first failing device
/// with `SceneSetFailed`; devices before it keep their changes.
///
/// # Errors
///
/// Returns `EmptyScene` for an empty target list, or the failing device's
/// error.
pub fn set_scene<S: Store, T: Transport>(
    ctx: &mut MeshContext<S, T>,
    id: SceneId,
    targets: &[UnicastAddress],
    op: SceneOp,
) -> Result<()> {
    let mut batch = SceneBatch::new(&ctx.registry, id, targets, op)?;
    tracing::info!(scene = %id, op = ?op, devices = batch.total, "Scene batch started");

    loop {
        let index = batch.total - batch.remaining();
        match batch.step(ctx) {
            Ok(Some(step)) if batch.remaining() == 0 => {
                tracing::info!(scene = %id, devices = step.index + 1, "Scene batch completed");
                ctx.notifier.emit(Notification::SceneSetSucceeded { scene: id });
            }
            Ok(Some(step)) => {
                ctx.notifier.emit(Notification::SceneStepSucceeded {
                    scene: id,
                    index: step.index,
                });
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::warn!(scene = %id, index, error = %e, "Scene batch aborted");
                ctx.notifier
                    .emit(Notification::SceneSetFailed { scene: id, index });
                return Err(e);
            }
        }
    }
}

// =============================================================================
// Scene playback and deletion
// =============================================================================

fn scene_entry<S: Store, T: Transport>(
    ctx: &MeshContext<S, T>,
    address: UnicastAddress,
    message: impl FnOnce(UnicastAddress) -> MeshMessage,
) -> EntryOutcome {
    let Some(node) = ctx.registry.find(address) else {
        return EntryOutcome::DeviceNotFound;
    };
    let Ok(element) = resolve_element(node, ModelId::SCENE_SERVER) else {
        return EntryOutcome::NotResolvable;
    };
    if ctx.transport.send(message(element)) {
        EntryOutcome::Dispatched
    } else {
        EntryOutcome::DispatchFailed
    }
}

/// Recall a stored scene on each of its devices.
///
/// # Errors
///
/// Returns `ControlError::SceneNotFound` if the scene is not stored.
pub fn recall_scene<S: Store, T: Transport>(
    ctx: &mut MeshContext<S, T>,
    id: SceneId,
) -> Result<SceneReport> {
    let addresses: Vec<UnicastAddress> = ctx
        .registry
        .scene(id)
        .ok_or(ControlError::SceneNotFound(id))?
        .addresses()
        .collect();
    let app_key_index = ctx.registry.default_app_key_index();

    let mut report = SceneReport::default();
    for address in addresses {
        let outcome = scene_entry(ctx, address, |element| MeshMessage::SceneRecall {
            destination: Destination::Unicast(element),
            scene: id,
            app_key_index,
        });
        report.entries.push((address, outcome));
    }
    tracing::info!(scene = %id, complete = report.all_dispatched(), "Scene recalled");
    Ok(report)
}

/// Delete a stored scene from each of its devices.
///
/// Every device is attempted. States of devices that received the command
/// are dropped; the scene disappears once no state remains.
///
/// # Errors
///
/// Returns `ControlError::SceneNotFound` if the scene is not stored, or a
/// storage error.
pub fn delete_scene<S: Store, T: Transport>(
    ctx: &mut MeshContext<S, T>,
    id: SceneId,
) -> Result<SceneReport> {
    let addresses: Vec<UnicastAddress> = ctx
        .registry
        .scene(id)
        .ok_or(ControlError::SceneNotFound(id))?
        .addresses()
        .collect();
    let app_key_index = ctx.registry.default_app_key_index();

    let mut report = SceneReport::default();
    for address in addresses {
        let outcome = scene_entry(ctx, address, |element| MeshMessage::SceneDelete {
            element,
            scene: id,
            app_key_index,
        });
        report.entries.push((address, outcome));
    }

    let removed: Vec<UnicastAddress> = report.dispatched().collect();
    for address in removed {
        ctx.registry.remove_scene_state(id, address);
    }
    if let Err(e) = ctx.registry.persist() {
        ctx.notifier.emit(Notification::SceneRemoveFailed { scene: id });
        return Err(e);
    }

    if report.all_dispatched() {
        tracing::info!(scene = %id, "Scene removed");
        ctx.notifier.emit(Notification::SceneRemoved { scene: id });
    } else {
        tracing::warn!(scene = %id, entries = ?report.entries, "Scene partially removed");
        ctx.notifier.emit(Notification::SceneRemoveFailed { scene: id });
    }
    Ok(report)
}

// =============================================================================
// Device removal
// =============================================================================

/// Reset a node and remove it from the registry.
///
/// A reset sent through another node cannot be confirmed locally, so only a
/// declined send to the directly connected node fails.
///
/// # Errors
///
/// Returns `DeviceNotFound` if the node is unknown, `DispatchFailed` for a
/// declined send to the direct node, or a storage error.
pub fn kick_out<S: Store, T: Transport>(
    ctx: &mut MeshContext<S, T>,
    address: UnicastAddress,
) -> Result<()> {
    if ctx.registry.find(address).is_none() {
        return Err(ControlError::DeviceNotFound(address));
    }

    let dispatched = ctx.transport.send(MeshMessage::NodeReset { node: address });
    let direct = ctx.transport.direct_address() == Some(address);
    if !dispatched && direct {
        tracing::warn!(address = %address, "Reset not dispatched to direct node");
        ctx.notifier.emit(Notification::NodeResetFailed { address });
        return Err(ControlError::DispatchFailed(format!("reset of {address}")));
    }

    let scenes: Vec<SceneId> = ctx.registry.scenes().iter().map(|s| s.id).collect();
    ctx.registry.remove_device(address)?;
    for id in scenes {
        ctx.registry.remove_scene_state(id, address);
    }
    if let Err(e) = ctx.registry.persist() {
        ctx.notifier.emit(Notification::NodeResetFailed { address });
        return Err(e);
    }

    ctx.transport.reset_node(address);
    tracing::info!(address = %address, dispatched, direct, "Node removed");
    ctx.notifier.emit(Notification::NodeResetSucceeded { address });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meshlink_core::DeviceUuid;
    use meshlink_store::{CompositionData, Element, MemoryStore, OnOffState};
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::events::Notifier;
    use crate::registry::MeshRegistry;
    use crate::transport::RecordingTransport;
    use crate::types::MeshConfig;

    fn addr(raw: u16) -> UnicastAddress {
        UnicastAddress::new(raw).unwrap()
    }

    fn light(raw: u16, models: &[ModelId]) -> NodeRecord {
        let mut node = NodeRecord::new(addr(raw), DeviceUuid::from_bytes([raw as u8; 16]));
        node.element_count = 1;
        node.bound = true;
        node.status.on_off = OnOffState::On;
        node.status.lightness = 40;
        node.composition = Some(CompositionData::from_elements(vec![
            Element::with_sig_models(models.iter().copied()),
        ]));
        node
    }

    fn setup(
        nodes: Vec<NodeRecord>,
    ) -> (
        MeshContext<MemoryStore, RecordingTransport>,
        RecordingTransport,
        UnboundedReceiver<Notification>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let mut registry = MeshRegistry::load(store).unwrap();
        for node in nodes {
            registry.insert_device(node).unwrap();
        }
        registry.persist().unwrap();
        let transport = RecordingTransport::new();
        let (notifier, rx) = Notifier::channel();
        let ctx = MeshContext::new(registry, transport.clone(), notifier, MeshConfig::default());
        (ctx, transport, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    const SCENE_LIGHT: &[ModelId] = &[ModelId::GENERIC_ON_OFF_SERVER, ModelId::SCENE_SERVER];

    #[test]
    fn group_add_updates_subscriptions_once() {
        let (mut ctx, transport, mut rx) = setup(vec![light(0x0002, SCENE_LIGHT)]);
        let group = GroupAddress::new(0xC001).unwrap();

        change_group(&mut ctx, group, addr(0x0002), GroupOp::Add, None).unwrap();
        change_group(&mut ctx, group, addr(0x0002), GroupOp::Add, None).unwrap();

        assert_eq!(ctx.registry.find(addr(0x0002)).unwrap().subscriptions, vec![group]);
        assert_eq!(transport.sent().len(), 2);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [Notification::GroupChangeSucceeded { .. }, Notification::GroupChangeSucceeded { .. }]
        ));
    }

    #[test]
    fn group_change_not_dispatched_leaves_state() {
        let (mut ctx, transport, mut rx) = setup(vec![light(0x0002, SCENE_LIGHT)]);
        transport.set_dispatch(false);
        let group = GroupAddress::new(0xC001).unwrap();

        let err = change_group(&mut ctx, group, addr(0x0002), GroupOp::Add, None).unwrap_err();
        assert!(matches!(err, ControlError::DispatchFailed(_)));
        assert!(ctx.registry.find(addr(0x0002)).unwrap().subscriptions.is_empty());
        assert_eq!(
            drain(&mut rx),
            vec![Notification::GroupChangeFailed { group, address: addr(0x0002) }]
        );
    }

    #[test]
    fn scene_delete_batch_drops_states() {
        let (mut ctx, _transport, _rx) =
            setup(vec![light(0x0002, SCENE_LIGHT), light(0x0003, SCENE_LIGHT)]);
        let id = SceneId::new(7).unwrap();
        set_scene(&mut ctx, id, &[addr(0x0002), addr(0x0003)], SceneOp::Store).unwrap();
        assert_eq!(ctx.registry.scene(id).unwrap().states.len(), 2);

        set_scene(&mut ctx, id, &[addr(0x0002)], SceneOp::Delete).unwrap();
        let remaining: Vec<_> = ctx.registry.scene(id).unwrap().addresses().collect();
        assert_eq!(remaining, vec![addr(0x0003)]);
    }

    #[test]
    fn recall_reports_each_device() {
        let (mut ctx, transport, _rx) =
            setup(vec![light(0x0002, SCENE_LIGHT), light(0x0003, SCENE_LIGHT)]);
        let id = SceneId::new(2).unwrap();
        set_scene(&mut ctx, id, &[addr(0x0002), addr(0x0003)], SceneOp::Store).unwrap();
        transport.clear();
        transport.fail_send_at(1);

        let report = recall_scene(&mut ctx, id).unwrap();
        assert_eq!(
            report.entries,
            vec![
                (addr(0x0002), EntryOutcome::Dispatched),
                (addr(0x0003), EntryOutcome::DispatchFailed),
            ]
        );
        assert!(!report.all_dispatched());
    }

    #[test]
    fn delete_scene_keeps_undispatched_entries() {
        let (mut ctx, transport, mut rx) =
            setup(vec![light(0x0002, SCENE_LIGHT), light(0x0003, SCENE_LIGHT)]);
        let id = SceneId::new(4).unwrap();
        set_scene(&mut ctx, id, &[addr(0x0002), addr(0x0003)], SceneOp::Store).unwrap();
        drain(&mut rx);
        transport.fail_send_at(0);

        let report = delete_scene(&mut ctx, id).unwrap();
        assert_eq!(report.dispatched().collect::<Vec<_>>(), vec![addr(0x0003)]);
        let left: Vec<_> = ctx.registry.scene(id).unwrap().addresses().collect();
        assert_eq!(left, vec![addr(0x0002)]);
        assert_eq!(drain(&mut rx), vec![Notification::SceneRemoveFailed { scene: id }]);
    }

    #[test]
    fn unknown_scene_is_precondition_failure() {
        let (mut ctx, transport, _rx) = setup(vec![]);
        let id = SceneId::new(9).unwrap();
        assert!(recall_scene(&mut ctx, id).unwrap_err().is_precondition());
        assert!(delete_scene(&mut ctx, id).unwrap_err().is_precondition());
        assert!(set_scene(&mut ctx, id, &[], SceneOp::Store).unwrap_err().is_precondition());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn kick_out_of_direct_node_requires_dispatch() {
        let (mut ctx, transport, mut rx) = setup(vec![light(0x0002, SCENE_LIGHT)]);
        transport.set_direct(Some(addr(0x0002)));
        transport.set_dispatch(false);

        let err = kick_out(&mut ctx, addr(0x0002)).unwrap_err();
        assert!(matches!(err, ControlError::DispatchFailed(_)));
        assert!(ctx.registry.find(addr(0x0002)).is_some());
        assert_eq!(
            drain(&mut rx),
            vec![Notification::NodeResetFailed { address: addr(0x0002) }]
        );
    }

    #[test]
    fn kick_out_drops_scene_states() {
        let (mut ctx, _transport, _rx) =
            setup(vec![light(0x0002, SCENE_LIGHT), light(0x0003, SCENE_LIGHT)]);
        let id = SceneId::new(1).unwrap();
        set_scene(&mut ctx, id, &[addr(0x0002), addr(0x0003)], SceneOp::Store).unwrap();

        kick_out(&mut ctx, addr(0x0003)).unwrap();
        let left: Vec<_> = ctx.registry.scene(id).unwrap().addresses().collect();
        assert_eq!(left, vec![addr(0x0002)]);
        assert!(ctx.registry.store().load_mesh().unwrap().nodes.len() == 1);
    }
}
