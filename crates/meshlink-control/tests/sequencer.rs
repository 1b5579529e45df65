//! Group, scene and removal commands against onboarded devices.

mod common;

use common::{addr, plain_light, Harness};
use meshlink_control::{
    ControlError, GroupOp, MeshConfig, MeshMessage, Notification, ProtocolEvent, SceneOp,
    StatusMessage, SubscriptionOp, TransportCall,
};
use meshlink_core::{GroupAddress, ModelId, SceneId, UnicastAddress};
use meshlink_store::{CompositionData, Element, OnOffState};

/// A device with only a lightness server: no on/off, no scenes.
fn dimmer_only() -> CompositionData {
    CompositionData::from_elements(vec![Element::with_sig_models([
        ModelId::LIGHT_LIGHTNESS_SERVER,
    ])])
}

fn harness_with(lights: &[CompositionData]) -> (Harness, Vec<UnicastAddress>) {
    let mut h = Harness::new(MeshConfig::default());
    let addresses = lights
        .iter()
        .enumerate()
        .map(|(i, cps)| h.onboard(u8::try_from(i + 1).unwrap(), cps.clone()))
        .collect();
    h.drain();
    h.transport.clear();
    (h, addresses)
}

#[test]
fn scene_batch_persists_one_scene_in_submission_order() {
    let (mut h, addresses) = harness_with(&[plain_light(), plain_light(), plain_light()]);
    h.controller.handle_event(ProtocolEvent::StatusNotification(StatusMessage::OnOff {
        source: addresses[1],
        on: true,
    }));
    h.drain();
    let id = SceneId::new(5).unwrap();
    let targets = vec![addresses[2], addresses[0], addresses[1]];

    h.controller.set_scene(id, &targets, SceneOp::Store).unwrap();

    let scenes = h.persisted().scenes;
    assert_eq!(scenes.len(), 1);
    let stored: Vec<_> = scenes[0].addresses().collect();
    assert_eq!(stored, targets);
    assert_eq!(scenes[0].states[2].on_off, OnOffState::On);
    assert_eq!(scenes[0].states[0].on_off, OnOffState::Offline);

    assert_eq!(
        h.drain(),
        vec![
            Notification::SceneStepSucceeded { scene: id, index: 0 },
            Notification::SceneStepSucceeded { scene: id, index: 1 },
            Notification::SceneSetSucceeded { scene: id },
        ]
    );
    assert_eq!(h.transport.sent().len(), 3);
}

#[test]
fn scene_batch_stops_at_unresolvable_device() {
    let (mut h, addresses) =
        harness_with(&[plain_light(), plain_light(), dimmer_only(), plain_light()]);
    let id = SceneId::new(8).unwrap();

    let err = h
        .controller
        .set_scene(id, &addresses, SceneOp::Store)
        .unwrap_err();
    assert!(matches!(err, ControlError::NotResolvable { address, .. } if address == addresses[2]));

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent
        .iter()
        .all(|m| matches!(m, MeshMessage::SceneStore { scene, .. } if *scene == id)));

    let scene = h.persisted().scenes.remove(0);
    let stored: Vec<_> = scene.addresses().collect();
    assert_eq!(stored, addresses[..2].to_vec());

    assert_eq!(
        h.drain(),
        vec![
            Notification::SceneStepSucceeded { scene: id, index: 0 },
            Notification::SceneStepSucceeded { scene: id, index: 1 },
            Notification::SceneSetFailed { scene: id, index: 2 },
        ]
    );
}

#[test]
fn scene_batch_stops_at_dispatch_failure() {
    let (mut h, addresses) = harness_with(&[plain_light(), plain_light()]);
    let id = SceneId::new(3).unwrap();
    h.transport.fail_send_at(1);

    let err = h
        .controller
        .set_scene(id, &addresses, SceneOp::Store)
        .unwrap_err();
    assert!(matches!(err, ControlError::DispatchFailed(_)));
    assert_eq!(h.persisted().scenes[0].states.len(), 1);
}

#[test]
fn storing_on_more_devices_extends_the_scene() {
    let (mut h, addresses) = harness_with(&[plain_light(), plain_light(), plain_light()]);
    let id = SceneId::new(1).unwrap();

    h.controller
        .set_scene(id, &addresses[..2], SceneOp::Store)
        .unwrap();
    h.controller.handle_event(ProtocolEvent::StatusNotification(StatusMessage::OnOff {
        source: addresses[1],
        on: true,
    }));
    h.controller
        .set_scene(id, &addresses[1..], SceneOp::Store)
        .unwrap();

    let scenes = h.persisted().scenes;
    assert_eq!(scenes.len(), 1);
    let stored: Vec<_> = scenes[0].addresses().collect();
    assert_eq!(stored, addresses);
    assert_eq!(scenes[0].states[1].on_off, OnOffState::On);

    h.transport.clear();
    let report = h.controller.delete_scene(id).unwrap();
    assert!(report.all_dispatched());
    let deleted: Vec<_> = h
        .transport
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            MeshMessage::SceneDelete { element, .. } => Some(element),
            _ => None,
        })
        .collect();
    assert_eq!(deleted, addresses);
    assert!(h.persisted().scenes.is_empty());
}

#[test]
fn group_add_to_device_without_on_off_fails() {
    let (mut h, addresses) = harness_with(&[dimmer_only()]);
    let group = GroupAddress::new(0xC000).unwrap();

    let err = h
        .controller
        .change_group(group, addresses[0], GroupOp::Add, None)
        .unwrap_err();
    assert!(err.is_precondition());
    assert!(h.transport.calls().is_empty());
    assert!(h.persisted().nodes[0].subscriptions.is_empty());
    assert_eq!(
        h.drain(),
        vec![Notification::GroupChangeFailed { group, address: addresses[0] }]
    );
}

#[test]
fn group_change_with_explicit_model() {
    let (mut h, addresses) = harness_with(&[dimmer_only()]);
    let group = GroupAddress::new(0xC002).unwrap();

    h.controller
        .change_group(group, addresses[0], GroupOp::Add, Some(ModelId::LIGHT_LIGHTNESS_SERVER))
        .unwrap();
    h.controller
        .change_group(group, addresses[0], GroupOp::Remove, Some(ModelId::LIGHT_LIGHTNESS_SERVER))
        .unwrap();

    let ops: Vec<_> = h
        .transport
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            MeshMessage::ModelSubscriptionSet { op, model, .. } => Some((op, model)),
            _ => None,
        })
        .collect();
    assert_eq!(
        ops,
        vec![
            (SubscriptionOp::Add, ModelId::LIGHT_LIGHTNESS_SERVER),
            (SubscriptionOp::Delete, ModelId::LIGHT_LIGHTNESS_SERVER),
        ]
    );
    assert!(h.persisted().nodes[0].subscriptions.is_empty());
}

#[test]
fn kick_out_of_indirect_node_succeeds_without_dispatch() {
    let (mut h, addresses) = harness_with(&[plain_light(), plain_light()]);
    h.transport.set_direct(Some(addresses[0]));
    h.transport.set_dispatch(false);

    h.controller.kick_out(addresses[1]).unwrap();

    assert_eq!(
        h.drain(),
        vec![Notification::NodeResetSucceeded { address: addresses[1] }]
    );
    let nodes = h.persisted().nodes;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].unicast_address, addresses[0]);
    assert!(h
        .transport
        .calls()
        .contains(&TransportCall::ResetNode(addresses[1])));
}

#[test]
fn kick_out_of_unknown_node_is_rejected() {
    let (mut h, _) = harness_with(&[plain_light()]);
    let err = h.controller.kick_out(addr(0x0100)).unwrap_err();
    assert!(matches!(err, ControlError::DeviceNotFound(_)));
    assert!(h.transport.calls().is_empty());
}

#[test]
fn removed_address_is_not_reused() {
    let (mut h, addresses) = harness_with(&[plain_light()]);
    h.controller.kick_out(addresses[0]).unwrap();

    let next = h.onboard(0x09, plain_light());
    assert_ne!(next, addresses[0]);
    assert_eq!(next, addr(0x0003));
}

#[test]
fn status_reports_update_cached_state() {
    let (mut h, addresses) = harness_with(&[plain_light()]);
    assert!(h.controller.online_nodes().is_empty());

    h.controller.handle_event(ProtocolEvent::StatusNotification(StatusMessage::OnOff {
        source: addresses[0],
        on: true,
    }));
    h.controller.handle_event(ProtocolEvent::StatusNotification(StatusMessage::Lightness {
        source: addresses[0],
        lightness: 65_535,
    }));

    let node = h.persisted().nodes.remove(0);
    assert_eq!(node.status.on_off, OnOffState::On);
    assert_eq!(node.status.lightness, 100);
    assert_eq!(h.controller.online_nodes().len(), 1);
    assert_eq!(h.drain().len(), 2);
}
