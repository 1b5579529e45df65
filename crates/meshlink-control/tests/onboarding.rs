//! Onboarding lifecycle through the controller.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{addr, plain_light, timed_light, Harness};
use meshlink_control::{
    ControlError, MeshConfig, MeshMessage, Notification, Phase, ProtocolEvent, StaticTrustCache,
    StatusMessage, TransportCall,
};
use meshlink_core::{DeviceUuid, ModelId, UnicastAddress};
use meshlink_store::{MeshInfo, NodeRecord, OobImportMode, OobPair, Store};

fn phase(h: &Harness, uuid: &DeviceUuid) -> Phase {
    h.controller.session(uuid).unwrap().phase()
}

fn publication_status(source: UnicastAddress, status: u8) -> ProtocolEvent {
    ProtocolEvent::StatusNotification(StatusMessage::ModelPublication { source, status })
}

#[test]
fn full_onboarding_configures_time_publication() {
    let mut h = Harness::new(MeshConfig::default());
    let uuid = h.discover(0x01);
    assert!(matches!(h.drain().as_slice(), [Notification::DeviceFound { .. }]));

    assert_eq!(h.controller.start_onboarding(&uuid).unwrap(), Phase::Provisioning);
    let calls = h.transport.calls();
    let TransportCall::StartProvisioning(request) = &calls[0] else {
        panic!("expected provisioning request, got {calls:?}");
    };
    assert_eq!(request.address, addr(0x0002));
    assert_eq!(request.static_oob, None);

    h.controller
        .handle_event(ProtocolEvent::ProvisionBegin { device_uuid: uuid });
    h.provision(uuid, 2);
    assert_eq!(phase(&h, &uuid), Phase::Binding);
    assert_eq!(h.persisted().nodes.len(), 1);
    assert_eq!(h.controller.registry().cursor(), 0x0004);

    h.bind(addr(0x0002), Some(timed_light()));
    assert_eq!(phase(&h, &uuid), Phase::PublishConfiguring);
    assert!(h.controller.publish_deadline().is_some());
    let Some(MeshMessage::ModelPublicationSet { node, config }) = h.transport.sent().pop() else {
        panic!("expected publication request");
    };
    assert_eq!(node, addr(0x0002));
    assert_eq!(config.element_address, addr(0x0003));
    assert_eq!(config.publish_address, 0xFFFF);
    assert_eq!(config.model, ModelId::TIME_SERVER);

    h.controller.handle_event(publication_status(addr(0x0002), 0));
    assert_eq!(phase(&h, &uuid), Phase::PublishConfigured);
    assert!(h.controller.publish_deadline().is_none());

    let stored = h.persisted().nodes.remove(0);
    assert!(stored.bound);
    assert_eq!(stored.publication.as_ref().unwrap().element_address, addr(0x0003));
    assert_eq!(stored.product_description(), "cid-1102 pid-0100");

    assert_eq!(
        h.drain(),
        vec![
            Notification::ProvisionStarted { device_uuid: uuid, address: addr(0x0002) },
            Notification::ProvisionSucceeded { device_uuid: uuid, address: addr(0x0002) },
            Notification::BindStarted { address: addr(0x0002) },
            Notification::BindSucceeded { address: addr(0x0002) },
            Notification::PublishConfigured { address: addr(0x0002) },
        ]
    );
}

#[test]
fn device_without_time_server_ends_bound() {
    let mut h = Harness::new(MeshConfig::default());
    h.onboard(0x01, plain_light());
    let uuid = DeviceUuid::from_bytes([0x01; 16]);
    assert_eq!(phase(&h, &uuid), Phase::BindSucceeded);
    assert!(h.controller.publish_deadline().is_none());
    assert!(h
        .transport
        .sent()
        .iter()
        .all(|m| !matches!(m, MeshMessage::ModelPublicationSet { .. })));
}

#[test]
fn undispatched_publication_fails_the_publish_step() {
    let mut h = Harness::new(MeshConfig::default());
    let uuid = h.discover(0x01);
    h.controller.start_onboarding(&uuid).unwrap();
    h.provision(uuid, 2);
    h.transport.set_dispatch(false);
    h.drain();

    h.bind(addr(0x0002), Some(timed_light()));

    assert_eq!(phase(&h, &uuid), Phase::PublishConfigFailed);
    assert!(h.controller.publish_deadline().is_none());
    assert_eq!(
        h.drain(),
        vec![
            Notification::BindSucceeded { address: addr(0x0002) },
            Notification::PublishConfigFailed {
                address: addr(0x0002),
                reason: "publication request not dispatched".into(),
            },
        ]
    );
    let stored = h.persisted().nodes.remove(0);
    assert!(stored.bound);
    assert!(stored.publication.is_none());
}

#[test]
fn status_without_pending_attempt_is_ignored() {
    let mut h = Harness::new(MeshConfig::default());
    let address = h.onboard(0x01, plain_light());
    let uuid = DeviceUuid::from_bytes([0x01; 16]);
    let before = h.persisted();
    h.drain();

    h.controller.handle_event(publication_status(address, 0));
    h.controller.handle_event(publication_status(address, 3));

    assert_eq!(phase(&h, &uuid), Phase::BindSucceeded);
    assert!(h.drain().is_empty());
    assert_eq!(h.persisted(), before);
}

#[test]
fn status_from_other_node_does_not_settle_attempt() {
    let mut h = Harness::new(MeshConfig::default());
    let address = h.onboard(0x01, timed_light());
    let uuid = DeviceUuid::from_bytes([0x01; 16]);

    h.controller.handle_event(publication_status(addr(0x0040), 0));
    assert_eq!(phase(&h, &uuid), Phase::PublishConfiguring);

    h.controller.handle_event(publication_status(address, 0));
    assert_eq!(phase(&h, &uuid), Phase::PublishConfigured);
}

fn normalized(mut nodes: Vec<NodeRecord>) -> Vec<NodeRecord> {
    let at = Utc::now();
    for node in &mut nodes {
        node.provisioned_at = at;
    }
    nodes
}

#[test]
fn timeout_and_failure_reply_are_equivalent() {
    let mut timed_out = Harness::new(MeshConfig::default());
    let mut rejected = Harness::new(MeshConfig::default());
    let uuid = DeviceUuid::from_bytes([0x01; 16]);

    let address = timed_out.onboard(0x01, timed_light());
    rejected.onboard(0x01, timed_light());

    let (attempt, _) = timed_out.controller.publish_deadline().unwrap();
    timed_out
        .controller
        .handle_event(ProtocolEvent::PublishTimeout { attempt });
    rejected.controller.handle_event(publication_status(address, 0x02));

    assert_eq!(phase(&timed_out, &uuid), Phase::PublishConfigFailed);
    assert_eq!(phase(&rejected, &uuid), Phase::PublishConfigFailed);

    let a = timed_out.persisted();
    let b = rejected.persisted();
    assert_eq!(normalized(a.nodes.clone()), normalized(b.nodes.clone()));
    assert!(a.nodes[0].publication.is_none());
    assert!(a.nodes[0].bound);
    assert_eq!(a.meta, b.meta);
}

#[test]
fn stale_timeout_is_ignored() {
    let mut h = Harness::new(MeshConfig::default());
    h.onboard(0x01, timed_light());
    let uuid = DeviceUuid::from_bytes([0x01; 16]);
    let (attempt, _) = h.controller.publish_deadline().unwrap();

    h.controller
        .handle_event(ProtocolEvent::PublishTimeout { attempt: attempt + 1 });
    assert_eq!(phase(&h, &uuid), Phase::PublishConfiguring);

    h.controller
        .handle_event(publication_status(addr(0x0002), 0));
    h.controller
        .handle_event(ProtocolEvent::PublishTimeout { attempt });
    assert_eq!(phase(&h, &uuid), Phase::PublishConfigured);
}

#[test]
fn exhausted_address_space_never_reaches_transport() {
    let mut last = NodeRecord::new(addr(0x7FFE), DeviceUuid::from_bytes([0xEE; 16]));
    last.element_count = 2;
    let mesh = MeshInfo {
        nodes: vec![last],
        ..MeshInfo::default()
    };
    let mut h = Harness::with_mesh(mesh, MeshConfig::default());
    let uuid = h.discover(0x01);
    h.drain();

    let err = h.controller.start_onboarding(&uuid).unwrap_err();
    assert!(matches!(err, ControlError::InvalidAllocation(0x8000)));
    assert!(err.is_precondition());
    assert!(h.transport.calls().is_empty());
    assert_eq!(phase(&h, &uuid), Phase::ProvisionFailed);
    assert!(matches!(h.drain().as_slice(), [Notification::ProvisionFailed { .. }]));
}

#[test]
fn unknown_candidate_is_rejected() {
    let mut h = Harness::new(MeshConfig::default());
    let err = h
        .controller
        .start_onboarding(&DeviceUuid::from_bytes([9; 16]))
        .unwrap_err();
    assert!(matches!(err, ControlError::CandidateNotFound(_)));
}

#[test]
fn stored_oob_is_used_for_provisioning() {
    let mut h = Harness::new(MeshConfig {
        auto_use_no_oob: true,
        ..MeshConfig::default()
    });
    let uuid = h.discover(0x01);
    h.store
        .put_oob(&OobPair {
            device_uuid: uuid,
            oob: vec![0x42; 16],
            import_mode: OobImportMode::Manual,
            imported_at: Utc::now(),
        })
        .unwrap();

    h.controller.start_onboarding(&uuid).unwrap();
    let calls = h.transport.calls();
    let TransportCall::StartProvisioning(request) = &calls[0] else {
        panic!("expected provisioning request");
    };
    assert_eq!(request.static_oob.as_deref(), Some(&[0x42; 16][..]));
    assert!(request.auto_use_no_oob);
}

#[test]
fn queued_device_starts_after_failure_without_retry() {
    let mut h = Harness::new(MeshConfig::default());
    let first = h.discover(0x01);
    let second = h.discover(0x02);

    assert_eq!(h.controller.start_onboarding(&first).unwrap(), Phase::Provisioning);
    assert_eq!(h.controller.start_onboarding(&second).unwrap(), Phase::Waiting);

    h.controller.handle_event(ProtocolEvent::ProvisionFail {
        device_uuid: first,
        reason: "link lost".into(),
    });

    assert_eq!(phase(&h, &first), Phase::ProvisionFailed);
    assert_eq!(phase(&h, &second), Phase::Provisioning);
    let requests: Vec<_> = h
        .transport
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            TransportCall::StartProvisioning(r) => Some((r.device_uuid, r.address)),
            _ => None,
        })
        .collect();
    assert_eq!(requests, vec![(first, addr(0x0002)), (second, addr(0x0002))]);
}

#[test]
fn manual_advance_when_auto_advance_is_off() {
    let mut h = Harness::new(MeshConfig {
        auto_advance: false,
        ..MeshConfig::default()
    });
    let first = h.discover(0x01);
    let second = h.discover(0x02);
    h.controller.start_onboarding(&first).unwrap();
    h.controller.start_onboarding(&second).unwrap();

    assert!(matches!(
        h.controller.start_next().unwrap_err(),
        ControlError::OnboardingBusy(uuid) if uuid == first
    ));

    h.provision(first, 1);
    h.bind(addr(0x0002), Some(plain_light()));
    assert_eq!(phase(&h, &first), Phase::BindSucceeded);
    assert_eq!(phase(&h, &second), Phase::Waiting);

    assert_eq!(h.controller.start_next().unwrap(), Some(second));
    let node = h.controller.session(&second).unwrap().node.clone().unwrap();
    assert_eq!(node.unicast_address, addr(0x0003));
    assert_eq!(h.controller.start_next().unwrap_err().kind(), meshlink_control::ErrorKind::Precondition);
}

#[test]
fn new_candidate_queues_behind_older_waiting_sessions() {
    let mut h = Harness::new(MeshConfig {
        auto_advance: false,
        ..MeshConfig::default()
    });
    let first = h.discover(0x01);
    let second = h.discover(0x02);
    h.controller.start_onboarding(&first).unwrap();
    h.controller.start_onboarding(&second).unwrap();
    h.provision(first, 1);
    h.bind(addr(0x0002), Some(plain_light()));
    assert_eq!(phase(&h, &second), Phase::Waiting);

    let third = h.discover(0x03);
    assert_eq!(h.controller.start_onboarding(&third).unwrap(), Phase::Waiting);
    assert_eq!(phase(&h, &second), Phase::Provisioning);
    assert_eq!(phase(&h, &third), Phase::Waiting);
}

#[test]
fn bind_failure_keeps_unbound_node_and_advances_queue() {
    let mut h = Harness::new(MeshConfig::default());
    let first = h.discover(0x01);
    let second = h.discover(0x02);
    h.controller.start_onboarding(&first).unwrap();
    h.controller.start_onboarding(&second).unwrap();
    h.provision(first, 1);
    h.drain();

    h.controller.handle_event(ProtocolEvent::BindFail {
        address: addr(0x0002),
        reason: "key distribution timed out".into(),
    });

    assert_eq!(phase(&h, &first), Phase::BindFailed);
    assert!(h.drain().contains(&Notification::BindFailed {
        address: addr(0x0002),
        reason: "key distribution timed out".into(),
    }));

    let persisted = h.persisted();
    assert_eq!(persisted.nodes.len(), 1);
    assert_eq!(persisted.nodes[0].unicast_address, addr(0x0002));
    assert!(!persisted.nodes[0].bound);

    assert_eq!(phase(&h, &second), Phase::Provisioning);
    let calls = h.transport.calls();
    let binds = calls
        .iter()
        .filter(|c| matches!(c, TransportCall::StartBinding(_)))
        .count();
    assert_eq!(binds, 1);
    let Some(TransportCall::StartProvisioning(request)) = calls.last() else {
        panic!("expected the queued device to be provisioned");
    };
    assert_eq!((request.device_uuid, request.address), (second, addr(0x0003)));
}

#[test]
fn refused_binding_request_fails_the_session() {
    let mut h = Harness::new(MeshConfig::default());
    let uuid = h.discover(0x01);
    h.controller.start_onboarding(&uuid).unwrap();
    h.transport.set_accept_requests(false);
    h.drain();

    h.provision(uuid, 1);

    assert_eq!(phase(&h, &uuid), Phase::BindFailed);
    let notifications = h.drain();
    assert!(notifications.contains(&Notification::BindFailed {
        address: addr(0x0002),
        reason: "binding request refused".into(),
    }));
    assert!(!notifications
        .iter()
        .any(|n| matches!(n, Notification::BindStarted { .. })));
    let persisted = h.persisted();
    assert_eq!(persisted.nodes.len(), 1);
    assert!(!persisted.nodes[0].bound);
}

#[test]
fn fast_bind_uses_trusted_composition() {
    let trust = Arc::new(StaticTrustCache::new());
    let uuid = DeviceUuid::from_bytes([0x01; 16]);
    trust.trust_device(uuid, plain_light());
    let mut h = Harness::with_trust(
        MeshConfig {
            fast_bind_enabled: true,
            ..MeshConfig::default()
        },
        trust,
    );

    h.discover(0x01);
    h.controller.start_onboarding(&uuid).unwrap();
    h.provision(uuid, 1);

    let binding = h
        .transport
        .calls()
        .into_iter()
        .find_map(|c| match c {
            TransportCall::StartBinding(r) => Some(r),
            _ => None,
        })
        .unwrap();
    assert!(binding.is_default_bound());

    h.bind(addr(0x0002), None);
    let node = h.persisted().nodes.remove(0);
    assert!(node.default_bound);
    assert_eq!(node.composition, Some(plain_light()));
}

#[test]
fn trust_cache_is_ignored_when_fast_bind_is_off() {
    let trust = Arc::new(StaticTrustCache::new());
    let uuid = DeviceUuid::from_bytes([0x01; 16]);
    trust.trust_device(uuid, plain_light());
    let mut h = Harness::with_trust(MeshConfig::default(), trust);

    h.discover(0x01);
    h.controller.start_onboarding(&uuid).unwrap();
    h.provision(uuid, 1);
    h.bind(addr(0x0002), Some(timed_light()));

    let node = h.persisted().nodes.remove(0);
    assert!(!node.default_bound);
    assert_eq!(node.composition, Some(timed_light()));
}

#[test]
fn provisioned_node_that_cannot_persist_fails() {
    let mut h = Harness::new(MeshConfig::default());
    let uuid = h.discover(0x01);
    h.controller.start_onboarding(&uuid).unwrap();
    h.store.set_fail_writes(true);

    h.provision(uuid, 1);
    assert_eq!(phase(&h, &uuid), Phase::ProvisionFailed);
    assert!(h.controller.nodes().is_empty());
    assert_eq!(h.controller.registry().cursor(), 0x0002);
    assert!(!h
        .transport
        .calls()
        .iter()
        .any(|c| matches!(c, TransportCall::StartBinding(_))));
}

#[test]
fn session_log_records_each_stage() {
    let mut h = Harness::new(MeshConfig::default());
    h.onboard(0x01, timed_light());
    let uuid = DeviceUuid::from_bytes([0x01; 16]);
    h.controller.handle_event(publication_status(addr(0x0002), 0));

    let categories: Vec<_> = h
        .controller
        .session(&uuid)
        .unwrap()
        .log()
        .iter()
        .map(|e| e.category)
        .collect();
    use meshlink_control::LogCategory::{Bind, Provision, PublishSet, Scan};
    assert_eq!(categories.first(), Some(&Scan));
    for category in [Provision, Bind, PublishSet] {
        assert!(categories.contains(&category));
    }
}
