//! Shared fixtures for orchestration integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use meshlink_control::{
    AdvertisingReport, MeshConfig, MeshContext, MeshController, MeshRegistry, Notification,
    Notifier, ProtocolEvent, RecordingTransport, StaticTrustCache, TrustCache,
};
use meshlink_core::{DeviceUuid, ModelId, UnicastAddress};
use meshlink_store::{CompositionData, DeviceKey, Element, MemoryStore, MeshInfo, Store};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn addr(raw: u16) -> UnicastAddress {
    UnicastAddress::new(raw).unwrap()
}

/// Advertising payload carrying `uuid` in the provisioning service data.
pub fn scan_record(uuid: [u8; 16]) -> Vec<u8> {
    let mut record = vec![0x02, 0x01, 0x06, 21, 0x16, 0x27, 0x18];
    record.extend_from_slice(&uuid);
    record.extend_from_slice(&[0x00, 0x00]);
    record
}

pub fn report(byte: u8) -> AdvertisingReport {
    AdvertisingReport {
        handle: format!("C0:FF:EE:00:00:{byte:02X}"),
        name: Some("light".into()),
        rssi: -55,
        scan_record: scan_record([byte; 16]),
    }
}

/// Two elements: on/off + scene on the primary, time server on the second.
pub fn timed_light() -> CompositionData {
    CompositionData {
        cid: 0x0211,
        pid: 0x0001,
        elements: vec![
            Element::with_sig_models([ModelId::GENERIC_ON_OFF_SERVER, ModelId::SCENE_SERVER]),
            Element::with_sig_models([ModelId::TIME_SERVER]),
        ],
        ..CompositionData::default()
    }
}

/// A single element with on/off and scene servers, no time server.
pub fn plain_light() -> CompositionData {
    CompositionData::from_elements(vec![Element::with_sig_models([
        ModelId::GENERIC_ON_OFF_SERVER,
        ModelId::SCENE_SERVER,
    ])])
}

pub struct Harness {
    pub controller: MeshController<MemoryStore, RecordingTransport>,
    pub transport: RecordingTransport,
    pub store: Arc<MemoryStore>,
    pub notifications: UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new(config: MeshConfig) -> Self {
        Self::build(MeshInfo::default(), config, None)
    }

    pub fn with_mesh(mesh: MeshInfo, config: MeshConfig) -> Self {
        Self::build(mesh, config, None)
    }

    pub fn with_trust(config: MeshConfig, trust: Arc<StaticTrustCache>) -> Self {
        Self::build(MeshInfo::default(), config, Some(trust))
    }

    fn build(mesh: MeshInfo, config: MeshConfig, trust: Option<Arc<StaticTrustCache>>) -> Self {
        let store = Arc::new(MemoryStore::with_mesh(mesh));
        let registry = MeshRegistry::load(store.clone()).unwrap();
        let transport = RecordingTransport::new();
        let (notifier, notifications) = Notifier::channel();
        let mut ctx = MeshContext::new(registry, transport.clone(), notifier, config);
        if let Some(trust) = trust {
            ctx = ctx.with_trust_cache(trust as Arc<dyn TrustCache>);
        }
        Self {
            controller: MeshController::new(ctx),
            transport,
            store,
            notifications,
        }
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        std::iter::from_fn(|| self.notifications.try_recv().ok()).collect()
    }

    pub fn discover(&mut self, byte: u8) -> DeviceUuid {
        self.controller
            .handle_event(ProtocolEvent::DeviceFound(report(byte)));
        DeviceUuid::from_bytes([byte; 16])
    }

    pub fn provision(&mut self, uuid: DeviceUuid, element_count: u8) {
        self.controller.handle_event(ProtocolEvent::ProvisionSuccess {
            device_uuid: uuid,
            element_count,
            device_key: DeviceKey([0x5A; 16]),
        });
    }

    pub fn bind(&mut self, address: UnicastAddress, composition: Option<CompositionData>) {
        self.controller.handle_event(ProtocolEvent::BindSuccess {
            address,
            composition,
        });
    }

    /// Discover, provision and bind one device.
    pub fn onboard(&mut self, byte: u8, composition: CompositionData) -> UnicastAddress {
        let uuid = self.discover(byte);
        self.controller.start_onboarding(&uuid).unwrap();
        let address = self.controller.session(&uuid).unwrap().node.as_ref().unwrap().unicast_address;
        let elements = u8::try_from(composition.elements.len()).unwrap();
        self.provision(uuid, elements);
        self.bind(address, Some(composition));
        address
    }

    pub fn persisted(&self) -> MeshInfo {
        self.store.load_mesh().unwrap()
    }
}
