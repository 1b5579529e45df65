//! Boundary to the radio and mesh protocol stack.
//!
//! The orchestrator never encodes messages or talks to a radio itself. It
//! issues requests through [`Transport`] and learns their outcome from
//! protocol events delivered later.

use std::time::Duration;

use meshlink_core::{AppKeyIndex, DeviceUuid, Destination, GroupAddress, ModelId, SceneId, UnicastAddress};
use meshlink_store::{CompositionData, PublishConfig};

/// Request to provision one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    /// Device to provision.
    pub device_uuid: DeviceUuid,
    /// Transport handle from the advertising report.
    pub handle: String,
    /// Primary address to assign.
    pub address: UnicastAddress,
    /// Static OOB value, if one is stored for the device.
    pub static_oob: Option<Vec<u8>>,
    /// Fall back to no-OOB authentication when no static value is known.
    pub auto_use_no_oob: bool,
}

/// Request to bind the application key on a provisioned device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRequest {
    /// Primary address of the device.
    pub address: UnicastAddress,
    /// Device UUID.
    pub device_uuid: DeviceUuid,
    /// Transport handle.
    pub handle: String,
    /// Key to bind.
    pub app_key_index: AppKeyIndex,
    /// Trusted composition data; skips live composition discovery when set.
    pub trusted_composition: Option<CompositionData>,
}

impl BindingRequest {
    /// Whether binding uses trusted composition data.
    #[must_use]
    pub const fn is_default_bound(&self) -> bool {
        self.trusted_composition.is_some()
    }
}

/// Direction of a subscription change on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionOp {
    /// Add the group to the model's subscription list.
    Add,
    /// Delete the group from the model's subscription list.
    Delete,
}

/// An application or configuration message for the protocol stack to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshMessage {
    /// Generic OnOff Set.
    OnOffSet {
        /// Destination.
        destination: Destination,
        /// Target state.
        on: bool,
        /// Request acknowledgement.
        ack: bool,
        /// Number of replies to wait for.
        rsp_max: usize,
    },
    /// Light Lightness Set.
    LightnessSet {
        /// Element with the lightness server.
        element: UnicastAddress,
        /// Lightness (0-65535).
        lightness: u16,
    },
    /// Light CTL Temperature Set.
    CtlTemperatureSet {
        /// Element with the CTL temperature server.
        element: UnicastAddress,
        /// Temperature in kelvin.
        kelvin: u16,
    },
    /// Generic Delta Set on a level server.
    LevelDelta {
        /// Element with the generic level server.
        element: UnicastAddress,
        /// Signed change of the level.
        delta: i32,
    },
    /// Light HSL Set.
    HslSet {
        /// Element with the HSL server.
        element: UnicastAddress,
        /// Hue (0-65535).
        hue: u16,
        /// Saturation (0-65535).
        saturation: u16,
        /// Lightness (0-65535).
        lightness: u16,
    },
    /// Config Model Subscription Add/Delete.
    ModelSubscriptionSet {
        /// Node whose configuration server receives the message.
        node: UnicastAddress,
        /// Element hosting the model.
        element: UnicastAddress,
        /// Group to add or delete.
        group: GroupAddress,
        /// Model whose subscription list changes.
        model: ModelId,
        /// Add or delete.
        op: SubscriptionOp,
    },
    /// Config Model Publication Set.
    ModelPublicationSet {
        /// Node whose configuration server receives the message.
        node: UnicastAddress,
        /// Publication to install.
        config: PublishConfig,
    },
    /// Scene Store.
    SceneStore {
        /// Element with the scene server.
        element: UnicastAddress,
        /// Scene number.
        scene: SceneId,
        /// Key to use.
        app_key_index: AppKeyIndex,
    },
    /// Scene Delete.
    SceneDelete {
        /// Element with the scene server.
        element: UnicastAddress,
        /// Scene number.
        scene: SceneId,
        /// Key to use.
        app_key_index: AppKeyIndex,
    },
    /// Scene Recall.
    SceneRecall {
        /// Destination.
        destination: Destination,
        /// Scene number.
        scene: SceneId,
        /// Key to use.
        app_key_index: AppKeyIndex,
    },
    /// Config Node Reset.
    NodeReset {
        /// Node to reset.
        node: UnicastAddress,
    },
}

/// Operations the orchestrator consumes from the protocol stack.
///
/// Request methods return whether the request was accepted for dispatch;
/// their outcome arrives later as a protocol event.
pub trait Transport: Send + Sync {
    /// Start scanning for unprovisioned devices.
    fn start_scan(&self, timeout: Duration);

    /// Stop scanning.
    fn stop_scan(&self);

    /// Begin provisioning a device.
    fn start_provisioning(&self, request: ProvisioningRequest) -> bool;

    /// Begin binding the application key on a provisioned device.
    fn start_binding(&self, request: BindingRequest) -> bool;

    /// Hand a message to the stack. Returns whether it was dispatched.
    fn send(&self, message: MeshMessage) -> bool;

    /// Forget a node in the stack's own device list.
    fn reset_node(&self, address: UnicastAddress);

    /// Reconnect to the network through any reachable proxy node.
    fn auto_connect(&self);

    /// Address of the node the transport is directly connected to.
    fn direct_address(&self) -> Option<UnicastAddress>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::{RecordingTransport, TransportCall};

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use std::sync::Arc;
    use std::time::Duration;

    use meshlink_core::UnicastAddress;
    use parking_lot::Mutex;

    use super::{BindingRequest, MeshMessage, ProvisioningRequest, Transport};

    /// A boundary call observed by [`RecordingTransport`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TransportCall {
        /// `start_scan`.
        StartScan(Duration),
        /// `stop_scan`.
        StopScan,
        /// `start_provisioning`.
        StartProvisioning(ProvisioningRequest),
        /// `start_binding`.
        StartBinding(BindingRequest),
        /// `send`.
        Send(MeshMessage),
        /// `reset_node`.
        ResetNode(UnicastAddress),
        /// `auto_connect`.
        AutoConnect,
    }

    #[derive(Debug)]
    struct Inner {
        calls: Vec<TransportCall>,
        accept_requests: bool,
        dispatch: bool,
        fail_sends: Vec<usize>,
        direct: Option<UnicastAddress>,
    }

    /// A transport that records every call and returns programmable results.
    ///
    /// Clones share state, so a test can keep one handle while the
    /// orchestrator owns another.
    #[derive(Debug, Clone)]
    pub struct RecordingTransport {
        inner: Arc<Mutex<Inner>>,
    }

    impl Default for RecordingTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RecordingTransport {
        /// A transport that accepts and dispatches everything.
        #[must_use]
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(Inner {
                    calls: Vec::new(),
                    accept_requests: true,
                    dispatch: true,
                    fail_sends: Vec::new(),
                    direct: None,
                })),
            }
        }

        /// Result returned by `send`.
        pub fn set_dispatch(&self, dispatch: bool) {
            self.inner.lock().dispatch = dispatch;
        }

        /// Make the `n`th `send` (0-based, counted from now on) fail.
        pub fn fail_send_at(&self, n: usize) {
            let mut inner = self.inner.lock();
            let sent = inner.sends();
            inner.fail_sends.push(sent + n);
        }

        /// Result returned by `start_provisioning` and `start_binding`.
        pub fn set_accept_requests(&self, accept: bool) {
            self.inner.lock().accept_requests = accept;
        }

        /// Address reported by `direct_address`.
        pub fn set_direct(&self, address: Option<UnicastAddress>) {
            self.inner.lock().direct = address;
        }

        /// Every call so far.
        #[must_use]
        pub fn calls(&self) -> Vec<TransportCall> {
            self.inner.lock().calls.clone()
        }

        /// Every message passed to `send`, dispatched or not.
        #[must_use]
        pub fn sent(&self) -> Vec<MeshMessage> {
            self.inner
                .lock()
                .calls
                .iter()
                .filter_map(|c| match c {
                    TransportCall::Send(m) => Some(m.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Forget recorded calls.
        pub fn clear(&self) {
            let mut inner = self.inner.lock();
            inner.calls.clear();
            inner.fail_sends.clear();
        }
    }

    impl Inner {
        fn sends(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, TransportCall::Send(_)))
                .count()
        }
    }

    impl Transport for RecordingTransport {
        fn start_scan(&self, timeout: Duration) {
            self.inner.lock().calls.push(TransportCall::StartScan(timeout));
        }

        fn stop_scan(&self) {
            self.inner.lock().calls.push(TransportCall::StopScan);
        }

        fn start_provisioning(&self, request: ProvisioningRequest) -> bool {
            let mut inner = self.inner.lock();
            inner.calls.push(TransportCall::StartProvisioning(request));
            inner.accept_requests
        }

        fn start_binding(&self, request: BindingRequest) -> bool {
            let mut inner = self.inner.lock();
            inner.calls.push(TransportCall::StartBinding(request));
            inner.accept_requests
        }

        fn send(&self, message: MeshMessage) -> bool {
            let mut inner = self.inner.lock();
            let index = inner.sends();
            inner.calls.push(TransportCall::Send(message));
            inner.dispatch && !inner.fail_sends.contains(&index)
        }

        fn reset_node(&self, address: UnicastAddress) {
            self.inner.lock().calls.push(TransportCall::ResetNode(address));
        }

        fn auto_connect(&self) {
            self.inner.lock().calls.push(TransportCall::AutoConnect);
        }

        fn direct_address(&self) -> Option<UnicastAddress> {
            self.inner.lock().direct
        }
    }
}
