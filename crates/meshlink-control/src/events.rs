//! Inbound protocol events and outbound notifications.

use meshlink_core::{DeviceUuid, GroupAddress, SceneId, UnicastAddress};
use meshlink_store::{CompositionData, DeviceKey, NodeStatus};
use tokio::sync::mpsc;

use crate::discovery::AdvertisingReport;
use crate::types::GroupOp;

/// A status message heard from a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    /// Config Model Publication Status.
    ModelPublication {
        /// Node that replied.
        source: UnicastAddress,
        /// Status code; zero is success.
        status: u8,
    },
    /// Generic OnOff Status.
    OnOff {
        /// Element that reported.
        source: UnicastAddress,
        /// Present state.
        on: bool,
    },
    /// Light Lightness Status.
    Lightness {
        /// Element that reported.
        source: UnicastAddress,
        /// Present lightness (0-65535).
        lightness: u16,
    },
    /// Light CTL Temperature Status.
    CtlTemperature {
        /// Element that reported.
        source: UnicastAddress,
        /// Present temperature in kelvin.
        kelvin: u16,
    },
}

/// Events emitted by the protocol stack, in protocol order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// An advertising report from an unprovisioned device.
    DeviceFound(AdvertisingReport),
    /// The scan window elapsed.
    ScanTimeout,
    /// The stack started the provisioning exchange.
    ProvisionBegin {
        /// Device being provisioned.
        device_uuid: DeviceUuid,
    },
    /// Provisioning completed.
    ProvisionSuccess {
        /// Provisioned device.
        device_uuid: DeviceUuid,
        /// Number of elements reported by the device.
        element_count: u8,
        /// Device key installed during provisioning.
        device_key: DeviceKey,
    },
    /// Provisioning failed.
    ProvisionFail {
        /// Device that failed.
        device_uuid: DeviceUuid,
        /// Reason from the stack.
        reason: String,
    },
    /// Key binding completed.
    BindSuccess {
        /// Primary address of the bound device.
        address: UnicastAddress,
        /// Composition data retrieved while binding. `None` when binding used
        /// trusted composition data.
        composition: Option<CompositionData>,
    },
    /// Key binding failed.
    BindFail {
        /// Primary address of the device.
        address: UnicastAddress,
        /// Reason from the stack.
        reason: String,
    },
    /// A status message.
    StatusNotification(StatusMessage),
    /// The publication status wait for `attempt` elapsed.
    PublishTimeout {
        /// Attempt the timer was armed for.
        attempt: u64,
    },
}

/// Outward notifications, in the order the orchestrator produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A new candidate was discovered.
    DeviceFound {
        /// Transport handle of the advertiser.
        handle: String,
        /// Device UUID.
        device_uuid: DeviceUuid,
        /// Signal strength.
        rssi: i8,
        /// Raw advertising payload.
        scan_record: Vec<u8>,
    },
    /// The scan window elapsed.
    ScanTimeout,
    /// Provisioning started.
    ProvisionStarted {
        /// Device UUID.
        device_uuid: DeviceUuid,
        /// Address being assigned.
        address: UnicastAddress,
    },
    /// Provisioning succeeded and the node was persisted.
    ProvisionSucceeded {
        /// Device UUID.
        device_uuid: DeviceUuid,
        /// Assigned primary address.
        address: UnicastAddress,
    },
    /// Provisioning failed.
    ProvisionFailed {
        /// Device UUID.
        device_uuid: DeviceUuid,
        /// Reason.
        reason: String,
    },
    /// Binding started.
    BindStarted {
        /// Node address.
        address: UnicastAddress,
    },
    /// Binding succeeded.
    BindSucceeded {
        /// Node address.
        address: UnicastAddress,
    },
    /// Binding failed.
    BindFailed {
        /// Node address.
        address: UnicastAddress,
        /// Reason.
        reason: String,
    },
    /// Publication confirmed.
    PublishConfigured {
        /// Node address.
        address: UnicastAddress,
    },
    /// Publication rejected or timed out.
    PublishConfigFailed {
        /// Node address.
        address: UnicastAddress,
        /// Reason.
        reason: String,
    },
    /// A subscription change was dispatched and persisted.
    GroupChangeSucceeded {
        /// Group changed.
        group: GroupAddress,
        /// Device changed.
        address: UnicastAddress,
        /// Direction.
        op: GroupOp,
    },
    /// A subscription change failed.
    GroupChangeFailed {
        /// Group.
        group: GroupAddress,
        /// Device.
        address: UnicastAddress,
    },
    /// One device of a scene batch succeeded; more follow.
    SceneStepSucceeded {
        /// Scene number.
        scene: SceneId,
        /// Index of the device within the batch.
        index: usize,
    },
    /// The last device of a scene batch succeeded.
    SceneSetSucceeded {
        /// Scene number.
        scene: SceneId,
    },
    /// A scene batch stopped at the device with this index.
    SceneSetFailed {
        /// Scene number.
        scene: SceneId,
        /// Index of the failing device.
        index: usize,
    },
    /// Every device dropped the scene.
    SceneRemoved {
        /// Scene number.
        scene: SceneId,
    },
    /// At least one device could not be told to drop the scene.
    SceneRemoveFailed {
        /// Scene number.
        scene: SceneId,
    },
    /// A node was removed from the network.
    NodeResetSucceeded {
        /// Former node address.
        address: UnicastAddress,
    },
    /// A directly connected node did not accept the reset.
    NodeResetFailed {
        /// Node address.
        address: UnicastAddress,
    },
    /// A node's cached status changed.
    NodeStatusChanged {
        /// Node address.
        address: UnicastAddress,
        /// New cached status.
        status: NodeStatus,
    },
}

/// Sending half of the notification stream.
///
/// The stream is unbounded so the owner loop never waits on a slow observer.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Create a notifier and the receiver observers read from.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit a notification. A closed stream is not an error.
    pub fn emit(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            tracing::debug!(notification = ?e.0, "Notification dropped, no observer");
        }
    }
}
