//! Owner loop.
//!
//! [`MeshRuntime`] owns the [`MeshController`] and is the only task that
//! touches it. Protocol events, caller commands and the publication timeout
//! are multiplexed into one sequential stream of calls.

use meshlink_core::{Destination, DeviceUuid, GroupAddress, ModelId, SceneId, UnicastAddress};
use meshlink_store::{NodeRecord, Scene, Store};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::capability::Capability;
use crate::error::{ControlError, Result};
use crate::events::ProtocolEvent;
use crate::lifecycle::{OnboardingSession, Phase};
use crate::service::MeshController;
use crate::transport::Transport;
use crate::types::{GroupOp, SceneOp, SceneReport};

/// Default capacity of the event and command channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

type Reply<T> = oneshot::Sender<Result<T>>;

/// A request from a [`MeshHandle`].
#[derive(Debug)]
pub enum Command {
    /// Start scanning.
    StartScan,
    /// Stop scanning.
    StopScan,
    /// Onboard a discovered device.
    StartOnboarding {
        /// Device UUID.
        uuid: DeviceUuid,
        /// Reply.
        reply: Reply<Phase>,
    },
    /// Start the oldest queued session.
    StartNext {
        /// Reply.
        reply: Reply<Option<DeviceUuid>>,
    },
    /// Change a group subscription.
    ChangeGroup {
        /// Group.
        group: GroupAddress,
        /// Device.
        address: UnicastAddress,
        /// Direction.
        op: GroupOp,
        /// Model, on/off server when `None`.
        model: Option<ModelId>,
        /// Reply.
        reply: Reply<()>,
    },
    /// Run a scene batch.
    SetScene {
        /// Scene number.
        scene: SceneId,
        /// Devices in order.
        targets: Vec<UnicastAddress>,
        /// Store or delete.
        op: SceneOp,
        /// Reply.
        reply: Reply<()>,
    },
    /// Recall a scene.
    RecallScene {
        /// Scene number.
        scene: SceneId,
        /// Reply.
        reply: Reply<SceneReport>,
    },
    /// Delete a scene.
    DeleteScene {
        /// Scene number.
        scene: SceneId,
        /// Reply.
        reply: Reply<SceneReport>,
    },
    /// Reset and remove a node.
    KickOut {
        /// Node address.
        address: UnicastAddress,
        /// Reply.
        reply: Reply<()>,
    },
    /// Switch on or off.
    SetOnOff {
        /// Destination.
        destination: Destination,
        /// Target state.
        on: bool,
        /// Reply.
        reply: Reply<()>,
    },
    /// Set lightness.
    SetLightness {
        /// Node address.
        address: UnicastAddress,
        /// Percent.
        percent: u8,
        /// Reply.
        reply: Reply<()>,
    },
    /// Ramp lightness or color temperature.
    StepLevel {
        /// Node address.
        address: UnicastAddress,
        /// Lightness or color temperature.
        capability: Capability,
        /// Signed percent.
        delta_percent: i8,
        /// Reply.
        reply: Reply<()>,
    },
    /// Set color temperature.
    SetTemperature {
        /// Node address.
        address: UnicastAddress,
        /// Percent.
        percent: u8,
        /// Reply.
        reply: Reply<()>,
    },
    /// Set color.
    SetHsl {
        /// Node address.
        address: UnicastAddress,
        /// Hue in degrees.
        hue: u16,
        /// Saturation in percent.
        saturation: u8,
        /// Lightness in percent.
        lightness: u8,
        /// Reply.
        reply: Reply<()>,
    },
    /// Snapshot of the node list.
    Nodes {
        /// Reply.
        reply: Reply<Vec<NodeRecord>>,
    },
    /// Snapshot of the scene list.
    Scenes {
        /// Reply.
        reply: Reply<Vec<Scene>>,
    },
    /// Snapshot of the onboarding sessions.
    Sessions {
        /// Reply.
        reply: Reply<Vec<OnboardingSession>>,
    },
}

/// The owner loop.
pub struct MeshRuntime<S: Store, T: Transport> {
    controller: MeshController<S, T>,
    events: mpsc::Receiver<ProtocolEvent>,
    commands: mpsc::Receiver<Command>,
}

impl<S: Store, T: Transport> MeshRuntime<S, T> {
    /// Create a runtime over a controller.
    ///
    /// Returns the runtime, the sender the protocol stack delivers events
    /// through, and a handle for callers.
    #[must_use]
    pub fn new(
        controller: MeshController<S, T>,
        capacity: usize,
    ) -> (Self, mpsc::Sender<ProtocolEvent>, MeshHandle) {
        let (event_tx, events) = mpsc::channel(capacity);
        let (command_tx, commands) = mpsc::channel(capacity);
        (
            Self {
                controller,
                events,
                commands,
            },
            event_tx,
            MeshHandle { tx: command_tx },
        )
    }

    /// Run until the event sender or every handle is dropped.
    ///
    /// Returns the controller for inspection.
    pub async fn run(mut self) -> MeshController<S, T> {
        tracing::info!("Mesh runtime started");
        loop {
            let deadline = self.controller.publish_deadline();
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.controller.handle_event(event),
                    None => {
                        tracing::info!("Protocol event stream closed");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.execute(command),
                    None => {
                        tracing::info!("All mesh handles dropped");
                        break;
                    }
                },
                () = wait_for(deadline) => {
                    if let Some((attempt, _)) = deadline {
                        tracing::debug!(attempt, "Publication status timed out");
                        self.controller
                            .handle_event(ProtocolEvent::PublishTimeout { attempt });
                    }
                }
            }
        }
        tracing::info!("Mesh runtime stopped");
        self.controller
    }

    fn execute(&mut self, command: Command) {
        let c = &mut self.controller;
        match command {
            Command::StartScan => c.start_scan(),
            Command::StopScan => c.stop_scan(),
            Command::StartOnboarding { uuid, reply } => respond(reply, c.start_onboarding(&uuid)),
            Command::StartNext { reply } => respond(reply, c.start_next()),
            Command::ChangeGroup {
                group,
                address,
                op,
                model,
                reply,
            } => respond(reply, c.change_group(group, address, op, model)),
            Command::SetScene {
                scene,
                targets,
                op,
                reply,
            } => respond(reply, c.set_scene(scene, &targets, op)),
            Command::RecallScene { scene, reply } => respond(reply, c.recall_scene(scene)),
            Command::DeleteScene { scene, reply } => respond(reply, c.delete_scene(scene)),
            Command::KickOut { address, reply } => respond(reply, c.kick_out(address)),
            Command::SetOnOff {
                destination,
                on,
                reply,
            } => respond(reply, c.set_on_off(destination, on)),
            Command::SetLightness {
                address,
                percent,
                reply,
            } => respond(reply, c.set_lightness(address, percent)),
            Command::StepLevel {
                address,
                capability,
                delta_percent,
                reply,
            } => respond(reply, c.step_level(address, capability, delta_percent)),
            Command::SetTemperature {
                address,
                percent,
                reply,
            } => respond(reply, c.set_temperature(address, percent)),
            Command::SetHsl {
                address,
                hue,
                saturation,
                lightness,
                reply,
            } => respond(reply, c.set_hsl(address, hue, saturation, lightness)),
            Command::Nodes { reply } => respond(reply, Ok(c.nodes().to_vec())),
            Command::Scenes { reply } => respond(reply, Ok(c.scenes().to_vec())),
            Command::Sessions { reply } => respond(reply, Ok(c.sessions().to_vec())),
        }
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if reply.send(result).is_err() {
        tracing::debug!("Caller went away before the reply");
    }
}

async fn wait_for(deadline: Option<(u64, Instant)>) {
    match deadline {
        Some((_, at)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Cloneable caller API to a running [`MeshRuntime`].
#[derive(Debug, Clone)]
pub struct MeshHandle {
    tx: mpsc::Sender<Command>,
}

impl MeshHandle {
    async fn request<R>(&self, make: impl FnOnce(Reply<R>) -> Command) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ControlError::RuntimeStopped)?;
        rx.await.map_err(|_| ControlError::RuntimeStopped)?
    }

    async fn notify(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ControlError::RuntimeStopped)
    }

    /// Start scanning.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::RuntimeStopped` if the runtime has stopped.
    pub async fn start_scan(&self) -> Result<()> {
        self.notify(Command::StartScan).await
    }

    /// Stop scanning.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::RuntimeStopped` if the runtime has stopped.
    pub async fn stop_scan(&self) -> Result<()> {
        self.notify(Command::StopScan).await
    }

    /// Onboard a discovered device.
    ///
    /// # Errors
    ///
    /// See [`MeshController::start_onboarding`].
    pub async fn start_onboarding(&self, uuid: DeviceUuid) -> Result<Phase> {
        self.request(|reply| Command::StartOnboarding { uuid, reply })
            .await
    }

    /// Start the oldest queued session.
    ///
    /// # Errors
    ///
    /// See [`MeshController::start_next`].
    pub async fn start_next(&self) -> Result<Option<DeviceUuid>> {
        self.request(|reply| Command::StartNext { reply }).await
    }

    /// Subscribe a device to a group or unsubscribe it.
    ///
    /// # Errors
    ///
    /// See [`MeshController::change_group`].
    pub async fn change_group(
        &self,
        group: GroupAddress,
        address: UnicastAddress,
        op: GroupOp,
        model: Option<ModelId>,
    ) -> Result<()> {
        self.request(|reply| Command::ChangeGroup {
            group,
            address,
            op,
            model,
            reply,
        })
        .await
    }

    /// Run a scene batch.
    ///
    /// # Errors
    ///
    /// See [`MeshController::set_scene`].
    pub async fn set_scene(
        &self,
        scene: SceneId,
        targets: Vec<UnicastAddress>,
        op: SceneOp,
    ) -> Result<()> {
        self.request(|reply| Command::SetScene {
            scene,
            targets,
            op,
            reply,
        })
        .await
    }

    /// Recall a scene.
    ///
    /// # Errors
    ///
    /// See [`MeshController::recall_scene`].
    pub async fn recall_scene(&self, scene: SceneId) -> Result<SceneReport> {
        self.request(|reply| Command::RecallScene { scene, reply })
            .await
    }

    /// Delete a scene.
    ///
    /// # Errors
    ///
    /// See [`MeshController::delete_scene`].
    pub async fn delete_scene(&self, scene: SceneId) -> Result<SceneReport> {
        self.request(|reply| Command::DeleteScene { scene, reply })
            .await
    }

    /// Reset and remove a node.
    ///
    /// # Errors
    ///
    /// See [`MeshController::kick_out`].
    pub async fn kick_out(&self, address: UnicastAddress) -> Result<()> {
        self.request(|reply| Command::KickOut { address, reply })
            .await
    }

    /// Switch a destination on or off.
    ///
    /// # Errors
    ///
    /// See [`MeshController::set_on_off`].
    pub async fn set_on_off(&self, destination: Destination, on: bool) -> Result<()> {
        self.request(|reply| Command::SetOnOff {
            destination,
            on,
            reply,
        })
        .await
    }

    /// Set a node's lightness in percent.
    ///
    /// # Errors
    ///
    /// See [`MeshController::set_lightness`].
    pub async fn set_lightness(&self, address: UnicastAddress, percent: u8) -> Result<()> {
        self.request(|reply| Command::SetLightness {
            address,
            percent,
            reply,
        })
        .await
    }

    /// Ramp a node's lightness or color temperature.
    ///
    /// # Errors
    ///
    /// See [`MeshController::step_level`].
    pub async fn step_level(
        &self,
        address: UnicastAddress,
        capability: Capability,
        delta_percent: i8,
    ) -> Result<()> {
        self.request(|reply| Command::StepLevel {
            address,
            capability,
            delta_percent,
            reply,
        })
        .await
    }

    /// Set a node's color temperature in percent.
    ///
    /// # Errors
    ///
    /// See [`MeshController::set_temperature`].
    pub async fn set_temperature(&self, address: UnicastAddress, percent: u8) -> Result<()> {
        self.request(|reply| Command::SetTemperature {
            address,
            percent,
            reply,
        })
        .await
    }

    /// Set a node's color.
    ///
    /// # Errors
    ///
    /// See [`MeshController::set_hsl`].
    pub async fn set_hsl(
        &self,
        address: UnicastAddress,
        hue: u16,
        saturation: u8,
        lightness: u8,
    ) -> Result<()> {
        self.request(|reply| Command::SetHsl {
            address,
            hue,
            saturation,
            lightness,
            reply,
        })
        .await
    }

    /// Snapshot of the node list.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::RuntimeStopped` if the runtime has stopped.
    pub async fn nodes(&self) -> Result<Vec<NodeRecord>> {
        self.request(|reply| Command::Nodes { reply }).await
    }

    /// Snapshot of the scene list.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::RuntimeStopped` if the runtime has stopped.
    pub async fn scenes(&self) -> Result<Vec<Scene>> {
        self.request(|reply| Command::Scenes { reply }).await
    }

    /// Snapshot of the onboarding sessions.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::RuntimeStopped` if the runtime has stopped.
    pub async fn sessions(&self) -> Result<Vec<OnboardingSession>> {
        self.request(|reply| Command::Sessions { reply }).await
    }
}
