//! Onboarding and command orchestration for a Bluetooth mesh lighting
//! network.
//!
//! This crate decides what to ask the protocol stack for and what to record
//! once it answers. It never encodes messages or talks to a radio; the stack
//! sits behind the [`Transport`] trait and reports back through
//! [`ProtocolEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            MeshHandle (callers)   ProtocolEvent (stack)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              MeshRuntime ─► MeshController                  │
//! │  ┌───────────┐ ┌────────────┐ ┌───────────┐ ┌───────────┐  │
//! │  │ Discovery │ │ Onboarding │ │ Sequencer │ │   Light   │  │
//! │  │   Table   │ │ (lifecycle)│ │group/scene│ │  control  │  │
//! │  └───────────┘ └────────────┘ └───────────┘ └───────────┘  │
//! │        Capability resolver      Address allocator           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │ Registry │   │Transport │   │  Trust   │
//!        │ (RocksDB)│   │ (stack)  │   │  cache   │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use meshlink_control::{
//!     BindingRequest, MeshConfig, MeshContext, MeshController, MeshMessage, MeshRegistry,
//!     MeshRuntime, Notifier, ProvisioningRequest, Transport, DEFAULT_CHANNEL_CAPACITY,
//! };
//! use meshlink_core::UnicastAddress;
//! use meshlink_store::RocksStore;
//!
//! // Adapter over the platform mesh stack.
//! struct Radio;
//!
//! impl Transport for Radio {
//!     fn start_scan(&self, _timeout: Duration) {}
//!     fn stop_scan(&self) {}
//!     fn start_provisioning(&self, _request: ProvisioningRequest) -> bool { true }
//!     fn start_binding(&self, _request: BindingRequest) -> bool { true }
//!     fn send(&self, _message: MeshMessage) -> bool { true }
//!     fn reset_node(&self, _address: UnicastAddress) {}
//!     fn auto_connect(&self) {}
//!     fn direct_address(&self) -> Option<UnicastAddress> { None }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/meshlink")?);
//! let registry = MeshRegistry::load(store)?;
//! let (notifier, mut notifications) = Notifier::channel();
//! let ctx = MeshContext::new(registry, Radio, notifier, MeshConfig::default());
//!
//! let (runtime, _events, handle) =
//!     MeshRuntime::new(MeshController::new(ctx), DEFAULT_CHANNEL_CAPACITY);
//! tokio::spawn(runtime.run());
//!
//! handle.start_scan().await?;
//! while let Some(notification) = notifications.recv().await {
//!     println!("{notification:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Onboarding
//!
//! Each device moves `Waiting` → `Provisioning` → `ProvisionSucceeded` →
//! `Binding` → (`PublishConfiguring` →) a terminal phase. Only one device is
//! in flight at a time. See the [`lifecycle`] module for the transition table.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod allocator;
pub mod capability;
pub mod context;
pub mod discovery;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod light;
pub mod onboarding;
pub mod registry;
pub mod runtime;
pub mod sequencer;
pub mod service;
pub mod transport;
pub mod trust;
pub mod types;

pub use allocator::AddressAllocator;
pub use capability::Capability;
pub use context::MeshContext;
pub use discovery::{AdvertisingReport, CandidateDevice, DiscoveryTable};
pub use error::{ControlError, ErrorKind, Result};
pub use events::{Notification, Notifier, ProtocolEvent, StatusMessage};
pub use lifecycle::{LogCategory, LogEntry, OnboardingSession, Phase};
pub use onboarding::{Onboarding, PublishAttempt};
pub use registry::MeshRegistry;
pub use runtime::{Command, MeshHandle, MeshRuntime, DEFAULT_CHANNEL_CAPACITY};
pub use sequencer::{SceneBatch, SceneStep};
pub use service::MeshController;
pub use transport::{BindingRequest, MeshMessage, ProvisioningRequest, SubscriptionOp, Transport};
pub use trust::{NoTrust, StaticTrustCache, TrustCache};
pub use types::{EntryOutcome, GroupOp, MeshConfig, SceneOp, SceneReport};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::{RecordingTransport, TransportCall};
