//! Shared collaborators of the orchestration components.

use std::sync::Arc;

use meshlink_store::Store;

use crate::events::Notifier;
use crate::registry::MeshRegistry;
use crate::transport::Transport;
use crate::trust::{NoTrust, TrustCache};
use crate::types::MeshConfig;

/// Everything a component needs to act on the network.
///
/// Created once by the process entry point and passed by `&mut` to each
/// operation, so only the owner loop ever mutates the registry.
pub struct MeshContext<S: Store, T: Transport> {
    /// Registry facade.
    pub registry: MeshRegistry<S>,
    /// Protocol stack boundary.
    pub transport: T,
    /// Outbound notification stream.
    pub notifier: Notifier,
    /// Configuration.
    pub config: MeshConfig,
    /// Fast-bind trust cache.
    pub trust: Arc<dyn TrustCache>,
}

impl<S: Store, T: Transport> MeshContext<S, T> {
    /// Create a context without a trust cache.
    #[must_use]
    pub fn new(
        registry: MeshRegistry<S>,
        transport: T,
        notifier: Notifier,
        config: MeshConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            notifier,
            config,
            trust: Arc::new(NoTrust),
        }
    }

    /// Replace the trust cache.
    #[must_use]
    pub fn with_trust_cache(mut self, trust: Arc<dyn TrustCache>) -> Self {
        self.trust = trust;
        self
    }
}
