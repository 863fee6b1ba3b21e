//! Options consumed by the engine.
//!
//! [`Options`] bundles the static [`SpOptions`], the [`PartnerRegistry`],
//! notification subscribers, the replay store and the [`EngineConfig`].
//! Commands never use `Options::sp_options` directly; they go through
//! [`resolve_sp_options`] so per-partner overrides apply.

mod identity_provider;
mod registry;
mod resolver;
mod sp_options;

pub use identity_provider::IdentityProvider;
pub use registry::{PartnerRegistry, PartnerSnapshot};
pub use resolver::resolve_sp_options;
pub use sp_options::{
    ContactPerson, ContactType, IdentityBinding, IdentityConflict, Organization, SpOptions,
    SpOptionsBuilder,
};

use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::SamlResult;
use crate::notifications::Notifications;
use crate::replay::{MemoryReplayStore, ReplayStore};

/// Everything a command needs.
#[derive(Clone)]
pub struct Options {
    /// Statically configured SP options.
    pub sp_options: Arc<SpOptions>,
    /// Federation partners.
    pub identity_providers: Arc<PartnerRegistry>,
    /// Notification subscribers.
    pub notifications: Arc<Notifications>,
    /// Replay detection backend.
    pub replay_store: Arc<dyn ReplayStore>,
    /// Limits and validation policy.
    pub config: EngineConfig,
}

impl Options {
    /// Creates options with an empty registry, no subscribers and an
    /// in-memory replay store.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(sp_options: SpOptions, config: EngineConfig) -> SamlResult<Self> {
        config.validate()?;
        Ok(Self {
            sp_options: Arc::new(sp_options),
            identity_providers: Arc::new(PartnerRegistry::new()),
            notifications: Arc::new(Notifications::default()),
            replay_store: Arc::new(MemoryReplayStore::new(config.replay_max_entries)),
            config,
        })
    }

    /// Uses `registry` for partners.
    #[must_use]
    pub fn with_identity_providers(mut self, registry: Arc<PartnerRegistry>) -> Self {
        self.identity_providers = registry;
        self
    }

    /// Uses `notifications` for hooks.
    #[must_use]
    pub fn with_notifications(mut self, notifications: Notifications) -> Self {
        self.notifications = Arc::new(notifications);
        self
    }

    /// Uses `store` for replay detection.
    #[must_use]
    pub fn with_replay_store(mut self, store: Arc<dyn ReplayStore>) -> Self {
        self.replay_store = store;
        self
    }

    /// SP options effective for this SP's own entity id.
    #[must_use]
    pub fn effective_sp_options(&self) -> Arc<SpOptions> {
        resolve_sp_options(
            &self.sp_options,
            &self.identity_providers,
            self.sp_options.entity_id(),
        )
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("sp_options", &self.sp_options)
            .field("identity_providers", &self.identity_providers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
