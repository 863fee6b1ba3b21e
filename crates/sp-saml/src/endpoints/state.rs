//! Host adapter state.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use dashmap::DashMap;

use crate::commands::RequestState;
use crate::options::Options;
use crate::validation::Principal;

/// State shared by the SAML2 handlers.
#[derive(Clone)]
pub struct SamlState {
    /// Engine options.
    pub options: Arc<Options>,
    /// Where pending request state lives between redirects.
    pub request_states: Arc<dyn RequestStateStore>,
    /// The host's local session.
    pub sessions: Arc<dyn SessionBridge>,
}

impl SamlState {
    /// Creates state with in-memory request storage and no local sessions.
    #[must_use]
    pub fn new(options: Options) -> Self {
        let lifetime = options.config.outstanding_request_lifetime();
        Self {
            options: Arc::new(options),
            request_states: Arc::new(MemoryRequestStateStore::new(lifetime)),
            sessions: Arc::new(NoSessions),
        }
    }

    /// Uses `store` for pending request state.
    #[must_use]
    pub fn with_request_states(mut self, store: Arc<dyn RequestStateStore>) -> Self {
        self.request_states = store;
        self
    }

    /// Uses `sessions` for the local session.
    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionBridge>) -> Self {
        self.sessions = sessions;
        self
    }
}

/// Persists [`RequestState`] keyed by its relay state.
#[async_trait]
pub trait RequestStateStore: Send + Sync + 'static {
    /// Stores `state`.
    async fn save(&self, state: RequestState);

    /// Looks up the state sent with `relay_state`.
    async fn load(&self, relay_state: &str) -> Option<RequestState>;

    /// Forgets the state sent with `relay_state`.
    async fn remove(&self, relay_state: &str);
}

/// Process-local [`RequestStateStore`]. Entries older than the outstanding
/// request lifetime are never returned.
#[derive(Debug)]
pub struct MemoryRequestStateStore {
    states: DashMap<String, RequestState>,
    lifetime: Duration,
}

impl MemoryRequestStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            states: DashMap::new(),
            lifetime,
        }
    }
}

#[async_trait]
impl RequestStateStore for MemoryRequestStateStore {
    async fn save(&self, state: RequestState) {
        let cutoff = Utc::now() - self.lifetime;
        self.states.retain(|_, s| s.created_at > cutoff);
        self.states.insert(state.relay_state.clone(), state);
    }

    async fn load(&self, relay_state: &str) -> Option<RequestState> {
        let cutoff = Utc::now() - self.lifetime;
        self.states
            .get(relay_state)
            .filter(|s| s.created_at > cutoff)
            .map(|s| s.clone())
    }

    async fn remove(&self, relay_state: &str) {
        self.states.remove(relay_state);
    }
}

/// Connects the engine to the host's own session handling.
#[async_trait]
pub trait SessionBridge: Send + Sync + 'static {
    /// The user of the local session the request belongs to.
    async fn current_principal(&self, request_headers: &HeaderMap) -> Option<Principal>;

    /// Starts a local session, adding e.g. cookies to `response_headers`.
    async fn sign_in(&self, principal: &Principal, response_headers: &mut HeaderMap);

    /// Ends the local session.
    async fn sign_out(&self, request_headers: &HeaderMap, response_headers: &mut HeaderMap);
}

/// A host without local sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSessions;

#[async_trait]
impl SessionBridge for NoSessions {
    async fn current_principal(&self, _request_headers: &HeaderMap) -> Option<Principal> {
        None
    }

    async fn sign_in(&self, _principal: &Principal, _response_headers: &mut HeaderMap) {}

    async fn sign_out(&self, _request_headers: &HeaderMap, _response_headers: &mut HeaderMap) {}
}
