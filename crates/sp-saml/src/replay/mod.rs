//! Replay detection.
//!
//! A [`ReplayStore`] remembers two kinds of ids:
//!
//! - **consumed** ids of responses, assertions and inbound logout messages,
//!   which must never be accepted twice while unexpired;
//! - **issued** ids of requests this SP sent, which an inbound message may
//!   answer once through `InResponseTo`.
//!
//! Both operations that decide acceptance are atomic check-and-modify, so
//! two concurrent deliveries of the same message cannot both succeed.

mod memory;

pub use memory::{MemoryReplayStore, spawn_purge_task};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SamlResult;

/// Result of [`ReplayStore::try_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// First sighting; the id is now recorded.
    Accepted,
    /// The id was already consumed and has not expired.
    AlreadyConsumed,
}

/// Backing store for replay detection.
///
/// Implementations must be safe under concurrent access. A store that
/// cannot answer returns [`SamlError::ReplayStore`](crate::SamlError::ReplayStore)
/// and the message is rejected.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Records `id` as consumed until `expires_at` unless a live entry
    /// already exists.
    async fn try_consume(&self, id: &str, expires_at: DateTime<Utc>) -> SamlResult<ConsumeOutcome>;

    /// Removes entries that expired at or before `now`. Returns how many
    /// were removed, where the backend can tell.
    async fn purge_expired(&self, now: DateTime<Utc>) -> SamlResult<usize>;

    /// Records an outbound request id that may be answered until
    /// `expires_at`.
    async fn remember_issued(&self, id: &str, expires_at: DateTime<Utc>) -> SamlResult<()>;

    /// Claims an issued request id. Returns true exactly once per
    /// remembered, unexpired id.
    async fn claim_issued(&self, id: &str, now: DateTime<Utc>) -> SamlResult<bool>;
}
