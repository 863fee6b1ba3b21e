//! In-process replay store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;

use super::{ConsumeOutcome, ReplayStore};
use crate::error::{SamlError, SamlResult};

/// Replay store backed by concurrent hash maps.
///
/// Suitable for a single instance. Deployments with several instances
/// behind a load balancer need a shared store.
#[derive(Debug)]
pub struct MemoryReplayStore {
    consumed: DashMap<String, DateTime<Utc>>,
    issued: DashMap<String, DateTime<Utc>>,
    max_entries: usize,
}

impl MemoryReplayStore {
    /// Creates a store holding at most `max_entries` live ids per kind.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            consumed: DashMap::new(),
            issued: DashMap::new(),
            max_entries,
        }
    }

    /// Number of consumed ids currently held, expired ones included.
    #[must_use]
    pub fn consumed_len(&self) -> usize {
        self.consumed.len()
    }

    /// Number of issued request ids currently held.
    #[must_use]
    pub fn issued_len(&self) -> usize {
        self.issued.len()
    }

    /// Purges expired entries when `map` is full. Fails if that frees
    /// nothing.
    fn ensure_capacity(
        &self,
        map: &DashMap<String, DateTime<Utc>>,
        id: &str,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        if map.len() < self.max_entries || map.contains_key(id) {
            return Ok(());
        }
        map.retain(|_, expires_at| *expires_at > now);
        if map.len() >= self.max_entries {
            tracing::error!(
                max_entries = self.max_entries,
                "Replay store is full; rejecting message"
            );
            return Err(SamlError::ReplayStore(format!(
                "capacity of {} entries exhausted",
                self.max_entries
            )));
        }
        Ok(())
    }
}

impl Default for MemoryReplayStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl ReplayStore for MemoryReplayStore {
    async fn try_consume(&self, id: &str, expires_at: DateTime<Utc>) -> SamlResult<ConsumeOutcome> {
        let now = Utc::now();
        self.ensure_capacity(&self.consumed, id, now)?;

        // The entry guard holds the shard lock across check and insert.
        match self.consumed.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    Ok(ConsumeOutcome::AlreadyConsumed)
                } else {
                    entry.insert(expires_at);
                    Ok(ConsumeOutcome::Accepted)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                Ok(ConsumeOutcome::Accepted)
            }
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> SamlResult<usize> {
        let mut removed = 0;
        for map in [&self.consumed, &self.issued] {
            map.retain(|_, expires_at| {
                let keep = *expires_at > now;
                if !keep {
                    removed += 1;
                }
                keep
            });
        }
        Ok(removed)
    }

    async fn remember_issued(&self, id: &str, expires_at: DateTime<Utc>) -> SamlResult<()> {
        self.ensure_capacity(&self.issued, id, Utc::now())?;
        self.issued.insert(id.to_string(), expires_at);
        Ok(())
    }

    async fn claim_issued(&self, id: &str, now: DateTime<Utc>) -> SamlResult<bool> {
        Ok(self
            .issued
            .remove(id)
            .is_some_and(|(_, expires_at)| expires_at > now))
    }
}

/// Spawns a task that purges expired entries every `interval`.
///
/// Must be called from within a Tokio runtime. Abort the returned handle to
/// stop purging.
pub fn spawn_purge_task(store: Arc<dyn ReplayStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired replay entries"),
                Err(e) => tracing::warn!(error = %e, "Replay store purge failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn in_minutes(minutes: i64) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::minutes(minutes)
    }

    #[tokio::test]
    async fn second_consume_is_rejected() {
        let store = MemoryReplayStore::default();
        let expiry = in_minutes(5);
        assert_eq!(store.try_consume("_a", expiry).await.unwrap(), ConsumeOutcome::Accepted);
        assert_eq!(
            store.try_consume("_a", expiry).await.unwrap(),
            ConsumeOutcome::AlreadyConsumed
        );
        assert_eq!(store.try_consume("_b", expiry).await.unwrap(), ConsumeOutcome::Accepted);
    }

    #[tokio::test]
    async fn expired_entry_can_be_consumed_again() {
        let store = MemoryReplayStore::default();
        store.try_consume("_a", in_minutes(-1)).await.unwrap();
        assert_eq!(
            store.try_consume("_a", in_minutes(5)).await.unwrap(),
            ConsumeOutcome::Accepted
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consume_accepts_once() {
        let store = Arc::new(MemoryReplayStore::default());
        let expiry = in_minutes(5);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.try_consume("_same", expiry).await.unwrap() })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() == ConsumeOutcome::Accepted {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = MemoryReplayStore::default();
        store.try_consume("_old", in_minutes(-1)).await.unwrap();
        store.try_consume("_new", in_minutes(5)).await.unwrap();
        store.remember_issued("_req", in_minutes(-1)).await.unwrap();
        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 2);
        assert_eq!(store.consumed_len(), 1);
        assert_eq!(store.issued_len(), 0);
    }

    #[tokio::test]
    async fn issued_ids_are_claimed_once() {
        let store = MemoryReplayStore::default();
        store.remember_issued("_req", in_minutes(15)).await.unwrap();
        assert!(store.claim_issued("_req", Utc::now()).await.unwrap());
        assert!(!store.claim_issued("_req", Utc::now()).await.unwrap());
        assert!(!store.claim_issued("_never", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn expired_issued_id_cannot_be_claimed() {
        let store = MemoryReplayStore::default();
        store.remember_issued("_req", in_minutes(1)).await.unwrap();
        assert!(!store.claim_issued("_req", in_minutes(2)).await.unwrap());
    }

    #[tokio::test]
    async fn full_store_rejects_after_purge_attempt() {
        let store = MemoryReplayStore::new(2);
        store.try_consume("_a", in_minutes(5)).await.unwrap();
        store.try_consume("_b", in_minutes(-1)).await.unwrap();
        // Purging "_b" frees a slot.
        assert_eq!(store.try_consume("_c", in_minutes(5)).await.unwrap(), ConsumeOutcome::Accepted);
        let err = store.try_consume("_d", in_minutes(5)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ReplayStore);
    }

    #[tokio::test]
    async fn purge_task_runs() {
        let store = Arc::new(MemoryReplayStore::default());
        store.try_consume("_old", in_minutes(-1)).await.unwrap();
        let handle = spawn_purge_task(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert_eq!(store.consumed_len(), 0);
    }
}
