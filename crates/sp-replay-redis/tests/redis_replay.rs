//! Integration tests against a live Redis.
//!
//! Run with `SAML2_REDIS_HOST` pointing at a disposable instance and
//! `--ignored`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sp_replay_redis::{RedisReplayConfig, RedisReplayStore};
use sp_saml::replay::{ConsumeOutcome, ReplayStore};

async fn store() -> anyhow::Result<RedisReplayStore> {
    let prefix = format!("saml2:test:{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
    let config = RedisReplayConfig::from_env()?.key_prefix(prefix);
    Ok(RedisReplayStore::new(config).await?)
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn consumed_id_is_rejected_the_second_time() -> anyhow::Result<()> {
    let store = store().await?;
    let expiry = Utc::now() + Duration::minutes(5);

    assert_eq!(store.try_consume("_a1", expiry).await?, ConsumeOutcome::Accepted);
    assert_eq!(store.try_consume("_a1", expiry).await?, ConsumeOutcome::AlreadyConsumed);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn issued_id_can_be_claimed_once() -> anyhow::Result<()> {
    let store = store().await?;
    store
        .remember_issued("_r1", Utc::now() + Duration::minutes(5))
        .await?;

    assert!(store.claim_issued("_r1", Utc::now()).await?);
    assert!(!store.claim_issued("_r1", Utc::now()).await?);
    assert!(!store.claim_issued("_unknown", Utc::now()).await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a running Redis"]
async fn concurrent_consumers_accept_once() -> anyhow::Result<()> {
    let store = Arc::new(store().await?);
    let expiry = Utc::now() + Duration::minutes(5);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.try_consume("_same", expiry).await })
        })
        .collect();
    let mut accepted = 0;
    for handle in handles {
        if handle.await?? == ConsumeOutcome::Accepted {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
    Ok(())
}
