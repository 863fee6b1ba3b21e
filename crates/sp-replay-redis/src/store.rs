//! Redis replay store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fred::prelude::*;
use fred::types::config::ConnectionConfig;
use sp_saml::replay::{ConsumeOutcome, ReplayStore};
use sp_saml::{SamlError, SamlResult};

use crate::config::RedisReplayConfig;
use crate::error::from_redis_error;

/// Replay store shared by every SP instance that talks to the same Redis.
///
/// Consumption is a single `SET NX PX`; claiming an issued id is a single
/// `GETDEL`. Redis expires entries itself, so purging is a no-op.
pub struct RedisReplayStore {
    client: Client,
    config: RedisReplayConfig,
}

impl RedisReplayStore {
    /// Connects to Redis.
    ///
    /// ## Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(config: RedisReplayConfig) -> SamlResult<Self> {
        let redis_config = Config::from_url(&config.connection_url())
            .map_err(|e| SamlError::configuration(e.to_string()))?;

        let connection = ConnectionConfig {
            connection_timeout: config.connect_timeout(),
            ..ConnectionConfig::default()
        };
        let client = Client::new(
            redis_config,
            None,
            Some(connection),
            Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
        );

        client.init().await.map_err(from_redis_error)?;
        tracing::info!(host = %config.host, port = config.port, "Connected Redis replay store");

        Ok(Self { client, config })
    }

    /// Wraps an already initialised client.
    #[must_use]
    pub const fn from_client(client: Client, config: RedisReplayConfig) -> Self {
        Self { client, config }
    }

    /// Returns the underlying Redis client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

/// Milliseconds from now until `expires_at`, at least one.
fn ttl_millis(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_milliseconds().max(1)
}

#[async_trait]
impl ReplayStore for RedisReplayStore {
    async fn try_consume(&self, id: &str, expires_at: DateTime<Utc>) -> SamlResult<ConsumeOutcome> {
        let key = self.config.replay_key("consumed", id);
        let ttl = ttl_millis(expires_at, Utc::now());

        let result: Option<String> = self
            .client
            .set(&key, "1", Some(Expiration::PX(ttl)), Some(SetOptions::NX), false)
            .await
            .map_err(from_redis_error)?;

        Ok(if result.is_some() {
            ConsumeOutcome::Accepted
        } else {
            ConsumeOutcome::AlreadyConsumed
        })
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> SamlResult<usize> {
        Ok(0)
    }

    async fn remember_issued(&self, id: &str, expires_at: DateTime<Utc>) -> SamlResult<()> {
        let key = self.config.replay_key("issued", id);
        let ttl = ttl_millis(expires_at, Utc::now());
        self.client
            .set::<(), _, _>(&key, "1", Some(Expiration::PX(ttl)), None, false)
            .await
            .map_err(from_redis_error)
    }

    async fn claim_issued(&self, id: &str, _now: DateTime<Utc>) -> SamlResult<bool> {
        let key = self.config.replay_key("issued", id);
        let value: Option<String> = self.client.getdel(&key).await.map_err(from_redis_error)?;
        Ok(value.is_some())
    }
}
