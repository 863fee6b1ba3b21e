//! Redis connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sp_saml::{SamlError, SamlResult};

/// Redis connection configuration for the replay store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisReplayConfig {
    /// Redis server host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Redis server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Redis password (optional).
    pub password: Option<String>,
    /// Redis database number.
    #[serde(default)]
    pub database: u8,
    /// Use TLS for the connection.
    #[serde(default)]
    pub tls: bool,
    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Prefix for every replay key. Several SPs can share one Redis
    /// database as long as their prefixes differ.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisReplayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            database: 0,
            tls: false,
            connect_timeout_ms: default_connect_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RedisReplayConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `SAML2_REDIS_HOST`, `SAML2_REDIS_PORT`, `SAML2_REDIS_PASSWORD`,
    /// `SAML2_REDIS_DATABASE`, `SAML2_REDIS_TLS`,
    /// `SAML2_REDIS_CONNECT_TIMEOUT_MS` and `SAML2_REDIS_KEY_PREFIX`, reading
    /// `.env` first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a value cannot be parsed.
    pub fn from_env() -> SamlResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, using defaults for absent
    /// keys.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> SamlResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("SAML2_REDIS_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "SAML2_REDIS_PORT", defaults.port)?,
            password: lookup("SAML2_REDIS_PASSWORD").or(defaults.password),
            database: parse_or(&lookup, "SAML2_REDIS_DATABASE", defaults.database)?,
            tls: parse_or(&lookup, "SAML2_REDIS_TLS", defaults.tls)?,
            connect_timeout_ms: parse_or(
                &lookup,
                "SAML2_REDIS_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout_ms,
            )?,
            key_prefix: lookup("SAML2_REDIS_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        })
    }

    /// Sets the Redis host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the Redis port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the Redis password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the Redis database number.
    #[must_use]
    pub const fn database(mut self, database: u8) -> Self {
        self.database = database;
        self
    }

    /// Enables TLS.
    #[must_use]
    pub const fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Connection timeout applied to every (re)connect attempt.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Builds the Redis connection URL.
    #[must_use]
    pub fn connection_url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        let auth = self
            .password
            .as_ref()
            .map(|p| format!(":{p}@"))
            .unwrap_or_default();
        format!(
            "{scheme}://{auth}{host}:{port}/{db}",
            host = self.host,
            port = self.port,
            db = self.database
        )
    }

    /// Key for a replay entry of `kind` (`consumed` or `issued`).
    #[must_use]
    pub fn replay_key(&self, kind: &str, id: &str) -> String {
        if self.key_prefix.is_empty() {
            format!("{kind}:{id}")
        } else {
            format!("{}:{kind}:{id}", self.key_prefix)
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> SamlResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SamlError::configuration(format!("{key} has an invalid value '{raw}'"))),
        None => Ok(default),
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    6379
}

const fn default_connect_timeout() -> u64 {
    5000
}

fn default_key_prefix() -> String {
    "saml2:replay".to_string()
}
