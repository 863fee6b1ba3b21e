//! Server configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::path::PathBuf;

use anyhow::Context;
use url::Url;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host to bind to.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// This SP's entity id.
    pub entity_id: String,

    /// Origin published in metadata and used for endpoint checks, when the
    /// server sits behind a proxy.
    pub public_origin: Option<Url>,

    /// PEM private key for outbound signatures.
    pub key_file: Option<PathBuf>,

    /// PEM certificate matching `key_file`.
    pub cert_file: Option<PathBuf>,

    /// IdP metadata loaded at start-up.
    pub idp_metadata_file: Option<PathBuf>,

    /// Use the Redis replay store instead of the in-memory one.
    pub redis_replay: bool,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `SAML2_ENTITY_ID` is missing or a value cannot be
    /// parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `SAML2_ENTITY_ID` is missing or a value cannot be
    /// parsed.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("SAML2_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("SAML2_PORT")
            .map(|p| p.parse().with_context(|| format!("SAML2_PORT is not a port: {p}")))
            .transpose()?
            .unwrap_or(8080);
        let entity_id = lookup("SAML2_ENTITY_ID")
            .context("SAML2_ENTITY_ID environment variable is required")?;
        let public_origin = lookup("SAML2_PUBLIC_ORIGIN")
            .map(|o| Url::parse(&o).with_context(|| format!("SAML2_PUBLIC_ORIGIN is not a URL: {o}")))
            .transpose()?;
        let redis_replay = lookup("SAML2_REDIS_HOST").is_some();

        Ok(Self {
            host,
            port,
            entity_id,
            public_origin,
            key_file: lookup("SAML2_KEY_FILE").map(PathBuf::from),
            cert_file: lookup("SAML2_CERT_FILE").map(PathBuf::from),
            idp_metadata_file: lookup("SAML2_IDP_METADATA_FILE").map(PathBuf::from),
            redis_replay,
        })
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub fn for_testing(entity_id: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            entity_id: entity_id.to_string(),
            public_origin: None,
            key_file: None,
            cert_file: None,
            idp_metadata_file: None,
            redis_replay: false,
        }
    }
}
