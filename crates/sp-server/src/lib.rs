//! # sp-server
//!
//! A small host for the SAML2 service provider module. It mounts the module
//! at the configured path, keeps local sessions in a cookie table and serves
//! a page showing who is signed in.
//!
//! ## Usage
//!
//! ```ignore
//! use sp_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config).await?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod session;

pub use config::ServerConfig;
pub use session::CookieSessions;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Html;
use axum::{Router, routing::get};
use sp_replay_redis::{RedisReplayConfig, RedisReplayStore};
use sp_saml::endpoints::{SamlState, saml_router};
use sp_saml::metadata::MetadataTrust;
use sp_saml::signature::SigningCredential;
use sp_saml::{EngineConfig, EntityId, Options, SpOptions};
use tokio::net::TcpListener;

/// The demo SP server.
pub struct Server {
    config: ServerConfig,
    options: Options,
}

impl Server {
    /// Creates a server: loads key material and IdP metadata, and connects
    /// the replay store.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or is rejected, or Redis is
    /// unreachable.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let mut builder = SpOptions::builder(EntityId::new(config.entity_id.as_str())?);
        if let (Some(key_file), Some(cert_file)) = (&config.key_file, &config.cert_file) {
            let key = tokio::fs::read_to_string(key_file)
                .await
                .with_context(|| format!("reading {}", key_file.display()))?;
            let cert = tokio::fs::read_to_string(cert_file)
                .await
                .with_context(|| format!("reading {}", cert_file.display()))?;
            builder = builder.signing_credential(SigningCredential::from_pem(&key, &cert)?);
        }
        if let Some(origin) = &config.public_origin {
            builder = builder.public_origin(origin.clone());
        }

        let mut options = Options::new(builder.build()?, EngineConfig::from_env()?)?;

        if let Some(metadata_file) = &config.idp_metadata_file {
            let xml = tokio::fs::read_to_string(metadata_file)
                .await
                .with_context(|| format!("reading {}", metadata_file.display()))?;
            let loaded = options
                .identity_providers
                .load_metadata(&xml, &MetadataTrust::default())?;
            tracing::info!(partners = loaded.len(), "Identity providers loaded");
        }

        if config.redis_replay {
            let store = RedisReplayStore::new(RedisReplayConfig::from_env()?).await?;
            options = options.with_replay_store(Arc::new(store));
        }

        Ok(Self { config, options })
    }

    /// Creates a server around ready-made options.
    #[must_use]
    pub const fn with_options(config: ServerConfig, options: Options) -> Self {
        Self { config, options }
    }

    /// Runs the server.
    ///
    /// This starts the HTTP server and blocks until it receives a shutdown
    /// signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let app = self.router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Builds the application router without starting the server.
    #[must_use]
    pub fn router(&self) -> Router {
        let sessions = Arc::new(CookieSessions::new());
        let module_path = self.options.config.module_path.clone();
        let saml = SamlState::new(self.options.clone()).with_sessions(sessions.clone());

        Router::new()
            .route("/", get(home))
            .with_state(sessions)
            .merge(saml_router(&module_path).with_state(saml))
    }
}

/// Shows the signed-in user, or a sign-in link.
async fn home(State(sessions): State<Arc<CookieSessions>>, headers: HeaderMap) -> Html<String> {
    match sessions.principal(&headers) {
        Some(principal) => Html(format!(
            "<p>Signed in as {} via {}.</p><p><a href=\"/Saml2/Logout\">Sign out</a></p>",
            sp_saml::xml::escape(&principal.name_id.value),
            sp_saml::xml::escape(principal.issuer.as_str()),
        )),
        None => Html("<p><a href=\"/Saml2/SignIn\">Sign in</a></p>".to_string()),
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
