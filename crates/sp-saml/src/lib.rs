//! SAML 2.0 Service Provider engine.
//!
//! This crate implements the SP side of SAML2 Web SSO:
//!
//! - **Per-entity option resolution** - Static options, overridable per federation partner
//! - **POST and Redirect bindings** - Encode and decode, with detached query signatures
//! - **XML signature** - Enveloped XML-DSig with exclusive canonicalization
//! - **Response validation** - Staged, fail-closed checks with replay detection
//! - **Metadata** - Signed SP metadata generation and IdP metadata parsing
//! - **Commands** - Metadata, SignIn, Acs, Logout and LogoutResponse
//!
//! # Architecture
//!
//! - [`options`] - SP options, partner registry and the per-exchange resolver
//! - [`bindings`] - POST and Redirect binding implementations
//! - [`signature`] - XML signature signing and validation
//! - [`validation`] - Response and logout message validation
//! - [`replay`] - Replay detection stores
//! - [`metadata`] - Metadata builder and parser
//! - [`commands`] - The HTTP-facing operations and their dispatcher
//! - [`endpoints`] - Axum host adapter
//! - [`error`] - Error types for SAML operations
//!
//! # Example
//!
//! ```rust,ignore
//! use sp_saml::{EngineConfig, Options, SpOptions};
//! use sp_saml::endpoints::{router, SamlState};
//!
//! let config = EngineConfig::from_env()?;
//! let options = Options::new(SpOptions::builder(entity_id).build()?, config)?;
//! let app = axum::Router::new().merge(router(SamlState::new(options)));
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod commands;
pub mod config;
pub mod endpoints;
pub mod entity_id;
pub mod error;
pub mod metadata;
pub mod notifications;
pub mod options;
pub mod replay;
pub mod signature;
pub mod types;
pub mod validation;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use commands::{
    CommandKind, CommandResult, HttpRequestData, RequestState, Saml2Urls, dispatch,
};
pub use config::EngineConfig;
pub use entity_id::EntityId;
pub use error::{ErrorKind, SamlError, SamlResult};
pub use notifications::Notifications;
pub use options::{IdentityProvider, Options, PartnerRegistry, SpOptions, resolve_sp_options};
pub use replay::{MemoryReplayStore, ReplayStore};
pub use types::*;
pub use validation::Principal;
