//! Axum host adapter.
//!
//! Mounts the command dispatcher under the module path and turns
//! [`CommandResult`](crate::commands::CommandResult)s into HTTP responses.
//! Failures map from [`SamlError::kind`](crate::SamlError::kind) to
//! `400`, `403`, `404` or `500`; rejected messages never leak their reason
//! to the client.
//!
//! # Example
//!
//! ```rust,ignore
//! use sp_saml::endpoints::{router, SamlState};
//!
//! let app = axum::Router::new().merge(router(SamlState::new(options)));
//! ```

mod handler;
mod router;
mod state;

pub use handler::*;
pub use router::*;
pub use state::*;
