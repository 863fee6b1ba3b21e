//! End-to-end tests of the SAML2 engine.
//!
//! Everything runs in-process: the IdP side is played by fixtures that sign
//! responses with the test keys under `tests/fixtures`.

mod common;
mod bindings;
mod http;
mod metadata;
mod options;
mod validation;
