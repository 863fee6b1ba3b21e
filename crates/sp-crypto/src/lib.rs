//! # sp-crypto
//!
//! Cryptographic primitives for the SAML2 service provider engine, built on
//! aws-lc-rs.
//!
//! - [`hash`]: message digests used by XML-DSig references
//! - [`keys`]: RSA and ECDSA private keys for outbound signatures
//! - [`verify`]: signature verification against certificate public keys
//! - [`certificate`]: X.509 certificate loading and identity
//! - [`pem`]: PEM armour handling
//! - [`random`]: message identifiers and relay-state tokens
//!
//! SHA-1 digests and RSA-SHA1 signatures are available for verifying legacy
//! partners only. Whether they are accepted is a policy decision made by the
//! caller, never by this crate.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod certificate;
pub mod error;
pub mod hash;
pub mod keys;
pub mod pem;
pub mod random;
pub mod verify;

pub use algorithm::{HashAlgorithm, SignatureAlgorithm};
pub use certificate::{Certificate, KeyType};
pub use error::{CryptoError, CryptoResult};
pub use hash::{digest, sha256};
pub use keys::SigningKey;
pub use verify::verify_signature;
