//! Error type for cryptographic operations.

use thiserror::Error;

/// Errors raised by key loading, signing, and verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// The certificate could not be parsed.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// PEM armour was missing or malformed.
    #[error("invalid PEM: {0}")]
    InvalidPem(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The algorithm does not fit the key, or is not supported at all.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}

/// Result alias for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
