//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig signatures over SAML elements, canonicalized with
//! exclusive C14N, plus the detached query-string signatures of the
//! HTTP-Redirect binding.
//!
//! # Algorithms
//!
//! Which algorithms are accepted on inbound messages is decided by an
//! [`AlgorithmPolicy`]. The default policy accepts:
//! - RSA-SHA256, RSA-SHA384, RSA-SHA512
//! - ECDSA-SHA256, ECDSA-SHA384
//!
//! RSA-SHA1 (and the SHA-1 digest) is only accepted when a policy lists it
//! explicitly.

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use std::fmt;
use std::sync::Arc;

use sp_crypto::{Certificate, HashAlgorithm, SignatureAlgorithm, SigningKey};

use crate::error::{SamlError, SamlResult};
use crate::types::{digest_algorithms, signature_algorithms};

/// Maps algorithms to and from their XML-DSig identifiers.
pub trait AlgorithmUri: Sized {
    /// Returns the XML-DSig URI.
    fn uri(self) -> &'static str;

    /// Parses an XML-DSig URI.
    fn from_uri(uri: &str) -> Option<Self>;
}

impl AlgorithmUri for SignatureAlgorithm {
    fn uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => signature_algorithms::RSA_SHA1,
            Self::RsaSha256 => signature_algorithms::RSA_SHA256,
            Self::RsaSha384 => signature_algorithms::RSA_SHA384,
            Self::RsaSha512 => signature_algorithms::RSA_SHA512,
            Self::EcdsaSha256 => signature_algorithms::ECDSA_SHA256,
            Self::EcdsaSha384 => signature_algorithms::ECDSA_SHA384,
        }
    }

    fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.uri() == uri)
    }
}

impl AlgorithmUri for HashAlgorithm {
    fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => digest_algorithms::SHA1,
            Self::Sha256 => digest_algorithms::SHA256,
            Self::Sha384 => digest_algorithms::SHA384,
            Self::Sha512 => digest_algorithms::SHA512,
        }
    }

    fn from_uri(uri: &str) -> Option<Self> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.uri() == uri)
    }
}

/// Explicit allow-list of inbound signature algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmPolicy {
    allowed: Vec<SignatureAlgorithm>,
}

impl AlgorithmPolicy {
    /// Creates a policy accepting exactly `allowed`.
    pub fn new(allowed: impl IntoIterator<Item = SignatureAlgorithm>) -> Self {
        let mut list: Vec<SignatureAlgorithm> = Vec::new();
        for alg in allowed {
            if !list.contains(&alg) {
                list.push(alg);
            }
        }
        Self { allowed: list }
    }

    /// Returns the accepted algorithms.
    #[must_use]
    pub fn allowed(&self) -> &[SignatureAlgorithm] {
        &self.allowed
    }

    /// Returns whether `algorithm` is accepted.
    #[must_use]
    pub fn allows(&self, algorithm: SignatureAlgorithm) -> bool {
        self.allowed.contains(&algorithm)
    }

    /// Returns whether a reference digest of `digest` is accepted.
    ///
    /// A legacy digest is only accepted alongside an accepted legacy
    /// signature algorithm.
    #[must_use]
    pub fn allows_digest(&self, digest: HashAlgorithm) -> bool {
        if digest.is_legacy() {
            self.allowed.iter().any(|alg| alg.is_legacy())
        } else {
            true
        }
    }
}

impl Default for AlgorithmPolicy {
    fn default() -> Self {
        Self::new(
            SignatureAlgorithm::ALL
                .into_iter()
                .filter(|alg| !alg.is_legacy()),
        )
    }
}

/// Result of verifying one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationOutcome {
    /// Signature, digest and certificate all check out.
    Valid,
    /// The signature value does not verify against the key.
    InvalidSignatureValue,
    /// The referenced content does not match its digest, or the reference
    /// does not point at the signed element.
    DigestMismatch,
    /// The signing certificate is not one of the configured trusted ones.
    UntrustedCertificate,
    /// An algorithm is unknown or not allowed by policy.
    UnsupportedAlgorithm,
    /// A signature was required but none was present.
    MissingSignature,
}

impl VerificationOutcome {
    /// Returns true for [`VerificationOutcome::Valid`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Valid => "valid",
            Self::InvalidSignatureValue => "invalid signature value",
            Self::DigestMismatch => "digest mismatch",
            Self::UntrustedCertificate => "untrusted certificate",
            Self::UnsupportedAlgorithm => "unsupported algorithm",
            Self::MissingSignature => "missing signature",
        })
    }
}

/// A private key together with the certificate published for it.
#[derive(Debug, Clone)]
pub struct SigningCredential {
    key: Arc<SigningKey>,
    certificate: Certificate,
}

impl SigningCredential {
    /// Pairs `key` with `certificate`, checking that they belong together.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key does not match the
    /// certificate.
    pub fn new(key: SigningKey, certificate: Certificate) -> SamlResult<Self> {
        const PROBE: &[u8] = b"signing credential probe";
        let algorithm = key.default_algorithm();
        let sig = key.sign(algorithm, PROBE)?;
        if !sp_crypto::verify_signature(&certificate, algorithm, PROBE, &sig) {
            return Err(SamlError::configuration(format!(
                "signing key does not match certificate {}",
                certificate.subject()
            )));
        }
        Ok(Self {
            key: Arc::new(key),
            certificate,
        })
    }

    /// Loads a credential from a PEM private key and a PEM certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if either PEM is unusable or they do not match.
    pub fn from_pem(key_pem: &str, certificate_pem: &str) -> SamlResult<Self> {
        let key = SigningKey::from_pem(key_pem)?;
        let certificate = Certificate::from_pem(certificate_pem)?;
        Self::new(key, certificate)
    }

    /// Returns the private key.
    #[must_use]
    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    /// Returns the certificate.
    #[must_use]
    pub const fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Picks `preferred` if the key can produce it, else the key's default.
    #[must_use]
    pub fn algorithm_for(&self, preferred: SignatureAlgorithm) -> SignatureAlgorithm {
        if self.key.supports(preferred) {
            preferred
        } else {
            self.key.default_algorithm()
        }
    }
}

/// Configuration for signature creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureConfig {
    /// The signature algorithm to use. The reference digest uses the same
    /// hash.
    pub algorithm: SignatureAlgorithm,
    /// Whether to embed the X.509 certificate in `KeyInfo`.
    pub include_certificate: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            algorithm: SignatureAlgorithm::RsaSha256,
            include_certificate: true,
        }
    }
}

impl SignatureConfig {
    /// Creates a new signature configuration with the given algorithm.
    #[must_use]
    pub const fn with_algorithm(algorithm: SignatureAlgorithm) -> Self {
        Self {
            algorithm,
            include_certificate: true,
        }
    }
}
