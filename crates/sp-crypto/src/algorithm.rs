//! Cryptographic algorithm definitions.
//!
//! SAML deployments still meet RSA-SHA1 in the wild, so it is modelled here
//! and flagged as legacy. Callers decide through their allow-list whether a
//! legacy algorithm is acceptable.

use serde::{Deserialize, Serialize};

/// Hash algorithms used for digests and signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-1. Verification of legacy partners only.
    #[serde(rename = "SHA1")]
    Sha1,

    /// SHA-256.
    #[serde(rename = "SHA256")]
    Sha256,

    /// SHA-384.
    #[serde(rename = "SHA384")]
    Sha384,

    /// SHA-512.
    #[serde(rename = "SHA512")]
    Sha512,
}

impl HashAlgorithm {
    /// Returns the output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the algorithm name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Returns true for hashes with known practical collision attacks.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::Sha1)
    }
}

/// Signature algorithms supported for XML and redirect-binding signatures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-1. Verification only.
    #[serde(rename = "RS1")]
    RsaSha1,

    /// RSA PKCS#1 v1.5 with SHA-256.
    #[default]
    #[serde(rename = "RS256")]
    RsaSha256,

    /// RSA PKCS#1 v1.5 with SHA-384.
    #[serde(rename = "RS384")]
    RsaSha384,

    /// RSA PKCS#1 v1.5 with SHA-512.
    #[serde(rename = "RS512")]
    RsaSha512,

    /// ECDSA using P-256 and SHA-256.
    #[serde(rename = "ES256")]
    EcdsaSha256,

    /// ECDSA using P-384 and SHA-384.
    #[serde(rename = "ES384")]
    EcdsaSha384,
}

impl SignatureAlgorithm {
    /// All algorithms this crate knows about.
    pub const ALL: [Self; 6] = [
        Self::RsaSha1,
        Self::RsaSha256,
        Self::RsaSha384,
        Self::RsaSha512,
        Self::EcdsaSha256,
        Self::EcdsaSha384,
    ];

    /// Returns the short algorithm name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RsaSha1 => "RS1",
            Self::RsaSha256 => "RS256",
            Self::RsaSha384 => "RS384",
            Self::RsaSha512 => "RS512",
            Self::EcdsaSha256 => "ES256",
            Self::EcdsaSha384 => "ES384",
        }
    }

    /// Returns the hash algorithm used by this signature algorithm.
    #[must_use]
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::RsaSha1 => HashAlgorithm::Sha1,
            Self::RsaSha256 | Self::EcdsaSha256 => HashAlgorithm::Sha256,
            Self::RsaSha384 | Self::EcdsaSha384 => HashAlgorithm::Sha384,
            Self::RsaSha512 => HashAlgorithm::Sha512,
        }
    }

    /// Returns whether this is an ECDSA algorithm.
    #[must_use]
    pub const fn is_ecdsa(self) -> bool {
        matches!(self, Self::EcdsaSha256 | Self::EcdsaSha384)
    }

    /// Returns whether this is an RSA algorithm.
    #[must_use]
    pub const fn is_rsa(self) -> bool {
        !self.is_ecdsa()
    }

    /// Returns true when the underlying hash is considered broken.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        self.hash_algorithm().is_legacy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_is_legacy() {
        assert!(SignatureAlgorithm::RsaSha1.is_legacy());
        assert!(!SignatureAlgorithm::RsaSha256.is_legacy());
        assert!(HashAlgorithm::Sha1.is_legacy());
    }

    #[test]
    fn default_is_rsa_sha256() {
        assert_eq!(SignatureAlgorithm::default(), SignatureAlgorithm::RsaSha256);
    }

    #[test]
    fn key_families() {
        assert!(SignatureAlgorithm::EcdsaSha384.is_ecdsa());
        assert!(!SignatureAlgorithm::EcdsaSha384.is_rsa());
        assert!(SignatureAlgorithm::RsaSha512.is_rsa());
    }

    #[test]
    fn hash_for_signature() {
        assert_eq!(
            SignatureAlgorithm::EcdsaSha256.hash_algorithm(),
            HashAlgorithm::Sha256
        );
        assert_eq!(SignatureAlgorithm::RsaSha512.hash_algorithm().output_len(), 64);
    }
}
