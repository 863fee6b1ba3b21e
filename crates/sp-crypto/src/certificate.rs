//! X.509 certificates.
//!
//! A [`Certificate`] is identified by its exact DER encoding. Trust decisions
//! compare those bytes and never walk a chain, so two certificates for the
//! same key with different serials are different identities.

use std::fmt;

use base64::Engine;
use chrono::{DateTime, Utc};
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::sha256;
use crate::pem::{decode_base64_body, pem_blocks};

/// Public key family carried by a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// RSA public key.
    Rsa,
    /// Elliptic curve public key.
    Ec,
}

/// A parsed X.509 certificate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate {
    der: Vec<u8>,
    public_key: Vec<u8>,
    key_type: KeyType,
    subject: String,
    not_after: Option<DateTime<Utc>>,
}

impl Certificate {
    /// Parses a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a certificate or carry an
    /// unsupported key type.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let (rest, cert) = X509Certificate::from_der(der)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        if !rest.is_empty() {
            return Err(CryptoError::InvalidCertificate(
                "trailing bytes after certificate".to_string(),
            ));
        }

        let spki = cert.public_key();
        let (key_type, public_key) = match spki.parsed() {
            Ok(PublicKey::RSA(_)) => (KeyType::Rsa, spki.raw.to_vec()),
            Ok(PublicKey::EC(_)) => (KeyType::Ec, spki.subject_public_key.data.to_vec()),
            Ok(_) => {
                return Err(CryptoError::InvalidCertificate(
                    "unsupported public key type".to_string(),
                ));
            }
            Err(e) => return Err(CryptoError::InvalidCertificate(e.to_string())),
        };

        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0);

        Ok(Self {
            der: der.to_vec(),
            public_key,
            key_type,
            subject: cert.subject().to_string(),
            not_after,
        })
    }

    /// Parses the first certificate in a PEM document.
    ///
    /// # Errors
    ///
    /// Returns an error if no certificate block is present or it fails to parse.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        Self::all_from_pem(pem)?
            .into_iter()
            .next()
            .ok_or_else(|| CryptoError::InvalidPem("no CERTIFICATE block found".to_string()))
    }

    /// Parses every certificate in a PEM bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if any block fails to parse.
    pub fn all_from_pem(pem: &str) -> CryptoResult<Vec<Self>> {
        pem_blocks(pem, "CERTIFICATE")?
            .iter()
            .map(|der| Self::from_der(der))
            .collect()
    }

    /// Parses a base64 certificate as carried in `ds:X509Certificate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not base64 or not a certificate.
    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        let der = decode_base64_body(text)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        Self::from_der(&der)
    }

    /// Returns the DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the DER encoding as single-line base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Returns the public key in the form aws-lc-rs verification expects.
    ///
    /// RSA keys are the full `SubjectPublicKeyInfo`, EC keys the uncompressed
    /// point.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Returns the key family.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Returns the subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the end of the validity period.
    #[must_use]
    pub const fn not_after(&self) -> Option<DateTime<Utc>> {
        self.not_after
    }

    /// Returns the lowercase hex SHA-256 fingerprint of the DER encoding.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        sha256(&self.der).iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("key_type", &self.key_type)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
