//! Signature verification against certificate public keys.

use aws_lc_rs::signature::{self, UnparsedPublicKey, VerificationAlgorithm};

use crate::algorithm::SignatureAlgorithm;
use crate::certificate::{Certificate, KeyType};

/// Verifies `sig` over `data` with the public key in `certificate`.
///
/// Returns `false` for a wrong signature and for an algorithm that does not
/// match the certificate's key type. This function applies no algorithm
/// policy; callers reject disallowed algorithms before calling it.
#[must_use]
pub fn verify_signature(
    certificate: &Certificate,
    algorithm: SignatureAlgorithm,
    data: &[u8],
    sig: &[u8],
) -> bool {
    let key_matches = match certificate.key_type() {
        KeyType::Rsa => algorithm.is_rsa(),
        KeyType::Ec => algorithm.is_ecdsa(),
    };
    if !key_matches {
        return false;
    }

    let verification_alg: &'static dyn VerificationAlgorithm = match algorithm {
        SignatureAlgorithm::RsaSha1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
        SignatureAlgorithm::RsaSha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
        SignatureAlgorithm::RsaSha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
        SignatureAlgorithm::RsaSha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        SignatureAlgorithm::EcdsaSha256 => &signature::ECDSA_P256_SHA256_FIXED,
        SignatureAlgorithm::EcdsaSha384 => &signature::ECDSA_P384_SHA384_FIXED,
    };

    UnparsedPublicKey::new(verification_alg, certificate.public_key())
        .verify(data, sig)
        .is_ok()
}
