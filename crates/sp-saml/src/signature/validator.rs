//! XML Signature validation.
//!
//! A signature only counts for the element it is a direct child of, and its
//! single `Reference` must point at that element's `ID`. Anything else is
//! reported as a failure, which closes the usual signature-wrapping holes.

use sp_crypto::{Certificate, HashAlgorithm, SignatureAlgorithm};

use super::{AlgorithmPolicy, AlgorithmUri, VerificationOutcome};
use crate::error::SignatureError;
use crate::types::{EXC_C14N_NS, XMLDSIG_NS, transform_algorithms};
use crate::xml::{XmlElement, canonicalize};

/// XML signature validator.
///
/// Validates signatures against an explicit set of trusted certificates.
/// There is no chain building: a certificate is trusted when its DER bytes
/// equal one of the configured certificates.
#[derive(Debug, Clone, Copy)]
pub struct XmlSignatureValidator<'a> {
    trusted: &'a [Certificate],
    policy: &'a AlgorithmPolicy,
}

impl<'a> XmlSignatureValidator<'a> {
    /// Creates a validator.
    #[must_use]
    pub const fn new(trusted: &'a [Certificate], policy: &'a AlgorithmPolicy) -> Self {
        Self { trusted, policy }
    }

    /// Returns true if `element` carries an enveloped signature of its own.
    #[must_use]
    pub fn is_signed(element: &XmlElement) -> bool {
        element.first_child(XMLDSIG_NS, "Signature").is_some()
    }

    /// Verifies the signature enveloped in `element`.
    #[must_use]
    pub fn verify_element(&self, element: &XmlElement) -> VerificationOutcome {
        match self.check_element(element) {
            Ok(_) => VerificationOutcome::Valid,
            Err(err) => err.outcome,
        }
    }

    /// Verifies the signature enveloped in `element` and returns the trusted
    /// certificate that verified it.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first failed check.
    pub fn check_element(&self, element: &XmlElement) -> Result<&'a Certificate, SignatureError> {
        let mut signatures = element.children_named(XMLDSIG_NS, "Signature");
        let signature = signatures.next().ok_or_else(|| {
            fail(
                VerificationOutcome::MissingSignature,
                format!("{} is not signed", element.local_name()),
            )
        })?;
        if signatures.next().is_some() {
            return Err(fail(
                VerificationOutcome::DigestMismatch,
                "more than one enveloped signature",
            ));
        }

        let signed_info = signature
            .first_child(XMLDSIG_NS, "SignedInfo")
            .ok_or_else(|| fail(VerificationOutcome::DigestMismatch, "missing SignedInfo"))?;

        let c14n_method = signed_info
            .first_child(XMLDSIG_NS, "CanonicalizationMethod")
            .ok_or_else(|| {
                fail(
                    VerificationOutcome::UnsupportedAlgorithm,
                    "missing CanonicalizationMethod",
                )
            })?;
        if c14n_method.attribute("Algorithm") != Some(transform_algorithms::EXCLUSIVE_C14N) {
            return Err(fail(
                VerificationOutcome::UnsupportedAlgorithm,
                format!(
                    "canonicalization {} not supported",
                    c14n_method.attribute("Algorithm").unwrap_or("(none)")
                ),
            ));
        }
        let signed_info_prefixes = inclusive_prefixes(c14n_method);

        let algorithm = self.signature_algorithm(signed_info)?;

        let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
        let reference = references
            .next()
            .ok_or_else(|| fail(VerificationOutcome::DigestMismatch, "missing Reference"))?;
        if references.next().is_some() {
            return Err(fail(
                VerificationOutcome::DigestMismatch,
                "more than one Reference",
            ));
        }
        let expected_uri = element
            .attribute("ID")
            .map(|id| format!("#{id}"))
            .ok_or_else(|| fail(VerificationOutcome::DigestMismatch, "signed element has no ID"))?;
        if reference.attribute("URI") != Some(expected_uri.as_str()) {
            return Err(fail(
                VerificationOutcome::DigestMismatch,
                format!(
                    "reference {} does not point at {expected_uri}",
                    reference.attribute("URI").unwrap_or("(none)")
                ),
            ));
        }

        let (enveloped, reference_prefixes) = read_transforms(reference)?;
        let digest_algorithm = self.digest_algorithm(reference)?;
        let candidates = self.candidate_certificates(signature)?;

        let expected_digest = reference
            .first_child(XMLDSIG_NS, "DigestValue")
            .map(XmlElement::text)
            .and_then(|text| sp_crypto::pem::decode_base64_body(&text).ok())
            .ok_or_else(|| fail(VerificationOutcome::DigestMismatch, "unreadable DigestValue"))?;
        let excluded = enveloped.then_some(signature);
        let canonical = canonicalize(element, excluded, &reference_prefixes);
        if sp_crypto::digest(digest_algorithm, canonical.as_bytes()) != expected_digest {
            return Err(fail(
                VerificationOutcome::DigestMismatch,
                format!("digest of {expected_uri} does not match"),
            ));
        }

        let signature_value = signature
            .first_child(XMLDSIG_NS, "SignatureValue")
            .map(XmlElement::text)
            .and_then(|text| sp_crypto::pem::decode_base64_body(&text).ok())
            .ok_or_else(|| {
                fail(
                    VerificationOutcome::InvalidSignatureValue,
                    "unreadable SignatureValue",
                )
            })?;
        let canonical_signed_info = canonicalize(signed_info, None, &signed_info_prefixes);

        candidates
            .into_iter()
            .find(|cert| {
                sp_crypto::verify_signature(
                    cert,
                    algorithm,
                    canonical_signed_info.as_bytes(),
                    &signature_value,
                )
            })
            .ok_or_else(|| {
                fail(
                    VerificationOutcome::InvalidSignatureValue,
                    format!("{} signature does not verify", algorithm.name()),
                )
            })
    }

    /// Verifies a detached HTTP-Redirect signature.
    ///
    /// `signed_query` is `SAMLRequest=..&RelayState=..&SigAlg=..` (or the
    /// `SAMLResponse` form) built from the parameter values exactly as they
    /// were received.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] if the algorithm is not allowed, the
    /// signature is unreadable or no trusted certificate verifies it.
    pub fn verify_redirect(
        &self,
        signed_query: &str,
        sig_alg: &str,
        signature_b64: &str,
    ) -> Result<&'a Certificate, SignatureError> {
        let algorithm = self.allowed_algorithm(sig_alg)?;
        let signature = sp_crypto::pem::decode_base64_body(signature_b64).map_err(|_| {
            fail(
                VerificationOutcome::InvalidSignatureValue,
                "unreadable Signature parameter",
            )
        })?;
        if self.trusted.is_empty() {
            return Err(fail(
                VerificationOutcome::UntrustedCertificate,
                "no trusted certificates configured",
            ));
        }
        self.trusted
            .iter()
            .find(|cert| {
                sp_crypto::verify_signature(cert, algorithm, signed_query.as_bytes(), &signature)
            })
            .ok_or_else(|| {
                fail(
                    VerificationOutcome::InvalidSignatureValue,
                    "redirect signature does not verify",
                )
            })
    }

    fn signature_algorithm(
        &self,
        signed_info: &XmlElement,
    ) -> Result<SignatureAlgorithm, SignatureError> {
        let uri = signed_info
            .first_child(XMLDSIG_NS, "SignatureMethod")
            .and_then(|m| m.attribute("Algorithm"))
            .unwrap_or("(none)");
        self.allowed_algorithm(uri)
    }

    fn allowed_algorithm(&self, uri: &str) -> Result<SignatureAlgorithm, SignatureError> {
        SignatureAlgorithm::from_uri(uri)
            .filter(|alg| self.policy.allows(*alg))
            .ok_or_else(|| {
                fail(
                    VerificationOutcome::UnsupportedAlgorithm,
                    format!("signature algorithm {uri} not allowed"),
                )
            })
    }

    fn digest_algorithm(&self, reference: &XmlElement) -> Result<HashAlgorithm, SignatureError> {
        let uri = reference
            .first_child(XMLDSIG_NS, "DigestMethod")
            .and_then(|m| m.attribute("Algorithm"))
            .unwrap_or("(none)");
        HashAlgorithm::from_uri(uri)
            .filter(|alg| self.policy.allows_digest(*alg))
            .ok_or_else(|| {
                fail(
                    VerificationOutcome::UnsupportedAlgorithm,
                    format!("digest algorithm {uri} not allowed"),
                )
            })
    }

    /// An embedded certificate narrows the candidates to that one, and must
    /// itself be trusted.
    fn candidate_certificates(
        &self,
        signature: &XmlElement,
    ) -> Result<Vec<&'a Certificate>, SignatureError> {
        if self.trusted.is_empty() {
            return Err(fail(
                VerificationOutcome::UntrustedCertificate,
                "no trusted certificates configured",
            ));
        }
        let embedded = signature
            .first_child(XMLDSIG_NS, "KeyInfo")
            .and_then(|key_info| {
                key_info
                    .descendants()
                    .find(|el| el.is(XMLDSIG_NS, "X509Certificate"))
            });
        let Some(embedded) = embedded else {
            return Ok(self.trusted.iter().collect());
        };

        let certificate = Certificate::from_base64(&embedded.text()).map_err(|e| {
            fail(
                VerificationOutcome::UntrustedCertificate,
                format!("embedded certificate unreadable: {e}"),
            )
        })?;
        self.trusted
            .iter()
            .find(|trusted| trusted.der() == certificate.der())
            .map(|trusted| vec![trusted])
            .ok_or_else(|| {
                fail(
                    VerificationOutcome::UntrustedCertificate,
                    format!(
                        "certificate {} ({}) is not trusted",
                        certificate.subject(),
                        certificate.fingerprint()
                    ),
                )
            })
    }
}

fn fail(outcome: VerificationOutcome, detail: impl Into<String>) -> SignatureError {
    SignatureError::new(outcome, detail)
}

fn inclusive_prefixes(transform: &XmlElement) -> Vec<String> {
    transform
        .first_child(EXC_C14N_NS, "InclusiveNamespaces")
        .and_then(|el| el.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Returns whether the enveloped transform is present and the inclusive
/// prefixes of the exclusive C14N transform.
fn read_transforms(reference: &XmlElement) -> Result<(bool, Vec<String>), SignatureError> {
    let mut enveloped = false;
    let mut prefixes = Vec::new();
    let transforms = reference
        .first_child(XMLDSIG_NS, "Transforms")
        .into_iter()
        .flat_map(|t| t.children_named(XMLDSIG_NS, "Transform"));
    for transform in transforms {
        match transform.attribute("Algorithm") {
            Some(transform_algorithms::ENVELOPED_SIGNATURE) => enveloped = true,
            Some(transform_algorithms::EXCLUSIVE_C14N) => {
                prefixes = inclusive_prefixes(transform);
            }
            other => {
                return Err(fail(
                    VerificationOutcome::UnsupportedAlgorithm,
                    format!("transform {} not allowed", other.unwrap_or("(none)")),
                ));
            }
        }
    }
    Ok((enveloped, prefixes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{SignatureConfig, SigningCredential, XmlSigner};
    use crate::types::{SAML_NS, SAMLP_NS};
    use crate::xml::XmlDocument;

    const IDP_KEY: &str = include_str!("../../tests/fixtures/idp_key.pem");
    const IDP_CERT: &str = include_str!("../../tests/fixtures/idp_cert.pem");
    const ROGUE_KEY: &str = include_str!("../../tests/fixtures/rogue_key.pem");
    const ROGUE_CERT: &str = include_str!("../../tests/fixtures/rogue_cert.pem");
    const EC_KEY: &str = include_str!("../../tests/fixtures/ec_key.pem");
    const EC_CERT: &str = include_str!("../../tests/fixtures/ec_cert.pem");

    fn message() -> String {
        format!(
            r#"<samlp:Response xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="_resp" Version="2.0" IssueInstant="2024-05-01T12:00:00Z"><saml:Issuer>https://idp.example.com/</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status></samlp:Response>"#
        )
    }

    fn sign_with(key: &str, cert: &str) -> String {
        let credential = SigningCredential::from_pem(key, cert).unwrap();
        XmlSigner::new(&credential).sign(&message(), "_resp").unwrap()
    }

    fn trusted() -> Vec<Certificate> {
        vec![Certificate::from_pem(IDP_CERT).unwrap()]
    }

    #[test]
    fn valid_signature_verifies() {
        let signed = sign_with(IDP_KEY, IDP_CERT);
        let doc = XmlDocument::parse(&signed).unwrap();
        let trusted = trusted();
        let policy = AlgorithmPolicy::default();
        let validator = XmlSignatureValidator::new(&trusted, &policy);
        assert_eq!(validator.verify_element(doc.root()), VerificationOutcome::Valid);
    }

    #[test]
    fn ecdsa_signature_verifies() {
        let signed = sign_with(EC_KEY, EC_CERT);
        let doc = XmlDocument::parse(&signed).unwrap();
        let trusted = vec![Certificate::from_pem(EC_CERT).unwrap()];
        let policy = AlgorithmPolicy::default();
        let validator = XmlSignatureValidator::new(&trusted, &policy);
        assert_eq!(validator.verify_element(doc.root()), VerificationOutcome::Valid);
    }

    #[test]
    fn tampered_content_is_digest_mismatch() {
        let signed = sign_with(IDP_KEY, IDP_CERT).replace("idp.example.com", "idp.example.org");
        let doc = XmlDocument::parse(&signed).unwrap();
        let trusted = trusted();
        let policy = AlgorithmPolicy::default();
        let validator = XmlSignatureValidator::new(&trusted, &policy);
        assert_eq!(
            validator.verify_element(doc.root()),
            VerificationOutcome::DigestMismatch
        );
    }

    #[test]
    fn rogue_signer_is_untrusted() {
        let signed = sign_with(ROGUE_KEY, ROGUE_CERT);
        let doc = XmlDocument::parse(&signed).unwrap();
        let trusted = trusted();
        let policy = AlgorithmPolicy::default();
        let validator = XmlSignatureValidator::new(&trusted, &policy);
        assert_eq!(
            validator.verify_element(doc.root()),
            VerificationOutcome::UntrustedCertificate
        );
    }

    #[test]
    fn rogue_signer_without_key_info_fails_value() {
        let credential = SigningCredential::from_pem(ROGUE_KEY, ROGUE_CERT).unwrap();
        let signed = XmlSigner::new(&credential)
            .with_config(SignatureConfig {
                include_certificate: false,
                ..SignatureConfig::default()
            })
            .sign(&message(), "_resp")
            .unwrap();
        let doc = XmlDocument::parse(&signed).unwrap();
        let trusted = trusted();
        let policy = AlgorithmPolicy::default();
        let validator = XmlSignatureValidator::new(&trusted, &policy);
        assert_eq!(
            validator.verify_element(doc.root()),
            VerificationOutcome::InvalidSignatureValue
        );
    }

    #[test]
    fn unsigned_element_is_missing_signature() {
        let doc = XmlDocument::parse(&message()).unwrap();
        let trusted = trusted();
        let policy = AlgorithmPolicy::default();
        let validator = XmlSignatureValidator::new(&trusted, &policy);
        assert_eq!(
            validator.verify_element(doc.root()),
            VerificationOutcome::MissingSignature
        );
    }

    #[test]
    fn disallowed_algorithm_is_unsupported() {
        let signed = sign_with(IDP_KEY, IDP_CERT);
        let doc = XmlDocument::parse(&signed).unwrap();
        let trusted = trusted();
        let policy = AlgorithmPolicy::new([SignatureAlgorithm::RsaSha512]);
        let validator = XmlSignatureValidator::new(&trusted, &policy);
        assert_eq!(
            validator.verify_element(doc.root()),
            VerificationOutcome::UnsupportedAlgorithm
        );
    }

    #[test]
    fn reference_to_other_element_is_rejected() {
        // Signature moved under an element with a different ID.
        let signed = sign_with(IDP_KEY, IDP_CERT).replace(r#"ID="_resp""#, r#"ID="_other""#);
        let doc = XmlDocument::parse(&signed).unwrap();
        let trusted = trusted();
        let policy = AlgorithmPolicy::default();
        let validator = XmlSignatureValidator::new(&trusted, &policy);
        let err = validator.check_element(doc.root()).unwrap_err();
        assert_eq!(err.outcome, VerificationOutcome::DigestMismatch);
    }

    #[test]
    fn empty_trust_list_is_untrusted() {
        let signed = sign_with(IDP_KEY, IDP_CERT);
        let doc = XmlDocument::parse(&signed).unwrap();
        let policy = AlgorithmPolicy::default();
        let validator = XmlSignatureValidator::new(&[], &policy);
        assert_eq!(
            validator.verify_element(doc.root()),
            VerificationOutcome::UntrustedCertificate
        );
    }

    #[test]
    fn redirect_signature_round_trip() {
        let credential = SigningCredential::from_pem(IDP_KEY, IDP_CERT).unwrap();
        let query = XmlSigner::new(&credential)
            .sign_redirect_query("SAMLResponse=abc")
            .unwrap();
        let (signed, signature) = query.split_once("&Signature=").unwrap();
        let signature = urlencoding::decode(signature).unwrap();
        let trusted = trusted();
        let policy = AlgorithmPolicy::default();
        let validator = XmlSignatureValidator::new(&trusted, &policy);
        let sig_alg = SignatureAlgorithm::RsaSha256.uri();
        assert!(validator.verify_redirect(signed, sig_alg, &signature).is_ok());
        let err = validator
            .verify_redirect("SAMLResponse=abd&SigAlg=x", sig_alg, &signature)
            .unwrap_err();
        assert_eq!(err.outcome, VerificationOutcome::InvalidSignatureValue);
    }
}
