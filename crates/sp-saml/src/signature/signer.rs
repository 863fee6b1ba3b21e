//! XML Signature creation.
//!
//! Produces enveloped signatures for SAML elements and detached signatures
//! for HTTP-Redirect query strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sp_crypto::CryptoError;

use super::{AlgorithmUri, SignatureConfig, SigningCredential};
use crate::error::{SamlError, SamlResult};
use crate::types::{SAML_NS, XMLDSIG_NS, transform_algorithms};
use crate::xml::{XmlDocument, canonicalize};

/// XML document signer.
///
/// Signs SAML documents with a [`SigningCredential`].
#[derive(Debug)]
pub struct XmlSigner<'a> {
    credential: &'a SigningCredential,
    config: SignatureConfig,
}

impl<'a> XmlSigner<'a> {
    /// Creates a signer using the credential's default algorithm.
    #[must_use]
    pub fn new(credential: &'a SigningCredential) -> Self {
        Self {
            credential,
            config: SignatureConfig::with_algorithm(credential.key().default_algorithm()),
        }
    }

    /// Sets the signature configuration.
    #[must_use]
    pub const fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &SignatureConfig {
        &self.config
    }

    /// Signs the element whose `ID` is `reference_id`.
    ///
    /// The `<ds:Signature>` is inserted as a direct child of that element,
    /// right after its `saml:Issuer` when there is one and as the first
    /// child otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed, has no element
    /// with that id, or the key cannot produce the configured algorithm.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let doc = XmlDocument::parse(xml)?;
        let target = doc.find_by_id(reference_id).ok_or_else(|| {
            SamlError::Crypto(CryptoError::Signing(format!(
                "element with ID '{reference_id}' not found"
            )))
        })?;

        let algorithm = self.config.algorithm;
        let digest = sp_crypto::digest(
            algorithm.hash_algorithm(),
            canonicalize(target, None, &[]).as_bytes(),
        );

        let signed_info = build_signed_info(reference_id, &STANDARD.encode(digest), &self.config);
        let canonical_signed_info = canonical_signed_info(&signed_info)?;
        let signature_value = self
            .credential
            .key()
            .sign(algorithm, canonical_signed_info.as_bytes())?;

        let key_info = if self.config.include_certificate {
            format!(
                "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
                self.credential.certificate().to_base64()
            )
        } else {
            String::new()
        };
        let signature = format!(
            r#"<ds:Signature xmlns:ds="{XMLDSIG_NS}">{signed_info}<ds:SignatureValue>{}</ds:SignatureValue>{key_info}</ds:Signature>"#,
            STANDARD.encode(signature_value)
        );

        let insert_at = target
            .first_child(SAML_NS, "Issuer")
            .filter(|issuer| {
                target
                    .child_elements()
                    .next()
                    .is_some_and(|first| std::ptr::eq(first, *issuer))
            })
            .map_or_else(|| target.content_start(), |issuer| issuer.span().end);

        let mut signed = String::with_capacity(xml.len() + signature.len());
        signed.push_str(&xml[..insert_at]);
        signed.push_str(&signature);
        signed.push_str(&xml[insert_at..]);

        tracing::debug!(
            reference_id,
            algorithm = algorithm.name(),
            "Signed XML element"
        );
        Ok(signed)
    }

    /// Signs an HTTP-Redirect query.
    ///
    /// `query` holds the already encoded `SAMLRequest=..` or
    /// `SAMLResponse=..` parameter, optionally followed by `&RelayState=..`.
    /// Returns the query with `SigAlg` and `Signature` appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot produce the configured algorithm.
    pub fn sign_redirect_query(&self, query: &str) -> SamlResult<String> {
        let algorithm = self.config.algorithm;
        let signed_part = format!("{query}&SigAlg={}", urlencoding::encode(algorithm.uri()));
        let signature = self
            .credential
            .key()
            .sign(algorithm, signed_part.as_bytes())?;
        Ok(format!(
            "{signed_part}&Signature={}",
            urlencoding::encode(&STANDARD.encode(signature))
        ))
    }
}

fn build_signed_info(reference_id: &str, digest_b64: &str, config: &SignatureConfig) -> String {
    format!(
        concat!(
            "<ds:SignedInfo>",
            r#"<ds:CanonicalizationMethod Algorithm="{c14n}"/>"#,
            r#"<ds:SignatureMethod Algorithm="{method}"/>"#,
            r##"<ds:Reference URI="#{id}">"##,
            "<ds:Transforms>",
            r#"<ds:Transform Algorithm="{enveloped}"/>"#,
            r#"<ds:Transform Algorithm="{c14n}"/>"#,
            "</ds:Transforms>",
            r#"<ds:DigestMethod Algorithm="{digest_method}"/>"#,
            "<ds:DigestValue>{digest}</ds:DigestValue>",
            "</ds:Reference>",
            "</ds:SignedInfo>"
        ),
        c14n = transform_algorithms::EXCLUSIVE_C14N,
        method = config.algorithm.uri(),
        id = crate::xml::escape(reference_id),
        enveloped = transform_algorithms::ENVELOPED_SIGNATURE,
        digest_method = config.algorithm.hash_algorithm().uri(),
        digest = digest_b64,
    )
}

/// Exclusive C14N only renders visibly used namespaces, so `SignedInfo`
/// canonicalizes the same way standalone as inside the final document.
fn canonical_signed_info(signed_info: &str) -> SamlResult<String> {
    let wrapper = format!(r#"<ds:Signature xmlns:ds="{XMLDSIG_NS}">{signed_info}</ds:Signature>"#);
    let doc = XmlDocument::parse(&wrapper)?;
    let element = doc
        .root()
        .first_child(XMLDSIG_NS, "SignedInfo")
        .ok_or_else(|| SamlError::Crypto(CryptoError::Signing("SignedInfo not built".into())))?;
    Ok(canonicalize(element, None, &[]))
}
