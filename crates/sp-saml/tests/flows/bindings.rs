//! Binding round-trips, including the detached redirect signature.

use std::collections::HashMap;

use sp_crypto::Certificate;
use sp_saml::bindings::{DecodeLimits, HttpPostBinding, HttpRedirectBinding, SamlMessageType};
use sp_saml::signature::{AlgorithmPolicy, VerificationOutcome, XmlSignatureValidator, XmlSigner};
use sp_saml::{AuthnRequest, SamlBinding};
use url::Url;

use crate::common::{IDP_CERT, SP_CERT, SP_KEY, idp_credential};

fn authn_request() -> AuthnRequest {
    AuthnRequest::new(
        "https://sp.example.org/",
        "https://idp.example.com/sso",
        "https://sp.example.org/Saml2/Acs",
    )
}

#[test]
fn signed_redirect_survives_the_round_trip() -> anyhow::Result<()> {
    let credential = sp_saml::signature::SigningCredential::from_pem(SP_KEY, SP_CERT)?;
    let signer = XmlSigner::new(&credential);
    let request = authn_request();

    let location = HttpRedirectBinding::encode(
        &request.to_xml(),
        "https://idp.example.com/sso",
        SamlMessageType::Request,
        Some("state/with spaces"),
        Some(&signer),
    )?;

    let url = Url::parse(&location)?;
    let decoded = HttpRedirectBinding::decode(url.query().unwrap_or_default(), &DecodeLimits::default())?;
    assert_eq!(decoded.message_type, SamlMessageType::Request);
    assert_eq!(decoded.binding, SamlBinding::HttpRedirect);
    assert_eq!(decoded.relay_state.as_deref(), Some("state/with spaces"));
    assert_eq!(decoded.document.root().attribute("ID"), Some(request.id.as_str()));

    let Some(detached) = decoded.redirect_signature else {
        anyhow::bail!("redirect signature missing");
    };
    let trusted = [Certificate::from_pem(SP_CERT)?];
    let policy = AlgorithmPolicy::default();
    let validator = XmlSignatureValidator::new(&trusted, &policy);
    validator.verify_redirect(&detached.signed_query, &detached.sig_alg, &detached.signature)?;

    let other = [Certificate::from_pem(IDP_CERT)?];
    let err = XmlSignatureValidator::new(&other, &policy)
        .verify_redirect(&detached.signed_query, &detached.sig_alg, &detached.signature)
        .unwrap_err();
    assert_ne!(err.outcome, VerificationOutcome::Valid);
    Ok(())
}

#[test]
fn relay_state_change_breaks_the_redirect_signature() -> anyhow::Result<()> {
    let credential = sp_saml::signature::SigningCredential::from_pem(SP_KEY, SP_CERT)?;
    let signer = XmlSigner::new(&credential);
    let location = HttpRedirectBinding::encode(
        &authn_request().to_xml(),
        "https://idp.example.com/sso",
        SamlMessageType::Request,
        Some("original"),
        Some(&signer),
    )?;
    let forged = location.replace("RelayState=original", "RelayState=forged");

    let url = Url::parse(&forged)?;
    let decoded = HttpRedirectBinding::decode(url.query().unwrap_or_default(), &DecodeLimits::default())?;
    let Some(detached) = decoded.redirect_signature else {
        anyhow::bail!("redirect signature missing");
    };
    let trusted = [Certificate::from_pem(SP_CERT)?];
    let policy = AlgorithmPolicy::default();
    let err = XmlSignatureValidator::new(&trusted, &policy)
        .verify_redirect(&detached.signed_query, &detached.sig_alg, &detached.signature)
        .unwrap_err();
    assert_eq!(err.outcome, VerificationOutcome::InvalidSignatureValue);
    Ok(())
}

#[test]
fn post_form_carries_the_signed_message() -> anyhow::Result<()> {
    let request = authn_request();
    let signed = XmlSigner::new(&idp_credential()?).sign(&request.to_xml(), &request.id)?;

    let html = HttpPostBinding::encode(
        &signed,
        "https://sp.example.org/Saml2/Acs",
        SamlMessageType::Response,
        Some("rs-1"),
    );
    assert!(html.contains(r#"action="https://sp.example.org/Saml2/Acs""#));

    let encoded = html
        .split(r#"name="SAMLResponse" value=""#)
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or_default();
    let form = HashMap::from([
        ("SAMLResponse".to_string(), encoded.to_string()),
        ("RelayState".to_string(), "rs-1".to_string()),
    ]);
    let decoded = HttpPostBinding::decode(&form, &DecodeLimits::default())?;
    assert_eq!(decoded.binding, SamlBinding::HttpPost);
    assert_eq!(decoded.relay_state.as_deref(), Some("rs-1"));

    let trusted = [Certificate::from_pem(IDP_CERT)?];
    let policy = AlgorithmPolicy::default();
    let outcome = XmlSignatureValidator::new(&trusted, &policy).verify_element(decoded.document.root());
    assert!(outcome.is_valid());
    Ok(())
}

#[test]
fn oversized_payload_is_refused() {
    let limits = DecodeLimits {
        max_message_bytes: 64,
        ..DecodeLimits::default()
    };
    let form = HashMap::from([("SAMLResponse".to_string(), "A".repeat(65))]);

    assert!(HttpPostBinding::decode(&form, &limits).is_err());
}
