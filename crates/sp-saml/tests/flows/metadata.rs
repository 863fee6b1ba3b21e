//! Metadata generation and partner metadata loading.

use chrono::Utc;
use sp_crypto::Certificate;
use sp_saml::commands::Saml2Urls;
use sp_saml::metadata::{MetadataBuilder, MetadataTrust, parse_metadata};
use sp_saml::signature::XmlSigner;
use sp_saml::{ErrorKind, PartnerRegistry, SamlBinding};

use crate::common::{IDP_CERT, IDP_ENTITY, ROGUE_CERT, SP_CERT, SP_ENTITY, idp_credential, sp_options};

fn pem_body(pem: &str) -> String {
    pem.lines().filter(|l| !l.starts_with("-----")).collect()
}

fn idp_metadata() -> String {
    format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" ID="_idpmeta" entityID="{IDP_ENTITY}"><md:IDPSSODescriptor WantAuthnRequestsSigned="true" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"><md:KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor><md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://idp.example.com/slo"/><md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://idp.example.com/sso/post"/><md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.com/sso"/></md:IDPSSODescriptor></md:EntityDescriptor>"#,
        cert = pem_body(IDP_CERT),
    )
}

#[test]
fn generated_metadata_parses_back() -> anyhow::Result<()> {
    let sp = sp_options()?;
    let urls = Saml2Urls::from_base("https://sp.example.org/Saml2", "https://sp.example.org/");
    let xml = MetadataBuilder::new(&sp, &urls).build()?;

    let trust = MetadataTrust::signed_by(vec![Certificate::from_pem(SP_CERT)?]);
    let entities = parse_metadata(&xml, &trust, Utc::now())?;
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].entity_id.as_str(), SP_ENTITY);

    let Some(descriptor) = entities[0].sp.as_ref() else {
        anyhow::bail!("no SPSSODescriptor in generated metadata");
    };
    let Some(acs) = descriptor.default_assertion_consumer_service() else {
        anyhow::bail!("no default assertion consumer service");
    };
    assert_eq!(acs.location, urls.acs_url);
    assert_eq!(acs.binding, SamlBinding::HttpPost);
    assert_eq!(descriptor.signing_certificates.len(), 1);
    Ok(())
}

#[test]
fn idp_metadata_prefers_redirect_endpoints() -> anyhow::Result<()> {
    let registry = PartnerRegistry::new();
    let loaded = registry.load_metadata(&idp_metadata(), &MetadataTrust::default())?;
    assert_eq!(loaded.len(), 1);

    let Some(idp) = registry.get(IDP_ENTITY) else {
        anyhow::bail!("IdP was not registered");
    };
    assert_eq!(idp.single_sign_on_service_url, "https://idp.example.com/sso");
    assert_eq!(idp.binding, SamlBinding::HttpRedirect);
    assert_eq!(idp.single_logout_service_url.as_deref(), Some("https://idp.example.com/slo"));
    assert_eq!(idp.single_logout_service_binding, SamlBinding::HttpPost);
    assert!(idp.want_authn_requests_signed);
    assert_eq!(idp.signing_certificates, vec![Certificate::from_pem(IDP_CERT)?]);
    Ok(())
}

#[test]
fn signed_metadata_needs_a_trusted_signer() -> anyhow::Result<()> {
    let signed = XmlSigner::new(&idp_credential()?).sign(&idp_metadata(), "_idpmeta")?;

    let trusted = MetadataTrust::signed_by(vec![Certificate::from_pem(IDP_CERT)?]);
    assert_eq!(parse_metadata(&signed, &trusted, Utc::now())?.len(), 1);

    let untrusted = MetadataTrust::signed_by(vec![Certificate::from_pem(ROGUE_CERT)?]);
    let registry = PartnerRegistry::new();
    let err = registry.load_metadata(&signed, &untrusted).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Metadata);
    assert!(registry.is_empty());

    let err = parse_metadata(&idp_metadata(), &trusted, Utc::now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Metadata);
    Ok(())
}
