//! Fixtures shared by unit tests: key material and an IdP that issues
//! signed responses.

use chrono::{DateTime, Duration, Utc};
use sp_crypto::Certificate;

use crate::entity_id::EntityId;
use crate::options::{IdentityProvider, SpOptions};
use crate::signature::{SigningCredential, XmlSigner};
use crate::types::{SAML_NS, SAMLP_NS, format_instant, status_codes};

pub(crate) const IDP_KEY: &str = include_str!("../tests/fixtures/idp_key.pem");
pub(crate) const IDP_CERT: &str = include_str!("../tests/fixtures/idp_cert.pem");
pub(crate) const SP_KEY: &str = include_str!("../tests/fixtures/sp_key.pem");
pub(crate) const SP_CERT: &str = include_str!("../tests/fixtures/sp_cert.pem");
pub(crate) const ROGUE_KEY: &str = include_str!("../tests/fixtures/rogue_key.pem");
pub(crate) const ROGUE_CERT: &str = include_str!("../tests/fixtures/rogue_cert.pem");

pub(crate) const IDP_ENTITY: &str = "https://idp.example.com";
pub(crate) const SP_ENTITY: &str = "https://sp.example.org/";
pub(crate) const ACS_URL: &str = "https://sp.example.org/Saml2/Acs";

pub(crate) fn entity(id: &str) -> EntityId {
    EntityId::new(id).unwrap()
}

pub(crate) fn idp_credential() -> SigningCredential {
    SigningCredential::from_pem(IDP_KEY, IDP_CERT).unwrap()
}

pub(crate) fn sp_credential() -> SigningCredential {
    SigningCredential::from_pem(SP_KEY, SP_CERT).unwrap()
}

pub(crate) fn rogue_credential() -> SigningCredential {
    SigningCredential::from_pem(ROGUE_KEY, ROGUE_CERT).unwrap()
}

/// The trusted IdP record, with SLO endpoints.
pub(crate) fn identity_provider() -> IdentityProvider {
    IdentityProvider::new(entity(IDP_ENTITY), "https://idp.example.com/sso")
        .with_signing_certificate(Certificate::from_pem(IDP_CERT).unwrap())
        .with_single_logout(
            "https://idp.example.com/slo",
            crate::types::SamlBinding::HttpRedirect,
        )
}

pub(crate) fn sp_options() -> SpOptions {
    SpOptions::builder(entity(SP_ENTITY))
        .signing_credential(sp_credential())
        .build()
        .unwrap()
}

/// Describes one IdP response. Every field can be bent to exercise a
/// rejection path.
#[derive(Debug, Clone)]
pub(crate) struct IssuedResponse {
    pub response_id: String,
    pub assertion_id: String,
    pub issuer: String,
    pub destination: String,
    pub recipient: String,
    pub audience: String,
    pub in_response_to: Option<String>,
    pub status: String,
    pub issued_at: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
    pub sign_response: bool,
    pub sign_assertion: bool,
}

impl IssuedResponse {
    pub(crate) fn new() -> Self {
        let now = Utc::now();
        Self {
            response_id: format!("_r{}", uuid::Uuid::new_v4().simple()),
            assertion_id: format!("_a{}", uuid::Uuid::new_v4().simple()),
            issuer: IDP_ENTITY.to_string(),
            destination: ACS_URL.to_string(),
            recipient: ACS_URL.to_string(),
            audience: SP_ENTITY.to_string(),
            in_response_to: None,
            status: status_codes::SUCCESS.to_string(),
            issued_at: now,
            not_on_or_after: now + Duration::minutes(5),
            sign_response: false,
            sign_assertion: true,
        }
    }

    pub(crate) fn in_response_to(mut self, id: &str) -> Self {
        self.in_response_to = Some(id.to_string());
        self
    }

    pub(crate) fn xml(&self) -> String {
        let irt = self
            .in_response_to
            .as_deref()
            .map(|id| format!(r#" InResponseTo="{id}""#))
            .unwrap_or_default();
        let now = format_instant(self.issued_at);
        let not_before = format_instant(self.issued_at - Duration::minutes(1));
        let noa = format_instant(self.not_on_or_after);
        format!(
            r#"<samlp:Response xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{rid}" Version="2.0" IssueInstant="{now}" Destination="{dest}"{irt}><saml:Issuer>{issuer}</saml:Issuer><samlp:Status><samlp:StatusCode Value="{status}"/></samlp:Status><saml:Assertion ID="{aid}" Version="2.0" IssueInstant="{now}"><saml:Issuer>{issuer}</saml:Issuer><saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:persistent">user-1</saml:NameID><saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer"><saml:SubjectConfirmationData NotOnOrAfter="{noa}" Recipient="{recipient}"{irt}/></saml:SubjectConfirmation></saml:Subject><saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{noa}"><saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction></saml:Conditions><saml:AuthnStatement AuthnInstant="{now}" SessionIndex="_session1"/><saml:AttributeStatement><saml:Attribute Name="email"><saml:AttributeValue>user@example.org</saml:AttributeValue></saml:Attribute></saml:AttributeStatement></saml:Assertion></samlp:Response>"#,
            rid = self.response_id,
            dest = self.destination,
            issuer = self.issuer,
            status = self.status,
            aid = self.assertion_id,
            recipient = self.recipient,
            audience = self.audience,
        )
    }

    /// Renders and signs with `credential`.
    pub(crate) fn signed_with(&self, credential: &SigningCredential) -> String {
        let signer = XmlSigner::new(credential);
        let mut xml = self.xml();
        if self.sign_assertion {
            xml = signer.sign(&xml, &self.assertion_id).unwrap();
        }
        if self.sign_response {
            xml = signer.sign(&xml, &self.response_id).unwrap();
        }
        xml
    }

    /// Renders and signs with the trusted IdP key.
    pub(crate) fn signed(&self) -> String {
        self.signed_with(&idp_credential())
    }
}
