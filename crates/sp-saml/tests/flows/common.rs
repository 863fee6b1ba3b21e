//! Common test utilities and fixtures.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sp_crypto::Certificate;
use sp_saml::signature::{SigningCredential, XmlSigner};
use sp_saml::types::{SAML_NS, SAMLP_NS, status_codes};
use sp_saml::{EngineConfig, EntityId, IdentityProvider, Options, PartnerRegistry, SpOptions};

pub const IDP_KEY: &str = include_str!("../fixtures/idp_key.pem");
pub const IDP_CERT: &str = include_str!("../fixtures/idp_cert.pem");
pub const SP_KEY: &str = include_str!("../fixtures/sp_key.pem");
pub const SP_CERT: &str = include_str!("../fixtures/sp_cert.pem");
pub const ROGUE_KEY: &str = include_str!("../fixtures/rogue_key.pem");
pub const ROGUE_CERT: &str = include_str!("../fixtures/rogue_cert.pem");

pub const IDP_ENTITY: &str = "https://idp.example.com";
pub const SP_ENTITY: &str = "https://sp.example.org/";
/// ACS of the module mounted at `/Saml2` on `sp.example.org`.
pub const ACS_URL: &str = "https://sp.example.org/Saml2/Acs";

/// Engine wired to one trusted IdP and an in-memory replay store.
pub struct TestEnv {
    /// Options handed to commands.
    pub options: Arc<Options>,
    /// The partner registry inside `options`.
    pub registry: Arc<PartnerRegistry>,
}

impl TestEnv {
    /// Creates a new test environment.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_idp(identity_provider()?)
    }

    /// Creates a test environment trusting `idp`.
    pub fn with_idp(idp: IdentityProvider) -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sp_saml=debug")
            .with_test_writer()
            .try_init();

        let registry = Arc::new(PartnerRegistry::with_partners([idp]));
        let options = Options::new(sp_options()?, EngineConfig::default())?
            .with_identity_providers(Arc::clone(&registry));
        Ok(Self {
            options: Arc::new(options),
            registry,
        })
    }
}

pub fn entity(id: &str) -> anyhow::Result<EntityId> {
    Ok(EntityId::new(id)?)
}

pub fn idp_credential() -> anyhow::Result<SigningCredential> {
    Ok(SigningCredential::from_pem(IDP_KEY, IDP_CERT)?)
}

pub fn rogue_credential() -> anyhow::Result<SigningCredential> {
    Ok(SigningCredential::from_pem(ROGUE_KEY, ROGUE_CERT)?)
}

pub fn sp_options() -> anyhow::Result<SpOptions> {
    Ok(SpOptions::builder(entity(SP_ENTITY)?)
        .signing_credential(SigningCredential::from_pem(SP_KEY, SP_CERT)?)
        .build()?)
}

/// The trusted IdP, with a redirect SLO endpoint.
pub fn identity_provider() -> anyhow::Result<IdentityProvider> {
    Ok(
        IdentityProvider::new(entity(IDP_ENTITY)?, "https://idp.example.com/sso")
            .with_signing_certificate(Certificate::from_pem(IDP_CERT)?)
            .with_single_logout(
                "https://idp.example.com/slo",
                sp_saml::SamlBinding::HttpRedirect,
            ),
    )
}

/// A response the IdP would send to [`ACS_URL`].
#[derive(Debug, Clone)]
pub struct IdpResponse {
    pub response_id: String,
    pub assertion_id: String,
    pub in_response_to: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
}

impl IdpResponse {
    /// An unsolicited response issued now, valid for five minutes.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            response_id: format!("_r{}", uuid::Uuid::new_v4().simple()),
            assertion_id: format!("_a{}", uuid::Uuid::new_v4().simple()),
            in_response_to: None,
            issued_at: now,
            not_on_or_after: now + Duration::minutes(5),
        }
    }

    pub fn answering(mut self, request_id: &str) -> Self {
        self.in_response_to = Some(request_id.to_string());
        self
    }

    /// Moves the whole validity window `by` into the past.
    pub fn aged(mut self, by: Duration) -> Self {
        self.issued_at -= by;
        self.not_on_or_after -= by;
        self
    }

    pub fn xml(&self) -> String {
        let irt = self
            .in_response_to
            .as_deref()
            .map(|id| format!(r#" InResponseTo="{id}""#))
            .unwrap_or_default();
        let now = self.issued_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let noa = self.not_on_or_after.to_rfc3339_opts(SecondsFormat::Secs, true);
        format!(
            r#"<samlp:Response xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{rid}" Version="2.0" IssueInstant="{now}" Destination="{ACS_URL}"{irt}><saml:Issuer>{IDP_ENTITY}</saml:Issuer><samlp:Status><samlp:StatusCode Value="{success}"/></samlp:Status><saml:Assertion ID="{aid}" Version="2.0" IssueInstant="{now}"><saml:Issuer>{IDP_ENTITY}</saml:Issuer><saml:Subject><saml:NameID>alice</saml:NameID><saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer"><saml:SubjectConfirmationData NotOnOrAfter="{noa}" Recipient="{ACS_URL}"{irt}/></saml:SubjectConfirmation></saml:Subject><saml:Conditions NotBefore="{now}" NotOnOrAfter="{noa}"><saml:AudienceRestriction><saml:Audience>{SP_ENTITY}</saml:Audience></saml:AudienceRestriction></saml:Conditions><saml:AuthnStatement AuthnInstant="{now}" SessionIndex="_idx1"/></saml:Assertion></samlp:Response>"#,
            rid = self.response_id,
            aid = self.assertion_id,
            success = status_codes::SUCCESS,
        )
    }

    /// Signs the assertion with `credential`.
    pub fn signed_with(&self, credential: &SigningCredential) -> anyhow::Result<String> {
        Ok(XmlSigner::new(credential).sign(&self.xml(), &self.assertion_id)?)
    }

    /// Signs the assertion with the trusted IdP key.
    pub fn signed(&self) -> anyhow::Result<String> {
        self.signed_with(&idp_credential()?)
    }
}
