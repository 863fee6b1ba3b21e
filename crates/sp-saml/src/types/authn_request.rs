//! SAML AuthnRequest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameIdPolicy, SAML_NS, SAMLP_NS, SamlBinding, format_instant};
use crate::xml::escape;

/// Authentication request sent by this service provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the service provider issuing the request.
    pub issuer: String,

    /// The IdP endpoint the request is sent to.
    pub destination: String,

    /// The URL where the response should be sent.
    pub assertion_consumer_service_url: String,

    /// Binding the IdP should use for the response.
    pub protocol_binding: SamlBinding,

    /// Name ID policy constraints.
    pub name_id_policy: Option<NameIdPolicy>,

    /// Whether the IdP must authenticate the user directly.
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    pub is_passive: bool,
}

impl AuthnRequest {
    /// Creates a request with a fresh id and the current time.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        destination: impl Into<String>,
        assertion_consumer_service_url: impl Into<String>,
    ) -> Self {
        Self {
            id: sp_crypto::random::generate_message_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: destination.into(),
            assertion_consumer_service_url: assertion_consumer_service_url.into(),
            protocol_binding: SamlBinding::HttpPost,
            name_id_policy: None,
            force_authn: false,
            is_passive: false,
        }
    }

    /// Sets the name ID policy.
    #[must_use]
    pub fn with_name_id_policy(mut self, policy: NameIdPolicy) -> Self {
        self.name_id_policy = Some(policy);
        self
    }

    /// Sets the force-authentication flag.
    #[must_use]
    pub const fn with_force_authn(mut self, force_authn: bool) -> Self {
        self.force_authn = force_authn;
        self
    }

    /// Sets the passive flag.
    #[must_use]
    pub const fn with_passive(mut self, is_passive: bool) -> Self {
        self.is_passive = is_passive;
        self
    }

    /// Renders the request as a standalone XML document element.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut flags = String::new();
        if self.force_authn {
            flags.push_str(r#" ForceAuthn="true""#);
        }
        if self.is_passive {
            flags.push_str(r#" IsPassive="true""#);
        }
        let policy = self
            .name_id_policy
            .as_ref()
            .map_or_else(String::new, NameIdPolicy::to_xml);

        format!(
            r#"<samlp:AuthnRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="2.0" IssueInstant="{}" Destination="{}" AssertionConsumerServiceURL="{}" ProtocolBinding="{}"{flags}><saml:Issuer>{}</saml:Issuer>{policy}</samlp:AuthnRequest>"#,
            escape(&self.id),
            format_instant(self.issue_instant),
            escape(&self.destination),
            escape(&self.assertion_consumer_service_url),
            self.protocol_binding.uri(),
            escape(&self.issuer),
        )
    }
}
