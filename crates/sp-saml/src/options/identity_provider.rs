//! Federation partner records.

use std::sync::Arc;

use sp_crypto::Certificate;

use super::SpOptions;
use crate::entity_id::EntityId;
use crate::types::SamlBinding;

/// A trusted identity provider.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    /// The IdP entity id.
    pub entity_id: EntityId,
    /// Where AuthnRequests are sent.
    pub single_sign_on_service_url: String,
    /// Binding used for AuthnRequests.
    pub binding: SamlBinding,
    /// Where LogoutRequests are sent.
    pub single_logout_service_url: Option<String>,
    /// Where LogoutResponses are sent, if it differs from the request URL.
    pub single_logout_service_response_url: Option<String>,
    /// Binding used for logout messages.
    pub single_logout_service_binding: SamlBinding,
    /// Certificates trusted for this IdP's signatures.
    pub signing_certificates: Vec<Certificate>,
    /// Whether the IdP wants signed AuthnRequests.
    pub want_authn_requests_signed: bool,
    /// Whether this IdP's assertions must carry their own signature.
    pub want_assertions_signed: bool,
    /// Whether responses without `InResponseTo` are accepted.
    pub allow_unsolicited_authn_response: bool,
    /// SP options used instead of the static ones for this partner.
    pub sp_options: Option<Arc<SpOptions>>,
}

impl IdentityProvider {
    /// Creates a record with Redirect binding and no certificates.
    #[must_use]
    pub fn new(entity_id: EntityId, single_sign_on_service_url: impl Into<String>) -> Self {
        Self {
            entity_id,
            single_sign_on_service_url: single_sign_on_service_url.into(),
            binding: SamlBinding::HttpRedirect,
            single_logout_service_url: None,
            single_logout_service_response_url: None,
            single_logout_service_binding: SamlBinding::HttpRedirect,
            signing_certificates: Vec::new(),
            want_authn_requests_signed: false,
            want_assertions_signed: false,
            allow_unsolicited_authn_response: false,
            sp_options: None,
        }
    }

    /// Adds a trusted signing certificate.
    #[must_use]
    pub fn with_signing_certificate(mut self, certificate: Certificate) -> Self {
        self.signing_certificates.push(certificate);
        self
    }

    /// Sets the AuthnRequest binding.
    #[must_use]
    pub const fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.binding = binding;
        self
    }

    /// Sets the single logout endpoint and binding.
    #[must_use]
    pub fn with_single_logout(mut self, url: impl Into<String>, binding: SamlBinding) -> Self {
        self.single_logout_service_url = Some(url.into());
        self.single_logout_service_binding = binding;
        self
    }

    /// Sets the per-partner SP options.
    #[must_use]
    pub fn with_sp_options(mut self, options: Arc<SpOptions>) -> Self {
        self.sp_options = Some(options);
        self
    }

    /// Accepts responses that answer no request.
    #[must_use]
    pub const fn with_unsolicited_responses(mut self, allowed: bool) -> Self {
        self.allow_unsolicited_authn_response = allowed;
        self
    }

    /// Where LogoutResponses to this IdP go.
    #[must_use]
    pub fn logout_response_url(&self) -> Option<&str> {
        self.single_logout_service_response_url
            .as_deref()
            .or(self.single_logout_service_url.as_deref())
    }
}
