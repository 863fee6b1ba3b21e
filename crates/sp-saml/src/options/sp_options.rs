//! Service provider options.

use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sp_crypto::{Certificate, SignatureAlgorithm};
use thiserror::Error;
use url::Url;

use crate::entity_id::EntityId;
use crate::error::{SamlError, SamlResult};
use crate::signature::{SignatureConfig, SigningCredential, XmlSigner};
use crate::types::NameIdPolicy;

/// Whether the signing context of an [`SpOptions`] has committed to an
/// identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityBinding {
    /// No signature has been produced yet; the entity id may still change.
    Unbound,
    /// A signature was produced under this entity id.
    Bound(EntityId),
}

/// Attempt to use a signing context under an identity other than the one it
/// is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signing context already bound to {bound}, cannot act as {requested}")]
pub struct IdentityConflict {
    /// The identity the context is bound to.
    pub bound: EntityId,
    /// The identity that was requested.
    pub requested: EntityId,
}

/// Organization published in metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Legal name.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Organization URL.
    pub url: String,
    /// Language tag for the three values.
    pub language: String,
}

/// `contactType` of a metadata contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    /// Technical contact.
    Technical,
    /// Support contact.
    Support,
    /// Administrative contact.
    Administrative,
    /// Billing contact.
    Billing,
    /// Anything else.
    Other,
}

impl ContactType {
    /// Returns the metadata attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Support => "support",
            Self::Administrative => "administrative",
            Self::Billing => "billing",
            Self::Other => "other",
        }
    }
}

/// Contact person published in metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPerson {
    /// Contact type.
    pub contact_type: ContactType,
    /// Company name.
    pub company: Option<String>,
    /// Given name.
    pub given_name: Option<String>,
    /// Surname.
    pub surname: Option<String>,
    /// Email addresses.
    pub email_addresses: Vec<String>,
    /// Telephone numbers.
    pub telephone_numbers: Vec<String>,
}

impl ContactPerson {
    /// Creates a contact with only a type.
    #[must_use]
    pub const fn new(contact_type: ContactType) -> Self {
        Self {
            contact_type,
            company: None,
            given_name: None,
            surname: None,
            email_addresses: Vec::new(),
            telephone_numbers: Vec::new(),
        }
    }
}

/// Configuration of this service provider under one identity.
///
/// Immutable apart from its [`IdentityBinding`], which is shared with every
/// copy made by [`SpOptions::rebind`] and freezes the identity once a
/// signature has been produced.
#[derive(Debug)]
pub struct SpOptions {
    entity_id: EntityId,
    signing_credential: Option<Arc<SigningCredential>>,
    encryption_certificates: Vec<Certificate>,
    outbound_signing_algorithm: SignatureAlgorithm,
    authn_requests_signed: bool,
    want_assertions_signed: bool,
    public_origin: Option<Url>,
    return_url: Option<String>,
    name_id_policy: Option<NameIdPolicy>,
    organization: Option<Organization>,
    contacts: Vec<ContactPerson>,
    metadata_cache_duration: Duration,
    metadata_valid_duration: Option<Duration>,
    identity: Arc<RwLock<IdentityBinding>>,
}

impl SpOptions {
    /// Starts building options for `entity_id`.
    #[must_use]
    pub fn builder(entity_id: EntityId) -> SpOptionsBuilder {
        SpOptionsBuilder::new(entity_id)
    }

    /// The SP entity id.
    #[must_use]
    pub const fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// The signing credential, if any.
    #[must_use]
    pub fn signing_credential(&self) -> Option<&SigningCredential> {
        self.signing_credential.as_deref()
    }

    /// Certificates published for encryption.
    #[must_use]
    pub fn encryption_certificates(&self) -> &[Certificate] {
        &self.encryption_certificates
    }

    /// Preferred algorithm for outbound signatures.
    #[must_use]
    pub const fn outbound_signing_algorithm(&self) -> SignatureAlgorithm {
        self.outbound_signing_algorithm
    }

    /// Whether every AuthnRequest is signed.
    #[must_use]
    pub const fn authn_requests_signed(&self) -> bool {
        self.authn_requests_signed
    }

    /// Whether assertions must be signed.
    #[must_use]
    pub const fn want_assertions_signed(&self) -> bool {
        self.want_assertions_signed
    }

    /// Public origin overriding the request URL when building module URLs.
    #[must_use]
    pub const fn public_origin(&self) -> Option<&Url> {
        self.public_origin.as_ref()
    }

    /// Where users go after sign-in when the request names no target.
    #[must_use]
    pub fn return_url(&self) -> Option<&str> {
        self.return_url.as_deref()
    }

    /// Name ID policy sent in AuthnRequests.
    #[must_use]
    pub const fn name_id_policy(&self) -> Option<&NameIdPolicy> {
        self.name_id_policy.as_ref()
    }

    /// Organization published in metadata.
    #[must_use]
    pub const fn organization(&self) -> Option<&Organization> {
        self.organization.as_ref()
    }

    /// Contacts published in metadata.
    #[must_use]
    pub fn contacts(&self) -> &[ContactPerson] {
        &self.contacts
    }

    /// `cacheDuration` of generated metadata.
    #[must_use]
    pub const fn metadata_cache_duration(&self) -> Duration {
        self.metadata_cache_duration
    }

    /// Offset of the `validUntil` of generated metadata, if published.
    #[must_use]
    pub const fn metadata_valid_duration(&self) -> Option<Duration> {
        self.metadata_valid_duration
    }

    /// Current identity binding of the signing context.
    #[must_use]
    pub fn identity(&self) -> IdentityBinding {
        self.identity.read().clone()
    }

    /// Commits the signing context to this options' entity id.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityConflict`] if it is already bound elsewhere.
    pub fn bind_identity(&self) -> Result<(), IdentityConflict> {
        let mut identity = self.identity.write();
        match &*identity {
            IdentityBinding::Bound(bound) if *bound != self.entity_id => Err(IdentityConflict {
                bound: bound.clone(),
                requested: self.entity_id.clone(),
            }),
            IdentityBinding::Bound(_) => Ok(()),
            IdentityBinding::Unbound => {
                *identity = IdentityBinding::Bound(self.entity_id.clone());
                Ok(())
            }
        }
    }

    /// Returns a copy acting as `entity_id` and sharing this signing
    /// context.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityConflict`] if the signing context is bound to a
    /// different entity id.
    pub fn rebind(&self, entity_id: EntityId) -> Result<Self, IdentityConflict> {
        if let IdentityBinding::Bound(bound) = &*self.identity.read() {
            if *bound != entity_id {
                return Err(IdentityConflict {
                    bound: bound.clone(),
                    requested: entity_id,
                });
            }
        }
        Ok(Self {
            entity_id,
            signing_credential: self.signing_credential.clone(),
            encryption_certificates: self.encryption_certificates.clone(),
            outbound_signing_algorithm: self.outbound_signing_algorithm,
            authn_requests_signed: self.authn_requests_signed,
            want_assertions_signed: self.want_assertions_signed,
            public_origin: self.public_origin.clone(),
            return_url: self.return_url.clone(),
            name_id_policy: self.name_id_policy.clone(),
            organization: self.organization.clone(),
            contacts: self.contacts.clone(),
            metadata_cache_duration: self.metadata_cache_duration,
            metadata_valid_duration: self.metadata_valid_duration,
            identity: Arc::clone(&self.identity),
        })
    }

    /// Returns a signer for outbound messages, binding the identity.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if there is no signing credential or
    /// the identity is bound elsewhere.
    pub fn signer(&self) -> SamlResult<XmlSigner<'_>> {
        let credential = self.signing_credential().ok_or_else(|| {
            SamlError::configuration(format!("no signing credential for {}", self.entity_id))
        })?;
        self.bind_identity()
            .map_err(|e| SamlError::configuration(e.to_string()))?;
        let algorithm = credential.algorithm_for(self.outbound_signing_algorithm);
        Ok(XmlSigner::new(credential).with_config(SignatureConfig::with_algorithm(algorithm)))
    }
}

/// Builder for [`SpOptions`].
#[derive(Debug)]
pub struct SpOptionsBuilder {
    options: SpOptions,
}

impl SpOptionsBuilder {
    fn new(entity_id: EntityId) -> Self {
        Self {
            options: SpOptions {
                entity_id,
                signing_credential: None,
                encryption_certificates: Vec::new(),
                outbound_signing_algorithm: SignatureAlgorithm::RsaSha256,
                authn_requests_signed: false,
                want_assertions_signed: true,
                public_origin: None,
                return_url: None,
                name_id_policy: None,
                organization: None,
                contacts: Vec::new(),
                metadata_cache_duration: Duration::hours(1),
                metadata_valid_duration: None,
                identity: Arc::new(RwLock::new(IdentityBinding::Unbound)),
            },
        }
    }

    /// Sets the signing credential.
    #[must_use]
    pub fn signing_credential(mut self, credential: SigningCredential) -> Self {
        self.options.signing_credential = Some(Arc::new(credential));
        self
    }

    /// Adds a certificate published for encryption.
    #[must_use]
    pub fn encryption_certificate(mut self, certificate: Certificate) -> Self {
        self.options.encryption_certificates.push(certificate);
        self
    }

    /// Sets the preferred outbound signing algorithm.
    #[must_use]
    pub const fn outbound_signing_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.options.outbound_signing_algorithm = algorithm;
        self
    }

    /// Signs every AuthnRequest, whatever the IdP asks for.
    #[must_use]
    pub const fn authn_requests_signed(mut self, signed: bool) -> Self {
        self.options.authn_requests_signed = signed;
        self
    }

    /// Requires signed assertions.
    #[must_use]
    pub const fn want_assertions_signed(mut self, wanted: bool) -> Self {
        self.options.want_assertions_signed = wanted;
        self
    }

    /// Sets the public origin used for module URLs.
    ///
    /// Without it the endpoint URLs that `Destination` and `Recipient` are
    /// checked against come from the request's `Host` and
    /// `X-Forwarded-Proto` headers. Set it whenever those headers can be
    /// supplied by clients, e.g. behind a proxy that passes them through.
    #[must_use]
    pub fn public_origin(mut self, origin: Url) -> Self {
        self.options.public_origin = Some(origin);
        self
    }

    /// Sets the default post-login target.
    #[must_use]
    pub fn return_url(mut self, url: impl Into<String>) -> Self {
        self.options.return_url = Some(url.into());
        self
    }

    /// Sets the name ID policy.
    #[must_use]
    pub fn name_id_policy(mut self, policy: NameIdPolicy) -> Self {
        self.options.name_id_policy = Some(policy);
        self
    }

    /// Sets the organization.
    #[must_use]
    pub fn organization(mut self, organization: Organization) -> Self {
        self.options.organization = Some(organization);
        self
    }

    /// Adds a contact.
    #[must_use]
    pub fn contact(mut self, contact: ContactPerson) -> Self {
        self.options.contacts.push(contact);
        self
    }

    /// Sets the metadata cache duration.
    #[must_use]
    pub const fn metadata_cache_duration(mut self, duration: Duration) -> Self {
        self.options.metadata_cache_duration = duration;
        self
    }

    /// Publishes `validUntil` at this offset from generation time.
    #[must_use]
    pub const fn metadata_valid_duration(mut self, duration: Duration) -> Self {
        self.options.metadata_valid_duration = Some(duration);
        self
    }

    /// Finishes the options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if signed requests are demanded
    /// without a signing credential.
    pub fn build(self) -> SamlResult<SpOptions> {
        if self.options.authn_requests_signed && self.options.signing_credential.is_none() {
            return Err(SamlError::configuration(
                "authn_requests_signed requires a signing credential",
            ));
        }
        if self.options.metadata_cache_duration <= Duration::zero() {
            return Err(SamlError::configuration(
                "metadata cache duration must be positive",
            ));
        }
        Ok(self.options)
    }
}
