//! Partner metadata parsing.
//!
//! A document is accepted or rejected as a whole. Nothing is returned for a
//! document with an expired `validUntil`, an unusable certificate, or a
//! missing or untrusted signature when signers are configured.

use chrono::{DateTime, Utc};
use sp_crypto::Certificate;

use crate::entity_id::EntityId;
use crate::error::{SamlError, SamlResult};
use crate::options::IdentityProvider;
use crate::signature::{AlgorithmPolicy, XmlSignatureValidator};
use crate::types::{MD_NS, SamlBinding, XMLDSIG_NS, parse_instant};
use crate::xml::{XmlDocument, XmlElement};

/// Trust requirements for partner metadata.
#[derive(Debug, Clone, Default)]
pub struct MetadataTrust {
    /// Certificates allowed to sign metadata. When empty, unsigned metadata
    /// is accepted.
    pub signers: Vec<Certificate>,
    /// Algorithms accepted for metadata signatures.
    pub algorithms: AlgorithmPolicy,
}

impl MetadataTrust {
    /// Requires metadata to be signed by one of `signers`.
    #[must_use]
    pub fn signed_by(signers: Vec<Certificate>) -> Self {
        Self {
            signers,
            algorithms: AlgorithmPolicy::default(),
        }
    }
}

/// A metadata endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Protocol binding.
    pub binding: SamlBinding,
    /// Where messages are sent.
    pub location: String,
    /// Where responses are sent, if different.
    pub response_location: Option<String>,
    /// Index, for indexed endpoints.
    pub index: Option<u16>,
    /// `isDefault`, for indexed endpoints.
    pub is_default: bool,
}

/// Contents of an `IDPSSODescriptor`.
#[derive(Debug, Clone, Default)]
pub struct IdpDescriptor {
    /// `WantAuthnRequestsSigned`.
    pub want_authn_requests_signed: bool,
    /// Certificates usable for signature verification.
    pub signing_certificates: Vec<Certificate>,
    /// Single sign-on endpoints.
    pub single_sign_on_services: Vec<Endpoint>,
    /// Single logout endpoints.
    pub single_logout_services: Vec<Endpoint>,
    /// Advertised name id formats.
    pub name_id_formats: Vec<String>,
}

/// Contents of an `SPSSODescriptor`.
#[derive(Debug, Clone, Default)]
pub struct SpDescriptor {
    /// `AuthnRequestsSigned`.
    pub authn_requests_signed: bool,
    /// `WantAssertionsSigned`.
    pub want_assertions_signed: bool,
    /// Certificates usable for signature verification.
    pub signing_certificates: Vec<Certificate>,
    /// Certificates published for encryption.
    pub encryption_certificates: Vec<Certificate>,
    /// Assertion consumer services.
    pub assertion_consumer_services: Vec<Endpoint>,
    /// Single logout endpoints.
    pub single_logout_services: Vec<Endpoint>,
    /// Advertised name id formats.
    pub name_id_formats: Vec<String>,
}

impl SpDescriptor {
    /// The default assertion consumer service: the one marked `isDefault`,
    /// else the lowest index, else the first.
    #[must_use]
    pub fn default_assertion_consumer_service(&self) -> Option<&Endpoint> {
        let services = &self.assertion_consumer_services;
        services
            .iter()
            .find(|e| e.is_default)
            .or_else(|| services.iter().filter(|e| e.index.is_some()).min_by_key(|e| e.index))
            .or_else(|| services.first())
    }
}

/// One `EntityDescriptor`.
#[derive(Debug, Clone)]
pub struct PartnerMetadata {
    /// `entityID`.
    pub entity_id: EntityId,
    /// Effective `validUntil`: the earliest of the entity's and its
    /// enclosing group's.
    pub valid_until: Option<DateTime<Utc>>,
    /// `cacheDuration` as written.
    pub cache_duration: Option<String>,
    /// The IdP role, if present.
    pub idp: Option<IdpDescriptor>,
    /// The SP role, if present.
    pub sp: Option<SpDescriptor>,
}

impl PartnerMetadata {
    /// Converts the IdP role into a registry record.
    ///
    /// Redirect is preferred over POST for sign-on and logout.
    ///
    /// # Errors
    ///
    /// Returns a metadata error if there is no IdP role or no usable
    /// single sign-on endpoint.
    pub fn to_identity_provider(&self) -> SamlResult<IdentityProvider> {
        let idp = self.idp.as_ref().ok_or_else(|| {
            SamlError::metadata(format!("{} has no IDPSSODescriptor", self.entity_id))
        })?;
        let sso = preferred(&idp.single_sign_on_services).ok_or_else(|| {
            SamlError::metadata(format!(
                "{} has no SingleSignOnService with a front-channel binding",
                self.entity_id
            ))
        })?;

        let mut record = IdentityProvider::new(self.entity_id.clone(), sso.location.clone())
            .with_binding(sso.binding);
        if let Some(slo) = preferred(&idp.single_logout_services) {
            record = record.with_single_logout(slo.location.clone(), slo.binding);
            record
                .single_logout_service_response_url
                .clone_from(&slo.response_location);
        }
        record.signing_certificates.clone_from(&idp.signing_certificates);
        record.want_authn_requests_signed = idp.want_authn_requests_signed;
        Ok(record)
    }
}

/// The first Redirect endpoint, else the first POST endpoint.
fn preferred(endpoints: &[Endpoint]) -> Option<&Endpoint> {
    [SamlBinding::HttpRedirect, SamlBinding::HttpPost]
        .into_iter()
        .find_map(|binding| endpoints.iter().find(|e| e.binding == binding))
}

/// Parses an `EntityDescriptor` or `EntitiesDescriptor` document.
///
/// # Errors
///
/// Returns a metadata error describing the first problem found.
pub fn parse_metadata(
    xml: &str,
    trust: &MetadataTrust,
    now: DateTime<Utc>,
) -> SamlResult<Vec<PartnerMetadata>> {
    let doc = XmlDocument::parse(xml)
        .map_err(|e| SamlError::metadata(format!("unreadable metadata: {e}")))?;
    let root = doc.root();

    let entities = if root.is(MD_NS, "EntityDescriptor") {
        verify_signatures(root, &[root], trust)?;
        vec![read_entity(root, None)?]
    } else if root.is(MD_NS, "EntitiesDescriptor") {
        let group_valid_until = valid_until(root)?;
        let descriptors: Vec<&XmlElement> = root.children_named(MD_NS, "EntityDescriptor").collect();
        verify_signatures(root, &descriptors, trust)?;
        descriptors
            .into_iter()
            .map(|el| read_entity(el, group_valid_until))
            .collect::<SamlResult<Vec<_>>>()?
    } else {
        return Err(SamlError::metadata(format!(
            "expected EntityDescriptor or EntitiesDescriptor, found {}",
            root.qualified_name()
        )));
    };

    if entities.is_empty() {
        return Err(SamlError::metadata("document contains no entity"));
    }
    if let Some(expired) = entities
        .iter()
        .find(|e| e.valid_until.is_some_and(|until| until <= now))
    {
        return Err(SamlError::metadata(format!(
            "metadata for {} expired",
            expired.entity_id
        )));
    }
    tracing::debug!(entities = entities.len(), "Parsed partner metadata");
    Ok(entities)
}

/// With signers configured, either the root or every descriptor must carry
/// a trusted signature.
fn verify_signatures(
    root: &XmlElement,
    descriptors: &[&XmlElement],
    trust: &MetadataTrust,
) -> SamlResult<()> {
    if trust.signers.is_empty() {
        return Ok(());
    }
    let validator = XmlSignatureValidator::new(&trust.signers, &trust.algorithms);
    let reject = |e: crate::error::SignatureError| {
        SamlError::metadata(format!("metadata signature rejected: {e}"))
    };

    if XmlSignatureValidator::is_signed(root) || descriptors.is_empty() {
        validator.check_element(root).map_err(reject)?;
        return Ok(());
    }
    for descriptor in descriptors {
        validator.check_element(descriptor).map_err(reject)?;
    }
    Ok(())
}

fn read_entity(
    el: &XmlElement,
    group_valid_until: Option<DateTime<Utc>>,
) -> SamlResult<PartnerMetadata> {
    let entity_id = el
        .attribute("entityID")
        .ok_or_else(|| SamlError::metadata("EntityDescriptor without entityID"))
        .and_then(|id| EntityId::new(id).map_err(|e| SamlError::metadata(e.to_string())))?;

    let valid_until = match (valid_until(el)?, group_valid_until) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    let idp = el
        .first_child(MD_NS, "IDPSSODescriptor")
        .map(read_idp)
        .transpose()?;
    let sp = el
        .first_child(MD_NS, "SPSSODescriptor")
        .map(read_sp)
        .transpose()?;

    Ok(PartnerMetadata {
        entity_id,
        valid_until,
        cache_duration: el.attribute("cacheDuration").map(str::to_string),
        idp,
        sp,
    })
}

fn read_idp(el: &XmlElement) -> SamlResult<IdpDescriptor> {
    Ok(IdpDescriptor {
        want_authn_requests_signed: flag(el, "WantAuthnRequestsSigned"),
        signing_certificates: certificates(el, "signing")?,
        single_sign_on_services: endpoints(el, "SingleSignOnService")?,
        single_logout_services: endpoints(el, "SingleLogoutService")?,
        name_id_formats: name_id_formats(el),
    })
}

fn read_sp(el: &XmlElement) -> SamlResult<SpDescriptor> {
    Ok(SpDescriptor {
        authn_requests_signed: flag(el, "AuthnRequestsSigned"),
        want_assertions_signed: flag(el, "WantAssertionsSigned"),
        signing_certificates: certificates(el, "signing")?,
        encryption_certificates: certificates(el, "encryption")?,
        assertion_consumer_services: endpoints(el, "AssertionConsumerService")?,
        single_logout_services: endpoints(el, "SingleLogoutService")?,
        name_id_formats: name_id_formats(el),
    })
}

fn valid_until(el: &XmlElement) -> SamlResult<Option<DateTime<Utc>>> {
    el.attribute("validUntil")
        .map(|v| parse_instant("validUntil", v))
        .transpose()
        .map_err(|e| SamlError::metadata(e.to_string()))
}

fn flag(el: &XmlElement, name: &str) -> bool {
    matches!(el.attribute(name), Some("true" | "1"))
}

/// Certificates of the key descriptors for `usage`. A descriptor without
/// `use` serves both purposes.
fn certificates(el: &XmlElement, usage: &str) -> SamlResult<Vec<Certificate>> {
    el.children_named(MD_NS, "KeyDescriptor")
        .filter(|kd| kd.attribute("use").is_none_or(|u| u == usage))
        .filter_map(|kd| kd.first_child(XMLDSIG_NS, "KeyInfo"))
        .flat_map(|ki| ki.children_named(XMLDSIG_NS, "X509Data"))
        .flat_map(|data| data.children_named(XMLDSIG_NS, "X509Certificate"))
        .map(|cert| {
            Certificate::from_base64(&cert.text())
                .map_err(|e| SamlError::metadata(format!("unusable certificate: {e}")))
        })
        .collect()
}

/// Endpoints named `name`. Endpoints with bindings this engine does not
/// speak are skipped.
fn endpoints(el: &XmlElement, name: &str) -> SamlResult<Vec<Endpoint>> {
    let mut endpoints = Vec::new();
    for endpoint in el.children_named(MD_NS, name) {
        let binding = endpoint
            .attribute("Binding")
            .ok_or_else(|| SamlError::metadata(format!("{name} without Binding")))?;
        let location = endpoint
            .attribute("Location")
            .ok_or_else(|| SamlError::metadata(format!("{name} without Location")))?;
        let Some(binding) = SamlBinding::from_uri(binding).filter(SamlBinding::is_front_channel) else {
            continue;
        };
        let index = endpoint
            .attribute("index")
            .map(|i| {
                i.parse::<u16>()
                    .map_err(|_| SamlError::metadata(format!("{name} has invalid index {i}")))
            })
            .transpose()?;
        endpoints.push(Endpoint {
            binding,
            location: location.to_string(),
            response_location: endpoint.attribute("ResponseLocation").map(str::to_string),
            index,
            is_default: flag(endpoint, "isDefault"),
        });
    }
    Ok(endpoints)
}

fn name_id_formats(el: &XmlElement) -> Vec<String> {
    el.children_named(MD_NS, "NameIDFormat")
        .map(XmlElement::trimmed_text)
        .collect()
}
