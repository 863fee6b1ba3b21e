//! SP metadata generation.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use sp_crypto::Certificate;

use crate::commands::Saml2Urls;
use crate::error::SamlResult;
use crate::options::{ContactPerson, Organization, SpOptions};
use crate::types::{MD_NS, SAMLP_NS, SamlBinding, XMLDSIG_NS, format_instant};
use crate::xml::escape;

/// Builds the `md:EntityDescriptor` describing this SP.
///
/// Output is deterministic for identical inputs. The document `ID` is
/// derived from the entity id, and `validUntil` is the only field that
/// depends on the clock.
pub struct MetadataBuilder<'a> {
    options: &'a SpOptions,
    urls: &'a Saml2Urls,
    valid_until: Option<DateTime<Utc>>,
}

impl<'a> MetadataBuilder<'a> {
    /// Creates a builder. `validUntil` is set from
    /// [`SpOptions::metadata_valid_duration`] relative to now.
    #[must_use]
    pub fn new(options: &'a SpOptions, urls: &'a Saml2Urls) -> Self {
        Self {
            options,
            urls,
            valid_until: options.metadata_valid_duration().map(|d| Utc::now() + d),
        }
    }

    /// Overrides `validUntil`.
    #[must_use]
    pub const fn with_valid_until(mut self, valid_until: Option<DateTime<Utc>>) -> Self {
        self.valid_until = valid_until;
        self
    }

    /// The document `ID`: `_` followed by the hex SHA-256 of the entity id.
    #[must_use]
    pub fn document_id(&self) -> String {
        let digest = sp_crypto::sha256(self.options.entity_id().as_str().as_bytes());
        digest.iter().fold(String::from("_"), |mut id, byte| {
            let _ = write!(id, "{byte:02x}");
            id
        })
    }

    /// Builds the metadata and signs it when the options carry a signing
    /// credential.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails or the signing context is bound to
    /// another identity.
    pub fn build(&self) -> SamlResult<String> {
        let xml = self.to_xml();
        if self.options.signing_credential().is_none() {
            return Ok(xml);
        }
        self.options.signer()?.sign(&xml, &self.document_id())
    }

    /// Renders the unsigned document.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let options = self.options;
        let mut xml = String::with_capacity(4096);

        let _ = write!(
            xml,
            r#"<md:EntityDescriptor xmlns:md="{MD_NS}" ID="{}" entityID="{}" cacheDuration="PT{}S""#,
            self.document_id(),
            escape(options.entity_id().as_str()),
            options.metadata_cache_duration().num_seconds(),
        );
        if let Some(valid_until) = self.valid_until {
            let _ = write!(xml, r#" validUntil="{}""#, format_instant(valid_until));
        }
        xml.push('>');

        let _ = write!(
            xml,
            r#"<md:SPSSODescriptor protocolSupportEnumeration="{SAMLP_NS}" AuthnRequestsSigned="{}" WantAssertionsSigned="{}">"#,
            options.authn_requests_signed(),
            options.want_assertions_signed(),
        );
        if let Some(credential) = options.signing_credential() {
            push_key_descriptor(&mut xml, "signing", credential.certificate());
        }
        for certificate in options.encryption_certificates() {
            push_key_descriptor(&mut xml, "encryption", certificate);
        }
        for binding in [SamlBinding::HttpRedirect, SamlBinding::HttpPost] {
            let _ = write!(
                xml,
                r#"<md:SingleLogoutService Binding="{}" Location="{}"/>"#,
                binding.uri(),
                escape(&self.urls.logout_url),
            );
        }
        if let Some(policy) = options.name_id_policy() {
            let _ = write!(xml, "<md:NameIDFormat>{}</md:NameIDFormat>", policy.format.uri());
        }
        let _ = write!(
            xml,
            r#"<md:AssertionConsumerService Binding="{}" Location="{}" index="0" isDefault="true"/>"#,
            SamlBinding::HttpPost.uri(),
            escape(&self.urls.acs_url),
        );
        xml.push_str("</md:SPSSODescriptor>");

        if let Some(organization) = options.organization() {
            push_organization(&mut xml, organization);
        }
        for contact in options.contacts() {
            push_contact(&mut xml, contact);
        }
        xml.push_str("</md:EntityDescriptor>");
        xml
    }
}

fn push_key_descriptor(xml: &mut String, usage: &str, certificate: &Certificate) {
    let _ = write!(
        xml,
        r#"<md:KeyDescriptor use="{usage}"><ds:KeyInfo xmlns:ds="{XMLDSIG_NS}"><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>"#,
        certificate.to_base64(),
    );
}

fn push_organization(xml: &mut String, organization: &Organization) {
    let lang = escape(&organization.language);
    let _ = write!(
        xml,
        r#"<md:Organization><md:OrganizationName xml:lang="{lang}">{}</md:OrganizationName><md:OrganizationDisplayName xml:lang="{lang}">{}</md:OrganizationDisplayName><md:OrganizationURL xml:lang="{lang}">{}</md:OrganizationURL></md:Organization>"#,
        escape(&organization.name),
        escape(&organization.display_name),
        escape(&organization.url),
    );
}

fn push_contact(xml: &mut String, contact: &ContactPerson) {
    let _ = write!(
        xml,
        r#"<md:ContactPerson contactType="{}">"#,
        contact.contact_type.as_str()
    );
    if let Some(company) = &contact.company {
        let _ = write!(xml, "<md:Company>{}</md:Company>", escape(company));
    }
    if let Some(given_name) = &contact.given_name {
        let _ = write!(xml, "<md:GivenName>{}</md:GivenName>", escape(given_name));
    }
    if let Some(surname) = &contact.surname {
        let _ = write!(xml, "<md:SurName>{}</md:SurName>", escape(surname));
    }
    for email in &contact.email_addresses {
        let _ = write!(xml, "<md:EmailAddress>{}</md:EmailAddress>", escape(email));
    }
    for phone in &contact.telephone_numbers {
        let _ = write!(xml, "<md:TelephoneNumber>{}</md:TelephoneNumber>", escape(phone));
    }
    xml.push_str("</md:ContactPerson>");
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::options::{ContactType, IdentityBinding};
    use crate::test_support::{SP_ENTITY, entity, sp_credential};
    use crate::types::{NameIdFormat, NameIdPolicy};
    use crate::xml::XmlDocument;

    fn urls() -> Saml2Urls {
        Saml2Urls::from_base("https://sp.example.org/Saml2", "https://sp.example.org/")
    }

    fn full_options() -> SpOptions {
        let mut contact = ContactPerson::new(ContactType::Technical);
        contact.given_name = Some("Ada".to_string());
        contact.email_addresses.push("ops@example.org".to_string());
        SpOptions::builder(entity(SP_ENTITY))
            .signing_credential(sp_credential())
            .authn_requests_signed(true)
            .name_id_policy(NameIdPolicy {
                format: NameIdFormat::Persistent,
                allow_create: true,
            })
            .organization(Organization {
                name: "Example & Co".to_string(),
                display_name: "Example".to_string(),
                url: "https://example.org/".to_string(),
                language: "en".to_string(),
            })
            .contact(contact)
            .build()
            .unwrap()
    }

    #[test]
    fn unsigned_metadata_is_deterministic() {
        let options = SpOptions::builder(entity(SP_ENTITY)).build().unwrap();
        let urls = urls();
        let first = MetadataBuilder::new(&options, &urls).to_xml();
        let second = MetadataBuilder::new(&options, &urls).to_xml();
        assert_eq!(first, second);
        assert!(first.contains(r#"cacheDuration="PT3600S""#));
        assert!(!first.contains("validUntil"));
    }

    #[test]
    fn metadata_describes_endpoints_and_keys() {
        let options = full_options();
        let urls = urls();
        let xml = MetadataBuilder::new(&options, &urls).to_xml();
        let doc = XmlDocument::parse(&xml).unwrap();
        let sp = doc.root().first_child(MD_NS, "SPSSODescriptor").unwrap();

        assert_eq!(sp.attribute("AuthnRequestsSigned"), Some("true"));
        assert_eq!(sp.attribute("WantAssertionsSigned"), Some("true"));
        assert_eq!(sp.children_named(MD_NS, "SingleLogoutService").count(), 2);
        let acs = sp.first_child(MD_NS, "AssertionConsumerService").unwrap();
        assert_eq!(acs.attribute("Location"), Some("https://sp.example.org/Saml2/Acs"));
        assert_eq!(acs.attribute("Binding"), Some(SamlBinding::HttpPost.uri()));
        let key = sp.first_child(MD_NS, "KeyDescriptor").unwrap();
        assert_eq!(key.attribute("use"), Some("signing"));

        let org = doc.root().first_child(MD_NS, "Organization").unwrap();
        assert_eq!(
            org.first_child(MD_NS, "OrganizationName").unwrap().text(),
            "Example & Co"
        );
        let contact = doc.root().first_child(MD_NS, "ContactPerson").unwrap();
        assert_eq!(contact.attribute("contactType"), Some("technical"));
    }

    #[test]
    fn valid_until_is_published_when_set() {
        let options = SpOptions::builder(entity(SP_ENTITY)).build().unwrap();
        let urls = urls();
        let until = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let xml = MetadataBuilder::new(&options, &urls)
            .with_valid_until(Some(until))
            .to_xml();
        assert!(xml.contains(r#"validUntil="2030-01-01T00:00:00Z""#));
    }

    #[test]
    fn signed_metadata_starts_with_signature_and_binds_identity() {
        let options = full_options();
        let urls = urls();
        let builder = MetadataBuilder::new(&options, &urls);
        let xml = builder.build().unwrap();

        let doc = XmlDocument::parse(&xml).unwrap();
        let first = doc.root().child_elements().next().unwrap();
        assert!(first.is(XMLDSIG_NS, "Signature"));
        assert_eq!(
            options.identity(),
            IdentityBinding::Bound(entity(SP_ENTITY))
        );
    }
}
