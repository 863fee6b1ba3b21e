//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    NameId, SAML_NS, expect_element, check_version, issuer_of, optional_instant, parse_instant,
    required_attribute,
};
use crate::error::DecodeError;
use crate::xml::XmlElement;

/// SAML Assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,

    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this assertion.
    pub issuer: String,

    /// The subject of this assertion.
    pub subject: Option<Subject>,

    /// Conditions that must be evaluated for the assertion to be valid.
    pub conditions: Option<Conditions>,

    /// Authentication statements.
    pub authn_statements: Vec<AuthnStatement>,

    /// Attributes from every attribute statement, in document order.
    pub attributes: Vec<Attribute>,
}

impl Assertion {
    /// Reads a `saml:Assertion` element.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when a required element or attribute is
    /// missing or a timestamp cannot be parsed.
    pub fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        expect_element(el, SAML_NS, "Assertion")?;
        check_version(el)?;

        let subject = el
            .first_child(SAML_NS, "Subject")
            .map(Subject::from_element)
            .transpose()?;
        let conditions = el
            .first_child(SAML_NS, "Conditions")
            .map(Conditions::from_element)
            .transpose()?;
        let authn_statements = el
            .children_named(SAML_NS, "AuthnStatement")
            .map(AuthnStatement::from_element)
            .collect::<Result<Vec<_>, _>>()?;
        let attributes = el
            .children_named(SAML_NS, "AttributeStatement")
            .flat_map(|statement| statement.children_named(SAML_NS, "Attribute"))
            .map(Attribute::from_element)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: required_attribute(el, "ID")?.to_string(),
            issue_instant: parse_instant("IssueInstant", required_attribute(el, "IssueInstant")?)?,
            issuer: issuer_of(el).ok_or_else(|| DecodeError::missing("Assertion Issuer"))?,
            subject,
            conditions,
            authn_statements,
            attributes,
        })
    }

    /// Returns the bearer subject confirmations.
    pub fn bearer_confirmations(&self) -> impl Iterator<Item = &SubjectConfirmation> {
        self.subject
            .iter()
            .flat_map(|s| s.confirmations.iter())
            .filter(|c| c.is_bearer())
    }

    /// Returns the first session index, used for single logout.
    #[must_use]
    pub fn session_index(&self) -> Option<&str> {
        self.authn_statements
            .iter()
            .find_map(|s| s.session_index.as_deref())
    }
}

/// Subject of an assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Name identifier. `None` when the IdP sent an encrypted identifier.
    pub name_id: Option<NameId>,

    /// Subject confirmations.
    pub confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        let name_id = el
            .child_elements()
            .find(|c| NameId::matches(c))
            .map(NameId::from_element)
            .transpose()?;
        let confirmations = el
            .children_named(SAML_NS, "SubjectConfirmation")
            .map(SubjectConfirmation::from_element)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name_id,
            confirmations,
        })
    }
}

/// Subject confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// Confirmation method URI.
    pub method: String,

    /// Confirmation data.
    pub data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        let data = el
            .first_child(SAML_NS, "SubjectConfirmationData")
            .map(SubjectConfirmationData::from_element)
            .transpose()?;
        Ok(Self {
            method: required_attribute(el, "Method")?.to_string(),
            data,
        })
    }

    /// Returns true for the bearer method.
    #[must_use]
    pub fn is_bearer(&self) -> bool {
        self.method == super::confirmation_methods::BEARER
    }
}

/// Subject confirmation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// Time before which the subject cannot be confirmed.
    pub not_before: Option<DateTime<Utc>>,

    /// Time at which the subject can no longer be confirmed.
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// URL the assertion may be delivered to.
    pub recipient: Option<String>,

    /// Id of the request this assertion answers.
    pub in_response_to: Option<String>,

    /// Network address of the attesting entity.
    pub address: Option<String>,
}

impl SubjectConfirmationData {
    fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        Ok(Self {
            not_before: optional_instant(el, "NotBefore")?,
            not_on_or_after: optional_instant(el, "NotOnOrAfter")?,
            recipient: el.attribute("Recipient").map(str::to_string),
            in_response_to: el.attribute("InResponseTo").map(str::to_string),
            address: el.attribute("Address").map(str::to_string),
        })
    }
}

/// Assertion conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Start of the validity window.
    pub not_before: Option<DateTime<Utc>>,

    /// End of the validity window, exclusive.
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audience restrictions. Each must be satisfied.
    pub audience_restrictions: Vec<AudienceRestriction>,

    /// Whether a `OneTimeUse` condition is present.
    pub one_time_use: bool,
}

impl Conditions {
    fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        let audience_restrictions = el
            .children_named(SAML_NS, "AudienceRestriction")
            .map(|ar| AudienceRestriction {
                audiences: ar
                    .children_named(SAML_NS, "Audience")
                    .map(XmlElement::trimmed_text)
                    .collect(),
            })
            .collect();
        Ok(Self {
            not_before: optional_instant(el, "NotBefore")?,
            not_on_or_after: optional_instant(el, "NotOnOrAfter")?,
            audience_restrictions,
            one_time_use: el.first_child(SAML_NS, "OneTimeUse").is_some(),
        })
    }
}

/// One `AudienceRestriction`: satisfied when any listed audience matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// Audience URIs.
    pub audiences: Vec<String>,
}

/// Authentication statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// When the subject authenticated.
    pub authn_instant: DateTime<Utc>,

    /// Session index at the IdP.
    pub session_index: Option<String>,

    /// When the IdP session ends.
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    /// Authentication context class reference.
    pub authn_context_class_ref: Option<String>,
}

impl AuthnStatement {
    fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        let authn_context_class_ref = el
            .first_child(SAML_NS, "AuthnContext")
            .and_then(|ctx| ctx.first_child(SAML_NS, "AuthnContextClassRef"))
            .map(XmlElement::trimmed_text);
        Ok(Self {
            authn_instant: parse_instant("AuthnInstant", required_attribute(el, "AuthnInstant")?)?,
            session_index: el.attribute("SessionIndex").map(str::to_string),
            session_not_on_or_after: optional_instant(el, "SessionNotOnOrAfter")?,
            authn_context_class_ref,
        })
    }
}

/// An attribute and its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,

    /// Name format URI.
    pub name_format: Option<String>,

    /// Friendly name.
    pub friendly_name: Option<String>,

    /// Text values.
    pub values: Vec<String>,
}

impl Attribute {
    fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        Ok(Self {
            name: required_attribute(el, "Name")?.to_string(),
            name_format: el.attribute("NameFormat").map(str::to_string),
            friendly_name: el.attribute("FriendlyName").map(str::to_string),
            values: el
                .children_named(SAML_NS, "AttributeValue")
                .map(XmlElement::text)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NameIdFormat, confirmation_methods};
    use crate::xml::XmlDocument;

    const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1" Version="2.0" IssueInstant="2024-05-01T12:00:00Z">
  <saml:Issuer>https://idp.example.com</saml:Issuer>
  <saml:Subject>
    <saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:persistent">user-1</saml:NameID>
    <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
      <saml:SubjectConfirmationData NotOnOrAfter="2024-05-01T12:05:00Z" Recipient="https://sp.example.org/Saml2/Acs" InResponseTo="_req1"/>
    </saml:SubjectConfirmation>
  </saml:Subject>
  <saml:Conditions NotBefore="2024-05-01T11:59:00Z" NotOnOrAfter="2024-05-01T12:05:00Z">
    <saml:AudienceRestriction><saml:Audience>https://sp.example.org/</saml:Audience></saml:AudienceRestriction>
  </saml:Conditions>
  <saml:AuthnStatement AuthnInstant="2024-05-01T12:00:00Z" SessionIndex="_s1">
    <saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:Password</saml:AuthnContextClassRef></saml:AuthnContext>
  </saml:AuthnStatement>
  <saml:AttributeStatement>
    <saml:Attribute Name="mail"><saml:AttributeValue>a@example.org</saml:AttributeValue><saml:AttributeValue>b@example.org</saml:AttributeValue></saml:Attribute>
  </saml:AttributeStatement>
</saml:Assertion>"#;

    #[test]
    fn reads_full_assertion() {
        let doc = XmlDocument::parse(ASSERTION).unwrap();
        let assertion = Assertion::from_element(doc.root()).unwrap();

        assert_eq!(assertion.id, "_a1");
        assert_eq!(assertion.issuer, "https://idp.example.com");
        let subject = assertion.subject.as_ref().unwrap();
        let name_id = subject.name_id.as_ref().unwrap();
        assert_eq!(name_id.value, "user-1");
        assert_eq!(name_id.format.as_deref(), Some(NameIdFormat::Persistent.uri()));

        let bearer: Vec<_> = assertion.bearer_confirmations().collect();
        assert_eq!(bearer.len(), 1);
        assert_eq!(bearer[0].method, confirmation_methods::BEARER);
        let data = bearer[0].data.as_ref().unwrap();
        assert_eq!(data.in_response_to.as_deref(), Some("_req1"));

        let conditions = assertion.conditions.as_ref().unwrap();
        assert_eq!(conditions.audience_restrictions[0].audiences, vec!["https://sp.example.org/"]);
        assert!(!conditions.one_time_use);

        assert_eq!(assertion.session_index(), Some("_s1"));
        assert_eq!(assertion.attributes[0].values.len(), 2);
    }

    #[test]
    fn missing_issuer_is_rejected() {
        let xml = ASSERTION.replace("<saml:Issuer>https://idp.example.com</saml:Issuer>", "");
        let doc = XmlDocument::parse(&xml).unwrap();
        assert!(Assertion::from_element(doc.root()).is_err());
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let xml = ASSERTION.replace("2024-05-01T12:05:00Z", "tomorrow");
        let doc = XmlDocument::parse(&xml).unwrap();
        assert!(matches!(
            Assertion::from_element(doc.root()),
            Err(DecodeError::InvalidValue { .. })
        ));
    }
}
