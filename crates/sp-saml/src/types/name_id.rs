//! Name identifiers.

use serde::{Deserialize, Serialize};

use super::{NameIdFormat, SAML_NS};
use crate::error::DecodeError;
use crate::xml::{XmlElement, escape};

/// SAML Name ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The identifier value.
    pub value: String,

    /// The format URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The security or administrative domain that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// The service provider's entity ID that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// Creates a name ID without a format.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    /// Sets the format.
    #[must_use]
    pub fn with_format(mut self, format: NameIdFormat) -> Self {
        self.format = Some(format.uri().to_string());
        self
    }

    /// Reads a `saml:NameID` element.
    pub(crate) fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        let value = el.trimmed_text();
        if value.is_empty() {
            return Err(DecodeError::missing("NameID value"));
        }
        Ok(Self {
            value,
            format: el.attribute("Format").map(str::to_string),
            name_qualifier: el.attribute("NameQualifier").map(str::to_string),
            sp_name_qualifier: el.attribute("SPNameQualifier").map(str::to_string),
        })
    }

    /// Renders a `saml:NameID` element. The `saml` prefix must be in scope.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut attrs = String::new();
        if let Some(ref format) = self.format {
            attrs.push_str(&format!(r#" Format="{}""#, escape(format)));
        }
        if let Some(ref qualifier) = self.name_qualifier {
            attrs.push_str(&format!(r#" NameQualifier="{}""#, escape(qualifier)));
        }
        if let Some(ref qualifier) = self.sp_name_qualifier {
            attrs.push_str(&format!(r#" SPNameQualifier="{}""#, escape(qualifier)));
        }
        format!("<saml:NameID{attrs}>{}</saml:NameID>", escape(&self.value))
    }

    /// Returns true if `el` is a `saml:NameID`.
    pub(crate) fn matches(el: &XmlElement) -> bool {
        el.is(SAML_NS, "NameID")
    }
}

/// Name ID policy sent in an `AuthnRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// Requested format.
    pub format: NameIdFormat,
    /// Whether the IdP may create a new identifier.
    pub allow_create: bool,
}

impl NameIdPolicy {
    /// Renders a `samlp:NameIDPolicy` element.
    #[must_use]
    pub fn to_xml(&self) -> String {
        format!(
            r#"<samlp:NameIDPolicy Format="{}" AllowCreate="{}"/>"#,
            self.format.uri(),
            self.allow_create
        )
    }
}
