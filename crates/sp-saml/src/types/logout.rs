//! Single logout messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    NameId, SAML_NS, SAMLP_NS, Status, expect_element, format_instant, optional_instant,
    read_header,
};
use crate::error::DecodeError;
use crate::xml::{XmlElement, escape};

/// A `samlp:LogoutRequest`, sent or received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the requester.
    pub issuer: String,

    /// The URL where this request was sent.
    pub destination: Option<String>,

    /// The principal to log out.
    pub name_id: NameId,

    /// Session indexes to terminate.
    pub session_indexes: Vec<String>,

    /// Reason URI.
    pub reason: Option<String>,

    /// Time after which the request is no longer valid.
    pub not_on_or_after: Option<DateTime<Utc>>,
}

impl LogoutRequest {
    /// User logout reason.
    pub const REASON_USER: &'static str = "urn:oasis:names:tc:SAML:2.0:logout:user";

    /// Creates a request with a fresh id and the current time.
    #[must_use]
    pub fn new(issuer: impl Into<String>, destination: impl Into<String>, name_id: NameId) -> Self {
        Self {
            id: sp_crypto::random::generate_message_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: Some(destination.into()),
            name_id,
            session_indexes: Vec::new(),
            reason: Some(Self::REASON_USER.to_string()),
            not_on_or_after: None,
        }
    }

    /// Adds a session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }

    /// Reads a `samlp:LogoutRequest` element.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if required parts are missing.
    pub fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        expect_element(el, SAMLP_NS, "LogoutRequest")?;
        let header = read_header(el)?;
        let name_id = el
            .child_elements()
            .find(|c| NameId::matches(c))
            .ok_or_else(|| DecodeError::missing("LogoutRequest NameID"))
            .and_then(NameId::from_element)?;
        Ok(Self {
            id: header.id,
            issue_instant: header.issue_instant,
            issuer: header
                .issuer
                .ok_or_else(|| DecodeError::missing("LogoutRequest Issuer"))?,
            destination: header.destination,
            name_id,
            session_indexes: el
                .children_named(SAMLP_NS, "SessionIndex")
                .map(XmlElement::trimmed_text)
                .collect(),
            reason: el.attribute("Reason").map(str::to_string),
            not_on_or_after: optional_instant(el, "NotOnOrAfter")?,
        })
    }

    /// Renders the request as XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut attrs = String::new();
        if let Some(ref destination) = self.destination {
            attrs.push_str(&format!(r#" Destination="{}""#, escape(destination)));
        }
        if let Some(ref reason) = self.reason {
            attrs.push_str(&format!(r#" Reason="{}""#, escape(reason)));
        }
        if let Some(not_on_or_after) = self.not_on_or_after {
            attrs.push_str(&format!(r#" NotOnOrAfter="{}""#, format_instant(not_on_or_after)));
        }
        let sessions: String = self
            .session_indexes
            .iter()
            .map(|s| format!("<samlp:SessionIndex>{}</samlp:SessionIndex>", escape(s)))
            .collect();
        format!(
            r#"<samlp:LogoutRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="2.0" IssueInstant="{}"{attrs}><saml:Issuer>{}</saml:Issuer>{}{sessions}</samlp:LogoutRequest>"#,
            escape(&self.id),
            format_instant(self.issue_instant),
            escape(&self.issuer),
            self.name_id.to_xml(),
        )
    }
}

/// A `samlp:LogoutResponse`, sent or received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the responder.
    pub issuer: String,

    /// The URL where this response was sent.
    pub destination: Option<String>,

    /// Id of the request this response answers.
    pub in_response_to: Option<String>,

    /// Outcome.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a response to `request_id` with a fresh id.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        destination: impl Into<String>,
        request_id: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            id: sp_crypto::random::generate_message_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: Some(destination.into()),
            in_response_to: Some(request_id.into()),
            status,
        }
    }

    /// Reads a `samlp:LogoutResponse` element.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if required parts are missing.
    pub fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        expect_element(el, SAMLP_NS, "LogoutResponse")?;
        let header = read_header(el)?;
        let status = el
            .first_child(SAMLP_NS, "Status")
            .ok_or_else(|| DecodeError::missing("Status"))
            .and_then(Status::from_element)?;
        Ok(Self {
            id: header.id,
            issue_instant: header.issue_instant,
            issuer: header
                .issuer
                .ok_or_else(|| DecodeError::missing("LogoutResponse Issuer"))?,
            destination: header.destination,
            in_response_to: el.attribute("InResponseTo").map(str::to_string),
            status,
        })
    }

    /// Renders the response as XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut attrs = String::new();
        if let Some(ref destination) = self.destination {
            attrs.push_str(&format!(r#" Destination="{}""#, escape(destination)));
        }
        if let Some(ref in_response_to) = self.in_response_to {
            attrs.push_str(&format!(r#" InResponseTo="{}""#, escape(in_response_to)));
        }
        format!(
            r#"<samlp:LogoutResponse xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="2.0" IssueInstant="{}"{attrs}><saml:Issuer>{}</saml:Issuer>{}</samlp:LogoutResponse>"#,
            escape(&self.id),
            format_instant(self.issue_instant),
            escape(&self.issuer),
            self.status.to_xml(),
        )
    }
}
