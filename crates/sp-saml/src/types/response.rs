//! SAML Response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Assertion, SAML_NS, SAMLP_NS, Status, expect_element, read_header};
use crate::error::DecodeError;
use crate::xml::XmlElement;

/// A `samlp:Response` delivered to the assertion consumer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// When the response was issued.
    pub issue_instant: DateTime<Utc>,

    /// Response issuer. Optional on the response itself.
    pub issuer: Option<String>,

    /// Where the response was sent.
    pub destination: Option<String>,

    /// Id of the request this response answers.
    pub in_response_to: Option<String>,

    /// Protocol status.
    pub status: Status,

    /// Plain assertions, in document order.
    pub assertions: Vec<Assertion>,

    /// Number of `EncryptedAssertion` elements, which this engine does not
    /// decrypt.
    pub encrypted_assertions: usize,
}

impl Response {
    /// Reads a `samlp:Response` element.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the element is not a response or is
    /// structurally incomplete.
    pub fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        expect_element(el, SAMLP_NS, "Response")?;
        let header = read_header(el)?;
        let status = el
            .first_child(SAMLP_NS, "Status")
            .ok_or_else(|| DecodeError::missing("Status"))
            .and_then(Status::from_element)?;
        let assertions = el
            .children_named(SAML_NS, "Assertion")
            .map(Assertion::from_element)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: header.id,
            issue_instant: header.issue_instant,
            issuer: header.issuer,
            destination: header.destination,
            in_response_to: el.attribute("InResponseTo").map(str::to_string),
            status,
            assertions,
            encrypted_assertions: el.children_named(SAML_NS, "EncryptedAssertion").count(),
        })
    }
}
