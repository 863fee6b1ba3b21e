//! Protocol status.

use serde::{Deserialize, Serialize};

use super::{SAMLP_NS, status_codes};
use crate::error::DecodeError;
use crate::xml::{XmlElement, escape};

/// SAML protocol status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Top-level status code URI.
    pub code: String,

    /// Nested status code URI, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_code: Option<String>,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: status_codes::SUCCESS.to_string(),
            sub_code: None,
            message: None,
        }
    }

    /// Creates a responder error with a second-level code.
    #[must_use]
    pub fn responder(sub_code: &str) -> Self {
        Self {
            code: status_codes::RESPONDER.to_string(),
            sub_code: Some(sub_code.to_string()),
            message: None,
        }
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == status_codes::SUCCESS
    }

    /// Reads a `samlp:Status` element.
    pub(crate) fn from_element(el: &XmlElement) -> Result<Self, DecodeError> {
        let code_el = el
            .first_child(SAMLP_NS, "StatusCode")
            .ok_or_else(|| DecodeError::missing("StatusCode"))?;
        let code = code_el
            .attribute("Value")
            .ok_or_else(|| DecodeError::missing("StatusCode Value"))?
            .to_string();
        let sub_code = code_el
            .first_child(SAMLP_NS, "StatusCode")
            .and_then(|sub| sub.attribute("Value"))
            .map(str::to_string);
        let message = el
            .first_child(SAMLP_NS, "StatusMessage")
            .map(XmlElement::trimmed_text);
        Ok(Self {
            code,
            sub_code,
            message,
        })
    }

    /// Renders a `samlp:Status` element.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let inner = self.sub_code.as_ref().map_or_else(String::new, |sub| {
            format!(r#"<samlp:StatusCode Value="{}"/>"#, escape(sub))
        });
        let message = self.message.as_ref().map_or_else(String::new, |m| {
            format!("<samlp:StatusMessage>{}</samlp:StatusMessage>", escape(m))
        });
        format!(
            r#"<samlp:Status><samlp:StatusCode Value="{}">{inner}</samlp:StatusCode>{message}</samlp:Status>"#,
            escape(&self.code)
        )
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}
