//! SAML bindings implementation.
//!
//! - **HTTP-POST Binding**: messages are base64-encoded and sent in HTML forms
//! - **HTTP-Redirect Binding**: messages are deflated, base64-encoded and
//!   URL-encoded, with an optional detached signature over the query string
//!
//! Decoding applies the configured [`DecodeLimits`] before anything else
//! touches the payload, and always ends in the hardened XML parser.

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::EngineConfig;
use crate::error::DecodeError;
use crate::types::SamlBinding;
use crate::xml::{ParseLimits, XmlDocument};

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// A request (`AuthnRequest`, `LogoutRequest`).
    Request,
    /// A response (`Response`, `LogoutResponse`).
    Response,
}

impl SamlMessageType {
    /// Returns the form or query parameter name for this message type.
    #[must_use]
    pub const fn param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Size and depth limits for inbound payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum length of the encoded parameter.
    pub max_message_bytes: usize,
    /// Maximum size after inflating a redirect payload.
    pub max_inflated_bytes: usize,
    /// Maximum XML nesting depth.
    pub max_xml_depth: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for DecodeLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_message_bytes: config.max_message_bytes,
            max_inflated_bytes: config.max_inflated_bytes,
            max_xml_depth: config.max_xml_depth,
        }
    }
}

/// Detached signature parameters of an HTTP-Redirect message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignature {
    /// The octets that were signed, rebuilt from the raw query values.
    pub signed_query: String,
    /// The `SigAlg` URI.
    pub sig_alg: String,
    /// The base64 `Signature` value.
    pub signature: String,
}

/// A decoded inbound message.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// The parsed XML message.
    pub document: XmlDocument,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The binding the message arrived on.
    pub binding: SamlBinding,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// The detached signature, redirect binding only.
    pub redirect_signature: Option<RedirectSignature>,
}

impl DecodedMessage {
    /// Returns the decoded XML text.
    #[must_use]
    pub fn xml(&self) -> &str {
        self.document.source()
    }
}

/// Base64-decodes, optionally inflates, and parses an inbound payload.
pub(crate) fn decode_payload(
    encoded: &str,
    inflate: bool,
    limits: &DecodeLimits,
) -> Result<XmlDocument, DecodeError> {
    if encoded.len() > limits.max_message_bytes {
        return Err(DecodeError::TooLarge {
            limit: limits.max_message_bytes,
        });
    }

    // Spaces are a '+' lost to form decoding; line breaks come from wrapped
    // base64 written by some IdPs.
    let cleaned: String = encoded
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\t'))
        .map(|c| if c == ' ' { '+' } else { c })
        .collect();
    let bytes = STANDARD.decode(cleaned.as_bytes())?;

    let bytes = if inflate {
        redirect::inflate(&bytes, limits.max_inflated_bytes)?
    } else {
        bytes
    };

    let xml = String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)?;
    XmlDocument::parse_with_limits(
        &xml,
        ParseLimits {
            max_depth: limits.max_xml_depth,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_payload_is_rejected_before_decoding() {
        let limits = DecodeLimits {
            max_message_bytes: 8,
            ..DecodeLimits::default()
        };
        assert_eq!(
            decode_payload("not even base64!", false, &limits).unwrap_err(),
            DecodeError::TooLarge { limit: 8 }
        );
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let encoded = STANDARD.encode("<a>hello</a>");
        let wrapped = format!("{}\r\n{}", &encoded[..8], &encoded[8..]);
        let doc = decode_payload(&wrapped, false, &DecodeLimits::default()).unwrap();
        assert_eq!(doc.root().text(), "hello");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let encoded = STANDARD.encode([0x3c, 0xff, 0xfe]);
        assert_eq!(
            decode_payload(&encoded, false, &DecodeLimits::default()).unwrap_err(),
            DecodeError::Utf8
        );
    }

    #[test]
    fn doctype_is_rejected() {
        let encoded = STANDARD.encode(r#"<!DOCTYPE a [<!ENTITY x "boom">]><a>&x;</a>"#);
        assert_eq!(
            decode_payload(&encoded, false, &DecodeLimits::default()).unwrap_err(),
            DecodeError::DtdForbidden
        );
    }
}
