//! HTTP-POST Binding implementation.
//!
//! Sends SAML messages base64-encoded in an auto-submitting HTML form.
//! Signatures travel inside the XML.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{DecodeLimits, DecodedMessage, SamlMessageType, decode_payload};
use crate::error::DecodeError;
use crate::types::SamlBinding;
use crate::xml::escape;

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Encodes a message as an HTML form that auto-submits to `destination`.
    #[must_use]
    pub fn encode(
        xml: &str,
        destination: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
    ) -> String {
        let encoded = STANDARD.encode(xml);
        let relay_state_input = relay_state
            .map(|rs| {
                format!(
                    r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                    escape(rs)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            escape(destination),
            message_type.param(),
            encoded,
            relay_state_input
        )
    }

    /// Decodes a message from already URL-decoded form fields.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if no SAML field is present, or the payload
    /// fails any decoding step or limit.
    pub fn decode(
        form: &HashMap<String, String>,
        limits: &DecodeLimits,
    ) -> Result<DecodedMessage, DecodeError> {
        let (message_type, encoded) = if let Some(v) = form.get("SAMLRequest") {
            (SamlMessageType::Request, v)
        } else if let Some(v) = form.get("SAMLResponse") {
            (SamlMessageType::Response, v)
        } else {
            return Err(DecodeError::MissingParameter("SAMLRequest or SAMLResponse"));
        };

        Ok(DecodedMessage {
            document: decode_payload(encoded, false, limits)?,
            message_type,
            binding: SamlBinding::HttpPost,
            relay_state: form.get("RelayState").cloned(),
            redirect_signature: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(html: &str, name: &str) -> String {
        let marker = format!(r#"name="{name}" value=""#);
        let start = html.find(&marker).unwrap() + marker.len();
        let end = html[start..].find('"').unwrap();
        html[start..start + end].to_string()
    }

    #[test]
    fn encode_and_decode_response() {
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r">test</samlp:Response>"#;
        let html = HttpPostBinding::encode(
            xml,
            "https://sp.example.org/Saml2/Acs",
            SamlMessageType::Response,
            Some("state123"),
        );
        assert!(html.contains(r#"action="https://sp.example.org/Saml2/Acs""#));

        let form = HashMap::from([
            ("SAMLResponse".to_string(), field(&html, "SAMLResponse")),
            ("RelayState".to_string(), field(&html, "RelayState")),
        ]);
        let decoded = HttpPostBinding::decode(&form, &DecodeLimits::default()).unwrap();
        assert_eq!(decoded.xml(), xml);
        assert_eq!(decoded.message_type, SamlMessageType::Response);
        assert_eq!(decoded.binding, SamlBinding::HttpPost);
        assert_eq!(decoded.relay_state.as_deref(), Some("state123"));
    }

    #[test]
    fn destination_and_relay_state_are_escaped() {
        let html = HttpPostBinding::encode(
            "<a/>",
            r#"https://idp.example.com/"><script>"#,
            SamlMessageType::Request,
            Some(r#""><script>alert(1)</script>"#),
        );
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn decode_missing_message() {
        let form = HashMap::new();
        assert!(HttpPostBinding::decode(&form, &DecodeLimits::default()).is_err());
    }

    #[test]
    fn malformed_xml_is_rejected() {
        let form = HashMap::from([(
            "SAMLResponse".to_string(),
            STANDARD.encode("<samlp:Response>"),
        )]);
        assert!(matches!(
            HttpPostBinding::decode(&form, &DecodeLimits::default()).unwrap_err(),
            DecodeError::MalformedXml(_)
        ));
    }
}
