//! SAML 2.0 protocol messages as seen by a service provider.
//!
//! Outbound messages (`AuthnRequest`, `LogoutRequest`, `LogoutResponse`)
//! render themselves to XML. Inbound messages are read from a parsed
//! [`XmlElement`]; reading performs structural checks only, semantic
//! validation happens in [`crate::validation`].

mod assertion;
mod authn_request;
mod constants;
mod logout;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use logout::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::DecodeError;
use crate::xml::XmlElement;

pub(crate) fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_instant(field: &str, value: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DecodeError::invalid(field, value))
}

pub(crate) fn optional_instant(
    el: &XmlElement,
    name: &str,
) -> Result<Option<DateTime<Utc>>, DecodeError> {
    el.attribute(name).map(|v| parse_instant(name, v)).transpose()
}

pub(crate) fn required_attribute<'a>(
    el: &'a XmlElement,
    name: &str,
) -> Result<&'a str, DecodeError> {
    el.attribute(name)
        .ok_or_else(|| DecodeError::missing(format!("{} attribute on {}", name, el.local_name())))
}

pub(crate) fn expect_element(
    el: &XmlElement,
    namespace: &str,
    local_name: &str,
) -> Result<(), DecodeError> {
    if el.is(namespace, local_name) {
        Ok(())
    } else {
        Err(DecodeError::UnexpectedMessage {
            expected: local_name.to_string(),
            found: el.qualified_name(),
        })
    }
}

pub(crate) fn check_version(el: &XmlElement) -> Result<(), DecodeError> {
    match required_attribute(el, "Version")? {
        SAML_VERSION => Ok(()),
        other => Err(DecodeError::invalid("Version", other)),
    }
}

pub(crate) fn issuer_of(el: &XmlElement) -> Option<String> {
    el.first_child(SAML_NS, "Issuer").map(XmlElement::trimmed_text)
}

/// Common protocol-message header fields.
pub(crate) struct MessageHeader {
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: Option<String>,
    pub destination: Option<String>,
}

pub(crate) fn read_header(el: &XmlElement) -> Result<MessageHeader, DecodeError> {
    check_version(el)?;
    Ok(MessageHeader {
        id: required_attribute(el, "ID")?.to_string(),
        issue_instant: parse_instant("IssueInstant", required_attribute(el, "IssueInstant")?)?,
        issuer: issuer_of(el),
        destination: el.attribute("Destination").map(str::to_string),
    })
}
