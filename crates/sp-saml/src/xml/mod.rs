//! XML handling for protocol messages.
//!
//! Messages are parsed into an owned tree ([`XmlDocument`]) that keeps what
//! signature verification needs: namespace prefixes and scopes, attribute
//! order, text exactly as written, and the byte span of every element in the
//! source. The parser never resolves DTDs or external entities; a document
//! with a `DOCTYPE` is rejected outright.

mod c14n;
mod dom;

pub use c14n::canonicalize;
pub use dom::{ParseLimits, XmlAttribute, XmlDocument, XmlElement, XmlNode};

/// The namespace bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Escapes text for use in element content or a double-quoted attribute.
#[must_use]
pub fn escape(value: &str) -> std::borrow::Cow<'_, str> {
    quick_xml::escape::escape(value)
}
