use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::XML_NAMESPACE;
use crate::error::DecodeError;

/// Limits applied while parsing untrusted input.
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    /// Maximum element nesting depth.
    pub max_depth: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

/// A parsed XML document with a single root element.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    source: String,
    root: XmlElement,
}

/// An attribute with its namespace resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Namespace URI for prefixed attributes.
    pub namespace: Option<String>,
    /// Normalised and unescaped value.
    pub value: String,
}

impl XmlAttribute {
    /// Returns the name as written in the source.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified(self.prefix.as_deref(), &self.local_name)
    }
}

/// A node in element content.
#[derive(Debug, Clone)]
pub enum XmlNode {
    /// A child element.
    Element(XmlElement),
    /// Character data, CDATA sections merged in.
    Text(String),
    /// A comment.
    Comment(String),
}

/// An element with its namespace context and source span.
#[derive(Debug, Clone)]
pub struct XmlElement {
    prefix: Option<String>,
    local_name: String,
    namespace: Option<String>,
    attributes: Vec<XmlAttribute>,
    in_scope: Arc<BTreeMap<String, String>>,
    children: Vec<XmlNode>,
    span: Range<usize>,
    content_start: usize,
}

impl XmlDocument {
    /// Parses a document with default limits.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the input is not a well-formed,
    /// namespace-valid document, or declares a DTD.
    pub fn parse(xml: &str) -> Result<Self, DecodeError> {
        Self::parse_with_limits(xml, ParseLimits::default())
    }

    /// Parses a document with explicit limits.
    ///
    /// # Errors
    ///
    /// See [`XmlDocument::parse`]. Also fails when nesting exceeds
    /// `limits.max_depth` or two elements share an `ID`.
    pub fn parse_with_limits(xml: &str, limits: ParseLimits) -> Result<Self, DecodeError> {
        let root = Parser::new(xml, limits).run()?;
        Ok(Self {
            source: xml.to_string(),
            root,
        })
    }

    /// Returns the root element.
    #[must_use]
    pub const fn root(&self) -> &XmlElement {
        &self.root
    }

    /// Returns the source text the document was parsed from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Finds the element whose `ID` attribute equals `id`.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&XmlElement> {
        self.root.descendants().find(|el| el.attribute("ID") == Some(id))
    }
}

impl XmlElement {
    /// Local name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Prefix as written.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Namespace URI.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Name as written in the source.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified(self.prefix.as_deref(), &self.local_name)
    }

    /// Returns true if this element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Attributes in document order, namespace declarations excluded.
    #[must_use]
    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    /// Value of an unqualified attribute.
    #[must_use]
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Value of a namespace-qualified attribute.
    #[must_use]
    pub fn attribute_ns(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Namespace bindings in scope at this element, keyed by prefix (`""` for
    /// the default namespace).
    #[must_use]
    pub fn in_scope_namespaces(&self) -> &BTreeMap<String, String> {
        &self.in_scope
    }

    /// All child nodes.
    #[must_use]
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Child elements with the given name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> {
        self.child_elements()
            .filter(move |el| el.is(namespace, local_name))
    }

    /// First child element with the given name.
    #[must_use]
    pub fn first_child(&self, namespace: &str, local_name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|el| el.is(namespace, local_name))
    }

    /// This element and all descendant elements, in document order.
    pub fn descendants(&self) -> impl Iterator<Item = &XmlElement> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            let children: Vec<&XmlElement> = next.child_elements().collect();
            stack.extend(children.into_iter().rev());
            Some(next)
        })
    }

    /// Concatenated direct text content.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Direct text content with surrounding whitespace removed.
    #[must_use]
    pub fn trimmed_text(&self) -> String {
        self.text().trim().to_string()
    }

    /// Byte range of the element in the source, start tag to end tag.
    #[must_use]
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Byte offset just past the start tag.
    #[must_use]
    pub const fn content_start(&self) -> usize {
        self.content_start
    }
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
    limits: ParseLimits,
    stack: Vec<XmlElement>,
    root: Option<XmlElement>,
    ids: HashSet<String>,
}

impl<'a> Parser<'a> {
    fn new(xml: &'a str, limits: ParseLimits) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            limits,
            stack: Vec::new(),
            root: None,
            ids: HashSet::new(),
        }
    }

    fn position(&self) -> usize {
        usize::try_from(self.reader.buffer_position()).unwrap_or(usize::MAX)
    }

    fn run(mut self) -> Result<XmlElement, DecodeError> {
        loop {
            let start = self.position();
            let event = self.reader.read_event()?;
            match event {
                Event::DocType(_) => return Err(DecodeError::DtdForbidden),
                Event::PI(_) => {
                    return Err(DecodeError::MalformedXml(
                        "processing instructions are not supported".to_string(),
                    ));
                }
                Event::Decl(_) => {
                    if self.root.is_some() || !self.stack.is_empty() {
                        return Err(DecodeError::MalformedXml(
                            "XML declaration must start the document".to_string(),
                        ));
                    }
                }
                Event::Start(e) => {
                    let end = self.position();
                    let element = self.open(&e, start..end)?;
                    self.stack.push(element);
                }
                Event::Empty(e) => {
                    let end = self.position();
                    let element = self.open(&e, start..end)?;
                    self.attach(XmlNode::Element(element))?;
                }
                Event::End(_) => {
                    let end = self.position();
                    let mut element = self.stack.pop().ok_or_else(|| {
                        DecodeError::MalformedXml("unexpected end tag".to_string())
                    })?;
                    element.span.end = end;
                    self.attach(XmlNode::Element(element))?;
                }
                Event::Text(t) => {
                    let raw = std::str::from_utf8(&t).map_err(|_| DecodeError::Utf8)?;
                    if self.stack.is_empty() {
                        if !raw.trim().is_empty() {
                            return Err(DecodeError::MalformedXml(
                                "text outside the root element".to_string(),
                            ));
                        }
                        continue;
                    }
                    let normalized = normalize_newlines(raw);
                    let text = quick_xml::escape::unescape(&normalized)
                        .map_err(|e| DecodeError::MalformedXml(e.to_string()))?;
                    self.push_text(&text);
                }
                Event::CData(c) => {
                    if self.stack.is_empty() {
                        return Err(DecodeError::MalformedXml(
                            "CDATA outside the root element".to_string(),
                        ));
                    }
                    let raw = std::str::from_utf8(&c).map_err(|_| DecodeError::Utf8)?;
                    self.push_text(&normalize_newlines(raw));
                }
                Event::Comment(c) => {
                    if let Some(parent) = self.stack.last_mut() {
                        let raw = std::str::from_utf8(&c).map_err(|_| DecodeError::Utf8)?;
                        parent.children.push(XmlNode::Comment(raw.to_string()));
                    }
                }
                Event::Eof => break,
            }
        }

        if !self.stack.is_empty() {
            return Err(DecodeError::MalformedXml("unclosed element".to_string()));
        }
        self.root
            .ok_or_else(|| DecodeError::MalformedXml("document has no root element".to_string()))
    }

    fn open(&mut self, e: &BytesStart<'_>, tag: Range<usize>) -> Result<XmlElement, DecodeError> {
        if self.stack.len() >= self.limits.max_depth {
            return Err(DecodeError::MalformedXml(format!(
                "nesting exceeds {} levels",
                self.limits.max_depth
            )));
        }
        if self.stack.is_empty() && self.root.is_some() {
            return Err(DecodeError::MalformedXml(
                "document has more than one root element".to_string(),
            ));
        }

        let parent_scope = self
            .stack
            .last()
            .map_or_else(|| Arc::new(BTreeMap::new()), |p| Arc::clone(&p.in_scope));

        let mut declarations = Vec::new();
        let mut raw_attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| DecodeError::MalformedXml(err.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref()).map_err(|_| DecodeError::Utf8)?;
            let raw = std::str::from_utf8(&attr.value).map_err(|_| DecodeError::Utf8)?;
            let value = normalize_attribute(raw)?;
            if key == "xmlns" {
                declarations.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                if value.is_empty() {
                    return Err(DecodeError::MalformedXml(format!(
                        "prefix '{prefix}' bound to an empty namespace"
                    )));
                }
                declarations.push((prefix.to_string(), value));
            } else {
                raw_attributes.push((key.to_string(), value));
            }
        }

        let in_scope = if declarations.is_empty() {
            parent_scope
        } else {
            let mut scope = (*parent_scope).clone();
            for (prefix, uri) in declarations {
                scope.insert(prefix, uri);
            }
            Arc::new(scope)
        };

        let name = std::str::from_utf8(e.name().as_ref())
            .map_err(|_| DecodeError::Utf8)?
            .to_string();
        let (prefix, local_name) = split_name(&name);
        let namespace = match prefix.as_deref() {
            Some(p) => Some(resolve(&in_scope, p)?),
            None => in_scope.get("").filter(|uri| !uri.is_empty()).cloned(),
        };

        let mut attributes = Vec::with_capacity(raw_attributes.len());
        for (key, value) in raw_attributes {
            let (attr_prefix, attr_local) = split_name(&key);
            let attr_namespace = match attr_prefix.as_deref() {
                Some(p) => Some(resolve(&in_scope, p)?),
                None => None,
            };
            if attr_namespace.is_none() && attr_local == "ID" && !self.ids.insert(value.clone()) {
                return Err(DecodeError::MalformedXml(format!("duplicate ID '{value}'")));
            }
            attributes.push(XmlAttribute {
                prefix: attr_prefix,
                local_name: attr_local,
                namespace: attr_namespace,
                value,
            });
        }

        Ok(XmlElement {
            prefix,
            local_name,
            namespace,
            attributes,
            in_scope,
            children: Vec::new(),
            content_start: tag.end,
            span: tag,
        })
    }

    fn attach(&mut self, node: XmlNode) -> Result<(), DecodeError> {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => match node {
                XmlNode::Element(el) => {
                    if self.root.is_some() {
                        return Err(DecodeError::MalformedXml(
                            "document has more than one root element".to_string(),
                        ));
                    }
                    self.root = Some(el);
                }
                _ => {
                    return Err(DecodeError::MalformedXml(
                        "content outside the root element".to_string(),
                    ));
                }
            },
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) {
        if let Some(parent) = self.stack.last_mut() {
            if let Some(XmlNode::Text(existing)) = parent.children.last_mut() {
                existing.push_str(text);
            } else {
                parent.children.push(XmlNode::Text(text.to_string()));
            }
        }
    }
}

fn split_name(name: &str) -> (Option<String>, String) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, name.to_string()),
    }
}

fn resolve(scope: &BTreeMap<String, String>, prefix: &str) -> Result<String, DecodeError> {
    if prefix == "xml" {
        return Ok(XML_NAMESPACE.to_string());
    }
    scope
        .get(prefix)
        .cloned()
        .ok_or_else(|| DecodeError::MalformedXml(format!("unbound namespace prefix '{prefix}'")))
}

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Attribute-value normalisation for CDATA-typed attributes: literal
/// whitespace characters become spaces before references are expanded.
fn normalize_attribute(raw: &str) -> Result<String, DecodeError> {
    let spaced: String = normalize_newlines(raw)
        .chars()
        .map(|c| if matches!(c, '\t' | '\n') { ' ' } else { c })
        .collect();
    quick_xml::escape::unescape(&spaced)
        .map(|v| v.into_owned())
        .map_err(|e| DecodeError::MalformedXml(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMLP: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
    const SAML: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

    #[test]
    fn resolves_prefixes_and_default_namespace() {
        let doc = XmlDocument::parse(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r1"><Issuer xmlns="urn:oasis:names:tc:SAML:2.0:assertion">idp</Issuer></samlp:Response>"#,
        )
        .unwrap();
        let root = doc.root();
        assert!(root.is(SAMLP, "Response"));
        assert_eq!(root.qualified_name(), "samlp:Response");
        let issuer = root.first_child(SAML, "Issuer").unwrap();
        assert_eq!(issuer.prefix(), None);
        assert_eq!(issuer.text(), "idp");
        assert_eq!(doc.find_by_id("_r1").map(XmlElement::local_name), Some("Response"));
    }

    #[test]
    fn rejects_doctype() {
        let xml = r#"<?xml version="1.0"?><!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><foo>&xxe;</foo>"#;
        assert_eq!(XmlDocument::parse(xml).unwrap_err(), DecodeError::DtdForbidden);
    }

    #[test]
    fn rejects_unknown_entities() {
        assert!(XmlDocument::parse("<a>&bogus;</a>").is_err());
    }

    #[test]
    fn rejects_unbound_prefix() {
        let err = XmlDocument::parse("<x:a/>").unwrap_err();
        assert!(err.to_string().contains("unbound"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = XmlDocument::parse(r#"<a ID="_1"><b ID="_1"/></a>"#).unwrap_err();
        assert!(err.to_string().contains("duplicate ID"));
    }

    #[test]
    fn rejects_excessive_depth() {
        let deep = format!("{}{}", "<a>".repeat(20), "</a>".repeat(20));
        assert!(XmlDocument::parse_with_limits(&deep, ParseLimits { max_depth: 10 }).is_err());
        assert!(XmlDocument::parse(&deep).is_ok());
    }

    #[test]
    fn rejects_trailing_garbage_and_multiple_roots() {
        assert!(XmlDocument::parse("<a/><b/>").is_err());
        assert!(XmlDocument::parse("<a/>text").is_err());
        assert!(XmlDocument::parse("<a>").is_err());
        assert!(XmlDocument::parse("").is_err());
    }

    #[test]
    fn records_spans() {
        let xml = r#"<a x="1"><b>t</b><c/></a>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let root = doc.root();
        assert_eq!(root.span(), 0..xml.len());
        assert_eq!(&xml[..root.content_start()], r#"<a x="1">"#);
        let b = root.child_elements().next().unwrap();
        assert_eq!(&xml[b.span()], "<b>t</b>");
        let c = root.child_elements().nth(1).unwrap();
        assert_eq!(&xml[c.span()], "<c/>");
    }

    #[test]
    fn normalises_text_and_attributes() {
        let doc = XmlDocument::parse("<a v=\"x\ty&#10;z\">l1\r\nl2 &amp; <![CDATA[<raw>]]></a>").unwrap();
        assert_eq!(doc.root().attribute("v"), Some("x y\nz"));
        assert_eq!(doc.root().text(), "l1\nl2 & <raw>");
    }
}
