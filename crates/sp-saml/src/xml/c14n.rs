//! Exclusive XML canonicalization (`http://www.w3.org/2001/10/xml-exc-c14n#`),
//! without comments.

use std::collections::BTreeMap;

use super::dom::{XmlAttribute, XmlElement, XmlNode};

/// Canonicalizes the subtree rooted at `element`.
///
/// `excluded` names one descendant to omit together with its subtree, which
/// is how the enveloped-signature transform removes the `Signature` element.
/// `inclusive_prefixes` is the `InclusiveNamespaces PrefixList`; `#default`
/// stands for the default namespace.
#[must_use]
pub fn canonicalize(
    element: &XmlElement,
    excluded: Option<&XmlElement>,
    inclusive_prefixes: &[String],
) -> String {
    let inclusive: Vec<&str> = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { "" } else { p.as_str() })
        .collect();
    let mut out = String::new();
    render(element, &BTreeMap::new(), excluded, &inclusive, &mut out);
    out
}

fn render(
    element: &XmlElement,
    rendered: &BTreeMap<String, String>,
    excluded: Option<&XmlElement>,
    inclusive: &[&str],
    out: &mut String,
) {
    // Namespaces visibly utilized by the element and its attributes.
    let mut needed: BTreeMap<&str, &str> = BTreeMap::new();
    needed.insert(
        element.prefix().unwrap_or(""),
        element.namespace().unwrap_or(""),
    );
    for attr in element.attributes() {
        if let (Some(prefix), Some(ns)) = (attr.prefix.as_deref(), attr.namespace.as_deref()) {
            if prefix != "xml" {
                needed.insert(prefix, ns);
            }
        }
    }
    for prefix in inclusive {
        if let Some(uri) = element.in_scope_namespaces().get(*prefix) {
            needed.entry(prefix).or_insert(uri.as_str());
        }
    }

    let mut declared: Vec<(&str, &str)> = Vec::new();
    for (prefix, uri) in needed {
        let current = rendered.get(prefix).map(String::as_str);
        let skip = if prefix.is_empty() {
            // xmlns="" is only output to undo a rendered non-empty default.
            current.unwrap_or("") == uri
        } else {
            current == Some(uri)
        };
        if !skip {
            declared.push((prefix, uri));
        }
    }

    let name = element.qualified_name();
    out.push('<');
    out.push_str(&name);
    for (prefix, uri) in &declared {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attribute(uri, out);
        out.push('"');
    }

    let mut attributes: Vec<&XmlAttribute> = element.attributes().iter().collect();
    attributes.sort_by(|a, b| {
        (a.namespace.as_deref().unwrap_or(""), a.local_name.as_str())
            .cmp(&(b.namespace.as_deref().unwrap_or(""), b.local_name.as_str()))
    });
    for attr in attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        escape_attribute(&attr.value, out);
        out.push('"');
    }
    out.push('>');

    let scope = if declared.is_empty() {
        None
    } else {
        let mut scope = rendered.clone();
        for (prefix, uri) in &declared {
            scope.insert((*prefix).to_string(), (*uri).to_string());
        }
        Some(scope)
    };
    let child_scope = scope.as_ref().unwrap_or(rendered);

    for child in element.children() {
        match child {
            XmlNode::Element(el) => {
                if excluded.is_some_and(|ex| std::ptr::eq(ex, el)) {
                    continue;
                }
                render(el, child_scope, excluded, inclusive, out);
            }
            XmlNode::Text(text) => escape_text(text, out),
            XmlNode::Comment(_) => {}
        }
    }

    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
