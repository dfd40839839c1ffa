//! # XML Loading and Serialization
//!
//! [`parse`] builds a [`Tree`] whose root element wraps the document
//! element, so the document element's path is `"0"`. Namespaces declared
//! with `xmlns` attributes are resolved onto elements and prefixed
//! attributes; the declarations themselves are kept as attributes so the
//! document serializes back faithfully.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{DomError, DomResult};
use crate::node::{NodeId, Tree};
use crate::tokenizer::{parse_start_tag, tokenize, XmlToken};

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

/// Name given to the wrapper element at the root of parsed trees.
pub const DOCUMENT_ROOT: &str = "#document";

fn decode_entities(pos: usize, text: &str) -> DomResult<String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let semi = rest[amp..]
            .find(';')
            .ok_or_else(|| DomError::xml(pos, "unterminated entity reference"))?;
        let entity = &rest[amp + 1..amp + semi];
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| DomError::xml(pos, format!("unknown entity &{};", entity)))?
            }
        };
        out.push(decoded);
        rest = &rest[amp + semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

struct Scope {
    element: NodeId,
    name: String,
    prefixes: HashMap<String, String>,
}

fn resolve(scopes: &[Scope], prefix: &str) -> Option<String> {
    match prefix {
        "xml" => Some(XML_NS.to_string()),
        "xmlns" => Some(XMLNS_NS.to_string()),
        _ => scopes
            .iter()
            .rev()
            .find_map(|scope| scope.prefixes.get(prefix).cloned()),
    }
}

/// Parse an XML document into a new tree.
pub fn parse(source: &str) -> DomResult<Tree> {
    let mut tree = Tree::new(DOCUMENT_ROOT);
    let root = tree.root();
    let mut scopes: Vec<Scope> = Vec::new();

    for token in tokenize(source) {
        let (token, span) = token.map_err(|pos| DomError::xml(pos, "unrecognised markup"))?;
        let parent = scopes.last().map_or(root, |scope| scope.element);
        match token {
            XmlToken::ProcessingInstruction | XmlToken::Comment | XmlToken::Doctype => {}
            XmlToken::Text(text) | XmlToken::CData(text) => {
                if scopes.is_empty() {
                    if text.trim().is_empty() {
                        continue;
                    }
                    return Err(DomError::xml(span.start, "text outside of the document element"));
                }
                let data = if matches!(token, XmlToken::CData(_)) {
                    text.to_string()
                } else {
                    decode_entities(span.start, text)?
                };
                match tree.last_child(parent).filter(|&last| tree.is_text(last)) {
                    Some(last) => {
                        let merged = format!("{}{}", tree.text(last).unwrap_or_default(), data);
                        tree.set_text(last, &merged)?;
                    }
                    None => {
                        let node = tree.create_text(&data)?;
                        tree.append_child(parent, node)?;
                    }
                }
            }
            XmlToken::StartTag(tag) => {
                if scopes.is_empty() && tree.child_count(root) > 0 {
                    return Err(DomError::xml(span.start, "more than one document element"));
                }
                let tag = parse_start_tag(tag);
                let mut prefixes = HashMap::new();
                for &(name, value) in &tag.attributes {
                    if name == "xmlns" {
                        prefixes.insert(String::new(), decode_entities(span.start, value)?);
                    } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                        prefixes.insert(prefix.to_string(), decode_entities(span.start, value)?);
                    }
                }
                scopes.push(Scope {
                    element: root,
                    name: tag.name.to_string(),
                    prefixes,
                });

                let (prefix, _) = tag.name.split_once(':').unwrap_or(("", tag.name));
                let ns = match prefix {
                    "" => resolve(&scopes, prefix).unwrap_or_default(),
                    _ => resolve(&scopes, prefix).ok_or_else(|| {
                        DomError::xml(span.start, format!("unbound prefix in {}", tag.name))
                    })?,
                };
                let el = tree.create_element_ns(&ns, tag.name)?;
                for &(name, value) in &tag.attributes {
                    let attr_ns = if name == "xmlns" {
                        XMLNS_NS.to_string()
                    } else {
                        match name.split_once(':') {
                            Some((prefix, _)) => resolve(&scopes, prefix).ok_or_else(|| {
                                DomError::xml(span.start, format!("unbound prefix in {}", name))
                            })?,
                            None => String::new(),
                        }
                    };
                    let value = decode_entities(span.start, value)?;
                    tree.set_attribute_ns(el, &attr_ns, name, Some(&value))?;
                }
                tree.append_child(parent, el)?;

                if tag.self_closing {
                    scopes.pop();
                } else if let Some(scope) = scopes.last_mut() {
                    scope.element = el;
                }
            }
            XmlToken::EndTag(name) => match scopes.pop() {
                Some(scope) if scope.name == name => {}
                Some(scope) => {
                    return Err(DomError::xml(
                        span.start,
                        format!("expected </{}>, found </{}>", scope.name, name),
                    ))
                }
                None => return Err(DomError::xml(span.start, format!("unexpected </{}>", name))),
            },
        }
    }

    if let Some(scope) = scopes.last() {
        return Err(DomError::xml(source.len(), format!("unclosed element <{}>", scope.name)));
    }
    if tree.child_count(root) == 0 {
        return Err(DomError::xml(0, "no document element"));
    }
    debug!(nodes = tree.len(), "Parsed XML document");
    Ok(tree)
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn write_node(tree: &Tree, node: NodeId, out: &mut String) {
    if tree.is_text(node) {
        escape_text(tree.text(node).unwrap_or_default(), out);
        return;
    }
    if !tree.is_element(node) {
        return;
    }
    let name = tree.name(node).unwrap_or_default();
    out.push('<');
    out.push_str(name);
    for &attr in tree.attributes(node) {
        out.push(' ');
        out.push_str(tree.name(attr).unwrap_or_default());
        out.push_str("=\"");
        escape_attribute(tree.text(attr).unwrap_or_default(), out);
        out.push('"');
    }
    if tree.child_count(node) == 0 {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for &child in tree.children(node) {
        write_node(tree, child, out);
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Serialize `node` and its subtree.
pub fn serialize(tree: &Tree, node: NodeId) -> String {
    let mut out = String::new();
    write_node(tree, node, &mut out);
    out
}

/// Serialize the children of `node`.
pub fn inner_xml(tree: &Tree, node: NodeId) -> String {
    let mut out = String::new();
    for &child in tree.children(node) {
        write_node(tree, child, &mut out);
    }
    out
}
