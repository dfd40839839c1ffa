//! Decoration of the GUI tree.
//!
//! A [`Mode`] decides what presentation-only nodes surround the mirror of
//! each data element. Decoration classes the caret engine relies on:
//!
//! - `_gui`: interactive widgets such as tag labels
//! - `_phantom`: pure presentation, no caret stops inside
//! - `_placeholder`: stand-in shown while an element has no editable content
//! - `_real`: the mirror of a data element

use serde::{Deserialize, Serialize};
use wed_dom::{NodeId, Tree};

use crate::errors::EditorResult;

pub const REAL: &str = "_real";
pub const GUI: &str = "_gui";
pub const PHANTOM: &str = "_phantom";
pub const PHANTOM_WRAP: &str = "_phantom_wrap";
pub const PLACEHOLDER: &str = "_placeholder";
pub const TRANSIENT: &str = "_transient";
pub const INVISIBLE: &str = "_invisible";
pub const LABEL: &str = "_label";
pub const START_LABEL: &str = "__start_label";
pub const END_LABEL: &str = "__end_label";
pub const START_WRAPPER: &str = "_start_wrapper";
pub const END_WRAPPER: &str = "_end_wrapper";
pub const ELEMENT_NAME: &str = "_element_name";
pub const ATTRIBUTE: &str = "_attribute";
pub const ATTRIBUTE_NAME: &str = "_attribute_name";
pub const ATTRIBUTE_VALUE: &str = "_attribute_value";
pub const VALIDATION_ERROR: &str = "_wed-validation-error";

/// Prefix of the GUI attributes that carry data attribute values.
pub const DATA_ATTRIBUTE_PREFIX: &str = "data-wed-";

/// How start labels present attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeMode {
    /// Attributes are not shown.
    #[default]
    Hide,
    /// Attributes are shown but not editable.
    Show,
    /// Attribute values are caret stops.
    Edit,
}

/// A start label built for a data element, plus the attribute value spans
/// that mirror data attribute nodes.
#[derive(Debug, Clone)]
pub struct Label {
    pub node: NodeId,
    pub attribute_values: Vec<(NodeId, NodeId)>,
}

/// GUI attribute name carrying the data attribute `name`.
pub fn encode_attribute_name(name: &str) -> String {
    format!("{}{}", DATA_ATTRIBUTE_PREFIX, name.replace(':', "---"))
}

pub fn decode_attribute_name(name: &str) -> Option<String> {
    name.strip_prefix(DATA_ATTRIBUTE_PREFIX)
        .map(|rest| rest.replace("---", ":"))
}

fn span(gui: &mut Tree, class: &str) -> EditorResult<NodeId> {
    let el = gui.create_element("span")?;
    gui.set_attribute(el, "class", class)?;
    Ok(el)
}

fn span_with_text(gui: &mut Tree, class: &str, text: &str) -> EditorResult<NodeId> {
    let el = span(gui, class)?;
    if !text.is_empty() {
        let t = gui.create_text(text)?;
        gui.append_child(el, t)?;
    }
    Ok(el)
}

pub trait Mode {
    /// Decoration before and after the editable contents of a GUI element.
    fn nodes_around_editable_contents(&self, gui: &Tree, el: NodeId) -> (Option<NodeId>, Option<NodeId>) {
        let first = gui.first_child(el).filter(|&c| gui.has_class(c, START_WRAPPER));
        let last = gui.last_child(el).filter(|&c| gui.has_class(c, END_WRAPPER));
        (first, last)
    }

    /// Build a detached placeholder for the GUI element `el`.
    fn make_placeholder_for(&self, gui: &mut Tree, _el: NodeId) -> EditorResult<NodeId> {
        span_with_text(gui, PLACEHOLDER, "\u{a0}")
    }

    /// Whether the mirror of `data_el` gets labels.
    fn decorates(&self, _data: &Tree, _data_el: NodeId) -> bool {
        true
    }

    fn start_label(&self, data: &Tree, data_el: NodeId, gui: &mut Tree, attributes: AttributeMode) -> EditorResult<Label>;

    fn end_label(&self, data: &Tree, data_el: NodeId, gui: &mut Tree) -> EditorResult<NodeId>;
}

/// Labels every element with its qualified name.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericMode;

impl GenericMode {
    pub fn new() -> Self {
        Self
    }
}

impl Mode for GenericMode {
    fn start_label(&self, data: &Tree, data_el: NodeId, gui: &mut Tree, attributes: AttributeMode) -> EditorResult<Label> {
        let class = format!("{} {} {} {}", GUI, START_WRAPPER, START_LABEL, LABEL);
        let label = span(gui, &class)?;
        let name = span_with_text(gui, ELEMENT_NAME, data.name(data_el).unwrap_or_default())?;
        gui.append_child(label, name)?;

        let mut attribute_values = Vec::new();
        if attributes != AttributeMode::Hide {
            for &attr in data.attributes(data_el) {
                let wrapper = span(gui, ATTRIBUTE)?;
                let attr_name = span_with_text(gui, ATTRIBUTE_NAME, data.name(attr).unwrap_or_default())?;
                let value = span_with_text(gui, ATTRIBUTE_VALUE, data.text(attr).unwrap_or_default())?;
                gui.append_child(wrapper, attr_name)?;
                gui.append_child(wrapper, value)?;
                gui.append_child(label, wrapper)?;
                if attributes == AttributeMode::Edit {
                    attribute_values.push((attr, value));
                }
            }
        }
        Ok(Label {
            node: label,
            attribute_values,
        })
    }

    fn end_label(&self, data: &Tree, data_el: NodeId, gui: &mut Tree) -> EditorResult<NodeId> {
        let class = format!("{} {} {} {}", GUI, END_WRAPPER, END_LABEL, LABEL);
        let label = span(gui, &class)?;
        let name = span_with_text(gui, ELEMENT_NAME, data.name(data_el).unwrap_or_default())?;
        gui.append_child(label, name)?;
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wed_dom::xml;

    #[test]
    fn test_start_label_lists_attributes_in_edit_mode() {
        let data = xml::parse("<doc a=\"1\" b=\"\"/>").unwrap();
        let doc = data.document_element().unwrap();
        let mut gui = Tree::new("div");
        let label = GenericMode.start_label(&data, doc, &mut gui, AttributeMode::Edit).unwrap();
        assert!(gui.has_class(label.node, START_LABEL));
        assert_eq!(label.attribute_values.len(), 2);
        assert_eq!(
            xml::serialize(&gui, label.node),
            "<span class=\"_gui _start_wrapper __start_label _label\">\
             <span class=\"_element_name\">doc</span>\
             <span class=\"_attribute\"><span class=\"_attribute_name\">a</span>\
             <span class=\"_attribute_value\">1</span></span>\
             <span class=\"_attribute\"><span class=\"_attribute_name\">b</span>\
             <span class=\"_attribute_value\"/></span></span>"
        );
    }

    #[test]
    fn test_hidden_attributes() {
        let data = xml::parse("<doc a=\"1\"/>").unwrap();
        let doc = data.document_element().unwrap();
        let mut gui = Tree::new("div");
        let label = GenericMode.start_label(&data, doc, &mut gui, AttributeMode::Hide).unwrap();
        assert_eq!(gui.child_count(label.node), 1);
        assert!(label.attribute_values.is_empty());
    }

    #[test]
    fn test_attribute_name_encoding() {
        assert_eq!(encode_attribute_name("xml:id"), "data-wed-xml---id");
        assert_eq!(decode_attribute_name("data-wed-xml---id").as_deref(), Some("xml:id"));
        assert_eq!(decode_attribute_name("class"), None);
    }
}
