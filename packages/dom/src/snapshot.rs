//! Owned structural copies of subtrees.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSnapshot {
    pub name: String,
    pub ns: String,
    pub value: String,
}

/// A deep copy of an element or text node that does not borrow any tree.
/// Undo entries keep these so a removed node can be re-created after the
/// original has been mutated or moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum NodeSnapshot {
    Element {
        name: String,
        ns: String,
        attributes: Vec<AttributeSnapshot>,
        children: Vec<NodeSnapshot>,
    },
    Text(String),
}

impl NodeSnapshot {
    pub fn is_text(&self) -> bool {
        matches!(self, NodeSnapshot::Text(_))
    }

    /// Element name, `None` for text.
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeSnapshot::Element { name, .. } => Some(name),
            NodeSnapshot::Text(_) => None,
        }
    }

    /// Concatenated text of the subtree, in document order.
    pub fn text_content(&self) -> String {
        match self {
            NodeSnapshot::Text(data) => data.clone(),
            NodeSnapshot::Element { children, .. } => children.iter().map(NodeSnapshot::text_content).collect(),
        }
    }
}
