//! # Node Arena
//!
//! A DOM-like tree stored in a flat arena. Nodes are addressed by
//! [`NodeId`]; a node id stays valid for the lifetime of its [`Tree`] even
//! after the node is detached, which lets undo entries, mirror maps and
//! locations name nodes without owning them.
//!
//! The arena never frees slots. Detached nodes simply stop being reachable
//! from the root.
//!
//! Three node kinds exist:
//!
//! - elements, with a qualified name, a namespace URI, attribute nodes and
//!   an ordered child list
//! - text nodes, holding character data
//! - attribute nodes, owned by exactly one element
//!
//! Text offsets are counted in Unicode scalar values.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

use crate::error::{DomError, DomResult};
use crate::snapshot::{AttributeSnapshot, NodeSnapshot};

static NEXT_TREE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of one tree. Locations carry it so that a location is never
/// interpreted against the wrong tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeId(u32);

impl TreeId {
    fn fresh() -> Self {
        TreeId(NEXT_TREE_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Stable handle to a node inside a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Element,
    Text,
    Attribute,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        name: String,
        ns: String,
        attributes: Vec<NodeId>,
        children: Vec<NodeId>,
    },
    Text(String),
    Attribute {
        name: String,
        ns: String,
        value: String,
    },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    /// Parent element, or owner element for attributes.
    parent: Option<NodeId>,
}

/// Number of characters in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the character boundary `index` in `s`, clamped to the end.
pub fn byte_offset(s: &str, index: usize) -> usize {
    s.char_indices().nth(index).map(|(i, _)| i).unwrap_or(s.len())
}

/// Split `s` at a character index.
pub fn split_chars(s: &str, index: usize) -> (&str, &str) {
    s.split_at(byte_offset(s, index))
}

fn next_id(len: usize) -> DomResult<NodeId> {
    u32::try_from(len).map(NodeId).map_err(|_| DomError::TreeFull(len))
}

#[derive(Debug, Clone)]
pub struct Tree {
    id: TreeId,
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Create a tree whose root is an element named `root_name`.
    pub fn new(root_name: &str) -> Self {
        let root = Node {
            kind: NodeKind::Element {
                name: root_name.to_string(),
                ns: String::new(),
                attributes: Vec::new(),
                children: Vec::new(),
            },
            parent: None,
        };
        Self {
            id: TreeId::fresh(),
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The first child of the root, which holds the document element for
    /// data trees.
    pub fn document_element(&self) -> Option<NodeId> {
        self.first_child(self.root)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Slots are never reclaimed, so ids run out after `u32::MAX` nodes.
    fn push(&mut self, kind: NodeKind) -> DomResult<NodeId> {
        let id = next_id(self.nodes.len())?;
        self.nodes.push(Node { kind, parent: None });
        Ok(id)
    }

    fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.nodes.get(id.index()).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.nodes.get_mut(id.index()).ok_or(DomError::UnknownNode(id))
    }

    pub fn exists(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    pub fn create_element(&mut self, name: &str) -> DomResult<NodeId> {
        self.create_element_ns("", name)
    }

    pub fn create_element_ns(&mut self, ns: &str, name: &str) -> DomResult<NodeId> {
        self.push(NodeKind::Element {
            name: name.to_string(),
            ns: ns.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        })
    }

    pub fn create_text(&mut self, data: &str) -> DomResult<NodeId> {
        self.push(NodeKind::Text(data.to_string()))
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        self.nodes.get(id.index()).map(|node| match node.kind {
            NodeKind::Element { .. } => NodeType::Element,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Attribute { .. } => NodeType::Attribute,
        })
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.node_type(id) == Some(NodeType::Element)
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.node_type(id) == Some(NodeType::Text)
    }

    pub fn is_attribute(&self, id: NodeId) -> bool {
        self.node_type(id) == Some(NodeType::Attribute)
    }

    /// Parent of a child node, or owner element of an attribute node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.index()).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.nodes.get(id.index()).map(|node| &node.kind) {
            Some(NodeKind::Element { children, .. }) => children,
            _ => &[],
        }
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    /// Index of a child node among its parent's children.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        if self.is_attribute(id) {
            return None;
        }
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_of(id)?;
        self.child(parent, index + 1)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_of(id)?;
        index.checked_sub(1).and_then(|i| self.child(parent, i))
    }

    /// Character data of a text node or the value of an attribute node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.index()).map(|node| &node.kind) {
            Some(NodeKind::Text(data)) => Some(data),
            Some(NodeKind::Attribute { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Upper bound of a valid offset into `id`: child count for elements,
    /// character count for text and attribute values.
    pub fn length(&self, id: NodeId) -> usize {
        match self.nodes.get(id.index()).map(|node| &node.kind) {
            Some(NodeKind::Element { children, .. }) => children.len(),
            Some(NodeKind::Text(data)) => char_len(data),
            Some(NodeKind::Attribute { value, .. }) => char_len(value),
            None => 0,
        }
    }

    /// Qualified name of an element or attribute.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.index()).map(|node| &node.kind) {
            Some(NodeKind::Element { name, .. }) | Some(NodeKind::Attribute { name, .. }) => {
                Some(name)
            }
            _ => None,
        }
    }

    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.name(id)
            .map(|name| name.rsplit_once(':').map_or(name, |(_, local)| local))
    }

    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.index()).map(|node| &node.kind) {
            Some(NodeKind::Element { ns, .. }) | Some(NodeKind::Attribute { ns, .. }) => Some(ns),
            _ => None,
        }
    }

    /// Concatenated character data of all text descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.nodes.get(id.index()).map(|node| &node.kind) {
            Some(NodeKind::Text(data)) => out.push_str(data),
            Some(NodeKind::Attribute { value, .. }) => out.push_str(value),
            Some(NodeKind::Element { children, .. }) => {
                for &child in children {
                    self.collect_text(child, out);
                }
            }
            None => {}
        }
    }

    // ------------------------------------------------------------------
    // Attributes and classes
    // ------------------------------------------------------------------

    pub fn attributes(&self, el: NodeId) -> &[NodeId] {
        match self.nodes.get(el.index()).map(|node| &node.kind) {
            Some(NodeKind::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    pub fn attribute_node(&self, el: NodeId, name: &str) -> Option<NodeId> {
        self.attributes(el)
            .iter()
            .copied()
            .find(|&attr| self.name(attr) == Some(name))
    }

    pub fn attribute_node_ns(&self, el: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.attributes(el).iter().copied().find(|&attr| {
            self.namespace(attr) == Some(ns) && self.local_name(attr) == Some(local)
        })
    }

    pub fn get_attribute(&self, el: NodeId, name: &str) -> Option<&str> {
        self.attribute_node(el, name).and_then(|attr| self.text(attr))
    }

    pub fn get_attribute_ns(&self, el: NodeId, ns: &str, local: &str) -> Option<&str> {
        self.attribute_node_ns(el, ns, local)
            .and_then(|attr| self.text(attr))
    }

    /// Set or remove (`value == None`) an attribute, returning the previous
    /// value. This bypasses any updater; use it on detached nodes only.
    pub fn set_attribute_ns(
        &mut self,
        el: NodeId,
        ns: &str,
        name: &str,
        value: Option<&str>,
    ) -> DomResult<Option<String>> {
        if !self.is_element(el) {
            return Err(DomError::unexpected_node_type("element"));
        }
        let local = name.rsplit_once(':').map_or(name, |(_, local)| local);
        let existing = self.attribute_node_ns(el, ns, local);
        match (existing, value) {
            (Some(attr), Some(value)) => {
                let node = self.node_mut(attr)?;
                if let NodeKind::Attribute { value: old, .. } = &mut node.kind {
                    return Ok(Some(std::mem::replace(old, value.to_string())));
                }
                Err(DomError::unexpected_node_type("attribute"))
            }
            (Some(attr), None) => {
                let old = self.text(attr).map(str::to_string);
                if let NodeKind::Element { attributes, .. } = &mut self.node_mut(el)?.kind {
                    attributes.retain(|&a| a != attr);
                }
                self.node_mut(attr)?.parent = None;
                Ok(old)
            }
            (None, Some(value)) => {
                let attr = self.push(NodeKind::Attribute {
                    name: name.to_string(),
                    ns: ns.to_string(),
                    value: value.to_string(),
                })?;
                self.node_mut(attr)?.parent = Some(el);
                if let NodeKind::Element { attributes, .. } = &mut self.node_mut(el)?.kind {
                    attributes.push(attr);
                }
                Ok(None)
            }
            (None, None) => Ok(None),
        }
    }

    pub fn set_attribute(&mut self, el: NodeId, name: &str, value: &str) -> DomResult<()> {
        self.set_attribute_ns(el, "", name, Some(value)).map(|_| ())
    }

    pub fn classes(&self, id: NodeId) -> impl Iterator<Item = &str> {
        self.get_attribute(id, "class")
            .unwrap_or("")
            .split_ascii_whitespace()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.is_element(id) && self.classes(id).any(|c| c == class)
    }

    /// Add a class to an element. Raw mutation, detached nodes only.
    pub fn add_class(&mut self, el: NodeId, class: &str) -> DomResult<()> {
        if self.has_class(el, class) {
            return Ok(());
        }
        let value = match self.get_attribute(el, "class") {
            Some(current) if !current.trim().is_empty() => format!("{} {}", current.trim(), class),
            _ => class.to_string(),
        };
        self.set_attribute(el, "class", &value)
    }

    // ------------------------------------------------------------------
    // Structure queries
    // ------------------------------------------------------------------

    /// Inclusive containment, like DOM `Node.contains`. Attribute nodes are
    /// contained by whatever contains their owner element.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether `node` is reachable from this tree's root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.contains(self.root, node)
    }

    /// Ancestors of `node`, nearest first, excluding `node` itself.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |&id| self.parent(id))
    }

    /// Descendants of `node` in document order, excluding `node`.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    fn index_chain(&self, node: NodeId) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = if self.is_attribute(node) {
            self.parent(node)
        } else {
            Some(node)
        };
        while let Some(id) = current {
            match self.index_of(id) {
                Some(index) => chain.push(index),
                None => break,
            }
            current = self.parent(id);
        }
        chain.reverse();
        chain
    }

    /// Document order of two nodes. An ancestor sorts before its
    /// descendants; attributes sort with their owner element.
    pub fn document_order(&self, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.index_chain(a).cmp(&self.index_chain(b))
    }

    /// Compare two `(node, offset)` boundary points in document order.
    pub fn compare_points(&self, a: (NodeId, usize), b: (NodeId, usize)) -> Ordering {
        if a.0 == b.0 {
            return a.1.cmp(&b.1);
        }
        let mut chain_a = self.index_chain(a.0);
        let mut chain_b = self.index_chain(b.0);
        if self.is_element(a.0) {
            chain_a.push(a.1);
        }
        if self.is_element(b.0) {
            chain_b.push(b.1);
        }
        match chain_a.cmp(&chain_b) {
            // A text point inside the child named by an element point sits
            // after the element boundary.
            Ordering::Equal if self.is_element(a.0) => Ordering::Less,
            Ordering::Equal if self.is_element(b.0) => Ordering::Greater,
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Raw mutation
    // ------------------------------------------------------------------

    /// Insert `node` as child `index` of `parent`, moving it out of its
    /// current position first if it is attached somewhere.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, node: NodeId) -> DomResult<()> {
        if !self.is_element(parent) {
            return Err(DomError::unexpected_node_type("element"));
        }
        if self.is_attribute(node) || !self.exists(node) {
            return Err(DomError::InvalidNode);
        }
        if self.contains(node, parent) {
            return Err(DomError::HierarchyRequest);
        }
        let mut index = index;
        if let Some(old_parent) = self.parent(node) {
            if let Some(old_index) = self.index_of(node) {
                if old_parent == parent && old_index < index {
                    index -= 1;
                }
            }
            self.detach(node)?;
        }
        let len = self.child_count(parent);
        if index > len {
            return Err(DomError::OffsetTooLarge { offset: index, max: len });
        }
        if let NodeKind::Element { children, .. } = &mut self.node_mut(parent)?.kind {
            children.insert(index, node);
        }
        self.node_mut(node)?.parent = Some(parent);
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, node: NodeId) -> DomResult<()> {
        let len = self.child_count(parent);
        self.insert_child(parent, len, node)
    }

    /// Remove `node` from its parent, returning the former parent and index.
    pub fn detach(&mut self, node: NodeId) -> DomResult<(NodeId, usize)> {
        let parent = self.parent(node).ok_or(DomError::NoParent)?;
        let index = self.index_of(node).ok_or(DomError::InvalidNode)?;
        if let NodeKind::Element { children, .. } = &mut self.node_mut(parent)?.kind {
            children.remove(index);
        }
        self.node_mut(node)?.parent = None;
        Ok((parent, index))
    }

    /// Replace the data of a text node, returning the old data.
    pub fn set_text(&mut self, node: NodeId, value: &str) -> DomResult<String> {
        match &mut self.node_mut(node)?.kind {
            NodeKind::Text(data) => Ok(std::mem::replace(data, value.to_string())),
            NodeKind::Attribute { value: old, .. } => Ok(std::mem::replace(old, value.to_string())),
            NodeKind::Element { .. } => Err(DomError::unexpected_node_type("text")),
        }
    }

    /// Deep copy of `node` as a new detached subtree in this arena.
    pub fn deep_clone(&mut self, node: NodeId) -> DomResult<NodeId> {
        let snapshot = self.snapshot(node)?;
        self.materialize(&snapshot)
    }

    /// Owned structural copy of an element or text subtree.
    pub fn snapshot(&self, node: NodeId) -> DomResult<NodeSnapshot> {
        match &self.node(node)?.kind {
            NodeKind::Text(data) => Ok(NodeSnapshot::Text(data.clone())),
            NodeKind::Element {
                name,
                ns,
                attributes,
                children,
            } => {
                let attributes = attributes
                    .iter()
                    .filter_map(|&attr| match &self.nodes[attr.index()].kind {
                        NodeKind::Attribute { name, ns, value } => Some(AttributeSnapshot {
                            name: name.clone(),
                            ns: ns.clone(),
                            value: value.clone(),
                        }),
                        _ => None,
                    })
                    .collect();
                let children = children
                    .iter()
                    .map(|&child| self.snapshot(child))
                    .collect::<DomResult<Vec<_>>>()?;
                Ok(NodeSnapshot::Element {
                    name: name.clone(),
                    ns: ns.clone(),
                    attributes,
                    children,
                })
            }
            NodeKind::Attribute { .. } => Err(DomError::unexpected_node_type("text or element")),
        }
    }

    /// Build a detached subtree from a snapshot.
    pub fn materialize(&mut self, snapshot: &NodeSnapshot) -> DomResult<NodeId> {
        match snapshot {
            NodeSnapshot::Text(data) => self.create_text(data),
            NodeSnapshot::Element {
                name,
                ns,
                attributes,
                children,
            } => {
                let el = self.create_element_ns(ns, name)?;
                for attr in attributes {
                    let id = self.push(NodeKind::Attribute {
                        name: attr.name.clone(),
                        ns: attr.ns.clone(),
                        value: attr.value.clone(),
                    })?;
                    self.nodes[id.index()].parent = Some(el);
                    if let NodeKind::Element { attributes, .. } = &mut self.nodes[el.index()].kind {
                        attributes.push(id);
                    }
                }
                for child in children {
                    let id = self.materialize(child)?;
                    self.nodes[id.index()].parent = Some(el);
                    if let NodeKind::Element { children, .. } = &mut self.nodes[el.index()].kind {
                        children.push(id);
                    }
                }
                Ok(el)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new("root");
        let p = tree.create_element("p").unwrap();
        let a = tree.create_text("abc").unwrap();
        let b = tree.create_element("b").unwrap();
        tree.append_child(tree.root(), p).unwrap();
        tree.append_child(p, a).unwrap();
        tree.append_child(p, b).unwrap();
        (tree, p, a, b)
    }

    #[test]
    fn test_structure_queries() {
        let (tree, p, a, b) = sample();
        assert_eq!(tree.children(p), &[a, b]);
        assert_eq!(tree.index_of(b), Some(1));
        assert_eq!(tree.next_sibling(a), Some(b));
        assert_eq!(tree.prev_sibling(a), None);
        assert!(tree.contains(p, b));
        assert!(tree.contains(p, p));
        assert!(!tree.contains(b, p));
        assert_eq!(tree.length(a), 3);
        assert_eq!(tree.length(p), 2);
    }

    #[test]
    fn test_insert_moves_attached_node() {
        let (mut tree, p, a, b) = sample();
        tree.insert_child(p, 2, a).unwrap();
        assert_eq!(tree.children(p), &[b, a]);
    }

    #[test]
    fn test_insert_into_own_subtree_fails() {
        let (mut tree, p, _, b) = sample();
        assert_eq!(tree.insert_child(b, 0, p), Err(DomError::HierarchyRequest));
    }

    #[test]
    fn test_attributes_and_classes() {
        let (mut tree, p, _, _) = sample();
        assert_eq!(tree.set_attribute_ns(p, "", "rend", Some("x")).unwrap(), None);
        assert_eq!(tree.set_attribute_ns(p, "", "rend", Some("y")).unwrap(), Some("x".into()));
        assert_eq!(tree.get_attribute(p, "rend"), Some("y"));
        assert_eq!(tree.set_attribute_ns(p, "", "rend", None).unwrap(), Some("y".into()));
        assert_eq!(tree.get_attribute(p, "rend"), None);

        tree.add_class(p, "_real").unwrap();
        tree.add_class(p, "p").unwrap();
        assert!(tree.has_class(p, "_real"));
        assert!(tree.has_class(p, "p"));
        assert!(!tree.has_class(p, "_gui"));
    }

    #[test]
    fn test_document_order_and_points() {
        let (tree, p, a, b) = sample();
        assert_eq!(tree.document_order(p, a), Ordering::Less);
        assert_eq!(tree.document_order(b, a), Ordering::Greater);
        assert_eq!(tree.compare_points((a, 3), (p, 1)), Ordering::Less);
        assert_eq!(tree.compare_points((p, 0), (a, 0)), Ordering::Less);
        assert_eq!(tree.compare_points((p, 2), (a, 1)), Ordering::Greater);
    }

    #[test]
    fn test_deep_clone_is_detached_copy() {
        let (mut tree, p, _, _) = sample();
        let copy = tree.deep_clone(p).unwrap();
        assert_ne!(copy, p);
        assert_eq!(tree.parent(copy), None);
        assert_eq!(tree.snapshot(copy).unwrap(), tree.snapshot(p).unwrap());
    }

    #[test]
    fn test_node_ids_run_out_at_u32_max() {
        assert_eq!(next_id(7), Ok(NodeId(7)));
        assert_eq!(next_id(u32::MAX as usize), Ok(NodeId(u32::MAX)));
        let overflow = u32::MAX as usize + 1;
        assert_eq!(next_id(overflow), Err(DomError::TreeFull(overflow)));
    }

    #[test]
    fn test_char_offsets() {
        assert_eq!(split_chars("héllo", 2), ("hé", "llo"));
        assert_eq!(byte_offset("héllo", 10), "héllo".len());
    }
}
