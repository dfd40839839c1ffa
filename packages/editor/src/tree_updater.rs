//! # Tree Updater
//!
//! Owns one tree and is the only sanctioned way to mutate it once it is
//! live. Four primitives change the tree:
//!
//! - `insert_node_at`
//! - `set_text_node_value`
//! - `delete_node` (announced by `BeforeDeleteNode` while still attached)
//! - `set_attribute_ns`
//!
//! Each primitive mutates first, then synchronously emits its
//! [`TreeEvent`] followed by [`TreeEvent::Changed`]. Everything else here
//! is composed from those primitives, so compound operations emit a
//! sequence of primitive events and several `Changed` events.
//!
//! The updater implements [`DomMutator`], which is how the generic
//! algorithms in `wed_dom::domutil` run against a live tree.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, instrument};
use wed_dom::domutil::{self, DomMutator};
use wed_dom::{DLoc, DomError, NodeId, Tree};

use crate::errors::{EditorError, EditorResult};
use crate::events::{EventBus, Listener, ListenerId, TreeEvent};

/// What [`TreeUpdater::insert_at`] inserts.
#[derive(Debug, Clone, Copy)]
pub enum Insertion<'a> {
    Text(&'a str),
    Node(NodeId),
    Nodes(&'a [NodeId]),
}

#[derive(Debug)]
pub struct TreeUpdater {
    tree: Tree,
    events: EventBus<TreeEvent, Tree>,
}

impl TreeUpdater {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            events: EventBus::new(),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutable access for building detached nodes. Mutating attached nodes
    /// through this bypasses every listener.
    pub fn scratch(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn subscribe<L>(&mut self, listener: Rc<RefCell<L>>) -> ListenerId
    where
        L: Listener<TreeEvent, Tree> + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn subscribe_fn<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&TreeEvent, &Tree) -> EditorResult<()> + 'static,
    {
        self.events.subscribe_fn(f)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    fn emit(&self, event: TreeEvent) -> EditorResult<()> {
        self.events.emit(&event, &self.tree)?;
        self.events.emit(&TreeEvent::Changed, &self.tree)
    }

    fn loc(&self, point: (NodeId, usize)) -> EditorResult<DLoc> {
        Ok(DLoc::make(&self.tree, point.0, point.1)?)
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    pub fn insert_node_at(&mut self, parent: NodeId, index: usize, node: NodeId) -> EditorResult<()> {
        if self.tree.parent(node).is_some() {
            return Err(EditorError::AlreadyAttached(node));
        }
        self.tree.insert_child(parent, index, node)?;
        debug!(parent = ?parent, index, node = ?node, "insertNodeAt");
        self.emit(TreeEvent::InsertNodeAt { parent, index, node })
    }

    pub fn set_text_node_value(&mut self, node: NodeId, value: &str) -> EditorResult<()> {
        if !self.tree.is_text(node) {
            return Err(DomError::unexpected_node_type("text").into());
        }
        let old_value = self.tree.set_text(node, value)?;
        debug!(node = ?node, value, "setTextNodeValue");
        self.emit(TreeEvent::SetTextNodeValue {
            node,
            value: value.to_string(),
            old_value,
        })
    }

    pub fn delete_node(&mut self, node: NodeId) -> EditorResult<()> {
        if self.tree.parent(node).is_none() || self.tree.is_attribute(node) {
            return Err(DomError::NoParent.into());
        }
        self.events
            .emit(&TreeEvent::BeforeDeleteNode { node }, &self.tree)?;
        let (former_parent, _) = self.tree.detach(node)?;
        debug!(node = ?node, former_parent = ?former_parent, "deleteNode");
        self.emit(TreeEvent::DeleteNode { node, former_parent })
    }

    /// Set (`Some`) or remove (`None`) an attribute. The event reports the
    /// old value as `None` when the attribute was absent.
    pub fn set_attribute_ns(
        &mut self,
        node: NodeId,
        ns: &str,
        attribute: &str,
        value: Option<&str>,
    ) -> EditorResult<()> {
        let old_value = self.tree.set_attribute_ns(node, ns, attribute, value)?;
        debug!(node = ?node, ns, attribute, value = ?value, "setAttributeNS");
        self.emit(TreeEvent::SetAttributeNs {
            node,
            ns: ns.to_string(),
            attribute: attribute.to_string(),
            old_value,
            new_value: value.map(str::to_string),
        })
    }

    pub fn set_attribute(&mut self, node: NodeId, attribute: &str, value: Option<&str>) -> EditorResult<()> {
        self.set_attribute_ns(node, "", attribute, value)
    }

    // ------------------------------------------------------------------
    // Complex operations
    // ------------------------------------------------------------------

    /// Insert text or nodes at `(parent, index)`. `parent` may be a text
    /// node, in which case elements are inserted by splitting it. Returns
    /// the location right after the inserted content.
    pub fn insert_at(&mut self, parent: NodeId, index: usize, what: Insertion<'_>) -> EditorResult<DLoc> {
        match what {
            Insertion::Text(text) => {
                let inserted = domutil::insert_text(self, parent, index, text)?;
                self.loc(inserted.caret.unwrap_or((parent, index)))
            }
            Insertion::Node(node) if self.tree.is_text(node) => {
                let data = self.tree.text(node).unwrap_or_default().to_string();
                self.insert_at(parent, index, Insertion::Text(&data))
            }
            Insertion::Node(node) if self.tree.is_element(node) => {
                if self.tree.is_text(parent) {
                    let (_, end) = self.insert_into_text(parent, index, node)?;
                    Ok(end)
                } else if self.tree.is_element(parent) {
                    self.insert_node_at(parent, index, node)?;
                    self.loc((parent, index + 1))
                } else {
                    Err(DomError::unexpected_node_type("text or element").into())
                }
            }
            Insertion::Node(_) => Err(DomError::unexpected_node_type("text or element").into()),
            Insertion::Nodes(nodes) => {
                let mut at = self.loc((parent, index))?;
                for &node in nodes {
                    at = self.insert_at(at.node, at.offset, Insertion::Node(node))?;
                }
                Ok(at)
            }
        }
    }

    /// Insert `node` before `before_this`, or append when it is `None`.
    pub fn insert_before(&mut self, parent: NodeId, node: NodeId, before_this: Option<NodeId>) -> EditorResult<DLoc> {
        let index = match before_this {
            Some(child) => self
                .tree
                .children(parent)
                .iter()
                .position(|&c| c == child)
                .ok_or(EditorError::NotAChild)?,
            None => self.tree.child_count(parent),
        };
        self.insert_at(parent, index, Insertion::Node(node))
    }

    pub fn insert_text(&mut self, node: NodeId, index: usize, text: &str) -> EditorResult<domutil::TextInsertion> {
        domutil::insert_text(self, node, index, text)
    }

    /// Insert `node` into the text node `parent` at `index`. Returns the
    /// boundaries before and after the inserted node.
    pub fn insert_into_text(&mut self, parent: NodeId, index: usize, node: NodeId) -> EditorResult<(DLoc, DLoc)> {
        let (start, end) = domutil::insert_into_text(self, parent, index, Some(node))?;
        Ok((self.loc(start)?, self.loc(end)?))
    }

    /// Split the subtree rooted at `top` at `loc`, replacing `top` with
    /// two siblings. Returns the two halves.
    #[instrument(skip(self))]
    pub fn split_at(&mut self, top: NodeId, loc: DLoc) -> EditorResult<(NodeId, NodeId)> {
        if loc.node == top && self.tree.is_text(top) {
            return Err(EditorError::SplitTextTop);
        }
        if !self.tree.contains(top, loc.node) {
            return Err(EditorError::SplitOutsideTop);
        }

        let cloned_top = self.tree.deep_clone(top)?;
        let cloned_node = domutil::corresponding_node(&self.tree, top, &self.tree, cloned_top, loc.node)?;
        let pair = split_detached(&mut self.tree, cloned_top, cloned_node, loc.offset)?;

        let parent = self.tree.parent(top).ok_or(DomError::NoParent)?;
        let at = self.tree.index_of(top).ok_or(DomError::InvalidNode)?;
        self.delete_node(top)?;
        self.insert_node_at(parent, at, pair.0)?;
        self.insert_node_at(parent, at + 1, pair.1)?;
        Ok(pair)
    }

    pub fn delete_text(&mut self, node: NodeId, index: usize, length: usize) -> EditorResult<()> {
        DomMutator::delete_text(self, node, index, length)
    }

    /// Set a text node's value, deleting the node if the value is empty.
    pub fn set_text_node(&mut self, node: NodeId, value: &str) -> EditorResult<()> {
        DomMutator::set_text_node(self, node, value)
    }

    /// Delete `node` and merge the text nodes it separated. Returns the
    /// location where `node` was.
    pub fn remove_node(&mut self, node: NodeId) -> EditorResult<DLoc> {
        self.remove_nodes(&[node])
    }

    pub fn remove_node_nf(&mut self, node: Option<NodeId>) -> EditorResult<Option<DLoc>> {
        node.map(|node| self.remove_node(node)).transpose()
    }

    /// Delete a run of contiguous siblings and merge the text nodes they
    /// separated.
    pub fn remove_nodes(&mut self, nodes: &[NodeId]) -> EditorResult<DLoc> {
        let first = *nodes.first().ok_or(DomError::InvalidNode)?;
        for pair in nodes.windows(2) {
            if self.tree.next_sibling(pair[0]) != Some(pair[1]) {
                return Err(EditorError::NotContiguous);
            }
        }
        let prev = self.tree.prev_sibling(first);
        let parent = self.tree.parent(first).ok_or(DomError::NoParent)?;
        let index = self.tree.index_of(first).ok_or(DomError::InvalidNode)?;
        for &node in nodes {
            self.delete_node(node)?;
        }
        match prev {
            Some(prev) => self.merge_text_nodes(prev),
            None => self.loc((parent, index)),
        }
    }

    /// Remove the content between two locations of a well formed range.
    /// Returns the collapse location and the removed nodes.
    #[instrument(skip(self))]
    pub fn cut(&mut self, start: DLoc, end: DLoc) -> EditorResult<(DLoc, Vec<NodeId>)> {
        let (caret, nodes) = domutil::cut(self, start.point(), end.point())?;
        Ok((self.loc(caret)?, nodes))
    }

    pub fn merge_text_nodes(&mut self, node: NodeId) -> EditorResult<DLoc> {
        let point = DomMutator::merge_text_nodes(self, node)?;
        self.loc(point)
    }

    pub fn merge_text_nodes_nf(&mut self, node: Option<NodeId>) -> EditorResult<Option<DLoc>> {
        node.map(|node| self.merge_text_nodes(node)).transpose()
    }

    pub fn node_to_path(&self, node: NodeId) -> EditorResult<String> {
        Ok(self.tree.node_to_path(node)?)
    }

    pub fn path_to_node(&self, path: &str) -> EditorResult<Option<NodeId>> {
        Ok(self.tree.path_to_node(path)?)
    }
}

impl DomMutator for TreeUpdater {
    type Error = EditorError;

    fn tree(&self) -> &Tree {
        &self.tree
    }

    fn create_text(&mut self, data: &str) -> EditorResult<NodeId> {
        Ok(self.tree.create_text(data)?)
    }

    fn insert_node_at(&mut self, parent: NodeId, index: usize, node: NodeId) -> EditorResult<()> {
        TreeUpdater::insert_node_at(self, parent, index, node)
    }

    fn delete_node(&mut self, node: NodeId) -> EditorResult<()> {
        TreeUpdater::delete_node(self, node)
    }

    fn set_text_node_value(&mut self, node: NodeId, value: &str) -> EditorResult<()> {
        TreeUpdater::set_text_node_value(self, node, value)
    }
}

/// Split a detached subtree in place, climbing from `node` to `top`.
fn split_detached(tree: &mut Tree, top: NodeId, node: NodeId, index: usize) -> EditorResult<(NodeId, NodeId)> {
    let mut node = node;
    let mut index = index;
    loop {
        let parent = tree.parent(node);
        let (pair, next_index) = if tree.is_text(node) {
            let len = tree.length(node);
            let at = tree.index_of(node).ok_or(DomError::InvalidNode)?;
            if index == 0 {
                ((None, Some(node)), at)
            } else if index >= len {
                ((Some(node), None), at + 1)
            } else {
                let (before, after) = domutil::split_text_node(tree, node, index)?;
                ((before, after), at + 1)
            }
        } else if tree.is_element(node) {
            let index = index.min(tree.child_count(node));
            let clone = tree.deep_clone(node)?;
            while let Some(child) = tree.child(node, index) {
                tree.detach(child)?;
            }
            for _ in 0..index {
                if let Some(first) = tree.first_child(clone) {
                    tree.detach(first)?;
                }
            }
            if let Some(parent) = parent {
                let at = tree.index_of(node).ok_or(DomError::InvalidNode)?;
                tree.insert_child(parent, at + 1, clone)?;
            }
            let at = tree.index_of(node).unwrap_or(0);
            ((Some(node), Some(clone)), at + 1)
        } else {
            return Err(DomError::unexpected_node_type("text or element").into());
        };

        if node == top {
            return match pair {
                (Some(first), Some(second)) => Ok((first, second)),
                _ => Err(EditorError::SplitTextTop),
            };
        }
        node = parent.ok_or(DomError::NoParent)?;
        index = next_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wed_dom::xml;

    fn updater(source: &str) -> TreeUpdater {
        TreeUpdater::new(xml::parse(source).unwrap())
    }

    fn recorded(u: &mut TreeUpdater) -> Rc<RefCell<Vec<&'static str>>> {
        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&names);
        u.subscribe_fn(move |ev, _| {
            sink.borrow_mut().push(ev.name());
            Ok(())
        });
        names
    }

    #[test]
    fn test_primitive_emits_changed() {
        let mut u = updater("<doc><p>ab</p></doc>");
        let names = recorded(&mut u);
        let text = u.path_to_node("0/0/0").unwrap().unwrap();
        u.set_text_node_value(text, "cd").unwrap();
        assert_eq!(*names.borrow(), vec!["setTextNodeValue", "changed"]);
    }

    #[test]
    fn test_delete_announces_before_removal() {
        let mut u = updater("<doc><p>ab</p></doc>");
        let p = u.path_to_node("0/0").unwrap().unwrap();
        let attached = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&attached);
        u.subscribe_fn(move |ev, tree| {
            match ev {
                TreeEvent::BeforeDeleteNode { node } | TreeEvent::DeleteNode { node, .. } => {
                    sink.borrow_mut().push(tree.is_attached(*node))
                }
                _ => {}
            }
            Ok(())
        });
        u.delete_node(p).unwrap();
        assert_eq!(*attached.borrow(), vec![true, false]);
    }

    #[test]
    fn test_set_attribute_reports_absent_as_none() {
        let mut u = updater("<doc/>");
        let doc = u.path_to_node("0").unwrap().unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        u.subscribe_fn(move |ev, _| {
            if let TreeEvent::SetAttributeNs { old_value, new_value, .. } = ev {
                sink.borrow_mut().push((old_value.clone(), new_value.clone()));
            }
            Ok(())
        });
        u.set_attribute(doc, "n", Some("")).unwrap();
        u.set_attribute(doc, "n", None).unwrap();
        assert_eq!(
            *events.borrow(),
            vec![(None, Some(String::new())), (Some(String::new()), None)]
        );
    }

    #[test]
    fn test_insert_attached_node_fails() {
        let mut u = updater("<doc><p/></doc>");
        let doc = u.path_to_node("0").unwrap().unwrap();
        let p = u.path_to_node("0/0").unwrap().unwrap();
        assert!(matches!(u.insert_node_at(doc, 0, p), Err(EditorError::AlreadyAttached(_))));
    }

    #[test]
    fn test_split_at_text_location() {
        let mut u = updater("<doc><p>ab<b>cd</b>ef</p></doc>");
        let p = u.path_to_node("0/0").unwrap().unwrap();
        let cd = u.path_to_node("0/0/1/0").unwrap().unwrap();
        let loc = DLoc::make(u.tree(), cd, 1).unwrap();
        let (first, second) = u.split_at(p, loc).unwrap();
        let tree = u.tree();
        assert_eq!(
            xml::inner_xml(tree, tree.root()),
            "<doc><p>ab<b>c</b></p><p><b>d</b>ef</p></doc>"
        );
        assert_eq!(tree.index_of(first), Some(0));
        assert_eq!(tree.index_of(second), Some(1));
    }

    #[test]
    fn test_split_at_element_boundary() {
        let mut u = updater("<doc><p>ab<b/>ef</p></doc>");
        let p = u.path_to_node("0/0").unwrap().unwrap();
        let loc = DLoc::make(u.tree(), p, 1).unwrap();
        u.split_at(p, loc).unwrap();
        let tree = u.tree();
        assert_eq!(xml::inner_xml(tree, tree.root()), "<doc><p>ab</p><p><b/>ef</p></doc>");
    }

    #[test]
    fn test_split_at_text_start_splits_before_text() {
        let mut u = updater("<doc><p><b/>ef</p></doc>");
        let p = u.path_to_node("0/0").unwrap().unwrap();
        let ef = u.path_to_node("0/0/1").unwrap().unwrap();
        let loc = DLoc::make(u.tree(), ef, 0).unwrap();
        u.split_at(p, loc).unwrap();
        let tree = u.tree();
        assert_eq!(xml::inner_xml(tree, tree.root()), "<doc><p><b/></p><p>ef</p></doc>");
    }

    #[test]
    fn test_split_at_nested_text_start_moves_text_to_second_half() {
        let mut u = updater("<doc><p>ab<b>cd</b></p></doc>");
        let p = u.path_to_node("0/0").unwrap().unwrap();
        let cd = u.path_to_node("0/0/1/0").unwrap().unwrap();
        let loc = DLoc::make(u.tree(), cd, 0).unwrap();
        let (first, second) = u.split_at(p, loc).unwrap();
        let tree = u.tree();
        assert_eq!(
            xml::inner_xml(tree, tree.root()),
            "<doc><p>ab<b/></p><p><b>cd</b></p></doc>"
        );
        assert_eq!(tree.text_content(first), "ab");
        assert_eq!(tree.text_content(second), "cd");
    }

    #[test]
    fn test_split_at_rejects_bad_locations() {
        let mut u = updater("<doc><p>ab</p><q/></doc>");
        let p = u.path_to_node("0/0").unwrap().unwrap();
        let text = u.path_to_node("0/0/0").unwrap().unwrap();
        let q = u.path_to_node("0/1").unwrap().unwrap();
        let in_text = DLoc::make(u.tree(), text, 1).unwrap();
        assert!(matches!(u.split_at(text, in_text), Err(EditorError::SplitTextTop)));
        let in_q = DLoc::make(u.tree(), q, 0).unwrap();
        assert!(matches!(u.split_at(p, in_q), Err(EditorError::SplitOutsideTop)));
    }

    #[test]
    fn test_remove_node_merges_text() {
        let mut u = updater("<doc><p>ab<b/>cd</p></doc>");
        let b = u.path_to_node("0/0/1").unwrap().unwrap();
        let ab = u.path_to_node("0/0/0").unwrap().unwrap();
        let loc = u.remove_node(b).unwrap();
        assert_eq!((loc.node, loc.offset), (ab, 2));
        assert_eq!(u.tree().text(ab), Some("abcd"));
        assert_eq!(u.remove_node_nf(None).unwrap(), None);
    }

    #[test]
    fn test_remove_nodes_requires_contiguity() {
        let mut u = updater("<doc><p><a/><b/><c/></p></doc>");
        let a = u.path_to_node("0/0/0").unwrap().unwrap();
        let c = u.path_to_node("0/0/2").unwrap().unwrap();
        assert!(matches!(u.remove_nodes(&[a, c]), Err(EditorError::NotContiguous)));
        let p = u.path_to_node("0/0").unwrap().unwrap();
        let loc = u.remove_nodes(&[a]).unwrap();
        assert_eq!((loc.node, loc.offset), (p, 0));
    }

    #[test]
    fn test_insert_at_nodes_into_text() {
        let mut u = updater("<doc><p>abcd</p></doc>");
        let text = u.path_to_node("0/0/0").unwrap().unwrap();
        let b = u.scratch().create_element("b").unwrap();
        let x = u.scratch().create_text("x").unwrap();
        let end = u.insert_at(text, 2, Insertion::Nodes(&[b, x])).unwrap();
        let tree = u.tree();
        assert_eq!(xml::inner_xml(tree, tree.root()), "<doc><p>ab<b/>xcd</p></doc>");
        assert_eq!(tree.text(end.node), Some("xcd"));
        assert_eq!(end.offset, 1);
    }

    #[test]
    fn test_insert_before() {
        let mut u = updater("<doc><a/><c/></doc>");
        let doc = u.path_to_node("0").unwrap().unwrap();
        let c = u.path_to_node("0/1").unwrap().unwrap();
        let b = u.scratch().create_element("b").unwrap();
        u.insert_before(doc, b, Some(c)).unwrap();
        let tail = u.scratch().create_element("d").unwrap();
        u.insert_before(doc, tail, None).unwrap();
        let tree = u.tree();
        assert_eq!(xml::inner_xml(tree, tree.root()), "<doc><a/><b/><c/><d/></doc>");
    }
}
