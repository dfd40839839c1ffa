//! # Transformations
//!
//! A transformation is a named, undoable edit run through
//! [`Editor::fire_transformation`], which wraps it in an undo group and
//! rolls it back if it fails.
//!
//! The helpers below are the building blocks modes use to write their
//! handlers. The ones that only touch the data tree take the data
//! [`TreeUpdater`]; the ones that also place the caret take the editor.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use wed_dom::domutil::{first_descendant_or_self, is_well_formed_range};
use wed_dom::node::split_chars;
use wed_dom::{DLoc, DomError, NodeId, Tree};

use crate::editor::Editor;
use crate::errors::{EditorError, EditorResult};
use crate::tree_updater::{Insertion, TreeUpdater};

#[derive(Error, Debug)]
pub enum TransformationError {
    /// Recoverable: the edit is rolled back and nothing is reported.
    #[error("transformation aborted: {0}")]
    Abort(String),

    #[error(transparent)]
    Editor(#[from] EditorError),
}

impl From<DomError> for TransformationError {
    fn from(err: DomError) -> Self {
        TransformationError::Editor(err.into())
    }
}

pub type TransformationResult<T> = Result<T, TransformationError>;

/// Broad category of a transformation, used to pick icons and to group
/// actions in menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformationKind {
    Add,
    Delete,
    Transform,
    Wrap,
    Unwrap,
}

/// What a transformation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Element,
    Attribute,
    Other,
}

/// Kind and target of a transformation type name.
pub fn classify(transformation_type: &str) -> Option<(TransformationKind, TargetType)> {
    use TargetType::*;
    use TransformationKind::*;
    let pair = match transformation_type {
        "add" => (Add, Other),
        "delete" => (Delete, Other),
        "transform" => (Transform, Other),
        "insert" => (Add, Element),
        "delete-element" | "delete-parent" => (Delete, Element),
        "wrap" => (Wrap, Element),
        "merge-with-next" | "merge-with-previous" | "swap-with-next" | "swap-with-previous" | "split" => {
            (Transform, Element)
        }
        "append" | "prepend" => (Add, Element),
        "unwrap" => (Unwrap, Element),
        "add-attribute" => (Add, Attribute),
        "delete-attribute" => (Delete, Attribute),
        _ => return None,
    };
    Some(pair)
}

/// Parameters a transformation runs with. Node and location are in the
/// data tree.
#[derive(Debug, Clone, Default)]
pub struct TransformationData {
    pub node: Option<NodeId>,
    pub name: Option<String>,
    pub move_caret_to: Option<DLoc>,
}

impl TransformationData {
    pub fn for_node(node: NodeId) -> Self {
        Self {
            node: Some(node),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

pub trait Transformation {
    fn transformation_type(&self) -> &str;

    fn description(&self) -> &str;

    fn kind(&self) -> Option<TransformationKind> {
        classify(self.transformation_type()).map(|(kind, _)| kind)
    }

    fn target(&self) -> Option<TargetType> {
        classify(self.transformation_type()).map(|(_, target)| target)
    }

    /// Description with `<name>` replaced by the element name in `data`.
    fn description_for(&self, data: &TransformationData) -> String {
        match &data.name {
            Some(name) => self.description().replacen("<name>", name, 1),
            None => self.description().to_string(),
        }
    }

    fn handle(&self, editor: &mut Editor, data: &TransformationData) -> TransformationResult<()>;
}

/// A transformation backed by a closure.
pub struct FnTransformation<F> {
    transformation_type: String,
    description: String,
    handler: F,
}

impl<F> FnTransformation<F>
where
    F: Fn(&mut Editor, &TransformationData) -> TransformationResult<()>,
{
    pub fn new(transformation_type: impl Into<String>, description: impl Into<String>, handler: F) -> Self {
        Self {
            transformation_type: transformation_type.into(),
            description: description.into(),
            handler,
        }
    }
}

impl<F> Transformation for FnTransformation<F>
where
    F: Fn(&mut Editor, &TransformationData) -> TransformationResult<()>,
{
    fn transformation_type(&self) -> &str {
        &self.transformation_type
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn handle(&self, editor: &mut Editor, data: &TransformationData) -> TransformationResult<()> {
        (self.handler)(editor, data)
    }
}

impl<F> std::fmt::Debug for FnTransformation<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransformation")
            .field("type", &self.transformation_type)
            .field("description", &self.description)
            .finish()
    }
}

/// Build a detached element. Attributes are set in name order.
pub fn make_element(tree: &mut Tree, ns: &str, name: &str, attrs: &[(&str, &str)]) -> EditorResult<NodeId> {
    let el = tree.create_element_ns(ns, name)?;
    let mut attrs = attrs.to_vec();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in attrs {
        tree.set_attribute(el, key, value)?;
    }
    Ok(el)
}

pub fn insert_element(
    updater: &mut TreeUpdater,
    parent: NodeId,
    index: usize,
    ns: &str,
    name: &str,
    attrs: &[(&str, &str)],
) -> EditorResult<NodeId> {
    let el = make_element(updater.scratch(), ns, name, attrs)?;
    updater.insert_at(parent, index, Insertion::Node(el))?;
    Ok(el)
}

/// Wrap `[offset, end_offset)` of a text node in a new element.
pub fn wrap_text_in_element(
    updater: &mut TreeUpdater,
    node: NodeId,
    offset: usize,
    end_offset: usize,
    ns: &str,
    name: &str,
    attrs: &[(&str, &str)],
) -> EditorResult<NodeId> {
    let tree = updater.tree();
    let data = tree.text(node).ok_or(DomError::unexpected_node_type("text"))?;
    let (_, rest) = split_chars(data, offset);
    let to_wrap = split_chars(rest, end_offset.saturating_sub(offset)).0.to_string();
    let parent = tree.parent(node).ok_or(DomError::NoParent)?;
    let node_offset = tree.index_of(node).ok_or(DomError::InvalidNode)?;

    updater.delete_text(node, offset, to_wrap.chars().count())?;
    let el = make_element(updater.scratch(), ns, name, attrs)?;
    if !to_wrap.is_empty() {
        let text = updater.scratch().create_text(&to_wrap)?;
        updater.scratch().append_child(el, text)?;
    }

    if updater.tree().parent(node).is_none() {
        updater.insert_at(parent, node_offset, Insertion::Node(el))?;
    } else {
        updater.insert_at(node, offset, Insertion::Node(el))?;
    }
    Ok(el)
}

/// Split a text container so that `offset` falls between two children of
/// its parent. Returns the parent position and whether a node was added.
fn split_for_wrap(updater: &mut TreeUpdater, container: NodeId, offset: usize) -> EditorResult<(NodeId, usize, bool)> {
    let tree = updater.tree();
    let parent = tree.parent(container).ok_or(DomError::NoParent)?;
    let at = tree.index_of(container).ok_or(DomError::InvalidNode)?;
    if offset == 0 {
        return Ok((parent, at, false));
    }
    if offset >= tree.length(container) {
        return Ok((parent, at + 1, false));
    }
    let data = tree.text(container).unwrap_or_default();
    let (head, tail) = split_chars(data, offset);
    let (head, tail) = (head.to_string(), tail.to_string());
    updater.set_text_node(container, &head)?;
    let tail = updater.scratch().create_text(&tail)?;
    updater.insert_node_at(parent, at + 1, tail)?;
    Ok((parent, at + 1, true))
}

/// Wrap the content of a well formed range in a new element.
#[instrument(skip(updater, attrs))]
pub fn wrap_in_element(
    updater: &mut TreeUpdater,
    start: DLoc,
    end: DLoc,
    ns: &str,
    name: &str,
    attrs: &[(&str, &str)],
) -> EditorResult<NodeId> {
    if !is_well_formed_range(updater.tree(), start.point(), end.point())? {
        return Err(DomError::MalformedRange.into());
    }

    let (mut start_container, mut start_offset) = start.point();
    let (mut end_container, mut end_offset) = end.point();

    if updater.tree().is_text(start_container) {
        if start_container == end_container {
            return wrap_text_in_element(updater, start_container, start_offset, end_offset, ns, name, attrs);
        }
        let (parent, offset, added) = split_for_wrap(updater, start_container, start_offset)?;
        if added && end_container == parent && end_offset >= offset {
            end_offset += 1;
        }
        start_container = parent;
        start_offset = offset;
    }

    if updater.tree().is_text(end_container) {
        let (parent, offset, _) = split_for_wrap(updater, end_container, end_offset)?;
        end_container = parent;
        end_offset = offset;
    }

    if start_container != end_container {
        return Err(DomError::MalformedRange.into());
    }

    let el = make_element(updater.scratch(), ns, name, attrs)?;
    for index in (start_offset..end_offset).rev() {
        let child = updater
            .tree()
            .child(end_container, index)
            .ok_or(DomError::InvalidNode)?;
        updater.delete_node(child)?;
        updater.scratch().insert_child(el, 0, child)?;
    }
    updater.insert_at(start_container, start_offset, Insertion::Node(el))?;
    debug!(element = ?el, "wrapped range");
    Ok(el)
}

/// Replace `node` with its children. Returns the children.
pub fn unwrap(updater: &mut TreeUpdater, node: NodeId) -> EditorResult<Vec<NodeId>> {
    let tree = updater.tree();
    let parent = tree.parent(node).ok_or(DomError::NoParent)?;
    let children = tree.children(node).to_vec();
    let prev = tree.prev_sibling(node);
    let next = tree.next_sibling(node);

    updater.delete_node(node)?;
    let mut at = match next {
        Some(next) => updater.tree().index_of(next).ok_or(DomError::InvalidNode)?,
        None => updater.tree().child_count(parent),
    };
    for &child in &children {
        updater.scratch().detach(child)?;
        updater.insert_node_at(parent, at, child)?;
        at += 1;
    }
    if let Some(&last) = children.last() {
        updater.merge_text_nodes(last)?;
    }
    if let Some(prev) = prev.filter(|&p| updater.tree().parent(p).is_some()) {
        updater.merge_text_nodes(prev)?;
    }
    Ok(children)
}

/// Split `node` at the caret and put the caret at the start of the second
/// half.
pub fn split_node(editor: &mut Editor, node: NodeId) -> EditorResult<()> {
    let caret = editor.get_data_caret(false)?.ok_or(EditorError::NoCaret)?;
    if !editor.data_tree().contains(node, caret.node) {
        return Err(EditorError::Transformation("caret outside node".into()));
    }
    let (_, second) = editor.data_updater_mut().split_at(node, caret)?;
    let target = first_descendant_or_self(editor.data_tree(), second);
    let loc = DLoc::make(editor.data_tree(), target, 0)?;
    editor.set_data_caret(loc, false)
}

fn prev_element_sibling(tree: &Tree, node: NodeId) -> Option<NodeId> {
    std::iter::successors(tree.prev_sibling(node), |&n| tree.prev_sibling(n)).find(|&n| tree.is_element(n))
}

fn next_element_sibling(tree: &Tree, node: NodeId) -> Option<NodeId> {
    std::iter::successors(tree.next_sibling(node), |&n| tree.next_sibling(n)).find(|&n| tree.is_element(n))
}

/// Same local name and namespace.
fn homogeneous(tree: &Tree, a: NodeId, b: NodeId) -> bool {
    tree.local_name(a) == tree.local_name(b) && tree.namespace(a) == tree.namespace(b)
}

/// Move the content of `node` to the end of its previous sibling of the
/// same name and remove `node`. Does nothing without such a sibling.
pub fn merge_with_previous_homogeneous_sibling(editor: &mut Editor, node: NodeId) -> EditorResult<()> {
    let tree = editor.data_tree();
    let Some(prev) = prev_element_sibling(tree, node) else {
        return Ok(());
    };
    if !homogeneous(tree, prev, node) {
        return Ok(());
    }

    let caret_pos = tree.child_count(prev);
    let last_child = tree.last_child(prev).filter(|&c| tree.is_text(c));
    let text_len = last_child.map_or(0, |c| tree.length(c));
    let children = tree.children(node).to_vec();

    let updater = editor.data_updater_mut();
    let clones = children
        .iter()
        .map(|&child| updater.scratch().deep_clone(child))
        .collect::<Result<Vec<_>, _>>()?;
    updater.insert_at(prev, caret_pos, Insertion::Nodes(&clones))?;
    if let Some(last) = last_child.filter(|&l| updater.tree().parent(l).is_some()) {
        updater.merge_text_nodes(last)?;
    }

    let caret = match last_child {
        Some(last) if editor.data_tree().parent(last).is_some() => DLoc::make(editor.data_tree(), last, text_len)?,
        _ => DLoc::make(editor.data_tree(), prev, caret_pos)?,
    };
    editor.set_data_caret(caret, false)?;
    editor.data_updater_mut().remove_node(node)?;
    Ok(())
}

pub fn merge_with_next_homogeneous_sibling(editor: &mut Editor, node: NodeId) -> EditorResult<()> {
    match next_element_sibling(editor.data_tree(), node) {
        Some(next) => merge_with_previous_homogeneous_sibling(editor, next),
        None => Ok(()),
    }
}

/// Exchange `node` with its previous sibling of the same name.
pub fn swap_with_previous_homogeneous_sibling(editor: &mut Editor, node: NodeId) -> EditorResult<()> {
    let tree = editor.data_tree();
    let Some(prev) = prev_element_sibling(tree, node) else {
        return Ok(());
    };
    if !homogeneous(tree, prev, node) {
        return Ok(());
    }
    let parent = tree.parent(prev).ok_or(DomError::NoParent)?;

    let updater = editor.data_updater_mut();
    updater.remove_node(node)?;
    updater.insert_before(parent, node, Some(prev))?;
    let index = editor.data_tree().index_of(node).ok_or(DomError::InvalidNode)?;
    let caret = DLoc::make(editor.data_tree(), parent, index)?;
    editor.set_data_caret(caret, false)
}

pub fn swap_with_next_homogeneous_sibling(editor: &mut Editor, node: NodeId) -> EditorResult<()> {
    match next_element_sibling(editor.data_tree(), node) {
        Some(next) => swap_with_previous_homogeneous_sibling(editor, next),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wed_dom::xml;

    fn updater(source: &str) -> TreeUpdater {
        TreeUpdater::new(xml::parse(source).unwrap())
    }

    fn content(u: &TreeUpdater) -> String {
        xml::inner_xml(u.tree(), u.tree().root())
    }

    fn loc(u: &TreeUpdater, path: &str, offset: usize) -> DLoc {
        let node = u.path_to_node(path).unwrap().unwrap();
        DLoc::make(u.tree(), node, offset).unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("insert"), Some((TransformationKind::Add, TargetType::Element)));
        assert_eq!(classify("delete-attribute"), Some((TransformationKind::Delete, TargetType::Attribute)));
        assert_eq!(classify("split"), Some((TransformationKind::Transform, TargetType::Element)));
        assert_eq!(classify("frobnicate"), None);
    }

    #[test]
    fn test_wrap_text_in_element() {
        let mut u = updater("<doc><p>abcd</p></doc>");
        let text = u.path_to_node("0/0/0").unwrap().unwrap();
        wrap_text_in_element(&mut u, text, 1, 3, "", "hi", &[]).unwrap();
        assert_eq!(content(&u), "<doc><p>a<hi>bc</hi>d</p></doc>");
    }

    #[test]
    fn test_wrap_whole_text_node() {
        let mut u = updater("<doc><p>ab</p></doc>");
        let text = u.path_to_node("0/0/0").unwrap().unwrap();
        wrap_text_in_element(&mut u, text, 0, 2, "", "hi", &[("rend", "b")]).unwrap();
        assert_eq!(content(&u), "<doc><p><hi rend=\"b\">ab</hi></p></doc>");
    }

    #[test]
    fn test_wrap_in_element_across_children() {
        let mut u = updater("<doc><p>ab<b/>cd</p></doc>");
        let start = loc(&u, "0/0/0", 1);
        let end = loc(&u, "0/0/2", 1);
        wrap_in_element(&mut u, start, end, "", "hi", &[]).unwrap();
        assert_eq!(content(&u), "<doc><p>a<hi>b<b/>c</hi>d</p></doc>");
    }

    #[test]
    fn test_wrap_in_element_text_to_element_boundary() {
        let mut u = updater("<doc><p>ab<b/></p></doc>");
        let start = loc(&u, "0/0/0", 1);
        let end = loc(&u, "0/0", 2);
        wrap_in_element(&mut u, start, end, "", "hi", &[]).unwrap();
        assert_eq!(content(&u), "<doc><p>a<hi>b<b/></hi></p></doc>");
    }

    #[test]
    fn test_wrap_in_element_rejects_malformed_range() {
        let mut u = updater("<doc><p>ab</p><q>cd</q></doc>");
        let start = loc(&u, "0/0/0", 1);
        let end = loc(&u, "0/1/0", 1);
        let err = wrap_in_element(&mut u, start, end, "", "hi", &[]).unwrap_err();
        assert!(matches!(err, EditorError::Dom(DomError::MalformedRange)));
        assert_eq!(content(&u), "<doc><p>ab</p><q>cd</q></doc>");
    }

    #[test]
    fn test_unwrap_merges_text() {
        let mut u = updater("<doc><p>a<hi>b<b/>c</hi>d</p></doc>");
        let hi = u.path_to_node("0/0/1").unwrap().unwrap();
        let children = unwrap(&mut u, hi).unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(content(&u), "<doc><p>ab<b/>cd</p></doc>");
    }

    #[test]
    fn test_insert_element_sorts_attributes() {
        let mut u = updater("<doc/>");
        let doc = u.path_to_node("0").unwrap().unwrap();
        insert_element(&mut u, doc, 0, "", "p", &[("z", "1"), ("a", "2")]).unwrap();
        assert_eq!(content(&u), "<doc><p a=\"2\" z=\"1\"/></doc>");
    }
}
