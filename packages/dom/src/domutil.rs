//! # Mutation Primitives
//!
//! Tree-agnostic editing algorithms. Each one is written against the
//! [`DomMutator`] capability set rather than against a concrete tree, so
//! the same code runs on:
//!
//! - a bare [`Tree`] (no notifications, used for detached scratch subtrees)
//! - a tree updater that emits an event after every primitive
//!
//! All algorithms keep two invariants: no empty text node is left in the
//! tree and no two text nodes are left adjacent.
//!
//! This module also holds the DOM-level caret walk
//! ([`next_caret_position`]/[`prev_caret_position`]) that the editor's
//! caret policy builds on.

use crate::error::{DomError, DomResult};
use crate::node::{char_len, split_chars, NodeId, Tree};
use crate::path::{node_to_path, path_to_node};

/// A boundary point: a container node plus an offset into it.
pub type Point = (NodeId, usize);

/// Capability set required by the generic algorithms.
pub trait DomMutator {
    type Error: From<DomError>;

    fn tree(&self) -> &Tree;

    /// Create a detached text node. Creation is not a mutation of the
    /// attached tree and emits nothing.
    fn create_text(&mut self, data: &str) -> Result<NodeId, Self::Error>;

    fn insert_node_at(&mut self, parent: NodeId, index: usize, node: NodeId) -> Result<(), Self::Error>;

    fn delete_node(&mut self, node: NodeId) -> Result<(), Self::Error>;

    fn set_text_node_value(&mut self, node: NodeId, value: &str) -> Result<(), Self::Error>;

    fn insert_frag_at(&mut self, parent: NodeId, index: usize, nodes: &[NodeId]) -> Result<(), Self::Error> {
        for (i, &node) in nodes.iter().enumerate() {
            self.insert_node_at(parent, index + i, node)?;
        }
        Ok(())
    }

    /// Set the value of a text node, removing the node when the value is
    /// empty.
    fn set_text_node(&mut self, node: NodeId, value: &str) -> Result<(), Self::Error> {
        if value.is_empty() {
            self.delete_node(node)
        } else {
            self.set_text_node_value(node, value)
        }
    }

    /// Delete `length` characters at `index`. A text node that becomes
    /// empty is removed.
    fn delete_text(&mut self, node: NodeId, index: usize, length: usize) -> Result<(), Self::Error> {
        let data = self
            .tree()
            .text(node)
            .filter(|_| self.tree().is_text(node))
            .ok_or_else(|| DomError::unexpected_node_type("text"))?;
        if length == 0 {
            return Ok(());
        }
        let (before, rest) = split_chars(data, index);
        let (_, after) = split_chars(rest, length);
        let value = format!("{}{}", before, after);
        self.set_text_node(node, &value)
    }

    /// Merge `node` with its next sibling when both are text nodes.
    /// Returns the boundary between the merged contents, or the position
    /// after `node` in its parent when nothing was merged.
    fn merge_text_nodes(&mut self, node: NodeId) -> Result<Point, Self::Error> {
        let tree = self.tree();
        let next = tree.next_sibling(node);
        if let Some(next) = next.filter(|&n| tree.is_text(n) && tree.is_text(node)) {
            let offset = tree.length(node);
            let value = format!(
                "{}{}",
                tree.text(node).unwrap_or_default(),
                tree.text(next).unwrap_or_default()
            );
            self.set_text_node_value(node, &value)?;
            self.delete_node(next)?;
            return Ok((node, offset));
        }
        let parent = tree.parent(node).ok_or(DomError::NoParent)?;
        let index = tree.index_of(node).ok_or(DomError::InvalidNode)?;
        Ok((parent, index + 1))
    }
}

impl DomMutator for Tree {
    type Error = DomError;

    fn tree(&self) -> &Tree {
        self
    }

    fn create_text(&mut self, data: &str) -> DomResult<NodeId> {
        Tree::create_text(self, data)
    }

    fn insert_node_at(&mut self, parent: NodeId, index: usize, node: NodeId) -> DomResult<()> {
        self.insert_child(parent, index, node)
    }

    fn delete_node(&mut self, node: NodeId) -> DomResult<()> {
        self.detach(node).map(|_| ())
    }

    fn set_text_node_value(&mut self, node: NodeId, value: &str) -> DomResult<()> {
        self.set_text(node, value).map(|_| ())
    }
}

fn expect_text(tree: &Tree, node: NodeId) -> DomResult<&str> {
    if !tree.is_text(node) {
        return Err(DomError::unexpected_node_type("text"));
    }
    Ok(tree.text(node).unwrap_or_default())
}

/// Split `text_node` at `index` and put `node` between the halves.
///
/// The result is clean: halves that would be empty are dropped and a text
/// `node` is merged with its neighbours. Returns the boundaries before and
/// after the inserted content. A boundary at the very start or end of the
/// original text is expressed against the parent element.
pub fn insert_into_text<M: DomMutator>(
    m: &mut M,
    text_node: NodeId,
    index: usize,
    node: Option<NodeId>,
) -> Result<(Point, Point), M::Error> {
    let tree = m.tree();
    let data = expect_text(tree, text_node)?.to_string();
    let len = char_len(&data);
    let index = index.min(len);
    let parent = tree.parent(text_node).ok_or(DomError::NoParent)?;
    let at = tree.index_of(text_node).ok_or(DomError::InvalidNode)?;

    let node = match node {
        Some(node) => node,
        None => return Ok(((text_node, index), (text_node, index))),
    };

    let (prev, next) = split_chars(&data, index);
    let next_len = char_len(next);

    let frag: Vec<NodeId> = if tree.is_text(node) {
        let merged = format!("{}{}{}", prev, tree.text(node).unwrap_or_default(), next);
        if merged.is_empty() {
            Vec::new()
        } else {
            vec![m.create_text(&merged)?]
        }
    } else {
        let mut frag = Vec::with_capacity(3);
        if !prev.is_empty() {
            frag.push(m.create_text(prev)?);
        }
        frag.push(node);
        if !next.is_empty() {
            frag.push(m.create_text(next)?);
        }
        frag
    };

    let start = match frag.first() {
        Some(&first) if index != 0 => (first, index),
        _ => (parent, at),
    };
    let end = match frag.last() {
        Some(&last) if index != len => (last, m.tree().length(last) - next_len),
        _ => (parent, at + frag.len()),
    };

    m.delete_node(text_node)?;
    if !frag.is_empty() {
        m.insert_frag_at(parent, at, &frag)?;
    }
    Ok((start, end))
}

/// Split a text node in two at `index`. A split at either end does not
/// create an empty node; the missing side is `None`.
pub fn split_text_node<M: DomMutator>(
    m: &mut M,
    text_node: NodeId,
    index: usize,
) -> Result<(Option<NodeId>, Option<NodeId>), M::Error> {
    let tree = m.tree();
    let data = expect_text(tree, text_node)?.to_string();
    let len = char_len(&data);
    if index == 0 {
        return Ok((None, Some(text_node)));
    }
    if index >= len {
        return Ok((Some(text_node), None));
    }
    let parent = tree.parent(text_node).ok_or(DomError::NoParent)?;
    let at = tree.index_of(text_node).ok_or(DomError::InvalidNode)?;
    let (prev, next) = split_chars(&data, index);
    let next_node = m.create_text(next)?;
    m.set_text_node_value(text_node, prev)?;
    m.insert_node_at(parent, at + 1, next_node)?;
    Ok((Some(text_node), Some(next_node)))
}

/// Result of [`insert_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextInsertion {
    /// Existing text node that received the text, if any.
    pub modified: Option<NodeId>,
    /// Text node that now holds the inserted text.
    pub text_node: Option<NodeId>,
    /// Boundary right after the inserted text.
    pub caret: Option<Point>,
}

impl TextInsertion {
    pub fn is_noop(&self) -> bool {
        self.text_node.is_none()
    }
}

/// Insert `text` at `(node, index)`, extending an adjacent text node when
/// one exists. Inserting an empty string does nothing.
pub fn insert_text<M: DomMutator>(
    m: &mut M,
    node: NodeId,
    index: usize,
    text: &str,
) -> Result<TextInsertion, M::Error> {
    if text.is_empty() {
        return Ok(TextInsertion::default());
    }
    let added = char_len(text);
    let tree = m.tree();
    let (mut node, mut index) = (node, index);

    if tree.is_element(node) {
        if let Some(child) = tree.child(node, index).filter(|&c| tree.is_text(c)) {
            node = child;
            index = 0;
        } else if let Some(prev) = index
            .checked_sub(1)
            .and_then(|i| tree.child(node, i))
            .filter(|&c| tree.is_text(c))
        {
            node = prev;
            index = tree.length(prev);
        } else {
            let text_node = m.create_text(text)?;
            m.insert_node_at(node, index, text_node)?;
            return Ok(TextInsertion {
                modified: None,
                text_node: Some(text_node),
                caret: Some((text_node, added)),
            });
        }
    }

    let data = expect_text(m.tree(), node)?;
    let index = index.min(char_len(data));
    let (pre, post) = split_chars(data, index);
    let value = format!("{}{}{}", pre, text, post);
    m.set_text_node_value(node, &value)?;
    Ok(TextInsertion {
        modified: Some(node),
        text_node: Some(node),
        caret: Some((node, index + added)),
    })
}

/// Containing element of a boundary point.
fn container_element(tree: &Tree, node: NodeId) -> DomResult<NodeId> {
    if tree.is_text(node) {
        tree.parent(node).ok_or(DomError::NoParent)
    } else if tree.is_element(node) {
        Ok(node)
    } else {
        Err(DomError::unexpected_node_type("text or element"))
    }
}

/// A range is well formed when both ends sit in the same element.
pub fn is_well_formed_range(tree: &Tree, start: Point, end: Point) -> DomResult<bool> {
    Ok(container_element(tree, start.0)? == container_element(tree, end.0)?)
}

/// Remove everything between `start` and `end`, which must be a well
/// formed range. Returns the collapse point and the removed nodes in
/// document order. Partially selected text comes back as new detached
/// text nodes.
pub fn cut<M: DomMutator>(m: &mut M, start: Point, end: Point) -> Result<(Point, Vec<NodeId>), M::Error> {
    if !is_well_formed_range(m.tree(), start, end)? {
        return Err(DomError::MalformedRange.into());
    }

    let (mut start_container, mut start_offset) = start;
    let (mut end_container, mut end_offset) = end;
    let mut start_text = None;
    let final_caret;

    if m.tree().is_text(start_container) && start_offset == 0 {
        let tree = m.tree();
        start_offset = tree.index_of(start_container).ok_or(DomError::InvalidNode)?;
        start_container = tree.parent(start_container).ok_or(DomError::NoParent)?;
    }

    if m.tree().is_text(start_container) {
        let tree = m.tree();
        let parent = tree.parent(start_container).ok_or(DomError::NoParent)?;
        let same_container = start_container == end_container;
        let container_offset = tree.index_of(start_container).ok_or(DomError::InvalidNode)?;
        let data = expect_text(tree, start_container)?;
        let end_text_offset = if same_container {
            end_offset
        } else {
            char_len(data)
        };
        let (_, tail) = split_chars(data, start_offset);
        let (piece, _) = split_chars(tail, end_text_offset.saturating_sub(start_offset));
        let piece_len = char_len(piece);
        let piece = piece.to_string();
        if !piece.is_empty() {
            start_text = Some(m.create_text(&piece)?);
        }
        m.delete_text(start_container, start_offset, piece_len)?;

        let still_attached = m.tree().parent(start_container).is_some();
        final_caret = if still_attached {
            (start_container, start_offset)
        } else {
            (parent, container_offset)
        };

        if same_container {
            return Ok((final_caret, start_text.into_iter().collect()));
        }

        start_offset = if still_attached {
            container_offset + 1
        } else {
            container_offset
        };
        start_container = parent;
    } else {
        final_caret = (start_container, start_offset);
    }

    let mut end_text = None;
    if m.tree().is_text(end_container) {
        let tree = m.tree();
        let parent = tree.parent(end_container).ok_or(DomError::NoParent)?;
        let container_offset = tree.index_of(end_container).ok_or(DomError::InvalidNode)?;
        let (piece, _) = split_chars(expect_text(tree, end_container)?, end_offset);
        let piece = piece.to_string();
        if !piece.is_empty() {
            end_text = Some(m.create_text(&piece)?);
        }
        m.delete_text(end_container, 0, end_offset)?;
        end_offset = container_offset;
        end_container = parent;
    }

    if start_container != end_container || !m.tree().is_element(start_container) {
        return Err(DomError::MalformedRange.into());
    }

    let mut removed = Vec::new();
    let mut cursor = end_offset as isize - 1;
    while cursor >= start_offset as isize {
        let child = m
            .tree()
            .child(end_container, cursor as usize)
            .ok_or(DomError::InvalidNode)?;
        removed.insert(0, child);
        m.delete_node(child)?;
        cursor -= 1;
    }
    if let Some(text) = start_text {
        removed.insert(0, text);
    }
    if let Some(text) = end_text {
        removed.push(text);
    }

    if cursor >= 0 {
        if let Some(before_gap) = m.tree().child(end_container, cursor as usize) {
            m.merge_text_nodes(before_gap)?;
        }
    }
    Ok((final_caret, removed))
}

/// Find the node in `b` that occupies the same structural position as
/// `node` does in `a`. The two subtrees must be structurally identical, as
/// they are right after cloning.
pub fn corresponding_node(a: &Tree, root_a: NodeId, b: &Tree, root_b: NodeId, node: NodeId) -> DomResult<NodeId> {
    let path = node_to_path(a, root_a, node)?;
    path_to_node(b, root_b, &path)?.ok_or(DomError::InvalidNode)
}

pub fn first_descendant_or_self(tree: &Tree, node: NodeId) -> NodeId {
    let mut current = node;
    while let Some(child) = tree.first_child(current) {
        current = child;
    }
    current
}

/// Nearest element from `node` upwards (text nodes start at their parent)
/// matching `pred`. The search stops before reaching `limit`.
pub fn closest<F>(tree: &Tree, node: NodeId, pred: F, limit: Option<NodeId>) -> Option<NodeId>
where
    F: Fn(&Tree, NodeId) -> bool,
{
    let mut current = if tree.is_element(node) {
        Some(node)
    } else {
        tree.parent(node)
    };
    while let Some(id) = current {
        if Some(id) == limit {
            return None;
        }
        if pred(tree, id) {
            return Some(id);
        }
        current = tree.parent(id);
    }
    None
}

pub fn closest_by_class(tree: &Tree, node: NodeId, class: &str, limit: Option<NodeId>) -> Option<NodeId> {
    closest(tree, node, |tree, id| tree.has_class(id, class), limit)
}

/// First descendant of `node` in document order carrying `class`.
pub fn descendant_by_class(tree: &Tree, node: NodeId, class: &str) -> Option<NodeId> {
    tree.descendants(node)
        .into_iter()
        .find(|&id| tree.has_class(id, class))
}

fn is_blank(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_whitespace)
}

/// Next DOM-level caret position after `caret`.
///
/// `white_space_normal` reports whether an element collapses white space;
/// trailing white space in the last text child of such an element is
/// skipped. The walk never leaves `container`. With `no_text`, a result
/// inside a text node is expressed against its parent instead.
pub fn next_caret_position(
    tree: &Tree,
    caret: Point,
    container: Option<NodeId>,
    no_text: bool,
    white_space_normal: &dyn Fn(&Tree, NodeId) -> bool,
) -> Option<Point> {
    let (mut node, mut offset) = caret;
    let mut found = false;

    while !found {
        let parent = tree.parent(node);
        if tree.is_text(node) {
            let parent = parent?;
            let data = tree.text(node).unwrap_or_default();
            let skip_ws = tree.last_child(parent) == Some(node)
                && white_space_normal(tree, parent)
                && is_blank(split_chars(data, offset).1);
            if offset >= tree.length(node) || skip_ws {
                if Some(node) == container {
                    break;
                }
                offset = tree.index_of(node)? + 1;
                node = parent;
            } else {
                offset += 1;
                found = true;
            }
        } else if tree.is_element(node) {
            if offset >= tree.child_count(node) {
                let parent = match parent {
                    Some(parent) if Some(node) != container => parent,
                    _ => break,
                };
                offset = tree.index_of(node)? + 1;
                node = parent;
                found = true;
            } else {
                node = tree.child(node, offset)?;
                offset = 0;
                let enters_text = tree.first_child(node).map_or(false, |c| tree.is_text(c));
                if !enters_text {
                    found = true;
                }
            }
        } else {
            return None;
        }
    }

    if !found {
        return None;
    }
    if no_text && tree.is_text(node) {
        let parent = tree.parent(node)?;
        return Some((parent, tree.index_of(node)?));
    }
    Some((node, offset))
}

/// Previous DOM-level caret position before `caret`. Mirror image of
/// [`next_caret_position`], skipping leading white space in the first
/// text child of a white-space collapsing element.
pub fn prev_caret_position(
    tree: &Tree,
    caret: Point,
    container: Option<NodeId>,
    no_text: bool,
    white_space_normal: &dyn Fn(&Tree, NodeId) -> bool,
) -> Option<Point> {
    let (mut node, offset) = caret;
    let mut offset = offset as isize;
    let mut found = false;

    while !found {
        offset -= 1;
        let parent = tree.parent(node);
        if tree.is_text(node) {
            let parent = parent?;
            let data = tree.text(node).unwrap_or_default();
            let skip_ws = offset >= 0
                && tree.first_child(parent) == Some(node)
                && white_space_normal(tree, parent)
                && is_blank(split_chars(data, offset as usize).0);
            if offset < 0 || skip_ws {
                if Some(node) == container {
                    break;
                }
                offset = tree.index_of(node)? as isize;
                node = parent;
            } else {
                found = true;
            }
        } else if tree.is_element(node) {
            if offset < 0 || tree.child_count(node) == 0 {
                let parent = match parent {
                    Some(parent) if Some(node) != container => parent,
                    _ => break,
                };
                offset = tree.index_of(node)? as isize;
                node = parent;
                found = true;
            } else {
                node = tree.child(node, offset as usize)?;
                if tree.is_element(node) {
                    offset = tree.child_count(node) as isize;
                    let enters_text = tree.last_child(node).map_or(false, |c| tree.is_text(c));
                    if !enters_text {
                        found = true;
                    }
                } else {
                    offset = tree.length(node) as isize + 1;
                }
            }
        } else {
            return None;
        }
    }

    if !found {
        return None;
    }
    if no_text && tree.is_text(node) {
        let parent = tree.parent(node)?;
        return Some((parent, tree.index_of(node)?));
    }
    Some((node, offset.max(0) as usize))
}
