//! # Path Addressing
//!
//! Converts nodes to slash-separated index paths relative to a root and
//! back. Attributes are addressed by a final `@name` segment:
//!
//! ```text
//! ""              the root itself
//! "0/1/2"         third child of the second child of the first child
//! "0/1/@class"    the class attribute of "0/1"
//! ```
//!
//! Paths survive cloning, so they are how undo entries and clone-based
//! operations re-find nodes.

use crate::error::{DomError, DomResult};
use crate::node::{NodeId, Tree};

enum Segment<'a> {
    Index(usize),
    Attribute(&'a str),
}

fn parse(path: &str) -> DomResult<Vec<Segment<'_>>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&str> = path.split('/').collect();
    let last = parts.len() - 1;
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if let Some(name) = part.strip_prefix('@') {
                if i == last && !name.is_empty() {
                    return Ok(Segment::Attribute(name));
                }
            } else if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                return part
                    .parse()
                    .map(Segment::Index)
                    .map_err(|_| DomError::MalformedPath(path.to_string()));
            }
            Err(DomError::MalformedPath(path.to_string()))
        })
        .collect()
}

/// Path of `node` relative to `root`, counting every child.
pub fn node_to_path(tree: &Tree, root: NodeId, node: NodeId) -> DomResult<String> {
    node_to_path_filtered(tree, root, node, |_, _| true)
}

/// Node at `path` under `root`, or `None` when the path dangles past the
/// available children.
pub fn path_to_node(tree: &Tree, root: NodeId, path: &str) -> DomResult<Option<NodeId>> {
    path_to_node_filtered(tree, root, path, |_, _| true)
}

/// Like [`node_to_path`] but only siblings accepted by `counts` take up an
/// index. GUI trees use this to skip decoration so that a GUI node and its
/// data counterpart share a path.
pub fn node_to_path_filtered<F>(tree: &Tree, root: NodeId, node: NodeId, counts: F) -> DomResult<String>
where
    F: Fn(&Tree, NodeId) -> bool,
{
    if !tree.exists(node) || !tree.exists(root) {
        return Err(DomError::InvalidNode);
    }
    if !tree.contains(root, node) {
        return Err(DomError::NotADescendant);
    }

    let mut segments = Vec::new();
    let mut current = node;
    if tree.is_attribute(current) {
        let name = tree.name(current).ok_or(DomError::InvalidNode)?;
        segments.push(format!("@{}", name));
        current = tree.parent(current).ok_or(DomError::NoParent)?;
    }
    while current != root {
        let parent = tree.parent(current).ok_or(DomError::NotADescendant)?;
        let index = tree
            .children(parent)
            .iter()
            .take_while(|&&c| c != current)
            .filter(|&&c| counts(tree, c))
            .count();
        segments.push(index.to_string());
        current = parent;
    }
    segments.reverse();
    Ok(segments.join("/"))
}

pub fn path_to_node_filtered<F>(
    tree: &Tree,
    root: NodeId,
    path: &str,
    counts: F,
) -> DomResult<Option<NodeId>>
where
    F: Fn(&Tree, NodeId) -> bool,
{
    let mut current = root;
    for segment in parse(path)? {
        let found = match segment {
            Segment::Index(index) => tree
                .children(current)
                .iter()
                .copied()
                .filter(|&c| counts(tree, c))
                .nth(index),
            Segment::Attribute(name) => tree.attribute_node(current, name),
        };
        match found {
            Some(node) => current = node,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

impl Tree {
    /// Path of `node` relative to this tree's root.
    pub fn node_to_path(&self, node: NodeId) -> DomResult<String> {
        node_to_path(self, self.root(), node)
    }

    pub fn path_to_node(&self, path: &str) -> DomResult<Option<NodeId>> {
        path_to_node(self, self.root(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, Vec<NodeId>) {
        let mut tree = Tree::new("root");
        let doc = tree.create_element("doc").unwrap();
        tree.append_child(tree.root(), doc).unwrap();
        let mut nodes = Vec::new();
        for i in 0..12 {
            let p = tree.create_element("p").unwrap();
            let text = tree.create_text(&format!("t{}", i)).unwrap();
            tree.append_child(p, text).unwrap();
            tree.append_child(doc, p).unwrap();
            nodes.push(p);
        }
        tree.set_attribute(nodes[1], "class", "x").unwrap();
        (tree, nodes)
    }

    #[test]
    fn test_root_path_is_empty() {
        let (tree, _) = sample();
        assert_eq!(tree.node_to_path(tree.root()).unwrap(), "");
        assert_eq!(tree.path_to_node("").unwrap(), Some(tree.root()));
    }

    #[test]
    fn test_paths_round_trip() {
        let (tree, nodes) = sample();
        for node in tree.descendants(tree.root()) {
            let path = tree.node_to_path(node).unwrap();
            assert_eq!(tree.path_to_node(&path).unwrap(), Some(node));
        }
        let text = tree.first_child(nodes[11]).unwrap();
        assert_eq!(tree.node_to_path(text).unwrap(), "0/11/0");
    }

    #[test]
    fn test_attribute_paths() {
        let (tree, nodes) = sample();
        let attr = tree.attribute_node(nodes[1], "class").unwrap();
        assert_eq!(tree.node_to_path(attr).unwrap(), "0/1/@class");
        assert_eq!(tree.path_to_node("0/1/@class").unwrap(), Some(attr));
    }

    #[test]
    fn test_multi_digit_segments() {
        let (tree, nodes) = sample();
        assert_eq!(tree.path_to_node("0/10").unwrap(), Some(nodes[10]));
        assert_eq!(tree.path_to_node("0/12").unwrap(), None);
    }

    #[test]
    fn test_malformed_paths() {
        let (tree, _) = sample();
        for bad in ["+", "0//1", "0/@", "0/@a/1", "a/1", "-1"] {
            assert!(
                matches!(tree.path_to_node(bad), Err(DomError::MalformedPath(_))),
                "{} should be malformed",
                bad
            );
        }
    }

    #[test]
    fn test_node_outside_root_fails() {
        let (mut tree, nodes) = sample();
        let loose = tree.create_element("q").unwrap();
        assert_eq!(tree.node_to_path(loose), Err(DomError::NotADescendant));
        assert_eq!(
            node_to_path(&tree, nodes[0], nodes[1]),
            Err(DomError::NotADescendant)
        );
    }

    #[test]
    fn test_filtered_paths_skip_siblings() {
        let (tree, nodes) = sample();
        let odd_only = |tree: &Tree, node: NodeId| {
            tree.index_of(node).map_or(true, |i| tree.parent(node) != tree.document_element() || i % 2 == 1)
        };
        let path = node_to_path_filtered(&tree, tree.root(), nodes[5], odd_only).unwrap();
        assert_eq!(path, "0/2");
        assert_eq!(
            path_to_node_filtered(&tree, tree.root(), "0/2", odd_only).unwrap(),
            Some(nodes[5])
        );
    }
}
