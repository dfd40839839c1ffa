//! Bidirectional node association between the data tree and the GUI tree.
//!
//! Every real GUI node maps to exactly one data node and back. Decoration
//! nodes are never linked. The map is keyed by arena ids, which stay
//! stable for as long as a node exists.

use std::collections::HashMap;

use tracing::trace;
use wed_dom::{NodeId, Tree};

use crate::errors::{EditorError, EditorResult};

#[derive(Debug, Default)]
pub struct MirrorMap {
    data_to_gui: HashMap<NodeId, NodeId>,
    gui_to_data: HashMap<NodeId, NodeId>,
}

impl MirrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data_to_gui.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_to_gui.is_empty()
    }

    /// Associate a single pair, replacing any previous association of
    /// either node.
    pub fn link_node(&mut self, data: NodeId, gui: NodeId) {
        if let Some(old_gui) = self.data_to_gui.insert(data, gui) {
            self.gui_to_data.remove(&old_gui);
        }
        if let Some(old_data) = self.gui_to_data.insert(gui, data) {
            if old_data != data {
                self.data_to_gui.remove(&old_data);
            }
        }
    }

    /// Walk two structurally identical subtrees in lock-step and link each
    /// pair of nodes.
    pub fn link(&mut self, data_tree: &Tree, data: NodeId, gui_tree: &Tree, gui: NodeId) -> EditorResult<()> {
        let data_children = data_tree.children(data);
        let gui_children = gui_tree.children(gui);
        if data_children.len() != gui_children.len()
            || data_tree.node_type(data) != gui_tree.node_type(gui)
        {
            return Err(EditorError::NotMirrored(data));
        }
        self.link_node(data, gui);
        for (&d, &g) in data_children.iter().zip(gui_children) {
            self.link(data_tree, d, gui_tree, g)?;
        }
        Ok(())
    }

    /// Drop every association under the data subtree `data`.
    pub fn unlink_data(&mut self, data_tree: &Tree, data: NodeId) {
        for id in std::iter::once(data).chain(data_tree.descendants(data)) {
            for &attr in data_tree.attributes(id) {
                self.unlink_data_node(attr);
            }
            self.unlink_data_node(id);
        }
        trace!(node = ?data, "unlinked data subtree");
    }

    /// Drop every association under the GUI subtree `gui`.
    pub fn unlink_gui(&mut self, gui_tree: &Tree, gui: NodeId) {
        for id in std::iter::once(gui).chain(gui_tree.descendants(gui)) {
            if let Some(data) = self.gui_to_data.remove(&id) {
                self.data_to_gui.remove(&data);
            }
        }
    }

    fn unlink_data_node(&mut self, data: NodeId) {
        if let Some(gui) = self.data_to_gui.remove(&data) {
            self.gui_to_data.remove(&gui);
        }
    }

    pub fn to_gui(&self, data: NodeId) -> Option<NodeId> {
        self.data_to_gui.get(&data).copied()
    }

    pub fn to_data(&self, gui: NodeId) -> Option<NodeId> {
        self.gui_to_data.get(&gui).copied()
    }

    pub fn require_gui(&self, data: NodeId) -> EditorResult<NodeId> {
        self.to_gui(data).ok_or(EditorError::NotMirrored(data))
    }

    pub fn require_data(&self, gui: NodeId) -> EditorResult<NodeId> {
        self.to_data(gui).ok_or(EditorError::NotMirrored(gui))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wed_dom::xml;

    #[test]
    fn test_link_walks_in_lock_step() {
        let data = xml::parse("<doc><p>ab</p></doc>").unwrap();
        let gui = xml::parse("<div><div>ab</div></div>").unwrap();
        let mut map = MirrorMap::new();
        map.link(&data, data.root(), &gui, gui.root()).unwrap();
        let data_text = data.path_to_node("0/0/0").unwrap().unwrap();
        let gui_text = gui.path_to_node("0/0/0").unwrap().unwrap();
        assert_eq!(map.to_gui(data_text), Some(gui_text));
        assert_eq!(map.to_data(gui_text), Some(data_text));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_link_rejects_different_shapes() {
        let data = xml::parse("<doc><p/></doc>").unwrap();
        let gui = xml::parse("<div/>").unwrap();
        let mut map = MirrorMap::new();
        let d = data.document_element().unwrap();
        let g = gui.document_element().unwrap();
        assert!(matches!(map.link(&data, d, &gui, g), Err(EditorError::NotMirrored(_))));
    }

    #[test]
    fn test_unlink_subtree() {
        let data = xml::parse("<doc><p>ab</p><q/></doc>").unwrap();
        let gui = xml::parse("<div><div>ab</div><div/></div>").unwrap();
        let mut map = MirrorMap::new();
        map.link(&data, data.root(), &gui, gui.root()).unwrap();
        let p = data.path_to_node("0/0").unwrap().unwrap();
        let q = data.path_to_node("0/1").unwrap().unwrap();
        map.unlink_data(&data, p);
        assert_eq!(map.to_gui(p), None);
        assert!(map.to_gui(q).is_some());
        let gq = map.to_gui(q).unwrap();
        map.unlink_gui(&gui, gq);
        assert_eq!(map.to_data(gq), None);
        assert_eq!(map.len(), 2);
    }
}
