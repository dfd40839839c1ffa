//! # GUI Updater
//!
//! Keeps the GUI tree in step with the data tree. It listens to the data
//! tree updater and replays every primitive on the GUI tree through its own
//! [`TreeUpdater`], so GUI-side listeners see the same mutate-then-notify
//! contract as data-side ones.
//!
//! ## Shape of the GUI tree
//!
//! ```text
//! data:  <p a="1">ab<b/></p>
//! gui:   <div class="_real p" data-wed-a="1">
//!          <span class="_gui _start_wrapper __start_label _label">…</span>
//!          ab
//!          <div class="_real b">start label, placeholder, end label</div>
//!          <span class="_gui _end_wrapper __end_label _label">…</span>
//!        </div>
//! ```
//!
//! Real nodes are linked to their data counterparts in a [`MirrorMap`].
//! Decoration is built by the [`Mode`] and never linked, except attribute
//! value spans in `edit` mode, which mirror data attribute nodes.

use std::rc::Rc;

use tracing::{debug, instrument};
use wed_dom::path::node_to_path_filtered;
use wed_dom::{DomError, NodeId, Tree};

use crate::errors::EditorResult;
use crate::events::{Listener, TreeEvent};
use crate::guard::Reentrancy;
use crate::mirror::MirrorMap;
use crate::mode::{self, encode_attribute_name, AttributeMode, Mode};
use crate::tree_updater::TreeUpdater;

/// Whether a GUI child counts as content rather than decoration.
pub fn is_content(gui: &Tree, node: NodeId) -> bool {
    gui.is_text(node) || gui.has_class(node, mode::REAL) || gui.has_class(node, mode::PHANTOM_WRAP)
}

pub struct GuiUpdater {
    updater: TreeUpdater,
    mirror: MirrorMap,
    mode: Rc<dyn Mode>,
    attributes: AttributeMode,
    placeholders: bool,
    maintaining: Reentrancy,
}

impl GuiUpdater {
    /// Build the decorated mirror of `data` and link it.
    pub fn new(data: &Tree, mode: Rc<dyn Mode>, attributes: AttributeMode, placeholders: bool) -> EditorResult<Self> {
        let mut gui = Tree::new("div");
        let gui_root = gui.root();
        for &child in data.children(data.root()) {
            let bare = build_bare(data, child, &mut gui)?;
            gui.append_child(gui_root, bare)?;
        }

        let mut this = Self {
            updater: TreeUpdater::new(Tree::new("div")),
            mirror: MirrorMap::new(),
            mode,
            attributes,
            placeholders,
            maintaining: Reentrancy::new(),
        };
        this.mirror.link(data, data.root(), &gui, gui_root)?;
        for &child in data.children(data.root()) {
            this.decorator().decorate(data, child, &mut gui)?;
        }
        this.updater = TreeUpdater::new(gui);
        debug!(nodes = this.updater.tree().len(), "built GUI tree");
        Ok(this)
    }

    fn decorator(&mut self) -> Decorator<'_> {
        Decorator {
            mirror: &mut self.mirror,
            mode: self.mode.as_ref(),
            attributes: self.attributes,
            placeholders: self.placeholders,
        }
    }

    pub fn tree(&self) -> &Tree {
        self.updater.tree()
    }

    pub fn root(&self) -> NodeId {
        self.updater.tree().root()
    }

    pub fn mirror(&self) -> &MirrorMap {
        &self.mirror
    }

    pub fn mode(&self) -> &dyn Mode {
        self.mode.as_ref()
    }

    pub fn attributes(&self) -> AttributeMode {
        self.attributes
    }

    /// The GUI tree updater. Mutations made through it are not reflected
    /// in the data tree; use it for decoration only.
    pub fn updater_mut(&mut self) -> &mut TreeUpdater {
        &mut self.updater
    }

    /// Path of a GUI node counting only content, which is the path of
    /// its data counterpart.
    pub fn data_path(&self, gui_node: NodeId) -> EditorResult<String> {
        let gui = self.updater.tree();
        Ok(node_to_path_filtered(gui, gui.root(), gui_node, is_content)?)
    }

    /// GUI child index at which the mirror of `data_node` belongs.
    fn gui_index_for(&self, data: &Tree, data_node: NodeId, gui_parent: NodeId) -> EditorResult<usize> {
        let gui = self.updater.tree();
        if let Some(next) = data.next_sibling(data_node).and_then(|n| self.mirror.to_gui(n)) {
            return Ok(gui.index_of(next).ok_or(DomError::InvalidNode)?);
        }
        if let Some(prev) = data.prev_sibling(data_node).and_then(|n| self.mirror.to_gui(n)) {
            return Ok(gui.index_of(prev).ok_or(DomError::InvalidNode)? + 1);
        }
        let (before, _) = self.mode.nodes_around_editable_contents(gui, gui_parent);
        Ok(before.and_then(|b| gui.index_of(b)).map_or(0, |i| i + 1))
    }

    #[instrument(skip(self, data))]
    fn project_insert(&mut self, data: &Tree, parent: NodeId, node: NodeId) -> EditorResult<()> {
        let gui_parent = self.mirror.require_gui(parent)?;
        let index = self.gui_index_for(data, node, gui_parent)?;
        let bare = build_bare(data, node, self.updater.scratch())?;
        self.mirror.link(data, node, self.updater.tree(), bare)?;
        let decorator = Decorator {
            mirror: &mut self.mirror,
            mode: self.mode.as_ref(),
            attributes: self.attributes,
            placeholders: self.placeholders,
        };
        decorator.decorate(data, node, self.updater.scratch())?;
        self.updater.insert_node_at(gui_parent, index, bare)?;
        self.maintain(gui_parent)
    }

    fn project_delete(&mut self, data: &Tree, node: NodeId) -> EditorResult<()> {
        let gui_node = self.mirror.require_gui(node)?;
        self.mirror.unlink_data(data, node);
        self.mirror.unlink_gui(self.updater.tree(), gui_node);
        let gui_parent = self.updater.tree().parent(gui_node);
        self.updater.delete_node(gui_node)?;
        match gui_parent {
            Some(parent) => self.maintain(parent),
            None => Ok(()),
        }
    }

    fn project_attribute(&mut self, data: &Tree, node: NodeId, name: &str, value: Option<&str>) -> EditorResult<()> {
        let gui_el = self.mirror.require_gui(node)?;
        self.updater.set_attribute(gui_el, &encode_attribute_name(name), value)?;
        self.refresh_start_label(data, node, gui_el)
    }

    /// Rebuild the start label of `gui_el` so it shows current attributes.
    fn refresh_start_label(&mut self, data: &Tree, data_el: NodeId, gui_el: NodeId) -> EditorResult<()> {
        let old = match self.updater.tree().first_child(gui_el) {
            Some(first) if self.updater.tree().has_class(first, mode::START_LABEL) => first,
            _ => return Ok(()),
        };
        if self.attributes == AttributeMode::Hide {
            return Ok(());
        }
        self.mirror.unlink_gui(self.updater.tree(), old);
        let label = self
            .mode
            .start_label(data, data_el, self.updater.scratch(), self.attributes)?;
        self.updater.delete_node(old)?;
        self.updater.insert_node_at(gui_el, 0, label.node)?;
        for (attr, span) in label.attribute_values {
            self.mirror.link_node(attr, span);
        }
        Ok(())
    }

    /// Insert a placeholder into an element left without content, or drop
    /// the placeholder of one that gained content. Transient placeholders
    /// stay until the caret leaves them.
    pub fn maintain(&mut self, el: NodeId) -> EditorResult<()> {
        if !self.placeholders {
            return Ok(());
        }
        let Some(_guard) = self.maintaining.try_enter() else {
            return Ok(());
        };
        let gui = self.updater.tree();
        if !gui.is_attached(el) || !(gui.has_class(el, mode::REAL) || gui.has_class(el, mode::PHANTOM_WRAP)) {
            return Ok(());
        }
        let has_content = gui.children(el).iter().any(|&c| is_content(gui, c));
        let placeholders: Vec<NodeId> = gui
            .children(el)
            .iter()
            .copied()
            .filter(|&c| gui.has_class(c, mode::PLACEHOLDER))
            .collect();

        if !has_content {
            if placeholders.is_empty() {
                let (_, after) = self.mode.nodes_around_editable_contents(gui, el);
                let ph = self.mode.make_placeholder_for(self.updater.scratch(), el)?;
                self.updater.insert_before(el, ph, after)?;
                debug!(element = ?el, "inserted placeholder");
            }
        } else if let Some(&ph) = placeholders.iter().find(|&&p| !gui.has_class(p, mode::TRANSIENT)) {
            self.updater.delete_node(ph)?;
            debug!(element = ?el, "removed placeholder");
        }
        Ok(())
    }

    /// Insert a transient placeholder at `(el, index)`. It survives content
    /// changes and is removed when the caret leaves it.
    pub fn insert_transient_placeholder(&mut self, el: NodeId, index: usize) -> EditorResult<NodeId> {
        let ph = self.mode.make_placeholder_for(self.updater.scratch(), el)?;
        self.updater.scratch().add_class(ph, mode::TRANSIENT)?;
        self.updater.insert_node_at(el, index, ph)?;
        Ok(ph)
    }

    /// Remove a decoration node, keeping placeholders consistent.
    pub fn remove_decoration(&mut self, node: NodeId) -> EditorResult<()> {
        let parent = self.updater.tree().parent(node);
        self.updater.delete_node(node)?;
        match parent {
            Some(parent) => self.maintain(parent),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for GuiUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuiUpdater")
            .field("nodes", &self.updater.tree().len())
            .field("linked", &self.mirror.len())
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl Listener<TreeEvent, Tree> for GuiUpdater {
    fn on_event(&mut self, event: &TreeEvent, data: &Tree) -> EditorResult<()> {
        match event {
            TreeEvent::InsertNodeAt { parent, node, .. } => self.project_insert(data, *parent, *node),
            TreeEvent::SetTextNodeValue { node, value, .. } => {
                let gui_node = self.mirror.require_gui(*node)?;
                self.updater.set_text_node_value(gui_node, value)
            }
            TreeEvent::DeleteNode { node, .. } => self.project_delete(data, *node),
            TreeEvent::SetAttributeNs {
                node,
                attribute,
                new_value,
                ..
            } => self.project_attribute(data, *node, attribute, new_value.as_deref()),
            TreeEvent::BeforeDeleteNode { .. } | TreeEvent::Changed => Ok(()),
        }
    }
}

/// Adds labels, attribute value links and placeholders to a freshly built
/// mirror.
struct Decorator<'a> {
    mirror: &'a mut MirrorMap,
    mode: &'a dyn Mode,
    attributes: AttributeMode,
    placeholders: bool,
}

impl Decorator<'_> {
    fn decorate(mut self, data: &Tree, data_node: NodeId, gui: &mut Tree) -> EditorResult<()> {
        self.decorate_subtree(data, data_node, gui)
    }

    fn decorate_subtree(&mut self, data: &Tree, data_node: NodeId, gui: &mut Tree) -> EditorResult<()> {
        if !data.is_element(data_node) {
            return Ok(());
        }
        let gui_el = self.mirror.require_gui(data_node)?;
        for &child in data.children(data_node) {
            self.decorate_subtree(data, child, gui)?;
        }
        if self.mode.decorates(data, data_node) {
            let label = self.mode.start_label(data, data_node, gui, self.attributes)?;
            gui.insert_child(gui_el, 0, label.node)?;
            for (attr, span) in label.attribute_values {
                self.mirror.link_node(attr, span);
            }
            let end = self.mode.end_label(data, data_node, gui)?;
            gui.append_child(gui_el, end)?;
        }
        if self.placeholders && !gui.children(gui_el).iter().any(|&c| is_content(gui, c)) {
            let (_, after) = self.mode.nodes_around_editable_contents(gui, gui_el);
            let ph = self.mode.make_placeholder_for(gui, gui_el)?;
            let index = after.and_then(|a| gui.index_of(a)).unwrap_or(gui.child_count(gui_el));
            gui.insert_child(gui_el, index, ph)?;
        }
        Ok(())
    }
}

/// Undecorated GUI copy of a data subtree: elements become `div._real`
/// carrying their attributes as `data-wed-*`, text is copied.
fn build_bare(data: &Tree, node: NodeId, gui: &mut Tree) -> EditorResult<NodeId> {
    if data.is_text(node) {
        return Ok(gui.create_text(data.text(node).unwrap_or_default())?);
    }
    if !data.is_element(node) {
        return Err(DomError::unexpected_node_type("text or element").into());
    }
    let el = gui.create_element("div")?;
    let name = data.name(node).unwrap_or_default();
    gui.set_attribute(el, "class", &format!("{} {}", mode::REAL, name))?;
    for &attr in data.attributes(node) {
        let attr_name = data.name(attr).unwrap_or_default();
        gui.set_attribute(el, &encode_attribute_name(attr_name), data.text(attr).unwrap_or_default())?;
    }
    for &child in data.children(node) {
        let gui_child = build_bare(data, child, gui)?;
        gui.append_child(el, gui_child)?;
    }
    Ok(el)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::GenericMode;
    use std::cell::RefCell;
    use wed_dom::xml;

    fn setup(source: &str, attributes: AttributeMode) -> (TreeUpdater, Rc<RefCell<GuiUpdater>>) {
        let data = xml::parse(source).unwrap();
        let gui = GuiUpdater::new(&data, Rc::new(GenericMode), attributes, true).unwrap();
        let gui = Rc::new(RefCell::new(gui));
        let mut updater = TreeUpdater::new(data);
        updater.subscribe(Rc::clone(&gui));
        (updater, gui)
    }

    fn data_node(u: &TreeUpdater, path: &str) -> NodeId {
        u.path_to_node(path).unwrap().unwrap()
    }

    #[test]
    fn test_initial_mirror_is_decorated() {
        let (u, gui) = setup("<doc><p>ab</p></doc>", AttributeMode::Hide);
        let gui = gui.borrow();
        let p = gui.mirror().to_gui(data_node(&u, "0/0")).unwrap();
        let tree = gui.tree();
        assert!(tree.has_class(p, "_real"));
        assert!(tree.has_class(p, "p"));
        let children = tree.children(p);
        assert_eq!(children.len(), 3);
        assert!(tree.has_class(children[0], mode::START_LABEL));
        assert_eq!(tree.text(children[1]), Some("ab"));
        assert!(tree.has_class(children[2], mode::END_LABEL));
    }

    #[test]
    fn test_empty_element_gets_placeholder() {
        let (u, gui) = setup("<doc><p/></doc>", AttributeMode::Hide);
        let gui = gui.borrow();
        let p = gui.mirror().to_gui(data_node(&u, "0/0")).unwrap();
        assert!(gui.tree().has_class(gui.tree().children(p)[1], mode::PLACEHOLDER));
    }

    #[test]
    fn test_text_insertion_replaces_placeholder() {
        let (mut u, gui) = setup("<doc><p/></doc>", AttributeMode::Hide);
        let p = data_node(&u, "0/0");
        u.insert_text(p, 0, "hi").unwrap();
        let gui = gui.borrow();
        let gp = gui.mirror().to_gui(p).unwrap();
        let tree = gui.tree();
        assert_eq!(tree.child_count(gp), 3);
        assert_eq!(tree.text(tree.children(gp)[1]), Some("hi"));
        let data_text = data_node(&u, "0/0/0");
        assert_eq!(gui.mirror().to_gui(data_text), Some(tree.children(gp)[1]));
    }

    #[test]
    fn test_delete_restores_placeholder_and_unlinks() {
        let (mut u, gui) = setup("<doc><p><b/></p></doc>", AttributeMode::Hide);
        let b = data_node(&u, "0/0/0");
        let p = data_node(&u, "0/0");
        u.delete_node(b).unwrap();
        let gui = gui.borrow();
        assert_eq!(gui.mirror().to_gui(b), None);
        let gp = gui.mirror().to_gui(p).unwrap();
        assert!(gui.tree().has_class(gui.tree().children(gp)[1], mode::PLACEHOLDER));
    }

    #[test]
    fn test_insertion_lands_next_to_mirrored_sibling() {
        let (mut u, gui) = setup("<doc><p>ab<b/></p></doc>", AttributeMode::Hide);
        let p = data_node(&u, "0/0");
        let i = u.scratch().create_element("i").unwrap();
        u.insert_node_at(p, 1, i).unwrap();
        let gui = gui.borrow();
        let gi = gui.mirror().to_gui(i).unwrap();
        assert_eq!(gui.data_path(gi).unwrap(), "0/0/1");
        assert_eq!(gui.tree().index_of(gi), Some(2));
    }

    #[test]
    fn test_text_value_is_replayed() {
        let (mut u, gui) = setup("<doc>ab</doc>", AttributeMode::Hide);
        let text = data_node(&u, "0/0");
        u.set_text_node_value(text, "abc").unwrap();
        let gui = gui.borrow();
        let gt = gui.mirror().to_gui(text).unwrap();
        assert_eq!(gui.tree().text(gt), Some("abc"));
    }

    #[test]
    fn test_attribute_change_refreshes_label() {
        let (mut u, gui) = setup("<doc a=\"1\"/>", AttributeMode::Edit);
        let doc = data_node(&u, "0");
        u.set_attribute(doc, "a", Some("2")).unwrap();
        let gui = gui.borrow();
        let gd = gui.mirror().to_gui(doc).unwrap();
        let tree = gui.tree();
        assert_eq!(tree.get_attribute(gd, "data-wed-a"), Some("2"));
        let attr = data_node(&u, "0/@a");
        let span = gui.mirror().to_gui(attr).unwrap();
        assert!(tree.has_class(span, mode::ATTRIBUTE_VALUE));
        assert_eq!(tree.text_content(span), "2");
        assert!(tree.contains(gd, span));
    }
}
