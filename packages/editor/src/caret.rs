//! # Caret Engine
//!
//! Caret stops and GUI/data location mapping.
//!
//! The caret lives in the GUI tree. [`position_right`] and
//! [`position_left`] take DOM-level steps with
//! [`wed_dom::domutil::next_caret_position`] /
//! [`wed_dom::domutil::prev_caret_position`] and then filter the result:
//!
//! - a position inside a `_gui` widget normalizes to its element name, or
//!   to the widget's start, instead of entering it
//! - `_phantom` content is skipped as a unit
//! - only the first position of a `_placeholder` is a stop
//! - no stop between a label and the element it labels, nor next to a
//!   validation error marker
//! - no stop among the decoration before or after editable contents
//!
//! A rejected position becomes the starting point of the next step. All
//! functions here are pure in the trees they are given.

use wed_dom::domutil::{closest, closest_by_class, descendant_by_class, next_caret_position, prev_caret_position};
use wed_dom::{DLoc, DomError, NodeId, Point, Tree};

use crate::errors::EditorResult;
use crate::gui_updater::GuiUpdater;
use crate::mode::{self, AttributeMode};

/// What the caret functions need to see: both trees, their mirror, the
/// decoration mode and the layout's white-space policy.
pub struct CaretContext<'a> {
    pub gui: &'a GuiUpdater,
    pub data: &'a Tree,
    pub white_space_normal: &'a dyn Fn(&Tree, NodeId) -> bool,
}

impl<'a> CaretContext<'a> {
    pub fn new(gui: &'a GuiUpdater, data: &'a Tree, white_space_normal: &'a dyn Fn(&Tree, NodeId) -> bool) -> Self {
        Self {
            gui,
            data,
            white_space_normal,
        }
    }

    fn tree(&self) -> &'a Tree {
        self.gui.tree()
    }

    fn root(&self) -> NodeId {
        self.gui.root()
    }

    fn class_above(&self, node: NodeId, class: &str) -> Option<NodeId> {
        closest_by_class(self.tree(), node, class, Some(self.root()))
    }

    fn visible_gui_above(&self, node: NodeId) -> Option<NodeId> {
        closest(
            self.tree(),
            node,
            |t, id| t.has_class(id, mode::GUI) && !t.has_class(id, mode::INVISIBLE),
            Some(self.root()),
        )
    }

    /// Walks never leave the document element, unless the document is
    /// nothing but a placeholder.
    fn container(&self) -> NodeId {
        let tree = self.tree();
        match tree.first_child(self.root()) {
            Some(first) if !tree.has_class(first, mode::PLACEHOLDER) => first,
            _ => self.root(),
        }
    }

    fn make(&self, point: Point) -> Option<DLoc> {
        DLoc::make(self.tree(), point.0, point.1).ok()
    }

    fn is_visible_gui(&self, node: Option<NodeId>) -> bool {
        let tree = self.tree();
        node.map_or(false, |n| {
            tree.is_element(n) && tree.has_class(n, mode::GUI) && !tree.has_class(n, mode::INVISIBLE)
        })
    }

    /// Between two elements that both carry visible labels.
    fn between_decorated(&self, prev: Option<NodeId>, next: Option<NodeId>) -> bool {
        let tree = self.tree();
        match (prev, next) {
            (Some(prev), Some(next)) => {
                self.is_visible_gui(tree.first_child(next)) && self.is_visible_gui(tree.last_child(prev))
            }
            _ => false,
        }
    }

    /// Whether `offset` in `el` is among the decoration around its
    /// editable contents.
    fn outside_editable(&self, el: NodeId, offset: usize) -> bool {
        let tree = self.tree();
        let (before, after) = self.gui.mode().nodes_around_editable_contents(tree, el);
        let before_blocks = before.and_then(|b| tree.index_of(b)).map_or(false, |i| i >= offset);
        let after_blocks = after.and_then(|a| tree.index_of(a)).map_or(false, |i| i < offset);
        before_blocks || after_blocks
    }

    /// Caret target inside an attribute value span: its text when it has
    /// some, the span otherwise.
    fn attribute_value_node(&self, value: NodeId) -> NodeId {
        let tree = self.tree();
        tree.first_child(value).filter(|&c| tree.is_text(c)).unwrap_or(value)
    }

    fn child_by_class(&self, el: NodeId, class: &str) -> Option<NodeId> {
        let tree = self.tree();
        tree.children(el).iter().copied().find(|&c| tree.has_class(c, class))
    }

    fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let tree = self.tree();
        std::iter::successors(tree.next_sibling(node), |&n| tree.next_sibling(n)).find(|&n| tree.is_element(n))
    }

    fn prev_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let tree = self.tree();
        std::iter::successors(tree.prev_sibling(node), |&n| tree.prev_sibling(n)).find(|&n| tree.is_element(n))
    }

    fn labelled_target(&self, node: NodeId, gui: NodeId, start_label: bool) -> NodeId {
        let tree = self.tree();
        let in_label = start_label
            || tree.has_class(gui, mode::LABEL)
            || closest_by_class(tree, node, mode::LABEL, Some(gui)).is_some();
        if in_label {
            descendant_by_class(tree, gui, mode::ELEMENT_NAME).unwrap_or(gui)
        } else {
            gui
        }
    }
}

/// Next valid caret stop after `pos`, or `None` at the end of the
/// document.
pub fn position_right(ctx: &CaretContext<'_>, pos: &DLoc) -> Option<DLoc> {
    let tree = ctx.tree();
    let edit_attributes = ctx.gui.attributes() == AttributeMode::Edit;
    let mut pos = pos.point();

    if let Some(ph) = ctx.class_above(pos.0, mode::PLACEHOLDER) {
        pos = (tree.parent(ph)?, tree.index_of(ph)? + 1);
    }

    loop {
        let gui_before = ctx.class_above(pos.0, mode::GUI);
        pos = next_caret_position(tree, pos, Some(ctx.container()), false, ctx.white_space_normal)?;
        let (node, offset) = pos;

        if let Some(gui) = ctx.visible_gui_above(node) {
            let start_label = tree.has_class(gui, mode::START_LABEL);
            if edit_attributes && start_label {
                if ctx.class_above(node, mode::ATTRIBUTE_VALUE).is_some() {
                    break;
                }
                let in_name_or_attribute = closest(
                    tree,
                    node,
                    |t, id| t.has_class(id, mode::ELEMENT_NAME) || t.has_class(id, mode::ATTRIBUTE),
                    Some(ctx.root()),
                )
                .is_some();
                if in_name_or_attribute {
                    let next_attr = tree.descendants(gui).into_iter().find(|&a| {
                        tree.has_class(a, mode::ATTRIBUTE)
                            && !tree.contains(a, node)
                            && tree.document_order(node, a).is_lt()
                    });
                    if let Some(value) = next_attr.and_then(|a| ctx.child_by_class(a, mode::ATTRIBUTE_VALUE)) {
                        pos = (ctx.attribute_value_node(value), 0);
                        break;
                    }
                }
            }

            if gui_before == Some(gui) {
                pos = (gui, tree.child_count(gui));
                continue;
            }
            pos = (ctx.labelled_target(node, gui, start_label), 0);
            break;
        }

        if let Some(phantom) = ctx.class_above(node, mode::PHANTOM) {
            pos = (phantom, tree.child_count(phantom));
            continue;
        }

        if let Some(ph) = ctx.class_above(node, mode::PLACEHOLDER) {
            if offset > 0 {
                pos = (ph, tree.child_count(ph));
                continue;
            }
        }

        if tree.is_element(node) {
            let next = tree.child(node, offset);
            if next.map_or(false, |n| tree.is_text(n)) {
                continue;
            }
            let prev = offset.checked_sub(1).and_then(|i| tree.child(node, i));
            if ctx.between_decorated(prev, next) {
                break;
            }
            if let Some(prev) = prev.filter(|&p| tree.is_element(p)) {
                let before_element = next.map_or(false, |n| {
                    tree.is_element(n)
                        && !tree.has_class(n, mode::END_WRAPPER)
                        && !tree.has_class(prev, mode::START_WRAPPER)
                });
                let after_marker = tree.has_class(prev, mode::VALIDATION_ERROR)
                    || (tree.has_class(prev, mode::GUI) && tree.has_class(prev, mode::END_LABEL));
                if before_element || after_marker {
                    continue;
                }
            }
            if ctx.outside_editable(node, offset) {
                continue;
            }
        }
        break;
    }

    ctx.make(pos)
}

/// Previous valid caret stop before `pos`, or `None` at the start of the
/// document.
pub fn position_left(ctx: &CaretContext<'_>, pos: &DLoc) -> Option<DLoc> {
    let tree = ctx.tree();
    let edit_attributes = ctx.gui.attributes() == AttributeMode::Edit;
    let mut pos = pos.point();

    if let Some(ph) = ctx.class_above(pos.0, mode::PLACEHOLDER) {
        pos = (tree.parent(ph)?, tree.index_of(ph)?);
    }

    loop {
        let name = ctx.class_above(pos.0, mode::ELEMENT_NAME);
        let was_in_name = name == Some(pos.0) && pos.1 == 0;

        pos = prev_caret_position(tree, pos, Some(ctx.container()), false, ctx.white_space_normal)?;
        let (node, offset) = pos;

        if let Some(gui) = ctx.visible_gui_above(node) {
            let start_label = tree.has_class(gui, mode::START_LABEL);
            if edit_attributes && start_label && !was_in_name {
                if closest_by_class(tree, node, mode::ATTRIBUTE_VALUE, Some(gui)).is_some() {
                    break;
                }

                let attr = closest_by_class(tree, node, mode::ATTRIBUTE, Some(gui))
                    .or_else(|| {
                        ctx.next_element_sibling(node)
                            .filter(|&n| tree.has_class(n, mode::ATTRIBUTE))
                    })
                    .or_else(|| {
                        closest_by_class(tree, node, mode::ELEMENT_NAME, Some(gui))
                            .and_then(|n| ctx.next_element_sibling(n))
                    });
                let prev_attr = attr
                    .and_then(|a| ctx.prev_element_sibling(a))
                    .or_else(|| {
                        tree.descendants(gui)
                            .into_iter()
                            .filter(|&a| tree.has_class(a, mode::ATTRIBUTE))
                            .last()
                    })
                    .filter(|&a| tree.has_class(a, mode::ATTRIBUTE));

                if let Some(value) = prev_attr.and_then(|a| ctx.child_by_class(a, mode::ATTRIBUTE_VALUE)) {
                    pos = match tree.last_child(value) {
                        Some(last) if tree.has_class(last, mode::PLACEHOLDER) => (last, 0),
                        Some(last) => (last, tree.length(last)),
                        None => (value, 0),
                    };
                    break;
                }
            }

            if !was_in_name {
                pos = (ctx.labelled_target(node, gui, start_label), 0);
                break;
            }
            pos = (gui, 0);
            continue;
        }

        if let Some(ph) = ctx.class_above(node, mode::PLACEHOLDER) {
            pos = (tree.first_child(ph).unwrap_or(ph), 0);
            break;
        }

        if let Some(phantom) = ctx.class_above(node, mode::PHANTOM) {
            pos = (phantom, 0);
            continue;
        }

        if tree.is_element(node) {
            let prev = offset.checked_sub(1).and_then(|i| tree.child(node, i));
            if prev.map_or(false, |p| tree.is_text(p)) {
                continue;
            }
            let next = tree.child(node, offset);
            if ctx.between_decorated(prev, next) {
                break;
            }
            if let Some(next) = next.filter(|&n| tree.is_element(n)) {
                let after_element = prev.map_or(false, |p| {
                    tree.is_element(p)
                        && !tree.has_class(p, mode::START_WRAPPER)
                        && !tree.has_class(next, mode::END_WRAPPER)
                });
                let before_marker = (tree.has_class(next, mode::GUI) && tree.has_class(next, mode::START_LABEL))
                    || tree.has_class(next, mode::VALIDATION_ERROR);
                if after_element || before_marker {
                    continue;
                }
            }
            if ctx.outside_editable(node, offset) {
                continue;
            }
        }
        break;
    }

    ctx.make(pos)
}

/// A caret inside a placeholder stands for the position of the
/// placeholder in its parent.
pub fn normalize_caret(gui: &Tree, root: NodeId, loc: &DLoc) -> DLoc {
    match closest_by_class(gui, loc.node, mode::PLACEHOLDER, Some(root)) {
        Some(ph) => match (gui.parent(ph), gui.index_of(ph)) {
            (Some(parent), Some(index)) => DLoc {
                node: parent,
                offset: index,
                ..*loc
            },
            _ => *loc,
        },
        None => *loc,
    }
}

/// Map a GUI location to the data tree.
///
/// Locations inside decoration have no data counterpart: the result is
/// `None` unless `closest` is set, in which case the location is moved
/// to the boundary of the outermost decoration around it.
pub fn to_data_location(ctx: &CaretContext<'_>, loc: &DLoc, closest: bool) -> EditorResult<Option<DLoc>> {
    let tree = ctx.tree();
    let root = ctx.root();
    let mirror = ctx.gui.mirror();
    let (mut node, mut offset) = loc.point();

    let in_value = ctx.class_above(node, mode::ATTRIBUTE_VALUE);
    let linked_value = in_value.and_then(|v| mirror.to_data(v).map(|attr| (v, attr)));

    if linked_value.is_none() {
        let mut top = None;
        let mut check = if tree.is_text(node) { tree.parent(node) } else { Some(node) };
        while let Some(id) = check {
            if tree.has_class(id, mode::PHANTOM) || tree.has_class(id, mode::GUI) {
                if !closest {
                    return Ok(None);
                }
                top = Some(id);
            }
            if id == root {
                break;
            }
            check = tree.parent(id);
        }
        if let Some(top) = top {
            node = tree.parent(top).ok_or(DomError::NoParent)?;
            offset = tree.index_of(top).ok_or(DomError::InvalidNode)?;
        }
    }

    if let Some((value, attr)) = linked_value {
        let len = ctx.data.length(attr);
        let offset = if tree.is_text(node) {
            offset
        } else if node == value && offset > 0 {
            len
        } else {
            0
        };
        return Ok(Some(DLoc::make(ctx.data, attr, offset.min(len))?));
    }

    let normalized = normalize_caret(tree, root, &DLoc { node, offset, ..*loc });
    let (node, offset) = normalized.point();

    if tree.is_text(node) {
        let data_node = mirror.require_data(node)?;
        return Ok(Some(DLoc::make(ctx.data, data_node, offset)?));
    }

    let data_node = mirror.require_data(node)?;
    let data_offset = tree.children(node)[..offset.min(tree.child_count(node))]
        .iter()
        .filter(|&&c| mirror.to_data(c).is_some())
        .count();
    Ok(Some(DLoc::make(ctx.data, data_node, data_offset)?))
}

/// Map a data location to the GUI tree. Element offsets are clamped into
/// the editable contents of the GUI element.
pub fn from_data_location(ctx: &CaretContext<'_>, loc: &DLoc) -> EditorResult<DLoc> {
    let tree = ctx.tree();
    let data = ctx.data;
    let mirror = ctx.gui.mirror();
    let (node, offset) = loc.point();

    if data.is_attribute(node) {
        let value = mirror.require_gui(node)?;
        let target = ctx.attribute_value_node(value);
        let offset = if target == value { 0 } else { offset.min(tree.length(target)) };
        return Ok(DLoc::make(tree, target, offset)?);
    }

    let gui_node = mirror.require_gui(node)?;
    if data.is_text(node) {
        return Ok(DLoc::make(tree, gui_node, offset)?);
    }

    let (before, after) = ctx.gui.mode().nodes_around_editable_contents(tree, gui_node);
    let mut gui_offset = if let Some(child) = data.child(node, offset) {
        tree.index_of(mirror.require_gui(child)?).ok_or(DomError::InvalidNode)?
    } else if let Some(prev) = offset.checked_sub(1).and_then(|i| data.child(node, i)) {
        tree.index_of(mirror.require_gui(prev)?).ok_or(DomError::InvalidNode)? + 1
    } else {
        before.and_then(|b| tree.index_of(b)).map_or(0, |i| i + 1)
    };

    match before.and_then(|b| tree.index_of(b)) {
        Some(first) if gui_offset <= first => gui_offset = first + 1,
        _ => {
            let second = after
                .and_then(|a| tree.index_of(a))
                .unwrap_or(tree.child_count(gui_node));
            gui_offset = gui_offset.min(second);
        }
    }
    Ok(DLoc::make(tree, gui_node, gui_offset)?)
}

/// Names of the data elements from the document element down to the one
/// holding `loc`.
pub fn location_labels(ctx: &CaretContext<'_>, loc: &DLoc) -> EditorResult<Vec<String>> {
    let Some(data_loc) = to_data_location(ctx, loc, true)? else {
        return Ok(Vec::new());
    };
    let data = ctx.data;
    let start = if data.is_element(data_loc.node) {
        Some(data_loc.node)
    } else {
        data.parent(data_loc.node)
    };
    let mut labels: Vec<String> = std::iter::successors(start, |&n| data.parent(n))
        .filter(|&n| n != data.root() && data.is_element(n))
        .filter_map(|n| data.name(n).map(str::to_string))
        .collect();
    labels.reverse();
    Ok(labels)
}
