//! # Layout and Hit Testing
//!
//! The editor core does not render. A [`Layout`] implementation reports
//! the geometry of the GUI tree as some renderer laid it out, and this
//! module turns that geometry into caret locations:
//!
//! ```text
//! (x, y) ─→ element_at_point ─→ find_location_in_element_at ─→ (node, offset)
//!                                                               │
//!                       point_to_char_boundary ←────────────────┘
//!                       (nearest boundary that is a caret stop)
//! ```
//!
//! The [`FakeCaret`] asks the layout where a caret would be drawn by
//! putting a zero-width marker at the caret, measuring it and taking it
//! out again.

use tracing::{debug, trace};
use wed_dom::node::{char_len, split_chars};
use wed_dom::{DLoc, DomError, NodeId, Tree, TreeId};

use crate::caret::{position_left, position_right, CaretContext};
use crate::errors::EditorResult;
use crate::gui_updater::GuiUpdater;
use crate::guard::{Reentrancy, ReentrancyGuard};

/// Class of the marker the fake caret measures.
pub const FAKE_CARET_MARK: &str = "_fake_caret_mark";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// A rect with no area takes no part in hit testing.
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0.0 && self.height() == 0.0
    }

    /// Horizontal and vertical distance from a point to this rect; zero
    /// along an axis when the point is within the rect's extent.
    pub fn distances(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = if x < self.left {
            self.left - x
        } else if x > self.right {
            x - self.right
        } else {
            0.0
        };
        let dy = if y < self.top {
            self.top - y
        } else if y > self.bottom {
            y - self.bottom
        } else {
            0.0
        };
        (dx, dy)
    }
}

/// Geometry of a rendered GUI tree.
pub trait Layout {
    /// Innermost element rendered at a client point.
    fn element_at_point(&self, gui: &Tree, x: f64, y: f64) -> Option<NodeId>;

    /// Line boxes of an element, one rect per line it spans.
    fn client_rects(&self, gui: &Tree, node: NodeId) -> Vec<Rect>;

    /// Box of the character at `index` in a text node.
    fn char_rect(&self, gui: &Tree, text: NodeId, index: usize) -> Option<Rect>;

    /// Whether `el` collapses white space.
    fn white_space_normal(&self, _gui: &Tree, _el: NodeId) -> bool {
        true
    }

    /// Set when the renderer reports a character at a line wrap with a
    /// rect that spans both lines.
    fn wrapped_rects_span_lines(&self) -> bool {
        false
    }
}

struct Nearest {
    dist: (f64, f64),
    node: NodeId,
    start: usize,
}

struct HitSearch<'a> {
    gui: &'a Tree,
    layout: &'a dyn Layout,
    x: f64,
    y: f64,
    nearest: Option<Nearest>,
}

impl HitSearch<'_> {
    fn rects_of(&self, node: NodeId, start: usize) -> Vec<Rect> {
        if self.gui.is_text(node) {
            self.layout.char_rect(self.gui, node, start).into_iter().collect()
        } else {
            self.gui
                .child(node, start)
                .map(|child| self.layout.client_rects(self.gui, child))
                .unwrap_or_default()
        }
    }

    /// Returns true when the search cannot get any better.
    fn check(&mut self, node: NodeId, start: usize, rects: Option<Vec<Rect>>) -> bool {
        let rects = rects.unwrap_or_else(|| self.rects_of(node, start));
        for rect in rects.iter().filter(|r| !r.is_degenerate()) {
            let (dx, dy) = rect.distances(self.x, self.y);
            let better = match &self.nearest {
                None => true,
                Some(n) => n.dist.1 > dy || (n.dist.1 == dy && n.dist.0 > dx),
            };
            if better {
                self.nearest = Some(Nearest {
                    dist: (dx, dy),
                    node,
                    start,
                });
                return dx == 0.0 && dy == 0.0;
            }
        }
        false
    }

    /// Skips characters whose rect straddles a line wrap; for the last
    /// character of a node the rect is rebuilt from its neighbour.
    fn check_wrapped(&mut self, node: NodeId, start: usize) -> bool {
        if self.gui.is_text(node) {
            let len = self.gui.length(node);
            if len == 0 {
                return false;
            }
            if len > 1 {
                let rect = |i: usize| self.layout.char_rect(self.gui, node, i);
                if start > 0 && start < len - 1 {
                    if let (Some(prev), Some(next)) = (rect(start - 1), rect(start + 1)) {
                        if prev.top != next.top {
                            return false;
                        }
                    }
                } else if start == 0 {
                    if let (Some(this), Some(next)) = (rect(0), rect(1)) {
                        if this.top != next.top {
                            return false;
                        }
                    }
                } else if start == len - 1 {
                    if let (Some(this), Some(prev)) = (rect(start), rect(start - 1)) {
                        if this.bottom != prev.bottom {
                            let salvaged = Rect::new(prev.right, this.top, this.right, prev.bottom);
                            return self.check(node, start, Some(vec![salvaged]));
                        }
                    }
                }
            }
        }
        self.check(node, start, None)
    }
}

/// The character boundary closest to `(x, y)` among the children of
/// `node`. Ties go to the first candidate in document order. Without
/// `text_ok`, text children are measured as a whole.
pub fn find_location_in_element_at(
    gui: &Tree,
    layout: &dyn Layout,
    node: NodeId,
    x: f64,
    y: f64,
    text_ok: bool,
) -> (NodeId, usize) {
    let wrapped = layout.wrapped_rects_span_lines();
    let mut search = HitSearch {
        gui,
        layout,
        x,
        y,
        nearest: None,
    };

    'children: for (index, &child) in gui.children(node).iter().enumerate() {
        if text_ok && gui.is_text(child) {
            for i in 0..gui.length(child) {
                let done = if wrapped {
                    search.check_wrapped(child, i)
                } else {
                    search.check(child, i, None)
                };
                if done {
                    break 'children;
                }
            }
        } else {
            let done = if wrapped {
                search.check_wrapped(node, index)
            } else {
                search.check(node, index, None)
            };
            if done {
                break;
            }
        }
    }

    search.nearest.map_or((node, 0), |n| (n.node, n.start))
}

/// Location of the character under `(x, y)`, or `None` when the point is
/// outside the editing pane.
pub fn find_location_at(gui: &Tree, root: NodeId, layout: &dyn Layout, x: f64, y: f64) -> Option<(NodeId, usize)> {
    let el = layout.element_at_point(gui, x, y)?;
    if !gui.contains(root, el) {
        return None;
    }
    Some(find_location_in_element_at(gui, layout, el, x, y, true))
}

/// Horizontal position at which a caret at `loc` would be drawn.
fn boundary_x(gui: &Tree, layout: &dyn Layout, loc: &DLoc) -> Option<f64> {
    let (node, offset) = loc.point();
    if gui.is_text(node) {
        if offset < gui.length(node) {
            return layout.char_rect(gui, node, offset).map(|r| r.left);
        }
        return offset
            .checked_sub(1)
            .and_then(|i| layout.char_rect(gui, node, i))
            .map(|r| r.right);
    }
    if let Some(child) = gui.child(node, offset) {
        if let Some(rect) = layout.client_rects(gui, child).first() {
            return Some(rect.left);
        }
    }
    offset
        .checked_sub(1)
        .and_then(|i| gui.child(node, i))
        .and_then(|prev| layout.client_rects(gui, prev).last().copied())
        .map(|r| r.right)
}

/// Resolve a click to the caret stop closest to it.
pub fn point_to_char_boundary(ctx: &CaretContext<'_>, layout: &dyn Layout, x: f64, y: f64) -> Option<DLoc> {
    let gui = ctx.gui.tree();
    let (node, offset) = find_location_at(gui, ctx.gui.root(), layout, x, y)?;
    let boundary = DLoc::make(gui, node, offset).ok()?;

    if gui.is_text(node) && offset < gui.length(node) {
        let right = position_right(ctx, &boundary);
        let left = DLoc::make(gui, node, offset + 1)
            .ok()
            .and_then(|after| position_left(ctx, &after));
        let chosen = match (left, right) {
            (Some(left), Some(right)) => {
                let dist = |loc: &DLoc| boundary_x(gui, layout, loc).map_or(f64::INFINITY, |bx| (bx - x).abs());
                if dist(&right) >= dist(&left) {
                    left
                } else {
                    right
                }
            }
            (Some(left), None) => left,
            (None, Some(right)) => right,
            (None, None) => boundary,
        };
        trace!(?chosen, "click resolved inside text");
        return Some(chosen);
    }

    if gui.is_element(node) && offset < gui.child_count(node) {
        let pointed = gui.child(node, offset)?;
        let mut before = None;
        if gui.is_element(pointed) {
            let closest = find_location_in_element_at(gui, layout, pointed, x, y, true);
            let limit = if gui.is_element(closest.0) {
                gui.child_count(closest.0) as isize - 1
            } else {
                -1
            };
            if closest.1 == 0 {
                before = Some(true);
            } else if closest.1 as isize == limit {
                before = Some(false);
            }
        }
        let before = before.unwrap_or_else(|| {
            layout
                .client_rects(gui, pointed)
                .first()
                .map_or(true, |r| (r.left - x).abs() < (r.right - x).abs())
        });
        if !before {
            return DLoc::make(gui, node, offset + 1).ok();
        }
    }
    Some(boundary)
}

/// Detached nodes the fake caret reuses on every measurement: the marker
/// itself and two text nodes standing in for a split text node.
#[derive(Debug, Clone, Copy)]
struct Scratch {
    tree: TreeId,
    mark: NodeId,
    head: NodeId,
    tail: NodeId,
}

impl Scratch {
    fn create(tree: &mut Tree) -> EditorResult<Self> {
        let mark = tree.create_element("span")?;
        tree.set_attribute(mark, "class", FAKE_CARET_MARK)?;
        Ok(Self {
            tree: tree.id(),
            mark,
            head: tree.create_text("")?,
            tail: tree.create_text("")?,
        })
    }
}

/// Caret geometry measured through a marker element.
#[derive(Debug, Default)]
pub struct FakeCaret {
    inhibited: Reentrancy,
    pending: bool,
    geometry: Option<Rect>,
    scratch: Option<Scratch>,
}

impl FakeCaret {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold off refreshes until the guard is dropped and
    /// [`FakeCaret::refresh_if_pending`] runs.
    pub fn inhibit(&self) -> ReentrancyGuard {
        self.inhibited.enter()
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibited.is_held()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Last measured caret box.
    pub fn geometry(&self) -> Option<Rect> {
        self.geometry
    }

    pub fn refresh_if_pending(
        &mut self,
        gui: &mut GuiUpdater,
        layout: &dyn Layout,
        focus: Option<&DLoc>,
    ) -> EditorResult<Option<Rect>> {
        if self.pending && !self.is_inhibited() {
            self.refresh(gui, layout, focus)
        } else {
            Ok(self.geometry)
        }
    }

    fn scratch_for(&mut self, tree: &mut Tree) -> EditorResult<Scratch> {
        match self.scratch {
            Some(scratch) if scratch.tree == tree.id() => Ok(scratch),
            _ => {
                let scratch = Scratch::create(tree)?;
                self.scratch = Some(scratch);
                Ok(scratch)
            }
        }
    }

    /// Measure the caret at `focus`. The GUI tree is left as it was found,
    /// down to node identities, and repeated refreshes do not grow it.
    pub fn refresh(&mut self, gui: &mut GuiUpdater, layout: &dyn Layout, focus: Option<&DLoc>) -> EditorResult<Option<Rect>> {
        if self.is_inhibited() {
            self.pending = true;
            return Ok(self.geometry);
        }
        self.pending = false;

        let Some(focus) = focus.filter(|f| f.is_valid(gui.tree())) else {
            self.geometry = None;
            return Ok(None);
        };

        let updater = gui.updater_mut();
        let Scratch { mark, head, tail, .. } = self.scratch_for(updater.scratch())?;

        let (node, offset) = focus.point();
        let tree = updater.tree();
        if !tree.is_text(node) {
            updater.insert_node_at(node, offset, mark)?;
            self.geometry = measure(updater.tree(), layout, mark);
            updater.delete_node(mark)?;
        } else {
            let parent = tree.parent(node).ok_or(DomError::NoParent)?;
            let at = tree.index_of(node).ok_or(DomError::InvalidNode)?;
            let data = tree.text(node).unwrap_or_default();
            if offset == 0 || offset >= char_len(data) {
                let at = if offset == 0 { at } else { at + 1 };
                updater.insert_node_at(parent, at, mark)?;
                self.geometry = measure(updater.tree(), layout, mark);
                updater.delete_node(mark)?;
            } else {
                let (before, after) = split_chars(data, offset);
                let (before, after) = (before.to_string(), after.to_string());
                updater.scratch().set_text(head, &before)?;
                updater.scratch().set_text(tail, &after)?;

                updater.delete_node(node)?;
                updater.insert_node_at(parent, at, head)?;
                updater.insert_node_at(parent, at + 1, mark)?;
                updater.insert_node_at(parent, at + 2, tail)?;
                self.geometry = measure(updater.tree(), layout, mark);
                updater.delete_node(tail)?;
                updater.delete_node(mark)?;
                updater.delete_node(head)?;
                updater.insert_node_at(parent, at, node)?;
            }
        }

        debug!(geometry = ?self.geometry, "fake caret refreshed");
        Ok(self.geometry)
    }
}

fn measure(gui: &Tree, layout: &dyn Layout, mark: NodeId) -> Option<Rect> {
    layout.client_rects(gui, mark).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distances() {
        let rect = Rect::new(10.0, 10.0, 20.0, 30.0);
        assert_eq!(rect.distances(15.0, 20.0), (0.0, 0.0));
        assert_eq!(rect.distances(5.0, 40.0), (5.0, 10.0));
        assert_eq!(rect.distances(25.0, 0.0), (5.0, 10.0));
        assert!(Rect::default().is_degenerate());
    }
}
