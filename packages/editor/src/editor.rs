//! # Editor
//!
//! Owns one document: the data tree updater, the GUI mirror, the undo
//! machinery, the saver and the caret. Every edit made through it keeps
//! the two trees, the undo history and the save state consistent.
//!
//! ## Wiring
//!
//! ```text
//!                    data TreeUpdater
//!                           │ events
//!      ┌──────────────┬─────┴───────┬──────────────┐
//!      ↓              ↓             ↓              ↓
//!  GuiUpdater   UndoRecorder      Saver    ValidationNotifier
//!  (mirror)     (→ UndoList)   (generation)  (→ Validator)
//! ```
//!
//! The caret is a location in the GUI tree. Transformations read and
//! write it through [`Editor::get_data_caret`] and
//! [`Editor::set_data_caret`].

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use wed_dom::domutil::{closest_by_class, is_well_formed_range};
use wed_dom::node::split_chars;
use wed_dom::{DLoc, DRange, DomError, NodeId, NodeSnapshot, Tree};

use crate::caret::{self, CaretContext};
use crate::config::EditorOptions;
use crate::errors::{EditorError, EditorResult};
use crate::gui_updater::GuiUpdater;
use crate::layout::{point_to_char_boundary, FakeCaret, Layout, Rect};
use crate::mode::{self, Mode};
use crate::saver::{SaveBackend, SaveKind, Saver};
use crate::transformation::{Transformation, TransformationData, TransformationError};
use crate::tree_updater::{Insertion, TreeUpdater};
use crate::undo_recorder::{SharedUndoList, UndoRecorder};
use crate::undo_stack::{CaretMark, UndoGroup, UndoList};
use crate::validation::{SharedValidator, ValidationIssue, ValidationNotifier, ValidationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaretState {
    NoCaret,
    Caret,
    Selection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// What became of a paste.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteOutcome {
    Pasted,
    /// Elements in the pasted content are not allowed at the caret and
    /// nothing was changed. The caller may paste `as_text` instead with
    /// [`Editor::paste_text`], or drop the paste.
    Invalid { rejected: Vec<String>, as_text: String },
    /// The caret is missing or in decoration.
    Swallowed,
}

/// What became of a keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    /// The keystroke would have touched decoration and was ignored.
    Swallowed,
}

pub struct Editor {
    data: TreeUpdater,
    gui: Rc<RefCell<GuiUpdater>>,
    undo: SharedUndoList,
    recorder: Rc<RefCell<UndoRecorder>>,
    saver: Rc<RefCell<Saver>>,
    validator: Option<SharedValidator>,
    options: EditorOptions,
    layout: Option<Box<dyn Layout>>,
    anchor: Option<DLoc>,
    focus: Option<DLoc>,
    selection_stack: Vec<(Option<DLoc>, Option<DLoc>)>,
    fake_caret: FakeCaret,
    poisoned: Rc<Cell<bool>>,
}

impl Editor {
    pub fn new(
        data: Tree,
        mode: Rc<dyn Mode>,
        backend: Box<dyn SaveBackend>,
        options: EditorOptions,
    ) -> EditorResult<Self> {
        let gui = GuiUpdater::new(&data, mode, options.attributes, options.placeholders)?;
        let gui = Rc::new(RefCell::new(gui));
        let undo: SharedUndoList = Rc::new(RefCell::new(UndoList::new()));
        let recorder = Rc::new(RefCell::new(UndoRecorder::new(Rc::clone(&undo))));
        let saver = Rc::new(RefCell::new(Saver::new(backend)));
        saver
            .borrow_mut()
            .set_autosave_interval(options.autosave(), Utc::now());

        let mut data = TreeUpdater::new(data);
        data.subscribe(Rc::clone(&gui));
        data.subscribe(Rc::clone(&recorder));
        data.subscribe(Rc::clone(&saver));

        info!(attributes = ?options.attributes, "editor ready");
        Ok(Self {
            data,
            gui,
            undo,
            recorder,
            saver,
            validator: None,
            options,
            layout: None,
            anchor: None,
            focus: None,
            selection_stack: Vec::new(),
            fake_caret: FakeCaret::new(),
            poisoned: Rc::new(Cell::new(false)),
        })
    }

    pub fn with_layout(mut self, layout: Box<dyn Layout>) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Attach a validator and start it on the whole document.
    pub fn with_validator(mut self, validator: SharedValidator) -> Self {
        validator
            .borrow_mut()
            .restart_at(self.data.tree(), self.data.tree().root());
        self.data
            .subscribe(Rc::new(RefCell::new(ValidationNotifier::new(Rc::clone(&validator)))));
        self.validator = Some(validator);
        self
    }

    // Accessors
    // ------------------------------------------------------------------

    pub fn data_tree(&self) -> &Tree {
        self.data.tree()
    }

    /// The data tree updater, for transformations.
    pub fn data_updater_mut(&mut self) -> &mut TreeUpdater {
        &mut self.data
    }

    pub fn gui(&self) -> Ref<'_, GuiUpdater> {
        self.gui.borrow()
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    pub fn undo_list(&self) -> SharedUndoList {
        Rc::clone(&self.undo)
    }

    pub fn saver(&self) -> Rc<RefCell<Saver>> {
        Rc::clone(&self.saver)
    }

    /// Flag shared with the registry. Once set, every edit fails with
    /// [`EditorError::Poisoned`].
    pub fn poison_handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.poisoned)
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.get()
    }

    fn check_poisoned(&self) -> EditorResult<()> {
        if self.poisoned.get() {
            Err(EditorError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn with_context<R>(&self, f: impl FnOnce(&CaretContext<'_>) -> R) -> R {
        let gui = self.gui.borrow();
        let layout = self.layout.as_deref();
        let white_space_normal =
            move |tree: &Tree, node: NodeId| layout.map_or(true, |layout| layout.white_space_normal(tree, node));
        let ctx = CaretContext::new(&gui, self.data.tree(), &white_space_normal);
        f(&ctx)
    }

    // Caret
    // ------------------------------------------------------------------

    pub fn caret_state(&self) -> CaretState {
        match (self.anchor, self.focus) {
            (_, None) => CaretState::NoCaret,
            (Some(anchor), Some(focus)) if anchor != focus => CaretState::Selection,
            _ => CaretState::Caret,
        }
    }

    /// The GUI caret. Unless `raw` is set, a caret inside a placeholder is
    /// reported at the placeholder's position. A caret whose node left the
    /// tree is `None`.
    pub fn get_gui_caret(&self, raw: bool) -> Option<DLoc> {
        let focus = self.focus?;
        let gui = self.gui.borrow();
        let tree = gui.tree();
        if !tree.is_attached(focus.node) {
            return None;
        }
        let focus = focus.normalize_offset(tree);
        if raw {
            Some(focus)
        } else {
            Some(caret::normalize_caret(tree, gui.root(), &focus))
        }
    }

    /// The caret mapped to the data tree. See [`caret::to_data_location`]
    /// for `closest`.
    pub fn get_data_caret(&self, closest: bool) -> EditorResult<Option<DLoc>> {
        match self.get_gui_caret(true) {
            Some(loc) => self.to_data_location(&loc, closest),
            None => Ok(None),
        }
    }

    pub fn to_data_location(&self, loc: &DLoc, closest: bool) -> EditorResult<Option<DLoc>> {
        self.with_context(|ctx| caret::to_data_location(ctx, loc, closest))
    }

    pub fn from_data_location(&self, loc: &DLoc) -> EditorResult<DLoc> {
        self.with_context(|ctx| caret::from_data_location(ctx, loc))
    }

    /// Collapse the selection to `loc`.
    pub fn set_gui_caret(&mut self, loc: DLoc) -> EditorResult<()> {
        self.move_caret(Some(loc), None, false)
    }

    /// Put the caret at a data location. `text_edit` marks moves caused by
    /// typing, which keep the current text undo group open.
    pub fn set_data_caret(&mut self, loc: DLoc, text_edit: bool) -> EditorResult<()> {
        let gui_loc = self.from_data_location(&loc)?;
        self.move_caret(Some(gui_loc), None, text_edit)
    }

    pub fn set_selection(&mut self, anchor: DLoc, focus: DLoc) -> EditorResult<()> {
        self.move_caret(Some(focus), Some(anchor), false)
    }

    pub fn clear_selection(&mut self) -> EditorResult<()> {
        self.move_caret(None, None, false)
    }

    /// Selection in the GUI tree, ordered.
    pub fn selection_range(&self) -> EditorResult<Option<DRange>> {
        let (Some(anchor), Some(focus)) = (self.anchor, self.focus) else {
            return Ok(None);
        };
        let gui = self.gui.borrow();
        Ok(Some(anchor.make_range(gui.tree(), Some(&focus))?))
    }

    /// Selection mapped to the data tree, or `None` when either end is in
    /// decoration.
    pub fn data_selection_range(&self) -> EditorResult<Option<DRange>> {
        let (Some(anchor), Some(focus)) = (self.anchor, self.focus) else {
            return Ok(None);
        };
        let anchor = self.to_data_location(&anchor, false)?;
        let focus = self.to_data_location(&focus, false)?;
        match (anchor, focus) {
            (Some(anchor), Some(focus)) => Ok(Some(anchor.make_range(self.data.tree(), Some(&focus))?)),
            _ => Ok(None),
        }
    }

    pub fn push_selection(&mut self) {
        self.selection_stack.push((self.anchor, self.focus));
    }

    /// Restore the last pushed selection. Ends that went stale are dropped.
    pub fn pop_selection(&mut self) -> EditorResult<()> {
        let Some((anchor, focus)) = self.selection_stack.pop() else {
            return Ok(());
        };
        let (anchor, focus) = {
            let gui = self.gui.borrow();
            let valid = |loc: Option<DLoc>| loc.filter(|l| l.is_valid(gui.tree()));
            (valid(anchor), valid(focus))
        };
        self.move_caret(focus, anchor, false)
    }

    pub fn move_caret_right(&mut self) -> EditorResult<bool> {
        self.step_caret(Direction::Forward)
    }

    pub fn move_caret_left(&mut self) -> EditorResult<bool> {
        self.step_caret(Direction::Backward)
    }

    fn step_caret(&mut self, direction: Direction) -> EditorResult<bool> {
        let Some(current) = self.get_gui_caret(true) else {
            return Ok(false);
        };
        let next = self.with_context(|ctx| match direction {
            Direction::Forward => caret::position_right(ctx, &current),
            Direction::Backward => caret::position_left(ctx, &current),
        });
        match next {
            Some(loc) => {
                self.set_gui_caret(loc)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Put the caret at the character boundary nearest to a click.
    pub fn click(&mut self, x: f64, y: f64) -> EditorResult<bool> {
        let Some(layout) = self.layout.as_deref() else {
            return Ok(false);
        };
        let loc = self.with_context(|ctx| point_to_char_boundary(ctx, layout, x, y));
        match loc {
            Some(loc) => {
                self.set_gui_caret(loc)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Element names from the document element down to the caret.
    pub fn location_labels(&self) -> EditorResult<Vec<String>> {
        match self.get_gui_caret(true) {
            Some(loc) => self.with_context(|ctx| caret::location_labels(ctx, &loc)),
            None => Ok(Vec::new()),
        }
    }

    /// Move the caret and selection anchor. `anchor` defaults to `focus`.
    fn move_caret(&mut self, focus: Option<DLoc>, anchor: Option<DLoc>, text_edit: bool) -> EditorResult<()> {
        let mut focus = focus.map(|loc| self.attract(loc));
        let mut anchor = anchor.map(|loc| self.attract(loc)).or(focus);

        if focus == self.focus && anchor == self.anchor {
            return Ok(());
        }
        let old_focus = self.focus;

        if !text_edit {
            let mut undo = self.undo.borrow_mut();
            if undo.get_group().map_or(false, |group| group.is_text()) {
                undo.end_group()?;
            }
        }

        if let Some(ph) = old_focus.and_then(|old| self.transient_placeholder_at(old)) {
            let stays = focus.map_or(false, |f| self.gui.borrow().tree().contains(ph, f.node));
            if !stays {
                self.remove_transient_placeholder(ph, &mut focus, &mut anchor)?;
            }
        }

        self.focus = focus;
        self.anchor = anchor;
        debug!(focus = ?focus.map(|f| f.point()), anchor = ?anchor.map(|a| a.point()), "caret moved");

        self.refresh_fake_caret()?;
        Ok(())
    }

    /// Attribute value spans put the caret in their text, and a caret
    /// right before a placeholder goes into it.
    fn attract(&self, loc: DLoc) -> DLoc {
        let gui = self.gui.borrow();
        let tree = gui.tree();
        let (node, offset) = loc.point();
        if !tree.is_element(node) {
            return loc;
        }
        if tree.has_class(node, mode::ATTRIBUTE_VALUE) {
            if let Some(text) = tree.first_child(node).filter(|&c| tree.is_text(c)) {
                let offset = if offset > 0 { tree.length(text) } else { 0 };
                return DLoc { node: text, offset, ..loc };
            }
            return loc;
        }
        match tree.child(node, offset).filter(|&c| tree.has_class(c, mode::PLACEHOLDER)) {
            Some(ph) => DLoc { node: ph, offset: 0, ..loc },
            None => loc,
        }
    }

    fn transient_placeholder_at(&self, loc: DLoc) -> Option<NodeId> {
        let gui = self.gui.borrow();
        let tree = gui.tree();
        closest_by_class(tree, loc.node, mode::PLACEHOLDER, Some(gui.root()))
            .filter(|&ph| tree.has_class(ph, mode::TRANSIENT) && tree.is_attached(ph))
    }

    fn remove_transient_placeholder(
        &mut self,
        ph: NodeId,
        focus: &mut Option<DLoc>,
        anchor: &mut Option<DLoc>,
    ) -> EditorResult<()> {
        let mut gui = self.gui.borrow_mut();
        let tree = gui.tree();
        let parent = tree.parent(ph).ok_or(DomError::NoParent)?;
        let index = tree.index_of(ph).ok_or(DomError::InvalidNode)?;
        let before = tree.child_count(parent);
        gui.remove_decoration(ph)?;
        let after = gui.tree().child_count(parent);
        debug!(placeholder = ?ph, "removed transient placeholder");

        let shift = |loc: &mut Option<DLoc>| {
            if let Some(l) = loc.as_mut().filter(|l| l.node == parent && l.offset > index) {
                l.offset = (l.offset + after).saturating_sub(before).min(after);
            }
        };
        shift(focus);
        shift(anchor);
        Ok(())
    }

    /// Insert a transient placeholder in a GUI element and put the caret
    /// in it.
    pub fn insert_transient_placeholder(&mut self, gui_el: NodeId, index: usize) -> EditorResult<NodeId> {
        self.check_poisoned()?;
        let ph = self.gui.borrow_mut().insert_transient_placeholder(gui_el, index)?;
        let loc = DLoc::make(self.gui.borrow().tree(), ph, 0)?;
        self.set_gui_caret(loc)?;
        Ok(ph)
    }

    // Fake caret
    // ------------------------------------------------------------------

    /// Remeasure the caret. Does nothing without a layout.
    pub fn refresh_fake_caret(&mut self) -> EditorResult<Option<Rect>> {
        let Some(layout) = self.layout.as_deref() else {
            return Ok(None);
        };
        let mut gui = self.gui.borrow_mut();
        self.fake_caret.refresh(&mut gui, layout, self.focus.as_ref())
    }

    pub fn fake_caret(&self) -> &FakeCaret {
        &self.fake_caret
    }

    fn refresh_fake_caret_if_pending(&mut self) -> EditorResult<()> {
        if let Some(layout) = self.layout.as_deref() {
            let mut gui = self.gui.borrow_mut();
            self.fake_caret
                .refresh_if_pending(&mut gui, layout, self.focus.as_ref())?;
        }
        Ok(())
    }

    // Undo
    // ------------------------------------------------------------------

    fn caret_mark(&self) -> Option<CaretMark> {
        let loc = self.get_data_caret(true).ok().flatten()?;
        let path = self.data.node_to_path(loc.node).ok()?;
        Some(CaretMark {
            path,
            offset: loc.offset,
        })
    }

    fn restore_caret(&mut self, mark: Option<CaretMark>) -> EditorResult<()> {
        let target = mark.and_then(|mark| {
            let tree = self.data.tree();
            let node = tree.path_to_node(&mark.path).ok().flatten()?;
            DLoc::make(tree, node, mark.offset.min(tree.length(node))).ok()
        });
        match target {
            Some(loc) => self.set_data_caret(loc, false),
            None => self.drop_stale_caret(),
        }
    }

    fn drop_stale_caret(&mut self) -> EditorResult<()> {
        let stale = {
            let gui = self.gui.borrow();
            self.focus.map_or(false, |f| !gui.tree().is_attached(f.node))
        };
        if stale {
            warn!("caret went stale; clearing it");
            self.move_caret(None, None, false)?;
        }
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.undo.borrow().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.borrow().can_redo()
    }

    /// Undo the last entry and restore the caret it recorded. Returns the
    /// entry's description.
    pub fn undo(&mut self) -> EditorResult<Option<String>> {
        self.check_poisoned()?;
        let outcome = {
            let _suppressed = self.recorder.borrow().suppress()?;
            self.undo.borrow_mut().undo(&mut self.data)?
        };
        let Some(outcome) = outcome else {
            return Ok(None);
        };
        self.restore_caret(outcome.caret)?;
        Ok(Some(outcome.description))
    }

    pub fn redo(&mut self) -> EditorResult<Option<String>> {
        self.check_poisoned()?;
        let outcome = {
            let _suppressed = self.recorder.borrow().suppress()?;
            self.undo.borrow_mut().redo(&mut self.data)?
        };
        let Some(outcome) = outcome else {
            return Ok(None);
        };
        self.restore_caret(outcome.caret)?;
        Ok(Some(outcome.description))
    }

    fn end_text_group(&self) -> EditorResult<()> {
        let mut undo = self.undo.borrow_mut();
        if undo.get_group().map_or(false, |group| group.is_text()) {
            undo.end_group()?;
        }
        Ok(())
    }

    fn start_text_group(&self, description: &str) {
        let mark = self.caret_mark();
        let mut undo = self.undo.borrow_mut();
        if !undo.get_group().map_or(false, |group| group.is_text()) {
            undo.start_group(UndoGroup::text(description, self.options.text_undo_max_length).with_caret_before(mark));
        }
    }

    // Transformations
    // ------------------------------------------------------------------

    /// Run a transformation as one undoable step.
    ///
    /// The handler always runs with a caret. If it fails, whatever it did
    /// is undone; an [`TransformationError::Abort`] is then swallowed.
    #[instrument(skip_all, fields(transformation = transformation.transformation_type()))]
    pub fn fire_transformation(
        &mut self,
        transformation: &dyn Transformation,
        data: &TransformationData,
    ) -> EditorResult<()> {
        self.check_poisoned()?;
        if let Some(loc) = data.move_caret_to {
            self.set_data_caret(loc, false)?;
        }
        if self.get_gui_caret(true).is_none() {
            return Err(EditorError::NoCaret);
        }

        self.end_text_group()?;
        let description = format!("Undo {}", transformation.description_for(data));
        let mark = self.caret_mark();
        self.undo
            .borrow_mut()
            .start_group(UndoGroup::new(description).with_caret_before(mark));

        let result = {
            let _inhibited = self.fake_caret.inhibit();
            transformation.handle(self, data)
        };

        match result {
            Ok(()) => {
                self.drop_stale_caret()?;
                let after = self.caret_mark();
                {
                    let mut undo = self.undo.borrow_mut();
                    if let Some(group) = undo.get_group_mut() {
                        group.set_caret_after(after);
                    }
                    undo.end_group()?;
                }
                self.refresh_fake_caret_if_pending()?;
                Ok(())
            }
            Err(err) => {
                let recorded = {
                    let mut undo = self.undo.borrow_mut();
                    let recorded = undo.get_group().map_or(false, |group| !group.is_empty());
                    undo.end_group()?;
                    recorded
                };
                if recorded {
                    error!(error = %err, "transformation failed; rolling back");
                    self.undo()?;
                }
                self.refresh_fake_caret_if_pending()?;
                match err {
                    TransformationError::Abort(reason) => {
                        info!(reason, "transformation aborted");
                        Ok(())
                    }
                    TransformationError::Editor(err) => Err(err),
                }
            }
        }
    }

    // Keystrokes
    // ------------------------------------------------------------------

    /// Insert text at the caret. Consecutive calls coalesce into one text
    /// undo group.
    pub fn type_text(&mut self, text: &str) -> EditorResult<KeyOutcome> {
        self.check_poisoned()?;
        if text.is_empty() {
            return Ok(KeyOutcome::Handled);
        }
        if self.caret_state() == CaretState::Selection && self.cut_selection()?.is_none() {
            warn!("typing over a selection that cannot be cut");
            return Ok(KeyOutcome::Swallowed);
        }
        let Some(caret) = self.get_data_caret(false)? else {
            warn!(text, "typing in decoration swallowed");
            return Ok(KeyOutcome::Swallowed);
        };

        self.start_text_group("Text");
        if self.data.tree().is_attribute(caret.node) {
            let loc = self.insert_into_attribute(&caret, text)?;
            self.set_data_caret(loc, true)?;
            return Ok(KeyOutcome::Handled);
        }

        let inserted = self.data.insert_text(caret.node, caret.offset, text)?;
        if let Some((node, offset)) = inserted.caret {
            let loc = DLoc::make(self.data.tree(), node, offset)?;
            self.set_data_caret(loc, true)?;
        }
        Ok(KeyOutcome::Handled)
    }

    fn insert_into_attribute(&mut self, caret: &DLoc, text: &str) -> EditorResult<DLoc> {
        let tree = self.data.tree();
        let owner = tree.parent(caret.node).ok_or(DomError::NoParent)?;
        let ns = tree.namespace(caret.node).unwrap_or_default().to_string();
        let name = tree.name(caret.node).unwrap_or_default().to_string();
        let (pre, post) = split_chars(tree.text(caret.node).unwrap_or_default(), caret.offset);
        let value = format!("{}{}{}", pre, text, post);
        self.data.set_attribute_ns(owner, &ns, &name, Some(&value))?;
        Ok(DLoc::make(self.data.tree(), caret.node, caret.offset + text.chars().count())?)
    }

    /// Delete one character next to the caret. Deleting into decoration
    /// or across an element boundary is swallowed.
    pub fn delete_char(&mut self, direction: Direction) -> EditorResult<KeyOutcome> {
        self.check_poisoned()?;
        if self.caret_state() == CaretState::Selection {
            return Ok(match self.cut_selection()? {
                Some(_) => KeyOutcome::Handled,
                None => KeyOutcome::Swallowed,
            });
        }
        let Some(caret) = self.get_data_caret(false)? else {
            warn!(?direction, "delete in decoration swallowed");
            return Ok(KeyOutcome::Swallowed);
        };

        let tree = self.data.tree();
        let (node, offset) = caret.point();
        let target = if tree.is_element(node) {
            match direction {
                Direction::Backward => offset
                    .checked_sub(1)
                    .and_then(|i| tree.child(node, i))
                    .filter(|&c| tree.is_text(c))
                    .map(|c| (c, tree.length(c) - 1)),
                Direction::Forward => tree.child(node, offset).filter(|&c| tree.is_text(c)).map(|c| (c, 0)),
            }
        } else {
            match direction {
                Direction::Backward => offset.checked_sub(1).map(|i| (node, i)),
                Direction::Forward => (offset < tree.length(node)).then_some((node, offset)),
            }
        };
        let Some((target, index)) = target else {
            warn!(?direction, "delete at element boundary swallowed");
            return Ok(KeyOutcome::Swallowed);
        };

        self.start_text_group("Delete");
        let tree = self.data.tree();
        if tree.is_attribute(target) {
            let owner = tree.parent(target).ok_or(DomError::NoParent)?;
            let ns = tree.namespace(target).unwrap_or_default().to_string();
            let name = tree.name(target).unwrap_or_default().to_string();
            let value: String = tree
                .text(target)
                .unwrap_or_default()
                .chars()
                .enumerate()
                .filter_map(|(i, c)| (i != index).then_some(c))
                .collect();
            self.data.set_attribute_ns(owner, &ns, &name, Some(&value))?;
            let loc = DLoc::make(self.data.tree(), target, index)?;
            self.set_data_caret(loc, true)?;
            return Ok(KeyOutcome::Handled);
        }

        let parent = tree.parent(target).ok_or(DomError::NoParent)?;
        let at = tree.index_of(target).ok_or(DomError::InvalidNode)?;
        self.data.delete_text(target, index, 1)?;
        let loc = if self.data.tree().parent(target).is_some() {
            DLoc::make(self.data.tree(), target, index)?
        } else {
            DLoc::make(self.data.tree(), parent, at)?
        };
        self.set_data_caret(loc, true)?;
        Ok(KeyOutcome::Handled)
    }

    /// Remove the selected content as one undoable step. Returns snapshots
    /// of the removed nodes, or `None` when the selection cannot be cut.
    #[instrument(skip(self))]
    pub fn cut_selection(&mut self) -> EditorResult<Option<Vec<NodeSnapshot>>> {
        self.check_poisoned()?;
        let Some(range) = self.data_selection_range()? else {
            warn!("selection is not in editable content");
            return Ok(None);
        };
        if range.is_collapsed() {
            return Ok(Some(Vec::new()));
        }
        if !is_well_formed_range(self.data.tree(), range.start.point(), range.end.point())? {
            warn!("selection is not well formed");
            return Ok(None);
        }

        self.end_text_group()?;
        let mark = self.caret_mark();
        self.undo
            .borrow_mut()
            .start_group(UndoGroup::new("Cut").with_caret_before(mark));

        let cut = self.data.cut(range.start, range.end);
        let (caret, nodes) = match cut {
            Ok(cut) => cut,
            Err(err) => {
                self.undo.borrow_mut().end_group()?;
                return Err(err);
            }
        };
        let snapshots = nodes
            .iter()
            .map(|&node| self.data.tree().snapshot(node))
            .collect::<Result<Vec<_>, _>>()?;

        self.set_data_caret(caret, false)?;
        let after = self.caret_mark();
        {
            let mut undo = self.undo.borrow_mut();
            if let Some(group) = undo.get_group_mut() {
                group.set_caret_after(after);
            }
            undo.end_group()?;
        }
        debug!(removed = snapshots.len(), "cut selection");
        Ok(Some(snapshots))
    }

    /// Run `edit` as one undo group. The caret moves to the location it
    /// returns.
    fn edit_in_group(
        &mut self,
        description: &str,
        edit: impl FnOnce(&mut Self) -> EditorResult<DLoc>,
    ) -> EditorResult<()> {
        self.end_text_group()?;
        let mark = self.caret_mark();
        self.undo
            .borrow_mut()
            .start_group(UndoGroup::new(description).with_caret_before(mark));

        let end = match edit(self) {
            Ok(end) => end,
            Err(err) => {
                self.undo.borrow_mut().end_group()?;
                return Err(err);
            }
        };
        self.set_data_caret(end, false)?;
        let after = self.caret_mark();
        let mut undo = self.undo.borrow_mut();
        if let Some(group) = undo.get_group_mut() {
            group.set_caret_after(after);
        }
        undo.end_group()
    }

    /// Caret to paste at, after replacing any selection.
    fn paste_target(&mut self) -> EditorResult<Option<DLoc>> {
        if self.caret_state() == CaretState::Selection && self.cut_selection()?.is_none() {
            warn!("pasting over a selection that cannot be cut");
            return Ok(None);
        }
        let caret = self.get_data_caret(false)?;
        if caret.is_none() {
            warn!("paste in decoration swallowed");
        }
        Ok(caret)
    }

    /// Element names in `content` that may not go at `caret`. Attribute
    /// values take no elements; elsewhere the validator decides.
    fn rejected_at(&self, caret: &DLoc, content: &[NodeSnapshot]) -> Vec<String> {
        let names = content.iter().filter_map(NodeSnapshot::name);
        if self.data.tree().is_attribute(caret.node) {
            return names.map(str::to_string).collect();
        }
        let Some(validator) = self.validator.as_ref() else {
            return Vec::new();
        };
        let possible = validator
            .borrow()
            .possible_at(self.data.tree(), caret.node, caret.offset);
        names
            .filter(|name| !possible.iter().any(|p| p == name))
            .map(str::to_string)
            .collect()
    }

    /// Insert copied content at the caret as one undoable step. Content
    /// the validator does not allow there is not inserted; the outcome
    /// carries its text so the caller can offer a plain text paste.
    #[instrument(skip(self, content), fields(nodes = content.len()))]
    pub fn paste(&mut self, content: &[NodeSnapshot]) -> EditorResult<PasteOutcome> {
        self.check_poisoned()?;
        if content.is_empty() {
            return Ok(PasteOutcome::Pasted);
        }
        let Some(caret) = self.paste_target()? else {
            return Ok(PasteOutcome::Swallowed);
        };

        let rejected = self.rejected_at(&caret, content);
        if !rejected.is_empty() {
            info!(?rejected, "paste would make the document invalid");
            let as_text = content.iter().map(NodeSnapshot::text_content).collect();
            return Ok(PasteOutcome::Invalid { rejected, as_text });
        }

        self.edit_in_group("Paste", |this| {
            if this.data.tree().is_attribute(caret.node) {
                let text: String = content.iter().map(NodeSnapshot::text_content).collect();
                return this.insert_into_attribute(&caret, &text);
            }
            let nodes = content
                .iter()
                .map(|snapshot| this.data.scratch().materialize(snapshot))
                .collect::<Result<Vec<_>, _>>()?;
            this.data.insert_at(caret.node, caret.offset, Insertion::Nodes(&nodes))
        })?;
        debug!("pasted");
        Ok(PasteOutcome::Pasted)
    }

    /// Insert `text` at the caret as one undoable step.
    #[instrument(skip(self, text))]
    pub fn paste_text(&mut self, text: &str) -> EditorResult<PasteOutcome> {
        self.check_poisoned()?;
        if text.is_empty() {
            return Ok(PasteOutcome::Pasted);
        }
        let Some(caret) = self.paste_target()? else {
            return Ok(PasteOutcome::Swallowed);
        };
        self.edit_in_group("Paste", |this| {
            if this.data.tree().is_attribute(caret.node) {
                this.insert_into_attribute(&caret, text)
            } else {
                this.data.insert_at(caret.node, caret.offset, Insertion::Text(text))
            }
        })?;
        Ok(PasteOutcome::Pasted)
    }

    // Saving
    // ------------------------------------------------------------------

    pub fn save(&mut self, kind: SaveKind) -> EditorResult<()> {
        self.saver.borrow_mut().save(self.data.tree(), kind)
    }

    /// Autosave if the interval elapsed with unsaved changes.
    pub fn poll_autosave(&mut self, now: DateTime<Utc>) -> EditorResult<bool> {
        self.saver.borrow_mut().poll_autosave(self.data.tree(), now)
    }

    pub fn is_modified(&self) -> bool {
        self.saver.borrow().is_modified()
    }

    /// Last-chance save after a fatal error.
    pub fn recover(&mut self) -> EditorResult<bool> {
        self.saver.borrow_mut().recover(self.data.tree())
    }

    // Validation
    // ------------------------------------------------------------------

    pub fn validation_state(&self) -> Option<ValidationState> {
        self.validator.as_ref().map(|v| v.borrow().state())
    }

    pub fn validation_errors(&self) -> Vec<ValidationIssue> {
        self.validator
            .as_ref()
            .map(|v| v.borrow().errors())
            .unwrap_or_default()
    }

    /// What the validator allows at the caret.
    pub fn possible_at_caret(&self) -> EditorResult<Vec<String>> {
        let (Some(validator), Some(caret)) = (self.validator.as_ref(), self.get_data_caret(true)?) else {
            return Ok(Vec::new());
        };
        let possible = validator
            .borrow()
            .possible_at(self.data.tree(), caret.node, caret.offset);
        Ok(possible)
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("nodes", &self.data.tree().len())
            .field("focus", &self.focus)
            .field("anchor", &self.anchor)
            .field("poisoned", &self.poisoned.get())
            .finish_non_exhaustive()
    }
}
