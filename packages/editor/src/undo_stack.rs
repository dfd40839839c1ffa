//! # Undo/Redo List
//!
//! A flat history of undoable entries with a position pointer.
//!
//! ## Design
//!
//! - Entries are applied by the caller; the list only records them
//! - Undo runs the entry at the pointer and moves the pointer back
//! - Redo moves the pointer forward and reruns the entry there
//! - Recording while the pointer is not at the end discards the redo tail
//! - Groups collect entries so a compound edit undoes as one unit; groups
//!   nest and close innermost-first
//! - Text groups close themselves once they hold `limit` entries, so a long
//!   run of typing undoes in chunks
//!
//! The list is generic over the target `T` the entries act on. The editor
//! uses `UndoList<TreeUpdater>`.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::errors::EditorResult;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UndoError {
    #[error("undo called twice in a row on {0}")]
    UndoTwice(String),

    #[error("redo called twice in a row on {0}")]
    RedoTwice(String),

    #[error("ending a non-existent group")]
    NoGroup,

    #[error("recording into a full text undo group")]
    GroupFull,

    #[error("spurious recording suppression")]
    SpuriousSuppress,

    #[error("undo entry refers to a missing node at path {0}")]
    PathNotFound(String),
}

/// A caret position saved as a data-tree path and an offset, so it
/// survives the node churn that undo and redo cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaretMark {
    pub path: String,
    pub offset: usize,
}

pub trait UndoEntry<T> {
    fn undo(&mut self, target: &mut T) -> EditorResult<()>;

    fn redo(&mut self, target: &mut T) -> EditorResult<()>;

    fn description(&self) -> &str;

    /// Caret to restore after undoing this entry.
    fn caret_before(&self) -> Option<&CaretMark> {
        None
    }

    /// Caret to restore after redoing this entry.
    fn caret_after(&self) -> Option<&CaretMark> {
        None
    }
}

/// Tracks the undo/redo alternation every entry must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum EntryState {
    #[default]
    Done,
    Undone,
}

impl EntryState {
    pub(crate) fn begin_undo(&mut self, description: &str) -> Result<(), UndoError> {
        if *self == EntryState::Undone {
            return Err(UndoError::UndoTwice(description.to_string()));
        }
        *self = EntryState::Undone;
        Ok(())
    }

    pub(crate) fn begin_redo(&mut self, description: &str) -> Result<(), UndoError> {
        if *self == EntryState::Done {
            return Err(UndoError::RedoTwice(description.to_string()));
        }
        *self = EntryState::Done;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Normal,
    /// Closes itself after `limit` entries.
    Text { limit: usize },
}

/// Entries undone and redone as a unit.
pub struct UndoGroup<T> {
    description: String,
    kind: GroupKind,
    entries: Vec<Box<dyn UndoEntry<T>>>,
    caret_before: Option<CaretMark>,
    caret_after: Option<CaretMark>,
    state: EntryState,
}

impl<T> UndoGroup<T> {
    pub fn new(description: impl Into<String>) -> Self {
        Self::with_kind(description, GroupKind::Normal)
    }

    pub fn text(description: impl Into<String>, limit: usize) -> Self {
        Self::with_kind(description, GroupKind::Text { limit: limit.max(1) })
    }

    fn with_kind(description: impl Into<String>, kind: GroupKind) -> Self {
        Self {
            description: description.into(),
            kind,
            entries: Vec::new(),
            caret_before: None,
            caret_after: None,
            state: EntryState::Done,
        }
    }

    pub fn with_caret_before(mut self, caret: Option<CaretMark>) -> Self {
        self.caret_before = caret;
        self
    }

    pub fn set_caret_after(&mut self, caret: Option<CaretMark>) {
        self.caret_after = caret;
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, GroupKind::Text { .. })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        match self.kind {
            GroupKind::Text { limit } => self.entries.len() >= limit,
            GroupKind::Normal => false,
        }
    }

    fn record(&mut self, entry: Box<dyn UndoEntry<T>>) -> Result<(), UndoError> {
        if self.is_full() {
            return Err(UndoError::GroupFull);
        }
        self.entries.push(entry);
        Ok(())
    }
}

impl<T> UndoEntry<T> for UndoGroup<T> {
    fn undo(&mut self, target: &mut T) -> EditorResult<()> {
        self.state.begin_undo(&self.description)?;
        for entry in self.entries.iter_mut().rev() {
            entry.undo(target)?;
        }
        Ok(())
    }

    fn redo(&mut self, target: &mut T) -> EditorResult<()> {
        self.state.begin_redo(&self.description)?;
        for entry in self.entries.iter_mut() {
            entry.redo(target)?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn caret_before(&self) -> Option<&CaretMark> {
        self.caret_before.as_ref()
    }

    fn caret_after(&self) -> Option<&CaretMark> {
        self.caret_after.as_ref()
    }
}

impl<T> fmt::Debug for UndoGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoGroup")
            .field("description", &self.description)
            .field("kind", &self.kind)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// A no-op entry naming a point in history.
#[derive(Debug, Clone)]
pub struct UndoMarker {
    name: String,
}

impl UndoMarker {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl<T> UndoEntry<T> for UndoMarker {
    fn undo(&mut self, _target: &mut T) -> EditorResult<()> {
        Ok(())
    }

    fn redo(&mut self, _target: &mut T) -> EditorResult<()> {
        Ok(())
    }

    fn description(&self) -> &str {
        &self.name
    }
}

/// What an undo or redo step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoOutcome {
    pub description: String,
    pub caret: Option<CaretMark>,
}

pub struct UndoList<T> {
    entries: Vec<Box<dyn UndoEntry<T>>>,
    /// Number of entries currently applied.
    index: usize,
    groups: Vec<UndoGroup<T>>,
    undoing_or_redoing: bool,
}

impl<T: 'static> UndoList<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: 0,
            groups: Vec::new(),
            undoing_or_redoing: false,
        }
    }

    /// Record an already applied entry, into the innermost open group if
    /// there is one.
    pub fn record(&mut self, entry: Box<dyn UndoEntry<T>>) -> EditorResult<()> {
        if let Some(group) = self.groups.last_mut() {
            group.record(entry)?;
            if group.is_full() {
                debug!(group = %group.description, "text undo group full");
                self.end_group()?;
            }
            return Ok(());
        }
        self.push(entry);
        Ok(())
    }

    fn push(&mut self, entry: Box<dyn UndoEntry<T>>) {
        self.entries.truncate(self.index);
        self.entries.push(entry);
        self.index = self.entries.len();
    }

    pub fn start_group(&mut self, group: UndoGroup<T>) {
        debug!(group = %group.description, depth = self.groups.len(), "start undo group");
        self.groups.push(group);
    }

    pub fn end_group(&mut self) -> EditorResult<()> {
        let group = self.groups.pop().ok_or(UndoError::NoGroup)?;
        if group.is_empty() {
            return Ok(());
        }
        match self.groups.last_mut() {
            Some(parent) => parent.record(Box::new(group))?,
            None => self.push(Box::new(group)),
        }
        Ok(())
    }

    pub fn end_all_groups(&mut self) -> EditorResult<()> {
        while !self.groups.is_empty() {
            self.end_group()?;
        }
        Ok(())
    }

    /// Innermost open group.
    pub fn get_group(&self) -> Option<&UndoGroup<T>> {
        self.groups.last()
    }

    pub fn get_group_mut(&mut self) -> Option<&mut UndoGroup<T>> {
        self.groups.last_mut()
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.entries.len()
    }

    pub fn undoing_or_redoing(&self) -> bool {
        self.undoing_or_redoing
    }

    /// Undo the most recent entry. Open groups are closed first. Returns
    /// `None` when there is nothing to undo.
    pub fn undo(&mut self, target: &mut T) -> EditorResult<Option<UndoOutcome>> {
        self.end_all_groups()?;
        if !self.can_undo() {
            return Ok(None);
        }
        self.index -= 1;
        self.undoing_or_redoing = true;
        let entry = &mut self.entries[self.index];
        let result = entry.undo(target);
        self.undoing_or_redoing = false;
        result?;
        info!(entry = %entry.description(), "undo");
        Ok(Some(UndoOutcome {
            description: entry.description().to_string(),
            caret: entry.caret_before().cloned(),
        }))
    }

    /// Redo the most recently undone entry. Returns `None` when there is
    /// nothing to redo.
    pub fn redo(&mut self, target: &mut T) -> EditorResult<Option<UndoOutcome>> {
        self.end_all_groups()?;
        if !self.can_redo() {
            return Ok(None);
        }
        self.undoing_or_redoing = true;
        let entry = &mut self.entries[self.index];
        let result = entry.redo(target);
        self.undoing_or_redoing = false;
        result?;
        self.index += 1;
        info!(entry = %entry.description(), "redo");
        Ok(Some(UndoOutcome {
            description: entry.description().to_string(),
            caret: entry.caret_after().cloned(),
        }))
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|entry| entry.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.entries.get(self.index).map(|entry| entry.description())
    }

    /// Number of top-level entries, applied or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.groups.clear();
        self.index = 0;
    }
}

impl<T: 'static> Default for UndoList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for UndoList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descriptions: Vec<&str> = self.entries.iter().map(|e| e.description()).collect();
        f.debug_struct("UndoList")
            .field("entries", &descriptions)
            .field("index", &self.index)
            .field("open_groups", &self.groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EditorError;
    use std::collections::HashMap;

    type Flags = HashMap<&'static str, bool>;

    /// Sets a flag to true; undo sets it back to false.
    struct SetFlag {
        name: &'static str,
        state: EntryState,
    }

    fn set(flags: &mut Flags, name: &'static str) -> Box<dyn UndoEntry<Flags>> {
        flags.insert(name, true);
        Box::new(SetFlag {
            name,
            state: EntryState::Done,
        })
    }

    impl UndoEntry<Flags> for SetFlag {
        fn undo(&mut self, flags: &mut Flags) -> EditorResult<()> {
            self.state.begin_undo(self.name)?;
            flags.insert(self.name, false);
            Ok(())
        }

        fn redo(&mut self, flags: &mut Flags) -> EditorResult<()> {
            self.state.begin_redo(self.name)?;
            flags.insert(self.name, true);
            Ok(())
        }

        fn description(&self) -> &str {
            self.name
        }
    }

    #[test]
    fn test_undo_list_creation() {
        let list: UndoList<Flags> = UndoList::new();
        assert!(!list.can_undo());
        assert!(!list.can_redo());
        assert!(list.is_empty());
    }

    #[test]
    fn test_undo_and_redo() {
        let mut flags = Flags::new();
        let mut list = UndoList::new();
        list.record(set(&mut flags, "a")).unwrap();
        list.record(set(&mut flags, "b")).unwrap();

        let outcome = list.undo(&mut flags).unwrap().unwrap();
        assert_eq!(outcome.description, "b");
        assert_eq!(flags["a"], true);
        assert_eq!(flags["b"], false);
        list.undo(&mut flags).unwrap();
        assert!(!list.can_undo());
        assert_eq!(flags["a"], false);

        assert!(list.undo(&mut flags).unwrap().is_none());

        list.redo(&mut flags).unwrap();
        assert_eq!(flags["a"], true);
        assert_eq!(flags["b"], false);
        list.redo(&mut flags).unwrap();
        assert!(!list.can_redo());
        assert!(list.redo(&mut flags).unwrap().is_none());
    }

    #[test]
    fn test_new_record_discards_redo_history() {
        let mut flags = Flags::new();
        let mut list = UndoList::new();
        for name in ["a", "b", "c", "d"] {
            list.record(set(&mut flags, name)).unwrap();
        }
        list.undo(&mut flags).unwrap();
        list.undo(&mut flags).unwrap();
        list.record(set(&mut flags, "e")).unwrap();
        list.record(set(&mut flags, "f")).unwrap();

        assert!(!list.can_redo());
        assert_eq!(list.len(), 4);
        assert_eq!(list.undo_description(), Some("f"));
    }

    #[test]
    fn test_group_undoes_as_unit() {
        let mut flags = Flags::new();
        let mut list = UndoList::new();
        list.start_group(UndoGroup::new("both"));
        list.record(set(&mut flags, "a")).unwrap();
        list.record(set(&mut flags, "b")).unwrap();
        list.end_group().unwrap();
        list.record(set(&mut flags, "c")).unwrap();
        assert_eq!(list.len(), 2);

        list.undo(&mut flags).unwrap();
        let outcome = list.undo(&mut flags).unwrap().unwrap();
        assert_eq!(outcome.description, "both");
        assert_eq!(flags["a"], false);
        assert_eq!(flags["b"], false);

        list.redo(&mut flags).unwrap();
        assert_eq!(flags["a"], true);
        assert_eq!(flags["b"], true);
        assert_eq!(flags["c"], false);
    }

    #[test]
    fn test_end_group_without_group_fails() {
        let mut list: UndoList<Flags> = UndoList::new();
        assert!(matches!(list.end_group(), Err(EditorError::Undo(UndoError::NoGroup))));
        list.start_group(UndoGroup::new("g"));
        list.end_group().unwrap();
        assert!(matches!(list.end_group(), Err(EditorError::Undo(UndoError::NoGroup))));
    }

    #[test]
    fn test_nested_groups_close_innermost_first() {
        let mut flags = Flags::new();
        let mut list = UndoList::new();
        list.start_group(UndoGroup::new("outer"));
        list.record(set(&mut flags, "a")).unwrap();
        list.start_group(UndoGroup::new("inner"));
        list.record(set(&mut flags, "b")).unwrap();
        assert_eq!(list.get_group().unwrap().description(), "inner");
        list.end_group().unwrap();
        list.end_group().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.undo_description(), Some("outer"));
    }

    #[test]
    fn test_undo_ends_open_groups() {
        let mut flags = Flags::new();
        let mut list = UndoList::new();
        list.start_group(UndoGroup::new("open"));
        list.record(set(&mut flags, "a")).unwrap();
        list.undo(&mut flags).unwrap();
        assert!(list.get_group().is_none());
        assert_eq!(flags["a"], false);
    }

    #[test]
    fn test_text_group_closes_when_full() {
        let mut flags = Flags::new();
        let mut list = UndoList::new();
        list.start_group(UndoGroup::text("typing", 2));
        list.record(set(&mut flags, "a")).unwrap();
        assert!(list.get_group().is_some());
        list.record(set(&mut flags, "b")).unwrap();
        assert!(list.get_group().is_none());
        list.record(set(&mut flags, "c")).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_empty_group_is_not_recorded() {
        let mut list: UndoList<Flags> = UndoList::new();
        list.start_group(UndoGroup::new("nothing"));
        list.end_group().unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_marker_is_noop() {
        let mut flags = Flags::new();
        let mut list = UndoList::new();
        list.record(set(&mut flags, "a")).unwrap();
        list.record(Box::new(UndoMarker::new("checkpoint"))).unwrap();
        assert_eq!(list.undo_description(), Some("checkpoint"));
        list.undo(&mut flags).unwrap();
        assert_eq!(flags["a"], true);
    }

    #[test]
    fn test_entry_refuses_double_undo() {
        let mut flags = Flags::new();
        let mut entry = set(&mut flags, "a");
        entry.undo(&mut flags).unwrap();
        assert!(matches!(
            entry.undo(&mut flags),
            Err(EditorError::Undo(UndoError::UndoTwice(_)))
        ));
        entry.redo(&mut flags).unwrap();
        assert!(matches!(
            entry.redo(&mut flags),
            Err(EditorError::Undo(UndoError::RedoTwice(_)))
        ));
    }
}
