//! Editors known to an orchestrator, for crash handling.
//!
//! After a fatal error no editor may keep editing, because the error may
//! have left any of them inconsistent. [`EditorRegistry::report_fatal`]
//! poisons every registered editor and attempts a recovery save of those
//! with unsaved changes.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::editor::Editor;
use crate::errors::EditorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EditorId(u64);

struct Entry {
    editor: Weak<RefCell<Editor>>,
    poisoned: Rc<Cell<bool>>,
}

/// Outcome of the recovery attempt for one editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub editor: EditorId,
    pub recovered: bool,
    pub message: Option<String>,
}

#[derive(Default)]
pub struct EditorRegistry {
    entries: BTreeMap<EditorId, Entry>,
    next_id: u64,
}

impl EditorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, editor: &Rc<RefCell<Editor>>) -> EditorId {
        let id = EditorId(self.next_id);
        self.next_id += 1;
        let poisoned = editor.borrow().poison_handle();
        self.entries.insert(
            id,
            Entry {
                editor: Rc::downgrade(editor),
                poisoned,
            },
        );
        id
    }

    pub fn unregister(&mut self, id: EditorId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Live editors, dropping entries whose editor is gone.
    pub fn len(&mut self) -> usize {
        self.entries.retain(|_, entry| entry.editor.strong_count() > 0);
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Editors with unsaved changes. Editors borrowed elsewhere are
    /// skipped.
    pub fn unsaved(&self) -> Vec<EditorId> {
        self.entries
            .iter()
            .filter(|(_, entry)| {
                entry
                    .editor
                    .upgrade()
                    .and_then(|editor| editor.try_borrow().ok().map(|e| e.is_modified()))
                    .unwrap_or(false)
            })
            .map(|(&id, _)| id)
            .collect()
    }

    /// Poison every editor, then try to save the modified ones through
    /// their backend's recovery path.
    pub fn report_fatal(&mut self, err: &EditorError) -> Vec<RecoveryReport> {
        error!(error = %err, editors = self.entries.len(), "fatal editor error");
        for entry in self.entries.values() {
            entry.poisoned.set(true);
        }

        let mut reports = Vec::new();
        for (&id, entry) in &self.entries {
            let Some(editor) = entry.editor.upgrade() else {
                continue;
            };
            let Ok(mut editor) = editor.try_borrow_mut() else {
                warn!(editor = ?id, "editor busy; skipping recovery");
                reports.push(RecoveryReport {
                    editor: id,
                    recovered: false,
                    message: Some("editor was in use".into()),
                });
                continue;
            };
            if !editor.is_modified() {
                continue;
            }
            let report = match editor.recover() {
                Ok(recovered) => RecoveryReport {
                    editor: id,
                    recovered,
                    message: None,
                },
                Err(err) => RecoveryReport {
                    editor: id,
                    recovered: false,
                    message: Some(err.to_string()),
                },
            };
            info!(editor = ?id, recovered = report.recovered, "recovery attempted");
            reports.push(report);
        }
        reports
    }
}

impl std::fmt::Debug for EditorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorRegistry")
            .field("editors", &self.entries.len())
            .finish()
    }
}
