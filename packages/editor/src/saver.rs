//! # Saver
//!
//! Tracks whether the data tree has unsaved changes and pushes serialized
//! snapshots to a [`SaveBackend`].
//!
//! ## Generations
//!
//! ```text
//! saved == current   →  first "changed" bumps current, emits Changed
//! saved <  current   →  further changes only refresh the timestamp
//! save succeeds      →  saved = the generation that was serialized
//! ```
//!
//! Saving the generation that was current when serialization started
//! means an edit racing a slow backend leaves the document stale.
//!
//! Failures never propagate as errors. They are reported with a
//! [`SaverEvent::Failed`] carrying the failure kind and a message.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use wed_dom::{xml, Tree};

use crate::errors::EditorResult;
use crate::events::{EventBus, ListenerId, Listener, TreeEvent};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    #[error("the document was edited elsewhere: {0}")]
    EditedElsewhere(String),

    #[error("lost contact with the save medium: {0}")]
    Disconnected(String),

    #[error("save failed: {0}")]
    Transient(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveErrorKind {
    SaveEdited,
    SaveDisconnected,
    SaveTransientError,
}

impl SaveError {
    pub fn kind(&self) -> SaveErrorKind {
        match self {
            SaveError::EditedElsewhere(_) => SaveErrorKind::SaveEdited,
            SaveError::Disconnected(_) => SaveErrorKind::SaveDisconnected,
            SaveError::Transient(_) => SaveErrorKind::SaveTransientError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveKind {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaverEvent {
    /// The document went from saved to stale.
    Changed,
    Saved,
    Autosaved,
    Failed { kind: SaveErrorKind, message: String },
}

/// Where saved documents go.
pub trait SaveBackend {
    fn save(&mut self, data: &str, kind: SaveKind) -> Result<(), SaveError>;

    /// Last-chance save after a fatal editor error.
    fn recover(&mut self, data: &str) -> Result<(), SaveError>;
}

/// Serialized form of the data tree, without the wrapping root.
pub fn get_data(tree: &Tree) -> String {
    xml::inner_xml(tree, tree.root())
}

pub struct Saver {
    backend: Box<dyn SaveBackend>,
    events: EventBus<SaverEvent>,
    current_generation: u64,
    saved_generation: u64,
    last_modification: Option<DateTime<Utc>>,
    last_save: Option<DateTime<Utc>>,
    last_save_kind: Option<SaveKind>,
    failed: bool,
    autosave_interval: Option<Duration>,
    next_autosave: Option<DateTime<Utc>>,
}

impl Saver {
    pub fn new(backend: Box<dyn SaveBackend>) -> Self {
        Self {
            backend,
            events: EventBus::new(),
            current_generation: 0,
            saved_generation: 0,
            last_modification: None,
            last_save: None,
            last_save_kind: None,
            failed: false,
            autosave_interval: None,
            next_autosave: None,
        }
    }

    pub fn subscribe_fn<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&SaverEvent, &()) -> EditorResult<()> + 'static,
    {
        self.events.subscribe_fn(f)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn current_generation(&self) -> u64 {
        self.current_generation
    }

    pub fn saved_generation(&self) -> u64 {
        self.saved_generation
    }

    pub fn is_modified(&self) -> bool {
        self.current_generation != self.saved_generation
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn last_save_kind(&self) -> Option<SaveKind> {
        self.last_save_kind
    }

    /// Record a change to the data tree at `now`.
    pub fn mark_changed_at(&mut self, now: DateTime<Utc>) -> EditorResult<()> {
        self.last_modification = Some(now);
        if self.current_generation == self.saved_generation {
            self.current_generation += 1;
            debug!(generation = self.current_generation, "document is stale");
            self.events.emit(&SaverEvent::Changed, &())?;
        }
        Ok(())
    }

    pub fn save(&mut self, tree: &Tree, kind: SaveKind) -> EditorResult<()> {
        self.save_at(tree, kind, Utc::now())
    }

    pub fn save_at(&mut self, tree: &Tree, kind: SaveKind, now: DateTime<Utc>) -> EditorResult<()> {
        let generation = self.current_generation;
        let data = get_data(tree);
        match self.backend.save(&data, kind) {
            Ok(()) => {
                self.saved_generation = generation;
                self.last_save = Some(now);
                self.last_save_kind = Some(kind);
                self.reset_autosave(now);
                info!(generation, ?kind, bytes = data.len(), "document saved");
                let event = match kind {
                    SaveKind::Auto => SaverEvent::Autosaved,
                    SaveKind::Manual => SaverEvent::Saved,
                };
                self.events.emit(&event, &())
            }
            Err(err) => {
                self.failed = true;
                warn!(error = %err, ?kind, "save failed");
                self.events.emit(
                    &SaverEvent::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                    },
                    &(),
                )
            }
        }
    }

    /// Attempt a recovery save. Returns whether the backend was asked to
    /// save at all: a saver in a failed state does not try.
    pub fn recover(&mut self, tree: &Tree) -> EditorResult<bool> {
        if self.failed {
            return Ok(false);
        }
        self.backend.recover(&get_data(tree))?;
        info!("document recovered");
        Ok(true)
    }

    /// Autosave every `interval`, counted from `now`. `None` disables
    /// autosaving.
    pub fn set_autosave_interval(&mut self, interval: Option<Duration>, now: DateTime<Utc>) {
        self.autosave_interval = interval.filter(|i| *i > Duration::zero());
        self.reset_autosave(now);
    }

    fn reset_autosave(&mut self, now: DateTime<Utc>) {
        self.next_autosave = self.autosave_interval.map(|i| now + i);
    }

    pub fn autosave_due(&self, now: DateTime<Utc>) -> bool {
        self.next_autosave.map_or(false, |at| now >= at)
    }

    /// Run the autosave if its deadline passed. Unmodified documents are
    /// not saved but the countdown restarts all the same.
    pub fn poll_autosave(&mut self, tree: &Tree, now: DateTime<Utc>) -> EditorResult<bool> {
        if !self.autosave_due(now) {
            return Ok(false);
        }
        if !self.is_modified() {
            self.reset_autosave(now);
            return Ok(false);
        }
        self.save_at(tree, SaveKind::Auto, now)?;
        self.reset_autosave(now);
        Ok(true)
    }

    /// How long ago the document became stale, or `None` if it is saved.
    pub fn modified_when(&self, now: DateTime<Utc>) -> Option<String> {
        if !self.is_modified() {
            return None;
        }
        self.last_modification.map(|at| delta_to_string(now - at))
    }

    pub fn saved_when(&self, now: DateTime<Utc>) -> Option<String> {
        self.last_save_kind?;
        self.last_save.map(|at| delta_to_string(now - at))
    }
}

impl std::fmt::Debug for Saver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saver")
            .field("current_generation", &self.current_generation)
            .field("saved_generation", &self.saved_generation)
            .field("last_save_kind", &self.last_save_kind)
            .field("failed", &self.failed)
            .finish()
    }
}

impl Listener<TreeEvent, Tree> for Saver {
    fn on_event(&mut self, event: &TreeEvent, _tree: &Tree) -> EditorResult<()> {
        if matches!(event, TreeEvent::Changed) {
            self.mark_changed_at(Utc::now())?;
        }
        Ok(())
    }
}

/// Human readable age, with one decimal for minutes and above.
pub fn delta_to_string(delta: Duration) -> String {
    let seconds = (delta.num_milliseconds() as f64 / 1000.0).round();
    if seconds <= 0.0 {
        return "moments ago".to_string();
    }
    let amount = if seconds > 60.0 * 60.0 * 24.0 {
        format!("{}d", (seconds / (6.0 * 60.0 * 24.0)).round() / 10.0)
    } else if seconds > 60.0 * 60.0 {
        format!("{}h", (seconds / (6.0 * 60.0)).round() / 10.0)
    } else if seconds > 60.0 {
        format!("{}m", (seconds / 6.0).round() / 10.0)
    } else {
        format!("{}s", seconds)
    };
    format!("≈ {} ago", amount)
}
