//! # Wed Editor
//!
//! Editing core of the wed XML editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ wed-dom: Tree, DLoc, mutation primitives    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ tree_updater: primitives + events           │
//! │  - insertNodeAt, setTextNodeValue, ...      │
//! │  - every event followed by "changed"        │
//! └─────────────────────────────────────────────┘
//!          ↓               ↓              ↓
//! ┌────────────────┐ ┌─────────────┐ ┌──────────┐
//! │ gui_updater    │ │ undo        │ │ saver    │
//! │ mirror + mode  │ │ recorder    │ │ gen.     │
//! │ decoration     │ │ + list      │ │ counter  │
//! └────────────────┘ └─────────────┘ └──────────┘
//!          ↓
//! ┌─────────────────────────────────────────────┐
//! │ caret + layout: stops, mapping, clicks      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: caret state, keystrokes,            │
//! │         transformations, undo, saving       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Data tree is source of truth**: the GUI tree is a decorated mirror
//! 2. **Mutate, then notify**: listeners only ever see applied changes
//! 3. **All or nothing**: a failed transformation is undone
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use wed_editor::{Editor, EditorOptions, GenericMode};
//!
//! let data = wed_dom::xml::parse("<doc><p>ab</p></doc>")?;
//! let mut editor = Editor::new(data, Rc::new(GenericMode), backend, EditorOptions::default())?;
//!
//! let text = editor.data_tree().path_to_node("0/0/0")?.unwrap();
//! editor.set_data_caret(wed_dom::DLoc::make(editor.data_tree(), text, 1)?, false)?;
//! editor.type_text("x")?;
//! editor.undo()?;
//! ```

pub mod caret;
mod config;
mod editor;
mod errors;
mod events;
mod guard;
mod gui_updater;
pub mod layout;
mod mirror;
pub mod mode;
mod registry;
pub mod saver;
pub mod transformation;
mod tree_updater;
mod undo_recorder;
mod undo_stack;
mod validation;

pub use caret::CaretContext;
pub use config::{EditorOptions, DEFAULT_OPTIONS_NAME};
pub use editor::{CaretState, Direction, Editor, KeyOutcome, PasteOutcome};
pub use errors::{EditorError, EditorResult};
pub use events::{EventBus, FnListener, Listener, ListenerId, TreeEvent};
pub use guard::{Reentrancy, ReentrancyGuard};
pub use gui_updater::{is_content, GuiUpdater};
pub use layout::{FakeCaret, Layout, Rect};
pub use mirror::MirrorMap;
pub use mode::{AttributeMode, GenericMode, Label, Mode};
pub use registry::{EditorId, EditorRegistry, RecoveryReport};
pub use saver::{SaveBackend, SaveError, SaveErrorKind, SaveKind, Saver, SaverEvent};
pub use transformation::{
    FnTransformation, TargetType, Transformation, TransformationData, TransformationError, TransformationKind,
};
pub use tree_updater::{Insertion, TreeUpdater};
pub use undo_recorder::{SharedUndoList, UndoRecorder};
pub use undo_stack::{CaretMark, UndoEntry, UndoError, UndoGroup, UndoList, UndoMarker, UndoOutcome};
pub use validation::{SharedValidator, ValidationIssue, ValidationNotifier, ValidationState, Validator};
