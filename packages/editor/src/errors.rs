//! Error types for the editor

use thiserror::Error;
use wed_dom::{DomError, NodeId};

use crate::saver::SaveError;
use crate::undo_stack::UndoError;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("Undo error: {0}")]
    Undo(#[from] UndoError),

    #[error("Save error: {0}")]
    Save(#[from] SaveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("node {0:?} has no counterpart in the other tree")]
    NotMirrored(NodeId),

    #[error("node {0:?} is already attached; detach it before inserting")]
    AlreadyAttached(NodeId),

    #[error("split location is not inside top")]
    SplitOutsideTop,

    #[error("splitAt called in a way that would result in two adjacent text nodes")]
    SplitTextTop,

    #[error("nodes are not immediately contiguous in document order")]
    NotContiguous,

    #[error("insertBefore called with a node that is not a child of parent")]
    NotAChild,

    #[error("transformation ran without a caret")]
    NoCaret,

    #[error("transformation failed: {0}")]
    Transformation(String),

    #[error("editor was disabled after a fatal error")]
    Poisoned,
}
