//! Interface to an external validator.
//!
//! The editor does not validate documents itself. It tells a [`Validator`]
//! where the data tree changed, and asks it for its overall state, the
//! errors it found and what may be inserted at a location.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::trace;
use wed_dom::{NodeId, Tree};

use crate::errors::EditorResult;
use crate::events::{Listener, TreeEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationState {
    Incomplete,
    Working,
    Invalid,
    Valid,
}

/// One problem reported by the validator, anchored at a data location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub node: NodeId,
    pub offset: usize,
    pub message: String,
}

pub trait Validator {
    /// Invalidate everything from `node` on and resume validating there.
    fn restart_at(&mut self, tree: &Tree, node: NodeId);

    fn state(&self) -> ValidationState;

    fn errors(&self) -> Vec<ValidationIssue>;

    /// Names of what could be inserted at `(node, offset)`.
    fn possible_at(&self, tree: &Tree, node: NodeId, offset: usize) -> Vec<String>;
}

pub type SharedValidator = Rc<RefCell<dyn Validator>>;

/// Restarts the validator at the subtree each data mutation touched.
pub struct ValidationNotifier {
    validator: SharedValidator,
}

impl ValidationNotifier {
    pub fn new(validator: SharedValidator) -> Self {
        Self { validator }
    }
}

impl std::fmt::Debug for ValidationNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationNotifier").finish_non_exhaustive()
    }
}

impl Listener<TreeEvent, Tree> for ValidationNotifier {
    fn on_event(&mut self, event: &TreeEvent, tree: &Tree) -> EditorResult<()> {
        let restart = match event {
            TreeEvent::InsertNodeAt { parent, .. } => Some(*parent),
            TreeEvent::SetTextNodeValue { node, .. } => tree.parent(*node),
            TreeEvent::DeleteNode { former_parent, .. } => Some(*former_parent),
            TreeEvent::SetAttributeNs { node, .. } => Some(*node),
            TreeEvent::BeforeDeleteNode { .. } | TreeEvent::Changed => None,
        };
        if let Some(node) = restart {
            trace!(?node, event = event.name(), "restarting validation");
            self.validator.borrow_mut().restart_at(tree, node);
        }
        Ok(())
    }
}
