//! Error types for tree addressing and mutation

use thiserror::Error;

use crate::NodeId;

pub type DomResult<T> = Result<T, DomError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("node not in root")]
    NotInRoot,

    #[error("location belongs to another tree")]
    WrongTree,

    #[error("offset greater than allowable value: {offset} > {max}")]
    OffsetTooLarge { offset: usize, max: usize },

    #[error("node is not a descendant of root")]
    NotADescendant,

    #[error("invalid node parameter")]
    InvalidNode,

    #[error("unknown node: {0:?}")]
    UnknownNode(NodeId),

    #[error("malformed path: {0}")]
    MalformedPath(String),

    #[error("malformed range")]
    MalformedRange,

    #[error("unexpected node type: expected {expected}")]
    UnexpectedNodeType { expected: &'static str },

    #[error("cannot create a range from an attribute location")]
    AttributeRange,

    #[error("node has no parent")]
    NoParent,

    #[error("cannot insert a node into its own subtree")]
    HierarchyRequest,

    #[error("tree is full: no node id left after {0} nodes")]
    TreeFull(usize),

    #[error("XML error at {pos}: {message}")]
    Xml { pos: usize, message: String },
}

impl DomError {
    pub fn unexpected_node_type(expected: &'static str) -> Self {
        Self::UnexpectedNodeType { expected }
    }

    pub fn xml(pos: usize, message: impl Into<String>) -> Self {
        Self::Xml {
            pos,
            message: message.into(),
        }
    }
}
