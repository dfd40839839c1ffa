//! # Locations
//!
//! A [`DLoc`] names a position in a tree: a node plus an offset. For
//! elements the offset indexes the child list, for text nodes it counts
//! characters, and for attribute nodes it counts characters of the value.
//!
//! Locations are plain values. They never hold a borrow of the tree, so
//! they can go stale when the tree mutates; check them with
//! [`DLoc::is_valid`] or clamp them with [`DLoc::normalize_offset`] before
//! trusting them.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{DomError, DomResult};
use crate::node::{NodeId, Tree, TreeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DLoc {
    pub tree: TreeId,
    pub node: NodeId,
    pub offset: usize,
}

impl DLoc {
    /// Make a location, failing when the node is not attached under the
    /// tree's root or the offset is out of range.
    pub fn make(tree: &Tree, node: NodeId, offset: usize) -> DomResult<DLoc> {
        if !tree.exists(node) {
            return Err(DomError::InvalidNode);
        }
        if !tree.is_attached(node) {
            return Err(DomError::NotInRoot);
        }
        let max = tree.length(node);
        if offset > max {
            return Err(DomError::OffsetTooLarge { offset, max });
        }
        Ok(DLoc {
            tree: tree.id(),
            node,
            offset,
        })
    }

    /// Make a location, clamping the offset into `[0, length]` instead of
    /// failing.
    pub fn make_normalized(tree: &Tree, node: NodeId, offset: isize) -> DomResult<DLoc> {
        let max = tree.length(node);
        let offset = offset.max(0) as usize;
        DLoc::make(tree, node, offset.min(max))
    }

    /// Make a new location in the same tree as `self`.
    pub fn make_with(&self, tree: &Tree, node: NodeId, offset: usize) -> DomResult<DLoc> {
        if tree.id() != self.tree {
            return Err(DomError::WrongTree);
        }
        DLoc::make(tree, node, offset)
    }

    /// Same node, different offset. The result is not validated.
    pub fn with_offset(&self, offset: usize) -> DLoc {
        DLoc { offset, ..*self }
    }

    pub fn point(&self) -> (NodeId, usize) {
        (self.node, self.offset)
    }

    pub fn belongs_to(&self, tree: &Tree) -> bool {
        self.tree == tree.id()
    }

    /// Whether the node is still attached and the offset still in range.
    pub fn is_valid(&self, tree: &Tree) -> bool {
        self.belongs_to(tree)
            && tree.exists(self.node)
            && tree.is_attached(self.node)
            && self.offset <= tree.length(self.node)
    }

    /// Clamp the offset to the node's current length.
    pub fn normalize_offset(&self, tree: &Tree) -> DLoc {
        let max = tree.length(self.node);
        if self.offset > max {
            self.with_offset(max)
        } else {
            *self
        }
    }

    /// Build a range from `self` to `other`, or a collapsed range when
    /// `other` is `None`.
    pub fn make_range(&self, tree: &Tree, other: Option<&DLoc>) -> DomResult<DRange> {
        if tree.is_attribute(self.node) {
            return Err(DomError::AttributeRange);
        }
        let other = match other {
            Some(other) => other,
            None => {
                return Ok(DRange {
                    start: *self,
                    end: *self,
                    reversed: false,
                })
            }
        };
        if other.tree != self.tree {
            return Err(DomError::WrongTree);
        }
        if tree.is_attribute(other.node) {
            return Err(DomError::AttributeRange);
        }
        let reversed = tree.compare_points(self.point(), other.point()) == Ordering::Greater;
        let (start, end) = if reversed {
            (*other, *self)
        } else {
            (*self, *other)
        };
        Ok(DRange {
            start,
            end,
            reversed,
        })
    }
}

/// An ordered pair of locations. `reversed` records that the pair was
/// built from a focus that precedes its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DRange {
    pub start: DLoc,
    pub end: DLoc,
    pub reversed: bool,
}

impl DRange {
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// The location the selection was started from.
    pub fn anchor(&self) -> DLoc {
        if self.reversed {
            self.end
        } else {
            self.start
        }
    }

    /// The location the selection was extended to.
    pub fn focus(&self) -> DLoc {
        if self.reversed {
            self.start
        } else {
            self.end
        }
    }

    pub fn is_valid(&self, tree: &Tree) -> bool {
        self.start.is_valid(tree) && self.end.is_valid(tree)
    }
}
