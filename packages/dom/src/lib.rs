//! # Wed DOM
//!
//! Tree model and tree-agnostic editing primitives for the wed XML editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ xml: source text → Tree, Tree → source text │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ node: arena Tree, NodeId, snapshots         │
//! │  - elements, text, attributes               │
//! │  - stable ids for detached nodes            │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ dloc / path: positions and structural paths │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ domutil: DomMutator strategy + algorithms   │
//! │  - insert/split/merge/cut text and nodes    │
//! │  - DOM-level caret walking                  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The editor crate implements [`DomMutator`] on its tree updater so every
//! algorithm here emits events when run against a live tree, and runs
//! silently against a bare [`Tree`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wed_dom::{domutil, xml, DLoc};
//!
//! let mut tree = xml::parse("<doc><p>abcd</p></doc>")?;
//! let text = tree.path_to_node("0/0/0")?.unwrap();
//! let b = tree.create_element("b")?;
//! let (before, after) = domutil::insert_into_text(&mut tree, text, 2, Some(b))?;
//! assert_eq!(xml::inner_xml(&tree, tree.root()), "<doc><p>ab<b/>cd</p></doc>");
//! ```

pub mod dloc;
pub mod domutil;
mod error;
pub mod node;
pub mod path;
mod snapshot;
mod tokenizer;
pub mod xml;

pub use dloc::{DLoc, DRange};
pub use domutil::{DomMutator, Point, TextInsertion};
pub use error::{DomError, DomResult};
pub use node::{NodeId, NodeType, Tree, TreeId};
pub use path::{node_to_path, path_to_node};
pub use snapshot::{AttributeSnapshot, NodeSnapshot};
