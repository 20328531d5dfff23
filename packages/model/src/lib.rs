//! # Folio Model
//!
//! The linear document model the editing engine operates on.
//!
//! A document is stored twice:
//!
//! ```text
//! linear data:  <p> a b c </p> <comment> </comment> <list> <listItem> ... </list>
//!                 │                 │                  │
//! node tree:    document
//!               ├── paragraph ── text(3)
//!               ├── comment
//!               └── list ── listItem ── ...
//! ```
//!
//! The flat item sequence is the source of truth. The tree is a cache built
//! from it, kept in an arena so that nodes have stable ids that outlive edits.
//! Text nodes only record a length; the characters themselves stay in the
//! linear data.
//!
//! ## Modules
//!
//! - [`item`]: linear items (open/close markers and characters)
//! - [`schema`]: node types and the structural rules they imply
//! - [`tree`]: the arena node tree
//! - [`document`]: flat data plus its cached tree and value store
//! - [`store`]: hash-keyed store of annotation values
//! - [`range`]: linear ranges

pub mod document;
pub mod error;
pub mod item;
pub mod range;
pub mod schema;
pub mod store;
pub mod tree;

pub use document::{validate, Document};
pub use error::{ModelError, ModelResult};
pub use item::{non_null, plain_text, Attributes, ElementData, Item};
pub use range::Range;
pub use schema::{NodeType, Schema};
pub use store::ValueStore;
pub use tree::{Node, NodeData, NodeId, Tree};
