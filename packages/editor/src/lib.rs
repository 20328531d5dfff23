//! # Folio Editor
//!
//! Transactional editing engine over the linear document model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: linear data + cached node tree       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: transactions over the model         │
//! │  - Build transactions from intents          │
//! │  - Commit with validation, mirror in tree   │
//! │  - Squash runs of history                   │
//! │  - Rebase concurrent changes                │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ view: consumes TreeEdit scripts             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Linear data is the source of truth**: the tree is a cache kept in step
//! 2. **Validate before mutating**: a failed commit changes nothing
//! 3. **Conflicts are data**: rebasing reports them instead of failing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_editor::{DocumentExt, TransactionBuilder};
//!
//! let mut tx = TransactionBuilder::insertion(&doc, 1, Item::text("Hi"))?;
//! let edits = doc.commit(&mut tx)?;
//!
//! let result = rebase(&history, &uncommitted)?;
//! if result.conflicted() {
//!     // show result.rejected to the user
//! }
//! ```

mod builder;
mod change;
mod commit;
mod compact;
mod errors;
mod rebase;
mod selection;
mod squasher;
mod transaction;
mod tree_modifier;
mod undo_stack;

pub use builder::{AnnotationMethod, TransactionBuilder};
pub use change::Change;
pub use commit::DocumentExt;
pub use errors::{EditorError, EditorResult};
pub use rebase::{rebase, rebase_transactions, RebaseResult};
pub use selection::Selection;
pub use squasher::{squash, TransactionSquasher};
pub use transaction::{AuthorId, Operation, Transaction};
pub use tree_modifier::{TreeEdit, TreeModifier, TreePosition};
pub use undo_stack::{TransactionBatch, UndoStack};
