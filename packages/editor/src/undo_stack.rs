//! # Undo/Redo Stack
//!
//! Commits transactions to a document and keeps them for undo/redo.
//!
//! ## Design
//!
//! - Each committed transaction is recorded; its inverse is derived on undo
//! - Undo commits the reversed entry and moves it to the redo stack
//! - Redo commits the entry again
//! - New commits clear the redo stack
//! - Batches group several commits into one entry, squashed when the batch ends
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut stack = UndoStack::new();
//! let mut doc = Document::new(data)?;
//!
//! stack.commit(TransactionBuilder::insertion(&doc, 1, Item::text("hi"))?, &mut doc)?;
//!
//! stack.undo(&mut doc)?;
//! stack.redo(&mut doc)?;
//! ```

use crate::commit::DocumentExt;
use crate::errors::EditorResult;
use crate::squasher::squash;
use crate::transaction::Transaction;
use crate::tree_modifier::TreeEdit;
use folio_model::Document;
use tracing::debug;

/// Transactions undone and redone together
#[derive(Debug, Clone)]
pub struct TransactionBatch {
    /// In application order
    pub transactions: Vec<Transaction>,

    pub description: Option<String>,
}

impl TransactionBatch {
    pub fn single(tx: Transaction) -> Self {
        Self {
            transactions: vec![tx],
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The batch as one transaction
    pub fn squashed(&self) -> EditorResult<Transaction> {
        squash(&self.transactions)
    }
}

/// Undo/redo stack for document editing
#[derive(Debug)]
pub struct UndoStack {
    /// Most recent last
    undo_stack: Vec<TransactionBatch>,

    /// Most recently undone last
    redo_stack: Vec<TransactionBatch>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    current_batch: Option<TransactionBatch>,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
        }
    }

    /// Commit `tx` to `doc` and record it for undo
    pub fn commit(&mut self, mut tx: Transaction, doc: &mut Document) -> EditorResult<Vec<TreeEdit>> {
        let edits = doc.commit(&mut tx)?;

        if let Some(batch) = &mut self.current_batch {
            batch.transactions.push(tx);
        } else {
            self.push_batch(TransactionBatch::single(tx));
        }

        Ok(edits)
    }

    /// Start a batch of commits that will be undone/redone together
    pub fn begin_batch(&mut self) {
        self.current_batch = Some(TransactionBatch {
            transactions: Vec::new(),
            description: None,
        });
    }

    /// End the current batch, squash it and push it to the undo stack
    pub fn end_batch(&mut self) -> EditorResult<()> {
        if let Some(batch) = self.current_batch.take() {
            if batch.transactions.is_empty() {
                return Ok(());
            }
            let squashed = batch.squashed()?;
            debug!(
                transactions = batch.transactions.len(),
                "Squashed batch into one history entry"
            );
            self.push_batch(TransactionBatch {
                transactions: vec![squashed],
                description: batch.description,
            });
        }
        Ok(())
    }

    pub fn set_batch_description(&mut self, description: impl Into<String>) {
        if let Some(batch) = &mut self.current_batch {
            batch.description = Some(description.into());
        }
    }

    fn push_batch(&mut self, batch: TransactionBatch) {
        self.undo_stack.push(batch);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        self.redo_stack.clear();
    }

    /// Undo the most recent entry. Returns `None` when there is nothing to
    /// undo.
    pub fn undo(&mut self, doc: &mut Document) -> EditorResult<Option<Vec<TreeEdit>>> {
        let Some(batch) = self.undo_stack.pop() else {
            return Ok(None);
        };

        let mut edits = Vec::new();
        for tx in batch.transactions.iter().rev() {
            let mut reversed = tx.reversed();
            match doc.commit(&mut reversed) {
                Ok(more) => edits.extend(more),
                Err(err) => {
                    self.undo_stack.push(batch);
                    return Err(err);
                }
            }
        }

        self.redo_stack.push(batch);
        Ok(Some(edits))
    }

    /// Redo the most recently undone entry. Returns `None` when there is
    /// nothing to redo.
    pub fn redo(&mut self, doc: &mut Document) -> EditorResult<Option<Vec<TreeEdit>>> {
        let Some(batch) = self.redo_stack.pop() else {
            return Ok(None);
        };

        let mut edits = Vec::new();
        for tx in &batch.transactions {
            match doc.commit(&mut tx.clone()) {
                Ok(more) => edits.extend(more),
                Err(err) => {
                    self.redo_stack.push(batch);
                    return Err(err);
                }
            }
        }

        self.undo_stack.push(batch);
        Ok(Some(edits))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransactionBuilder;
    use folio_model::Item;

    fn doc() -> Document {
        let mut data = vec![Item::open("paragraph")];
        data.extend(Item::text("Hello"));
        data.push(Item::close("paragraph"));
        Document::new(data).unwrap()
    }

    fn type_text(stack: &mut UndoStack, doc: &mut Document, offset: usize, text: &str) {
        let tx = TransactionBuilder::insertion(doc, offset, Item::text(text)).unwrap();
        stack.commit(tx, doc).unwrap();
    }

    #[test]
    fn test_undo_stack_creation() {
        let stack = UndoStack::new();
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 0);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_commit_undo_redo() {
        let mut doc = doc();
        let mut stack = UndoStack::new();

        type_text(&mut stack, &mut doc, 6, " World");
        assert_eq!(doc.text(), "Hello World");
        assert_eq!(stack.undo_levels(), 1);

        let undone = stack.undo(&mut doc).unwrap();
        assert!(undone.is_some());
        assert_eq!(doc.text(), "Hello");
        assert_eq!(stack.redo_levels(), 1);

        let redone = stack.redo(&mut doc).unwrap();
        assert!(redone.is_some());
        assert_eq!(doc.text(), "Hello World");
        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.redo_levels(), 0);
        assert!(doc.is_tree_consistent());
    }

    #[test]
    fn test_nothing_to_undo() {
        let mut doc = doc();
        let mut stack = UndoStack::new();
        assert!(stack.undo(&mut doc).unwrap().is_none());
        assert!(stack.redo(&mut doc).unwrap().is_none());
    }

    #[test]
    fn test_batch_is_squashed_into_one_entry() {
        let mut doc = doc();
        let mut stack = UndoStack::new();

        stack.begin_batch();
        stack.set_batch_description("Type greeting");
        type_text(&mut stack, &mut doc, 6, ",");
        type_text(&mut stack, &mut doc, 7, " you");
        stack.end_batch().unwrap();

        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.undo_description(), Some("Type greeting"));
        assert_eq!(doc.text(), "Hello, you");

        stack.undo(&mut doc).unwrap();
        assert_eq!(doc.text(), "Hello");
        assert_eq!(stack.redo_description(), Some("Type greeting"));
    }

    #[test]
    fn test_new_commit_clears_redo() {
        let mut doc = doc();
        let mut stack = UndoStack::new();

        type_text(&mut stack, &mut doc, 6, "!");
        stack.undo(&mut doc).unwrap();
        assert_eq!(stack.redo_levels(), 1);

        type_text(&mut stack, &mut doc, 6, "?");
        assert_eq!(stack.redo_levels(), 0);
    }

    #[test]
    fn test_max_levels_enforced() {
        let mut doc = doc();
        let mut stack = UndoStack::with_max_levels(2);

        for i in 0..3 {
            type_text(&mut stack, &mut doc, 6, &i.to_string());
        }

        assert_eq!(stack.undo_levels(), 2);
    }
}
