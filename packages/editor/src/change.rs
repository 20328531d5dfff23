//! # Changes
//!
//! A change is a run of transactions from a shared history, starting at
//! history position `start`, together with the value-store entries each
//! transaction introduced and the selection of every participating author.

use crate::commit::DocumentExt;
use crate::errors::{EditorError, EditorResult};
use crate::rebase::rebase;
use crate::selection::Selection;
use crate::squasher::squash;
use crate::transaction::{AuthorId, Transaction};
use crate::tree_modifier::TreeEdit;
use folio_model::{Document, ValueStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "crate::compact::ChangeRepr", into = "crate::compact::ChangeRepr")]
pub struct Change {
    start: usize,
    transactions: Vec<Transaction>,
    /// One store per transaction
    stores: Vec<ValueStore>,
    selections: BTreeMap<AuthorId, Selection>,
}

impl Change {
    /// Missing stores are filled in empty; extra stores are dropped
    pub fn new(
        start: usize,
        transactions: Vec<Transaction>,
        mut stores: Vec<ValueStore>,
        selections: BTreeMap<AuthorId, Selection>,
    ) -> Self {
        stores.resize_with(transactions.len(), ValueStore::new);
        Self {
            start,
            transactions,
            stores,
            selections,
        }
    }

    pub fn empty(start: usize) -> Self {
        Self::new(start, Vec::new(), Vec::new(), BTreeMap::new())
    }

    pub fn from_transaction(start: usize, tx: Transaction, store: ValueStore) -> Self {
        Self::new(start, vec![tx], vec![store], BTreeMap::new())
    }

    pub fn into_parts(
        self,
    ) -> (
        usize,
        Vec<Transaction>,
        Vec<ValueStore>,
        BTreeMap<AuthorId, Selection>,
    ) {
        (self.start, self.transactions, self.stores, self.selections)
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn set_start(&mut self, start: usize) {
        self.start = start;
    }

    /// History position just after the last transaction
    pub fn end(&self) -> usize {
        self.start + self.transactions.len()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn stores(&self) -> &[ValueStore] {
        &self.stores
    }

    /// All stores of the change merged into one
    pub fn merged_store(&self) -> ValueStore {
        let mut merged = ValueStore::new();
        for store in &self.stores {
            merged.merge(store);
        }
        merged
    }

    pub fn selections(&self) -> &BTreeMap<AuthorId, Selection> {
        &self.selections
    }

    pub fn set_selection(&mut self, author: AuthorId, selection: Selection) {
        self.selections.insert(author, selection);
    }

    pub fn clear_selections(&mut self) {
        self.selections.clear();
    }

    /// The change that undoes this one. It starts where this one ends and
    /// carries no selections.
    pub fn reversed(&self) -> Change {
        Change::new(
            self.end(),
            self.transactions.iter().rev().map(Transaction::reversed).collect(),
            self.stores.iter().rev().cloned().collect(),
            BTreeMap::new(),
        )
    }

    /// Append `other`, which must start where this change ends. Selections
    /// of `other` replace those of the same authors.
    pub fn concat(&self, other: &Change) -> EditorResult<Change> {
        if other.start != self.end() {
            return Err(EditorError::construction(format!(
                "cannot concat a change starting at {} onto one ending at {}",
                other.start,
                self.end()
            )));
        }
        let mut change = self.clone();
        change.transactions.extend(other.transactions.iter().cloned());
        change.stores.extend(other.stores.iter().cloned());
        change
            .selections
            .extend(other.selections.iter().map(|(author, selection)| (*author, *selection)));
        Ok(change)
    }

    pub fn push(&mut self, tx: Transaction, store: ValueStore) {
        self.transactions.push(tx);
        self.stores.push(store);
    }

    /// The tail of this change from history position `start` on
    pub fn most_recent(&self, start: usize) -> EditorResult<Change> {
        if start < self.start || start > self.end() {
            return Err(EditorError::construction(format!(
                "position {} is outside the change {}..{}",
                start,
                self.start,
                self.end()
            )));
        }
        let skip = start - self.start;
        Ok(Change::new(
            start,
            self.transactions[skip..].to_vec(),
            self.stores[skip..].to_vec(),
            self.selections.clone(),
        ))
    }

    /// Keep only the first `length` transactions
    pub fn truncate(&self, length: usize) -> Change {
        let length = length.min(self.len());
        Change::new(
            self.start,
            self.transactions[..length].to_vec(),
            self.stores[..length].to_vec(),
            self.selections.clone(),
        )
    }

    /// The same change as a single squashed transaction
    pub fn squashed(&self) -> EditorResult<Change> {
        if self.is_empty() {
            return Ok(self.clone());
        }
        let tx = squash(&self.transactions)?;
        let mut change = Change::from_transaction(self.start, tx, self.merged_store());
        change.selections = self.selections.clone();
        Ok(change)
    }

    /// This change transformed to apply after `other`, or `None` when the
    /// two conflict
    pub fn rebased_onto(&self, other: &Change) -> EditorResult<Option<Change>> {
        let result = rebase(other, self)?;
        if result.conflicted() {
            debug!(start = self.start, "Change conflicts with its new base");
            return Ok(None);
        }
        Ok(Some(result.rebased))
    }

    /// Commit every transaction to `doc` and merge the stores into the
    /// document's store
    pub fn apply_to(&self, doc: &mut Document) -> EditorResult<Vec<TreeEdit>> {
        let mut edits = Vec::new();
        for (tx, store) in self.transactions.iter().zip(&self.stores) {
            doc.store_mut().merge(store);
            let mut tx = tx.clone();
            edits.extend(doc.commit(&mut tx)?);
        }
        Ok(edits)
    }

    /// Commit the inverse of every transaction to `doc`, most recent first
    pub fn unapply_from(&self, doc: &mut Document) -> EditorResult<Vec<TreeEdit>> {
        let mut edits = Vec::new();
        for tx in self.transactions.iter().rev() {
            let mut reversed = tx.reversed();
            edits.extend(doc.commit(&mut reversed)?);
        }
        Ok(edits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::Item;
    use serde_json::json;

    fn paragraph(text: &str) -> Vec<Item> {
        let mut data = vec![Item::open("paragraph")];
        data.extend(Item::text(text));
        data.push(Item::close("paragraph"));
        data
    }

    fn insertion(offset: usize, text: &str, length: usize, author: AuthorId) -> Transaction {
        let mut tx = Transaction::with_author(Some(author));
        tx.push_retain(offset);
        tx.push_replace(vec![], Item::text(text), None, None);
        tx.push_retain(length - offset);
        tx
    }

    fn two_insertions() -> Change {
        Change::new(
            2,
            vec![insertion(1, "x", 4, 1), insertion(2, "y", 5, 1)],
            vec![],
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_new_pads_stores() {
        let change = two_insertions();
        assert_eq!(change.stores().len(), 2);
        assert_eq!(change.start(), 2);
        assert_eq!(change.end(), 4);
    }

    #[test]
    fn test_apply_and_unapply() {
        let mut doc = Document::new(paragraph("ab")).unwrap();
        let change = two_insertions();

        change.apply_to(&mut doc).unwrap();
        assert_eq!(doc.text(), "xyab");

        change.unapply_from(&mut doc).unwrap();
        assert_eq!(doc.text(), "ab");
        assert!(doc.is_tree_consistent());
    }

    #[test]
    fn test_reversed_applies_after_original() {
        let mut doc = Document::new(paragraph("ab")).unwrap();
        let change = two_insertions();
        change.apply_to(&mut doc).unwrap();

        let reversed = change.reversed();
        assert_eq!(reversed.start(), 4);
        reversed.apply_to(&mut doc).unwrap();
        assert_eq!(doc.text(), "ab");
    }

    #[test]
    fn test_apply_merges_stores() {
        let mut doc = Document::new(paragraph("ab")).unwrap();
        let mut store = ValueStore::new();
        let hash = store.insert(json!({"type": "textStyle/italic"}));
        let change = Change::from_transaction(0, insertion(1, "x", 4, 1), store);

        change.apply_to(&mut doc).unwrap();
        assert!(doc.store().contains(&hash));
    }

    #[test]
    fn test_concat_requires_adjacency() {
        let change = two_insertions();
        let next = Change::from_transaction(4, insertion(0, "z", 6, 2), ValueStore::new());
        let joined = change.concat(&next).unwrap();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.end(), 5);

        let gap = Change::from_transaction(7, insertion(0, "z", 6, 2), ValueStore::new());
        assert!(matches!(change.concat(&gap), Err(EditorError::Construction(_))));
    }

    #[test]
    fn test_most_recent_and_truncate() {
        let change = two_insertions();

        let tail = change.most_recent(3).unwrap();
        assert_eq!(tail.start(), 3);
        assert_eq!(tail.transactions(), &change.transactions()[1..]);
        assert!(change.most_recent(1).is_err());

        let head = change.truncate(1);
        assert_eq!(head.len(), 1);
        assert_eq!(change.truncate(9).len(), 2);
    }

    #[test]
    fn test_squashed() {
        let mut change = two_insertions();
        change.set_selection(1, Selection::caret(3));
        let squashed = change.squashed().unwrap();

        assert_eq!(squashed.len(), 1);
        assert_eq!(squashed.selections().get(&1), Some(&Selection::caret(3)));

        let mut doc = Document::new(paragraph("ab")).unwrap();
        squashed.apply_to(&mut doc).unwrap();
        assert_eq!(doc.text(), "xyab");
    }

    #[test]
    fn test_rebased_onto() {
        let base = Change::from_transaction(0, insertion(1, "x", 4, 1), ValueStore::new());
        let ours = Change::from_transaction(0, insertion(3, "y", 4, 2), ValueStore::new());

        let rebased = ours.rebased_onto(&base).unwrap().unwrap();
        assert_eq!(rebased.start(), 1);

        let mut doc = Document::new(paragraph("ab")).unwrap();
        base.apply_to(&mut doc).unwrap();
        rebased.apply_to(&mut doc).unwrap();
        assert_eq!(doc.text(), "xaby");
    }
}
