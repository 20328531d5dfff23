//! # Transactions
//!
//! A transaction is an ordered list of operations walked left to right over a
//! document's linear data:
//!
//! - `Retain(n)`: keep the next `n` items
//! - `Replace(remove, insert)`: remove the items listed in `remove` (which must
//!   match the document) and insert `insert` in their place
//! - `Attribute(key, from, to)`: change an attribute of the element whose open
//!   marker is next; does not move the cursor
//!
//! Retained plus removed lengths add up to the document length, so every
//! transaction is only meaningful against the state it was built for.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut tx = Transaction::new();
//! tx.push_retain(1);
//! tx.push_replace(vec![], Item::text("xy"), None, None);
//! tx.push_retain(doc.len() - 1);
//!
//! let edits = doc.commit(&mut tx)?;
//! let undo = tx.reversed();
//! ```

use folio_model::{Document, Item, Range};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies the author of a transaction in collaborative sessions
pub type AuthorId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "crate::compact::OperationRepr", into = "crate::compact::OperationRepr")]
pub enum Operation {
    Retain {
        length: usize,
    },
    Replace {
        remove: Vec<Item>,
        insert: Vec<Item>,
        /// Where the caller's own data starts inside `insert` when the builder
        /// had to add structure around it
        inserted_data_offset: Option<usize>,
        /// Length of the caller's own data inside `insert`
        inserted_data_length: Option<usize>,
    },
    Attribute {
        key: String,
        from: Option<Value>,
        to: Option<Value>,
    },
}

impl Operation {
    pub fn retain(length: usize) -> Self {
        Operation::Retain { length }
    }

    pub fn replace(remove: Vec<Item>, insert: Vec<Item>) -> Self {
        Operation::Replace {
            remove,
            insert,
            inserted_data_offset: None,
            inserted_data_length: None,
        }
    }

    /// `null` values are stored as absent
    pub fn attribute(key: impl Into<String>, from: Option<Value>, to: Option<Value>) -> Self {
        Operation::Attribute {
            key: key.into(),
            from: from.filter(|value| !value.is_null()),
            to: to.filter(|value| !value.is_null()),
        }
    }

    /// Items consumed from the pre-transaction state
    pub fn len_before(&self) -> usize {
        match self {
            Operation::Retain { length } => *length,
            Operation::Replace { remove, .. } => remove.len(),
            Operation::Attribute { .. } => 0,
        }
    }

    /// Items produced in the post-transaction state
    pub fn len_after(&self) -> usize {
        match self {
            Operation::Retain { length } => *length,
            Operation::Replace { insert, .. } => insert.len(),
            Operation::Attribute { .. } => 0,
        }
    }

    /// A replace that only changes character annotations. Structure and
    /// length are untouched, so it behaves like a retain for offsets and trees.
    pub fn is_annotation_only(&self) -> bool {
        match self {
            Operation::Replace { remove, insert, .. } => {
                !remove.is_empty()
                    && remove.len() == insert.len()
                    && remove.iter().zip(insert).all(|(a, b)| a.same_content(b))
            }
            _ => false,
        }
    }

    pub fn reversed(&self) -> Operation {
        match self {
            Operation::Retain { length } => Operation::Retain { length: *length },
            Operation::Replace { remove, insert, .. } => {
                Operation::replace(insert.clone(), remove.clone())
            }
            Operation::Attribute { key, from, to } => Operation::Attribute {
                key: key.clone(),
                from: to.clone(),
                to: from.clone(),
            },
        }
    }
}

/// An ordered list of operations.
///
/// Cloning yields a fresh copy that has not been applied.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(
    from = "crate::compact::TransactionRepr",
    into = "crate::compact::TransactionRepr"
)]
pub struct Transaction {
    operations: Vec<Operation>,
    author: Option<AuthorId>,
    applied: bool,
}

impl Clone for Transaction {
    fn clone(&self) -> Self {
        Self {
            operations: self.operations.clone(),
            author: self.author,
            applied: false,
        }
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.operations == other.operations && self.author == other.author
    }
}

fn shift(offset: usize, adjustment: isize) -> usize {
    (offset as isize + adjustment).max(0) as usize
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(author: Option<AuthorId>) -> Self {
        Self {
            author,
            ..Self::default()
        }
    }

    /// Wrap an operation list as-is, without merging
    pub fn from_operations(operations: Vec<Operation>, author: Option<AuthorId>) -> Self {
        Self {
            operations,
            author,
            applied: false,
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    pub fn author(&self) -> Option<AuthorId> {
        self.author
    }

    pub fn set_author(&mut self, author: Option<AuthorId>) {
        self.author = author;
    }

    pub fn has_been_applied(&self) -> bool {
        self.applied
    }

    pub fn mark_applied(&mut self) {
        self.applied = true;
    }

    pub fn push_retain(&mut self, length: usize) {
        if length == 0 {
            return;
        }
        if let Some(Operation::Retain { length: last }) = self.operations.last_mut() {
            *last += length;
            return;
        }
        self.operations.push(Operation::Retain { length });
    }

    pub fn push_replace(
        &mut self,
        remove: Vec<Item>,
        insert: Vec<Item>,
        inserted_data_offset: Option<usize>,
        inserted_data_length: Option<usize>,
    ) {
        if remove.is_empty() && insert.is_empty() {
            return;
        }
        let hinted = inserted_data_offset.is_some() || inserted_data_length.is_some();
        if !hinted {
            if let Some(Operation::Replace {
                remove: last_remove,
                insert: last_insert,
                inserted_data_offset: None,
                inserted_data_length: None,
            }) = self.operations.last_mut()
            {
                last_remove.extend(remove);
                last_insert.extend(insert);
                return;
            }
        }
        self.operations.push(Operation::Replace {
            remove,
            insert,
            inserted_data_offset,
            inserted_data_length,
        });
    }

    pub fn push_attribute(&mut self, key: impl Into<String>, from: Option<Value>, to: Option<Value>) {
        let op = Operation::attribute(key, from, to);
        if let Operation::Attribute { from, to, .. } = &op {
            if from == to {
                return;
            }
        }
        self.operations.push(op);
    }

    /// Length of the document this transaction applies to
    pub fn len_before(&self) -> usize {
        self.operations.iter().map(Operation::len_before).sum()
    }

    /// Length of the document after applying
    pub fn len_after(&self) -> usize {
        self.operations.iter().map(Operation::len_after).sum()
    }

    pub fn length_difference(&self) -> isize {
        self.len_after() as isize - self.len_before() as isize
    }

    /// No operations, or a single retain
    pub fn is_no_op(&self) -> bool {
        match self.operations.as_slice() {
            [] => true,
            [Operation::Retain { .. }] => true,
            _ => false,
        }
    }

    /// The inverse transaction: replaces swap remove/insert, attribute changes
    /// swap from/to. Order is preserved.
    pub fn reversed(&self) -> Transaction {
        Transaction {
            operations: self.operations.iter().map(Operation::reversed).collect(),
            author: self.author,
            applied: false,
        }
    }

    /// Map a pre-transaction offset to the equivalent post-transaction offset.
    ///
    /// At the point of a pure insertion, `exclude_insertion` keeps the offset
    /// before the inserted content; otherwise it moves past it. Offsets at the
    /// start of a removal stay before any replacement content, offsets inside
    /// or at the end of a removal land after it.
    pub fn translate_offset(&self, offset: usize, exclude_insertion: bool) -> usize {
        let mut cursor = 0;
        let mut adjustment: isize = 0;

        for op in &self.operations {
            let length = match op {
                Operation::Attribute { .. } => continue,
                Operation::Retain { length } => *length,
                Operation::Replace { remove, .. } if op.is_annotation_only() => remove.len(),
                Operation::Replace { remove, insert, .. } => {
                    let (remove_len, insert_len) = (remove.len(), insert.len());
                    let start = shift(cursor, adjustment);
                    if offset == cursor {
                        return if remove_len == 0 && !exclude_insertion {
                            start + insert_len
                        } else {
                            start
                        };
                    }
                    if offset > cursor && offset <= cursor + remove_len {
                        return start + insert_len;
                    }
                    cursor += remove_len;
                    adjustment += insert_len as isize - remove_len as isize;
                    continue;
                }
            };
            if offset < cursor + length {
                return shift(offset, adjustment);
            }
            cursor += length;
        }
        shift(offset, adjustment)
    }

    /// Translate both ends of a range. Insertions at the range's edges are
    /// included unless `exclude_insertion` is set. A collapsed range stays
    /// collapsed.
    pub fn translate_range(&self, range: Range, exclude_insertion: bool) -> Range {
        if range.is_collapsed() {
            return Range::collapsed(self.translate_offset(range.from, exclude_insertion));
        }
        let start = self.translate_offset(range.start(), !exclude_insertion);
        let end = self.translate_offset(range.end(), exclude_insertion);
        if range.is_backwards() {
            Range::new(end, start)
        } else {
            Range::new(start, end)
        }
    }

    /// Translate a range belonging to `author`. The range stays before this
    /// transaction's insertions when the other author is unknown, when this
    /// transaction has no author, or when the other author's id is not greater
    /// than this transaction's.
    pub fn translate_range_with_author(&self, range: Range, author: Option<AuthorId>) -> Range {
        let backward = match (self.author, author) {
            (Some(own), Some(other)) => other <= own,
            _ => true,
        };
        let from = self.translate_offset(range.from, backward);
        let to = self.translate_offset(range.to, backward);
        Range::new(from, to)
    }

    /// Smallest post-transaction range covering every edit, or `None` for a
    /// transaction that only retains. Edits inside the document's trailing
    /// reserved region are ignored unless `include_reserved` is set.
    pub fn modified_range(&self, doc: &Document, include_reserved: bool) -> Option<Range> {
        let doc_end = if include_reserved {
            doc.len()
        } else {
            doc.reserved_start().unwrap_or(doc.len())
        };

        let mut old_offset = 0;
        let mut new_offset = 0;
        let mut start: Option<usize> = None;
        let mut end: Option<usize> = None;

        for op in &self.operations {
            match op {
                Operation::Retain { length } => {
                    if old_offset + length > doc_end {
                        break;
                    }
                    old_offset += length;
                    new_offset += length;
                }
                Operation::Attribute { .. } => {
                    if old_offset >= doc_end {
                        break;
                    }
                    start.get_or_insert(new_offset);
                    // the element to the right is modified; the cursor stays
                    end = Some(end.map_or(new_offset + 1, |e| e.max(new_offset + 1)));
                }
                Operation::Replace { remove, insert, .. } => {
                    if old_offset >= doc_end && !(old_offset == doc_end && remove.is_empty()) {
                        break;
                    }
                    start.get_or_insert(new_offset);
                    old_offset += remove.len();
                    new_offset += insert.len();
                    end = Some(end.map_or(new_offset, |e| e.max(new_offset)));
                }
            }
        }

        match (start, end) {
            (Some(start), Some(end)) => Some(Range::new(start, end)),
            _ => None,
        }
    }
}
