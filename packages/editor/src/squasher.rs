//! # Squashing
//!
//! Folds a run of sequentially applicable transactions into one transaction
//! with the same effect. The first transaction is the accumulator; every
//! following one is walked over the accumulator's post-state with a cursor
//! that always sits on an operation boundary, splitting operations as
//! needed:
//!
//! ```text
//! accumulated  | retain 2 | replace(-, "xy") | retain 5 |
//! incoming     | retain 3 |remove "y"|         retain 5 |
//! result       | retain 2 | replace(-, "x")  | retain 5 |
//! ```
//!
//! Content the accumulator inserted and the incoming transaction removes is
//! cancelled outright; removed content the accumulator only retained is
//! folded into the accumulator's removals.

use crate::errors::{EditorError, EditorResult};
use crate::transaction::{AuthorId, Operation, Transaction};
use folio_model::{non_null, Item};
use serde_json::Value;
use tracing::trace;

/// Squash `transactions` into one
pub fn squash(transactions: &[Transaction]) -> EditorResult<Transaction> {
    TransactionSquasher::squash(transactions)
}

pub struct TransactionSquasher {
    operations: Vec<Operation>,
    /// Index of the operation just after the cursor
    position: usize,
    /// Attribute changes lifted off an element about to be removed, as
    /// (key, from)
    reverts: Vec<(String, Option<Value>)>,
}

impl TransactionSquasher {
    pub fn squash(transactions: &[Transaction]) -> EditorResult<Transaction> {
        let (first, rest) = transactions
            .split_first()
            .ok_or_else(|| EditorError::construction("cannot squash an empty list of transactions"))?;

        let mut squasher = TransactionSquasher {
            operations: first.operations().to_vec(),
            position: 0,
            reverts: Vec::new(),
        };
        for (index, tx) in rest.iter().enumerate() {
            trace!(index = index + 1, ops = tx.operations().len(), "Squashing transaction");
            squasher.process(tx)?;
        }

        Ok(squasher.finish(common_author(transactions)))
    }

    fn len_after(&self) -> usize {
        self.operations.iter().map(Operation::len_after).sum()
    }

    fn process(&mut self, tx: &Transaction) -> EditorResult<()> {
        let expected = self.len_after();
        if tx.len_before() != expected {
            return Err(EditorError::consistency(format!(
                "transaction covers {} items but the previous ones leave {}",
                tx.len_before(),
                expected
            )));
        }

        self.position = 0;
        for op in tx.operations() {
            match op {
                Operation::Retain { length } => self.retain(*length)?,
                Operation::Replace {
                    remove,
                    insert,
                    inserted_data_offset,
                    inserted_data_length,
                } => {
                    self.remove(remove)?;
                    self.insert(insert, *inserted_data_offset, *inserted_data_length);
                }
                Operation::Attribute { key, from, to } => self.attribute(key, from, to)?,
            }
        }
        Ok(())
    }

    /// Split the operation at the cursor so that its first `at` post-state
    /// items stand on their own
    fn split(&mut self, at: usize) {
        let Some(op) = self.operations.get_mut(self.position) else {
            return;
        };
        let tail = match op {
            Operation::Retain { length } => {
                let tail = *length - at;
                *length = at;
                Operation::retain(tail)
            }
            Operation::Replace {
                insert,
                inserted_data_offset,
                inserted_data_length,
                ..
            } => {
                *inserted_data_offset = None;
                *inserted_data_length = None;
                let tail = insert.split_off(at);
                Operation::replace(Vec::new(), tail)
            }
            Operation::Attribute { .. } => return,
        };
        self.operations.insert(self.position + 1, tail);
    }

    fn retain(&mut self, mut length: usize) -> EditorResult<()> {
        while length > 0 {
            let available = self
                .operations
                .get(self.position)
                .map(Operation::len_after)
                .ok_or_else(|| EditorError::consistency("retain runs past the end of the document"))?;
            if available > length {
                self.split(length);
                length = 0;
            } else {
                length -= available;
            }
            self.position += 1;
        }
        Ok(())
    }

    fn remove(&mut self, items: &[Item]) -> EditorResult<()> {
        let mut index = 0;
        while index < items.len() {
            let op = self
                .operations
                .get_mut(self.position)
                .ok_or_else(|| EditorError::consistency("removal runs past the end of the document"))?;

            match op {
                Operation::Attribute { key, from, .. } => {
                    self.reverts.push((key.clone(), from.clone()));
                    self.operations.remove(self.position);
                }
                Operation::Replace { insert, .. } if insert.is_empty() => {
                    self.position += 1;
                }
                Operation::Replace {
                    insert,
                    inserted_data_offset,
                    inserted_data_length,
                    ..
                } => {
                    if !self.reverts.is_empty() {
                        return Err(EditorError::consistency(
                            "attribute change precedes inserted content",
                        ));
                    }
                    if insert[0] != items[index] {
                        return Err(EditorError::consistency(format!(
                            "removed item {:?} does not match the inserted item {:?}",
                            items[index], insert[0]
                        )));
                    }
                    insert.remove(0);
                    *inserted_data_offset = None;
                    *inserted_data_length = None;
                    index += 1;
                }
                Operation::Retain { length } => {
                    let take = (*length).min(items.len() - index);
                    if take < *length {
                        self.split(take);
                    }
                    let mut removed = items[index..index + take].to_vec();
                    self.revert_attributes(&mut removed)?;
                    self.operations[self.position] = Operation::replace(removed, Vec::new());
                    self.position += 1;
                    index += take;
                }
            }
        }

        if !self.reverts.is_empty() {
            return Err(EditorError::consistency(
                "attribute change on an element that was not removed",
            ));
        }
        Ok(())
    }

    /// Restore the pre-state attributes of a removed element
    fn revert_attributes(&mut self, removed: &mut [Item]) -> EditorResult<()> {
        if self.reverts.is_empty() {
            return Ok(());
        }
        let element = removed
            .first_mut()
            .and_then(Item::element_mut)
            .ok_or_else(|| EditorError::consistency("attribute change is not on an element"))?;
        for (key, from) in self.reverts.drain(..).rev() {
            element.set_attribute(&key, from);
        }
        Ok(())
    }

    fn insert(&mut self, items: &[Item], data_offset: Option<usize>, data_length: Option<usize>) {
        if items.is_empty() {
            return;
        }
        let op = Operation::Replace {
            remove: Vec::new(),
            insert: items.to_vec(),
            inserted_data_offset: data_offset,
            inserted_data_length: data_length,
        };
        self.operations.insert(self.position, op);
        self.position += 1;
    }

    fn attribute(&mut self, key: &str, from: &Option<Value>, to: &Option<Value>) -> EditorResult<()> {
        // the element the change applies to is the next post-state item
        let mut target = self.position;
        loop {
            match self.operations.get(target) {
                Some(Operation::Attribute { .. }) => target += 1,
                Some(Operation::Replace { insert, .. }) if insert.is_empty() => target += 1,
                Some(_) => break,
                None => {
                    return Err(EditorError::consistency(
                        "attribute change at the end of the document",
                    ))
                }
            }
        }

        if let Some(Operation::Replace { insert, .. }) = self.operations.get_mut(target) {
            let element = insert
                .first_mut()
                .and_then(Item::element_mut)
                .ok_or_else(|| EditorError::consistency("attribute change is not on an element"))?;
            if element.attribute(key) != non_null(from.as_ref()) {
                return Err(EditorError::consistency(format!(
                    "attribute {} of inserted {} does not have the expected value",
                    key, element.kind
                )));
            }
            element.set_attribute(key, to.clone());
            return Ok(());
        }

        let existing = (self.position..target).find(|&index| {
            matches!(&self.operations[index], Operation::Attribute { key: k, .. } if k == key)
        });
        match existing {
            Some(index) => {
                let vanished = match &mut self.operations[index] {
                    Operation::Attribute {
                        from: first,
                        to: last,
                        ..
                    } => {
                        if non_null(last.as_ref()) != non_null(from.as_ref()) {
                            return Err(EditorError::consistency(format!(
                                "attribute {} does not continue from its previous value",
                                key
                            )));
                        }
                        *last = to.clone().filter(|value| !value.is_null());
                        non_null(first.as_ref()) == non_null(last.as_ref())
                    }
                    _ => false,
                };
                if vanished {
                    self.operations.remove(index);
                }
            }
            None => {
                self.operations
                    .insert(target, Operation::attribute(key, from.clone(), to.clone()));
            }
        }
        Ok(())
    }

    fn finish(self, author: Option<AuthorId>) -> Transaction {
        let mut tx = Transaction::with_author(author);
        for op in self.operations {
            match op {
                Operation::Retain { length } => tx.push_retain(length),
                Operation::Replace {
                    remove,
                    insert,
                    inserted_data_offset,
                    inserted_data_length,
                } => tx.push_replace(remove, insert, inserted_data_offset, inserted_data_length),
                Operation::Attribute { key, from, to } => tx.push_attribute(key, from, to),
            }
        }
        tx
    }
}

fn common_author(transactions: &[Transaction]) -> Option<AuthorId> {
    let first = transactions.first()?.author();
    transactions
        .iter()
        .all(|tx| tx.author() == first)
        .then_some(first)
        .flatten()
}
