//! # Compact wire form
//!
//! Transactions are exchanged as small JSON documents:
//!
//! ```text
//! 5                                       retain 5
//! ["ab", "xyz"]                           replace plain text "ab" with "xyz"
//! {"type": "replace", "remove": [...], "insert": [...]}
//! {"type": "attribute", "key": "level", "from": 1, "to": 2}
//! {"a": 3, "o": [2, ["", "x"], 7]}        transaction by author 3
//! ```
//!
//! A change lists its transactions; one whose author matches the previous
//! transaction's is written as a bare operation array.

use crate::change::Change;
use crate::selection::Selection;
use crate::transaction::{AuthorId, Operation, Transaction};
use folio_model::{plain_text, Item, ValueStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum OperationRepr {
    Retain(usize),
    Text(String, String),
    Full(FullOperation),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum FullOperation {
    Retain {
        length: usize,
    },
    #[serde(rename_all = "camelCase")]
    Replace {
        remove: Vec<Item>,
        insert: Vec<Item>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inserted_data_offset: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inserted_data_length: Option<usize>,
    },
    Attribute {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Value>,
    },
}

impl From<Operation> for OperationRepr {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Retain { length } => OperationRepr::Retain(length),
            Operation::Replace {
                remove,
                insert,
                inserted_data_offset: None,
                inserted_data_length: None,
            } if plain_text(&remove).is_some() && plain_text(&insert).is_some() => {
                OperationRepr::Text(
                    plain_text(&remove).unwrap_or_default(),
                    plain_text(&insert).unwrap_or_default(),
                )
            }
            Operation::Replace {
                remove,
                insert,
                inserted_data_offset,
                inserted_data_length,
            } => OperationRepr::Full(FullOperation::Replace {
                remove,
                insert,
                inserted_data_offset,
                inserted_data_length,
            }),
            Operation::Attribute { key, from, to } => {
                OperationRepr::Full(FullOperation::Attribute { key, from, to })
            }
        }
    }
}

impl From<OperationRepr> for Operation {
    fn from(repr: OperationRepr) -> Self {
        match repr {
            OperationRepr::Retain(length) => Operation::Retain { length },
            OperationRepr::Text(remove, insert) => {
                Operation::replace(Item::text(&remove), Item::text(&insert))
            }
            OperationRepr::Full(FullOperation::Retain { length }) => Operation::Retain { length },
            OperationRepr::Full(FullOperation::Replace {
                remove,
                insert,
                inserted_data_offset,
                inserted_data_length,
            }) => Operation::Replace {
                remove,
                insert,
                inserted_data_offset,
                inserted_data_length,
            },
            OperationRepr::Full(FullOperation::Attribute { key, from, to }) => {
                Operation::attribute(key, from, to)
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
pub(crate) struct TransactionRepr {
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    author: Option<AuthorId>,
    #[serde(rename = "o")]
    operations: Vec<Operation>,
}

impl From<Transaction> for TransactionRepr {
    fn from(tx: Transaction) -> Self {
        let author = tx.author();
        TransactionRepr {
            author,
            operations: tx.into_operations(),
        }
    }
}

impl From<TransactionRepr> for Transaction {
    fn from(repr: TransactionRepr) -> Self {
        Transaction::from_operations(repr.operations, repr.author)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TransactionEntry {
    Operations(Vec<Operation>),
    Full(TransactionRepr),
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ChangeRepr {
    start: usize,
    transactions: Vec<TransactionEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stores: Vec<ValueStore>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    selections: BTreeMap<AuthorId, Selection>,
}

impl From<Change> for ChangeRepr {
    fn from(change: Change) -> Self {
        let (start, transactions, stores, selections) = change.into_parts();
        let mut previous_author = None;
        let transactions = transactions
            .into_iter()
            .map(|tx| {
                let author = tx.author();
                let entry = if author == previous_author {
                    TransactionEntry::Operations(tx.into_operations())
                } else {
                    TransactionEntry::Full(tx.into())
                };
                previous_author = author;
                entry
            })
            .collect();

        let stores = if stores.iter().all(ValueStore::is_empty) {
            Vec::new()
        } else {
            stores
        };

        ChangeRepr {
            start,
            transactions,
            stores,
            selections,
        }
    }
}

impl From<ChangeRepr> for Change {
    fn from(repr: ChangeRepr) -> Self {
        let mut previous_author = None;
        let transactions = repr
            .transactions
            .into_iter()
            .map(|entry| {
                let tx = match entry {
                    TransactionEntry::Operations(operations) => {
                        Transaction::from_operations(operations, previous_author)
                    }
                    TransactionEntry::Full(repr) => Transaction::from(repr),
                };
                previous_author = tx.author();
                tx
            })
            .collect();
        Change::new(repr.start, transactions, repr.stores, repr.selections)
    }
}
