//! # Committing transactions
//!
//! A commit checks a transaction against the document before touching it:
//!
//! 1. the transaction has not been applied before
//! 2. its length matches the document
//! 3. every removed item matches the document
//! 4. every attribute change starts from the current value
//! 5. the resulting linear data is a valid tree
//!
//! Only then is the tree modified in place and the linear data replaced. If
//! the tree walk still fails, the tree is rebuilt from the untouched linear
//! data so the document stays consistent.

use crate::errors::{EditorError, EditorResult};
use crate::transaction::{Operation, Transaction};
use crate::tree_modifier::{TreeEdit, TreeModifier};
use folio_model::{non_null, validate, Document, Item};
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Transaction application for [`Document`]
pub trait DocumentExt {
    /// Apply `tx`, returning the tree edits that mirror it
    fn commit(&mut self, tx: &mut Transaction) -> EditorResult<Vec<TreeEdit>>;

    /// Linear data that applying `tx` would produce
    fn preview(&self, tx: &Transaction) -> EditorResult<Vec<Item>>;
}

impl DocumentExt for Document {
    #[instrument(skip_all, fields(ops = tx.operations().len(), author = ?tx.author()))]
    fn commit(&mut self, tx: &mut Transaction) -> EditorResult<Vec<TreeEdit>> {
        if tx.has_been_applied() {
            return Err(EditorError::construction(
                "transaction has already been applied",
            ));
        }

        let data = self.preview(tx)?;

        let edits = match TreeModifier::modify(self.tree_mut(), tx) {
            Ok(edits) => edits,
            Err(err) => {
                warn!(error = %err, "Tree modification failed, rebuilding tree");
                self.rebuild_tree()?;
                return Err(err);
            }
        };

        *self.data_mut() = data;
        tx.mark_applied();
        debug!(edits = edits.len(), length = self.len(), "Transaction committed");
        Ok(edits)
    }

    fn preview(&self, tx: &Transaction) -> EditorResult<Vec<Item>> {
        let data = self.data();
        if tx.len_before() != data.len() {
            return Err(EditorError::construction(format!(
                "transaction covers {} items but the document has {}",
                tx.len_before(),
                data.len()
            )));
        }

        let mut out = Vec::with_capacity(tx.len_after());
        let mut offset = 0;
        // attribute changes waiting for the element they precede
        let mut pending: Vec<(&str, &Option<Value>)> = Vec::new();

        for op in tx.operations() {
            match op {
                Operation::Retain { length } => {
                    let end = offset + length;
                    let mut retained = data[offset..end].to_vec();
                    if !pending.is_empty() {
                        let element = retained.first_mut().and_then(Item::element_mut).ok_or_else(|| {
                            EditorError::construction(format!(
                                "attribute change at offset {} is not on an element",
                                offset
                            ))
                        })?;
                        for (key, to) in pending.drain(..) {
                            element.set_attribute(key, to.clone());
                        }
                    }
                    out.extend(retained);
                    offset = end;
                }
                Operation::Replace { remove, insert, .. } => {
                    if !pending.is_empty() {
                        return Err(EditorError::construction(format!(
                            "attribute change at offset {} must be followed by a retain",
                            offset
                        )));
                    }
                    let end = offset + remove.len();
                    if data[offset..end] != remove[..] {
                        return Err(EditorError::consistency(format!(
                            "removed data does not match the document at offset {}",
                            offset
                        )));
                    }
                    out.extend(insert.iter().cloned());
                    offset = end;
                }
                Operation::Attribute { key, from, to } => {
                    let element = data.get(offset).and_then(Item::element).ok_or_else(|| {
                        EditorError::construction(format!(
                            "attribute change at offset {} is not on an element",
                            offset
                        ))
                    })?;
                    let current = pending
                        .iter()
                        .rev()
                        .find(|(pending_key, _)| *pending_key == key.as_str())
                        .map(|(_, value)| non_null(value.as_ref()))
                        .unwrap_or_else(|| element.attribute(key));
                    if current != non_null(from.as_ref()) {
                        return Err(EditorError::consistency(format!(
                            "attribute {} of {} at offset {} does not have the expected value",
                            key, element.kind, offset
                        )));
                    }
                    pending.push((key.as_str(), to));
                }
            }
        }

        if !pending.is_empty() {
            return Err(EditorError::construction(
                "attribute change at the end of the transaction",
            ));
        }

        validate(&out, self.schema()).map_err(|err| EditorError::structural(err.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::ElementData;
    use serde_json::json;

    fn paragraph(text: &str) -> Vec<Item> {
        let mut data = vec![Item::open("paragraph")];
        data.extend(Item::text(text));
        data.push(Item::close("paragraph"));
        data
    }

    #[test]
    fn test_commit_inserts_and_marks_applied() {
        let mut doc = Document::new(paragraph("ac")).unwrap();
        let mut tx = Transaction::new();
        tx.push_retain(2);
        tx.push_replace(vec![], Item::text("b"), None, None);
        tx.push_retain(2);

        let edits = doc.commit(&mut tx).unwrap();
        assert_eq!(doc.text(), "abc");
        assert_eq!(edits.len(), 1);
        assert!(tx.has_been_applied());
        assert!(doc.is_tree_consistent());
    }

    #[test]
    fn test_commit_twice_rejected() {
        let mut doc = Document::new(paragraph("a")).unwrap();
        let mut tx = Transaction::new();
        tx.push_retain(3);

        doc.commit(&mut tx).unwrap();
        assert!(matches!(
            doc.commit(&mut tx),
            Err(EditorError::Construction(_))
        ));

        // a clone is a fresh transaction
        let mut again = tx.clone();
        assert!(doc.commit(&mut again).is_ok());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut doc = Document::new(paragraph("abc")).unwrap();
        let mut tx = Transaction::new();
        tx.push_retain(4);

        assert!(matches!(
            doc.commit(&mut tx),
            Err(EditorError::Construction(_))
        ));
        assert_eq!(doc.text(), "abc");
    }

    #[test]
    fn test_removal_mismatch_rejected() {
        let mut doc = Document::new(paragraph("abc")).unwrap();
        let mut tx = Transaction::new();
        tx.push_retain(1);
        tx.push_replace(Item::text("x"), vec![], None, None);
        tx.push_retain(3);

        assert!(matches!(
            doc.commit(&mut tx),
            Err(EditorError::Consistency(_))
        ));
    }

    #[test]
    fn test_unbalanced_result_rejected_without_mutation() {
        let mut doc = Document::new(paragraph("abc")).unwrap();
        let before = doc.tree().signature();
        let mut tx = Transaction::new();
        tx.push_retain(2);
        tx.push_replace(vec![], vec![Item::close("paragraph")], None, None);
        tx.push_retain(3);

        assert!(matches!(
            doc.commit(&mut tx),
            Err(EditorError::StructuralValidity(_))
        ));
        assert_eq!(doc.tree().signature(), before);
        assert!(!tx.has_been_applied());
    }

    #[test]
    fn test_null_attribute_values_survive_the_wire() {
        let mut heading = ElementData::new("heading");
        heading.attributes.insert("level".to_string(), Value::Null);
        let mut data = vec![Item::Open(heading)];
        data.extend(Item::text("a"));
        data.push(Item::close("heading"));
        let base = Document::new(data).unwrap();

        let tx = Transaction::from_operations(
            vec![
                Operation::Attribute {
                    key: "level".to_string(),
                    from: Some(Value::Null),
                    to: Some(json!(2)),
                },
                Operation::retain(3),
            ],
            None,
        );

        let mut local = base.clone();
        local.commit(&mut tx.clone()).unwrap();

        let wire = serde_json::to_string(&tx).unwrap();
        let mut back: Transaction = serde_json::from_str(&wire).unwrap();
        let mut remote = base.clone();
        remote.commit(&mut back).unwrap();
        assert_eq!(remote.data(), local.data());
        assert_eq!(
            remote.data()[0].element().unwrap().attribute("level"),
            Some(&json!(2))
        );

        let mut clear = Transaction::new();
        clear.push_attribute("level", Some(json!(2)), Some(Value::Null));
        clear.push_retain(3);
        let wire = serde_json::to_value(&clear).unwrap();
        assert_eq!(
            wire,
            json!({"o": [{"type": "attribute", "key": "level", "from": 2}, 3]})
        );
        let mut back: Transaction = serde_json::from_value(wire).unwrap();
        remote.commit(&mut back).unwrap();
        assert_eq!(remote.data()[0], Item::open("heading"));
        assert!(remote.is_tree_consistent());
    }

    #[test]
    fn test_attribute_commit() {
        let heading = ElementData::new("heading").with_attribute("level", json!(1));
        let mut doc = Document::new(Item::leaf(heading)).unwrap();

        let mut tx = Transaction::new();
        tx.push_attribute("level", Some(json!(1)), Some(json!(2)));
        tx.push_attribute("id", None, Some(json!("intro")));
        tx.push_retain(2);
        doc.commit(&mut tx).unwrap();

        let element = doc.data()[0].element().unwrap();
        assert_eq!(element.attribute("level"), Some(&json!(2)));
        assert_eq!(element.attribute("id"), Some(&json!("intro")));
        assert!(doc.is_tree_consistent());

        let mut undo = tx.reversed();
        doc.commit(&mut undo).unwrap();
        let element = doc.data()[0].element().unwrap();
        assert_eq!(element.attribute("level"), Some(&json!(1)));
        assert_eq!(element.attribute("id"), None);
    }

    #[test]
    fn test_chained_attribute_changes_on_one_key() {
        let mut doc = Document::new(Item::leaf(ElementData::new("heading"))).unwrap();
        let tx = Transaction::from_operations(
            vec![
                Operation::attribute("level", None, Some(json!(1))),
                Operation::attribute("level", Some(json!(1)), Some(json!(2))),
                Operation::retain(2),
            ],
            None,
        );

        let data = doc.preview(&tx).unwrap();
        assert_eq!(data[0].element().unwrap().attribute("level"), Some(&json!(2)));
        let mut tx = tx;
        doc.commit(&mut tx).unwrap();
        assert!(doc.is_tree_consistent());
    }
}
