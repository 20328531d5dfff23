//! # Selections
//!
//! A selection is either nothing or a linear range. Changes carry one per
//! author, and every transaction the selection crosses moves it with
//! `translate_range_with_author`, so a caret stays on the author's side of
//! concurrent insertions at the same offset.

use crate::change::Change;
use crate::transaction::{AuthorId, Transaction};
use folio_model::Range;
use serde::{Deserialize, Serialize};

/// An author's selection, carried by changes so it survives rebasing
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Selection {
    #[default]
    Null,
    Linear { range: Range },
}

impl Selection {
    pub fn linear(range: Range) -> Self {
        Selection::Linear { range }
    }

    pub fn caret(offset: usize) -> Self {
        Selection::Linear {
            range: Range::collapsed(offset),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Selection::Null)
    }

    pub fn range(&self) -> Option<Range> {
        match self {
            Selection::Null => None,
            Selection::Linear { range } => Some(*range),
        }
    }

    /// Move the selection of `author` across `tx`
    pub fn translate_by_transaction(&self, tx: &Transaction, author: Option<AuthorId>) -> Selection {
        match self {
            Selection::Null => Selection::Null,
            Selection::Linear { range } => Selection::Linear {
                range: tx.translate_range_with_author(*range, author),
            },
        }
    }

    /// Move the selection of `author` across every transaction of `change`
    pub fn translate_by_change(&self, change: &Change, author: Option<AuthorId>) -> Selection {
        change
            .transactions()
            .iter()
            .fold(*self, |selection, tx| selection.translate_by_transaction(tx, author))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::Item;
    use serde_json::json;

    fn insertion(offset: usize, text: &str, length: usize, author: AuthorId) -> Transaction {
        let mut tx = Transaction::with_author(Some(author));
        tx.push_retain(offset);
        tx.push_replace(vec![], Item::text(text), None, None);
        tx.push_retain(length - offset);
        tx
    }

    #[test]
    fn test_serde_form() {
        let selection = Selection::linear(Range::new(1, 4));
        let value = serde_json::to_value(selection).unwrap();
        assert_eq!(value, json!({"type": "linear", "range": {"from": 1, "to": 4}}));
        assert_eq!(serde_json::to_value(Selection::Null).unwrap(), json!({"type": "null"}));
    }

    #[test]
    fn test_translate_by_transaction_uses_author_bias() {
        let tx = insertion(2, "xy", 5, 2);
        let caret = Selection::caret(2);

        assert_eq!(caret.translate_by_transaction(&tx, Some(1)), Selection::caret(2));
        assert_eq!(caret.translate_by_transaction(&tx, Some(3)), Selection::caret(4));
        assert_eq!(
            Selection::Null.translate_by_transaction(&tx, Some(3)),
            Selection::Null
        );
    }

    #[test]
    fn test_translate_by_change() {
        let change = Change::new(
            0,
            vec![insertion(0, "a", 5, 1), insertion(0, "b", 6, 1)],
            vec![],
            Default::default(),
        );
        let selection = Selection::linear(Range::new(1, 3));
        assert_eq!(
            selection.translate_by_change(&change, Some(2)),
            Selection::linear(Range::new(3, 5))
        );
    }
}
