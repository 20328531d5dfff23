//! Tests for sequences of edits on one document
//!
//! This tests:
//! - Builder output committed in sequence, then undone
//! - Tree edits emitted for structural changes
//! - Tree integrity after every commit
//! - Wire form of committed transactions

use folio_editor::{
    squash, AnnotationMethod, DocumentExt, Operation, Transaction, TransactionBuilder, TreeEdit,
    UndoStack,
};
use folio_model::{Document, ElementData, Item, Range};
use serde_json::json;

fn paragraph(text: &str) -> Vec<Item> {
    let mut data = vec![Item::open("paragraph")];
    data.extend(Item::text(text));
    data.push(Item::close("paragraph"));
    data
}

fn document(paragraphs: &[&str]) -> Document {
    Document::new(paragraphs.iter().flat_map(|text| paragraph(text)).collect()).unwrap()
}

fn commit(doc: &mut Document, tx: &Transaction) -> Vec<TreeEdit> {
    let edits = doc.commit(&mut tx.clone()).unwrap();
    assert!(doc.is_tree_consistent(), "tree diverged from linear data");
    edits
}

#[test]
fn test_builder_sequence_round_trips() {
    let mut doc = document(&["hello", "world"]);
    let original = doc.data().to_vec();
    let mut history = Vec::new();

    let tx = TransactionBuilder::insertion(&doc, 6, Item::text("!")).unwrap();
    commit(&mut doc, &tx);
    history.push(tx);

    let tx = TransactionBuilder::removal(&doc, Range::new(5, 10), false).unwrap();
    commit(&mut doc, &tx);
    history.push(tx);

    let tx = TransactionBuilder::content_branch_conversion(
        &doc,
        Range::collapsed(2),
        ElementData::new("heading").with_attribute("level", json!(1)),
    )
    .unwrap();
    commit(&mut doc, &tx);
    history.push(tx);

    assert_eq!(doc.text(), "hellorld");
    assert_eq!(doc.tree().signature(), r#"heading{"level":1}(#8)"#);

    for tx in history.iter().rev() {
        commit(&mut doc, &tx.reversed());
    }
    assert_eq!(doc.data(), &original[..]);
}

#[test]
fn test_split_keeps_tail_identity() {
    let mut doc = document(&["abcd"]);
    let tx = TransactionBuilder::insertion(&doc, 3, paragraph("x")).unwrap();
    let edits = commit(&mut doc, &tx);

    assert_eq!(doc.tree().signature(), "paragraph(#2)paragraph(#1)paragraph(#2)");
    assert!(edits
        .iter()
        .any(|edit| matches!(edit, TreeEdit::MoveText { length: 2, .. })));
    assert!(!edits
        .iter()
        .any(|edit| matches!(edit, TreeEdit::RemoveText { .. })));
}

#[test]
fn test_structural_removal_relocates_comment() {
    let mut data = paragraph("ab");
    data.extend(Item::leaf(ElementData::new("comment")));
    data.extend(paragraph("cd"));
    let mut doc = Document::new(data).unwrap();

    let tx = TransactionBuilder::removal(&doc, Range::new(2, 8), false).unwrap();
    let edits = commit(&mut doc, &tx);

    assert_eq!(doc.tree().signature(), "paragraph(#1comment()#1)");
    assert!(edits
        .iter()
        .any(|edit| matches!(edit, TreeEdit::MoveNode { .. })));
    assert!(!edits
        .iter()
        .any(|edit| matches!(edit, TreeEdit::InsertNode { .. })));
}

#[test]
fn test_removal_with_metadata_drops_comment() {
    let mut data = paragraph("ab");
    data.extend(Item::leaf(ElementData::new("comment")));
    data.extend(paragraph("cd"));
    let mut doc = Document::new(data).unwrap();

    let tx = TransactionBuilder::removal(&doc, Range::new(2, 8), true).unwrap();
    commit(&mut doc, &tx);
    assert_eq!(doc.tree().signature(), "paragraph(#2)");
}

#[test]
fn test_annotation_then_text_edit() {
    let mut doc = document(&["bold"]);
    let hash = doc.store_mut().insert(json!({"type": "textStyle/bold"}));

    let tx = TransactionBuilder::annotation(&doc, Range::new(1, 5), AnnotationMethod::Set, &hash)
        .unwrap();
    let edits = commit(&mut doc, &tx);
    assert!(edits.is_empty(), "annotations are not part of the tree");
    assert!(doc.data()[1..5]
        .iter()
        .all(|item| item.annotations() == [hash.clone()]));

    let tx = TransactionBuilder::insertion(&doc, 5, Item::text("er")).unwrap();
    commit(&mut doc, &tx);
    assert_eq!(doc.text(), "bolder");
}

#[test]
fn test_undo_stack_batches_builder_edits() {
    let mut doc = document(&["list item"]);
    let mut stack = UndoStack::new();

    stack.begin_batch();
    let tx = TransactionBuilder::wrap(&doc, Range::new(0, 11), &[ElementData::new("listItem")])
        .unwrap();
    stack.commit(tx, &mut doc).unwrap();
    let tx = TransactionBuilder::wrap(&doc, Range::new(0, 13), &[ElementData::new("list")])
        .unwrap();
    stack.commit(tx, &mut doc).unwrap();
    stack.end_batch().unwrap();

    assert_eq!(doc.tree().signature(), "list(listItem(paragraph(#9)))");
    assert_eq!(stack.undo_levels(), 1);

    stack.undo(&mut doc).unwrap();
    assert_eq!(doc.tree().signature(), "paragraph(#9)");
    assert!(doc.is_tree_consistent());

    stack.redo(&mut doc).unwrap();
    assert_eq!(doc.tree().signature(), "list(listItem(paragraph(#9)))");
}

#[test]
fn test_modified_range_skips_reserved_region() {
    let mut data = paragraph("ab");
    data.push(Item::open("internalList"));
    data.push(Item::open("internalItem"));
    data.extend(paragraph("n"));
    data.push(Item::close("internalItem"));
    data.push(Item::close("internalList"));
    let doc = Document::new(data).unwrap();
    assert_eq!(doc.reserved_start(), Some(4));

    let inner = TransactionBuilder::insertion(&doc, 7, Item::text("x")).unwrap();
    assert_eq!(inner.modified_range(&doc, false), None);
    assert_eq!(inner.modified_range(&doc, true), Some(Range::new(7, 8)));

    let outer = TransactionBuilder::insertion(&doc, 1, Item::text("x")).unwrap();
    assert_eq!(outer.modified_range(&doc, false), Some(Range::new(1, 2)));
}

#[test]
fn test_committed_sequence_squashes_and_serializes() {
    let mut doc = document(&["ab"]);
    let base = doc.clone();
    let mut history = Vec::new();
    for (offset, text) in [(2, "x"), (3, "y"), (1, "z")] {
        let tx = TransactionBuilder::insertion(&doc, offset, Item::text(text)).unwrap();
        commit(&mut doc, &tx);
        history.push(tx);
    }

    let squashed = squash(&history).unwrap();
    assert_eq!(
        squashed.operations(),
        &[
            Operation::retain(1),
            Operation::replace(vec![], Item::text("z")),
            Operation::retain(1),
            Operation::replace(vec![], Item::text("xy")),
            Operation::retain(2),
        ]
    );

    let json = serde_json::to_value(&squashed).unwrap();
    assert_eq!(json, json!({"o": [1, ["", "z"], 1, ["", "xy"], 2]}));

    let mut replay = base;
    let parsed: Transaction = serde_json::from_value(json).unwrap();
    commit(&mut replay, &parsed);
    assert_eq!(replay.data(), doc.data());
}

#[test]
fn test_repeated_edits_reuse_tree_slots() {
    let mut doc = document(&["ab", "cd"]);
    let block = {
        let mut items = vec![Item::open("list"), Item::open("listItem")];
        items.extend(paragraph("item"));
        items.push(Item::close("listItem"));
        items.push(Item::close("list"));
        items
    };

    let mut peak = 0;
    for _ in 0..500 {
        let tx = TransactionBuilder::insertion(&doc, 4, block.clone()).unwrap();
        commit(&mut doc, &tx);
        let tx = TransactionBuilder::insertion(&doc, 2, Item::text("x")).unwrap();
        commit(&mut doc, &tx);
        let tx = TransactionBuilder::removal(&doc, Range::new(2, 3), false).unwrap();
        commit(&mut doc, &tx);
        let tx = TransactionBuilder::removal(&doc, Range::new(4, 4 + block.len()), false).unwrap();
        commit(&mut doc, &tx);
        peak = peak.max(doc.tree().slot_count());
    }

    assert_eq!(doc.tree().signature(), "paragraph(#2)paragraph(#2)");
    assert_eq!(doc.tree().node_count(), 5);
    assert!(peak < 20, "arena grew to {} slots", peak);
}
