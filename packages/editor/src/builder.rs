//! # Transaction builders
//!
//! Intent-level constructors. Each returns a transaction that is valid
//! against the document it was built from; structure is added or kept so
//! the result is always a valid tree.
//!
//! | builder                      | intent                                   |
//! |------------------------------|------------------------------------------|
//! | `insertion`                  | insert data, splitting or wrapping it    |
//! | `removal`                    | remove a range, merging when possible    |
//! | `annotation`                 | set/clear an annotation on characters    |
//! | `attribute_changes`          | change attributes of one element         |
//! | `wrap` / `unwrap`            | add or remove enclosing elements         |
//! | `content_branch_conversion`  | retype content branches                  |

use crate::errors::{EditorError, EditorResult};
use crate::transaction::Transaction;
use folio_model::{validate, Document, ElementData, Item, ModelError, NodeId, Range, Tree};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationMethod {
    Set,
    Clear,
}

/// Builds a transaction left to right over a document
pub struct TransactionBuilder<'a> {
    doc: &'a Document,
    tx: Transaction,
    offset: usize,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            tx: Transaction::new(),
            offset: 0,
        }
    }

    /// Offset reached so far in the document
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn retain_to(&mut self, target: usize) -> EditorResult<()> {
        if target < self.offset || target > self.doc.len() {
            return Err(EditorError::construction(format!(
                "cannot retain from {} to {} in a document of length {}",
                self.offset,
                target,
                self.doc.len()
            )));
        }
        self.tx.push_retain(target - self.offset);
        self.offset = target;
        Ok(())
    }

    /// Remove `length` items at the current offset and insert `insert`
    pub fn replace(&mut self, length: usize, insert: Vec<Item>) -> EditorResult<()> {
        self.replace_hinted(length, insert, None, None)
    }

    fn replace_hinted(
        &mut self,
        length: usize,
        insert: Vec<Item>,
        inserted_data_offset: Option<usize>,
        inserted_data_length: Option<usize>,
    ) -> EditorResult<()> {
        let end = self.offset + length;
        if end > self.doc.len() {
            return Err(EditorError::Model(ModelError::OutOfRange {
                offset: end,
                length: self.doc.len(),
            }));
        }
        let remove = self.doc.data()[self.offset..end].to_vec();
        self.tx
            .push_replace(remove, insert, inserted_data_offset, inserted_data_length);
        self.offset = end;
        Ok(())
    }

    pub fn attribute(&mut self, key: &str, from: Option<Value>, to: Option<Value>) {
        self.tx.push_attribute(key, from, to);
    }

    /// Retain the rest of the document and return the transaction
    pub fn finish(mut self) -> Transaction {
        let remaining = self.doc.len() - self.offset;
        self.tx.push_retain(remaining);
        self.tx
    }

    /// Insert `data` at `offset`. Block content inside a content branch
    /// splits the branch around it; inline content outside one is wrapped in
    /// a paragraph.
    pub fn insertion(doc: &Document, offset: usize, data: Vec<Item>) -> EditorResult<Transaction> {
        check_offset(doc, offset)?;
        let mut builder = TransactionBuilder::new(doc);
        builder.retain_to(offset)?;
        if data.is_empty() {
            return Ok(builder.finish());
        }
        if fits(doc, offset, 0, &data) {
            builder.replace(0, data)?;
            return Ok(builder.finish());
        }

        let length = data.len();
        let tree = doc.tree();
        let node = tree.node_at_offset(offset);
        let in_content = node != tree.root()
            && tree
                .element(node)
                .and_then(|element| doc.schema().get(&element.kind))
                .map(|node_type| node_type.content)
                .unwrap_or(false);

        let wrapped = match tree.element(node) {
            Some(element) if in_content => {
                let mut insert = vec![Item::close(element.kind.clone())];
                insert.extend(data);
                insert.push(Item::Open(element.clone()));
                insert
            }
            _ => {
                let mut insert = vec![Item::open("paragraph")];
                insert.extend(data);
                insert.push(Item::close("paragraph"));
                insert
            }
        };

        if !fits(doc, offset, 0, &wrapped) {
            return Err(EditorError::structural(format!(
                "data cannot be inserted at offset {}",
                offset
            )));
        }
        debug!(offset, length, "Insertion needed extra structure");
        builder.replace_hinted(0, wrapped, Some(1), Some(length))?;
        Ok(builder.finish())
    }

    /// Remove `range`. When the unmatched close and open markers of the
    /// range pair up by type, the range is removed as-is and the branches on
    /// either side merge. Otherwise only covered nodes and text go.
    /// Metadata leaves inside the removed content are re-inserted at the
    /// removal point unless `remove_metadata` is set.
    pub fn removal(doc: &Document, range: Range, remove_metadata: bool) -> EditorResult<Transaction> {
        let (start, end) = (range.start(), range.end());
        check_offset(doc, end)?;
        let mut builder = TransactionBuilder::new(doc);
        if start == end {
            return Ok(builder.finish());
        }

        let slice = &doc.data()[start..end];
        let metadata = if remove_metadata {
            Vec::new()
        } else {
            metadata_leaves(doc, slice)
        };
        if metadata.len() == slice.len() {
            return Ok(builder.finish());
        }

        let (closes, opens) = unmatched_markers(slice);
        let pairs_up = closes.len() == opens.len()
            && closes
                .iter()
                .zip(opens.iter().rev())
                .all(|(close, open)| close == open);
        if pairs_up && fits(doc, start, end - start, &metadata) {
            builder.retain_to(start)?;
            builder.replace(end - start, metadata)?;
            return Ok(builder.finish());
        }

        debug!(start, end, "Range does not merge, removing covered content only");
        for piece in covered_pieces(doc, start, end, remove_metadata) {
            builder.retain_to(piece.start)?;
            builder.replace(piece.end - piece.start, piece.keep)?;
        }
        Ok(builder.finish())
    }

    /// Set or clear annotation `hash` on every character of `range`
    pub fn annotation(
        doc: &Document,
        range: Range,
        method: AnnotationMethod,
        hash: &str,
    ) -> EditorResult<Transaction> {
        check_offset(doc, range.end())?;
        let mut builder = TransactionBuilder::new(doc);
        let mut run: Vec<Item> = Vec::new();

        for offset in range.start()..range.end() {
            let changed = match &doc.data()[offset] {
                Item::Char { ch, annotations } => {
                    let has = annotations.iter().any(|a| a == hash);
                    match (method, has) {
                        (AnnotationMethod::Set, false) => {
                            let mut annotations = annotations.clone();
                            annotations.push(hash.to_string());
                            Some(Item::Char { ch: *ch, annotations })
                        }
                        (AnnotationMethod::Clear, true) => Some(Item::Char {
                            ch: *ch,
                            annotations: annotations.iter().filter(|a| *a != hash).cloned().collect(),
                        }),
                        _ => None,
                    }
                }
                _ => None,
            };

            match changed {
                Some(item) => {
                    if run.is_empty() {
                        builder.retain_to(offset)?;
                    }
                    run.push(item);
                }
                None if !run.is_empty() => {
                    let length = run.len();
                    builder.replace(length, std::mem::take(&mut run))?;
                }
                None => {}
            }
        }
        if !run.is_empty() {
            let length = run.len();
            builder.replace(length, run)?;
        }
        Ok(builder.finish())
    }

    /// Change attributes of the element at `offset`. Keys mapped to `None`
    /// are removed; keys already holding the target value are skipped.
    pub fn attribute_changes(
        doc: &Document,
        offset: usize,
        changes: &BTreeMap<String, Option<Value>>,
    ) -> EditorResult<Transaction> {
        let element = doc
            .item(offset)?
            .element()
            .ok_or(ModelError::NotAnElement(offset))?;
        let mut builder = TransactionBuilder::new(doc);
        builder.retain_to(offset)?;
        for (key, to) in changes {
            let from = element.attribute(key).cloned();
            if from != *to {
                builder.attribute(key, from, to.clone());
            }
        }
        Ok(builder.finish())
    }

    /// Wrap the whole sibling nodes in `range` in `wrappers`, outermost first
    pub fn wrap(doc: &Document, range: Range, wrappers: &[ElementData]) -> EditorResult<Transaction> {
        let (start, end) = (range.start(), range.end());
        check_offset(doc, end)?;
        let slice = &doc.data()[start..end];
        let (closes, opens) = unmatched_markers(slice);
        if slice.is_empty() || !closes.is_empty() || !opens.is_empty() {
            return Err(EditorError::construction(format!(
                "range {}..{} does not cover whole sibling nodes",
                start, end
            )));
        }

        let open_items: Vec<Item> = wrappers.iter().cloned().map(Item::Open).collect();
        let close_items: Vec<Item> = wrappers
            .iter()
            .rev()
            .map(|wrapper| Item::close(wrapper.kind.clone()))
            .collect();

        let data = doc.data();
        let mut candidate = data[..start].to_vec();
        candidate.extend(open_items.iter().cloned());
        candidate.extend_from_slice(slice);
        candidate.extend(close_items.iter().cloned());
        candidate.extend_from_slice(&data[end..]);
        validate(&candidate, doc.schema()).map_err(|err| EditorError::structural(err.to_string()))?;

        let mut builder = TransactionBuilder::new(doc);
        builder.retain_to(start)?;
        builder.replace(0, open_items)?;
        builder.retain_to(end)?;
        builder.replace(0, close_items)?;
        Ok(builder.finish())
    }

    /// Remove the element whose open marker is at `offset`, keeping its
    /// content in place
    pub fn unwrap(doc: &Document, offset: usize) -> EditorResult<Transaction> {
        let data = doc.data();
        if !doc.item(offset)?.is_open() {
            return Err(ModelError::NotAnElement(offset).into());
        }
        let close = matching_close(data, offset).ok_or_else(|| {
            EditorError::structural(format!("element at offset {} is never closed", offset))
        })?;

        let mut candidate = data[..offset].to_vec();
        candidate.extend_from_slice(&data[offset + 1..close]);
        candidate.extend_from_slice(&data[close + 1..]);
        validate(&candidate, doc.schema()).map_err(|err| EditorError::structural(err.to_string()))?;

        let mut builder = TransactionBuilder::new(doc);
        builder.retain_to(offset)?;
        builder.replace(1, vec![])?;
        builder.retain_to(close)?;
        builder.replace(1, vec![])?;
        Ok(builder.finish())
    }

    /// Retype every content branch touching `range` to `element`
    pub fn content_branch_conversion(
        doc: &Document,
        range: Range,
        element: ElementData,
    ) -> EditorResult<Transaction> {
        check_offset(doc, range.end())?;
        if !doc.schema().node_type(&element.kind)?.content {
            return Err(EditorError::structural(format!(
                "{} is not a content branch",
                element.kind
            )));
        }

        let (start, end) = (range.start(), range.end());
        let mut targets: Vec<(usize, usize)> = Vec::new();
        walk(doc.tree(), &mut |node, outer_start| {
            let tree = doc.tree();
            if tree.is_text(node) {
                return false;
            }
            let inner_end = outer_start + 1 + tree.length(node);
            let is_content = tree
                .element(node)
                .and_then(|e| doc.schema().get(&e.kind))
                .map(|t| t.content)
                .unwrap_or(false);
            if is_content {
                let touches = outer_start + 1 <= end && start <= inner_end;
                let differs = tree.element(node) != Some(&element);
                if touches && differs {
                    targets.push((outer_start, inner_end));
                }
                return false;
            }
            true
        });

        let mut builder = TransactionBuilder::new(doc);
        for (open, close) in targets {
            builder.retain_to(open)?;
            builder.replace(1, vec![Item::Open(element.clone())])?;
            builder.retain_to(close)?;
            builder.replace(1, vec![Item::close(element.kind.clone())])?;
        }
        Ok(builder.finish())
    }
}

fn check_offset(doc: &Document, offset: usize) -> EditorResult<()> {
    if offset > doc.len() {
        return Err(ModelError::OutOfRange {
            offset,
            length: doc.len(),
        }
        .into());
    }
    Ok(())
}

/// Would replacing `remove_len` items at `offset` with `insert` leave a
/// valid document?
fn fits(doc: &Document, offset: usize, remove_len: usize, insert: &[Item]) -> bool {
    let data = doc.data();
    let mut candidate = Vec::with_capacity(data.len() + insert.len());
    candidate.extend_from_slice(&data[..offset]);
    candidate.extend_from_slice(insert);
    candidate.extend_from_slice(&data[offset + remove_len..]);
    validate(&candidate, doc.schema()).is_ok()
}

/// Close markers without an open (innermost first) and open markers without
/// a close (outermost first), as element types
fn unmatched_markers(slice: &[Item]) -> (Vec<String>, Vec<String>) {
    let mut closes = Vec::new();
    let mut opens: Vec<String> = Vec::new();
    for item in slice {
        match item {
            Item::Open(element) => opens.push(element.kind.clone()),
            Item::Close { kind } => {
                if opens.pop().is_none() {
                    closes.push(kind.clone());
                }
            }
            Item::Char { .. } => {}
        }
    }
    (closes, opens)
}

/// Metadata leaves (open and close marker pairs) found in `slice`
fn metadata_leaves(doc: &Document, slice: &[Item]) -> Vec<Item> {
    let mut leaves = Vec::new();
    for pair in slice.windows(2) {
        if let [Item::Open(element), close @ Item::Close { kind }] = pair {
            let is_meta = doc
                .schema()
                .get(&element.kind)
                .map(|t| t.meta)
                .unwrap_or(false);
            if is_meta && *kind == element.kind {
                leaves.push(Item::Open(element.clone()));
                leaves.push(close.clone());
            }
        }
    }
    leaves
}

fn matching_close(data: &[Item], open: usize) -> Option<usize> {
    let mut depth = 0isize;
    for (index, item) in data.iter().enumerate().skip(open) {
        depth += item.depth_delta();
        if depth == 0 {
            return Some(index);
        }
    }
    None
}

/// Visit nodes in document order with the linear offset of their first item.
/// The visitor returns whether to descend.
fn walk(tree: &Tree, visit: &mut impl FnMut(NodeId, usize) -> bool) {
    let mut stack: Vec<(NodeId, usize)> = Vec::new();
    let root = tree.root();
    let mut offset = 0;
    for &child in tree.children(root) {
        stack.push((child, offset));
        offset += tree.outer_length(child);
    }
    stack.reverse();

    while let Some((node, start)) = stack.pop() {
        if !visit(node, start) {
            continue;
        }
        let mut offset = start + 1;
        let mut children = Vec::new();
        for &child in tree.children(node) {
            children.push((child, offset));
            offset += tree.outer_length(child);
        }
        stack.extend(children.into_iter().rev());
    }
}

struct Piece {
    start: usize,
    end: usize,
    /// Metadata to put back where the piece was
    keep: Vec<Item>,
}

/// Nodes and text runs fully inside `start..end`, merged where adjacent
fn covered_pieces(doc: &Document, start: usize, end: usize, remove_metadata: bool) -> Vec<Piece> {
    let tree = doc.tree();
    let is_meta = |node: NodeId| {
        tree.element(node)
            .and_then(|e| doc.schema().get(&e.kind))
            .map(|t| t.meta)
            .unwrap_or(false)
    };

    let mut pieces: Vec<Piece> = Vec::new();
    walk(tree, &mut |node, node_start| {
        let node_end = node_start + tree.outer_length(node);
        if node_end <= start || node_start >= end {
            return false;
        }
        let (piece_start, piece_end) = if start <= node_start && node_end <= end {
            if is_meta(node) && !remove_metadata {
                return false;
            }
            (node_start, node_end)
        } else if tree.is_text(node) {
            (node_start.max(start), node_end.min(end))
        } else {
            return true;
        };

        let keep = if remove_metadata {
            Vec::new()
        } else {
            metadata_leaves(doc, &doc.data()[piece_start..piece_end])
        };
        match pieces.last_mut() {
            Some(last) if last.end == piece_start => {
                last.end = piece_end;
                last.keep.extend(keep);
            }
            _ => pieces.push(Piece {
                start: piece_start,
                end: piece_end,
                keep,
            }),
        }
        false
    });
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::DocumentExt;
    use serde_json::json;

    fn paragraph(text: &str) -> Vec<Item> {
        let mut data = vec![Item::open("paragraph")];
        data.extend(Item::text(text));
        data.push(Item::close("paragraph"));
        data
    }

    fn commit(doc: &mut Document, mut tx: Transaction) {
        doc.commit(&mut tx).unwrap();
        assert!(doc.is_tree_consistent());
    }

    #[test]
    fn test_plain_insertion() {
        let mut doc = Document::new(paragraph("ad")).unwrap();
        let tx = TransactionBuilder::insertion(&doc, 2, Item::text("bc")).unwrap();
        commit(&mut doc, tx);
        assert_eq!(doc.text(), "abcd");
    }

    #[test]
    fn test_block_insertion_splits_paragraph() {
        let mut doc = Document::new(paragraph("abcd")).unwrap();
        let tx = TransactionBuilder::insertion(&doc, 3, paragraph("x")).unwrap();

        assert!(matches!(
            &tx.operations()[1],
            crate::Operation::Replace {
                inserted_data_offset: Some(1),
                inserted_data_length: Some(3),
                ..
            }
        ));
        commit(&mut doc, tx);
        assert_eq!(doc.tree().signature(), "paragraph(#2)paragraph(#1)paragraph(#2)");
    }

    #[test]
    fn test_text_at_root_is_wrapped() {
        let mut doc = Document::new(paragraph("a")).unwrap();
        let tx = TransactionBuilder::insertion(&doc, 3, Item::text("b")).unwrap();
        commit(&mut doc, tx);
        assert_eq!(doc.tree().signature(), "paragraph(#1)paragraph(#1)");
    }

    #[test]
    fn test_insertion_out_of_range() {
        let doc = Document::new(paragraph("a")).unwrap();
        assert!(matches!(
            TransactionBuilder::insertion(&doc, 9, Item::text("b")),
            Err(EditorError::Model(ModelError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_removal_merges_paragraphs() {
        let mut data = paragraph("ab");
        data.extend(paragraph("cd"));
        let mut doc = Document::new(data).unwrap();

        let tx = TransactionBuilder::removal(&doc, Range::new(2, 6), false).unwrap();
        commit(&mut doc, tx);
        assert_eq!(doc.tree().signature(), "paragraph(#2)");
        assert_eq!(doc.text(), "ad");
    }

    #[test]
    fn test_removal_across_mismatched_types_is_piecewise() {
        let mut data = paragraph("ab");
        data.push(Item::open("heading"));
        data.extend(Item::text("cd"));
        data.push(Item::close("heading"));
        let mut doc = Document::new(data).unwrap();

        let tx = TransactionBuilder::removal(&doc, Range::new(2, 6), false).unwrap();
        commit(&mut doc, tx);
        assert_eq!(doc.tree().signature(), "paragraph(#1)heading(#1)");
        assert_eq!(doc.text(), "ad");
    }

    #[test]
    fn test_removal_keeps_metadata() {
        let mut data = paragraph("ab");
        data.extend(Item::leaf(ElementData::new("comment")));
        data.extend(paragraph("cd"));
        let mut doc = Document::new(data).unwrap();

        let tx = TransactionBuilder::removal(&doc, Range::new(2, 8), false).unwrap();
        commit(&mut doc, tx);
        assert_eq!(doc.tree().signature(), "paragraph(#1comment()#1)");
        assert_eq!(doc.text(), "ad");
    }

    #[test]
    fn test_removal_of_metadata_only_range() {
        let mut data = paragraph("a");
        data.extend(Item::leaf(ElementData::new("comment")));
        let doc = Document::new(data).unwrap();

        let kept = TransactionBuilder::removal(&doc, Range::new(3, 5), false).unwrap();
        assert!(kept.is_no_op());

        let removed = TransactionBuilder::removal(&doc, Range::new(3, 5), true).unwrap();
        assert!(!removed.is_no_op());
    }

    #[test]
    fn test_annotation_set_and_clear() {
        let mut doc = Document::new(paragraph("abc")).unwrap();
        let hash = doc.store_mut().insert(json!({"type": "textStyle/bold"}));

        let tx = TransactionBuilder::annotation(&doc, Range::new(0, 3), AnnotationMethod::Set, &hash)
            .unwrap();
        assert_eq!(tx.operations().len(), 3);
        commit(&mut doc, tx);
        assert_eq!(doc.data()[1].annotations(), &[hash.clone()]);
        assert_eq!(doc.data()[3].annotations(), &[] as &[String]);

        let tx = TransactionBuilder::annotation(&doc, Range::new(0, 5), AnnotationMethod::Clear, &hash)
            .unwrap();
        commit(&mut doc, tx);
        assert!(doc.data().iter().all(|item| item.annotations().is_empty()));
    }

    #[test]
    fn test_attribute_changes_skip_unchanged_keys() {
        let heading = ElementData::new("heading").with_attribute("level", json!(1));
        let mut doc = Document::new(Item::leaf(heading)).unwrap();

        let mut changes = BTreeMap::new();
        changes.insert("level".to_string(), Some(json!(1)));
        changes.insert("id".to_string(), Some(json!("top")));
        let tx = TransactionBuilder::attribute_changes(&doc, 0, &changes).unwrap();
        assert_eq!(tx.operations().len(), 2);

        commit(&mut doc, tx);
        assert_eq!(doc.data()[0].element().unwrap().attribute("id"), Some(&json!("top")));

        assert!(matches!(
            TransactionBuilder::attribute_changes(&doc, 1, &changes),
            Err(EditorError::Model(ModelError::NotAnElement(1)))
        ));
    }

    #[test]
    fn test_wrap_and_unwrap() {
        let mut data = paragraph("a");
        data.extend(paragraph("b"));
        let mut doc = Document::new(data).unwrap();

        let tx = TransactionBuilder::wrap(&doc, Range::new(0, 6), &[ElementData::new("blockquote")])
            .unwrap();
        commit(&mut doc, tx);
        assert_eq!(doc.tree().signature(), "blockquote(paragraph(#1)paragraph(#1))");

        let tx = TransactionBuilder::unwrap(&doc, 0).unwrap();
        commit(&mut doc, tx);
        assert_eq!(doc.tree().signature(), "paragraph(#1)paragraph(#1)");
    }

    #[test]
    fn test_wrap_requires_whole_nodes() {
        let doc = Document::new(paragraph("ab")).unwrap();
        assert!(matches!(
            TransactionBuilder::wrap(&doc, Range::new(0, 2), &[ElementData::new("div")]),
            Err(EditorError::Construction(_))
        ));
    }

    #[test]
    fn test_unwrap_content_branch_rejected() {
        let doc = Document::new(paragraph("ab")).unwrap();
        assert!(matches!(
            TransactionBuilder::unwrap(&doc, 0),
            Err(EditorError::StructuralValidity(_))
        ));
    }

    #[test]
    fn test_content_branch_conversion() {
        let mut data = paragraph("ab");
        data.extend(paragraph("cd"));
        data.extend(paragraph("ef"));
        let mut doc = Document::new(data).unwrap();

        let heading = ElementData::new("heading").with_attribute("level", json!(2));
        let tx = TransactionBuilder::content_branch_conversion(&doc, Range::new(2, 6), heading)
            .unwrap();
        commit(&mut doc, tx);
        assert_eq!(
            doc.tree().signature(),
            r#"heading{"level":2}(#2)heading{"level":2}(#2)paragraph(#2)"#
        );

        let tx = TransactionBuilder::content_branch_conversion(
            &doc,
            Range::collapsed(1),
            ElementData::new("list"),
        );
        assert!(matches!(tx, Err(EditorError::StructuralValidity(_))));
    }
}
