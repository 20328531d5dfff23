//! # Tree Modifier
//!
//! Applies a transaction's linear operations to the cached node tree in place,
//! producing the edit script a view needs to mirror the change.
//!
//! ## Cursors
//!
//! Two cursors walk the pre-transaction tree together:
//!
//! ```text
//! remover   consumes the old tree: retained and removed items
//! inserter  marks where retained and inserted content ends up
//! ```
//!
//! Each cursor is a frame `(branch, next child)` plus a stack of frames to
//! return to. While both frames are equal the cursors are "in sync" and
//! retained content simply stays put. Removing a marker (an open marker to
//! unwrap, a close marker to merge) separates them: from then on retained
//! content is moved from the remover to the inserter, keeping node identity,
//! until a matching close brings them back together.
//!
//! Whole nodes covered by a removal are not detached immediately. They stay in
//! the tree as pending removals that both cursors skip, so that an identical
//! subtree inserted later in the same transaction can be moved rather than
//! recreated. Whatever is still pending at the end is removed.
//!
//! Frames are anchored on node ids. Whenever a node leaves its position every
//! frame pointing at it is re-anchored on its next sibling.

use crate::errors::{EditorError, EditorResult};
use crate::transaction::{Operation, Transaction};
use folio_model::{non_null, Item, NodeId, Tree};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

/// A position inside a branch, in linear units of its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreePosition {
    pub parent: NodeId,
    pub offset: usize,
}

/// One step of an edit script. Positions describe the tree as left by the
/// previous steps; a move's `to` is measured after the node left `from`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeEdit {
    InsertNode {
        at: TreePosition,
        node: NodeId,
    },
    RemoveNode {
        at: TreePosition,
        node: NodeId,
    },
    MoveNode {
        node: NodeId,
        from: TreePosition,
        to: TreePosition,
    },
    InsertText {
        at: TreePosition,
        text: String,
    },
    RemoveText {
        at: TreePosition,
        length: usize,
    },
    MoveText {
        from: TreePosition,
        to: TreePosition,
        length: usize,
    },
    ChangeAttribute {
        node: NodeId,
        key: String,
        from: Option<Value>,
        to: Option<Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frame {
    branch: NodeId,
    next: Option<NodeId>,
}

#[derive(Debug, Clone, Copy)]
struct RemoverLevel {
    /// Where the remover continues after leaving `node`
    frame: Frame,
    node: NodeId,
    /// The open marker of `node` was removed; the node goes when the remover
    /// leaves it
    open_removed: bool,
}

#[derive(Debug, Clone, Copy)]
struct InserterLevel {
    frame: Frame,
    node: NodeId,
}

#[derive(Debug)]
struct PendingRemoval {
    node: NodeId,
    items: Vec<Item>,
}

pub struct TreeModifier<'a> {
    tree: &'a mut Tree,
    remover: Frame,
    remover_stack: Vec<RemoverLevel>,
    inserter: Frame,
    inserter_stack: Vec<InserterLevel>,
    pending: Vec<PendingRemoval>,
    edits: Vec<TreeEdit>,
}

impl<'a> TreeModifier<'a> {
    fn new(tree: &'a mut Tree) -> Self {
        let root = tree.root();
        let start = Frame {
            branch: root,
            next: tree.first_child(root),
        };
        Self {
            tree,
            remover: start,
            remover_stack: Vec::new(),
            inserter: start,
            inserter_stack: Vec::new(),
            pending: Vec::new(),
            edits: Vec::new(),
        }
    }

    /// Walk `tx` over `tree`, editing it in place. The transaction must
    /// already have been validated against the linear data the tree mirrors.
    pub fn modify(tree: &'a mut Tree, tx: &Transaction) -> EditorResult<Vec<TreeEdit>> {
        let mut modifier = TreeModifier::new(tree);
        for op in tx.operations() {
            match op {
                Operation::Retain { length } => modifier.retain(*length)?,
                Operation::Replace { remove, .. } if op.is_annotation_only() => {
                    modifier.retain(remove.len())?
                }
                Operation::Replace { remove, insert, .. } => {
                    modifier.remove(remove)?;
                    modifier.insert(insert)?;
                }
                Operation::Attribute { key, from, to } => modifier.attribute(key, from, to)?,
            }
        }
        modifier.finish()
    }

    fn in_sync(&self) -> bool {
        self.remover == self.inserter
    }

    fn is_pending(&self, node: NodeId) -> bool {
        self.pending.iter().any(|p| p.node == node)
    }

    /// Skip pending removals
    fn settle(&self, mut next: Option<NodeId>) -> Option<NodeId> {
        while let Some(node) = next {
            if !self.is_pending(node) {
                break;
            }
            next = self.tree.next_sibling(node);
        }
        next
    }

    fn position(&self, frame: Frame) -> TreePosition {
        TreePosition {
            parent: frame.branch,
            offset: self.tree.content_offset(frame.branch, frame.next),
        }
    }

    fn position_of(&self, node: NodeId) -> EditorResult<TreePosition> {
        let parent = self
            .tree
            .parent(node)
            .ok_or_else(|| EditorError::structural(format!("{} is not attached", node)))?;
        Ok(TreePosition {
            parent,
            offset: self.tree.content_offset(parent, Some(node)),
        })
    }

    /// Point every frame that was about to visit `gone` at `replacement`
    fn reanchor(&mut self, gone: NodeId, replacement: Option<NodeId>) {
        let frames = std::iter::once(&mut self.remover)
            .chain(std::iter::once(&mut self.inserter))
            .chain(self.remover_stack.iter_mut().map(|level| &mut level.frame))
            .chain(self.inserter_stack.iter_mut().map(|level| &mut level.frame));
        for frame in frames {
            if frame.next == Some(gone) {
                frame.next = replacement;
            }
        }
    }

    /// Take `node` out of its position, keeping every frame valid
    fn lift(&mut self, node: NodeId) -> EditorResult<TreePosition> {
        let from = self.position_of(node)?;
        let replacement = self.settle(self.tree.next_sibling(node));
        self.reanchor(node, replacement);
        self.tree.detach(node)?;
        Ok(from)
    }

    /// Attach a detached node at the inserter
    fn place(&mut self, node: NodeId) -> EditorResult<TreePosition> {
        let at = self.position(self.inserter);
        self.tree
            .insert_before(self.inserter.branch, self.inserter.next, node)?;
        Ok(at)
    }

    fn retain(&mut self, mut length: usize) -> EditorResult<()> {
        while length > 0 {
            match self.remover.next {
                None => {
                    self.retain_close()?;
                    length -= 1;
                }
                Some(node) if self.tree.is_text(node) => {
                    let take = length.min(self.tree.length(node));
                    self.retain_text(node, take)?;
                    length -= take;
                }
                Some(node) => {
                    self.retain_open(node)?;
                    length -= 1;
                }
            }
        }
        Ok(())
    }

    fn retain_text(&mut self, node: NodeId, take: usize) -> EditorResult<()> {
        if take < self.tree.length(node) {
            self.tree.split_text(node, take)?;
        }
        if self.in_sync() {
            let next = self.settle(self.tree.next_sibling(node));
            self.remover.next = next;
            self.inserter.next = next;
        } else {
            let from = self.lift(node)?;
            let to = self.place(node)?;
            self.edits.push(TreeEdit::MoveText {
                from,
                to,
                length: take,
            });
        }
        Ok(())
    }

    fn retain_open(&mut self, node: NodeId) -> EditorResult<()> {
        if !self.in_sync() {
            let from = self.lift(node)?;
            let to = self.place(node)?;
            trace!(%node, "Moving retained node to the inserter");
            self.edits.push(TreeEdit::MoveNode { node, from, to });
            self.remover_stack.push(RemoverLevel {
                frame: self.remover,
                node,
                open_removed: false,
            });
            self.inserter_stack.push(InserterLevel {
                frame: self.inserter,
                node,
            });
        } else {
            let after = Frame {
                branch: self.remover.branch,
                next: self.settle(self.tree.next_sibling(node)),
            };
            self.remover_stack.push(RemoverLevel {
                frame: after,
                node,
                open_removed: false,
            });
            self.inserter_stack.push(InserterLevel { frame: after, node });
        }

        let inside = Frame {
            branch: node,
            next: self.settle(self.tree.first_child(node)),
        };
        self.remover = inside;
        self.inserter = inside;
        Ok(())
    }

    fn retain_close(&mut self) -> EditorResult<()> {
        let level = self
            .remover_stack
            .pop()
            .ok_or_else(|| EditorError::construction("retain past the end of the document"))?;

        if self.in_sync() {
            if level.open_removed {
                return Err(EditorError::structural(format!(
                    "retaining the close marker of {} after removing its open marker",
                    self.tree.kind(level.node)
                )));
            }
            let inserter_level = self.inserter_stack.pop().ok_or_else(|| {
                EditorError::structural("inserter stack is empty while in sync")
            })?;
            self.remover = level.frame;
            self.inserter = inserter_level.frame;
            return Ok(());
        }

        // the retained close marker now closes whatever the inserter is in
        let inserter_level = self.inserter_stack.pop().ok_or_else(|| {
            EditorError::structural(format!(
                "close marker of {} has no open element at the insertion point",
                self.tree.kind(level.node)
            ))
        })?;
        let closing = self.tree.kind(level.node);
        let open = self.tree.kind(inserter_level.node);
        if closing != open {
            return Err(EditorError::structural(format!(
                "closing {} but {} is open",
                closing, open
            )));
        }
        if self.inserter.next.is_some() {
            return Err(EditorError::structural(format!(
                "closing {} before the end of its content",
                open
            )));
        }

        self.inserter = inserter_level.frame;
        self.remover = level.frame;
        if level.open_removed {
            self.remove_husk(level.node)?;
        }
        Ok(())
    }

    fn remove(&mut self, items: &[Item]) -> EditorResult<()> {
        let mut index = 0;
        while index < items.len() {
            match self.remover.next {
                None => {
                    // removing the close marker of the current branch
                    let level = self.remover_stack.pop().ok_or_else(|| {
                        EditorError::construction("removal past the end of the document")
                    })?;
                    self.remover = level.frame;
                    if level.open_removed {
                        self.remove_husk(level.node)?;
                    }
                    index += 1;
                }
                Some(node) if self.tree.is_text(node) => {
                    let take = (items.len() - index).min(self.tree.length(node));
                    if take < self.tree.length(node) {
                        self.tree.split_text(node, take)?;
                    }
                    let at = self.lift(node)?;
                    self.tree.free(node);
                    self.edits.push(TreeEdit::RemoveText { at, length: take });
                    index += take;
                }
                Some(node) => {
                    let outer = self.tree.outer_length(node);
                    if items.len() - index >= outer {
                        let replacement = self.settle(self.tree.next_sibling(node));
                        self.pending.push(PendingRemoval {
                            node,
                            items: items[index..index + outer].to_vec(),
                        });
                        self.reanchor(node, replacement);
                        index += outer;
                    } else {
                        let after = Frame {
                            branch: self.remover.branch,
                            next: self.settle(self.tree.next_sibling(node)),
                        };
                        self.remover_stack.push(RemoverLevel {
                            frame: after,
                            node,
                            open_removed: true,
                        });
                        self.remover = Frame {
                            branch: node,
                            next: self.settle(self.tree.first_child(node)),
                        };
                        index += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete a node whose markers were both removed once the remover leaves
    /// it. Everything it still holds must be pending removal.
    fn remove_husk(&mut self, node: NodeId) -> EditorResult<()> {
        for child in self.tree.children(node).to_vec() {
            if !self.is_pending(child) {
                return Err(EditorError::structural(format!(
                    "removed {} still has content",
                    self.tree.kind(node)
                )));
            }
            self.finalize_pending(child)?;
        }
        let at = self.lift(node)?;
        self.tree.free(node);
        self.edits.push(TreeEdit::RemoveNode { at, node });
        Ok(())
    }

    fn finalize_pending(&mut self, node: NodeId) -> EditorResult<()> {
        self.pending.retain(|p| p.node != node);
        let at = self.position_of(node)?;
        self.tree.detach(node)?;
        self.tree.free(node);
        self.edits.push(TreeEdit::RemoveNode { at, node });
        Ok(())
    }

    fn insert(&mut self, items: &[Item]) -> EditorResult<()> {
        let mut index = 0;
        while index < items.len() {
            match &items[index] {
                Item::Char { .. } => {
                    let run = items[index..]
                        .iter()
                        .take_while(|item| item.is_char())
                        .count();
                    self.insert_text(&items[index..index + run])?;
                    index += run;
                }
                Item::Open(element) => match matching_close(items, index) {
                    Some(close) => {
                        self.insert_subtree(&items[index..=close])?;
                        index = close + 1;
                    }
                    None => {
                        let node = self.tree.alloc_branch(element.clone());
                        let at = self.place(node)?;
                        self.edits.push(TreeEdit::InsertNode { at, node });
                        self.inserter_stack.push(InserterLevel {
                            frame: self.inserter,
                            node,
                        });
                        self.inserter = Frame {
                            branch: node,
                            next: None,
                        };
                        index += 1;
                    }
                },
                Item::Close { kind } => {
                    let level = self.inserter_stack.pop().ok_or_else(|| {
                        EditorError::structural(format!("closing {} at the document root", kind))
                    })?;
                    let open = self.tree.kind(level.node);
                    if open != kind.as_str() {
                        return Err(EditorError::structural(format!(
                            "closing {} but {} is open",
                            kind, open
                        )));
                    }
                    self.inserter = level.frame;
                    index += 1;
                }
            }
        }
        Ok(())
    }

    fn insert_text(&mut self, items: &[Item]) -> EditorResult<()> {
        let node = self.tree.alloc_text(items.len());
        let at = self.place(node)?;
        let text = items
            .iter()
            .filter_map(|item| match item {
                Item::Char { ch, .. } => Some(*ch),
                _ => None,
            })
            .collect();
        self.edits.push(TreeEdit::InsertText { at, text });
        Ok(())
    }

    fn insert_subtree(&mut self, items: &[Item]) -> EditorResult<()> {
        if let Some(index) = self.pending.iter().position(|p| p.items == items) {
            let node = self.pending.remove(index).node;
            let from = self.position_of(node)?;
            self.tree.detach(node)?;
            let to = self.place(node)?;
            if from != to {
                debug!(%node, "Reinserted subtree matches a pending removal, moving it");
                self.edits.push(TreeEdit::MoveNode { node, from, to });
            }
            return Ok(());
        }

        let node = self.tree.build_detached(items)?;
        let at = self.place(node)?;
        self.edits.push(TreeEdit::InsertNode { at, node });
        Ok(())
    }

    fn attribute(&mut self, key: &str, from: &Option<Value>, to: &Option<Value>) -> EditorResult<()> {
        let node = self
            .remover
            .next
            .filter(|&node| !self.tree.is_text(node))
            .ok_or_else(|| {
                EditorError::construction(format!(
                    "attribute change for {} is not followed by an element",
                    key
                ))
            })?;
        let element = self
            .tree
            .element_mut(node)
            .ok_or_else(|| EditorError::construction("attribute change on a text node"))?;
        if element.attribute(key) != non_null(from.as_ref()) {
            return Err(EditorError::consistency(format!(
                "attribute {} of {} does not have the expected value",
                key, element.kind
            )));
        }
        element.set_attribute(key, to.clone());
        self.edits.push(TreeEdit::ChangeAttribute {
            node,
            key: key.to_string(),
            from: from.clone(),
            to: to.clone(),
        });
        Ok(())
    }

    fn finish(mut self) -> EditorResult<Vec<TreeEdit>> {
        let root = self.tree.root();
        let at_end = Frame {
            branch: root,
            next: None,
        };
        if self.remover != at_end
            || self.inserter != at_end
            || !self.remover_stack.is_empty()
            || !self.inserter_stack.is_empty()
        {
            return Err(EditorError::construction(
                "transaction does not cover the whole document",
            ));
        }

        while let Some(pending) = self.pending.first() {
            let node = pending.node;
            self.finalize_pending(node)?;
        }
        self.tree.normalize();
        Ok(self.edits)
    }
}

/// Index of the close marker balancing the open marker at `open`
fn matching_close(items: &[Item], open: usize) -> Option<usize> {
    let mut depth = 0isize;
    for (index, item) in items.iter().enumerate().skip(open) {
        depth += item.depth_delta();
        if depth == 0 {
            return Some(index);
        }
    }
    None
}
