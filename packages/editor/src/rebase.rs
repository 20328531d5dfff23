//! # Rebasing
//!
//! Given a `history` change already applied and an `uncommitted` change built
//! against the same base, produce:
//!
//! - `rebased`: the uncommitted change, transformed to apply after history
//! - `transposed_history`: history, transformed to apply after the accepted
//!   part of `uncommitted`, so both orders converge
//! - `rejected`: the parts of `uncommitted` that conflict with history,
//!   expressed against the common base
//!
//! Both sides are squashed and cut into pieces: one per replace or attribute
//! operation, positioned in the base. Pieces are grouped into spans, which
//! are runs of pieces whose removed and inserted structure are both balanced.
//! A span is the unit of rejection, so what survives is still a valid edit.
//!
//! ```text
//! base        a b c d e
//! history       [-b-]          remove b
//! uncommitted         ^ x      insert x before d
//! rebased           ^ x        shifted by history's -1
//! ```

use crate::change::Change;
use crate::errors::{EditorError, EditorResult};
use crate::squasher::squash;
use crate::transaction::{AuthorId, Operation, Transaction};
use folio_model::non_null;
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// Outcome of [`rebase`]
#[derive(Debug, Clone, PartialEq)]
pub struct RebaseResult {
    pub rebased: Change,
    pub rejected: Option<Change>,
    pub transposed_history: Change,
}

impl RebaseResult {
    pub fn conflicted(&self) -> bool {
        self.rejected.is_some()
    }
}

#[derive(Debug, Clone)]
struct Piece {
    /// Position of the piece in the base
    start: usize,
    end: usize,
    op: Operation,
    span: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Clean,
    /// The same attribute change on both sides
    Duplicate,
    Conflict,
}

impl Piece {
    fn is_point(&self) -> bool {
        self.start == self.end
    }

    fn delta(&self) -> isize {
        self.op.len_after() as isize - self.op.len_before() as isize
    }

    fn relation(&self, other: &Piece) -> Relation {
        if let (
            Operation::Attribute { key, to, .. },
            Operation::Attribute {
                key: other_key,
                to: other_to,
                ..
            },
        ) = (&self.op, &other.op)
        {
            if self.start == other.start {
                let same_target = non_null(to.as_ref()) == non_null(other_to.as_ref());
                return match (key == other_key, same_target) {
                    (false, _) => Relation::Clean,
                    (true, true) => Relation::Duplicate,
                    (true, false) => Relation::Conflict,
                };
            }
        }

        let overlaps = match (self.is_point(), other.is_point()) {
            (true, true) => false,
            (true, false) => other.start < self.start && self.start < other.end,
            (false, true) => self.start < other.start && other.start < self.end,
            (false, false) => self.start < other.end && other.start < self.end,
        };
        if overlaps {
            Relation::Conflict
        } else {
            Relation::Clean
        }
    }

    /// Whether this piece's effect lies before `other`, so `other` must
    /// shift by this piece's delta. Insertions at the same point are ordered
    /// by `first_on_tie`.
    fn precedes(&self, other: &Piece, first_on_tie: bool) -> bool {
        if self.is_point() && other.is_point() && self.start == other.start {
            return first_on_tie;
        }
        self.end <= other.start
    }
}

fn decompose(tx: &Transaction) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut offset = 0;
    let mut span = 0;
    let mut removed_depth = 0isize;
    let mut inserted_depth = 0isize;

    for op in tx.operations() {
        match op {
            Operation::Retain { length } => offset += length,
            Operation::Attribute { .. } => pieces.push(Piece {
                start: offset,
                end: offset + 1,
                op: op.clone(),
                span,
            }),
            Operation::Replace { remove, insert, .. } => {
                pieces.push(Piece {
                    start: offset,
                    end: offset + remove.len(),
                    op: op.clone(),
                    span,
                });
                removed_depth += remove.iter().map(|item| item.depth_delta()).sum::<isize>();
                inserted_depth += insert.iter().map(|item| item.depth_delta()).sum::<isize>();
                offset += remove.len();
            }
        }
        if !matches!(op, Operation::Retain { .. }) && removed_depth == 0 && inserted_depth == 0 {
            span += 1;
        }
    }
    pieces
}

fn shifted(offset: usize, delta: isize) -> usize {
    (offset as isize + delta).max(0) as usize
}

/// Lay `pieces` out over a document of `length` items
fn rebuild<'a>(
    pieces: impl IntoIterator<Item = (usize, &'a Operation)>,
    length: usize,
    author: Option<AuthorId>,
) -> EditorResult<Transaction> {
    let mut tx = Transaction::with_author(author);
    let mut cursor = 0;
    for (start, op) in pieces {
        if start < cursor {
            return Err(EditorError::construction(format!(
                "rebased edit at {} overlaps the previous edit ending at {}",
                start, cursor
            )));
        }
        tx.push_retain(start - cursor);
        cursor = start;
        match op {
            Operation::Replace {
                remove,
                insert,
                inserted_data_offset,
                inserted_data_length,
            } => {
                tx.push_replace(
                    remove.clone(),
                    insert.clone(),
                    *inserted_data_offset,
                    *inserted_data_length,
                );
                cursor += remove.len();
            }
            Operation::Attribute { key, from, to } => {
                tx.push_attribute(key.clone(), from.clone(), to.clone())
            }
            Operation::Retain { .. } => {}
        }
    }
    if length < cursor {
        return Err(EditorError::construction(format!(
            "rebased edits run to {} past the document length {}",
            cursor, length
        )));
    }
    tx.push_retain(length - cursor);
    Ok(tx)
}

/// Transform `uncommitted` to apply after `history`. Both must start at the
/// same history position.
#[instrument(skip_all, fields(start = history.start(), history = history.len(), uncommitted = uncommitted.len()))]
pub fn rebase(history: &Change, uncommitted: &Change) -> EditorResult<RebaseResult> {
    if history.start() != uncommitted.start() {
        return Err(EditorError::construction(format!(
            "history starts at {} but the uncommitted change at {}",
            history.start(),
            uncommitted.start()
        )));
    }

    if history.is_empty() || uncommitted.is_empty() {
        let mut rebased = uncommitted.clone();
        let mut transposed_history = history.clone();
        rebased.set_start(history.end());
        transposed_history.set_start(history.start() + rebased.len());
        for (author, selection) in uncommitted.selections() {
            rebased.set_selection(*author, selection.translate_by_change(history, Some(*author)));
        }
        for (author, selection) in history.selections() {
            transposed_history
                .set_selection(*author, selection.translate_by_change(uncommitted, Some(*author)));
        }
        return Ok(RebaseResult {
            rebased,
            rejected: None,
            transposed_history,
        });
    }

    let a = squash(history.transactions())?;
    let b = squash(uncommitted.transactions())?;
    if a.len_before() != b.len_before() {
        return Err(EditorError::construction(format!(
            "history applies to {} items but the uncommitted change to {}",
            a.len_before(),
            b.len_before()
        )));
    }

    let history_first = match (a.author(), b.author()) {
        (Some(own), Some(other)) => own <= other,
        _ => true,
    };
    let a_pieces = decompose(&a);
    let b_pieces = decompose(&b);

    let mut rejected_spans = BTreeSet::new();
    let mut duplicates: Vec<(usize, usize)> = Vec::new();
    for (ai, ap) in a_pieces.iter().enumerate() {
        for (bi, bp) in b_pieces.iter().enumerate() {
            match ap.relation(bp) {
                Relation::Clean => {}
                Relation::Duplicate => duplicates.push((ai, bi)),
                Relation::Conflict => {
                    rejected_spans.insert(bp.span);
                }
            }
        }
    }

    // a duplicate only cancels out when the uncommitted side keeps it
    let mut dropped_a = BTreeSet::new();
    let mut dropped_b = BTreeSet::new();
    for (ai, bi) in duplicates {
        if !rejected_spans.contains(&b_pieces[bi].span) {
            dropped_a.insert(ai);
            dropped_b.insert(bi);
        }
    }

    let accepted: Vec<(usize, &Piece)> = b_pieces
        .iter()
        .enumerate()
        .filter(|(_, piece)| !rejected_spans.contains(&piece.span))
        .collect();

    let rebased_pieces = accepted
        .iter()
        .filter(|(index, _)| !dropped_b.contains(index))
        .map(|&(_, piece)| {
            let delta: isize = a_pieces
                .iter()
                .filter(|a_piece| a_piece.precedes(piece, history_first))
                .map(Piece::delta)
                .sum();
            (shifted(piece.start, delta), &piece.op)
        });
    let rebased_tx = rebuild(rebased_pieces, a.len_after(), b.author())?;

    let transposed_pieces = a_pieces
        .iter()
        .enumerate()
        .filter(|(index, _)| !dropped_a.contains(index))
        .map(|(_, piece)| {
            let delta: isize = accepted
                .iter()
                .filter(|(_, b_piece)| b_piece.precedes(piece, !history_first))
                .map(|(_, b_piece)| b_piece.delta())
                .sum();
            (shifted(piece.start, delta), &piece.op)
        });
    let accepted_delta: isize = accepted.iter().map(|(_, piece)| piece.delta()).sum();
    let transposed_len = shifted(a.len_before(), accepted_delta);
    let transposed_tx = rebuild(transposed_pieces, transposed_len, a.author())?;

    let rejected = if rejected_spans.is_empty() {
        None
    } else {
        debug!(spans = rejected_spans.len(), "Uncommitted change conflicts with history");
        let pieces = b_pieces
            .iter()
            .filter(|piece| rejected_spans.contains(&piece.span))
            .map(|piece| (piece.start, &piece.op));
        let tx = rebuild(pieces, b.len_before(), b.author())?;
        Some(Change::from_transaction(
            uncommitted.start(),
            tx,
            uncommitted.merged_store(),
        ))
    };

    let history_store = history.merged_store();
    let uncommitted_store = uncommitted.merged_store();

    let mut rebased = if rebased_tx.is_no_op() {
        Change::empty(history.end())
    } else {
        Change::from_transaction(
            history.end(),
            rebased_tx.clone(),
            uncommitted_store.difference(&history_store),
        )
    };
    if rejected.is_none() {
        for (author, selection) in uncommitted.selections() {
            let selection = selection.translate_by_transaction(&transposed_tx, Some(*author));
            rebased.set_selection(*author, selection);
        }
    }

    let mut transposed_history = if transposed_tx.is_no_op() {
        Change::empty(history.start() + rebased.len())
    } else {
        Change::from_transaction(
            history.start() + rebased.len(),
            transposed_tx,
            history_store.difference(&uncommitted_store),
        )
    };
    for (author, selection) in history.selections() {
        let selection = selection.translate_by_transaction(&rebased_tx, Some(*author));
        transposed_history.set_selection(*author, selection);
    }

    Ok(RebaseResult {
        rebased,
        rejected,
        transposed_history,
    })
}

/// Rebase one transaction over another built against the same base.
/// Returns the pair `(rebased, transposed)`, or `None` on conflict.
pub fn rebase_transactions(
    history: &Transaction,
    uncommitted: &Transaction,
) -> EditorResult<Option<(Transaction, Transaction)>> {
    let result = rebase(
        &Change::from_transaction(0, history.clone(), Default::default()),
        &Change::from_transaction(0, uncommitted.clone(), Default::default()),
    )?;
    if result.conflicted() {
        return Ok(None);
    }
    let length = uncommitted.len_before() as isize + history.length_difference();
    let rebased = result
        .rebased
        .transactions()
        .first()
        .cloned()
        .unwrap_or_else(|| retain_only(shifted(0, length), uncommitted.author()));
    let transposed_length = history.len_before() as isize + rebased.length_difference();
    let transposed = result
        .transposed_history
        .transactions()
        .first()
        .cloned()
        .unwrap_or_else(|| retain_only(shifted(0, transposed_length), history.author()));
    Ok(Some((rebased, transposed)))
}

fn retain_only(length: usize, author: Option<AuthorId>) -> Transaction {
    let mut tx = Transaction::with_author(author);
    tx.push_retain(length);
    tx
}
