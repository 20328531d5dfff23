use super::{emit_json, load_document, read_json, DocumentFile};
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use folio_editor::{Transaction, TreeEdit, UndoStack};
use folio_model::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Document JSON file
    pub document: PathBuf,

    /// Transaction JSON files, applied in order
    #[arg(required = true)]
    pub transactions: Vec<PathBuf>,

    /// Undo this many transactions after applying
    #[arg(long, default_value_t = 0)]
    pub undo: usize,

    /// Also output the tree edits produced by each commit
    #[arg(long)]
    pub edits: bool,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// A transaction file holds one transaction or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TransactionFile {
    One(Transaction),
    Many(Vec<Transaction>),
}

impl TransactionFile {
    pub fn into_vec(self) -> Vec<Transaction> {
        match self {
            TransactionFile::One(tx) => vec![tx],
            TransactionFile::Many(txs) => txs,
        }
    }
}

pub fn read_transactions(paths: &[PathBuf]) -> Result<Vec<Transaction>> {
    let mut transactions = Vec::new();
    for path in paths {
        let file: TransactionFile = read_json(path)?;
        transactions.extend(file.into_vec());
    }
    Ok(transactions)
}

#[derive(Debug, Serialize)]
struct ApplyOutput {
    document: DocumentFile,
    edits: Vec<Vec<TreeEdit>>,
}

pub fn apply(args: ApplyArgs, config: &Config) -> Result<()> {
    let doc = load_document(&args.document, config.schema())?;
    let transactions = read_transactions(&args.transactions)?;

    let (doc, edits) = apply_all(doc, transactions, config.undo_levels, args.undo)?;
    let document = DocumentFile::from_document(&doc);

    if args.edits {
        let output = ApplyOutput { document, edits };
        emit_json(&output, args.out.as_deref(), config.pretty)?;
    } else {
        emit_json(&document, args.out.as_deref(), config.pretty)?;
    }

    report_written(args.out.as_deref());
    Ok(())
}

/// Commit `transactions` through an undo stack, then undo `undo` of them
pub fn apply_all(
    mut doc: Document,
    transactions: Vec<Transaction>,
    undo_levels: usize,
    undo: usize,
) -> Result<(Document, Vec<Vec<TreeEdit>>)> {
    let mut stack = UndoStack::with_max_levels(undo_levels);
    let mut edits = Vec::new();

    for (index, tx) in transactions.into_iter().enumerate() {
        let step = stack
            .commit(tx, &mut doc)
            .with_context(|| format!("Transaction {} could not be applied", index))?;
        edits.push(step);
    }

    for _ in 0..undo {
        match stack.undo(&mut doc)? {
            Some(step) => edits.push(step),
            None => {
                eprintln!("{}", "⚠️  Nothing left to undo".yellow());
                break;
            }
        }
    }

    Ok((doc, edits))
}

fn report_written(out: Option<&Path>) {
    if let Some(path) = out {
        eprintln!("  {} {}", "✓".green(), path.display());
    }
}
