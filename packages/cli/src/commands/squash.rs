use super::apply::read_transactions;
use super::emit_json;
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct SquashArgs {
    /// Transaction JSON files, in application order
    #[arg(required = true)]
    pub transactions: Vec<PathBuf>,

    /// Write the squashed transaction here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

pub fn squash(args: SquashArgs, config: &Config) -> Result<()> {
    let transactions = read_transactions(&args.transactions)?;
    let squashed = folio_editor::squash(&transactions)
        .context("Transactions do not form a sequence")?;

    eprintln!(
        "  {} {} transactions → {} operations",
        "✓".green(),
        transactions.len(),
        squashed.operations().len()
    );
    emit_json(&squashed, args.out.as_deref(), config.pretty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::read_json;
    use crate::commands::test_support::*;
    use folio_editor::Transaction;

    #[test]
    fn test_squash_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "1.json", r#"{"o": [2, ["", "x"], 2]}"#);
        let second = write(dir.path(), "2.json", r#"{"o": [3, ["", "y"], 2]}"#);
        let out = dir.path().join("squashed.json");

        let args = SquashArgs {
            transactions: vec![first, second],
            out: Some(out.clone()),
        };
        squash(args, &Config::default()).unwrap();

        let squashed: Transaction = read_json(&out).unwrap();
        assert_eq!(
            serde_json::to_value(&squashed).unwrap(),
            serde_json::json!({"o": [2, ["", "xy"], 2]})
        );
    }

    #[test]
    fn test_squash_rejects_gap() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "1.json", r#"{"o": [2, ["", "x"], 2]}"#);
        let second = write(dir.path(), "2.json", r#"{"o": [4]}"#);

        let args = SquashArgs {
            transactions: vec![first, second],
            out: None,
        };
        assert!(squash(args, &Config::default()).is_err());
    }
}
