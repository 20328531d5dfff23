use super::{emit_json, load_document, read_json, DocumentFile};
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use folio_editor::{Change, RebaseResult};
use folio_model::Document;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct RebaseArgs {
    /// Base document both changes were built against
    pub document: PathBuf,

    /// Change JSON already committed to history
    pub history: PathBuf,

    /// Change JSON to rebase over history
    pub uncommitted: PathBuf,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RebaseOutput {
    rebased: Change,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<Change>,
    transposed_history: Change,
    /// Base with history and the rebased change applied
    document: DocumentFile,
}

pub fn rebase(args: RebaseArgs, config: &Config) -> Result<()> {
    let base = load_document(&args.document, config.schema())?;
    let history: Change = read_json(&args.history)?;
    let uncommitted: Change = read_json(&args.uncommitted)?;

    let (result, doc) = rebase_and_apply(base, &history, &uncommitted)?;

    if result.conflicted() {
        eprintln!(
            "{}",
            "⚠️  Uncommitted change conflicts with history; conflicting parts rejected".yellow()
        );
    } else {
        eprintln!("  {} rebased cleanly", "✓".green());
    }

    let output = RebaseOutput {
        rebased: result.rebased,
        rejected: result.rejected,
        transposed_history: result.transposed_history,
        document: DocumentFile::from_document(&doc),
    };
    emit_json(&output, args.out.as_deref(), config.pretty)
}

pub fn rebase_and_apply(
    mut doc: Document,
    history: &Change,
    uncommitted: &Change,
) -> Result<(RebaseResult, Document)> {
    let result = folio_editor::rebase(history, uncommitted).context("Rebase failed")?;

    history
        .apply_to(&mut doc)
        .context("History does not apply to the document")?;
    result
        .rebased
        .apply_to(&mut doc)
        .context("Rebased change does not apply after history")?;

    Ok((result, doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;
    use serde_json::Value;

    #[test]
    fn test_rebase_command() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write(dir.path(), "doc.json", DOC);
        let history = write(
            dir.path(),
            "history.json",
            r#"{"start": 0, "transactions": [{"a": 1, "o": [1, ["", "x"], 3]}]}"#,
        );
        let uncommitted = write(
            dir.path(),
            "uncommitted.json",
            r#"{"start": 0, "transactions": [{"a": 2, "o": [3, ["", "y"], 1]}]}"#,
        );
        let out = dir.path().join("out.json");

        let args = RebaseArgs {
            document: doc,
            history,
            uncommitted,
            out: Some(out.clone()),
        };
        rebase(args, &Config::default()).unwrap();

        let output: Value = read_json(&out).unwrap();
        assert_eq!(output["rebased"]["start"], 1);
        assert_eq!(output["transposedHistory"]["start"], 1);
        assert!(output.get("rejected").is_none());

        let file: DocumentFile = serde_json::from_value(output["document"].clone()).unwrap();
        let doc = file.into_document(folio_model::Schema::default()).unwrap();
        assert_eq!(doc.text(), "xaby");
    }

    #[test]
    fn test_rebase_conflict_keeps_history() {
        let base = load_document_str(DOC);
        let history: Change = serde_json::from_str(
            r#"{"start": 0, "transactions": [{"a": 1, "o": [1, ["ab", ""], 1]}]}"#,
        )
        .unwrap();
        let uncommitted: Change = serde_json::from_str(
            r#"{"start": 0, "transactions": [{"a": 2, "o": [2, ["b", ""], 1]}]}"#,
        )
        .unwrap();

        let (result, doc) = rebase_and_apply(base, &history, &uncommitted).unwrap();
        assert!(result.conflicted());
        assert_eq!(doc.text(), "");
    }

    fn load_document_str(json: &str) -> Document {
        let file: DocumentFile = serde_json::from_str(json).unwrap();
        file.into_document(folio_model::Schema::default()).unwrap()
    }
}
