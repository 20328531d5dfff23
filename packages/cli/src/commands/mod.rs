pub mod apply;
pub mod check;
pub mod rebase;
pub mod squash;

pub use apply::{apply, ApplyArgs};
pub use check::{check, CheckArgs};
pub use rebase::{rebase, RebaseArgs};
pub use squash::{squash, SquashArgs};

use anyhow::{Context, Result};
use folio_model::{Document, Item, Schema, ValueStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// On-disk document: linear data plus the annotation store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFile {
    pub data: Vec<Item>,
    #[serde(default)]
    pub store: ValueStore,
}

impl DocumentFile {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            data: doc.data().to_vec(),
            store: doc.store().clone(),
        }
    }

    pub fn into_document(self, schema: Schema) -> Result<Document> {
        let doc = Document::with_schema(self.data, Arc::new(schema))
            .context("Document is not structurally valid")?;
        Ok(doc.with_store(self.store))
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_document(path: &Path, schema: Schema) -> Result<Document> {
    let file: DocumentFile = read_json(path)?;
    file.into_document(schema)
        .with_context(|| format!("Invalid document {}", path.display()))
}

pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    println!("{}", to_json(value, pretty)?);
    Ok(())
}

/// Write `value` to `out`, or to stdout when no path is given
pub fn emit_json<T: Serialize>(value: &T, out: Option<&Path>, pretty: bool) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, to_json(value, pretty)?)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => print_json(value, pretty),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub const DOC: &str = r#"{"data": [{"type": "paragraph"}, "a", "b", {"type": "/paragraph"}]}"#;
}
