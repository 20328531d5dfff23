use folio_model::{NodeType, Schema};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "folio.config.json";

/// Folio configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Node types added to the default schema
    #[serde(default)]
    pub node_types: Vec<NodeType>,

    /// Maximum undo levels kept by `apply`
    #[serde(default = "default_undo_levels")]
    pub undo_levels: usize,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

fn default_undo_levels() -> usize {
    100
}

impl Config {
    /// Load config from `explicit`, or from a directory
    pub fn load(cwd: &Path, explicit: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else if explicit.is_some() {
            Err(anyhow::anyhow!(
                "Config file does not exist: {}",
                config_path.display()
            ))
        } else {
            Ok(Config::default())
        }
    }

    /// Default schema extended with the configured node types
    pub fn schema(&self) -> Schema {
        self.node_types
            .iter()
            .cloned()
            .fold(Schema::default(), Schema::with_type)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_types: vec![],
            undo_levels: default_undo_levels(),
            pretty: false,
        }
    }
}
