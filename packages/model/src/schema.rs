//! # Node Types
//!
//! The schema is an immutable table of node types. It is built once (from the
//! defaults plus any configured extras) and shared by every document.
//!
//! | flag       | meaning                                                    |
//! |------------|------------------------------------------------------------|
//! | `content`  | branch whose children are text, inline and meta nodes      |
//! | `inline`   | leaf that may only appear inside a content branch          |
//! | `meta`     | leaf that may appear at any depth                          |
//! | `reserved` | trailing region excluded from user-visible ranges          |
//!
//! Types with none of the flags are structural branches: their children are
//! other block nodes.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeType {
    pub name: String,
    #[serde(default)]
    pub content: bool,
    #[serde(default)]
    pub inline: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub reserved: bool,
}

impl NodeType {
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: false,
            inline: false,
            meta: false,
            reserved: false,
        }
    }

    pub fn content(name: impl Into<String>) -> Self {
        Self {
            content: true,
            ..Self::branch(name)
        }
    }

    pub fn inline(name: impl Into<String>) -> Self {
        Self {
            inline: true,
            ..Self::branch(name)
        }
    }

    pub fn meta(name: impl Into<String>) -> Self {
        Self {
            meta: true,
            ..Self::branch(name)
        }
    }

    pub fn reserved(name: impl Into<String>) -> Self {
        Self {
            reserved: true,
            ..Self::branch(name)
        }
    }

    /// Leaves never have children
    pub fn is_leaf(&self) -> bool {
        self.inline || self.meta
    }

    /// Block nodes live in structural branches
    pub fn is_block(&self) -> bool {
        !self.inline && !self.meta
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    types: BTreeMap<String, NodeType>,
}

impl Schema {
    pub fn new(types: impl IntoIterator<Item = NodeType>) -> Self {
        Self {
            types: types
                .into_iter()
                .map(|node_type| (node_type.name.clone(), node_type))
                .collect(),
        }
    }

    /// Add (or redefine) a node type
    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.types.insert(node_type.name.clone(), node_type);
        self
    }

    pub fn get(&self, name: &str) -> Option<&NodeType> {
        self.types.get(name)
    }

    pub fn node_type(&self, name: &str) -> Result<&NodeType, ModelError> {
        self.types
            .get(name)
            .ok_or_else(|| ModelError::UnknownNodeType(name.to_string()))
    }

    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Schema::new([
            NodeType::content("paragraph"),
            NodeType::content("heading"),
            NodeType::content("preformatted"),
            NodeType::branch("list"),
            NodeType::branch("listItem"),
            NodeType::branch("div"),
            NodeType::branch("blockquote"),
            NodeType::inline("image"),
            NodeType::meta("comment"),
            NodeType::meta("alienMeta"),
            NodeType::reserved("internalList"),
            NodeType::branch("internalItem"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_types() {
        let schema = Schema::default();

        assert!(schema.node_type("paragraph").unwrap().content);
        assert!(schema.node_type("image").unwrap().is_leaf());
        assert!(schema.node_type("comment").unwrap().meta);
        assert!(schema.node_type("internalList").unwrap().reserved);
        assert!(schema.node_type("list").unwrap().is_block());
    }

    #[test]
    fn test_unknown_type() {
        let schema = Schema::default();
        assert_eq!(
            schema.node_type("table"),
            Err(ModelError::UnknownNodeType("table".to_string()))
        );
    }

    #[test]
    fn test_extra_types_from_json() {
        let extra: NodeType =
            serde_json::from_str(r#"{"name": "mathInline", "inline": true}"#).unwrap();
        let schema = Schema::default().with_type(extra);

        let math = schema.node_type("mathInline").unwrap();
        assert!(math.inline);
        assert!(!math.content);
    }
}
