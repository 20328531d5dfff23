//! # Document
//!
//! Linear data, the node tree cached from it, and the value store holding the
//! annotation values its characters reference.
//!
//! The linear data is authoritative. Code that edits a document in place
//! (see the editor crate's tree modifier) updates both representations; when
//! in doubt [`Document::rebuild_tree`] recomputes the cache.

use crate::error::{ModelError, ModelResult};
use crate::item::Item;
use crate::schema::{NodeType, Schema};
use crate::store::ValueStore;
use crate::tree::{NodeId, Tree};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Document {
    data: Vec<Item>,
    tree: Tree,
    store: ValueStore,
    schema: Arc<Schema>,
}

impl Document {
    /// Create a document using the default schema
    pub fn new(data: Vec<Item>) -> ModelResult<Self> {
        Self::with_schema(data, Arc::new(Schema::default()))
    }

    pub fn with_schema(data: Vec<Item>, schema: Arc<Schema>) -> ModelResult<Self> {
        validate(&data, &schema)?;
        let tree = Tree::build(&data)?;
        debug!(length = data.len(), nodes = tree.node_count(), "Document created");
        Ok(Self {
            data,
            tree,
            store: ValueStore::new(),
            schema,
        })
    }

    pub fn with_store(mut self, store: ValueStore) -> Self {
        self.store = store;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[Item] {
        &self.data
    }

    /// Mutable linear data. Callers must keep the tree in step.
    pub fn data_mut(&mut self) -> &mut Vec<Item> {
        &mut self.data
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutable tree. Callers must keep the linear data in step.
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ValueStore {
        &mut self.store
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn item(&self, offset: usize) -> ModelResult<&Item> {
        self.data.get(offset).ok_or(ModelError::OutOfRange {
            offset,
            length: self.data.len(),
        })
    }

    /// Node type of the element whose open marker is at `offset`
    pub fn node_type_at(&self, offset: usize) -> ModelResult<&NodeType> {
        match self.item(offset)? {
            Item::Open(element) => self.schema.node_type(&element.kind),
            _ => Err(ModelError::NotAnElement(offset)),
        }
    }

    /// Deepest branch containing `offset`
    pub fn node_at_offset(&self, offset: usize) -> ModelResult<NodeId> {
        if offset > self.data.len() {
            return Err(ModelError::OutOfRange {
                offset,
                length: self.data.len(),
            });
        }
        Ok(self.tree.node_at_offset(offset))
    }

    /// Offset of the trailing reserved region, if the document has one
    pub fn reserved_start(&self) -> Option<usize> {
        let root = self.tree.root();
        let last = *self.tree.children(root).last()?;
        let reserved = self
            .tree
            .element(last)
            .and_then(|element| self.schema.get(&element.kind))
            .map(|node_type| node_type.reserved)
            .unwrap_or(false);
        reserved.then(|| self.tree.offset_of(last))
    }

    /// Recompute the cached tree from the linear data
    pub fn rebuild_tree(&mut self) -> ModelResult<()> {
        self.tree = Tree::build(&self.data)?;
        Ok(())
    }

    /// True when the cached tree has the shape a rebuild would produce
    pub fn is_tree_consistent(&self) -> bool {
        match Tree::build(&self.data) {
            Ok(rebuilt) => rebuilt.signature() == self.tree.signature(),
            Err(_) => false,
        }
    }

    /// Characters of the document, ignoring structure
    pub fn text(&self) -> String {
        self.data
            .iter()
            .filter_map(|item| match item {
                Item::Char { ch, .. } => Some(*ch),
                _ => None,
            })
            .collect()
    }
}

struct OpenFrame<'a> {
    kind: &'a str,
    node_type: &'a NodeType,
}

/// Check that linear data forms a valid tree under `schema`
pub fn validate(data: &[Item], schema: &Schema) -> ModelResult<()> {
    let mut stack: Vec<OpenFrame> = Vec::new();

    for (offset, item) in data.iter().enumerate() {
        let parent = stack.last();
        if let Some(parent) = parent {
            if parent.node_type.is_leaf() && !item.is_close() {
                return Err(ModelError::structural(
                    offset,
                    format!("{} cannot have children", parent.kind),
                ));
            }
        }
        let in_content = parent.map(|p| p.node_type.content).unwrap_or(false);

        match item {
            Item::Char { .. } => {
                if !in_content {
                    return Err(ModelError::structural(
                        offset,
                        "text outside a content branch",
                    ));
                }
            }
            Item::Open(element) => {
                let node_type = schema.node_type(&element.kind)?;
                if node_type.inline && !in_content {
                    return Err(ModelError::structural(
                        offset,
                        format!("inline {} outside a content branch", element.kind),
                    ));
                }
                if node_type.is_block() && in_content {
                    return Err(ModelError::structural(
                        offset,
                        format!("block {} inside a content branch", element.kind),
                    ));
                }
                stack.push(OpenFrame {
                    kind: &element.kind,
                    node_type,
                });
            }
            Item::Close { kind } => match stack.pop() {
                Some(open) if open.kind == kind.as_str() => {}
                Some(open) => {
                    return Err(ModelError::structural(
                        offset,
                        format!("closing {} but {} is open", kind, open.kind),
                    ));
                }
                None => {
                    return Err(ModelError::structural(
                        offset,
                        format!("unmatched close marker for {}", kind),
                    ));
                }
            },
        }
    }

    match stack.last() {
        Some(open) => Err(ModelError::structural(
            data.len(),
            format!("{} is never closed", open.kind),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paragraph(text: &str) -> Vec<Item> {
        let mut data = vec![Item::open("paragraph")];
        data.extend(Item::text(text));
        data.push(Item::close("paragraph"));
        data
    }

    #[test]
    fn test_valid_document() {
        let mut data = paragraph("ab");
        data.extend(Item::leaf(crate::ElementData::new("comment")));
        data.extend(paragraph("cd"));

        let doc = Document::new(data).unwrap();
        assert_eq!(doc.len(), 10);
        assert_eq!(doc.text(), "abcd");
        assert!(doc.is_tree_consistent());
        assert_eq!(doc.reserved_start(), None);
    }

    #[test]
    fn test_text_at_root_rejected() {
        let err = Document::new(Item::text("a")).unwrap_err();
        assert!(matches!(err, ModelError::StructuralValidity { offset: 0, .. }));
    }

    #[test]
    fn test_block_in_content_rejected() {
        let mut data = vec![Item::open("paragraph")];
        data.extend(paragraph("x"));
        data.push(Item::close("paragraph"));

        let err = Document::new(data).unwrap_err();
        assert!(matches!(err, ModelError::StructuralValidity { offset: 1, .. }));
    }

    #[test]
    fn test_inline_and_meta_placement() {
        let image = Item::leaf(crate::ElementData::new("image"));

        let mut inside = vec![Item::open("paragraph")];
        inside.extend(image.clone());
        inside.extend(Item::leaf(crate::ElementData::new("comment")));
        inside.push(Item::close("paragraph"));
        assert!(Document::new(inside).is_ok());

        assert!(Document::new(image).is_err());
    }

    #[test]
    fn test_leaf_with_children_rejected() {
        let data = vec![
            Item::open("paragraph"),
            Item::open("image"),
            Item::ch('x'),
            Item::close("image"),
            Item::close("paragraph"),
        ];
        let err = Document::new(data).unwrap_err();
        assert!(matches!(err, ModelError::StructuralValidity { offset: 2, .. }));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let data = vec![Item::open("table"), Item::close("table")];
        assert_eq!(
            Document::new(data).unwrap_err(),
            ModelError::UnknownNodeType("table".to_string())
        );
    }

    #[test]
    fn test_reserved_start() {
        let mut data = paragraph("abc");
        data.push(Item::open("internalList"));
        data.push(Item::open("internalItem"));
        data.extend(paragraph("ref"));
        data.push(Item::close("internalItem"));
        data.push(Item::close("internalList"));

        let doc = Document::new(data).unwrap();
        assert_eq!(doc.reserved_start(), Some(5));
    }

    #[test]
    fn test_node_type_at() {
        let mut data = vec![Item::Open(
            crate::ElementData::new("heading").with_attribute("level", json!(1)),
        )];
        data.push(Item::close("heading"));
        let doc = Document::new(data).unwrap();

        assert_eq!(doc.node_type_at(0).unwrap().name, "heading");
        assert_eq!(doc.node_type_at(1), Err(ModelError::NotAnElement(1)));
        assert!(matches!(
            doc.node_type_at(2),
            Err(ModelError::OutOfRange { offset: 2, length: 2 })
        ));
    }
}
