//! # Node Tree
//!
//! Arena-backed tree cached from linear data.
//!
//! Nodes are addressed by [`NodeId`], an index into the arena. Ids stay valid
//! while a node is detached and re-attached elsewhere, which is what lets the
//! tree modifier move content without losing identity. A parent owns nothing:
//! children are listed by id and each node keeps a plain back link to its
//! parent.
//!
//! Every node caches its length in linear units:
//!
//! - text node: number of characters
//! - branch: length of its content (the open/close markers are not counted)
//!
//! The outer length of a branch adds its two markers. The root has no markers
//! and its length is the document length.

use crate::error::{ModelError, ModelResult};
use crate::item::{ElementData, Item};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Branch {
        element: ElementData,
        children: Vec<NodeId>,
    },
    Text,
}

#[derive(Debug, Clone)]
pub struct Node {
    parent: Option<NodeId>,
    length: usize,
    data: NodeData,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text)
    }

    pub fn element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Branch { element, .. } => Some(element),
            NodeData::Text => None,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.data {
            NodeData::Branch { children, .. } => children,
            NodeData::Text => &[],
        }
    }
}

pub const ROOT_KIND: &str = "document";

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    /// Freed slots, reused by the next allocations
    vacant: Vec<usize>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A tree holding only an empty root
    pub fn new() -> Self {
        let root = Node {
            parent: None,
            length: 0,
            data: NodeData::Branch {
                element: ElementData::new(ROOT_KIND),
                children: Vec::new(),
            },
        };
        Self {
            nodes: vec![Some(root)],
            vacant: Vec::new(),
            root: NodeId(0),
        }
    }

    /// Build a tree from balanced linear data
    pub fn build(data: &[Item]) -> ModelResult<Self> {
        let mut tree = Self::new();
        let root = tree.root;
        tree.build_into(root, data)?;
        Ok(tree)
    }

    /// Build a detached subtree from a single balanced element
    pub fn build_detached(&mut self, items: &[Item]) -> ModelResult<NodeId> {
        let (Some(Item::Open(element)), Some(Item::Close { kind })) = (items.first(), items.last())
        else {
            return Err(ModelError::Tree(
                "subtree must start with an open marker and end with a close marker".to_string(),
            ));
        };
        if items.len() < 2 || *kind != element.kind {
            return Err(ModelError::Tree(format!(
                "subtree for {} is not closed by its own marker",
                element.kind
            )));
        }

        let node = self.alloc_branch(element.clone());
        self.build_into(node, &items[1..items.len() - 1])?;
        Ok(node)
    }

    fn build_into(&mut self, parent: NodeId, data: &[Item]) -> ModelResult<()> {
        let mut stack = vec![parent];
        let mut text_run: Option<NodeId> = None;

        for (offset, item) in data.iter().enumerate() {
            let current = stack[stack.len() - 1];
            match item {
                Item::Char { .. } => match text_run {
                    Some(text) => {
                        self.node_mut(text).length += 1;
                        self.adjust_lengths(current, 1);
                    }
                    None => {
                        let text = self.alloc_text(1);
                        self.append(current, text);
                        text_run = Some(text);
                    }
                },
                Item::Open(element) => {
                    text_run = None;
                    let node = self.alloc_branch(element.clone());
                    self.append(current, node);
                    stack.push(node);
                }
                Item::Close { kind } => {
                    text_run = None;
                    if stack.len() == 1 {
                        return Err(ModelError::structural(
                            offset,
                            format!("unmatched close marker for {}", kind),
                        ));
                    }
                    let open_kind = self.kind(current);
                    if open_kind != kind.as_str() {
                        return Err(ModelError::structural(
                            offset,
                            format!("closing {} but {} is open", kind, open_kind),
                        ));
                    }
                    stack.pop();
                }
            }
        }

        if stack.len() > 1 {
            return Err(ModelError::structural(
                data.len(),
                format!("{} is never closed", self.kind(stack[stack.len() - 1])),
            ));
        }
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Document length
    pub fn len(&self) -> usize {
        self.node(self.root).length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node(&self, id: NodeId) -> &Node {
        match self.nodes.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("node {} does not exist", id),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("node {} does not exist", id),
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).children()
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.node(id).is_text()
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.node(id).element()
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.node_mut(id).data {
            NodeData::Branch { element, .. } => Some(element),
            NodeData::Text => None,
        }
    }

    /// Element type of a branch, `""` for text
    pub fn kind(&self, id: NodeId) -> &str {
        self.element(id).map(|e| e.kind.as_str()).unwrap_or("")
    }

    /// Content length
    pub fn length(&self, id: NodeId) -> usize {
        self.node(id).length
    }

    /// Length including the open and close markers of a branch
    pub fn outer_length(&self, id: NodeId) -> usize {
        let node = self.node(id);
        if node.is_text() || id == self.root {
            node.length
        } else {
            node.length + 2
        }
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&child| child == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Offset inside `parent`'s content just before `before` (or at its end)
    pub fn content_offset(&self, parent: NodeId, before: Option<NodeId>) -> usize {
        self.children(parent)
            .iter()
            .take_while(|&&child| Some(child) != before)
            .map(|&child| self.outer_length(child))
            .sum()
    }

    /// Linear offset of a node's first item in the document
    pub fn offset_of(&self, id: NodeId) -> usize {
        let mut offset = 0;
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            offset += self.content_offset(parent, Some(current));
            if parent != self.root {
                offset += 1;
            }
            current = parent;
        }
        offset
    }

    /// Deepest branch whose content contains `offset`
    pub fn node_at_offset(&self, offset: usize) -> NodeId {
        let mut current = self.root;
        let mut base = 0;
        'descend: loop {
            let mut start = base;
            for &child in self.children(current) {
                let outer = self.outer_length(child);
                if !self.is_text(child) && offset > start && offset < start + outer {
                    current = child;
                    base = start + 1;
                    continue 'descend;
                }
                start += outer;
            }
            return current;
        }
    }

    pub fn alloc_text(&mut self, length: usize) -> NodeId {
        self.alloc(Node {
            parent: None,
            length,
            data: NodeData::Text,
        })
    }

    pub fn alloc_branch(&mut self, element: ElementData) -> NodeId {
        self.alloc(Node {
            parent: None,
            length: 0,
            data: NodeData::Branch {
                element,
                children: Vec::new(),
            },
        })
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.vacant.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn append(&mut self, parent: NodeId, node: NodeId) {
        if let NodeData::Branch { children, .. } = &mut self.node_mut(parent).data {
            children.push(node);
        }
        self.node_mut(node).parent = Some(parent);
        let outer = self.outer_length(node) as isize;
        self.adjust_lengths(parent, outer);
    }

    fn adjust_lengths(&mut self, from: NodeId, delta: isize) {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = self.node_mut(id);
            node.length = (node.length as isize + delta) as usize;
            current = node.parent;
        }
    }

    /// Attach a detached `node` to `parent`, before `before` or at the end
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        before: Option<NodeId>,
        node: NodeId,
    ) -> ModelResult<()> {
        if self.parent(node).is_some() {
            return Err(ModelError::Tree(format!("{} is already attached", node)));
        }
        let index = match before {
            Some(before) => self
                .children(parent)
                .iter()
                .position(|&child| child == before)
                .ok_or_else(|| {
                    ModelError::Tree(format!("{} is not a child of {}", before, parent))
                })?,
            None => self.children(parent).len(),
        };
        match &mut self.node_mut(parent).data {
            NodeData::Branch { children, .. } => children.insert(index, node),
            NodeData::Text => {
                return Err(ModelError::Tree(format!("{} is a text node", parent)));
            }
        }
        self.node_mut(node).parent = Some(parent);
        let outer = self.outer_length(node) as isize;
        self.adjust_lengths(parent, outer);
        Ok(())
    }

    /// Detach `node` from its parent, returning the former parent
    pub fn detach(&mut self, node: NodeId) -> ModelResult<NodeId> {
        let parent = self
            .parent(node)
            .ok_or_else(|| ModelError::Tree(format!("{} is not attached", node)))?;
        let outer = self.outer_length(node) as isize;
        if let NodeData::Branch { children, .. } = &mut self.node_mut(parent).data {
            children.retain(|&child| child != node);
        }
        self.node_mut(node).parent = None;
        self.adjust_lengths(parent, -outer);
        Ok(parent)
    }

    /// Split a text node so that it keeps `at` characters; the rest becomes a
    /// new text node right after it.
    pub fn split_text(&mut self, node: NodeId, at: usize) -> ModelResult<NodeId> {
        let length = self.length(node);
        if !self.is_text(node) || at == 0 || at >= length {
            return Err(ModelError::Tree(format!(
                "cannot split {} of length {} at {}",
                node, length, at
            )));
        }
        let parent = self
            .parent(node)
            .ok_or_else(|| ModelError::Tree(format!("{} is not attached", node)))?;
        let index = self.index_in_parent(node).unwrap_or_default();

        let tail = self.alloc_text(length - at);
        self.node_mut(node).length = at;
        self.node_mut(tail).parent = Some(parent);
        if let NodeData::Branch { children, .. } = &mut self.node_mut(parent).data {
            children.insert(index + 1, tail);
        }
        Ok(tail)
    }

    /// Release a detached node and its descendants
    pub fn free(&mut self, node: NodeId) {
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            if id == self.root {
                continue;
            }
            if let Some(Some(node)) = self.nodes.get_mut(id.0).map(Option::take) {
                pending.extend(node.children().iter().copied());
                self.vacant.push(id.0);
            }
        }
    }

    /// Merge adjacent text nodes and drop empty ones
    pub fn normalize(&mut self) {
        let mut branches = vec![self.root];
        while let Some(branch) = branches.pop() {
            let children = self.children(branch).to_vec();
            let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
            for child in children {
                if !self.is_text(child) {
                    branches.push(child);
                    kept.push(child);
                    continue;
                }
                let length = self.length(child);
                let previous = kept.last().copied();
                match previous {
                    _ if length == 0 => self.free(child),
                    Some(previous) if self.is_text(previous) => {
                        self.node_mut(previous).length += length;
                        self.free(child);
                    }
                    _ => kept.push(child),
                }
            }
            if let NodeData::Branch { children, .. } = &mut self.node_mut(branch).data {
                *children = kept;
            }
        }
    }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.vacant.len()
    }

    /// Arena slots in use or waiting for reuse
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Compact rendering of the tree's shape, e.g. `paragraph(#3)comment()`.
    /// Two trees with the same signature describe the same linear data up to
    /// characters.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        for &child in self.children(self.root) {
            self.write_signature(child, &mut out);
        }
        out
    }

    fn write_signature(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.data {
            NodeData::Text => out.push_str(&format!("#{}", node.length)),
            NodeData::Branch { element, children } => {
                out.push_str(&element.kind);
                if !element.attributes.is_empty() {
                    out.push_str(&serde_json::to_string(&element.attributes).unwrap_or_default());
                }
                out.push('(');
                for &child in children {
                    self.write_signature(child, out);
                }
                out.push(')');
            }
        }
    }
}
