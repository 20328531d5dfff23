//! # Linear Items
//!
//! Every position in a document's linear data holds one [`Item`]: an element
//! open marker, an element close marker, or a single character.
//!
//! ## Wire form
//!
//! ```text
//! "a"                                   plain character
//! ["a", ["h1f2e"]]                      annotated character
//! {"type": "paragraph"}                 open marker
//! {"type": "heading", "attributes": {"level": 2}}
//! {"type": "/paragraph"}                close marker
//! ```

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Element attributes. Ordered so that equality and serialization are stable.
pub type Attributes = BTreeMap<String, Value>;

/// Data carried by an element's open marker
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub kind: String,
    pub attributes: Attributes,
    pub internal: Option<Value>,
}

impl ElementData {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Attributes::new(),
            internal: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        let key: String = key.into();
        self.set_attribute(&key, Some(value));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        non_null(self.attributes.get(key))
    }

    /// Set or clear an attribute, returning the previous value. Setting
    /// `null` clears.
    pub fn set_attribute(&mut self, key: &str, value: Option<Value>) -> Option<Value> {
        let previous = match value.filter(|value| !value.is_null()) {
            Some(value) => self.attributes.insert(key.to_string(), value),
            None => self.attributes.remove(key),
        };
        previous.filter(|value| !value.is_null())
    }
}

/// An attribute value, with `null` read as absent
pub fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| !value.is_null())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ItemRepr", into = "ItemRepr")]
pub enum Item {
    Open(ElementData),
    Close { kind: String },
    Char { ch: char, annotations: Vec<String> },
}

impl Item {
    pub fn open(kind: impl Into<String>) -> Self {
        Item::Open(ElementData::new(kind))
    }

    pub fn close(kind: impl Into<String>) -> Self {
        Item::Close { kind: kind.into() }
    }

    pub fn ch(ch: char) -> Self {
        Item::Char {
            ch,
            annotations: Vec::new(),
        }
    }

    /// Plain characters for every char of `text`
    pub fn text(text: &str) -> Vec<Item> {
        text.chars().map(Item::ch).collect()
    }

    /// An element with no content: open and close markers
    pub fn leaf(element: ElementData) -> Vec<Item> {
        let kind = element.kind.clone();
        vec![Item::Open(element), Item::Close { kind }]
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Item::Open(_))
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Item::Close { .. })
    }

    pub fn is_char(&self) -> bool {
        matches!(self, Item::Char { .. })
    }

    /// Element type of a marker
    pub fn kind(&self) -> Option<&str> {
        match self {
            Item::Open(element) => Some(&element.kind),
            Item::Close { kind } => Some(kind),
            Item::Char { .. } => None,
        }
    }

    pub fn element(&self) -> Option<&ElementData> {
        match self {
            Item::Open(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self) -> Option<&mut ElementData> {
        match self {
            Item::Open(element) => Some(element),
            _ => None,
        }
    }

    pub fn annotations(&self) -> &[String] {
        match self {
            Item::Char { annotations, .. } => annotations,
            _ => &[],
        }
    }

    /// Structural contribution: +1 for an open marker, -1 for a close marker
    pub fn depth_delta(&self) -> isize {
        match self {
            Item::Open(_) => 1,
            Item::Close { .. } => -1,
            Item::Char { .. } => 0,
        }
    }

    /// Equality that ignores character annotations
    pub fn same_content(&self, other: &Item) -> bool {
        match (self, other) {
            (Item::Char { ch: a, .. }, Item::Char { ch: b, .. }) => a == b,
            _ => self == other,
        }
    }
}

/// The string of `items` when every item is an unannotated character
pub fn plain_text(items: &[Item]) -> Option<String> {
    items
        .iter()
        .map(|item| match item {
            Item::Char { ch, annotations } if annotations.is_empty() => Some(*ch),
            _ => None,
        })
        .collect()
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ItemRepr {
    Char(String),
    Annotated(String, Vec<String>),
    Element(ElementRepr),
}

#[derive(Serialize, Deserialize)]
struct ElementRepr {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    internal: Option<Value>,
}

fn single_char(text: &str) -> Result<char, ModelError> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(ModelError::InvalidItem(format!(
            "expected a single character, got {:?}",
            text
        ))),
    }
}

impl TryFrom<ItemRepr> for Item {
    type Error = ModelError;

    fn try_from(repr: ItemRepr) -> Result<Self, Self::Error> {
        match repr {
            ItemRepr::Char(text) => Ok(Item::ch(single_char(&text)?)),
            ItemRepr::Annotated(text, annotations) => Ok(Item::Char {
                ch: single_char(&text)?,
                annotations,
            }),
            ItemRepr::Element(element) => match element.kind.strip_prefix('/') {
                Some(kind) if element.attributes.is_empty() && element.internal.is_none() => {
                    Ok(Item::close(kind))
                }
                Some(kind) => Err(ModelError::InvalidItem(format!(
                    "close marker for {} carries element data",
                    kind
                ))),
                None => {
                    let mut attributes = element.attributes;
                    attributes.retain(|_, value| !value.is_null());
                    Ok(Item::Open(ElementData {
                        kind: element.kind,
                        attributes,
                        internal: element.internal,
                    }))
                }
            },
        }
    }
}

impl From<Item> for ItemRepr {
    fn from(item: Item) -> Self {
        match item {
            Item::Char { ch, annotations } if annotations.is_empty() => {
                ItemRepr::Char(ch.to_string())
            }
            Item::Char { ch, annotations } => ItemRepr::Annotated(ch.to_string(), annotations),
            Item::Open(element) => ItemRepr::Element(ElementRepr {
                kind: element.kind,
                attributes: element.attributes,
                internal: element.internal,
            }),
            Item::Close { kind } => ItemRepr::Element(ElementRepr {
                kind: format!("/{}", kind),
                attributes: Attributes::new(),
                internal: None,
            }),
        }
    }
}
