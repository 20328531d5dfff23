//! Error types for the document model

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Structural validity error at offset {offset}: {message}")]
    StructuralValidity { offset: usize, message: String },

    #[error("Offset {offset} is out of range for a document of length {length}")]
    OutOfRange { offset: usize, length: usize },

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Item at offset {0} is not an element")]
    NotAnElement(usize),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Tree error: {0}")]
    Tree(String),
}

impl ModelError {
    pub fn structural(offset: usize, message: impl Into<String>) -> Self {
        ModelError::StructuralValidity {
            offset,
            message: message.into(),
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
