//! Error types for the editor

use folio_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Invalid transaction: {0}")]
    Construction(String),

    #[error("Structural validity error: {0}")]
    StructuralValidity(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl EditorError {
    pub fn construction(message: impl Into<String>) -> Self {
        EditorError::Construction(message.into())
    }

    pub fn structural(message: impl Into<String>) -> Self {
        EditorError::StructuralValidity(message.into())
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        EditorError::Consistency(message.into())
    }
}

pub type EditorResult<T> = Result<T, EditorError>;
