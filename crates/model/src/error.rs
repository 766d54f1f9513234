use crate::element::{ElementId, ElementKind};

/// Errors raised by the document engine.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Another holder currently owns the model authority.
    #[error("Model authority is held by another job")]
    AuthorityUnavailable,

    #[error("A {kind} named '{name}' already exists")]
    DuplicateName { kind: ElementKind, name: String },

    #[error("Element {0} does not exist")]
    MissingElement(ElementId),

    #[error("Element {id} is a {actual}, expected {expected}")]
    WrongElementKind {
        id: ElementId,
        expected: ElementKind,
        actual: ElementKind,
    },

    #[error("Family symbol '{family}: {symbol}' is not active")]
    InactiveSymbol { family: String, symbol: String },

    #[error("Family symbol '{family}: {symbol}' cannot be placed as a {requested}")]
    WrongCategory {
        family: String,
        symbol: String,
        requested: &'static str,
    },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Image export failed: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
