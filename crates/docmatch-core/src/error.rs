//! Error types for the docmatch-core library.

use thiserror::Error;

/// Main error type for the docmatch library.
#[derive(Error, Debug)]
pub enum DocmatchError {
    /// Template definition error.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Malformed document input.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A template that cannot be loaded into the registry.
///
/// Raised at load time so that a broken template never reaches matching.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// A field pattern is not a valid regular expression.
    #[error("template {template_id}: invalid pattern for field {field}: {pattern}: {source}")]
    InvalidPattern {
        template_id: String,
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A regex field declares no patterns.
    #[error("template {template_id}: field {field} uses regex extraction but has no patterns")]
    MissingPatterns { template_id: String, field: String },

    /// Two fields share a name.
    #[error("template {template_id}: duplicate field name {field}")]
    DuplicateField { template_id: String, field: String },

    /// A field has an empty name.
    #[error("template {template_id}: field at index {index} has an empty name")]
    EmptyFieldName { template_id: String, index: usize },

    /// Confidence threshold outside [0, 1].
    #[error("template {template_id}: field {field} has threshold {value} outside [0, 1]")]
    InvalidThreshold {
        template_id: String,
        field: String,
        value: f32,
    },

    /// Position hint with an empty or inverted y range.
    #[error("template {template_id}: field {field} has an invalid y range")]
    InvalidPositionHint { template_id: String, field: String },

    /// The template has no id.
    #[error("template has an empty id")]
    EmptyId,
}

impl TemplateError {
    /// Id of the template the error belongs to, if known.
    pub fn template_id(&self) -> Option<&str> {
        match self {
            TemplateError::InvalidPattern { template_id, .. }
            | TemplateError::MissingPatterns { template_id, .. }
            | TemplateError::DuplicateField { template_id, .. }
            | TemplateError::EmptyFieldName { template_id, .. }
            | TemplateError::InvalidThreshold { template_id, .. }
            | TemplateError::InvalidPositionHint { template_id, .. } => Some(template_id),
            TemplateError::EmptyId => None,
        }
    }
}

/// Violations of the normalized document input contract.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// The document has no blocks.
    #[error("document has no blocks")]
    EmptyBlocks,

    /// A block's bounding box has non-finite or inverted coordinates.
    #[error("block {index} has an inconsistent bounding box: {reason}")]
    InvalidBbox { index: usize, reason: String },
}

/// Result type for the docmatch library.
pub type Result<T> = std::result::Result<T, DocmatchError>;
