//! Core library for template-driven document annotation.
//!
//! This crate provides:
//! - Normalized document and template models
//! - A pattern library and load-time template compilation
//! - Field matching (exact, positional, fuzzy) and template selection
//! - Template-independent field detection (metadata, sections, process steps, tables)
//! - Hybrid reconciliation of template and detected fields
//! - Quality scoring with a composite score and verdict

pub mod detect;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod scoring;
pub mod template;

pub use detect::{AutoDetector, Detector, DetectorKind};
pub use error::{DocmatchError, DocumentError, Result, TemplateError};
pub use models::config::EngineConfig;
pub use models::document::{Block, BlockKind, BoundingBox, Document, TextSpan};
pub use models::field::{
    AnnotationResult, FieldMatch, FieldSet, FieldSource, FieldType, Importance, MatchMethod,
    MatchStrategy, QualityReport, TemplateMatchResult, Verdict,
};
pub use models::template::{FieldDefinition, Template};
pub use pipeline::AnnotationEngine;
pub use reconcile::reconcile;
pub use scoring::{QualityInputs, QualityScorer};
pub use template::{derive_template, RegistrySnapshot, TemplateRegistry, TemplateSelector};
