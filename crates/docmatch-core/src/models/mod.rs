//! Data models for documents, templates, matches and results.

pub mod config;
pub mod document;
pub mod field;
pub mod template;
