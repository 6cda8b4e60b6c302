//! Templates: pattern library, compilation, registry, matching and selection.

pub mod compile;
pub mod derive;
pub mod matcher;
pub mod patterns;
pub mod registry;
pub mod selector;

pub use compile::{compile, CompiledField, CompiledRule, CompiledTemplate};
pub use derive::derive_template;
pub use matcher::{FieldMatcher, MatchContext};
pub use registry::{RegistrySnapshot, RejectedTemplate, TemplateRegistry};
pub use selector::{detect_document_type, TemplateScore, TemplateSelector};
