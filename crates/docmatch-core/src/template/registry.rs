//! Template registry with atomically swapped, immutable snapshots.
//!
//! Readers take an `Arc<RegistrySnapshot>` and match against it for as long as
//! they like. Registration builds a new snapshot and swaps the pointer, so an
//! in-flight batch never observes a partially applied change.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::error::TemplateError;
use crate::models::template::Template;

use super::compile::{compile, CompiledTemplate};

/// A template that failed load-time validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedTemplate {
    /// Template id, empty if the template had none.
    pub template_id: String,
    pub reason: String,
}

impl RejectedTemplate {
    fn from_error(template_id: &str, error: &TemplateError) -> Self {
        Self {
            template_id: error.template_id().unwrap_or(template_id).to_string(),
            reason: error.to_string(),
        }
    }
}

/// Immutable view of the registry, in registration order.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    templates: Vec<Arc<CompiledTemplate>>,
    rejected: Vec<RejectedTemplate>,
}

impl RegistrySnapshot {
    /// Compile templates into a snapshot, skipping the invalid ones.
    pub fn from_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let mut snapshot = Self::default();
        for template in templates {
            snapshot.apply(template);
        }
        snapshot
    }

    /// Templates in registration order.
    pub fn templates(&self) -> &[Arc<CompiledTemplate>] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&Arc<CompiledTemplate>> {
        self.templates.iter().find(|t| t.id() == id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates excluded at load time.
    pub fn rejected(&self) -> &[RejectedTemplate] {
        &self.rejected
    }

    /// Warnings to surface for rejected templates.
    pub fn warnings(&self) -> Vec<String> {
        self.rejected
            .iter()
            .map(|r| format!("template {} excluded: {}", r.template_id, r.reason))
            .collect()
    }

    /// Compile and insert one template. Returns whether it was accepted.
    fn apply(&mut self, template: Template) -> bool {
        let id = template.id.clone();
        match compile(template) {
            Ok(compiled) => {
                self.rejected.retain(|r| r.template_id != id);
                let compiled = Arc::new(compiled);
                match self.templates.iter_mut().find(|t| t.id() == id) {
                    Some(slot) => *slot = compiled,
                    None => self.templates.push(compiled),
                }
                true
            }
            Err(e) => {
                warn!("Excluding template {}: {}", if id.is_empty() { "<no id>" } else { id.as_str() }, e);
                self.rejected.retain(|r| r.template_id != id);
                self.rejected.push(RejectedTemplate::from_error(&id, &e));
                false
            }
        }
    }
}

/// Shared handle to the current registry snapshot.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an initial set of templates.
    pub fn with_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let snapshot = RegistrySnapshot::from_templates(templates);
        info!(
            "Loaded {} templates ({} rejected)",
            snapshot.len(),
            snapshot.rejected().len()
        );
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Current snapshot. Cheap; holds the lock only to clone the pointer.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Register one template, replacing any template with the same id.
    ///
    /// An invalid template leaves the registered templates unchanged and is
    /// returned as an error.
    pub fn register(&self, template: Template) -> Result<(), TemplateError> {
        let compiled = Arc::new(compile(template)?);
        let id = compiled.id().to_string();

        self.update(|next| {
            next.rejected.retain(|r| r.template_id != id);
            match next.templates.iter_mut().find(|t| t.id() == id) {
                Some(slot) => *slot = Arc::clone(&compiled),
                None => next.templates.push(Arc::clone(&compiled)),
            }
        });

        info!("Registered template {}", id);
        Ok(())
    }

    /// Apply a batch of templates in a single swap. Invalid ones are recorded
    /// as rejected; returns the number accepted.
    pub fn load(&self, templates: impl IntoIterator<Item = Template>) -> usize {
        let templates: Vec<Template> = templates.into_iter().collect();
        let mut accepted = 0;

        self.update(|next| {
            for template in templates {
                if next.apply(template) {
                    accepted += 1;
                }
            }
        });

        accepted
    }

    /// Remove a template by id. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        let mut removed = false;
        self.update(|next| {
            let before = next.templates.len();
            next.templates.retain(|t| t.id() != id);
            removed = next.templates.len() != before;
        });
        removed
    }

    /// Copy-on-write update under the write lock.
    fn update(&self, f: impl FnOnce(&mut RegistrySnapshot)) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = RegistrySnapshot::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::template::FieldDefinition;

    fn template(id: &str, pattern: &str) -> Template {
        Template::new(id, id, "docx").with_field(FieldDefinition::regex("f", [pattern]))
    }

    #[test]
    fn test_invalid_template_is_excluded() {
        let registry = TemplateRegistry::with_templates(vec![
            template("good", r"(\d+)"),
            template("bad", "(unclosed"),
        ]);
        let snapshot = registry.snapshot();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.templates()[0].id(), "good");
        assert_eq!(snapshot.rejected().len(), 1);
        assert_eq!(snapshot.rejected()[0].template_id, "bad");
        assert!(snapshot.warnings()[0].contains("bad"));
    }

    #[test]
    fn test_register_replaces_in_place() {
        let registry = TemplateRegistry::with_templates(vec![
            template("a", "x"),
            template("b", "y"),
        ]);

        registry.register(template("a", "z")).unwrap();
        let snapshot = registry.snapshot();

        let ids: Vec<&str> = snapshot.templates().iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(snapshot.get("a").unwrap().template().elements[0].patterns, vec!["z"]);
    }

    #[test]
    fn test_old_snapshot_is_unaffected_by_register() {
        let registry = TemplateRegistry::with_templates(vec![template("a", "x")]);
        let before = registry.snapshot();

        registry.register(template("b", "y")).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_register_invalid_keeps_registry() {
        let registry = TemplateRegistry::with_templates(vec![template("a", "x")]);
        assert!(registry.register(template("a", "(")).is_err());
        assert_eq!(
            registry.snapshot().get("a").unwrap().template().elements[0].patterns,
            vec!["x"]
        );
    }

    #[test]
    fn test_batch_load_and_remove() {
        let registry = TemplateRegistry::new();
        let accepted = registry.load(vec![template("a", "x"), template("b", "(")]);

        assert_eq!(accepted, 1);
        assert_eq!(registry.snapshot().rejected().len(), 1);
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(registry.snapshot().is_empty());
    }
}
