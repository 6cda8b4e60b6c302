//! Template selection: score every candidate template and pick the best one.

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::models::config::MatchingConfig;
use crate::models::document::Document;
use crate::models::field::{FieldMatch, FieldSet, FieldSource, MatchMethod, MatchStrategy, TemplateMatchResult};
use crate::scoring::{meets_threshold, template_confidence};

use super::compile::CompiledTemplate;
use super::matcher::{FieldMatcher, MatchContext};
use super::registry::RegistrySnapshot;

/// Confidence of a field filled from document metadata.
pub const METADATA_CONFIDENCE: f32 = 0.95;

/// Metadata keys that may carry the value of a field, per field name.
const METADATA_ALIASES: &[&[&str]] = &[
    &["document_number", "doc_number", "document_no"],
    &["effective_date", "date"],
    &["author", "creator"],
    &["revision", "version"],
    &["department", "dept"],
];

/// Score of one template against one document.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateScore {
    pub template_id: String,
    pub structural: f32,
    pub content: f32,
    pub field_match_rate: f32,
    pub confidence: f32,
    pub matched_fields: FieldSet,
}

/// Picks the template that best fits a document.
#[derive(Debug, Clone, Default)]
pub struct TemplateSelector {
    config: MatchingConfig,
    matcher: FieldMatcher,
}

impl TemplateSelector {
    pub fn new(config: MatchingConfig) -> Self {
        Self {
            config,
            matcher: FieldMatcher::new(),
        }
    }

    /// Select a template for the document, or fall back to auto-detection.
    pub fn select(&self, document: &Document, snapshot: &RegistrySnapshot) -> TemplateMatchResult {
        let ctx = MatchContext::new(document);

        if let Some(id) = &self.config.forced_template_id {
            match snapshot.get(id) {
                Some(template) => {
                    let score = self.score_template(&ctx, template);
                    info!("Using forced template {} ({:.2})", id, score.confidence);
                    return TemplateMatchResult {
                        template_id: Some(score.template_id),
                        confidence: score.confidence,
                        strategy_used: MatchStrategy::Forced,
                        matched_fields: score.matched_fields,
                    };
                }
                None => warn!("Forced template {} is not registered, selecting normally", id),
            }
        }

        let mut best: Option<TemplateScore> = None;
        for score in self.score_candidates(&ctx, snapshot) {
            if best.as_ref().is_none_or(|b| score.confidence > b.confidence) {
                best = Some(score);
            }
        }

        let threshold = self.config.template_confidence_threshold;
        match best {
            Some(score) if meets_threshold(score.confidence, threshold) => {
                info!("Selected template {} ({:.2})", score.template_id, score.confidence);
                TemplateMatchResult {
                    template_id: Some(score.template_id),
                    confidence: score.confidence,
                    strategy_used: MatchStrategy::Combined,
                    matched_fields: score.matched_fields,
                }
            }
            Some(score) => {
                info!(
                    "Best template {} scored {:.2}, below threshold {:.2}",
                    score.template_id, score.confidence, threshold
                );
                TemplateMatchResult::fallback()
            }
            None => {
                info!("No candidate templates for document");
                TemplateMatchResult::fallback()
            }
        }
    }

    /// Scores of every template whose document type fits, in registration order.
    pub fn score_candidates(
        &self,
        ctx: &MatchContext<'_>,
        snapshot: &RegistrySnapshot,
    ) -> Vec<TemplateScore> {
        let document_type = detect_document_type(ctx.document());
        snapshot
            .templates()
            .iter()
            .filter(|t| document_type.as_deref().is_none_or(|ty| t.accepts_type(ty)))
            .map(|t| self.score_template(ctx, t))
            .collect()
    }

    /// Run every field of a template and compute its confidence.
    pub fn score_template(&self, ctx: &MatchContext<'_>, template: &CompiledTemplate) -> TemplateScore {
        let fields = template.fields();
        let matches: Vec<Option<FieldMatch>> = if self.config.parallel_fields {
            fields.par_iter().map(|f| self.matcher.match_field(ctx, f)).collect()
        } else {
            fields.iter().map(|f| self.matcher.match_field(ctx, f)).collect()
        };

        let structural = structural_similarity(ctx.document(), template);

        let mut content_total = 0usize;
        let mut content_hits = 0usize;
        let mut required_total = 0usize;
        let mut required_hits = 0usize;

        for (field, found) in fields.iter().zip(&matches) {
            let definition = &field.definition;
            if !definition.is_positional() {
                content_total += 1;
                if found
                    .as_ref()
                    .is_some_and(|m| matches!(m.method, MatchMethod::Exact | MatchMethod::Fuzzy))
                {
                    content_hits += 1;
                }
            }
            if definition.required {
                required_total += 1;
                if found.is_some() {
                    required_hits += 1;
                }
            }
        }

        let content = ratio(content_hits, content_total, 0.0);
        let field_match_rate = ratio(required_hits, required_total, 1.0);
        let confidence = template_confidence(structural, content, field_match_rate);

        debug!(
            "Template {}: structural {:.2}, content {:.2}, required {:.2} => {:.2}",
            template.id(),
            structural,
            content,
            field_match_rate,
            confidence
        );

        TemplateScore {
            template_id: template.id().to_string(),
            structural,
            content,
            field_match_rate,
            confidence,
            matched_fields: matches.into_iter().flatten().collect(),
        }
    }

    /// Fill template fields that produced no match from the document's metadata.
    ///
    /// Leaves the template confidence untouched.
    pub fn fill_from_metadata(
        &self,
        result: &mut TemplateMatchResult,
        template: &CompiledTemplate,
        document: &Document,
    ) {
        if document.metadata.is_empty() || result.is_fallback() {
            return;
        }

        for field in template.fields() {
            let name = field.name();
            if result.matched_fields.contains(name) {
                continue;
            }

            let value = metadata_keys(name)
                .into_iter()
                .filter_map(|key| document.metadata.get(key))
                .map(|v| v.trim())
                .find(|v| !v.is_empty() && field.accepts(v));

            if let Some(value) = value {
                debug!("Field {}: filled from metadata", name);
                let mut m = FieldMatch::new(
                    name,
                    value,
                    METADATA_CONFIDENCE,
                    MatchMethod::Inferred,
                    FieldSource::Template,
                );
                m.field_type = field.definition.field_type;
                m.importance = field.definition.importance;
                result.matched_fields.insert(m);
            }
        }
    }
}

/// Coarse document type: the hint if present, else the source file extension.
pub fn detect_document_type(document: &Document) -> Option<String> {
    let hint = document
        .document_type_hint
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty());

    if let Some(hint) = hint {
        return Some(hint.to_lowercase());
    }

    document
        .source_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Fraction of the template's section patterns found in the document's
/// section paths.
fn structural_similarity(document: &Document, template: &CompiledTemplate) -> f32 {
    let patterns = template.section_patterns();
    if patterns.is_empty() {
        return 0.0;
    }

    let titles = document.section_titles();
    let found = patterns
        .iter()
        .filter(|re| titles.iter().any(|t| re.is_match(t)))
        .count();

    found as f32 / patterns.len() as f32
}

/// Metadata keys to look up for a field, the field's own name first.
pub(crate) fn metadata_keys(name: &str) -> Vec<&str> {
    let mut keys = vec![name];
    if let Some(group) = METADATA_ALIASES.iter().find(|g| g.contains(&name)) {
        keys.extend(group.iter().copied().filter(|k| *k != name));
    }
    keys
}

fn ratio(hits: usize, total: usize, empty: f32) -> f32 {
    if total == 0 {
        empty
    } else {
        hits as f32 / total as f32
    }
}
