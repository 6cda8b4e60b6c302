//! End-to-end annotation of a document against a registry snapshot.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::detect::AutoDetector;
use crate::error::Result;
use crate::models::config::EngineConfig;
use crate::models::document::Document;
use crate::models::field::AnnotationResult;
use crate::reconcile::reconcile;
use crate::scoring::{QualityInputs, QualityScorer};
use crate::template::{RegistrySnapshot, TemplateSelector};

/// Selection, detection, reconciliation and scoring for one configuration.
#[derive(Debug)]
pub struct AnnotationEngine {
    config: EngineConfig,
    selector: TemplateSelector,
    detector: AutoDetector,
    scorer: QualityScorer,
}

impl Default for AnnotationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AnnotationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            selector: TemplateSelector::new(config.matching.clone()),
            detector: AutoDetector::new(),
            scorer: QualityScorer::new(config.scoring.clone()),
            config,
        }
    }

    /// Replace the detector library.
    pub fn with_detector(mut self, detector: AutoDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Annotate one document.
    ///
    /// Fails only on malformed input. Template selection and auto-detection
    /// run in parallel; reconciliation waits for both.
    pub fn annotate(
        &self,
        document: &Document,
        snapshot: &RegistrySnapshot,
        inputs: QualityInputs,
    ) -> Result<AnnotationResult> {
        document.validate()?;

        let (mut selection, auto_fields) = rayon::join(
            || self.selector.select(document, snapshot),
            || self.detector.detect(document),
        );

        let template = selection
            .template_id
            .as_deref()
            .and_then(|id| snapshot.get(id))
            .cloned();

        if let Some(template) = &template {
            self.selector.fill_from_metadata(&mut selection, template, document);
        }

        let definition = template.as_deref().map(|t| t.template());
        let fields = reconcile(
            &selection,
            definition,
            auto_fields,
            self.config.matching.overlap_threshold,
        );
        let quality = self.scorer.score(&fields, &selection, definition, inputs);

        let mut warnings = snapshot.warnings();
        if let Some(id) = &self.config.matching.forced_template_id {
            if snapshot.get(id).is_none() {
                warnings.push(format!("forced template {} is not registered", id));
            }
        }
        if !quality.missing_required.is_empty() {
            warn!(
                "Document {}: missing required fields {:?}",
                document.id, quality.missing_required
            );
        }

        info!(
            "Document {}: template {}, {} fields, score {:.1} ({})",
            document.id,
            selection.template_id.as_deref().unwrap_or("<none>"),
            fields.len(),
            quality.composite_score,
            quality.verdict
        );

        Ok(AnnotationResult {
            document_id: document.id.clone(),
            template_id: selection.template_id,
            fields,
            quality,
            warnings,
        })
    }

    /// Re-derive the quality verdict from caller inputs measured after the run,
    /// such as the total processing time.
    pub fn rescore(&self, result: &mut AnnotationResult, inputs: QualityInputs) {
        self.scorer.rescore(&mut result.quality, inputs);
    }

    /// Annotate many documents against one snapshot in parallel. Results keep
    /// the input order; a malformed document fails on its own.
    pub fn annotate_batch(
        &self,
        documents: &[Document],
        snapshot: &RegistrySnapshot,
        inputs: QualityInputs,
    ) -> Vec<Result<AnnotationResult>> {
        documents
            .par_iter()
            .map(|document| self.annotate(document, snapshot, inputs))
            .collect()
    }
}
