//! Scoring constants, template confidence arithmetic and the quality scorer.
//!
//! Every weight and threshold used by selection and quality scoring lives here.

use std::time::Duration;

use tracing::debug;

use crate::models::config::ScoringConfig;
use crate::models::field::{FieldSet, QualityReport, TemplateMatchResult, Verdict};
use crate::models::template::Template;

/// Weight of structural similarity in template confidence.
pub const STRUCTURAL_WEIGHT: f32 = 0.4;
/// Weight of content similarity in template confidence.
pub const CONTENT_WEIGHT: f32 = 0.3;
/// Weight of the required field match rate in template confidence.
pub const FIELD_MATCH_WEIGHT: f32 = 0.3;

/// Default minimum template confidence (inclusive).
pub const DEFAULT_TEMPLATE_THRESHOLD: f32 = 0.6;
/// Default bbox IoU above which fields conflict.
pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.5;

pub const TEMPLATE_POINTS: f32 = 40.0;
pub const ESSENTIAL_POINTS: f32 = 30.0;
pub const OUTPUT_POINTS: f32 = 20.0;
pub const SPEED_POINTS: f32 = 10.0;
/// Points given to bbox accuracy when the caller opts in; the other terms shrink to 90%.
pub const BBOX_POINTS: f32 = 10.0;

pub const PRODUCTION_READY_MIN: f32 = 85.0;
pub const USABLE_MIN: f32 = 60.0;

/// Essential field rate below which a document can never be production ready.
pub const ESSENTIAL_GATE: f32 = 0.8;
/// Highest composite score a gated document can report.
pub const GATED_SCORE_CEILING: f32 = 84.0;

/// Essential fields when no template was selected.
pub const UNIVERSAL_MINIMUM: [&str; 3] = ["document_number", "title", "effective_date"];

/// Processing time at which the speed score reaches zero.
pub const SPEED_ZERO_AFTER: Duration = Duration::from_secs(10);

/// Slack allowed when comparing a confidence against a threshold.
pub const CONFIDENCE_TOLERANCE: f32 = 1e-6;

/// Weighted template confidence, clamped to [0, 1].
///
/// Summed in f64 so exact fractional inputs land on their true value.
pub fn template_confidence(structural: f32, content: f32, field_match_rate: f32) -> f32 {
    let sum = f64::from(STRUCTURAL_WEIGHT) * f64::from(structural)
        + f64::from(CONTENT_WEIGHT) * f64::from(content)
        + f64::from(FIELD_MATCH_WEIGHT) * f64::from(field_match_rate);
    sum.clamp(0.0, 1.0) as f32
}

/// Selection bound is inclusive, within [`CONFIDENCE_TOLERANCE`].
pub fn meets_threshold(confidence: f32, threshold: f32) -> bool {
    confidence + CONFIDENCE_TOLERANCE >= threshold
}

/// Map a verdict from a composite score.
pub fn verdict_for(composite_score: f32) -> Verdict {
    if composite_score >= PRODUCTION_READY_MIN {
        Verdict::ProductionReady
    } else if composite_score >= USABLE_MIN {
        Verdict::Usable
    } else {
        Verdict::NeedsImprovement
    }
}

/// Linear speed score: 1.0 for instant processing, 0.0 at [`SPEED_ZERO_AFTER`] or later.
pub fn speed_score(elapsed: Duration) -> f32 {
    let ratio = elapsed.as_secs_f32() / SPEED_ZERO_AFTER.as_secs_f32();
    (1.0 - ratio).clamp(0.0, 1.0)
}

/// Inputs measured outside the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityInputs {
    /// Whether the caller managed to write its outputs (0.0 - 1.0).
    pub output_generation_success: f32,
    /// Caller's timing score (0.0 - 1.0).
    pub processing_speed_score: f32,
}

impl Default for QualityInputs {
    fn default() -> Self {
        Self {
            output_generation_success: 1.0,
            processing_speed_score: 1.0,
        }
    }
}

/// Computes the quality report of a reconciled field set.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    config: ScoringConfig,
}

impl QualityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score the final fields against the selected template, if any.
    pub fn score(
        &self,
        fields: &FieldSet,
        template_result: &TemplateMatchResult,
        template: Option<&Template>,
        inputs: QualityInputs,
    ) -> QualityReport {
        let essential = self.essential_fields(template);
        let missing_required: Vec<String> = essential
            .iter()
            .filter(|name| !fields.get(name).is_some_and(|f| f.has_value()))
            .cloned()
            .collect();

        let essential_field_rate = if essential.is_empty() {
            1.0
        } else {
            (essential.len() - missing_required.len()) as f32 / essential.len() as f32
        };

        let bbox_accuracy = if fields.is_empty() {
            0.0
        } else {
            fields.iter().filter(|f| f.bbox.is_some()).count() as f32 / fields.len() as f32
        };

        let template_confidence = if template_result.is_fallback() {
            0.0
        } else {
            template_result.confidence.clamp(0.0, 1.0)
        };

        let mut report = QualityReport {
            template_confidence,
            essential_field_rate,
            bbox_accuracy,
            composite_score: 0.0,
            verdict: Verdict::NeedsImprovement,
            missing_required,
        };
        self.rescore(&mut report, inputs);
        report
    }

    /// Recompute the composite score and verdict of a report from new caller inputs.
    ///
    /// Callers that time the whole annotation use this once the run is over.
    pub fn rescore(&self, report: &mut QualityReport, inputs: QualityInputs) {
        let mut composite_score = self.composite(
            report.template_confidence,
            report.essential_field_rate,
            report.bbox_accuracy,
            inputs,
        );

        if report.essential_field_rate < ESSENTIAL_GATE {
            composite_score = composite_score.min(GATED_SCORE_CEILING);
        }

        report.composite_score = composite_score;
        report.verdict = verdict_for(composite_score);

        debug!(
            "Quality: template {:.2}, essential {:.2}, bbox {:.2}, composite {:.1} ({})",
            report.template_confidence,
            report.essential_field_rate,
            report.bbox_accuracy,
            report.composite_score,
            report.verdict
        );
    }

    fn essential_fields(&self, template: Option<&Template>) -> Vec<String> {
        match template {
            Some(template) => template.required_fields().map(|f| f.name.clone()).collect(),
            None => match &self.config.essential_field_overrides {
                Some(overrides) => overrides.clone(),
                None => UNIVERSAL_MINIMUM.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    fn composite(
        &self,
        template_confidence: f32,
        essential_field_rate: f32,
        bbox_accuracy: f32,
        inputs: QualityInputs,
    ) -> f32 {
        let base = TEMPLATE_POINTS * template_confidence.clamp(0.0, 1.0)
            + ESSENTIAL_POINTS * essential_field_rate.clamp(0.0, 1.0)
            + OUTPUT_POINTS * inputs.output_generation_success.clamp(0.0, 1.0)
            + SPEED_POINTS * inputs.processing_speed_score.clamp(0.0, 1.0);

        let score = if self.config.include_bbox_in_composite {
            base * (100.0 - BBOX_POINTS) / 100.0 + BBOX_POINTS * bbox_accuracy.clamp(0.0, 1.0)
        } else {
            base
        };

        score.clamp(0.0, 100.0)
    }
}
