//! Configuration structures for the annotation engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::scoring::{DEFAULT_OVERLAP_THRESHOLD, DEFAULT_TEMPLATE_THRESHOLD};

/// Main configuration for the docmatch engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Template selection and reconciliation.
    pub matching: MatchingConfig,

    /// Quality scoring.
    pub scoring: ScoringConfig,

    /// Where the calling layer loads templates from.
    pub templates: TemplateSourceConfig,
}

/// Template selection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum template confidence for selection (inclusive).
    pub template_confidence_threshold: f32,

    /// Skip selection and use this template.
    pub forced_template_id: Option<String>,

    /// Bounding box IoU above which template and auto fields conflict.
    pub overlap_threshold: f32,

    /// Match the fields of a template in parallel.
    pub parallel_fields: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            template_confidence_threshold: DEFAULT_TEMPLATE_THRESHOLD,
            forced_template_id: None,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            parallel_fields: true,
        }
    }
}

/// Quality scoring configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Essential fields to use when no template was selected.
    pub essential_field_overrides: Option<Vec<String>>,

    /// Fold bbox accuracy into the composite score.
    pub include_bbox_in_composite: bool,
}

/// Template source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSourceConfig {
    /// Directory of template JSON files.
    pub dir: PathBuf,
}

impl Default for TemplateSourceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("templates"),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), String> {
        let threshold = self.matching.template_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(format!(
                "matching.template_confidence_threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        let overlap = self.matching.overlap_threshold;
        if !(0.0..=1.0).contains(&overlap) {
            return Err(format!(
                "matching.overlap_threshold must be within [0, 1], got {}",
                overlap
            ));
        }
        Ok(())
    }
}
