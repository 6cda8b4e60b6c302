//! Metadata detectors: document number, dates, revision, author and title.

use regex::Regex;

use crate::models::document::BlockKind;
use crate::template::patterns::{patterns_for, TITLE_LABELED, TITLE_STANDARD};
use crate::template::selector::{metadata_keys, METADATA_CONFIDENCE};

use super::{
    Candidate, Claim, DetectionInput, Detector, DetectorKind, FieldKey, LABELED_CONFIDENCE,
    TITLE_CONFIDENCE, UNLABELED_CONFIDENCE,
};

/// Proposes values for one metadata field, best first.
///
/// Document metadata under the field's name or an alias comes first. Then
/// the pattern library entries for the detector's field type follow; the first
/// entry of each type is its labeled form.
pub struct MetadataDetector {
    kind: DetectorKind,
    name: &'static str,
    patterns: Vec<&'static Regex>,
}

impl MetadataDetector {
    pub fn new(kind: DetectorKind, name: &'static str) -> Self {
        let (field_type, _) = kind.profile();
        Self {
            kind,
            name,
            patterns: patterns_for(field_type),
        }
    }
}

impl Detector for MetadataDetector {
    fn kind(&self) -> DetectorKind {
        self.kind
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Candidate> {
        let key = || FieldKey::Named(self.name.to_string());
        let mut found: Vec<Candidate> = input
            .metadata(&metadata_keys(self.name))
            .map(|value| Candidate::unclaimed(key(), value, METADATA_CONFIDENCE))
            .into_iter()
            .collect();

        for (rank, re) in self.patterns.iter().enumerate() {
            let confidence = if rank == 0 {
                LABELED_CONFIDENCE
            } else {
                UNLABELED_CONFIDENCE
            };

            for (block, text) in input.blocks() {
                found.extend(
                    captures(re, block, text)
                        .map(|(value, claim)| Candidate::new(key(), value, confidence, claim)),
                );
            }
        }
        found
    }
}

/// Document title, best first: metadata title, labeled title, the title
/// block, then standard-form title lines.
pub struct TitleDetector;

impl Detector for TitleDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Title
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Candidate> {
        let key = || FieldKey::Named("title".to_string());
        let mut found: Vec<Candidate> = input
            .metadata(&["title"])
            .map(|value| Candidate::unclaimed(key(), value, METADATA_CONFIDENCE))
            .into_iter()
            .collect();

        for (block, text) in input.blocks() {
            found.extend(
                captures(&TITLE_LABELED, block, text)
                    .map(|(value, claim)| Candidate::new(key(), value, LABELED_CONFIDENCE, claim)),
            );
        }

        let title_block = input
            .blocks()
            .find(|(block, _)| input.kind(*block) == BlockKind::Title);
        if let Some((block, text)) = title_block {
            found.push(Candidate::new(key(), text, TITLE_CONFIDENCE, Claim::block(block, text)));
        }

        for (block, text) in input.blocks() {
            found.extend(
                captures(&TITLE_STANDARD, block, text)
                    .map(|(value, claim)| Candidate::new(key(), value, TITLE_CONFIDENCE, claim)),
            );
        }

        found
    }
}

/// Non-blank group-1 captures of `re` in a block, with their claims.
fn captures<'t>(
    re: &'t Regex,
    block: usize,
    text: &'t str,
) -> impl Iterator<Item = (String, Claim)> + 't {
    re.captures_iter(text).filter_map(move |caps| {
        let group = caps.get(1)?;
        let value = group.as_str().trim();
        if value.is_empty() {
            return None;
        }
        Some((value.to_string(), Claim::new(block, group.start(), group.end())))
    })
}
