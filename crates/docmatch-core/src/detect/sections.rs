//! Numbered section headings such as `4.1 적용 범위`.

use crate::template::patterns::SECTION_HEADING;

use super::{Candidate, Claim, DetectionInput, Detector, DetectorKind, FieldKey, SECTION_CONFIDENCE};

/// Longer lines are body text, not headings.
const MAX_HEADING_CHARS: usize = 80;

/// Emits `section_<n>_<m>...` fields with their hierarchy level.
pub struct SectionDetector;

impl Detector for SectionDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Section
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Candidate> {
        let mut found = Vec::new();

        for (block, text) in input.blocks() {
            let mut offset = 0;
            for line in text.split('\n') {
                let start = offset;
                offset += line.len() + 1;

                if line.chars().count() > MAX_HEADING_CHARS {
                    continue;
                }
                let Some(caps) = SECTION_HEADING.captures(line) else {
                    continue;
                };

                let number = &caps[1];
                let title = caps[2].trim();
                let level = number.split('.').count() as u8;

                let mut candidate = Candidate::new(
                    FieldKey::Named(format!("section_{}", number.replace('.', "_"))),
                    title,
                    SECTION_CONFIDENCE,
                    Claim::new(block, start, start + line.len()),
                );
                candidate.level = Some(level);
                found.push(candidate);
            }
        }

        found
    }
}
