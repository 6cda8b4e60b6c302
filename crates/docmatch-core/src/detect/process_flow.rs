//! Ordered process steps introduced by ordinal markers (`①`, `(1)`, ...).

use crate::template::patterns::STEP_MARKER;

use super::{Candidate, Claim, DetectionInput, Detector, DetectorKind, FieldKey, PROCESS_STEP_CONFIDENCE};

pub const PROCESS_STEP_PREFIX: &str = "process_flow_step";

/// Emits one `process_flow_step_<n>` field per marker, in document order.
///
/// A step's value runs from its marker to the next marker in the same block,
/// or to the end of the block.
pub struct ProcessFlowDetector;

impl Detector for ProcessFlowDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ProcessFlow
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Candidate> {
        let mut found = Vec::new();

        for (block, text) in input.blocks() {
            let starts: Vec<usize> = STEP_MARKER.find_iter(text).map(|m| m.start()).collect();

            for (i, &start) in starts.iter().enumerate() {
                let end = starts.get(i + 1).copied().unwrap_or(text.len());
                let value = text[start..end].trim();

                found.push(Candidate::new(
                    FieldKey::Numbered(PROCESS_STEP_PREFIX),
                    value,
                    PROCESS_STEP_CONFIDENCE,
                    Claim::new(block, start, end),
                ));
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{Block, Document};

    #[test]
    fn test_parenthesized_markers() {
        let doc = Document::new(vec![Block::new("절차: (1) 준비 (2) 점검"), Block::new("(3) 보고")]);
        let values: Vec<String> = ProcessFlowDetector
            .detect(&DetectionInput::new(&doc))
            .into_iter()
            .map(|c| c.value)
            .collect();

        assert_eq!(values, vec!["(1) 준비", "(2) 점검", "(3) 보고"]);
    }

    #[test]
    fn test_text_before_first_marker_is_ignored() {
        let doc = Document::new(vec![Block::new("다음 순서로 ① 준비")]);
        let found = ProcessFlowDetector.detect(&DetectionInput::new(&doc));

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "① 준비");
        assert_eq!(found[0].key, FieldKey::Numbered(PROCESS_STEP_PREFIX));
    }
}
