//! Running page headers and footers.

use crate::models::document::BlockKind;

use super::{Candidate, Claim, DetectionInput, Detector, DetectorKind, FieldKey, PAGE_AREA_CONFIDENCE};

pub const HEADER_PREFIX: &str = "header";
pub const FOOTER_PREFIX: &str = "footer";

/// Shortest page area text, in characters, worth reporting.
const MIN_CHARS: usize = 4;

/// Emits `header_<n>` or `footer_<n>` for each header or footer block.
pub struct PageAreaDetector {
    kind: DetectorKind,
    block_kind: BlockKind,
    prefix: &'static str,
}

impl PageAreaDetector {
    pub fn header() -> Self {
        Self {
            kind: DetectorKind::PageHeader,
            block_kind: BlockKind::Header,
            prefix: HEADER_PREFIX,
        }
    }

    pub fn footer() -> Self {
        Self {
            kind: DetectorKind::PageFooter,
            block_kind: BlockKind::Footer,
            prefix: FOOTER_PREFIX,
        }
    }
}

impl Detector for PageAreaDetector {
    fn kind(&self) -> DetectorKind {
        self.kind
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Candidate> {
        input
            .blocks()
            .filter(|(block, _)| input.kind(*block) == self.block_kind)
            .filter(|(_, text)| text.chars().count() >= MIN_CHARS)
            .map(|(block, text)| {
                Candidate::new(
                    FieldKey::Numbered(self.prefix),
                    text,
                    PAGE_AREA_CONFIDENCE,
                    Claim::block(block, text),
                )
            })
            .collect()
    }
}
