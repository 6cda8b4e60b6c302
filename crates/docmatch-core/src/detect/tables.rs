//! Table data: runs of consecutive table-cell blocks.

use crate::models::document::BlockKind;
use crate::template::matcher::TABLE_CELL_SEPARATOR;

use super::{Candidate, Claim, DetectionInput, Detector, DetectorKind, FieldKey, TABLE_CONFIDENCE};

pub const TABLE_PREFIX: &str = "table";

/// Emits one `table_<n>` field per run of table cells.
pub struct TableDetector;

impl Detector for TableDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Table
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Candidate> {
        let mut found = Vec::new();
        let mut run: Vec<(usize, &str)> = Vec::new();

        for block in 0..input.len() {
            if input.kind(block) == BlockKind::TableCell {
                let text = input.text(block);
                if !text.is_empty() {
                    run.push((block, text));
                }
                continue;
            }
            flush(&mut run, &mut found);
        }
        flush(&mut run, &mut found);

        found
    }
}

fn flush(run: &mut Vec<(usize, &str)>, found: &mut Vec<Candidate>) {
    if run.is_empty() {
        return;
    }

    let value = run
        .iter()
        .map(|(_, text)| *text)
        .collect::<Vec<_>>()
        .join(TABLE_CELL_SEPARATOR);

    found.push(Candidate {
        key: FieldKey::Numbered(TABLE_PREFIX),
        value,
        confidence: TABLE_CONFIDENCE,
        claims: run.iter().map(|(block, text)| Claim::block(*block, text)).collect(),
        level: None,
    });
    run.clear();
}
