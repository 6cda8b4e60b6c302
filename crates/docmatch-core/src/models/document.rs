//! Normalized document model handed over by the parsing collaborator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

/// Axis-aligned bounding box of a block on a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// 1-based page number.
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, page: u32) -> Self {
        Self { x1, y1, x2, y2, page }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Vertical center of the box.
    pub fn center_y(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }

    /// Check if this box overlaps another one on the same page.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.page == other.page
            && self.x1 < other.x2
            && self.x2 > other.x1
            && self.y1 < other.y2
            && self.y2 > other.y1
    }

    /// Intersection over union with another box. Boxes on different pages never overlap.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        if self.page != other.page {
            return 0.0;
        }

        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    fn check(&self) -> Result<(), String> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err("non-finite coordinate".to_string());
        }
        if self.x2 < self.x1 || self.y2 < self.y1 {
            return Err(format!(
                "inverted box ({}, {}) -> ({}, {})",
                self.x1, self.y1, self.x2, self.y2
            ));
        }
        if self.page == 0 {
            return Err("page numbers start at 1".to_string());
        }
        Ok(())
    }
}

/// Layout role of a block, as reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    #[default]
    Paragraph,
    Title,
    Heading,
    TableCell,
    Header,
    Footer,
}

/// One text block in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub text: String,

    /// Section titles from the document root down to this block.
    #[serde(default)]
    pub section_path: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,

    #[serde(default)]
    pub kind: BlockKind,
}

impl Block {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            section_path: Vec::new(),
            bbox: None,
            kind: BlockKind::Paragraph,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_section_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.section_path = path.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_kind(mut self, kind: BlockKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A normalized document: ordered blocks plus a coarse type hint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: String,

    /// Original file name, used for type detection when no hint is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type_hint: Option<String>,

    pub blocks: Vec<Block>,

    /// Metadata reported by the parser (author, document number, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            ..Default::default()
        }
    }

    pub fn with_type_hint(mut self, hint: impl Into<String>) -> Self {
        self.document_type_hint = Some(hint.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Parse a document from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the input contract: at least one block, consistent bounding boxes.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.blocks.is_empty() {
            return Err(DocumentError::EmptyBlocks);
        }

        for (index, block) in self.blocks.iter().enumerate() {
            if let Some(bbox) = &block.bbox {
                bbox.check()
                    .map_err(|reason| DocumentError::InvalidBbox { index, reason })?;
            }
        }

        Ok(())
    }

    /// Distinct section titles in first-seen order.
    pub fn section_titles(&self) -> Vec<&str> {
        let mut titles: Vec<&str> = Vec::new();
        for block in &self.blocks {
            for title in &block.section_path {
                if !titles.contains(&title.as_str()) {
                    titles.push(title);
                }
            }
        }
        titles
    }

    /// Whether any block carries a bounding box.
    pub fn has_layout(&self) -> bool {
        self.blocks.iter().any(|b| b.bbox.is_some())
    }

    /// Lowest y2 over all boxes, used to normalize vertical distances.
    pub fn vertical_extent(&self) -> f32 {
        self.blocks
            .iter()
            .filter_map(|b| b.bbox.as_ref())
            .map(|b| b.y2)
            .fold(0.0f32, f32::max)
            .max(1.0)
    }

    /// Build the joined text used by pattern matching.
    pub fn text_index(&self) -> TextIndex {
        TextIndex::build(&self.blocks)
    }
}

/// Concatenated document text with a map from byte offsets back to blocks.
#[derive(Debug, Clone)]
pub struct TextIndex {
    text: String,
    /// (start, end, block index) per non-empty block, in order.
    spans: Vec<(usize, usize, usize)>,
}

impl TextIndex {
    fn build(blocks: &[Block]) -> Self {
        let mut text = String::new();
        let mut spans = Vec::with_capacity(blocks.len());

        for (index, block) in blocks.iter().enumerate() {
            let normalized = normalize_text(&block.text);
            if normalized.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            let start = text.len();
            text.push_str(&normalized);
            spans.push((start, text.len(), index));
        }

        Self { text, spans }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Index of the block containing the given byte offset.
    pub fn block_at(&self, offset: usize) -> Option<usize> {
        self.locate(offset).map(|(index, _)| index)
    }

    /// Block index and block-local offset of a byte offset.
    pub fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        self.spans
            .iter()
            .find(|(start, end, _)| offset >= *start && offset <= *end)
            .map(|(start, _, index)| (*index, offset - start))
    }

    /// Block-local span of a byte range, if it stays inside one block.
    pub fn span(&self, start: usize, end: usize) -> Option<TextSpan> {
        let (block, local_start) = self.locate(start)?;
        let (end_block, local_end) = self.locate(end)?;
        (block == end_block).then(|| TextSpan::new(block, local_start, local_end))
    }
}

/// A byte range of one block's normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub block: usize,
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(block: usize, start: usize, end: usize) -> Self {
        Self { block, start, end }
    }

    /// The whole text of a block.
    pub fn block(block: usize, text: &str) -> Self {
        Self::new(block, 0, text.len())
    }

    pub fn overlaps(&self, other: &TextSpan) -> bool {
        self.block == other.block && self.start < other.end && other.start < self.end
    }
}

/// Trim a block and collapse runs of horizontal whitespace into single spaces.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let mut first = true;
        for word in line.split(|c: char| c == ' ' || c == '\t' || c == '\u{00a0}') {
            if word.is_empty() {
                continue;
            }
            if !first {
                out.push(' ');
            }
            out.push_str(word);
            first = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_document() {
        let doc = Document::new(Vec::new());
        assert_eq!(doc.validate(), Err(DocumentError::EmptyBlocks));
    }

    #[test]
    fn test_validate_rejects_inverted_bbox() {
        let doc = Document::new(vec![
            Block::new("ok"),
            Block::new("bad").with_bbox(BoundingBox::new(10.0, 50.0, 5.0, 60.0, 1)),
        ]);

        match doc.validate() {
            Err(DocumentError::InvalidBbox { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_page_zero() {
        let doc = Document::new(vec![
            Block::new("x").with_bbox(BoundingBox::new(0.0, 0.0, 5.0, 5.0, 0)),
        ]);
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 1);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0, 1);
        let c = BoundingBox::new(5.0, 0.0, 15.0, 10.0, 2);

        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(a.iou(&c), 0.0);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_text_index_maps_offsets_to_blocks() {
        let doc = Document::new(vec![
            Block::new("  first   block "),
            Block::new(""),
            Block::new("second"),
        ]);
        let index = doc.text_index();

        assert_eq!(index.text(), "first block\nsecond");
        assert_eq!(index.block_at(0), Some(0));
        assert_eq!(index.block_at(12), Some(2));
        assert_eq!(index.locate(14), Some((2, 2)));
        assert_eq!(index.span(12, 18), Some(TextSpan::new(2, 0, 6)));
        assert_eq!(index.span(6, 14), None);
    }

    #[test]
    fn test_text_spans_overlap_within_one_block() {
        let a = TextSpan::new(0, 0, 10);
        assert!(a.overlaps(&TextSpan::new(0, 9, 12)));
        assert!(!a.overlaps(&TextSpan::new(0, 10, 12)));
        assert!(!a.overlaps(&TextSpan::new(1, 0, 10)));
    }

    #[test]
    fn test_section_titles_are_distinct() {
        let doc = Document::new(vec![
            Block::new("a").with_section_path(["1. 목적"]),
            Block::new("b").with_section_path(["1. 목적", "1.1 범위"]),
        ]);
        assert_eq!(doc.section_titles(), vec!["1. 목적", "1.1 범위"]);
    }
}
