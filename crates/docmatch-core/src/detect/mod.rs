//! Template-independent field detection.
//!
//! Detectors run in a fixed order over the normalized blocks. A detector's
//! candidate is dropped when it overlaps text already claimed by an earlier
//! detector, so the first detector to claim a span wins. Values taken from
//! document metadata claim no text.

mod metadata;
mod page_areas;
mod process_flow;
mod sections;
mod tables;

pub use metadata::{MetadataDetector, TitleDetector};
pub use page_areas::PageAreaDetector;
pub use process_flow::ProcessFlowDetector;
pub use sections::SectionDetector;
pub use tables::TableDetector;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::document::{normalize_text, BlockKind, Document, TextSpan};
use crate::models::field::{FieldMatch, FieldSource, FieldType, Importance, MatchMethod};

/// Confidence of a value found next to its label.
pub const LABELED_CONFIDENCE: f32 = 0.95;
/// Confidence of a value recognized by shape alone.
pub const UNLABELED_CONFIDENCE: f32 = 0.8;
pub const TITLE_CONFIDENCE: f32 = 0.85;
pub const SECTION_CONFIDENCE: f32 = 0.85;
pub const PROCESS_STEP_CONFIDENCE: f32 = 0.9;
pub const TABLE_CONFIDENCE: f32 = 0.7;
pub const PAGE_AREA_CONFIDENCE: f32 = 0.8;

/// Identity of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    DocumentNumber,
    EffectiveDate,
    Revision,
    Author,
    Title,
    Section,
    ProcessFlow,
    Table,
    PageHeader,
    PageFooter,
}

impl DetectorKind {
    /// Field type and importance of everything this detector emits.
    pub const fn profile(self) -> (FieldType, Importance) {
        match self {
            DetectorKind::DocumentNumber => (FieldType::Code, Importance::Critical),
            DetectorKind::EffectiveDate => (FieldType::Date, Importance::Critical),
            DetectorKind::Revision => (FieldType::Version, Importance::High),
            DetectorKind::Author => (FieldType::Text, Importance::Medium),
            DetectorKind::Title => (FieldType::Title, Importance::Critical),
            DetectorKind::Section => (FieldType::Header, Importance::Medium),
            DetectorKind::ProcessFlow => (FieldType::ProcessStep, Importance::High),
            DetectorKind::Table => (FieldType::TableData, Importance::Low),
            DetectorKind::PageHeader => (FieldType::Header, Importance::Low),
            DetectorKind::PageFooter => (FieldType::Footer, Importance::Low),
        }
    }
}

/// Name of a detected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKey {
    Named(String),
    /// Numbered `<prefix>_<n>` in emission order, starting at 1.
    Numbered(&'static str),
}

/// A span of block text claimed by a candidate.
pub type Claim = TextSpan;

/// A value proposed by a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub key: FieldKey,
    pub value: String,
    pub confidence: f32,
    /// First claim's block supplies the bounding box.
    pub claims: Vec<Claim>,
    pub level: Option<u8>,
}

impl Candidate {
    pub fn new(key: FieldKey, value: impl Into<String>, confidence: f32, claim: Claim) -> Self {
        Self {
            key,
            value: value.into(),
            confidence,
            claims: vec![claim],
            level: None,
        }
    }

    /// A value that does not come from the block text.
    pub fn unclaimed(key: FieldKey, value: impl Into<String>, confidence: f32) -> Self {
        Self {
            key,
            value: value.into(),
            confidence,
            claims: Vec::new(),
            level: None,
        }
    }
}

/// Normalized view of a document handed to detectors.
#[derive(Debug)]
pub struct DetectionInput<'a> {
    document: &'a Document,
    texts: Vec<String>,
}

impl<'a> DetectionInput<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self {
            document,
            texts: document.blocks.iter().map(|b| normalize_text(&b.text)).collect(),
        }
    }

    /// Non-empty normalized blocks in reading order.
    pub fn blocks(&self) -> impl Iterator<Item = (usize, &str)> {
        self.texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_empty())
            .map(|(i, t)| (i, t.as_str()))
    }

    pub fn kind(&self, block: usize) -> BlockKind {
        self.document.blocks[block].kind
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn text(&self, block: usize) -> &str {
        &self.texts[block]
    }

    /// First non-blank document metadata value among `keys`.
    pub fn metadata(&self, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .filter_map(|key| self.document.metadata.get(*key))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }
}

/// One family of heuristic field detection.
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Candidates in document order.
    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Candidate>;
}

/// Runs the detector library over a document.
pub struct AutoDetector {
    detectors: Vec<Box<dyn Detector>>,
}

impl std::fmt::Debug for AutoDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoDetector")
            .field("detectors", &self.kinds())
            .finish()
    }
}

impl Default for AutoDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoDetector {
    /// The standard detector library, in claim priority order.
    pub fn new() -> Self {
        Self::with_detectors(vec![
            Box::new(MetadataDetector::new(DetectorKind::DocumentNumber, "document_number")),
            Box::new(MetadataDetector::new(DetectorKind::EffectiveDate, "effective_date")),
            Box::new(MetadataDetector::new(DetectorKind::Revision, "revision")),
            Box::new(MetadataDetector::new(DetectorKind::Author, "author")),
            Box::new(TitleDetector),
            Box::new(SectionDetector),
            Box::new(ProcessFlowDetector),
            Box::new(TableDetector),
            Box::new(PageAreaDetector::header()),
            Box::new(PageAreaDetector::footer()),
        ])
    }

    pub fn with_detectors(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    pub fn kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// Detect fields in the document. Never fails.
    pub fn detect(&self, document: &Document) -> Vec<FieldMatch> {
        let input = DetectionInput::new(document);
        let mut claimed: Vec<Claim> = Vec::new();
        let mut names: HashSet<String> = HashSet::new();
        let mut counters: HashMap<&'static str, usize> = HashMap::new();
        let mut fields = Vec::new();

        for detector in &self.detectors {
            let kind = detector.kind();
            let (field_type, importance) = kind.profile();

            for candidate in detector.detect(&input) {
                if candidate.value.trim().is_empty() {
                    continue;
                }
                if candidate
                    .claims
                    .iter()
                    .any(|c| claimed.iter().any(|taken| taken.overlaps(c)))
                {
                    debug!("{:?}: dropping {:?}, text already claimed", kind, candidate.value);
                    continue;
                }

                let name = match &candidate.key {
                    FieldKey::Named(name) => {
                        if names.contains(name) {
                            continue;
                        }
                        name.clone()
                    }
                    FieldKey::Numbered(prefix) => {
                        let n = counters.entry(prefix).or_insert(0);
                        *n += 1;
                        format!("{}_{}", prefix, n)
                    }
                };

                let first_claim = candidate.claims.first().copied();
                let bbox = first_claim.and_then(|c| document.blocks[c.block].bbox);

                let mut field = FieldMatch::new(
                    name.clone(),
                    candidate.value.trim(),
                    candidate.confidence,
                    MatchMethod::Inferred,
                    FieldSource::Auto,
                )
                .with_bbox(bbox)
                .with_span(first_claim)
                .with_type(field_type, importance);
                field.level = candidate.level;

                claimed.extend(candidate.claims.iter().copied());
                names.insert(name);
                fields.push(field);
            }
        }

        debug!("Auto-detected {} fields", fields.len());
        fields
    }
}
