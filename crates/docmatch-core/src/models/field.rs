//! Field matches and the result records produced for each document.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::document::{BoundingBox, TextSpan};

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Text,
    Code,
    Date,
    Number,
    Version,
    Title,
    Header,
    Footer,
    TableData,
    ProcessStep,
}

/// How much a field matters to a consumer of the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Importance {
    Critical,
    High,
    Medium,
    Low,
}

/// Strategy that produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    Positional,
    Inferred,
}

/// Where a final field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Template,
    Auto,
    Hybrid,
}

/// A scored value for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field_name: String,
    pub value: String,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    pub method: MatchMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub source: FieldSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    /// Hierarchy level for section heading fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    /// Text the value was read from, when known.
    #[serde(skip)]
    pub span: Option<TextSpan>,
}

impl FieldMatch {
    pub fn new(
        field_name: impl Into<String>,
        value: impl Into<String>,
        confidence: f32,
        method: MatchMethod,
        source: FieldSource,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            method,
            bbox: None,
            source,
            field_type: None,
            importance: None,
            level: None,
            span: None,
        }
    }

    pub fn with_bbox(mut self, bbox: Option<BoundingBox>) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn with_type(mut self, field_type: FieldType, importance: Importance) -> Self {
        self.field_type = Some(field_type);
        self.importance = Some(importance);
        self
    }

    pub fn with_span(mut self, span: Option<TextSpan>) -> Self {
        self.span = span;
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn has_value(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

/// Field matches keyed by name, kept in insertion order.
///
/// Serialized as a JSON object whose key order is the insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    fields: Vec<FieldMatch>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldMatch> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldMatch> {
        self.fields.iter_mut().find(|f| f.field_name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert a field, replacing an existing one with the same name in place.
    pub fn insert(&mut self, field: FieldMatch) {
        match self.get_mut(&field.field_name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldMatch> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.field_name.as_str())
    }
}

impl FromIterator<FieldMatch> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldMatch>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        for field in iter {
            set.insert(field);
        }
        set
    }
}

impl IntoIterator for FieldSet {
    type Item = FieldMatch;
    type IntoIter = std::vec::IntoIter<FieldMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a FieldMatch;
    type IntoIter = std::slice::Iter<'a, FieldMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.field_name, field)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldSetVisitor;

        impl<'de> Visitor<'de> for FieldSetVisitor {
            type Value = FieldSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field name to field match")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldSet, A::Error> {
                let mut set = FieldSet::new();
                while let Some((name, mut field)) = access.next_entry::<String, FieldMatch>()? {
                    field.field_name = name;
                    set.insert(field);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(FieldSetVisitor)
    }
}

/// How the template result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Exact, positional and fuzzy matching per field, best template picked.
    Combined,
    /// Template chosen by configuration.
    Forced,
    /// No template reached the threshold.
    AutoOnly,
}

/// Outcome of template selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMatchResult {
    /// `None` means fallback to auto-detection only.
    pub template_id: Option<String>,
    pub confidence: f32,
    pub strategy_used: MatchStrategy,
    pub matched_fields: FieldSet,
}

impl TemplateMatchResult {
    /// The no-template terminal state.
    pub fn fallback() -> Self {
        Self {
            template_id: None,
            confidence: 0.0,
            strategy_used: MatchStrategy::AutoOnly,
            matched_fields: FieldSet::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.template_id.is_none()
    }
}

/// Categorical quality verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    ProductionReady,
    Usable,
    NeedsImprovement,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::ProductionReady => "production_ready",
            Verdict::Usable => "usable",
            Verdict::NeedsImprovement => "needs_improvement",
        };
        f.write_str(s)
    }
}

/// Quality summary of one processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub template_confidence: f32,
    pub essential_field_rate: f32,
    pub bbox_accuracy: f32,
    /// Composite score on a 0 - 100 scale.
    pub composite_score: f32,
    pub verdict: Verdict,
    /// Essential fields absent from the final set.
    #[serde(default)]
    pub missing_required: Vec<String>,
}

/// The externally visible output of the engine for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResult {
    #[serde(default)]
    pub document_id: String,
    pub template_id: Option<String>,
    pub fields: FieldSet,
    pub quality: QualityReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
