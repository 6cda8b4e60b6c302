//! Declarative template definitions as delivered by the template source.
//!
//! These are plain records. They are checked and compiled by
//! [`crate::template::compile`] before they can be matched.

use serde::{Deserialize, Serialize};

use super::field::{FieldType, Importance};

/// Default per-field confidence threshold.
pub const DEFAULT_FIELD_THRESHOLD: f32 = 0.7;

/// A set of field extraction rules for one document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Document type this template applies to. `*` applies to any document.
    pub document_type: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// Section/heading patterns expected in the document's section paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub section_patterns: Vec<String>,

    pub elements: Vec<FieldDefinition>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Template {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        document_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            document_type: document_type.into(),
            version: default_version(),
            section_patterns: Vec::new(),
            elements: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.elements.push(field);
        self
    }

    pub fn with_section_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.section_patterns.push(pattern.into());
        self
    }

    /// Parse a template from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.elements.iter().filter(|f| f.required)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.elements.iter().find(|f| f.name == name)
    }
}

/// Kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// Appears once with a stable shape (document number, date).
    Fixed,
    /// Free text whose content varies per document.
    Variable,
    /// Every occurrence is collected.
    MultiValue,
    /// Read from table cells.
    Table,
}

/// How a field is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Regex,
    Position,
    Table,
}

/// Expected shape of a value, used by the fuzzy fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    Date,
    Code,
    Number,
    Version,
}

/// Named page regions with a typical vertical range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Header,
    Title,
    Content,
    Footer,
}

impl Location {
    /// Typical vertical range in page points.
    pub fn y_range(&self) -> (f32, f32) {
        match self {
            Location::Header => (0.0, 150.0),
            Location::Title => (100.0, 250.0),
            Location::Content => (200.0, 800.0),
            Location::Footer => (750.0, 850.0),
        }
    }
}

/// Where a field usually sits on the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typical_location: Option<Location>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_range: Option<(f32, f32)>,
}

impl PositionHint {
    pub fn at(location: Location) -> Self {
        Self {
            typical_location: Some(location),
            y_range: None,
        }
    }

    pub fn between(y_min: f32, y_max: f32) -> Self {
        Self {
            typical_location: None,
            y_range: Some((y_min, y_max)),
        }
    }

    /// Explicit range wins over the location's typical range.
    pub fn resolved_range(&self) -> Option<(f32, f32)> {
        self.y_range
            .or_else(|| self.typical_location.map(|l| l.y_range()))
    }
}

/// Predicate an extracted value must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ValidationRule {
    NonEmpty,
    MinLength(usize),
    MaxLength(usize),
    Matches(String),
    Date,
    OneOf(Vec<String>),
}

/// One field a template seeks to extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub element_type: ElementType,
    pub extraction_method: ExtractionMethod,

    /// Tried in order; the first productive pattern wins.
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_hint: Option<PositionHint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_rule: Option<ValidationRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_shape: Option<ValueShape>,

    /// Label texts that usually precede the value (fuzzy fallback).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
}

fn default_threshold() -> f32 {
    DEFAULT_FIELD_THRESHOLD
}

impl FieldDefinition {
    /// A fixed regex field with the given patterns.
    pub fn regex<I, S>(name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            element_type: ElementType::Fixed,
            extraction_method: ExtractionMethod::Regex,
            patterns: patterns.into_iter().map(Into::into).collect(),
            required: false,
            confidence_threshold: DEFAULT_FIELD_THRESHOLD,
            position_hint: None,
            validation_rule: None,
            value_shape: None,
            labels: Vec::new(),
            field_type: None,
            importance: None,
        }
    }

    /// A variable field located by position only.
    pub fn positional(name: impl Into<String>, hint: PositionHint) -> Self {
        Self {
            element_type: ElementType::Variable,
            extraction_method: ExtractionMethod::Position,
            position_hint: Some(hint),
            ..Self::regex(name, Vec::<String>::new())
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_position_hint(mut self, hint: PositionHint) -> Self {
        self.position_hint = Some(hint);
        self
    }

    pub fn with_shape(mut self, shape: ValueShape) -> Self {
        self.value_shape = Some(shape);
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validation(mut self, rule: ValidationRule) -> Self {
        self.validation_rule = Some(rule);
        self
    }

    pub fn with_element_type(mut self, element_type: ElementType) -> Self {
        self.element_type = element_type;
        self
    }

    pub fn with_field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Positional fields do not count towards content similarity.
    pub fn is_positional(&self) -> bool {
        self.extraction_method == ExtractionMethod::Position
    }
}
