//! Load-time validation and compilation of templates.
//!
//! A template that passes [`compile`] can be matched without any further
//! error paths: every pattern is a compiled [`Regex`] and every invariant of
//! the field definitions has been checked.

use regex::Regex;

use crate::error::TemplateError;
use crate::models::template::{ExtractionMethod, FieldDefinition, Template, ValidationRule};

use super::patterns::{build_regex, parse_date};

/// A template whose patterns and rules are compiled.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    template: Template,
    fields: Vec<CompiledField>,
    section_patterns: Vec<Regex>,
}

impl CompiledTemplate {
    pub fn id(&self) -> &str {
        &self.template.id
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[CompiledField] {
        &self.fields
    }

    pub fn section_patterns(&self) -> &[Regex] {
        &self.section_patterns
    }

    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.definition.name == name)
    }

    /// Whether this template applies to the given document type.
    pub fn accepts_type(&self, document_type: &str) -> bool {
        let own = self.template.document_type.trim();
        own == "*" || own.eq_ignore_ascii_case(document_type.trim())
    }
}

/// A field definition with compiled patterns.
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub definition: FieldDefinition,
    pub patterns: Vec<Regex>,
    pub rule: Option<CompiledRule>,
}

impl CompiledField {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Check a candidate value against the field's validation rule.
    pub fn accepts(&self, value: &str) -> bool {
        self.rule.as_ref().is_none_or(|rule| rule.check(value))
    }
}

/// Validation rule ready to evaluate.
#[derive(Debug, Clone)]
pub enum CompiledRule {
    NonEmpty,
    MinLength(usize),
    MaxLength(usize),
    Matches(Regex),
    Date,
    OneOf(Vec<String>),
}

impl CompiledRule {
    pub fn check(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            CompiledRule::NonEmpty => !value.is_empty(),
            CompiledRule::MinLength(n) => value.chars().count() >= *n,
            CompiledRule::MaxLength(n) => value.chars().count() <= *n,
            CompiledRule::Matches(re) => re.is_match(value),
            CompiledRule::Date => parse_date(value).is_some(),
            CompiledRule::OneOf(options) => options.iter().any(|o| o.eq_ignore_ascii_case(value)),
        }
    }
}

/// Validate and compile a template.
pub fn compile(template: Template) -> Result<CompiledTemplate, TemplateError> {
    if template.id.trim().is_empty() {
        return Err(TemplateError::EmptyId);
    }

    let template_id = template.id.clone();
    let mut fields: Vec<CompiledField> = Vec::with_capacity(template.elements.len());

    for (index, definition) in template.elements.iter().enumerate() {
        let name = definition.name.trim();
        if name.is_empty() {
            return Err(TemplateError::EmptyFieldName {
                template_id,
                index,
            });
        }
        if fields.iter().any(|f| f.definition.name == definition.name) {
            return Err(TemplateError::DuplicateField {
                template_id,
                field: definition.name.clone(),
            });
        }

        fields.push(compile_field(&template_id, definition)?);
    }

    let section_patterns = template
        .section_patterns
        .iter()
        .map(|pattern| {
            build_regex(pattern).map_err(|source| TemplateError::InvalidPattern {
                template_id: template_id.clone(),
                field: "<section_patterns>".to_string(),
                pattern: pattern.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledTemplate {
        template,
        fields,
        section_patterns,
    })
}

fn compile_field(
    template_id: &str,
    definition: &FieldDefinition,
) -> Result<CompiledField, TemplateError> {
    let threshold = definition.confidence_threshold;
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(TemplateError::InvalidThreshold {
            template_id: template_id.to_string(),
            field: definition.name.clone(),
            value: threshold,
        });
    }

    if definition.extraction_method == ExtractionMethod::Regex && definition.patterns.is_empty() {
        return Err(TemplateError::MissingPatterns {
            template_id: template_id.to_string(),
            field: definition.name.clone(),
        });
    }

    match (&definition.position_hint, definition.extraction_method) {
        (None, ExtractionMethod::Position) => {
            return Err(TemplateError::InvalidPositionHint {
                template_id: template_id.to_string(),
                field: definition.name.clone(),
            });
        }
        (Some(hint), _) => {
            let valid = match hint.resolved_range() {
                Some((min, max)) => min.is_finite() && max.is_finite() && min <= max,
                None => false,
            };
            if !valid {
                return Err(TemplateError::InvalidPositionHint {
                    template_id: template_id.to_string(),
                    field: definition.name.clone(),
                });
            }
        }
        (None, _) => {}
    }

    let invalid_pattern = |pattern: &str, source: regex::Error| TemplateError::InvalidPattern {
        template_id: template_id.to_string(),
        field: definition.name.clone(),
        pattern: pattern.to_string(),
        source,
    };

    let patterns = definition
        .patterns
        .iter()
        .map(|p| build_regex(p).map_err(|e| invalid_pattern(p, e)))
        .collect::<Result<Vec<_>, _>>()?;

    let rule = match &definition.validation_rule {
        None => None,
        Some(ValidationRule::NonEmpty) => Some(CompiledRule::NonEmpty),
        Some(ValidationRule::MinLength(n)) => Some(CompiledRule::MinLength(*n)),
        Some(ValidationRule::MaxLength(n)) => Some(CompiledRule::MaxLength(*n)),
        Some(ValidationRule::Matches(p)) => Some(CompiledRule::Matches(
            build_regex(p).map_err(|e| invalid_pattern(p, e))?,
        )),
        Some(ValidationRule::Date) => Some(CompiledRule::Date),
        Some(ValidationRule::OneOf(options)) => Some(CompiledRule::OneOf(options.clone())),
    };

    Ok(CompiledField {
        definition: definition.clone(),
        patterns,
        rule,
    })
}
