//! Derive a new template from an annotated document.

use tracing::debug;

use crate::models::field::{AnnotationResult, FieldType, Importance};
use crate::models::template::{FieldDefinition, PositionHint, Template};

/// Build a template that re-extracts the fields of an annotation result.
///
/// Each extracted value becomes a literal pattern. Fields with a bounding box
/// get a position hint spanning it, critical fields are marked required and
/// leveled section headings become section patterns.
pub fn derive_template(
    result: &AnnotationResult,
    id: impl Into<String>,
    name: impl Into<String>,
    document_type: impl Into<String>,
) -> Template {
    let mut template = Template::new(id, name, document_type);
    template.description = match &result.template_id {
        Some(source) => format!("Derived from {} (template {})", result.document_id, source),
        None => format!("Derived from {}", result.document_id),
    };

    for field in result.fields.iter().filter(|f| f.has_value()) {
        let value = field.value.trim();

        if field.field_type == Some(FieldType::Header) && field.level.is_some() {
            template.section_patterns.push(regex::escape(value));
        }

        let mut definition = FieldDefinition::regex(&field.field_name, [regex::escape(value)]);
        definition.field_type = field.field_type;
        definition.importance = field.importance;
        definition.required = field.importance == Some(Importance::Critical);
        if let Some(bbox) = field.bbox {
            definition.position_hint = Some(PositionHint::between(bbox.y1, bbox.y2));
        }

        template.elements.push(definition);
    }

    debug!(
        "Derived template {} with {} fields",
        template.id,
        template.elements.len()
    );

    template
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::BoundingBox;
    use crate::models::field::{FieldMatch, FieldSet, FieldSource, MatchMethod, QualityReport, Verdict};
    use crate::template::compile::compile;

    fn result(fields: Vec<FieldMatch>) -> AnnotationResult {
        AnnotationResult {
            document_id: "TP-030".to_string(),
            template_id: None,
            fields: fields.into_iter().collect::<FieldSet>(),
            quality: QualityReport {
                template_confidence: 0.0,
                essential_field_rate: 1.0,
                bbox_accuracy: 0.0,
                composite_score: 60.0,
                verdict: Verdict::Usable,
                missing_required: Vec::new(),
            },
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_derive_template() {
        let number = FieldMatch::new("document_number", "TP-030-030-050", 0.95, MatchMethod::Inferred, FieldSource::Auto)
            .with_type(FieldType::Code, Importance::Critical)
            .with_bbox(Some(BoundingBox::new(0.0, 40.0, 200.0, 60.0, 1)));
        let section = FieldMatch::new("section_4_1", "적용 범위 (1)", 0.85, MatchMethod::Inferred, FieldSource::Auto)
            .with_type(FieldType::Header, Importance::Medium)
            .with_level(2);
        let blank = FieldMatch::new("author", " ", 0.8, MatchMethod::Inferred, FieldSource::Auto);
        let page_header = FieldMatch::new("header_1", "KS 사내 표준 문서", 0.8, MatchMethod::Inferred, FieldSource::Auto)
            .with_type(FieldType::Header, Importance::Low);

        let template = derive_template(
            &result(vec![number, section, blank, page_header]),
            "derived",
            "파생",
            "docx",
        );

        assert_eq!(template.elements.len(), 3);
        let first = &template.elements[0];
        assert!(first.required);
        assert_eq!(first.patterns, vec![r"TP\-030\-030\-050".to_string()]);
        assert_eq!(first.position_hint.unwrap().resolved_range(), Some((40.0, 60.0)));
        assert!(!template.elements[1].required);
        assert_eq!(template.section_patterns, vec![r"적용 범위 \(1\)".to_string()]);

        assert!(compile(template).is_ok());
    }
}
