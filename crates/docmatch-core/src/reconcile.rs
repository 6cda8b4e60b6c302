//! Hybrid reconciliation of template fields and auto-detected fields.

use tracing::debug;

use crate::models::field::{FieldMatch, FieldSet, FieldSource, TemplateMatchResult};
use crate::models::template::Template;

/// Merge template matches and auto-detected fields into the final field set.
///
/// An auto field conflicts with a template field when the names are equal or
/// their boxes overlap with an IoU above `overlap_threshold`. When both sides
/// know the text span they were read from and it lies in the same block, the
/// spans must overlap instead. The more confident side provides the value and
/// the result is marked hybrid.
///
/// Output order: template fields in declaration order, then hybrid fields in
/// declaration order, then auto fields in detection order.
pub fn reconcile(
    template_result: &TemplateMatchResult,
    template: Option<&Template>,
    auto_fields: Vec<FieldMatch>,
    overlap_threshold: f32,
) -> FieldSet {
    let declaration_index = |name: &str| {
        template
            .and_then(|t| t.elements.iter().position(|f| f.name == name))
            .unwrap_or(usize::MAX)
    };

    // (declaration index, field) for everything the template contributed.
    let mut declared: Vec<(usize, FieldMatch)> = if template_result.is_fallback() {
        Vec::new()
    } else {
        template_result
            .matched_fields
            .iter()
            .map(|f| {
                let mut f = f.clone();
                f.source = FieldSource::Template;
                (declaration_index(&f.field_name), f)
            })
            .collect()
    };
    declared.sort_by_key(|(index, _)| *index);

    let mut auto: Vec<FieldMatch> = Vec::new();

    for field in auto_fields {
        let conflict = declared
            .iter()
            .position(|(_, t)| t.field_name == field.field_name)
            .or_else(|| {
                declared
                    .iter()
                    .position(|(_, t)| overlaps(t, &field, overlap_threshold))
            });

        if let Some(index) = conflict {
            let existing = &mut declared[index].1;
            debug!(
                "Conflict: auto {} ({:.2}) vs template {} ({:.2})",
                field.field_name, field.confidence, existing.field_name, existing.confidence
            );
            merge(existing, field);
            continue;
        }

        let unmatched_definition = template
            .filter(|_| !template_result.is_fallback())
            .and_then(|t| t.field(&field.field_name));

        if let Some(definition) = unmatched_definition {
            debug!("Auto field {} fills declared template field", field.field_name);
            let mut filled = field;
            filled.source = FieldSource::Hybrid;
            filled.field_type = definition.field_type.or(filled.field_type);
            filled.importance = definition.importance.or(filled.importance);
            let index = declaration_index(&filled.field_name);
            declared.push((index, filled));
            declared.sort_by_key(|(index, _)| *index);
            continue;
        }

        if auto.iter().all(|a| a.field_name != field.field_name) {
            let mut field = field;
            field.source = FieldSource::Auto;
            auto.push(field);
        }
    }

    let (template_only, hybrid): (Vec<_>, Vec<_>) = declared
        .into_iter()
        .map(|(_, f)| f)
        .partition(|f| f.source == FieldSource::Template);

    template_only
        .into_iter()
        .chain(hybrid)
        .chain(auto)
        .collect()
}

/// Whether two differently named fields cover the same part of the document.
fn overlaps(template: &FieldMatch, auto: &FieldMatch, overlap_threshold: f32) -> bool {
    match (&template.span, &auto.span) {
        (Some(a), Some(b)) if a.block == b.block => a.overlaps(b),
        _ => match (&template.bbox, &auto.bbox) {
            (Some(a), Some(b)) => a.iou(b) > overlap_threshold,
            _ => false,
        },
    }
}

/// Resolve one conflict in place. The template field keeps its name.
fn merge(existing: &mut FieldMatch, auto: FieldMatch) {
    if existing.confidence >= auto.confidence {
        if existing.bbox.is_none() {
            existing.bbox = auto.bbox;
        }
    } else {
        existing.value = auto.value;
        existing.confidence = auto.confidence;
        existing.method = auto.method;
        if auto.bbox.is_some() {
            existing.bbox = auto.bbox;
            existing.span = auto.span;
        }
        if existing.field_type.is_none() {
            existing.field_type = auto.field_type;
            existing.importance = auto.importance;
        }
        existing.level = existing.level.or(auto.level);
    }
    existing.source = FieldSource::Hybrid;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{BoundingBox, TextSpan};
    use crate::models::field::{FieldType, Importance, MatchMethod, MatchStrategy};
    use crate::models::template::FieldDefinition;
    use pretty_assertions::assert_eq;

    fn template() -> Template {
        Template::new("t", "t", "docx")
            .with_field(FieldDefinition::regex("document_number", ["x"]))
            .with_field(FieldDefinition::regex("date", ["x"]).with_field_type(FieldType::Date))
            .with_field(FieldDefinition::regex("author", ["x"]))
    }

    fn selected(fields: Vec<FieldMatch>) -> TemplateMatchResult {
        TemplateMatchResult {
            template_id: Some("t".to_string()),
            confidence: 0.8,
            strategy_used: MatchStrategy::Combined,
            matched_fields: fields.into_iter().collect(),
        }
    }

    fn tm(name: &str, value: &str, confidence: f32) -> FieldMatch {
        FieldMatch::new(name, value, confidence, MatchMethod::Exact, FieldSource::Template)
    }

    fn auto(name: &str, value: &str, confidence: f32) -> FieldMatch {
        FieldMatch::new(name, value, confidence, MatchMethod::Inferred, FieldSource::Auto)
    }

    fn bbox(y: f32) -> Option<BoundingBox> {
        Some(BoundingBox::new(0.0, y, 100.0, y + 20.0, 1))
    }

    fn summary(set: &FieldSet) -> Vec<(&str, &str, FieldSource)> {
        set.iter()
            .map(|f| (f.field_name.as_str(), f.value.as_str(), f.source))
            .collect()
    }

    #[test]
    fn test_template_wins_and_is_enriched() {
        let result = selected(vec![tm("date", "2025-07-28", 0.9)]);
        let detected = vec![auto("date", "2025-01-01", 0.5).with_bbox(bbox(10.0))];

        let fields = reconcile(&result, Some(&template()), detected, 0.5);
        let date = fields.get("date").unwrap();

        assert_eq!(date.value, "2025-07-28");
        assert_eq!(date.confidence, 0.9);
        assert_eq!(date.source, FieldSource::Hybrid);
        assert_eq!(date.bbox, bbox(10.0));
    }

    #[test]
    fn test_template_bbox_is_never_overwritten_when_kept() {
        let result = selected(vec![tm("date", "2025-07-28", 0.9).with_bbox(bbox(100.0))]);
        let detected = vec![auto("date", "x", 0.5).with_bbox(bbox(10.0))];

        let fields = reconcile(&result, Some(&template()), detected, 0.5);
        assert_eq!(fields.get("date").unwrap().bbox, bbox(100.0));
    }

    #[test]
    fn test_more_confident_auto_value_keeps_template_name() {
        let result = selected(vec![
            tm("document_number", "TP-1", 0.4)
                .with_bbox(bbox(10.0))
                .with_type(FieldType::Code, Importance::Critical),
        ]);
        let detected = vec![
            auto("doc_code", "TP-030-030-050", 0.95)
                .with_bbox(bbox(12.0))
                .with_type(FieldType::Text, Importance::Low),
        ];

        let fields = reconcile(&result, Some(&template()), detected, 0.5);

        assert_eq!(fields.len(), 1);
        let f = fields.get("document_number").unwrap();
        assert_eq!(f.value, "TP-030-030-050");
        assert_eq!(f.confidence, 0.95);
        assert_eq!(f.method, MatchMethod::Inferred);
        assert_eq!(f.field_type, Some(FieldType::Code));
        assert_eq!(f.source, FieldSource::Hybrid);
    }

    #[test]
    fn test_low_overlap_is_not_a_conflict() {
        let result = selected(vec![tm("document_number", "TP-1", 0.9).with_bbox(bbox(10.0))]);
        let detected = vec![auto("title", "기준서", 0.85).with_bbox(bbox(25.0))];

        let fields = reconcile(&result, Some(&template()), detected, 0.5);
        assert_eq!(
            summary(&fields),
            vec![
                ("document_number", "TP-1", FieldSource::Template),
                ("title", "기준서", FieldSource::Auto),
            ]
        );
    }

    #[test]
    fn test_distinct_spans_in_one_block_do_not_conflict() {
        // "문서번호: TP-1 시행일: 2025-07-28" is a single block with a single box.
        let result = selected(vec![
            tm("document_number", "TP-1", 1.0)
                .with_bbox(bbox(10.0))
                .with_span(Some(TextSpan::new(0, 14, 18))),
        ]);
        let detected = vec![
            auto("effective_date", "2025-07-28", 0.95)
                .with_bbox(bbox(10.0))
                .with_span(Some(TextSpan::new(0, 30, 40))),
            auto("doc_code", "TP-1", 0.8)
                .with_bbox(bbox(10.0))
                .with_span(Some(TextSpan::new(0, 14, 18))),
        ];

        let fields = reconcile(&result, Some(&template()), detected, 0.5);
        assert_eq!(
            summary(&fields),
            vec![
                ("document_number", "TP-1", FieldSource::Hybrid),
                ("effective_date", "2025-07-28", FieldSource::Auto),
            ]
        );
    }

    #[test]
    fn test_box_overlap_decides_without_spans() {
        let result = selected(vec![tm("document_number", "TP-1", 1.0).with_bbox(bbox(10.0))]);
        let detected = vec![
            auto("effective_date", "2025-07-28", 0.95)
                .with_bbox(bbox(10.0))
                .with_span(Some(TextSpan::new(0, 30, 40))),
        ];

        let fields = reconcile(&result, Some(&template()), detected, 0.5);
        assert_eq!(
            summary(&fields),
            vec![("document_number", "TP-1", FieldSource::Hybrid)]
        );
    }

    #[test]
    fn test_ordering() {
        let result = selected(vec![tm("author", "김철수", 1.0), tm("document_number", "TP-1", 1.0)]);
        let detected = vec![
            auto("section_1", "목적", 0.85),
            auto("author", "x", 0.5),
            auto("date", "2025-07-28", 0.95),
            auto("process_flow_step_1", "① 준비", 0.9),
        ];

        let fields = reconcile(&result, Some(&template()), detected, 0.5);

        assert_eq!(
            summary(&fields),
            vec![
                ("document_number", "TP-1", FieldSource::Template),
                ("date", "2025-07-28", FieldSource::Hybrid),
                ("author", "김철수", FieldSource::Hybrid),
                ("section_1", "목적", FieldSource::Auto),
                ("process_flow_step_1", "① 준비", FieldSource::Auto),
            ]
        );
        assert_eq!(fields.get("date").unwrap().field_type, Some(FieldType::Date));
    }

    #[test]
    fn test_fallback_is_pure_auto() {
        let detected = vec![auto("document_number", "TP-1", 0.95), auto("title", "기준서", 0.85)];
        let fields = reconcile(&TemplateMatchResult::fallback(), None, detected, 0.5);

        assert!(fields.iter().all(|f| f.source == FieldSource::Auto));
        assert_eq!(fields.names().collect::<Vec<_>>(), vec!["document_number", "title"]);
    }
}
