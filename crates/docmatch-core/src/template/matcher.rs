//! Field matcher: applies one field definition to a document.
//!
//! Strategies run in a fixed order (exact, positional, fuzzy) and the first
//! accepted candidate wins. A field that yields nothing is a normal outcome.

use std::ops::Range;

use regex::{Captures, Regex};
use strsim::normalized_levenshtein;
use tracing::debug;

use crate::models::document::{BlockKind, BoundingBox, Document, TextIndex, TextSpan, normalize_text};
use crate::models::field::{FieldMatch, FieldSource, MatchMethod};
use crate::models::template::{ElementType, ExtractionMethod, ValueShape};

use super::compile::CompiledField;
use super::patterns::{CODE_SHAPES, DATE_SHAPES, VERSION_SHAPES, parse_date, shape_signature};

/// Separator for multi-value captures.
pub const MULTI_VALUE_SEPARATOR: &str = "; ";
/// Separator for collected table cells.
pub const TABLE_CELL_SEPARATOR: &str = " | ";
/// Confidence of a table field read from all cells without patterns.
pub const TABLE_COLLECT_CONFIDENCE: f32 = 0.9;
/// Multiplier applied to date-shaped candidates that are not real dates.
pub const INVALID_DATE_PENALTY: f32 = 0.5;

/// Per-document data shared by every field and every template.
#[derive(Debug)]
pub struct MatchContext<'a> {
    document: &'a Document,
    index: TextIndex,
    /// Normalized text per block, parallel to `document.blocks`.
    block_texts: Vec<String>,
    vertical_extent: f32,
    has_layout: bool,
}

impl<'a> MatchContext<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self {
            document,
            index: document.text_index(),
            block_texts: document.blocks.iter().map(|b| normalize_text(&b.text)).collect(),
            vertical_extent: document.vertical_extent(),
            has_layout: document.has_layout(),
        }
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    /// Joined normalized text.
    pub fn text(&self) -> &str {
        self.index.text()
    }

    fn bbox_at(&self, offset: usize) -> Option<BoundingBox> {
        self.index
            .block_at(offset)
            .and_then(|i| self.document.blocks[i].bbox)
    }

    fn span_of(&self, range: &Range<usize>) -> Option<TextSpan> {
        self.index.span(range.start, range.end)
    }

    fn blocks(&self) -> impl Iterator<Item = (usize, &str)> {
        self.block_texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.is_empty())
            .map(|(i, text)| (i, text.as_str()))
    }
}

/// Stateless field matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMatcher;

impl FieldMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Match one field against the document.
    pub fn match_field(&self, ctx: &MatchContext<'_>, field: &CompiledField) -> Option<FieldMatch> {
        let definition = &field.definition;

        let found = self
            .exact(ctx, field)
            .or_else(|| self.positional(ctx, field))
            .or_else(|| self.fuzzy(ctx, field));

        match &found {
            Some(m) => debug!(
                "Field {}: {:?} match {:?} ({:.2})",
                definition.name, m.method, m.value, m.confidence
            ),
            None => debug!("Field {}: no match", definition.name),
        }

        found.map(|mut m| {
            m.field_type = definition.field_type;
            m.importance = definition.importance;
            m
        })
    }

    /// Exact strategy: first productive pattern wins, confidence 1.0.
    fn exact(&self, ctx: &MatchContext<'_>, field: &CompiledField) -> Option<FieldMatch> {
        if field.definition.extraction_method == ExtractionMethod::Table {
            return self.table(ctx, field);
        }

        let multi = field.definition.element_type == ElementType::MultiValue;
        for re in &field.patterns {
            let mut values = accepted_captures(re, ctx.text(), field);
            if values.is_empty() {
                continue;
            }

            let first = values.remove(0);
            let bbox = ctx.bbox_at(first.start);
            let span = ctx.span_of(&first.range);
            let value = if multi {
                std::iter::once(first.value)
                    .chain(values.into_iter().map(|c| c.value))
                    .collect::<Vec<_>>()
                    .join(MULTI_VALUE_SEPARATOR)
            } else {
                first.value
            };

            return Some(
                template_match(field, value, 1.0, MatchMethod::Exact)
                    .with_bbox(bbox)
                    .with_span(span),
            );
        }
        None
    }

    /// Table method: patterns are applied cell by cell; without patterns all
    /// cells are collected.
    fn table(&self, ctx: &MatchContext<'_>, field: &CompiledField) -> Option<FieldMatch> {
        let cells: Vec<(usize, &str)> = ctx
            .blocks()
            .filter(|(i, _)| ctx.document.blocks[*i].kind == BlockKind::TableCell)
            .collect();

        if cells.is_empty() {
            return None;
        }

        if field.patterns.is_empty() {
            if TABLE_COLLECT_CONFIDENCE < field.definition.confidence_threshold {
                return None;
            }
            let value = cells
                .iter()
                .map(|(_, text)| *text)
                .collect::<Vec<_>>()
                .join(TABLE_CELL_SEPARATOR);
            if !field.accepts(&value) {
                return None;
            }
            let bbox = ctx.document.blocks[cells[0].0].bbox;
            return Some(
                template_match(field, value, TABLE_COLLECT_CONFIDENCE, MatchMethod::Exact)
                    .with_bbox(bbox),
            );
        }

        let multi = field.definition.element_type == ElementType::MultiValue;
        for re in &field.patterns {
            let mut hits: Vec<(String, usize)> = Vec::new();
            for (i, text) in &cells {
                for capture in accepted_captures(re, text, field) {
                    hits.push((capture.value, *i));
                    if !multi {
                        break;
                    }
                }
                if !multi && !hits.is_empty() {
                    break;
                }
            }

            if let Some((_, first_block)) = hits.first() {
                let bbox = ctx.document.blocks[*first_block].bbox;
                let value = hits
                    .iter()
                    .map(|(v, _)| v.as_str())
                    .collect::<Vec<_>>()
                    .join(MULTI_VALUE_SEPARATOR);
                return Some(template_match(field, value, 1.0, MatchMethod::Exact).with_bbox(bbox));
            }
        }
        None
    }

    /// Positional strategy: closest non-empty block to the hinted range.
    fn positional(&self, ctx: &MatchContext<'_>, field: &CompiledField) -> Option<FieldMatch> {
        let (y_min, y_max) = field.definition.position_hint?.resolved_range()?;
        if !ctx.has_layout {
            return None;
        }

        let mut best: Option<(f32, usize, BoundingBox)> = None;
        for (i, _) in ctx.blocks() {
            let Some(bbox) = ctx.document.blocks[i].bbox else {
                continue;
            };
            let center = bbox.center_y();
            let distance = if center < y_min {
                y_min - center
            } else if center > y_max {
                center - y_max
            } else {
                0.0
            };
            let score = (1.0 - distance / ctx.vertical_extent).clamp(0.0, 1.0);
            if best.is_none_or(|(s, _, _)| score > s) {
                best = Some((score, i, bbox));
            }
        }

        let (score, i, bbox) = best?;
        if score < field.definition.confidence_threshold {
            return None;
        }

        let text = &ctx.block_texts[i];
        let value = field
            .patterns
            .iter()
            .find_map(|re| accepted_captures(re, text, field).into_iter().next())
            .map(|c| c.value)
            .unwrap_or_else(|| text.clone());

        if !field.accepts(&value) {
            return None;
        }

        Some(template_match(field, value, score, MatchMethod::Positional).with_bbox(Some(bbox)))
    }

    /// Fuzzy strategy: shape similarity of label-adjacent or free tokens.
    fn fuzzy(&self, ctx: &MatchContext<'_>, field: &CompiledField) -> Option<FieldMatch> {
        let definition = &field.definition;
        if definition.extraction_method != ExtractionMethod::Regex {
            return None;
        }
        let shape = definition.value_shape?;

        let mut candidates = labeled_candidates(ctx, &definition.labels);
        if candidates.is_empty() {
            candidates = ctx
                .blocks()
                .flat_map(|(i, text)| text.split_whitespace().map(move |t| (trim_token(t), i)))
                .filter(|(t, _)| !t.is_empty())
                .collect();
        }

        let mut best: Option<(f32, &str, usize)> = None;
        for (token, i) in candidates {
            if !field.accepts(token) {
                continue;
            }
            let score = shape_similarity(shape, token);
            if best.is_none_or(|(s, _, _)| score > s) {
                best = Some((score, token, i));
            }
        }

        let (score, token, i) = best?;
        if score < definition.confidence_threshold {
            return None;
        }

        Some(
            template_match(field, token, score, MatchMethod::Fuzzy)
                .with_bbox(ctx.document.blocks[i].bbox),
        )
    }
}

/// Similarity between a candidate value and the canonical forms of a shape.
pub fn shape_similarity(shape: ValueShape, candidate: &str) -> f32 {
    let signature = shape_signature(candidate);
    let best = |shapes: &[&str]| {
        shapes
            .iter()
            .map(|s| normalized_levenshtein(&signature, s) as f32)
            .fold(0.0f32, f32::max)
    };

    match shape {
        ValueShape::Date => {
            let score = best(DATE_SHAPES);
            if parse_date(candidate).is_some() {
                score
            } else {
                score * INVALID_DATE_PENALTY
            }
        }
        ValueShape::Code => best(CODE_SHAPES),
        ValueShape::Version => best(VERSION_SHAPES),
        ValueShape::Number => {
            let total = candidate.chars().count();
            let digits = candidate.chars().filter(char::is_ascii_digit).count();
            if digits == 0 {
                return 0.0;
            }
            let numeric = candidate
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
                .count();
            numeric as f32 / total as f32
        }
    }
}

/// One accepted pattern capture.
struct Capture {
    value: String,
    /// Start of the whole match.
    start: usize,
    /// Byte range of the captured value.
    range: Range<usize>,
}

/// Non-blank, rule-satisfying captures of `re` in `text`.
fn accepted_captures(re: &Regex, text: &str, field: &CompiledField) -> Vec<Capture> {
    re.captures_iter(text)
        .filter_map(|caps| capture_value(re, &caps))
        .filter(|c| field.accepts(&c.value))
        .collect()
}

/// Group 1 when the pattern has groups, the whole match otherwise. A group
/// that did not participate or is blank rejects the match.
fn capture_value(re: &Regex, caps: &Captures<'_>) -> Option<Capture> {
    let whole = caps.get(0)?;
    let group = if re.captures_len() > 1 { caps.get(1)? } else { whole };
    let value = group.as_str().trim();
    if value.is_empty() {
        return None;
    }
    Some(Capture {
        value: value.to_string(),
        start: whole.start(),
        range: group.range(),
    })
}

/// Tokens that directly follow one of the labels inside a block.
fn labeled_candidates<'c>(ctx: &'c MatchContext<'_>, labels: &[String]) -> Vec<(&'c str, usize)> {
    let mut out = Vec::new();
    if labels.is_empty() {
        return out;
    }
    for (i, text) in ctx.blocks() {
        for label in labels {
            let label = label.trim();
            if label.is_empty() {
                continue;
            }
            if let Some(pos) = text.find(label) {
                let rest = &text[pos + label.len()..];
                let token = rest
                    .split_whitespace()
                    .map(trim_token)
                    .find(|t| !t.is_empty());
                if let Some(token) = token {
                    out.push((token, i));
                }
            }
        }
    }
    out
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| {
        matches!(c, ':' | '：' | ',' | ';' | '(' | ')' | '[' | ']' | '"' | '\'')
    })
}

fn template_match(
    field: &CompiledField,
    value: impl Into<String>,
    confidence: f32,
    method: MatchMethod,
) -> FieldMatch {
    FieldMatch::new(field.name(), value, confidence, method, FieldSource::Template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::Block;
    use crate::models::template::{FieldDefinition, Location, PositionHint, Template, ValidationRule};
    use crate::template::compile::compile;

    fn field(definition: FieldDefinition) -> CompiledField {
        compile(Template::new("t", "t", "*").with_field(definition))
            .unwrap()
            .fields()[0]
            .clone()
    }

    fn run(doc: &Document, definition: FieldDefinition) -> Option<FieldMatch> {
        FieldMatcher::new().match_field(&MatchContext::new(doc), &field(definition))
    }

    #[test]
    fn test_exact_document_number() {
        let doc = Document::new(vec![
            Block::new("기술기준서"),
            Block::new("문서번호: TP-030-030-050")
                .with_bbox(BoundingBox::new(50.0, 40.0, 300.0, 60.0, 1)),
        ]);

        let m = run(
            &doc,
            FieldDefinition::regex("document_number", [r"문서번호[:\s]*([A-Z0-9-]+)"]),
        )
        .unwrap();

        assert_eq!(m.value, "TP-030-030-050");
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.method, MatchMethod::Exact);
        assert_eq!(m.source, FieldSource::Template);
        assert_eq!(m.bbox.unwrap().y1, 40.0);
        assert_eq!(m.span, Some(TextSpan::new(1, 14, 28)));
    }

    #[test]
    fn test_blank_capture_is_rejected() {
        let doc = Document::new(vec![Block::new("문서번호: ")]);
        assert!(run(&doc, FieldDefinition::regex("n", [r"문서번호[:\s]*(\S*)"])).is_none());
    }

    #[test]
    fn test_later_occurrence_after_blank_capture() {
        let doc = Document::new(vec![Block::new("Rev:"), Block::new("Rev: 3")]);
        let m = run(&doc, FieldDefinition::regex("rev", [r"Rev:[ \t]*(\d*)"])).unwrap();
        assert_eq!(m.value, "3");
    }

    #[test]
    fn test_pattern_order_wins() {
        let doc = Document::new(vec![Block::new("A-1 B-2")]);
        let m = run(&doc, FieldDefinition::regex("x", [r"(B-\d)", r"(A-\d)"])).unwrap();
        assert_eq!(m.value, "B-2");
    }

    #[test]
    fn test_validation_rule_rejects_candidate() {
        let doc = Document::new(vec![Block::new("시행일: 25.13.40, 시행일: 25.07.28")]);
        let m = run(
            &doc,
            FieldDefinition::regex("date", [r"시행일[:\s]*(\d{2}\.\d{2}\.\d{2})"])
                .with_validation(ValidationRule::Date),
        )
        .unwrap();
        assert_eq!(m.value, "25.07.28");
    }

    #[test]
    fn test_multi_value_joins_captures() {
        let doc = Document::new(vec![Block::new("담당: 김철수"), Block::new("담당: 이영희")]);
        let m = run(
            &doc,
            FieldDefinition::regex("owners", [r"담당:\s*(\S+)"])
                .with_element_type(ElementType::MultiValue),
        )
        .unwrap();
        assert_eq!(m.value, "김철수; 이영희");
    }

    #[test]
    fn test_positional_prefers_hinted_range() {
        let doc = Document::new(vec![
            Block::new("본문").with_bbox(BoundingBox::new(0.0, 400.0, 500.0, 420.0, 1)),
            Block::new("머리말").with_bbox(BoundingBox::new(0.0, 20.0, 500.0, 40.0, 1)),
        ]);

        let m = run(
            &doc,
            FieldDefinition::positional("header", PositionHint::at(Location::Header)),
        )
        .unwrap();

        assert_eq!(m.value, "머리말");
        assert_eq!(m.method, MatchMethod::Positional);
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn test_positional_needs_layout() {
        let doc = Document::new(vec![Block::new("머리말")]);
        assert!(run(
            &doc,
            FieldDefinition::positional("header", PositionHint::at(Location::Header)),
        )
        .is_none());
    }

    #[test]
    fn test_positional_below_threshold() {
        let doc = Document::new(vec![
            Block::new("far").with_bbox(BoundingBox::new(0.0, 780.0, 100.0, 800.0, 1)),
        ]);
        let def = FieldDefinition::positional("header", PositionHint::between(0.0, 10.0))
            .with_threshold(0.9);
        assert!(run(&doc, def).is_none());
    }

    #[test]
    fn test_fuzzy_date_shape() {
        let doc = Document::new(vec![Block::new("시행 2025/07/28 부터")]);
        let m = run(
            &doc,
            FieldDefinition::regex("effective_date", [r"시행일[:\s]*(\d{4}-\d{2}-\d{2})"])
                .with_shape(ValueShape::Date),
        )
        .unwrap();

        assert_eq!(m.value, "2025/07/28");
        assert_eq!(m.method, MatchMethod::Fuzzy);
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn test_fuzzy_prefers_labels() {
        let doc = Document::new(vec![
            Block::new("참고 AB-111-222-333"),
            Block::new("관리번호 TP-030-030-050"),
        ]);
        let m = run(
            &doc,
            FieldDefinition::regex("document_number", [r"문서번호[:\s]*([A-Z0-9-]+)"])
                .with_shape(ValueShape::Code)
                .with_labels(["관리번호"]),
        )
        .unwrap();
        assert_eq!(m.value, "TP-030-030-050");
    }

    #[test]
    fn test_fuzzy_below_threshold() {
        let doc = Document::new(vec![Block::new("nothing date-like here")]);
        let def = FieldDefinition::regex("d", [r"(\d{4}-\d{2}-\d{2})"]).with_shape(ValueShape::Date);
        assert!(run(&doc, def).is_none());
    }

    #[test]
    fn test_invalid_date_is_penalized() {
        assert_eq!(shape_similarity(ValueShape::Date, "2025-07-28"), 1.0);
        assert_eq!(shape_similarity(ValueShape::Date, "2025-19-40"), INVALID_DATE_PENALTY);
        assert_eq!(shape_similarity(ValueShape::Number, "1,250"), 1.0);
        assert_eq!(shape_similarity(ValueShape::Number, "abc"), 0.0);
    }

    #[test]
    fn test_table_cells() {
        let doc = Document::new(vec![
            Block::new("표 1"),
            Block::new("항목").with_kind(BlockKind::TableCell),
            Block::new("값 42").with_kind(BlockKind::TableCell),
        ]);

        let mut collect = FieldDefinition::regex("table", Vec::<String>::new());
        collect.extraction_method = ExtractionMethod::Table;
        let m = run(&doc, collect).unwrap();
        assert_eq!(m.value, "항목 | 값 42");
        assert_eq!(m.confidence, TABLE_COLLECT_CONFIDENCE);

        let mut patterned = FieldDefinition::regex("value", [r"값\s*(\d+)"]);
        patterned.extraction_method = ExtractionMethod::Table;
        assert_eq!(run(&doc, patterned).unwrap().value, "42");
    }

    #[test]
    fn test_table_collect_respects_field_threshold() {
        let doc = Document::new(vec![Block::new("항목").with_kind(BlockKind::TableCell)]);

        let mut strict = FieldDefinition::regex("table", Vec::<String>::new()).with_threshold(0.95);
        strict.extraction_method = ExtractionMethod::Table;
        assert!(run(&doc, strict).is_none());

        let mut lenient = FieldDefinition::regex("table", Vec::<String>::new()).with_threshold(0.9);
        lenient.extraction_method = ExtractionMethod::Table;
        assert_eq!(run(&doc, lenient).unwrap().confidence, TABLE_COLLECT_CONFIDENCE);
    }

    #[test]
    fn test_monotonic_under_added_pattern() {
        let doc = Document::new(vec![Block::new("문서번호: TP-030-030-050")]);
        let base = FieldDefinition::regex("n", [r"문서번호[:\s]*([A-Z0-9-]+)"]);
        let extended = FieldDefinition::regex("n", [r"문서번호[:\s]*([A-Z0-9-]+)", r"([A-Z]{2}-\d+)"]);

        let before = run(&doc, base).unwrap().confidence;
        let after = run(&doc, extended).unwrap().confidence;
        assert!(after >= before);
    }
}
