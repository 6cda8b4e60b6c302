//! Pattern library: precompiled rules keyed by semantic field type.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::models::field::FieldType;

lazy_static! {
    // Document number
    pub static ref DOCUMENT_NUMBER_LABELED: Regex = Regex::new(
        r"(?i)(?:문서\s*번호|doc(?:ument)?\s*(?:no\.?|number|#))\s*[:：]?\s*([A-Z0-9][A-Z0-9-]*)"
    ).unwrap();

    pub static ref DOCUMENT_CODE: Regex = Regex::new(
        r"\b([A-Z]{2,4}-\d{3}-\d{3}-\d{3})\b"
    ).unwrap();

    // Dates
    pub static ref DATE_LABELED: Regex = Regex::new(
        r"(?i)(?:시행일|날짜|작성일|개정일|effective\s+date|date)\s*[:：]?\s*(\d{4}[-./]\d{1,2}[-./]\d{1,2}|\d{2}\.\d{2}\.\d{2})"
    ).unwrap();

    pub static ref DATE_ISO: Regex = Regex::new(
        r"\b(\d{4}-\d{2}-\d{2})\b"
    ).unwrap();

    pub static ref DATE_SHORT_DOTTED: Regex = Regex::new(
        r"\b(\d{2}\.\d{2}\.\d{2})\b"
    ).unwrap();

    // Revision
    pub static ref REVISION: Regex = Regex::new(
        r"(?i)(?:rev(?:ision)?\.?|개정|버전|ver\.?)\s*[:：]?\s*(\d+(?:\.\d+)?)"
    ).unwrap();

    // Author
    pub static ref AUTHOR: Regex = Regex::new(
        r"(?i)(?:작성자|author)\s*[:：]?\s*([가-힣A-Za-z]+(?: [가-힣A-Za-z]+)*)"
    ).unwrap();

    // Title
    pub static ref TITLE_LABELED: Regex = Regex::new(
        r"(?i)(?:제목|title)\s*[:：]\s*(.+)$"
    ).unwrap();

    pub static ref TITLE_STANDARD: Regex = Regex::new(
        r"^([가-힣\s()]+(?:기준|표준|절차|지침)서?)$"
    ).unwrap();

    // Section numbering: "1. 목적", "4.1 범위", "4.2.1 세부"
    pub static ref SECTION_HEADING: Regex = Regex::new(
        r"^([1-9]\d?(?:\.[1-9]\d?){0,3})\.?\s+(\D.*)$"
    ).unwrap();

    // Ordinal process markers: ① .. ⑳ or (1) .. (99)
    pub static ref STEP_MARKER: Regex = Regex::new(
        r"[\u{2460}-\u{2473}]|\(\d{1,2}\)"
    ).unwrap();
}

/// Canonical signatures of date values.
pub const DATE_SHAPES: &[&str] = &["9999-99-99", "9999.99.99", "9999/99/99", "99.99.99"];

/// Canonical signatures of document codes.
pub const CODE_SHAPES: &[&str] = &["AA-999-999-999", "AAA-999-999-999", "AAAA-999-999-999"];

/// Canonical signatures of revision markers.
pub const VERSION_SHAPES: &[&str] = &["Aaa.9", "Aaa.99", "Aaa 9", "Aaa9", "9.9"];

/// Library patterns for a semantic type, in priority order.
pub fn patterns_for(field_type: FieldType) -> Vec<&'static Regex> {
    match field_type {
        FieldType::Code => vec![&*DOCUMENT_NUMBER_LABELED, &*DOCUMENT_CODE],
        FieldType::Date => vec![&*DATE_LABELED, &*DATE_ISO, &*DATE_SHORT_DOTTED],
        FieldType::Version => vec![&*REVISION],
        FieldType::Text => vec![&*AUTHOR],
        FieldType::Title => vec![&*TITLE_LABELED, &*TITLE_STANDARD],
        FieldType::Header => vec![&*SECTION_HEADING],
        FieldType::ProcessStep => vec![&*STEP_MARKER],
        FieldType::Number | FieldType::TableData | FieldType::Footer => Vec::new(),
    }
}

/// Compile a user-supplied pattern the way template patterns are matched:
/// case-insensitive, `^`/`$` anchored at line boundaries.
pub fn build_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
}

/// Reduce a value to its character-class signature: digits become `9`, ASCII
/// letters `A`/`a`, Hangul syllables `가`; everything else is kept.
pub fn shape_signature(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '0'..='9' => '9',
            'A'..='Z' => 'A',
            'a'..='z' => 'a',
            '\u{AC00}'..='\u{D7A3}' => '가',
            other => other,
        })
        .collect()
}

/// Date formats accepted for date-shaped values. The two-digit year comes first
/// because `%Y` also accepts short years.
const DATE_FORMATS: &[&str] = &["%y.%m.%d", "%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d"];

/// Parse a date value in any of the accepted formats.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}
