//! Annotate command - match one document against the template directory.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use console::style;
use serde::Serialize;

use docmatch_core::scoring::speed_score;
use docmatch_core::{
    AnnotationEngine, AnnotationResult, FieldSource, FieldType, MatchMethod, QualityInputs,
};

use super::{apply_overrides, load_config, load_snapshot, read_document, template_dir};

/// Arguments for the annotate command.
#[derive(Args)]
pub struct AnnotateArgs {
    /// Normalized document (JSON)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Template directory (default: templates.dir from config)
    #[arg(short, long)]
    templates: Option<PathBuf>,

    /// Use this template instead of selecting one
    #[arg(long)]
    template: Option<String>,

    /// Minimum template confidence
    #[arg(long)]
    threshold: Option<f32>,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// AnnotationResult JSON
    #[default]
    Json,
    /// One row per field
    Csv,
    /// Human-readable summary
    Text,
}

pub async fn run(args: AnnotateArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args.template.clone(), args.threshold)?;

    let snapshot = load_snapshot(&template_dir(args.templates.as_deref(), &config))?;

    let start = Instant::now();
    let document = read_document(&args.input).await?;

    let engine = AnnotationEngine::new(config);
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let mut result = engine.annotate(&document, &snapshot, QualityInputs::default())?;
        engine.rescore(&mut result, measured_inputs(start.elapsed()));
        Ok(result)
    })
    .await??;

    for warning in &result.warnings {
        eprintln!("{} {}", style("⚠").yellow(), warning);
    }

    let output = match args.format {
        OutputFormat::Json if args.pretty => serde_json::to_string_pretty(&result)?,
        OutputFormat::Json => serde_json::to_string(&result)?,
        OutputFormat::Csv => format_csv(&result)?,
        OutputFormat::Text => format_text(&result),
    };

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, output).await?;
            eprintln!(
                "{} Annotation written to {}",
                style("✓").green(),
                path.display()
            );
        }
        None => println!("{}", output),
    }

    Ok(())
}

/// Quality inputs for a run that took `elapsed` from document load to result.
pub(crate) fn measured_inputs(elapsed: Duration) -> QualityInputs {
    QualityInputs {
        output_generation_success: 1.0,
        processing_speed_score: speed_score(elapsed),
    }
}

#[derive(Serialize)]
struct FieldRow<'a> {
    field_name: &'a str,
    value: &'a str,
    confidence: f32,
    method: MatchMethod,
    source: FieldSource,
    field_type: Option<FieldType>,
    level: Option<u8>,
}

fn format_csv(result: &AnnotationResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    for field in result.fields.iter() {
        wtr.serialize(FieldRow {
            field_name: &field.field_name,
            value: &field.value,
            confidence: field.confidence,
            method: field.method,
            source: field.source,
            field_type: field.field_type,
            level: field.level,
        })?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &AnnotationResult) -> String {
    let quality = &result.quality;
    let mut output = String::new();

    output.push_str(&format!("Document: {}\n", result.document_id));
    output.push_str(&format!(
        "Template: {}\n",
        result.template_id.as_deref().unwrap_or("(auto-detection only)")
    ));
    output.push_str(&format!(
        "Quality:  {:.1} ({})\n",
        quality.composite_score, quality.verdict
    ));
    output.push_str(&format!(
        "  template confidence {:.2}, essential fields {:.0}%, bbox {:.0}%\n",
        quality.template_confidence,
        quality.essential_field_rate * 100.0,
        quality.bbox_accuracy * 100.0
    ));
    if !quality.missing_required.is_empty() {
        output.push_str(&format!("  missing: {}\n", quality.missing_required.join(", ")));
    }
    output.push('\n');

    output.push_str(&format!("Fields ({}):\n", result.fields.len()));
    let width = result
        .fields
        .names()
        .map(|name| name.chars().count())
        .max()
        .unwrap_or(0);

    for field in result.fields.iter() {
        let pad = width - field.field_name.chars().count();
        output.push_str(&format!(
            "  {}{}  {}  [{:.2} {:?}/{:?}]\n",
            field.field_name,
            " ".repeat(pad),
            field.value,
            field.confidence,
            field.method,
            field.source
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmatch_core::{FieldMatch, FieldSet, QualityReport, Verdict};

    fn sample_result() -> AnnotationResult {
        let mut fields = FieldSet::new();
        fields.insert(FieldMatch::new(
            "document_number",
            "TP-030-030-050",
            0.95,
            MatchMethod::Exact,
            FieldSource::Template,
        ));
        fields.insert(
            FieldMatch::new("section_1", "목적", 0.85, MatchMethod::Inferred, FieldSource::Auto)
                .with_level(1),
        );

        AnnotationResult {
            document_id: "TP-030".to_string(),
            template_id: Some("technical_standard_v1".to_string()),
            fields,
            quality: QualityReport {
                template_confidence: 0.9,
                essential_field_rate: 0.5,
                bbox_accuracy: 0.0,
                composite_score: 71.0,
                verdict: Verdict::Usable,
                missing_required: vec!["effective_date".to_string()],
            },
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_format_text() {
        let text = format_text(&sample_result());

        assert!(text.contains("Template: technical_standard_v1"));
        assert!(text.contains("71.0 (usable)"));
        assert!(text.contains("missing: effective_date"));
        assert!(text.contains("document_number  TP-030-030-050"));
    }

    #[test]
    fn test_format_csv() {
        let csv = format_csv(&sample_result()).unwrap();
        let mut lines = csv.lines();

        assert_eq!(
            lines.next(),
            Some("field_name,value,confidence,method,source,field_type,level")
        );
        assert_eq!(
            lines.next(),
            Some("document_number,TP-030-030-050,0.95,exact,template,,")
        );
        assert_eq!(lines.next(), Some("section_1,목적,0.85,inferred,auto,,1"));
    }

    #[test]
    fn test_measured_inputs_follow_elapsed_time() {
        assert_eq!(measured_inputs(Duration::ZERO).processing_speed_score, 1.0);
        let slow = measured_inputs(Duration::from_secs(5));
        assert!((slow.processing_speed_score - 0.5).abs() < 1e-6);
        assert_eq!(slow.output_generation_success, 1.0);
        assert_eq!(measured_inputs(Duration::from_secs(60)).processing_speed_score, 0.0);
    }
}
