//! Batch command - annotate many documents against one template snapshot.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{error, warn};

use docmatch_core::{AnnotationEngine, AnnotationResult, Document, QualityInputs};

use super::annotate::measured_inputs;
use super::{apply_overrides, load_config, load_snapshot, read_document, template_dir};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern (e.g. "docs/*.json")
    #[arg(required = true)]
    input: String,

    /// Output directory for per-document results
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Template directory (default: templates.dir from config)
    #[arg(short, long)]
    templates: Option<PathBuf>,

    /// Use this template instead of selecting one
    #[arg(long)]
    template: Option<String>,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers (default: one per core)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Outcome for a single input file.
struct FileResult {
    path: PathBuf,
    annotation: Option<AnnotationResult>,
    error: Option<String>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args.template.clone(), None)?;

    // Expand glob pattern
    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} documents to annotate",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let snapshot = load_snapshot(&template_dir(args.templates.as_deref(), &config))?;

    let multi_progress = MultiProgress::new();
    let load_pb = multi_progress.add(ProgressBar::new(files.len() as u64));
    load_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} loaded")?
            .progress_chars("=>-"),
    );

    // Load every document first; annotation then runs on one snapshot.
    let mut loaded: Vec<(PathBuf, anyhow::Result<Document>)> = Vec::with_capacity(files.len());
    for path in files {
        let document = read_document(&path).await;
        loaded.push((path, document));
        load_pb.inc(1);
    }
    load_pb.finish_and_clear();

    let (documents, slots) = split_loaded(loaded);

    let annotate_pb = multi_progress.add(ProgressBar::new_spinner());
    annotate_pb.set_message(format!("Annotating {} documents", documents.len()));
    annotate_pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let jobs = args.jobs;
    let engine = AnnotationEngine::new(config);
    let annotated = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let inputs = QualityInputs::default();
        let annotate_start = Instant::now();
        let mut annotated = match jobs {
            Some(jobs) => {
                let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
                pool.install(|| engine.annotate_batch(&documents, &snapshot, inputs))
            }
            None => engine.annotate_batch(&documents, &snapshot, inputs),
        };

        // Each document is scored on its share of the annotation time.
        let per_document = annotate_start.elapsed() / documents.len().max(1) as u32;
        for annotation in annotated.iter_mut().flatten() {
            engine.rescore(annotation, measured_inputs(per_document));
        }
        Ok(annotated)
    })
    .await??;

    annotate_pb.finish_with_message("Complete");

    let mut annotated = annotated.into_iter();
    let mut results = Vec::with_capacity(slots.len());
    for (path, load_error) in slots {
        let outcome = match load_error {
            Some(e) => Err(e),
            None => match annotated.next() {
                Some(Ok(annotation)) => Ok(annotation),
                Some(Err(e)) => Err(e.to_string()),
                None => Err("missing annotation result".to_string()),
            },
        };

        match outcome {
            Ok(annotation) => results.push(FileResult {
                path,
                annotation: Some(annotation),
                error: None,
            }),
            Err(error_msg) if args.continue_on_error => {
                warn!("Failed to annotate {}: {}", path.display(), error_msg);
                results.push(FileResult {
                    path,
                    annotation: None,
                    error: Some(error_msg),
                });
            }
            Err(error_msg) => {
                error!("Failed to annotate {}: {}", path.display(), error_msg);
                anyhow::bail!("Annotation failed for {}: {}", path.display(), error_msg);
            }
        }
    }

    if let Some(output_dir) = &args.output_dir {
        for result in &results {
            if let Some(annotation) = &result.annotation {
                let output_path = output_dir.join(output_name(&result.path));
                fs::write(&output_path, serde_json::to_string_pretty(annotation)?)?;
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_deref()
            .unwrap_or_else(|| Path::new("."))
            .join("summary.csv");
        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let succeeded = results.iter().filter(|r| r.annotation.is_some()).count();
    let failed = results.len() - succeeded;
    let production_ready = results
        .iter()
        .filter_map(|r| r.annotation.as_ref())
        .filter(|a| a.quality.composite_score >= docmatch_core::scoring::PRODUCTION_READY_MIN)
        .count();

    println!();
    println!("{}", style("Batch complete").bold());
    println!("  Annotated:        {}", style(succeeded).green());
    println!("  Production ready: {}", production_ready);
    if failed > 0 {
        println!("  Failed:           {}", style(failed).red());
    }
    println!("  Time:             {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Separate loaded documents from load failures while keeping each file's slot.
fn split_loaded(
    loaded: Vec<(PathBuf, anyhow::Result<Document>)>,
) -> (Vec<Document>, Vec<(PathBuf, Option<String>)>) {
    let mut documents = Vec::new();
    let mut slots = Vec::with_capacity(loaded.len());

    for (path, document) in loaded {
        match document {
            Ok(document) => {
                documents.push(document);
                slots.push((path, None));
            }
            Err(e) => slots.push((path, Some(format!("{:#}", e)))),
        }
    }

    (documents, slots)
}

fn output_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    format!("{}.annotation.json", stem)
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "document_id",
        "template_id",
        "fields",
        "template_confidence",
        "essential_field_rate",
        "composite_score",
        "verdict",
        "missing_required",
        "error",
    ])?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        if let Some(annotation) = &result.annotation {
            let quality = &annotation.quality;
            wtr.write_record([
                filename,
                "success",
                &annotation.document_id,
                annotation.template_id.as_deref().unwrap_or(""),
                &annotation.fields.len().to_string(),
                &format!("{:.3}", quality.template_confidence),
                &format!("{:.3}", quality.essential_field_rate),
                &format!("{:.1}", quality.composite_score),
                &quality.verdict.to_string(),
                &quality.missing_required.join(";"),
                "",
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                result.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
