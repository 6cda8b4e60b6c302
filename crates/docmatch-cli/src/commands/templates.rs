//! Templates command - list, validate and derive templates.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use console::style;

use docmatch_core::template::compile;
use docmatch_core::{derive_template, AnnotationResult};

use super::{load_config, load_snapshot, read_template_files, template_dir};

/// Arguments for the templates command.
#[derive(Args)]
pub struct TemplatesArgs {
    /// Template directory (default: templates.dir from config)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: TemplatesCommand,
}

#[derive(Subcommand)]
enum TemplatesCommand {
    /// List registered templates
    List,

    /// Validate every template file, failing if any is rejected
    Check,

    /// Derive a template from an annotation result
    Derive(DeriveArgs),
}

#[derive(Args)]
struct DeriveArgs {
    /// Annotation result (JSON) produced by `docmatch annotate`
    #[arg(required = true)]
    input: PathBuf,

    /// Id of the new template
    #[arg(long)]
    id: String,

    /// Display name (default: the id)
    #[arg(long)]
    name: Option<String>,

    /// Document type the template applies to
    #[arg(long, default_value = "*")]
    document_type: String,

    /// Output file (default: <template dir>/<id>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: TemplatesArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let dir = template_dir(args.dir.as_deref(), &config);

    match args.command {
        TemplatesCommand::List => list_templates(&dir),
        TemplatesCommand::Check => check_templates(&dir),
        TemplatesCommand::Derive(derive_args) => derive(derive_args, &dir),
    }
}

fn list_templates(dir: &std::path::Path) -> anyhow::Result<()> {
    let snapshot = load_snapshot(dir)?;

    if snapshot.is_empty() {
        println!("{} No templates in {}", style("ℹ").blue(), dir.display());
    }

    for template in snapshot.templates() {
        let definition = template.template();
        println!(
            "{}  {} (type: {}, version: {})",
            style(template.id()).bold(),
            definition.name,
            definition.document_type,
            definition.version
        );
        println!(
            "    {} fields, {} required, {} section patterns",
            definition.elements.len(),
            definition.required_fields().count(),
            definition.section_patterns.len()
        );
    }

    for rejected in snapshot.rejected() {
        println!(
            "{} {} excluded: {}",
            style("✗").red(),
            rejected.template_id,
            rejected.reason
        );
    }

    Ok(())
}

fn check_templates(dir: &std::path::Path) -> anyhow::Result<()> {
    let files = read_template_files(dir)?;
    if files.is_empty() {
        anyhow::bail!("No template files found in {}", dir.display());
    }

    let mut failures = 0;
    for file in files {
        let outcome = file
            .template
            .and_then(|template| compile(template).map_err(|e| e.to_string()));

        match outcome {
            Ok(compiled) => println!(
                "{} {} ({})",
                style("✓").green(),
                file.path.display(),
                compiled.id()
            ),
            Err(reason) => {
                failures += 1;
                eprintln!("{} {}: {}", style("✗").red(), file.path.display(), reason);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} invalid template file(s) in {}", failures, dir.display());
    }

    Ok(())
}

fn derive(args: DeriveArgs, dir: &std::path::Path) -> anyhow::Result<()> {
    let content = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let result: AnnotationResult = serde_json::from_str(&content)
        .with_context(|| format!("invalid annotation JSON in {}", args.input.display()))?;

    let name = args.name.unwrap_or_else(|| args.id.clone());
    let template = derive_template(&result, args.id.as_str(), name, args.document_type);

    compile(template.clone())?;

    let output_path = args
        .output
        .unwrap_or_else(|| dir.join(format!("{}.json", args.id)));

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Template file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&output_path, template.to_json()?)?;

    println!(
        "{} Derived template {} with {} fields at {}",
        style("✓").green(),
        template.id,
        template.elements.len(),
        output_path.display()
    );

    Ok(())
}
