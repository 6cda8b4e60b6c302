//! CLI subcommands and the loading helpers they share.

pub mod annotate;
pub mod batch;
pub mod config;
pub mod templates;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use glob::glob;
use tracing::{debug, warn};

use docmatch_core::{Document, EngineConfig, RegistrySnapshot, Template, TemplateRegistry};

/// Load the engine configuration.
///
/// An explicit `--config` must exist. Otherwise the user config file is used
/// when present, and defaults when not.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<EngineConfig> {
    let config = match config_path {
        Some(path) => EngineConfig::from_file(Path::new(path))
            .with_context(|| format!("failed to load config from {}", path))?,
        None => {
            let default_path = config::default_config_path();
            if default_path.exists() {
                debug!("Using config file {}", default_path.display());
                EngineConfig::from_file(&default_path)
                    .with_context(|| format!("failed to load config from {}", default_path.display()))?
            } else {
                EngineConfig::default()
            }
        }
    };

    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

/// Apply per-invocation overrides on top of the loaded configuration.
pub fn apply_overrides(
    config: &mut EngineConfig,
    forced_template: Option<String>,
    threshold: Option<f32>,
) -> anyhow::Result<()> {
    if forced_template.is_some() {
        config.matching.forced_template_id = forced_template;
    }
    if let Some(threshold) = threshold {
        config.matching.template_confidence_threshold = threshold;
    }
    config.validate().map_err(anyhow::Error::msg)
}

/// Template directory from the command line, falling back to `templates.dir`.
pub fn template_dir(arg: Option<&Path>, config: &EngineConfig) -> PathBuf {
    arg.map(Path::to_path_buf)
        .unwrap_or_else(|| config.templates.dir.clone())
}

/// A template file and the outcome of parsing it.
pub struct TemplateFile {
    pub path: PathBuf,
    pub template: Result<Template, String>,
}

/// Read every `*.json` file in `dir`, sorted by path.
///
/// A missing directory yields no templates.
pub fn read_template_files(dir: &Path) -> anyhow::Result<Vec<TemplateFile>> {
    if !dir.is_dir() {
        warn!("Template directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let pattern = format!("{}/*.json", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut paths: Vec<PathBuf> = glob(&pattern)?.filter_map(|r| r.ok()).collect();
    paths.sort();

    let files = paths
        .into_iter()
        .map(|path| {
            let template = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| Template::from_json(&content).map_err(|e| e.to_string()));
            TemplateFile { path, template }
        })
        .collect();

    Ok(files)
}

/// Build a registry snapshot from a template directory.
///
/// Unparseable files are skipped with a warning; invalid templates end up in
/// the snapshot's rejected list.
pub fn load_snapshot(dir: &Path) -> anyhow::Result<Arc<RegistrySnapshot>> {
    let templates = read_template_files(dir)?
        .into_iter()
        .filter_map(|file| match file.template {
            Ok(template) => Some(template),
            Err(e) => {
                warn!("Skipping {}: {}", file.path.display(), e);
                None
            }
        });

    let registry = TemplateRegistry::new();
    let accepted = registry.load(templates);
    debug!("Loaded {} templates from {}", accepted, dir.display());

    Ok(registry.snapshot())
}

/// Read a normalized document. The id defaults to the file stem.
pub async fn read_document(path: &Path) -> anyhow::Result<Document> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut document = Document::from_json(&content)
        .with_context(|| format!("invalid document JSON in {}", path.display()))?;

    if document.id.is_empty() {
        document.id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
    }

    Ok(document)
}
