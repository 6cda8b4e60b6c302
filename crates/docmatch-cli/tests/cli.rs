use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn docmatch(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("docmatch").unwrap();
    // Keep the user's config file out of the way.
    cmd.env("HOME", home).env("XDG_CONFIG_HOME", home.join(".config"));
    cmd
}

fn standard_document() -> Value {
    json!({
        "id": "TP-030",
        "document_type_hint": "docx",
        "blocks": [
            {"text": "압연 설비 점검 기준서", "kind": "title"},
            {"text": "문서번호: TP-030-030-050"},
            {"text": "시행일: 25.07.28"},
            {"text": "1. 목적", "section_path": ["1. 목적"]},
            {"text": "2. 적용 범위", "section_path": ["2. 적용 범위"]}
        ]
    })
}

fn technical_template() -> Value {
    json!({
        "id": "technical_standard_v1",
        "name": "Technical standard",
        "document_type": "docx",
        "section_patterns": ["목적", "적용\\s*범위"],
        "elements": [
            {
                "name": "document_number",
                "element_type": "fixed",
                "extraction_method": "regex",
                "patterns": ["문서번호\\s*[:：]\\s*([A-Z]{2}-\\d{3}-\\d{3}-\\d{3})"],
                "required": true
            },
            {
                "name": "effective_date",
                "element_type": "fixed",
                "extraction_method": "regex",
                "patterns": ["시행일\\s*[:：]\\s*(\\d{2}\\.\\d{2}\\.\\d{2})"],
                "required": true
            }
        ]
    })
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(
            dir.path().join("templates/technical.json"),
            technical_template().to_string(),
        )
        .unwrap();
        fs::write(
            dir.path().join("docs/TP-030.json"),
            standard_document().to_string(),
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, relative: &str) -> std::path::PathBuf {
        self.dir.path().join(relative)
    }

    fn cmd(&self) -> Command {
        let mut cmd = docmatch(self.dir.path());
        cmd.current_dir(self.dir.path());
        cmd
    }
}

#[test]
fn test_help() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("annotate"))
        .stdout(predicate::str::contains("templates"));
}

#[test]
fn test_annotate_selects_template() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["annotate", "docs/TP-030.json", "--templates", "templates"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["document_id"], "TP-030");
    assert_eq!(result["template_id"], "technical_standard_v1");
    assert_eq!(result["fields"]["document_number"]["value"], "TP-030-030-050");
    assert_eq!(result["fields"]["effective_date"]["value"], "25.07.28");
}

#[test]
fn test_annotate_text_output() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["annotate", "docs/TP-030.json", "-t", "templates", "-f", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Template: technical_standard_v1"))
        .stdout(predicate::str::contains("TP-030-030-050"));
}

#[test]
fn test_annotate_without_templates_falls_back() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["annotate", "docs/TP-030.json", "--templates", "missing"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(result["template_id"].is_null());
    assert_eq!(result["fields"]["document_number"]["source"], "auto");
}

#[test]
fn test_annotate_rejects_document_without_blocks() {
    let ws = Workspace::new();
    fs::write(ws.path("docs/empty.json"), r#"{"id": "empty", "blocks": []}"#).unwrap();

    ws.cmd()
        .args(["annotate", "docs/empty.json", "-t", "templates"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no blocks"));
}

#[test]
fn test_annotate_writes_output_file() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["annotate", "docs/TP-030.json", "-t", "templates", "-o", "out.json", "--pretty"])
        .assert()
        .success();

    let result: Value = serde_json::from_str(&fs::read_to_string(ws.path("out.json")).unwrap()).unwrap();
    assert_eq!(result["template_id"], "technical_standard_v1");
}

#[test]
fn test_templates_list_and_check() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["templates", "list", "--dir", "templates"])
        .assert()
        .success()
        .stdout(predicate::str::contains("technical_standard_v1"));

    ws.cmd()
        .args(["templates", "check", "--dir", "templates"])
        .assert()
        .success();
}

#[test]
fn test_templates_check_reports_invalid_pattern() {
    let ws = Workspace::new();
    let mut broken = technical_template();
    broken["id"] = json!("broken");
    broken["elements"][0]["patterns"] = json!(["([unclosed"]);
    fs::write(ws.path("templates/broken.json"), broken.to_string()).unwrap();

    ws.cmd()
        .args(["templates", "check", "--dir", "templates"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid pattern"))
        .stdout(predicate::str::contains("technical_standard_v1"));
}

#[test]
fn test_templates_derive_round_trip() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["annotate", "docs/TP-030.json", "-t", "templates", "-o", "result.json"])
        .assert()
        .success();

    ws.cmd()
        .args([
            "templates",
            "derive",
            "result.json",
            "--id",
            "derived_v1",
            "--document-type",
            "docx",
            "--dir",
            "templates",
        ])
        .assert()
        .success();

    let derived: Value =
        serde_json::from_str(&fs::read_to_string(ws.path("templates/derived_v1.json")).unwrap()).unwrap();
    assert_eq!(derived["id"], "derived_v1");

    ws.cmd()
        .args(["templates", "check", "--dir", "templates"])
        .assert()
        .success()
        .stdout(predicate::str::contains("derived_v1"));
}

#[test]
fn test_batch_with_summary_and_failures() {
    let ws = Workspace::new();
    fs::write(ws.path("docs/broken.json"), "{not json").unwrap();

    ws.cmd()
        .args([
            "batch",
            "docs/*.json",
            "-t",
            "templates",
            "-o",
            "out",
            "--summary",
            "--continue-on-error",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Batch complete"));

    assert!(ws.path("out/TP-030.annotation.json").exists());
    assert!(!ws.path("out/broken.annotation.json").exists());

    let summary = fs::read_to_string(ws.path("out/summary.csv")).unwrap();
    assert!(summary.starts_with("filename,status"));
    assert!(summary.contains("TP-030.json,success,TP-030,technical_standard_v1"));
    assert!(summary.contains("broken.json,error"));
}

#[test]
fn test_batch_stops_on_error_by_default() {
    let ws = Workspace::new();
    fs::write(ws.path("docs/broken.json"), "{not json").unwrap();

    ws.cmd()
        .args(["batch", "docs/*.json", "-t", "templates"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.json"));
}

#[test]
fn test_config_init_and_set() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["--config", "config.json", "config", "init"])
        .assert()
        .success();

    ws.cmd()
        .args(["--config", "config.json", "config", "set", "matching.forced_template_id", "technical_standard_v1"])
        .assert()
        .success();

    ws.cmd()
        .args(["--config", "config.json", "config", "get", "matching.forced_template_id"])
        .assert()
        .success()
        .stdout(predicate::str::contains("technical_standard_v1"));

    ws.cmd()
        .args(["--config", "config.json", "config", "set", "matching.overlap_threshold", "2.0"])
        .assert()
        .failure();
}

#[test]
fn test_config_file_forces_template() {
    let ws = Workspace::new();
    fs::write(
        ws.path("config.json"),
        json!({"matching": {"forced_template_id": "technical_standard_v1"}}).to_string(),
    )
    .unwrap();

    let output = ws
        .cmd()
        .args(["--config", "config.json", "annotate", "docs/TP-030.json", "-t", "templates"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["template_id"], "technical_standard_v1");
}
