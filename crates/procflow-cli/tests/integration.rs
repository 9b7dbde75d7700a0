#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const INVOICE: &str = "\
# Invoice Approval

Handles supplier invoices from receipt to payment.

## Steps

1. Receive invoice
   - Role: AP Clerk
   - Duration: 15 min
   - Outputs: invoice record
2. Validate invoice against PO
   - Role: AP Clerk
   - Duration: 30 min
   - Inputs: invoice record, purchase order
   - Handoff: Finance Manager (validated invoice)
3. Approve invoice
   - Role: Finance Manager
   - Duration: 1 hour
   - Decision: Is the amount within budget
   - Criteria: amount <= remaining budget
   - Options: Approve / Reject
4. Schedule payment (2 days)
   - Parallel with: 3
";

const STEP_NAMES: &[&str] = &[
    "Receive invoice",
    "Validate invoice against PO",
    "Approve invoice",
    "Schedule payment",
];

fn procflow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("procflow").unwrap();
    cmd.current_dir(dir.path()).env_remove("PROCFLOW_CONFIG");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

/// Parse the invoice fixture into `invoice.json` and return its path.
fn parsed_invoice(dir: &TempDir) -> PathBuf {
    write(dir, "invoice.md", INVOICE);
    let doc = dir.path().join("invoice.json");
    procflow(dir)
        .args(["parse", "--input", "invoice.md", "--output", "invoice.json"])
        .assert()
        .success();
    doc
}

// ---------------------------------------------------------------------------
// general
// ---------------------------------------------------------------------------

#[test]
fn help_exits_zero() {
    let dir = TempDir::new().unwrap();
    procflow(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("prioritize"));
    procflow(&dir).args(["map", "--help"]).assert().success();
}

#[test]
fn invalid_config_aborts_with_input_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, "bad.yaml", "prioritization:\n  reach: -5\n");
    procflow(&dir)
        .args(["--config", "bad.yaml", "capabilities"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[InputError]"));
}

#[test]
fn capabilities_reports_every_capability() {
    let dir = TempDir::new().unwrap();
    let output = procflow(&dir)
        .args(["capabilities", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let names: Vec<String> = stdout_json(&output)
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["ocr", "rasterizer"]);
}

// ---------------------------------------------------------------------------
// parse
// ---------------------------------------------------------------------------

#[test]
fn parse_text_document() {
    let dir = TempDir::new().unwrap();
    let doc = read_json(&parsed_invoice(&dir));

    assert_eq!(doc["schemaVersion"], "1.0");
    assert_eq!(doc["processName"], "Invoice Approval");
    assert_eq!(doc["source"]["type"], "file");
    let steps = doc["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 4);
    assert_eq!(steps[0]["id"], "step_001");
    assert_eq!(steps[0]["role"], "AP Clerk");
    assert_eq!(steps[3]["parallelSteps"][0], "step_003");
    assert_eq!(doc["roles"][0], "AP Clerk");
}

#[test]
fn parse_missing_file_is_input_error() {
    let dir = TempDir::new().unwrap();
    procflow(&dir)
        .args(["parse", "--input", "nope.md"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[InputError]"));
}

#[test]
fn parse_rejects_non_http_urls() {
    let dir = TempDir::new().unwrap();
    for url in ["file:///etc/passwd", "javascript:alert(1)", "ftp://example.com/p.txt"] {
        procflow(&dir)
            .args(["parse", "--input", url])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("error[InputError]"));
    }
}

#[test]
fn parse_image_without_ocr_degrades() {
    let dir = TempDir::new().unwrap();
    write(&dir, "ocr.yaml", "capabilities:\n  ocr:\n    command: procflow-missing-ocr\n");
    std::fs::write(dir.path().join("whiteboard.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let output = procflow(&dir)
        .args(["--config", "ocr.yaml", "parse", "--input", "whiteboard.png"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc = stdout_json(&output);
    assert_eq!(doc["source"]["type"], "image");
    assert_eq!(doc["steps"].as_array().unwrap().len(), 0);
    assert_eq!(doc["confidenceScore"], 0.0);
    let gaps = doc["gaps"].as_array().unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0]["severity"], "critical");
    assert_eq!(gaps[0]["type"], "missingInfo");
}

#[test]
fn parse_image_with_required_ocr_fails() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "ocr.yaml",
        "capabilities:\n  ocr:\n    command: procflow-missing-ocr\n    policy: required\n",
    );
    std::fs::write(dir.path().join("whiteboard.png"), [0u8; 4]).unwrap();

    procflow(&dir)
        .args(["--config", "ocr.yaml", "parse", "--input", "whiteboard.png"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("error[CapabilityUnavailable]"));
}

#[test]
fn parse_markdown_format() {
    let dir = TempDir::new().unwrap();
    write(&dir, "invoice.md", INVOICE);
    procflow(&dir)
        .args(["parse", "--input", "invoice.md", "--format", "markdown"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Invoice Approval"))
        .stdout(predicate::str::contains("| 4 | step_004 | Schedule payment |"));
}

// ---------------------------------------------------------------------------
// map
// ---------------------------------------------------------------------------

#[test]
fn map_contains_each_step_once() {
    let dir = TempDir::new().unwrap();
    parsed_invoice(&dir);

    for kind in ["flowchart", "swimlane", "bpmn"] {
        let output = procflow(&dir)
            .args(["map", "--input", "invoice.json", "--type", kind])
            .output()
            .unwrap();
        assert!(output.status.success(), "{kind}");
        let diagram = String::from_utf8(output.stdout).unwrap();
        for name in STEP_NAMES {
            assert_eq!(
                diagram.matches(&format!("\"{name}\"")).count(),
                1,
                "{kind}: {name}"
            );
        }
    }
}

#[test]
fn map_rejects_unknown_schema_version() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "future.json",
        r#"{"schemaVersion": "99.0", "processName": "Future", "steps": []}"#,
    );
    procflow(&dir)
        .args(["map", "--input", "future.json"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error[SchemaError]"));
}

#[test]
fn map_image_export_degrades_without_mmdc() {
    let dir = TempDir::new().unwrap();
    parsed_invoice(&dir);
    write(&dir, "cfg.yaml", "capabilities:\n  rasterizer:\n    command: procflow-missing-mmdc\n");

    let output = procflow(&dir)
        .args([
            "--config", "cfg.yaml", "map", "--input", "invoice.json", "--format", "json",
            "--image", "flow.png",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let out = stdout_json(&output);
    assert!(out["mermaid"].as_str().unwrap().starts_with("flowchart TD"));
    assert_eq!(out["warnings"].as_array().unwrap().len(), 1);
    assert!(!dir.path().join("flow.png").exists());
}

#[test]
fn map_unsupported_image_extension_still_prints_diagram() {
    let dir = TempDir::new().unwrap();
    parsed_invoice(&dir);

    let output = procflow(&dir)
        .args(["map", "--input", "invoice.json", "--image", "flow.gif"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let diagram = String::from_utf8(output.stdout).unwrap();
    assert!(diagram.starts_with("flowchart TD"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("image export skipped"));
    assert!(!dir.path().join("flow.gif").exists());
}

// ---------------------------------------------------------------------------
// gaps / efficiency
// ---------------------------------------------------------------------------

#[test]
fn gaps_severity_filter_keeps_critical_and_high() {
    let dir = TempDir::new().unwrap();
    parsed_invoice(&dir);

    let all = procflow(&dir)
        .args(["gaps", "--input", "invoice.json"])
        .output()
        .unwrap();
    let all = stdout_json(&all);

    let filtered = procflow(&dir)
        .args(["gaps", "--input", "invoice.json", "--severity", "high"])
        .output()
        .unwrap();
    let filtered = stdout_json(&filtered);

    let expected = all["summary"]["critical"].as_u64().unwrap()
        + all["summary"]["high"].as_u64().unwrap();
    assert_eq!(filtered["summary"]["total"].as_u64().unwrap(), expected);
    for gap in filtered["gaps"].as_array().unwrap() {
        let sev = gap["severity"].as_str().unwrap();
        assert!(sev == "critical" || sev == "high", "{sev}");
    }
}

#[test]
fn gaps_write_back_replaces_document_gaps() {
    let dir = TempDir::new().unwrap();
    let doc_path = parsed_invoice(&dir);

    procflow(&dir)
        .args(["gaps", "--input", "invoice.json", "--write-back", "--output", "gaps.json"])
        .assert()
        .success();
    let doc = read_json(&doc_path);
    let report = read_json(&dir.path().join("gaps.json"));
    assert_eq!(doc["gaps"], report["gaps"]);

    // A second run over the updated document yields the same gaps.
    let again = procflow(&dir)
        .args(["gaps", "--input", "invoice.json"])
        .output()
        .unwrap();
    assert_eq!(stdout_json(&again)["gaps"], report["gaps"]);
}

#[test]
fn efficiency_reports_parallel_cycle_time() {
    let dir = TempDir::new().unwrap();
    let doc_path = parsed_invoice(&dir);

    let output = procflow(&dir)
        .args(["efficiency", "--input", "invoice.json", "--write-back"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    // 15 + 30 + max(60, 2 days)
    assert_eq!(report["metrics"]["cycleTimeMinutes"], 15.0 + 30.0 + 2880.0);
    assert_eq!(report["metrics"]["waitTimeMinutes"], Value::Null);
    assert_eq!(report["waste"].as_array().unwrap().len(), 7);

    let doc = read_json(&doc_path);
    assert_eq!(doc["metrics"]["stepCount"], 4);
}

// ---------------------------------------------------------------------------
// compare
// ---------------------------------------------------------------------------

#[test]
fn compare_reports_removed_step() {
    let dir = TempDir::new().unwrap();
    let doc_path = parsed_invoice(&dir);

    let mut proposed = read_json(&doc_path);
    proposed["steps"].as_array_mut().unwrap().remove(1);
    std::fs::write(
        dir.path().join("proposed.json"),
        serde_json::to_string_pretty(&proposed).unwrap(),
    )
    .unwrap();

    let output = procflow(&dir)
        .args(["compare", "--input", "invoice.json", "--proposed", "proposed.json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let cmp = stdout_json(&output);
    assert_eq!(cmp["strategy"], "id");
    assert_eq!(cmp["removed"][0]["id"], "step_002");
    assert_eq!(cmp["added"].as_array().unwrap().len(), 0);
    assert_eq!(cmp["deltas"]["stepCount"]["delta"], -1.0);
    assert_eq!(cmp["deltas"]["cycleTimeMinutes"]["delta"], -30.0);
}

// ---------------------------------------------------------------------------
// prioritize
// ---------------------------------------------------------------------------

#[test]
fn prioritize_requires_gap_report() {
    let dir = TempDir::new().unwrap();
    procflow(&dir)
        .args(["prioritize", "--input", "missing-gaps.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[InputError]"));
}

#[test]
fn prioritize_rejects_invalid_gap_report() {
    let dir = TempDir::new().unwrap();
    write(&dir, "gaps.json", r#"{"schemaVersion": "1.0", "gaps": 7}"#);
    procflow(&dir)
        .args(["prioritize", "--input", "gaps.json"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error[SchemaError]"));
}

#[test]
fn prioritize_pipeline_exports_csv() {
    let dir = TempDir::new().unwrap();
    parsed_invoice(&dir);
    procflow(&dir)
        .args(["gaps", "--input", "invoice.json", "--output", "gaps.json"])
        .assert()
        .success();
    procflow(&dir)
        .args(["efficiency", "--input", "invoice.json", "--output", "efficiency.json"])
        .assert()
        .success();
    write(
        &dir,
        "manual.json",
        r#"[{"title": "Broken effort", "impact": "high", "confidence": 1.0, "effort": 0}]"#,
    );

    let json = procflow(&dir)
        .args([
            "prioritize", "--input", "gaps.json", "--efficiency", "efficiency.json",
            "--candidates", "manual.json",
        ])
        .output()
        .unwrap();
    assert!(json.status.success());
    let result = stdout_json(&json);
    assert_eq!(result["rejected"].as_array().unwrap().len(), 1);
    assert_eq!(result["rejected"][0]["title"], "Broken effort");
    let ranks: Vec<u64> = result["improvements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["rank"].as_u64().unwrap())
        .collect();
    assert_eq!(ranks, (1..=ranks.len() as u64).collect::<Vec<_>>());

    procflow(&dir)
        .args(["prioritize", "--input", "gaps.json", "--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "rank,id,title,category,reach,impact,confidence,effort,score\n",
        ));
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[test]
fn validate_reports_violations() {
    let dir = TempDir::new().unwrap();
    let doc_path = parsed_invoice(&dir);
    procflow(&dir)
        .args(["validate", "--input", "invoice.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"));

    let mut doc = read_json(&doc_path);
    doc["steps"][1]["id"] = Value::from("step_001");
    std::fs::write(&doc_path, doc.to_string()).unwrap();
    procflow(&dir)
        .args(["validate", "--input", "invoice.json"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("duplicate step id 'step_001'"));
}
