//! Mermaid rendering of process documents.
//!
//! Rendering is pure: the same document always yields byte-identical text,
//! and every step appears as exactly one node. Raster export is a separate,
//! optional step that shells out to the configured `mmdc` binary.

use crate::capability::{self, Capability, CapabilityStatus};
use crate::config::{CapabilityPolicy, Config};
use crate::document::{ProcessDocument, ProcessStep, SCHEMA_VERSION};
use crate::error::{ProcflowError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// DiagramKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramKind {
    #[default]
    Flowchart,
    Swimlane,
    Bpmn,
}

impl DiagramKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagramKind::Flowchart => "flowchart",
            DiagramKind::Swimlane => "swimlane",
            DiagramKind::Bpmn => "bpmn",
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagramKind {
    type Err = ProcflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flowchart" => Ok(DiagramKind::Flowchart),
            "swimlane" => Ok(DiagramKind::Swimlane),
            "bpmn" => Ok(DiagramKind::Bpmn),
            _ => Err(ProcflowError::InvalidArgument(format!(
                "unknown diagram type '{s}' (expected flowchart, swimlane or bpmn)"
            ))),
        }
    }
}

/// JSON envelope for the `map` command's json format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOutput {
    pub schema_version: String,
    pub process_name: String,
    pub diagram_type: DiagramKind,
    pub mermaid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl MapOutput {
    pub fn new(doc: &ProcessDocument, kind: DiagramKind, mermaid: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            process_name: doc.process_name.clone(),
            diagram_type: kind,
            mermaid,
            image: None,
            warnings: Vec::new(),
        }
    }
}

pub fn render(doc: &ProcessDocument, kind: DiagramKind) -> String {
    match kind {
        DiagramKind::Flowchart => render_flow(doc, &FLOWCHART),
        DiagramKind::Bpmn => render_flow(doc, &BPMN),
        DiagramKind::Swimlane => render_swimlane(doc),
    }
}

// ---------------------------------------------------------------------------
// Node helpers
// ---------------------------------------------------------------------------

fn node_id(step: &ProcessStep) -> String {
    let id: String = step
        .id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("n_{id}")
}

fn escape(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('"', "#quot;")
}

fn edge_label(text: &str) -> String {
    escape(text).replace('|', "/")
}

fn edge(out: &mut String, from: &str, label: Option<&str>, to: &str, arrow: &str) {
    match label {
        Some(l) => {
            let _ = writeln!(out, "    {from} {arrow}|{}| {to}", edge_label(l));
        }
        None => {
            let _ = writeln!(out, "    {from} {arrow} {to}");
        }
    }
}

/// Sequential units: each parallel group is one unit, singletons included.
fn units(doc: &ProcessDocument) -> Vec<Vec<&ProcessStep>> {
    doc.parallel_groups()
}

// ---------------------------------------------------------------------------
// Flowchart and BPMN-like
// ---------------------------------------------------------------------------

struct FlowStyle {
    header: &'static str,
    start: &'static str,
    finish: &'static str,
    task_open: &'static str,
    task_close: &'static str,
    /// Explicit fork gateway before a parallel group.
    fork: Option<&'static str>,
    join: &'static str,
    gateway_prefix: &'static str,
}

const FLOWCHART: FlowStyle = FlowStyle {
    header: "flowchart TD",
    start: "start([\"Start\"])",
    finish: "finish([\"End\"])",
    task_open: "[\"",
    task_close: "\"]",
    fork: None,
    join: "((\" \"))",
    gateway_prefix: "",
};

const BPMN: FlowStyle = FlowStyle {
    header: "flowchart LR",
    start: "start((\"Start\"))",
    finish: "finish(((\"End\")))",
    task_open: "(\"",
    task_close: "\")",
    fork: Some("{\"+\"}"),
    join: "{\"+\"}",
    gateway_prefix: "X ",
};

type Exits = Vec<(String, Option<String>)>;

fn render_flow(doc: &ProcessDocument, style: &FlowStyle) -> String {
    let mut nodes = String::new();
    let mut edges = String::new();
    let _ = writeln!(nodes, "    {}", style.start);

    let mut pending: Exits = vec![("start".to_string(), None)];
    for (i, unit) in units(doc).iter().enumerate() {
        if let [step] = unit.as_slice() {
            pending = flow_step(step, pending, style, &mut nodes, &mut edges);
            continue;
        }

        let entry: Exits = match style.fork {
            Some(shape) => {
                let fork = format!("fork_{}", i + 1);
                let _ = writeln!(nodes, "    {fork}{shape}");
                connect(&mut edges, &pending, &fork);
                vec![(fork, None)]
            }
            None => pending,
        };
        let join = format!("join_{}", i + 1);
        let mut branch_exits: Exits = Vec::new();
        for step in unit {
            branch_exits.extend(flow_step(step, entry.clone(), style, &mut nodes, &mut edges));
        }
        let _ = writeln!(nodes, "    {join}{}", style.join);
        connect(&mut edges, &branch_exits, &join);
        pending = vec![(join, None)];
    }

    let _ = writeln!(nodes, "    {}", style.finish);
    connect(&mut edges, &pending, "finish");

    format!("{}\n{nodes}{edges}", style.header)
}

fn connect(edges: &mut String, from: &Exits, to: &str) {
    for (node, label) in from {
        edge(edges, node, label.as_deref(), to, "-->");
    }
}

/// Emit a step and its decision gateways; returns the new exits.
fn flow_step(
    step: &ProcessStep,
    pending: Exits,
    style: &FlowStyle,
    nodes: &mut String,
    edges: &mut String,
) -> Exits {
    let id = node_id(step);
    let _ = writeln!(
        nodes,
        "    {id}{}{}{}",
        style.task_open,
        escape(step.display_name()),
        style.task_close
    );
    connect(edges, &pending, &id);

    let mut exits: Exits = vec![(id.clone(), None)];
    for (k, decision) in step.decisions.iter().enumerate() {
        let gateway = format!("{id}_d{}", k + 1);
        let _ = writeln!(
            nodes,
            "    {gateway}{{\"{}{}\"}}",
            style.gateway_prefix,
            escape(&decision.question)
        );
        connect(edges, &exits, &gateway);
        exits = if decision.options.is_empty() {
            vec![(gateway, None)]
        } else {
            decision
                .options
                .iter()
                .map(|o| (gateway.clone(), Some(o.clone())))
                .collect()
        };
    }
    exits
}

// ---------------------------------------------------------------------------
// Swimlane
// ---------------------------------------------------------------------------

const UNASSIGNED: &str = "Unassigned";

fn lane_of(step: &ProcessStep) -> &str {
    step.role_name().unwrap_or(UNASSIGNED)
}

fn render_swimlane(doc: &ProcessDocument) -> String {
    let mut lanes: Vec<String> = doc.derive_roles();
    if doc.steps.iter().any(|s| s.role_name().is_none()) {
        lanes.push(UNASSIGNED.to_string());
    }

    let mut out = String::from("flowchart LR\n");
    let ordered = doc.ordered_steps();
    for (i, lane) in lanes.iter().enumerate() {
        let _ = writeln!(out, "    subgraph lane_{}[\"{}\"]", i + 1, escape(lane));
        for step in ordered.iter().filter(|s| lane_of(s) == lane) {
            let _ = writeln!(out, "        {}[\"{}\"]", node_id(step), escape(step.display_name()));
        }
        out.push_str("    end\n");
    }

    let units = units(doc);
    for pair in units.windows(2) {
        for from in &pair[0] {
            for to in &pair[1] {
                let (a, b) = (node_id(from), node_id(to));
                if lane_of(from) == lane_of(to) {
                    edge(&mut out, &a, None, &b, "-->");
                } else {
                    let label = crossing_label(from, lane_of(to));
                    edge(&mut out, &a, Some(label.as_str()), &b, "-.->");
                }
            }
        }
    }
    out
}

/// The artifact when the step declares a handoff to the target role,
/// otherwise a generic label for an inferred crossing.
fn crossing_label(from: &ProcessStep, to_lane: &str) -> String {
    from.handoffs
        .iter()
        .find(|h| h.to_role.trim().eq_ignore_ascii_case(to_lane))
        .and_then(|h| h.artifact.as_deref())
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("handoff")
        .to_string()
}

// ---------------------------------------------------------------------------
// Raster export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterOutcome {
    Written(PathBuf),
    Skipped { warning: String },
}

const RASTER_FORMATS: &[&str] = &["png", "svg", "pdf"];

/// Export Mermaid text to an image via the rasterizer capability.
pub fn rasterize(diagram: &str, target: &Path, cfg: &Config) -> Result<RasterOutcome> {
    let ext = target
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let settings = Capability::Rasterizer.settings(cfg);
    let required = settings.policy == CapabilityPolicy::Required;
    if !RASTER_FORMATS.contains(&ext.as_str()) {
        let reason = format!(
            "image output must end in .png, .svg or .pdf: {}",
            target.display()
        );
        if required {
            return Err(ProcflowError::InvalidArgument(reason));
        }
        return Ok(skipped(&reason));
    }

    let status = capability::probe(Capability::Rasterizer, settings)
        .require_not_failed(Capability::Rasterizer)?;
    let program = match status {
        CapabilityStatus::Available { program } => program,
        CapabilityStatus::Degrade { reason } | CapabilityStatus::Fail { reason } => {
            return Ok(skipped(&reason));
        }
    };

    let mut source = tempfile::Builder::new()
        .prefix("procflow-")
        .suffix(".mmd")
        .tempfile()?;
    std::io::Write::write_all(&mut source, diagram.as_bytes())?;
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let run = capability::run_capture(
        Capability::Rasterizer,
        &program,
        &[
            OsStr::new("-i"),
            source.path().as_os_str(),
            OsStr::new("-o"),
            target.as_os_str(),
        ],
    );
    match run {
        Ok(_) => {
            tracing::info!(image = %target.display(), "diagram exported");
            Ok(RasterOutcome::Written(target.to_path_buf()))
        }
        Err(e) if !required => Ok(skipped(&e.to_string())),
        Err(e) => Err(e),
    }
}

fn skipped(reason: &str) -> RasterOutcome {
    let warning = format!("image export skipped: {reason}");
    tracing::warn!("{warning}");
    RasterOutcome::Skipped { warning }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CapabilityPolicy;
    use crate::document::tests::doc_with_steps;
    use crate::document::{Decision, Handoff};
    use crate::error::ErrorKind;

    fn named(names: &[&str]) -> ProcessDocument {
        let mut doc = doc_with_steps(&vec![Some(5.0); names.len()]);
        for (step, name) in doc.steps.iter_mut().zip(names) {
            step.name = name.to_string();
        }
        doc
    }

    fn label_count(diagram: &str, name: &str) -> usize {
        diagram.matches(&format!("\"{name}\"")).count()
    }

    #[test]
    fn flowchart_is_sequential_and_deterministic() {
        let doc = named(&["Receive invoice", "Check PO", "Pay"]);
        let out = render(&doc, DiagramKind::Flowchart);
        assert!(out.starts_with("flowchart TD\n"));
        assert!(out.contains("    start --> n_step_001\n"));
        assert!(out.contains("    n_step_001 --> n_step_002\n"));
        assert!(out.contains("    n_step_003 --> finish\n"));
        for name in ["Receive invoice", "Check PO", "Pay"] {
            assert_eq!(label_count(&out, name), 1, "{name}");
        }
        assert_eq!(out, render(&doc, DiagramKind::Flowchart));
    }

    #[test]
    fn decisions_become_labelled_diamonds() {
        let mut doc = named(&["Review", "Archive"]);
        doc.steps[0].decisions.push(Decision {
            question: "Within budget?".to_string(),
            criteria: Some("amount <= budget".to_string()),
            options: vec!["Yes".to_string(), "No".to_string()],
        });
        let out = render(&doc, DiagramKind::Flowchart);
        assert!(out.contains("    n_step_001_d1{\"Within budget?\"}\n"));
        assert!(out.contains("    n_step_001 --> n_step_001_d1\n"));
        assert!(out.contains("    n_step_001_d1 -->|Yes| n_step_002\n"));
        assert!(out.contains("    n_step_001_d1 -->|No| n_step_002\n"));
    }

    #[test]
    fn parallel_groups_fan_out_and_join() {
        let mut doc = named(&["Intake", "Credit check", "Reference check", "Decide"]);
        doc.steps[1].parallel_steps = vec!["step_003".to_string()];
        doc.steps[2].parallel_steps = vec!["step_002".to_string()];
        let out = render(&doc, DiagramKind::Flowchart);
        assert!(out.contains("    n_step_001 --> n_step_002\n"));
        assert!(out.contains("    n_step_001 --> n_step_003\n"));
        assert!(out.contains("    n_step_002 --> join_2\n"));
        assert!(out.contains("    n_step_003 --> join_2\n"));
        assert!(out.contains("    join_2 --> n_step_004\n"));

        let bpmn = render(&doc, DiagramKind::Bpmn);
        assert!(bpmn.starts_with("flowchart LR\n"));
        assert!(bpmn.contains("    fork_2{\"+\"}\n"));
        assert!(bpmn.contains("    n_step_001 --> fork_2\n"));
        assert!(bpmn.contains("    fork_2 --> n_step_002\n"));
        assert!(bpmn.contains("    finish(((\"End\")))\n"));
    }

    #[test]
    fn swimlanes_mark_crossings() {
        let mut doc = named(&["Submit", "Approve", "File"]);
        doc.steps[0].role = Some("Employee".to_string());
        doc.steps[0].handoffs.push(Handoff {
            to_role: "Manager".to_string(),
            artifact: Some("expense form".to_string()),
        });
        doc.steps[1].role = Some("Manager".to_string());
        doc.steps[2].role = None;
        doc.normalize();

        let out = render(&doc, DiagramKind::Swimlane);
        assert!(out.contains("    subgraph lane_1[\"Employee\"]\n"));
        assert!(out.contains("    subgraph lane_3[\"Unassigned\"]\n"));
        assert!(out.contains("    n_step_001 -.->|expense form| n_step_002\n"));
        assert!(out.contains("    n_step_002 -.->|handoff| n_step_003\n"));
        for name in ["Submit", "Approve", "File"] {
            assert_eq!(label_count(&out, name), 1);
        }
    }

    #[test]
    fn empty_document_still_renders() {
        let doc = named(&[]);
        let out = render(&doc, DiagramKind::Flowchart);
        assert!(out.contains("    start --> finish\n"));
        assert_eq!(render(&doc, DiagramKind::Swimlane), "flowchart LR\n");
    }

    #[test]
    fn quotes_are_escaped() {
        let doc = named(&["Print \"final\" copy"]);
        let out = render(&doc, DiagramKind::Flowchart);
        assert!(out.contains("[\"Print #quot;final#quot; copy\"]"));
    }

    #[test]
    fn raster_export_degrades_without_mmdc() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.capabilities.rasterizer.command = "procflow-missing-mmdc".to_string();
        let outcome = rasterize("flowchart TD\n", &dir.path().join("d.png"), &cfg).unwrap();
        assert!(matches!(outcome, RasterOutcome::Skipped { .. }));

        cfg.capabilities.rasterizer.policy = CapabilityPolicy::Required;
        let err = rasterize("flowchart TD\n", &dir.path().join("d.png"), &cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);

        let err = rasterize("flowchart TD\n", &dir.path().join("d.gif"), &cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputError);
    }

    #[test]
    fn unsupported_image_extension_degrades_under_auto() {
        let dir = tempfile::TempDir::new().unwrap();
        let outcome = rasterize("flowchart TD\n", &dir.path().join("d.gif"), &Config::default()).unwrap();
        match outcome {
            RasterOutcome::Skipped { warning } => assert!(warning.contains(".png, .svg or .pdf")),
            other => panic!("expected skip, got {other:?}"),
        }
        assert!(!dir.path().join("d.gif").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failing_rasterizer_degrades_unless_required() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.capabilities.rasterizer.command = "false".to_string();
        let outcome = rasterize("flowchart TD\n", &dir.path().join("d.svg"), &cfg).unwrap();
        assert!(matches!(outcome, RasterOutcome::Skipped { .. }));

        cfg.capabilities.rasterizer.policy = CapabilityPolicy::Required;
        let err = rasterize("flowchart TD\n", &dir.path().join("d.svg"), &cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
    }
}
