use crate::error::{ProcflowError, Result};
use crate::types::{AutomationPotential, GapType, Severity, SourceType};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

pub const SCHEMA_VERSION: &str = "1.0";
pub const SCHEMA_MAJOR: u32 = 1;

static STEP_ID_RE: OnceLock<Regex> = OnceLock::new();

fn step_id_re() -> &'static Regex {
    STEP_ID_RE.get_or_init(|| Regex::new(r"^step_(\d{3,})$").unwrap())
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub location: String,
    pub parsed_at: DateTime<Utc>,
}

impl Source {
    pub fn new(source_type: SourceType, location: impl Into<String>) -> Self {
        Self {
            source_type,
            location: location.into(),
            parsed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Step parts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub question: String,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handoff {
    pub to_role: String,
    #[serde(default)]
    pub artifact: Option<String>,
}

fn default_confidence() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// ProcessStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStep {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub effort_hours: Option<f64>,
    /// Explicitly modelled queue time before the step starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_minutes: Option<f64>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub handoffs: Vec<Handoff>,
    #[serde(default)]
    pub automation_potential: AutomationPotential,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub parallel_steps: Vec<String>,
}

impl ProcessStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>, sequence: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            role: None,
            duration_minutes: None,
            effort_hours: None,
            wait_minutes: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            decisions: Vec::new(),
            handoffs: Vec::new(),
            automation_potential: AutomationPotential::default(),
            confidence: default_confidence(),
            sequence,
            parallel_steps: Vec::new(),
        }
    }

    /// The role, ignoring blank strings left behind by hand edits.
    pub fn role_name(&self) -> Option<&str> {
        self.role.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }

    /// Duration usable in timing arithmetic (finite and non-negative).
    pub fn duration(&self) -> Option<f64> {
        self.duration_minutes.filter(|d| d.is_finite() && *d >= 0.0)
    }

    pub fn wait(&self) -> Option<f64> {
        self.wait_minutes.filter(|w| w.is_finite() && *w >= 0.0)
    }

    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            &self.id
        } else {
            name
        }
    }
}

// ---------------------------------------------------------------------------
// Gap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gap {
    #[serde(rename = "type")]
    pub gap_type: GapType,
    pub severity: Severity,
    #[serde(default)]
    pub step_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
}

impl Gap {
    pub fn new(
        gap_type: GapType,
        severity: Severity,
        step_id: Option<&str>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            gap_type,
            severity,
            step_id: step_id.map(str::to_string),
            description: description.into(),
            impact: String::new(),
            suggested_questions: Vec::new(),
        }
    }

    pub fn with_impact(mut self, impact: impl Into<String>) -> Self {
        self.impact = impact.into();
        self
    }

    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.suggested_questions = questions;
        self
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Cached timing figures. Regenerated by the efficiency analyzer; readers
/// must tolerate absence and staleness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub cycle_time_minutes: Option<f64>,
    pub processing_time_minutes: Option<f64>,
    pub wait_time_minutes: Option<f64>,
    pub total_work_minutes: Option<f64>,
    pub efficiency_percent: Option<f64>,
    #[serde(default)]
    pub step_count: usize,
    #[serde(default)]
    pub steps_with_duration: usize,
    #[serde(default)]
    pub handoff_count: usize,
    #[serde(default)]
    pub bottleneck_step_ids: Vec<String>,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ProcessDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDocument {
    pub schema_version: String,
    pub process_name: String,
    #[serde(default)]
    pub process_owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub source: Source,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub steps: Vec<ProcessStep>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub metrics: Option<Metrics>,
    #[serde(default)]
    pub gaps: Vec<Gap>,
}

impl ProcessDocument {
    pub fn new(process_name: impl Into<String>, source: Source) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            process_name: process_name.into(),
            process_owner: None,
            description: None,
            source,
            confidence_score: 0.0,
            steps: Vec::new(),
            roles: Vec::new(),
            metrics: None,
            gaps: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(path: &Path) -> Result<Self> {
        let mut doc: ProcessDocument = load_versioned(path)?;
        doc.validate()?;
        doc.normalize();
        Ok(doc)
    }

    pub fn from_json(text: &str, origin: &Path) -> Result<Self> {
        let mut doc: ProcessDocument = from_versioned_str(text, origin)?;
        doc.validate()?;
        doc.normalize();
        Ok(doc)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::io::atomic_write(path, self.to_json_pretty()?.as_bytes())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    /// Every violated invariant, in document order.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();

        if self.process_name.trim().is_empty() {
            out.push("processName is empty".to_string());
        }
        if !in_unit_range(self.confidence_score) {
            out.push(format!(
                "confidenceScore {} is outside [0, 1]",
                self.confidence_score
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if !step_id_re().is_match(&step.id) {
                out.push(format!(
                    "step id '{}' does not match pattern step_NNN",
                    step.id
                ));
            }
            if !seen.insert(step.id.as_str()) {
                out.push(format!("duplicate step id '{}'", step.id));
            }
            if !in_unit_range(step.confidence) {
                out.push(format!(
                    "step '{}' confidence {} is outside [0, 1]",
                    step.id, step.confidence
                ));
            }
            for (field, value) in [
                ("durationMinutes", step.duration_minutes),
                ("effortHours", step.effort_hours),
                ("waitMinutes", step.wait_minutes),
            ] {
                if let Some(v) = value {
                    if !v.is_finite() || v < 0.0 {
                        out.push(format!(
                            "step '{}' {field} must be a non-negative number, got {v}",
                            step.id
                        ));
                    }
                }
            }
        }
        out
    }

    pub fn validate(&self) -> Result<()> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ProcflowError::SchemaViolation(violations.join("; ")))
        }
    }

    /// Re-derive the fields that are functions of `steps`.
    pub fn normalize(&mut self) {
        let roles = self.derive_roles();
        if roles != self.roles {
            tracing::debug!(
                stored = ?self.roles,
                derived = ?roles,
                "roles out of sync with steps, re-deriving"
            );
            self.roles = roles;
        }
        self.recompute_confidence();
    }

    /// Role names from steps, in first-appearance order of `sequence`.
    pub fn derive_roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = Vec::new();
        for step in self.ordered_steps() {
            if let Some(role) = step.role_name() {
                if !roles.iter().any(|r| r == role) {
                    roles.push(role.to_string());
                }
            }
        }
        roles
    }

    pub fn recompute_confidence(&mut self) {
        self.confidence_score = if self.steps.is_empty() {
            0.0
        } else {
            let sum: f64 = self.steps.iter().map(|s| s.confidence).sum();
            round2(sum / self.steps.len() as f64)
        };
    }

    // -----------------------------------------------------------------------
    // Step helpers
    // -----------------------------------------------------------------------

    /// Steps sorted by `sequence`, ties kept in list order.
    pub fn ordered_steps(&self) -> Vec<&ProcessStep> {
        let mut steps: Vec<&ProcessStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.sequence);
        steps
    }

    pub fn step(&self, id: &str) -> Option<&ProcessStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Next free id; existing ids are never reused or renumbered.
    pub fn next_step_id(&self) -> String {
        let max = self
            .steps
            .iter()
            .filter_map(|s| step_id_re().captures(&s.id))
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("step_{:03}", max + 1)
    }

    /// Append a step with a fresh id and the next sequence number.
    pub fn push_step(&mut self, name: impl Into<String>) -> &mut ProcessStep {
        let id = self.next_step_id();
        let sequence = self.steps.iter().map(|s| s.sequence).max().unwrap_or(0) + 1;
        self.steps.push(ProcessStep::new(id, name, sequence));
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    /// Steps grouped by the symmetric closure of `parallelSteps`.
    ///
    /// References to unknown ids (and self references) are ignored, so
    /// asymmetric or dangling data never merges unrelated steps. Groups are
    /// ordered by their earliest member; members keep `sequence` order.
    pub fn parallel_groups(&self) -> Vec<Vec<&ProcessStep>> {
        let ordered = self.ordered_steps();
        let index: HashMap<&str, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        let mut parent: Vec<usize> = (0..ordered.len()).collect();
        for (i, step) in ordered.iter().enumerate() {
            for other in &step.parallel_steps {
                if let Some(&j) = index.get(other.as_str()) {
                    if i != j {
                        union(&mut parent, i, j);
                    }
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<&ProcessStep>> = BTreeMap::new();
        let mut first_seen: HashMap<usize, usize> = HashMap::new();
        for (i, step) in ordered.iter().enumerate() {
            let root = find(&mut parent, i);
            let key = *first_seen.entry(root).or_insert(i);
            groups.entry(key).or_default().push(step);
        }
        groups.into_values().collect()
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

fn in_unit_range(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Versioned JSON artifacts
// ---------------------------------------------------------------------------

/// Reject documents whose `schemaVersion` major differs from ours.
pub fn check_schema_version(value: &serde_json::Value) -> Result<()> {
    let version = value
        .get("schemaVersion")
        .and_then(|v| v.as_str())
        .ok_or(ProcflowError::MissingSchemaVersion)?;
    let major = version
        .split('.')
        .next()
        .and_then(|m| m.trim().parse::<u32>().ok());
    if major == Some(SCHEMA_MAJOR) {
        Ok(())
    } else {
        Err(ProcflowError::UnsupportedSchemaVersion {
            found: version.to_string(),
            supported: SCHEMA_MAJOR,
        })
    }
}

/// Load any `schemaVersion`-stamped JSON artifact (document or report).
pub fn load_versioned<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = crate::io::read_input(path)?;
    from_versioned_str(&text, path)
}

/// Syntax problems are input errors; well-formed JSON with the wrong shape
/// is a schema error. The version is checked before the shape.
pub fn from_versioned_str<T: DeserializeOwned>(text: &str, origin: &Path) -> Result<T> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProcflowError::MalformedInput {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
    check_schema_version(&value)?;
    serde_json::from_value(value).map_err(|e| ProcflowError::SchemaViolation(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
