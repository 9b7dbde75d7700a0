use crate::config::Config;
use crate::document::{round2, Metrics, ProcessDocument, ProcessStep, SCHEMA_VERSION};
use crate::efficiency;
use crate::error::{ProcflowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// MatchStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Ids when the two documents share any, names otherwise.
    #[default]
    Auto,
    Id,
    Name,
}

impl MatchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStrategy::Auto => "auto",
            MatchStrategy::Id => "id",
            MatchStrategy::Name => "name",
        }
    }

    fn resolve(self, current: &ProcessDocument, proposed: &ProcessDocument) -> MatchStrategy {
        match self {
            MatchStrategy::Auto => {
                let ids: HashSet<&str> = current.steps.iter().map(|s| s.id.as_str()).collect();
                if proposed.steps.iter().any(|s| ids.contains(s.id.as_str())) {
                    MatchStrategy::Id
                } else {
                    MatchStrategy::Name
                }
            }
            other => other,
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStrategy {
    type Err = ProcflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(MatchStrategy::Auto),
            "id" => Ok(MatchStrategy::Id),
            "name" => Ok(MatchStrategy::Name),
            _ => Err(ProcflowError::InvalidArgument(format!(
                "unknown match strategy '{s}' (expected auto, id or name)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRef {
    pub id: String,
    pub name: String,
}

impl StepRef {
    fn of(step: &ProcessStep) -> Self {
        Self {
            id: step.id.clone(),
            name: step.display_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    pub before: Value,
    pub after: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepChange {
    pub current_id: String,
    pub proposed_id: String,
    pub name: String,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDelta {
    pub current: Option<f64>,
    pub proposed: Option<f64>,
    /// `proposed - current`; null when either side is unknown.
    pub delta: Option<f64>,
}

impl MetricDelta {
    fn new(current: Option<f64>, proposed: Option<f64>) -> Self {
        let delta = match (current, proposed) {
            (Some(c), Some(p)) => Some(round2(p - c)),
            _ => None,
        };
        Self {
            current,
            proposed,
            delta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deltas {
    pub cycle_time_minutes: MetricDelta,
    pub processing_time_minutes: MetricDelta,
    pub wait_time_minutes: MetricDelta,
    pub efficiency_percent: MetricDelta,
    pub step_count: MetricDelta,
    pub handoff_count: MetricDelta,
    /// Relative change of cycle time; null when the current cycle time is
    /// unknown or zero.
    pub cycle_time_change_percent: Option<f64>,
}

impl Deltas {
    fn between(current: &Metrics, proposed: &Metrics) -> Self {
        let change_percent = match (current.cycle_time_minutes, proposed.cycle_time_minutes) {
            (Some(c), Some(p)) if c > 0.0 => Some(round2((p - c) / c * 100.0)),
            _ => None,
        };
        Self {
            cycle_time_minutes: MetricDelta::new(
                current.cycle_time_minutes,
                proposed.cycle_time_minutes,
            ),
            processing_time_minutes: MetricDelta::new(
                current.processing_time_minutes,
                proposed.processing_time_minutes,
            ),
            wait_time_minutes: MetricDelta::new(
                current.wait_time_minutes,
                proposed.wait_time_minutes,
            ),
            efficiency_percent: MetricDelta::new(
                current.efficiency_percent,
                proposed.efficiency_percent,
            ),
            step_count: MetricDelta::new(
                Some(current.step_count as f64),
                Some(proposed.step_count as f64),
            ),
            handoff_count: MetricDelta::new(
                Some(current.handoff_count as f64),
                Some(proposed.handoff_count as f64),
            ),
            cycle_time_change_percent: change_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub schema_version: String,
    pub current_process: String,
    pub proposed_process: String,
    pub compared_at: DateTime<Utc>,
    /// The strategy actually used (`auto` is resolved).
    pub strategy: MatchStrategy,
    pub added: Vec<StepRef>,
    pub removed: Vec<StepRef>,
    pub modified: Vec<StepChange>,
    pub unchanged: usize,
    pub current_metrics: Metrics,
    pub proposed_metrics: Metrics,
    pub deltas: Deltas,
}

impl Comparison {
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::io::atomic_write(path, self.to_json_pretty()?.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Fields diffed on every matched pair, in report order.
const FIELDS: &[&str] = &[
    "name",
    "description",
    "role",
    "durationMinutes",
    "effortHours",
    "waitMinutes",
    "inputs",
    "outputs",
    "decisions",
    "handoffs",
    "automationPotential",
    "confidence",
    "sequence",
    "parallelSteps",
];

/// Pairs of (current, proposed) steps, both in `sequence` order.
fn match_steps<'a>(
    current: &[&'a ProcessStep],
    proposed: &[&'a ProcessStep],
    strategy: MatchStrategy,
) -> Vec<(&'a ProcessStep, &'a ProcessStep)> {
    // Blank keys never match; such steps show up as added or removed.
    let key = |s: &ProcessStep| {
        let k = match strategy {
            MatchStrategy::Name => s.name.trim(),
            _ => s.id.trim(),
        };
        (!k.is_empty()).then(|| k.to_string())
    };

    let mut queues: HashMap<String, VecDeque<&'a ProcessStep>> = HashMap::new();
    for &step in proposed {
        if let Some(k) = key(step) {
            queues.entry(k).or_default().push_back(step);
        }
    }
    current
        .iter()
        .filter_map(|&c| {
            let p = queues.get_mut(&key(c)?)?.pop_front()?;
            Some((c, p))
        })
        .collect()
}

fn diff_step(current: &ProcessStep, proposed: &ProcessStep, include_id: bool) -> Result<Vec<FieldChange>> {
    let before = serde_json::to_value(current)?;
    let after = serde_json::to_value(proposed)?;
    let fields = include_id.then_some("id").into_iter().chain(FIELDS.iter().copied());

    Ok(fields
        .filter_map(|field| {
            let b = before.get(field).cloned().unwrap_or(Value::Null);
            let a = after.get(field).cloned().unwrap_or(Value::Null);
            (b != a).then(|| FieldChange {
                field: field.to_string(),
                before: b,
                after: a,
            })
        })
        .collect())
}

pub fn compare(
    current: &ProcessDocument,
    proposed: &ProcessDocument,
    strategy: MatchStrategy,
    config: &Config,
) -> Result<Comparison> {
    let strategy = strategy.resolve(current, proposed);
    let cur_steps = current.ordered_steps();
    let prop_steps = proposed.ordered_steps();
    let pairs = match_steps(&cur_steps, &prop_steps, strategy);

    // Ids are unique within a validated document.
    let matched_cur: HashSet<&str> = pairs.iter().map(|(c, _)| c.id.as_str()).collect();
    let matched_prop: HashSet<&str> = pairs.iter().map(|(_, p)| p.id.as_str()).collect();

    let removed = cur_steps
        .iter()
        .filter(|s| !matched_cur.contains(s.id.as_str()))
        .map(|&s| StepRef::of(s))
        .collect();
    let added = prop_steps
        .iter()
        .filter(|s| !matched_prop.contains(s.id.as_str()))
        .map(|&s| StepRef::of(s))
        .collect();

    let mut modified = Vec::new();
    let mut unchanged = 0;
    for (c, p) in &pairs {
        let changes = diff_step(c, p, strategy == MatchStrategy::Name)?;
        if changes.is_empty() {
            unchanged += 1;
        } else {
            modified.push(StepChange {
                current_id: c.id.clone(),
                proposed_id: p.id.clone(),
                name: p.display_name().to_string(),
                changes,
            });
        }
    }

    let current_metrics = efficiency::analyze(current, config).metrics;
    let proposed_metrics = efficiency::analyze(proposed, config).metrics;
    let deltas = Deltas::between(&current_metrics, &proposed_metrics);

    tracing::debug!(
        strategy = %strategy,
        matched = pairs.len(),
        modified = modified.len(),
        "compared processes"
    );

    Ok(Comparison {
        schema_version: SCHEMA_VERSION.to_string(),
        current_process: current.process_name.clone(),
        proposed_process: proposed.process_name.clone(),
        compared_at: Utc::now(),
        strategy,
        added,
        removed,
        modified,
        unchanged,
        current_metrics,
        proposed_metrics,
        deltas,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
