use crate::config::Config;
use crate::document::{round2, Metrics, ProcessDocument, ProcessStep, SCHEMA_VERSION};
use crate::error::Result;
use crate::types::AutomationPotential;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Waste
// ---------------------------------------------------------------------------

/// The seven Lean wastes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WasteCategory {
    Waiting,
    Transportation,
    Motion,
    Defects,
    Overprocessing,
    Overproduction,
    Inventory,
}

impl WasteCategory {
    pub fn all() -> &'static [WasteCategory] {
        &[
            WasteCategory::Waiting,
            WasteCategory::Transportation,
            WasteCategory::Motion,
            WasteCategory::Defects,
            WasteCategory::Overprocessing,
            WasteCategory::Overproduction,
            WasteCategory::Inventory,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WasteCategory::Waiting => "waiting",
            WasteCategory::Transportation => "transportation",
            WasteCategory::Motion => "motion",
            WasteCategory::Defects => "defects",
            WasteCategory::Overprocessing => "overprocessing",
            WasteCategory::Overproduction => "overproduction",
            WasteCategory::Inventory => "inventory",
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A measured waste, or the reason it could not be measured. Missing data is
/// never reported as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum WasteMeasure {
    Computed { value: f64, detail: String },
    NotComputed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteEntry {
    pub category: WasteCategory,
    #[serde(flatten)]
    pub measure: WasteMeasure,
}

// ---------------------------------------------------------------------------
// Bottleneck
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub step_id: String,
    pub step_name: String,
    pub role: Option<String>,
    pub sequence: u32,
    pub duration_minutes: Option<f64>,
    pub handoff_count: usize,
    /// Duration divided by the mean step duration.
    pub duration_ratio: Option<f64>,
    pub automation_potential: AutomationPotential,
    pub reasons: Vec<String>,
}

// ---------------------------------------------------------------------------
// EfficiencyReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyReport {
    pub schema_version: String,
    pub process_name: String,
    pub analyzed_at: DateTime<Utc>,
    pub metrics: Metrics,
    pub mean_step_minutes: Option<f64>,
    /// Groups of two or more steps that run concurrently.
    #[serde(default)]
    pub parallel_groups: Vec<Vec<String>>,
    #[serde(default)]
    pub bottlenecks: Vec<Bottleneck>,
    #[serde(default)]
    pub waste: Vec<WasteEntry>,
}

impl EfficiencyReport {
    pub fn load(path: &Path) -> Result<Self> {
        crate::document::load_versioned(path)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::io::atomic_write(path, self.to_json_pretty()?.as_bytes())
    }

    pub fn waste(&self, category: WasteCategory) -> Option<&WasteMeasure> {
        self.waste
            .iter()
            .find(|w| w.category == category)
            .map(|w| &w.measure)
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

pub fn analyze(doc: &ProcessDocument, config: &Config) -> EfficiencyReport {
    let analyzed_at = Utc::now();
    let groups = doc.parallel_groups();
    let steps = doc.ordered_steps();

    let durations: Vec<f64> = steps.iter().filter_map(|s| s.duration()).collect();
    let has_duration = !durations.is_empty();
    let total_work: f64 = durations.iter().sum();

    let processing: f64 = groups
        .iter()
        .filter_map(|g| g.iter().filter_map(|s| s.duration()).reduce(f64::max))
        .sum();

    let waits: Vec<f64> = steps.iter().filter_map(|s| s.wait()).collect();
    let wait = (!waits.is_empty()).then(|| waits.iter().sum::<f64>());

    let cycle = processing + wait.unwrap_or(0.0);
    let efficiency = (cycle > 0.0).then(|| round2(processing / cycle * 100.0));
    let mean = has_duration.then(|| total_work / durations.len() as f64);

    let handoff_count: usize = steps.iter().map(|s| s.handoffs.len()).sum();
    let bottlenecks = find_bottlenecks(&steps, mean, config);

    let metrics = Metrics {
        cycle_time_minutes: has_duration.then_some(round2(cycle)),
        processing_time_minutes: has_duration.then_some(round2(processing)),
        wait_time_minutes: wait.map(round2),
        total_work_minutes: has_duration.then_some(round2(total_work)),
        efficiency_percent: if has_duration { efficiency } else { None },
        step_count: steps.len(),
        steps_with_duration: durations.len(),
        handoff_count,
        bottleneck_step_ids: bottlenecks.iter().map(|b| b.step_id.clone()).collect(),
        analyzed_at: Some(analyzed_at),
    };

    tracing::debug!(
        steps = metrics.step_count,
        groups = groups.len(),
        bottlenecks = bottlenecks.len(),
        "efficiency analyzed"
    );

    EfficiencyReport {
        schema_version: SCHEMA_VERSION.to_string(),
        process_name: doc.process_name.clone(),
        analyzed_at,
        metrics,
        mean_step_minutes: mean.map(round2),
        parallel_groups: groups
            .iter()
            .filter(|g| g.len() > 1)
            .map(|g| g.iter().map(|s| s.id.clone()).collect())
            .collect(),
        bottlenecks,
        waste: measure_waste(&steps),
    }
}

fn find_bottlenecks(steps: &[&ProcessStep], mean: Option<f64>, config: &Config) -> Vec<Bottleneck> {
    let multiple = config.analysis.bottleneck_duration_multiple;
    let handoff_threshold = config.analysis.bottleneck_handoff_threshold;

    let mut found: Vec<Bottleneck> = steps
        .iter()
        .filter_map(|step| {
            let duration = step.duration();
            let ratio = match (duration, mean) {
                (Some(d), Some(m)) if m > 0.0 => Some(d / m),
                _ => None,
            };
            let mut reasons = Vec::new();
            if let (Some(d), Some(m), Some(r)) = (duration, mean, ratio) {
                if d > multiple * m {
                    reasons.push(format!(
                        "duration {d} min is {r:.1}x the mean step duration ({m:.1} min)"
                    ));
                }
            }
            if step.handoffs.len() > handoff_threshold {
                reasons.push(format!("{} handoffs", step.handoffs.len()));
            }
            (!reasons.is_empty()).then(|| Bottleneck {
                step_id: step.id.clone(),
                step_name: step.display_name().to_string(),
                role: step.role_name().map(str::to_string),
                sequence: step.sequence,
                duration_minutes: duration,
                handoff_count: step.handoffs.len(),
                duration_ratio: ratio.map(round2),
                automation_potential: step.automation_potential,
                reasons,
            })
        })
        .collect();

    found.sort_by(|a, b| {
        let da = a.duration_minutes.unwrap_or(-1.0);
        let db = b.duration_minutes.unwrap_or(-1.0);
        db.total_cmp(&da)
            .then(b.handoff_count.cmp(&a.handoff_count))
            .then(a.sequence.cmp(&b.sequence))
    });
    found
}

fn artifact_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn computed(category: WasteCategory, value: f64, detail: String) -> WasteEntry {
    WasteEntry {
        category,
        measure: WasteMeasure::Computed { value, detail },
    }
}

fn not_computed(category: WasteCategory, reason: &str) -> WasteEntry {
    WasteEntry {
        category,
        measure: WasteMeasure::NotComputed {
            reason: reason.to_string(),
        },
    }
}

fn measure_waste(steps: &[&ProcessStep]) -> Vec<WasteEntry> {
    let mut out = Vec::with_capacity(WasteCategory::all().len());

    let waits: Vec<f64> = steps.iter().filter_map(|s| s.wait()).collect();
    out.push(if waits.is_empty() {
        not_computed(WasteCategory::Waiting, "no step models waitMinutes")
    } else {
        let total: f64 = waits.iter().sum();
        computed(
            WasteCategory::Waiting,
            round2(total),
            format!("{} min of modelled wait across {} steps", round2(total), waits.len()),
        )
    });

    out.push(if steps.is_empty() {
        not_computed(WasteCategory::Transportation, "process has no steps")
    } else {
        let handoffs: usize = steps.iter().map(|s| s.handoffs.len()).sum();
        computed(
            WasteCategory::Transportation,
            handoffs as f64,
            format!("{handoffs} handoffs between roles"),
        )
    });

    let roles: Vec<&str> = steps.iter().filter_map(|s| s.role_name()).collect();
    out.push(if roles.len() < 2 {
        not_computed(WasteCategory::Motion, "fewer than two steps have a role")
    } else {
        let switches = roles.windows(2).filter(|w| w[0] != w[1]).count();
        computed(
            WasteCategory::Motion,
            switches as f64,
            format!("{switches} role switches between consecutive steps"),
        )
    });

    let has_inputs = steps.iter().any(|s| !s.inputs.is_empty());
    let has_outputs = steps.iter().any(|s| !s.outputs.is_empty());

    out.push(if !(has_inputs && has_outputs) {
        not_computed(WasteCategory::Defects, "steps do not list both inputs and outputs")
    } else {
        let mut loops: Vec<String> = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            for output in &step.outputs {
                let key = artifact_key(output);
                let earlier = steps[..i]
                    .iter()
                    .any(|e| e.inputs.iter().any(|input| artifact_key(input) == key));
                if earlier {
                    loops.push(format!("{} -> {output}", step.id));
                }
            }
        }
        let detail = if loops.is_empty() {
            "no rework loops".to_string()
        } else {
            format!("rework loops: {}", loops.join(", "))
        };
        computed(WasteCategory::Defects, loops.len() as f64, detail)
    });

    let io_steps = steps
        .iter()
        .filter(|s| !s.inputs.is_empty() || !s.outputs.is_empty())
        .count();
    out.push(if io_steps < 2 {
        not_computed(WasteCategory::Overprocessing, "fewer than two steps list inputs or outputs")
    } else {
        let last = steps.len().saturating_sub(1);
        let mut unused: Vec<String> = Vec::new();
        for (i, step) in steps.iter().enumerate().take(last) {
            for output in &step.outputs {
                let key = artifact_key(output);
                let consumed = steps[i + 1..]
                    .iter()
                    .any(|later| later.inputs.iter().any(|input| artifact_key(input) == key));
                if !consumed {
                    unused.push(output.clone());
                }
            }
        }
        let detail = if unused.is_empty() {
            "every output is consumed downstream".to_string()
        } else {
            format!("outputs never consumed: {}", unused.join(", "))
        };
        computed(WasteCategory::Overprocessing, unused.len() as f64, detail)
    });

    out.push(if !has_outputs {
        not_computed(WasteCategory::Overproduction, "no step lists outputs")
    } else {
        let mut producers: BTreeMap<String, HashSet<&str>> = BTreeMap::new();
        for step in steps {
            for output in &step.outputs {
                producers
                    .entry(artifact_key(output))
                    .or_default()
                    .insert(step.id.as_str());
            }
        }
        let duplicated: Vec<&String> = producers
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(artifact, _)| artifact)
            .collect();
        let detail = if duplicated.is_empty() {
            "each artifact has a single producer".to_string()
        } else {
            format!(
                "produced more than once: {}",
                duplicated.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            )
        };
        computed(WasteCategory::Overproduction, duplicated.len() as f64, detail)
    });

    out.push(if waits.is_empty() {
        not_computed(WasteCategory::Inventory, "no step models waitMinutes")
    } else {
        let queued = waits.iter().filter(|w| **w > 0.0).count();
        computed(
            WasteCategory::Inventory,
            queued as f64,
            format!("{queued} steps start with a queue"),
        )
    });

    out
}

/// Cache the metrics on the document.
pub fn write_back(doc: &mut ProcessDocument, report: &EfficiencyReport) {
    doc.metrics = Some(report.metrics.clone());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
