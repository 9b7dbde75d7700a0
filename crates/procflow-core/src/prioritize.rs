use crate::config::Config;
use crate::document::{round2, Gap, SCHEMA_VERSION};
use crate::efficiency::{Bottleneck, EfficiencyReport};
use crate::error::{ProcflowError, Result};
use crate::types::{AutomationPotential, Category, GapType, ImpactLevel, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Improvement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ImprovementSource {
    #[serde(rename_all = "camelCase")]
    Gap {
        gap_type: GapType,
        step_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Bottleneck { step_id: String },
    Manual,
}

/// An improvement before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub source: ImprovementSource,
    pub reach: f64,
    pub impact: ImpactLevel,
    pub confidence: f64,
    pub effort: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Improvement {
    pub rank: usize,
    pub id: String,
    pub title: String,
    pub source: ImprovementSource,
    pub reach: f64,
    pub impact: ImpactLevel,
    pub confidence: f64,
    /// Person-weeks.
    pub effort: f64,
    pub score: f64,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejected {
    pub id: String,
    pub title: String,
    pub reason: String,
}

/// Manually proposed improvement, read from a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManualCandidate {
    pub title: String,
    /// Defaults to the configured reach.
    #[serde(default)]
    pub reach: Option<f64>,
    pub impact: ImpactLevel,
    pub confidence: f64,
    pub effort: f64,
}

pub fn load_manual_candidates(path: &Path) -> Result<Vec<ManualCandidate>> {
    let text = crate::io::read_input(path)?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| ProcflowError::MalformedInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    serde_json::from_value(value).map_err(|e| {
        ProcflowError::SchemaViolation(format!("{}: {e}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

pub fn rice_score(reach: f64, impact: ImpactLevel, confidence: f64, effort: f64) -> f64 {
    reach * impact.multiplier() * confidence / effort
}

/// Why a candidate cannot be scored, if it cannot.
pub fn rejection_reason(c: &Candidate) -> Option<String> {
    if !c.effort.is_finite() || c.effort <= 0.0 {
        return Some(format!("effort must be a positive number of person-weeks, got {}", c.effort));
    }
    if !c.confidence.is_finite() || c.confidence <= 0.0 || c.confidence > 1.0 {
        return Some(format!("confidence must be within (0, 1], got {}", c.confidence));
    }
    if !c.reach.is_finite() || c.reach < 0.0 {
        return Some(format!("reach must be non-negative, got {}", c.reach));
    }
    None
}

pub fn categorize(score: f64, effort: f64) -> Category {
    if score > 10.0 {
        if effort < 2.0 {
            Category::QuickWin
        } else {
            Category::BigBet
        }
    } else if score > 5.0 {
        Category::BigBet
    } else if score > 2.0 {
        Category::FillIn
    } else {
        Category::MoneyPit
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

fn impact_for_severity(severity: Severity) -> ImpactLevel {
    match severity {
        Severity::Critical => ImpactLevel::Massive,
        Severity::High => ImpactLevel::High,
        Severity::Medium => ImpactLevel::Medium,
        Severity::Low => ImpactLevel::Low,
    }
}

fn confidence_for_gap(gap_type: GapType) -> f64 {
    match gap_type {
        GapType::Contradiction | GapType::UndefinedRole | GapType::MissingSla => 1.0,
        GapType::MissingInfo | GapType::MissingDecision | GapType::UnclearHandoff => 0.8,
        GapType::IncompleteStep => 0.5,
    }
}

fn effort_for_gap(gap_type: GapType) -> f64 {
    match gap_type {
        GapType::UndefinedRole | GapType::MissingInfo | GapType::Contradiction => 0.5,
        GapType::MissingDecision | GapType::UnclearHandoff | GapType::IncompleteStep => 1.0,
        GapType::MissingSla => 2.0,
    }
}

fn action_for_gap(gap_type: GapType) -> &'static str {
    match gap_type {
        GapType::UndefinedRole => "Assign a responsible role",
        GapType::MissingInfo => "Capture missing information",
        GapType::MissingDecision => "Define decision criteria",
        GapType::UnclearHandoff => "Clarify the handoff",
        GapType::IncompleteStep => "Complete the step definition",
        GapType::Contradiction => "Resolve the contradiction",
        GapType::MissingSla => "Set a service-level target",
    }
}

pub fn from_gap(gap: &Gap, reach: f64) -> Candidate {
    Candidate {
        title: format!("{}: {}", action_for_gap(gap.gap_type), gap.description),
        source: ImprovementSource::Gap {
            gap_type: gap.gap_type,
            step_id: gap.step_id.clone(),
        },
        reach,
        impact: impact_for_severity(gap.severity),
        confidence: confidence_for_gap(gap.gap_type),
        effort: effort_for_gap(gap.gap_type),
    }
}

pub fn from_bottleneck(bottleneck: &Bottleneck, reach: f64) -> Candidate {
    let impact = match bottleneck.duration_ratio {
        Some(r) if r >= 4.0 => ImpactLevel::Massive,
        Some(r) if r >= 3.0 => ImpactLevel::High,
        _ => ImpactLevel::Medium,
    };
    let effort = match bottleneck.automation_potential {
        AutomationPotential::High => 2.0,
        AutomationPotential::Medium => 4.0,
        AutomationPotential::Low => 6.0,
        AutomationPotential::None => 8.0,
    };
    let verb = match bottleneck.automation_potential {
        AutomationPotential::High | AutomationPotential::Medium => "Automate",
        _ => "Streamline",
    };
    Candidate {
        title: format!("{verb} bottleneck step '{}'", bottleneck.step_name),
        source: ImprovementSource::Bottleneck {
            step_id: bottleneck.step_id.clone(),
        },
        reach,
        impact,
        confidence: 0.8,
        effort,
    }
}

pub fn from_manual(manual: &ManualCandidate, default_reach: f64) -> Candidate {
    Candidate {
        title: manual.title.clone(),
        source: ImprovementSource::Manual,
        reach: manual.reach.unwrap_or(default_reach),
        impact: manual.impact,
        confidence: manual.confidence,
        effort: manual.effort,
    }
}

/// Candidates in generation order: gaps, bottlenecks, manual entries.
pub fn generate(
    gaps: &[Gap],
    efficiency: Option<&EfficiencyReport>,
    manual: &[ManualCandidate],
    config: &Config,
) -> Vec<Candidate> {
    let reach = config.prioritization.reach;
    let mut out: Vec<Candidate> = gaps.iter().map(|g| from_gap(g, reach)).collect();
    if let Some(report) = efficiency {
        out.extend(report.bottlenecks.iter().map(|b| from_bottleneck(b, reach)));
    }
    out.extend(manual.iter().map(|m| from_manual(m, reach)));
    out
}

// ---------------------------------------------------------------------------
// Prioritization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roadmap {
    pub quick_win: Vec<String>,
    pub big_bet: Vec<String>,
    pub fill_in: Vec<String>,
    pub money_pit: Vec<String>,
}

impl Roadmap {
    pub fn bucket(&self, category: Category) -> &[String] {
        match category {
            Category::QuickWin => &self.quick_win,
            Category::BigBet => &self.big_bet,
            Category::FillIn => &self.fill_in,
            Category::MoneyPit => &self.money_pit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prioritization {
    pub schema_version: String,
    pub process_name: String,
    pub generated_at: DateTime<Utc>,
    pub improvements: Vec<Improvement>,
    pub roadmap: Roadmap,
    pub rejected: Vec<Rejected>,
}

/// Score, reject, rank and bucket. Ids `imp_NNN` follow candidate order.
pub fn prioritize(process_name: &str, candidates: Vec<Candidate>) -> Prioritization {
    let mut improvements = Vec::new();
    let mut rejected = Vec::new();

    for (i, c) in candidates.into_iter().enumerate() {
        let id = format!("imp_{:03}", i + 1);
        if let Some(reason) = rejection_reason(&c) {
            tracing::warn!(id = %id, title = %c.title, "rejected improvement: {reason}");
            rejected.push(Rejected {
                id,
                title: c.title,
                reason,
            });
            continue;
        }
        let exact = rice_score(c.reach, c.impact, c.confidence, c.effort);
        improvements.push((
            exact,
            Improvement {
                rank: 0,
                id,
                title: c.title,
                source: c.source,
                reach: c.reach,
                impact: c.impact,
                confidence: c.confidence,
                effort: c.effort,
                score: round2(exact),
                category: categorize(exact, c.effort),
            },
        ));
    }

    // Ranking and categories use the unrounded score; only `score` is rounded.
    improvements.sort_by(|(sa, a), (sb, b)| {
        sb.total_cmp(sa)
            .then(a.effort.total_cmp(&b.effort))
            .then(b.reach.total_cmp(&a.reach))
            .then(a.id.cmp(&b.id))
    });
    let mut improvements: Vec<Improvement> = improvements.into_iter().map(|(_, imp)| imp).collect();

    let mut roadmap = Roadmap::default();
    for (i, imp) in improvements.iter_mut().enumerate() {
        imp.rank = i + 1;
        let bucket = match imp.category {
            Category::QuickWin => &mut roadmap.quick_win,
            Category::BigBet => &mut roadmap.big_bet,
            Category::FillIn => &mut roadmap.fill_in,
            Category::MoneyPit => &mut roadmap.money_pit,
        };
        bucket.push(imp.id.clone());
    }

    Prioritization {
        schema_version: SCHEMA_VERSION.to_string(),
        process_name: process_name.to_string(),
        generated_at: Utc::now(),
        improvements,
        roadmap,
        rejected,
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

pub const CSV_HEADER: &str = "rank,id,title,category,reach,impact,confidence,effort,score";

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl Prioritization {
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Ranked improvements for tracker import; rejected items are omitted.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(CSV_HEADER);
        out.push('\n');
        for imp in &self.improvements {
            let row = [
                imp.rank.to_string(),
                imp.id.clone(),
                csv_field(&imp.title),
                imp.category.to_string(),
                imp.reach.to_string(),
                imp.impact.to_string(),
                imp.confidence.to_string(),
                imp.effort.to_string(),
                imp.score.to_string(),
            ];
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
