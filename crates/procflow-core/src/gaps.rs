use crate::config::Config;
use crate::document::{Gap, ProcessDocument, ProcessStep, SCHEMA_VERSION};
use crate::error::Result;
use crate::types::{GapType, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// Check context
// ---------------------------------------------------------------------------

pub struct StepContext<'a> {
    pub doc: &'a ProcessDocument,
    pub step: &'a ProcessStep,
    pub config: &'a Config,
    pub ids: &'a HashSet<&'a str>,
}

/// A fn-pointer check run against every step, in sequence order.
pub struct StepCheck {
    pub id: &'static str,
    pub check: fn(&StepContext) -> Vec<Gap>,
}

/// A fn-pointer check run once per document, after the step checks.
pub struct DocumentCheck {
    pub id: &'static str,
    pub check: fn(&ProcessDocument, &Config) -> Vec<Gap>,
}

// ---------------------------------------------------------------------------
// Question templates
// ---------------------------------------------------------------------------

fn questions(gap_type: GapType, subject: &str) -> Vec<String> {
    let templates: &[&str] = match gap_type {
        GapType::UndefinedRole => &[
            "Who performs '{}'?",
            "Is '{}' owned by a single role or shared between teams?",
        ],
        GapType::MissingInfo => &[
            "How long does '{}' typically take?",
            "What is the longest '{}' has taken recently?",
        ],
        GapType::IncompleteStep => &[
            "What exactly happens during '{}'?",
            "What are the inputs and outputs of '{}'?",
        ],
        GapType::MissingDecision => &[
            "What criteria decide '{}'?",
            "What are the possible outcomes of '{}'?",
        ],
        GapType::UnclearHandoff => &[
            "What artifact is handed over in '{}'?",
            "How does the receiver know the handoff in '{}' happened?",
        ],
        GapType::Contradiction => &[
            "Which description of '{}' is correct?",
            "Does '{}' really run alongside the steps listed for it?",
        ],
        GapType::MissingSla => &[
            "What is the expected end-to-end time for '{}'?",
            "Which steps of '{}' have service-level targets?",
        ],
    };
    templates.iter().map(|t| t.replace("{}", subject)).collect()
}

fn impact(gap_type: GapType) -> &'static str {
    match gap_type {
        GapType::UndefinedRole => "Work may stall because nobody is accountable for it.",
        GapType::MissingInfo => "Timing and capacity cannot be analyzed.",
        GapType::IncompleteStep => "The step cannot be executed or improved reliably.",
        GapType::MissingDecision => "Outcomes depend on individual judgement and vary between runs.",
        GapType::UnclearHandoff => "Work can be lost or delayed between roles.",
        GapType::Contradiction => "Conflicting descriptions make every downstream analysis suspect.",
        GapType::MissingSla => "Performance cannot be measured against a target.",
    }
}

fn step_gap(
    gap_type: GapType,
    severity: Severity,
    step: &ProcessStep,
    description: String,
    subject: &str,
) -> Gap {
    Gap::new(gap_type, severity, Some(&step.id), description)
        .with_impact(impact(gap_type))
        .with_questions(questions(gap_type, subject))
}

fn document_gap(gap_type: GapType, severity: Severity, doc: &ProcessDocument, description: String) -> Gap {
    Gap::new(gap_type, severity, None, description)
        .with_impact(impact(gap_type))
        .with_questions(questions(gap_type, doc.process_name.trim()))
}

// ---------------------------------------------------------------------------
// Step checks
// ---------------------------------------------------------------------------

fn check_role(ctx: &StepContext) -> Vec<Gap> {
    if ctx.step.role_name().is_some() {
        return Vec::new();
    }
    let name = ctx.step.display_name();
    vec![step_gap(
        GapType::UndefinedRole,
        Severity::High,
        ctx.step,
        format!("Step '{name}' has no responsible role."),
        name,
    )]
}

fn check_duration(ctx: &StepContext) -> Vec<Gap> {
    if ctx.step.duration().is_some() {
        return Vec::new();
    }
    let name = ctx.step.display_name();
    vec![step_gap(
        GapType::MissingInfo,
        Severity::Medium,
        ctx.step,
        format!("Step '{name}' has no duration."),
        name,
    )]
}

/// Severity grows with the confidence deficit `1 - confidence`.
pub fn low_confidence_severity(confidence: f64) -> Severity {
    let deficit = 1.0 - confidence;
    if deficit >= 0.9 {
        Severity::Critical
    } else if deficit >= 0.75 {
        Severity::High
    } else if deficit >= 0.6 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn check_confidence(ctx: &StepContext) -> Vec<Gap> {
    let confidence = ctx.step.confidence;
    if !confidence.is_finite() || confidence >= ctx.config.analysis.low_confidence_threshold {
        return Vec::new();
    }
    let name = ctx.step.display_name();
    vec![step_gap(
        GapType::IncompleteStep,
        low_confidence_severity(confidence),
        ctx.step,
        format!("Step '{name}' was extracted with low confidence ({confidence:.2})."),
        name,
    )]
}

fn check_name(ctx: &StepContext) -> Vec<Gap> {
    if !ctx.step.name.trim().is_empty() {
        return Vec::new();
    }
    vec![step_gap(
        GapType::IncompleteStep,
        Severity::High,
        ctx.step,
        format!("Step {} has no name.", ctx.step.id),
        &ctx.step.id,
    )]
}

fn check_decisions(ctx: &StepContext) -> Vec<Gap> {
    let name = ctx.step.display_name();
    let mut gaps = Vec::new();
    for decision in &ctx.step.decisions {
        let question = decision.question.trim();
        let subject = if question.is_empty() { name } else { question };
        let has_criteria = decision
            .criteria
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        if !has_criteria {
            gaps.push(step_gap(
                GapType::MissingDecision,
                Severity::High,
                ctx.step,
                format!("Decision '{subject}' in step '{name}' has no criteria."),
                subject,
            ));
        }
        if decision.options.is_empty() {
            gaps.push(step_gap(
                GapType::MissingDecision,
                Severity::Medium,
                ctx.step,
                format!("Decision '{subject}' in step '{name}' lists no options."),
                subject,
            ));
        }
    }
    gaps
}

fn check_handoffs(ctx: &StepContext) -> Vec<Gap> {
    let name = ctx.step.display_name();
    ctx.step
        .handoffs
        .iter()
        .filter(|h| !h.artifact.as_deref().is_some_and(|a| !a.trim().is_empty()))
        .map(|h| {
            step_gap(
                GapType::UnclearHandoff,
                Severity::Medium,
                ctx.step,
                format!(
                    "Handoff from '{name}' to {} does not say what is handed over.",
                    h.to_role
                ),
                name,
            )
        })
        .collect()
}

fn check_parallel(ctx: &StepContext) -> Vec<Gap> {
    let step = ctx.step;
    let name = step.display_name();
    let mut gaps = Vec::new();
    for other in &step.parallel_steps {
        if other == &step.id {
            gaps.push(step_gap(
                GapType::Contradiction,
                Severity::Critical,
                step,
                format!("Step '{name}' is listed as parallel with itself."),
                name,
            ));
        } else if !ctx.ids.contains(other.as_str()) {
            gaps.push(step_gap(
                GapType::Contradiction,
                Severity::Critical,
                step,
                format!("Step '{name}' is parallel with unknown step '{other}'."),
                name,
            ));
        } else if ctx
            .doc
            .step(other)
            .is_some_and(|o| !o.parallel_steps.contains(&step.id))
        {
            gaps.push(step_gap(
                GapType::Contradiction,
                Severity::Low,
                step,
                format!("Step '{name}' lists {other} as parallel, but {other} does not list it back."),
                name,
            ));
        }
    }
    gaps
}

pub fn default_step_checks() -> Vec<StepCheck> {
    vec![
        StepCheck { id: "role", check: check_role },
        StepCheck { id: "duration", check: check_duration },
        StepCheck { id: "confidence", check: check_confidence },
        StepCheck { id: "name", check: check_name },
        StepCheck { id: "decisions", check: check_decisions },
        StepCheck { id: "handoffs", check: check_handoffs },
        StepCheck { id: "parallel", check: check_parallel },
    ]
}

// ---------------------------------------------------------------------------
// Document checks
// ---------------------------------------------------------------------------

fn no_steps_gap(doc: &ProcessDocument) -> Gap {
    document_gap(
        GapType::MissingInfo,
        Severity::Critical,
        doc,
        "No process steps could be identified.".to_string(),
    )
}

fn check_has_steps(doc: &ProcessDocument, _: &Config) -> Vec<Gap> {
    if doc.steps.is_empty() {
        vec![no_steps_gap(doc)]
    } else {
        Vec::new()
    }
}

fn check_any_duration(doc: &ProcessDocument, _: &Config) -> Vec<Gap> {
    if doc.steps.is_empty() || doc.steps.iter().any(|s| s.duration().is_some()) {
        return Vec::new();
    }
    vec![document_gap(
        GapType::MissingSla,
        Severity::Low,
        doc,
        "No step has a duration, so the process has no measurable timing.".to_string(),
    )]
}

fn check_duplicate_names(doc: &ProcessDocument, _: &Config) -> Vec<Gap> {
    let mut by_name: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    for step in doc.ordered_steps() {
        let key = step.name.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        if !by_name.contains_key(&key) {
            order.push(key.clone());
        }
        by_name.entry(key).or_default().push(&step.id);
    }
    order
        .iter()
        .filter_map(|key| {
            let ids = &by_name[key];
            (ids.len() > 1).then(|| {
                let name = doc.step(ids[0]).map_or(key.as_str(), |s| s.display_name());
                Gap::new(
                    GapType::Contradiction,
                    Severity::Medium,
                    Some(ids[1]),
                    format!("Step name '{name}' is used by {} steps: {}.", ids.len(), ids.join(", ")),
                )
                .with_impact(impact(GapType::Contradiction))
                .with_questions(questions(GapType::Contradiction, name))
            })
        })
        .collect()
}

pub fn default_document_checks() -> Vec<DocumentCheck> {
    vec![
        DocumentCheck { id: "has-steps", check: check_has_steps },
        DocumentCheck { id: "any-duration", check: check_any_duration },
        DocumentCheck { id: "duplicate-names", check: check_duplicate_names },
    ]
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Run every check; the result depends only on the document's steps, never
/// on its existing `gaps`.
pub fn analyze(doc: &ProcessDocument, config: &Config) -> Vec<Gap> {
    let ids: HashSet<&str> = doc.steps.iter().map(|s| s.id.as_str()).collect();
    let step_checks = default_step_checks();
    let mut gaps = Vec::new();

    for step in doc.ordered_steps() {
        let ctx = StepContext {
            doc,
            step,
            config,
            ids: &ids,
        };
        for check in &step_checks {
            let found = (check.check)(&ctx);
            if !found.is_empty() {
                tracing::debug!(check = check.id, step = %step.id, count = found.len(), "gap check fired");
            }
            gaps.extend(found);
        }
    }
    for check in default_document_checks() {
        gaps.extend((check.check)(doc, config));
    }
    gaps
}

/// Gaps a freshly parsed document carries before any analysis.
pub fn seed_gaps(doc: &ProcessDocument) -> Vec<Gap> {
    if doc.steps.is_empty() {
        return vec![no_steps_gap(doc)];
    }
    if doc.steps.iter().all(|s| s.role_name().is_none()) {
        return vec![document_gap(
            GapType::UndefinedRole,
            Severity::High,
            doc,
            "No step names a responsible role.".to_string(),
        )];
    }
    Vec::new()
}

/// Keep gaps at or above `min`.
pub fn filter_by_severity(gaps: Vec<Gap>, min: Severity) -> Vec<Gap> {
    gaps.into_iter().filter(|g| g.severity >= min).collect()
}

/// Replace the document's gaps wholesale.
pub fn write_back(doc: &mut ProcessDocument, gaps: &[Gap]) {
    doc.gaps = gaps.to_vec();
}

// ---------------------------------------------------------------------------
// GapReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    #[serde(default)]
    pub by_type: BTreeMap<String, usize>,
}

impl GapSummary {
    pub fn of(gaps: &[Gap]) -> Self {
        let mut summary = GapSummary {
            total: gaps.len(),
            ..Default::default()
        };
        for gap in gaps {
            match gap.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
            *summary.by_type.entry(gap.gap_type.to_string()).or_default() += 1;
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapReport {
    pub schema_version: String,
    pub process_name: String,
    pub analyzed_at: DateTime<Utc>,
    pub summary: GapSummary,
    pub gaps: Vec<Gap>,
}

impl GapReport {
    pub fn new(doc: &ProcessDocument, gaps: Vec<Gap>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            process_name: doc.process_name.clone(),
            analyzed_at: Utc::now(),
            summary: GapSummary::of(&gaps),
            gaps,
        }
    }

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
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::doc_with_steps;
    use crate::document::{Decision, Handoff};
    use tempfile::TempDir;

    fn count(gaps: &[Gap], t: GapType) -> usize {
        gaps.iter().filter(|g| g.gap_type == t).count()
    }

    #[test]
    fn complete_document_has_no_gaps() {
        let doc = doc_with_steps(&[Some(10.0), Some(20.0)]);
        assert!(analyze(&doc, &Config::default()).is_empty());
    }

    #[test]
    fn per_step_checks() {
        let mut doc = doc_with_steps(&[Some(10.0), None, Some(5.0)]);
        doc.steps[0].role = None;
        doc.steps[0].handoffs.push(Handoff {
            to_role: "Finance".to_string(),
            artifact: None,
        });
        doc.steps[2].decisions.push(Decision {
            question: "Over budget?".to_string(),
            criteria: None,
            options: Vec::new(),
        });
        doc.steps[2].confidence = 0.2;

        let gaps = analyze(&doc, &Config::default());
        assert_eq!(count(&gaps, GapType::UndefinedRole), 1);
        assert_eq!(count(&gaps, GapType::UnclearHandoff), 1);
        assert_eq!(count(&gaps, GapType::MissingInfo), 1);
        assert_eq!(count(&gaps, GapType::MissingDecision), 2);

        let low = gaps
            .iter()
            .find(|g| g.gap_type == GapType::IncompleteStep)
            .unwrap();
        assert_eq!(low.severity, Severity::High);
        assert_eq!(low.step_id.as_deref(), Some("step_003"));

        // step order is preserved
        assert_eq!(gaps[0].step_id.as_deref(), Some("step_001"));
        assert!(gaps.iter().all(|g| !g.suggested_questions.is_empty()));
    }

    #[test]
    fn deficit_severity_bands() {
        assert_eq!(low_confidence_severity(0.05), Severity::Critical);
        assert_eq!(low_confidence_severity(0.08), Severity::Critical);
        assert_eq!(low_confidence_severity(0.2), Severity::High);
        assert_eq!(low_confidence_severity(0.35), Severity::Medium);
        assert_eq!(low_confidence_severity(0.45), Severity::Low);
    }

    #[test]
    fn parallel_references() {
        let mut doc = doc_with_steps(&[Some(10.0), Some(10.0), Some(10.0)]);
        doc.steps[0].parallel_steps = vec!["step_001".to_string(), "step_404".to_string()];
        doc.steps[1].parallel_steps = vec!["step_003".to_string()];

        let gaps = analyze(&doc, &Config::default());
        let contradictions: Vec<&Gap> = gaps
            .iter()
            .filter(|g| g.gap_type == GapType::Contradiction)
            .collect();
        assert_eq!(contradictions.len(), 3);
        assert_eq!(contradictions[0].severity, Severity::Critical);
        assert_eq!(contradictions[1].severity, Severity::Critical);
        assert_eq!(contradictions[2].severity, Severity::Low);
    }

    #[test]
    fn document_level_checks() {
        let empty = doc_with_steps(&[]);
        let gaps = analyze(&empty, &Config::default());
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].severity, Severity::Critical);
        assert!(gaps[0].step_id.is_none());

        let mut doc = doc_with_steps(&[None, None]);
        doc.steps[1].name = "step 1".to_string();
        let gaps = analyze(&doc, &Config::default());
        assert_eq!(count(&gaps, GapType::MissingSla), 1);
        let dup = gaps
            .iter()
            .find(|g| g.gap_type == GapType::Contradiction)
            .unwrap();
        assert_eq!(dup.step_id.as_deref(), Some("step_002"));
    }

    #[test]
    fn analysis_is_idempotent() {
        let mut doc = doc_with_steps(&[Some(10.0), None]);
        doc.steps[1].role = None;
        let first = analyze(&doc, &Config::default());
        write_back(&mut doc, &first);
        let second = analyze(&doc, &Config::default());
        assert_eq!(first, second);
        write_back(&mut doc, &second);
        assert_eq!(doc.gaps, first);
    }

    #[test]
    fn severity_filter_keeps_critical_and_high() {
        let mut doc = doc_with_steps(&[None, Some(1.0)]);
        doc.steps[0].role = None;
        doc.steps[1].confidence = 0.05;
        doc.steps[1].parallel_steps = vec!["step_099".to_string()];
        let gaps = analyze(&doc, &Config::default());
        let kept = filter_by_severity(gaps.clone(), Severity::High);
        assert!(!kept.is_empty());
        assert!(kept
            .iter()
            .all(|g| matches!(g.severity, Severity::Critical | Severity::High)));
        let expected = gaps.iter().filter(|g| g.severity >= Severity::High).count();
        assert_eq!(kept.len(), expected);
    }

    #[test]
    fn report_roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gaps.json");
        let mut doc = doc_with_steps(&[None]);
        doc.steps[0].role = None;
        let report = GapReport::new(&doc, analyze(&doc, &Config::default()));
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.high, 1);
        assert_eq!(report.summary.by_type["missingSLA"], 1);
        report.save(&path).unwrap();

        let loaded = GapReport::load(&path).unwrap();
        assert_eq!(loaded.gaps, report.gaps);
        assert_eq!(loaded.summary, report.summary);
    }

    #[test]
    fn seeds() {
        assert_eq!(seed_gaps(&doc_with_steps(&[]))[0].gap_type, GapType::MissingInfo);
        let mut doc = doc_with_steps(&[Some(1.0)]);
        assert!(seed_gaps(&doc).is_empty());
        doc.steps[0].role = None;
        assert_eq!(seed_gaps(&doc)[0].gap_type, GapType::UndefinedRole);
    }
}
