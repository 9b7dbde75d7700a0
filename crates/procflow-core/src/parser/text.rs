//! Structured-text handler: markdown, plain numbered procedures, OCR output
//! and stripped HTML all end up here.

use super::extract::{self, EXPLICIT, INFERRED};
use crate::document::{Decision, ProcessDocument, ProcessStep, Source};
use crate::error::Result;
use crate::types::{AutomationPotential, SourceType};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

static STEP_LABEL_RE: OnceLock<Regex> = OnceLock::new();
static NUMBERED_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_RE: OnceLock<Regex> = OnceLock::new();
static HEADING_RE: OnceLock<Regex> = OnceLock::new();
static ATTRIBUTE_RE: OnceLock<Regex> = OnceLock::new();

fn step_label_re() -> &'static Regex {
    STEP_LABEL_RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:#{1,6}\s*)?step\s+(\d+)\s*[:.)\-]?\s*(.*)$").unwrap()
    })
}

fn numbered_re() -> &'static Regex {
    NUMBERED_RE.get_or_init(|| Regex::new(r"^(\d+)[.)]\s+(.+)$").unwrap())
}

fn bullet_re() -> &'static Regex {
    BULLET_RE.get_or_init(|| Regex::new(r"^[-*+\u{2022}]\s+(.+)$").unwrap())
}

fn heading_re() -> &'static Regex {
    HEADING_RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*$").unwrap())
}

fn attribute_re() -> &'static Regex {
    ATTRIBUTE_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:[-*+]\s+)?(?:\*\*|__)?(role|owner|process owner|responsible|performed by|actor|duration|time|sla|effort|wait|waiting|inputs?|outputs?|decision|question|criteria|options|handoff|hand-off|hand off|parallel with|parallel|automation|automation potential|description|notes?|process|process name)(?:\*\*|__)?\s*:\s*(.*)$",
        )
        .unwrap()
    })
}

/// Section headings whose bullets are process steps.
const STEP_SECTIONS: &[&str] = &[
    "step", "procedure", "process", "workflow", "activities", "activity", "flow", "tasks",
    "how", "instructions",
];

// ---------------------------------------------------------------------------
// Step draft
// ---------------------------------------------------------------------------

struct Draft {
    step: ProcessStep,
    structure: f64,
    role_conf: f64,
    duration_conf: f64,
    parallel_refs: Vec<String>,
    automation_explicit: bool,
}

impl Draft {
    fn new(title: &str, structure: f64) -> Self {
        let mut draft = Self {
            step: ProcessStep::new(String::new(), String::new(), 0),
            structure,
            role_conf: 0.0,
            duration_conf: 0.0,
            parallel_refs: Vec::new(),
            automation_explicit: false,
        };
        draft.absorb_title(title);
        draft
    }

    fn absorb_title(&mut self, title: &str) {
        let mut title = extract::clean_inline(title);
        if let Some((role, rest)) = extract::split_role_prefix(&title) {
            self.set_role(role, EXPLICIT);
            title = rest;
        }
        self.infer_from(&title);
        self.step.name = extract::strip_paren_duration(&title)
            .trim_end_matches(['.', ':'])
            .trim()
            .to_string();
    }

    /// Inline inference from free text; never overrides explicit values.
    fn infer_from(&mut self, text: &str) {
        if self.step.role.is_none() {
            if let Some(role) = extract::infer_role(text) {
                self.set_role(role, INFERRED);
            }
        }
        if self.step.duration_minutes.is_none() {
            if let Some(minutes) = extract::find_duration_minutes(text) {
                self.step.duration_minutes = Some(minutes);
                self.duration_conf = INFERRED;
            }
        }
        for handoff in extract::infer_handoffs(text) {
            if !self.step.handoffs.iter().any(|h| h.to_role == handoff.to_role) {
                self.step.handoffs.push(handoff);
            }
        }
        if let Some(decision) = extract::infer_decision(text) {
            if !self.step.decisions.iter().any(|d| d.question == decision.question) {
                self.step.decisions.push(decision);
            }
        }
    }

    fn set_role(&mut self, role: String, confidence: f64) {
        if confidence >= self.role_conf {
            self.step.role = Some(role);
            self.role_conf = confidence;
        }
    }

    fn append_description(&mut self, text: &str) {
        let text = extract::clean_inline(text);
        if text.is_empty() {
            return;
        }
        self.infer_from(&text);
        match &mut self.step.description {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(&text);
            }
            None => self.step.description = Some(text),
        }
    }

    fn last_decision(&mut self) -> &mut Decision {
        if self.step.decisions.is_empty() {
            let question = format!("{}?", self.step.name.trim_end_matches('?'));
            self.step.decisions.push(Decision {
                question,
                criteria: None,
                options: Vec::new(),
            });
        }
        let last = self.step.decisions.len() - 1;
        &mut self.step.decisions[last]
    }

    /// Returns false when the key is not a step attribute.
    fn apply_attribute(&mut self, key: &str, value: &str) -> bool {
        let value = extract::clean_inline(value);
        match key {
            "role" | "owner" | "process owner" | "responsible" | "performed by" | "actor" => {
                if !value.is_empty() {
                    self.set_role(value, EXPLICIT);
                }
            }
            "duration" | "time" | "sla" => {
                if let Some(minutes) = extract::parse_duration_value(&value) {
                    self.step.duration_minutes = Some(minutes);
                    self.duration_conf = EXPLICIT;
                }
            }
            "effort" => self.step.effort_hours = extract::parse_effort_hours(&value),
            "wait" | "waiting" => {
                self.step.wait_minutes = extract::parse_duration_value(&value);
            }
            "input" | "inputs" => self.step.inputs.extend(extract::split_list(&value)),
            "output" | "outputs" => self.step.outputs.extend(extract::split_list(&value)),
            "decision" | "question" => {
                let question = if value.ends_with('?') {
                    value
                } else {
                    format!("{value}?")
                };
                self.step.decisions.push(Decision {
                    question,
                    criteria: None,
                    options: Vec::new(),
                });
            }
            "criteria" => {
                if !value.is_empty() {
                    self.last_decision().criteria = Some(value);
                }
            }
            "options" => {
                let options = extract::split_options(&value);
                self.last_decision().options = options;
            }
            "handoff" | "hand-off" | "hand off" => {
                if let Some(handoff) = extract::parse_handoff_value(&value) {
                    self.step.handoffs.push(handoff);
                }
            }
            "parallel" | "parallel with" => {
                self.parallel_refs.extend(extract::split_list(&value));
            }
            "automation" | "automation potential" => {
                if let Ok(potential) = value.parse::<AutomationPotential>() {
                    self.step.automation_potential = potential;
                    self.automation_explicit = true;
                }
            }
            "description" | "note" | "notes" => self.append_description(&value),
            _ => return false,
        }
        true
    }

    fn finish(mut self, scale: f64) -> (ProcessStep, Vec<String>) {
        if !self.automation_explicit {
            let basis = match &self.step.description {
                Some(d) => format!("{} {d}", self.step.name),
                None => self.step.name.clone(),
            };
            self.step.automation_potential = extract::infer_automation(&basis);
        }
        let raw = 0.5 * self.structure + 0.25 * self.role_conf + 0.25 * self.duration_conf;
        self.step.confidence = crate::document::round2((raw * scale).clamp(0.0, 1.0));
        (self.step, self.parallel_refs)
    }
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

enum Line<'a> {
    Blank,
    Heading { level: usize, text: &'a str },
    Step { title: String, structure: f64 },
    Attribute { key: String, value: String },
    Prose(&'a str),
}

fn classify(line: &str, bullets_are_steps: bool) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() || line.chars().all(|c| matches!(c, '-' | '=' | '*' | '_')) {
        return Line::Blank;
    }
    if let Some(caps) = step_label_re().captures(line) {
        let title = caps[2].trim();
        if !title.is_empty() {
            return Line::Step {
                title: title.to_string(),
                structure: 1.0,
            };
        }
    }
    if let Some(caps) = attribute_re().captures(line) {
        return Line::Attribute {
            key: caps[1].to_ascii_lowercase(),
            value: caps[2].trim().to_string(),
        };
    }
    if let Some(caps) = heading_re().captures(line) {
        return Line::Heading {
            level: caps[1].len(),
            text: caps.get(2).map_or("", |m| m.as_str()),
        };
    }
    if let Some(caps) = numbered_re().captures(line) {
        return Line::Step {
            title: caps[2].to_string(),
            structure: 1.0,
        };
    }
    if bullets_are_steps {
        if let Some(caps) = bullet_re().captures(line) {
            return Line::Step {
                title: caps[1].to_string(),
                structure: 0.7,
            };
        }
    }
    Line::Prose(line)
}

fn is_step_section(heading: &str) -> bool {
    let lower = heading.to_ascii_lowercase();
    STEP_SECTIONS.iter().any(|k| lower.contains(k))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub(crate) fn parse_text_file(path: &Path) -> Result<ProcessDocument> {
    let bytes = crate::io::read_input_bytes(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let source = Source::new(SourceType::File, path.display().to_string());
    Ok(parse_text(&text, source, 1.0))
}

/// Build a document from structured text. `scale` multiplies every step
/// confidence (OCR output is less trustworthy than typed text).
pub(crate) fn parse_text(text: &str, source: Source, scale: f64) -> ProcessDocument {
    let mut doc = ProcessDocument::new(String::new(), source);
    let mut drafts: Vec<(ProcessStep, Vec<String>)> = Vec::new();
    let mut current: Option<Draft> = None;
    let mut bullets_are_steps = true;
    let mut description: Vec<String> = Vec::new();
    let mut description_closed = false;

    for raw in text.lines() {
        // Indented list items under a step are sub-points, not new steps.
        let indented = raw.starts_with("  ") || raw.starts_with('\t');
        match classify(raw, bullets_are_steps) {
            Line::Blank => {
                if !description.is_empty() {
                    description_closed = true;
                }
            }
            Line::Heading { level, text } => {
                if level == 1 && doc.process_name.is_empty() && drafts.is_empty() && current.is_none() {
                    doc.process_name = extract::clean_inline(
                        text.trim_start_matches("Process:").trim(),
                    );
                    continue;
                }
                if let Some(draft) = current.take() {
                    drafts.push(draft.finish(scale));
                }
                bullets_are_steps = is_step_section(text);
            }
            Line::Step { title, structure } => {
                if indented && structure < 1.0 {
                    if let Some(draft) = current.as_mut() {
                        draft.append_description(&title);
                        continue;
                    }
                }
                if let Some(draft) = current.take() {
                    drafts.push(draft.finish(scale));
                }
                current = Some(Draft::new(&title, structure));
            }
            Line::Attribute { key, value } => {
                let applied = match current.as_mut() {
                    Some(draft) => draft.apply_attribute(&key, &value),
                    None => false,
                };
                if applied {
                    continue;
                }
                match key.as_str() {
                    "process" | "process name" if doc.process_name.is_empty() => {
                        doc.process_name = extract::clean_inline(&value);
                    }
                    "owner" | "process owner" | "responsible" | "role" if current.is_none() => {
                        doc.process_owner = Some(extract::clean_inline(&value));
                    }
                    "description" if current.is_none() => {
                        description.push(extract::clean_inline(&value));
                        description_closed = true;
                    }
                    _ => {}
                }
            }
            Line::Prose(text) => match current.as_mut() {
                Some(draft) => draft.append_description(text),
                None if drafts.is_empty() && !description_closed => {
                    description.push(extract::clean_inline(text));
                }
                None => {}
            },
        }
    }
    if let Some(draft) = current.take() {
        drafts.push(draft.finish(scale));
    }

    if !description.is_empty() {
        doc.description = Some(description.join(" "));
    }

    assemble(&mut doc, drafts);
    doc
}

/// Assign ids and sequence numbers, then resolve `Parallel with:` references
/// given as ids, step numbers or step names.
pub(crate) fn assemble(doc: &mut ProcessDocument, drafts: Vec<(ProcessStep, Vec<String>)>) {
    let mut refs: Vec<Vec<String>> = Vec::with_capacity(drafts.len());
    for (i, (mut step, parallel)) in drafts.into_iter().enumerate() {
        step.id = format!("step_{:03}", i + 1);
        step.sequence = (i + 1) as u32;
        doc.steps.push(step);
        refs.push(parallel);
    }

    for (i, parallel) in refs.iter().enumerate() {
        let mut resolved: Vec<String> = Vec::new();
        for reference in parallel {
            let Some(id) = resolve_reference(doc, reference) else {
                tracing::debug!(reference = %reference, "unresolved parallel reference kept verbatim");
                resolved.push(reference.clone());
                continue;
            };
            if id != doc.steps[i].id && !resolved.contains(&id) {
                resolved.push(id);
            }
        }
        doc.steps[i].parallel_steps = resolved;
    }

    // Parallelism is symmetric: mirror every resolved reference.
    let mut mirrored: Vec<(usize, String)> = Vec::new();
    for step in &doc.steps {
        for other in &step.parallel_steps {
            if let Some(j) = doc.steps.iter().position(|s| &s.id == other) {
                mirrored.push((j, step.id.clone()));
            }
        }
    }
    for (j, id) in mirrored {
        if !doc.steps[j].parallel_steps.contains(&id) {
            doc.steps[j].parallel_steps.push(id);
        }
    }
}

fn resolve_reference(doc: &ProcessDocument, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if doc.step(reference).is_some() {
        return Some(reference.to_string());
    }
    let number = reference
        .trim_start_matches(|c: char| c.is_alphabetic() || c.is_whitespace())
        .trim_start_matches('#');
    if let Ok(n) = number.parse::<usize>() {
        return doc.steps.get(n.checked_sub(1)?).map(|s| s.id.clone());
    }
    doc.steps
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(reference))
        .map(|s| s.id.clone())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ProcessDocument {
        parse_text(text, Source::new(SourceType::File, "test.md"), 1.0)
    }

    const INVOICE: &str = "\
# Invoice Approval

Handles supplier invoices from receipt to payment.

Owner: Finance Operations

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

## Notes

- Invoices over 10k need CFO sign-off
";

    #[test]
    fn parses_markdown_procedure() {
        let doc = parse(INVOICE);
        assert_eq!(doc.process_name, "Invoice Approval");
        assert_eq!(doc.process_owner.as_deref(), Some("Finance Operations"));
        assert_eq!(
            doc.description.as_deref(),
            Some("Handles supplier invoices from receipt to payment.")
        );
        assert_eq!(doc.steps.len(), 4, "notes bullets are not steps");

        let s1 = &doc.steps[0];
        assert_eq!(s1.id, "step_001");
        assert_eq!(s1.name, "Receive invoice");
        assert_eq!(s1.role.as_deref(), Some("AP Clerk"));
        assert_eq!(s1.duration_minutes, Some(15.0));
        assert_eq!(s1.outputs, vec!["invoice record".to_string()]);
        assert_eq!(s1.confidence, 1.0);

        let s2 = &doc.steps[1];
        assert_eq!(s2.inputs.len(), 2);
        assert_eq!(s2.handoffs[0].to_role, "Finance Manager");
        assert_eq!(s2.handoffs[0].artifact.as_deref(), Some("validated invoice"));

        let s3 = &doc.steps[2];
        assert_eq!(s3.duration_minutes, Some(60.0));
        assert_eq!(s3.decisions.len(), 1);
        assert_eq!(s3.decisions[0].question, "Is the amount within budget?");
        assert_eq!(
            s3.decisions[0].criteria.as_deref(),
            Some("amount <= remaining budget")
        );
        assert_eq!(s3.decisions[0].options, vec!["Approve", "Reject"]);

        let s4 = &doc.steps[3];
        assert_eq!(s4.name, "Schedule payment");
        assert_eq!(s4.duration_minutes, Some(2880.0));
        assert_eq!(s4.parallel_steps, vec!["step_003".to_string()]);
        assert!(s4.role.is_none());
        // numbered (1.0 * 0.5) + no role + inferred duration (0.5 * 0.25)
        assert_eq!(s4.confidence, 0.63);
    }

    #[test]
    fn explicit_fields_beat_inferred_ones() {
        let doc = parse("1. Review request (10 min)\n   Duration: 25 minutes\n");
        assert_eq!(doc.steps[0].duration_minutes, Some(25.0));
        assert_eq!(doc.steps[0].confidence, 0.75);
    }

    #[test]
    fn step_labels_and_role_prefixes() {
        let doc = parse("Step 1: [Requester] Submit request\nStep 2 - Approved by Team Lead\n");
        assert_eq!(doc.steps.len(), 2);
        assert_eq!(doc.steps[0].role.as_deref(), Some("Requester"));
        assert_eq!(doc.steps[0].name, "Submit request");
        assert_eq!(doc.steps[1].role.as_deref(), Some("Team Lead"));
    }

    #[test]
    fn bullets_are_lower_confidence_than_numbers() {
        let doc = parse("- Collect receipts\n- File expense report\n");
        assert_eq!(doc.steps.len(), 2);
        assert_eq!(doc.steps[0].confidence, 0.35);
    }

    #[test]
    fn inline_handoff_and_decision() {
        let doc = parse("1. Clerk sends the signed form to Payroll\n2. If salary changed, notify HR\n");
        assert_eq!(doc.steps[0].handoffs[0].to_role, "Payroll");
        assert_eq!(doc.steps[1].decisions[0].criteria.as_deref(), Some("salary changed"));
    }

    #[test]
    fn empty_text_yields_no_steps() {
        let doc = parse("   \n\n");
        assert!(doc.steps.is_empty());
        assert!(doc.process_name.is_empty());
    }

    #[test]
    fn parallel_references_are_mirrored() {
        let doc = parse("1. A\n   Role: Clerk\n2. B\n   Role: Clerk\n   Parallel with: 1\n");
        assert_eq!(doc.steps[0].parallel_steps, vec!["step_002".to_string()]);
        assert_eq!(doc.steps[1].parallel_steps, vec!["step_001".to_string()]);

        let gaps = crate::gaps::analyze(&doc, &crate::config::Config::default());
        assert!(gaps.iter().all(|g| g.gap_type != crate::types::GapType::Contradiction), "{gaps:?}");
    }

    #[test]
    fn unresolvable_parallel_reference_kept_for_gap_analysis() {
        let doc = parse("1. A\n   Parallel with: step_042\n2. B\n");
        assert_eq!(doc.steps[0].parallel_steps, vec!["step_042".to_string()]);
    }
}
