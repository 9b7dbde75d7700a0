//! Pattern helpers shared by the text and transcript handlers.

use crate::document::{Decision, Handoff};
use crate::types::AutomationPotential;
use regex::Regex;
use std::sync::OnceLock;

/// Confidence attached to a field read from an explicit `Key: value` line.
pub const EXPLICIT: f64 = 1.0;
/// Confidence attached to a field inferred from free text.
pub const INFERRED: f64 = 0.5;

static DURATION_RE: OnceLock<Regex> = OnceLock::new();
static PAREN_DURATION_RE: OnceLock<Regex> = OnceLock::new();
static ROLE_BY_RE: OnceLock<Regex> = OnceLock::new();
static ROLE_PREFIX_RE: OnceLock<Regex> = OnceLock::new();
static HANDOFF_RE: OnceLock<Regex> = OnceLock::new();
static HANDOFF_BARE_RE: OnceLock<Regex> = OnceLock::new();
static IF_RE: OnceLock<Regex> = OnceLock::new();

fn duration_re() -> &'static Regex {
    DURATION_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d+(?:\.\d+)?)\s*(minutes?|mins?|hours?|hrs?|h|days?|weeks?|wks?|seconds?|secs?)\b",
        )
        .unwrap()
    })
}

fn paren_duration_re() -> &'static Regex {
    PAREN_DURATION_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\s*[(\[]\s*(?:~|approx\.?\s*|about\s+)?\d+(?:\.\d+)?\s*(?:minutes?|mins?|hours?|hrs?|h|days?|weeks?|wks?)\s*[)\]]",
        )
        .unwrap()
    })
}

fn role_by_re() -> &'static Regex {
    ROLE_BY_RE.get_or_init(|| {
        Regex::new(r"\b(?:[Bb]y|[Oo]wner|[Rr]esponsible)\s*:?\s+(?:the\s+)?([A-Z][\w&/-]*(?:\s+[A-Z][\w&/-]*)*)")
            .unwrap()
    })
}

fn role_prefix_re() -> &'static Regex {
    ROLE_PREFIX_RE.get_or_init(|| Regex::new(r"^\[([^\]]{1,60})\]\s*(.+)$").unwrap())
}

fn handoff_re() -> &'static Regex {
    HANDOFF_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:sends?|sent|hands?\s+(?:over|off)|forwards?|passes|submits?|routes?|escalates?|emails?)\s+(?:the\s+|a\s+|an\s+)?(.+?)\s+to\s+(?:the\s+)?((?-i:[A-Z])[\w&/-]*(?:\s+(?-i:[A-Z])[\w&/-]*)*)",
        )
        .unwrap()
    })
}

fn handoff_bare_re() -> &'static Regex {
    HANDOFF_BARE_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bhands?\s*-?\s*off\s+to\s+(?:the\s+)?((?-i:[A-Z])[\w&/-]*(?:\s+(?-i:[A-Z])[\w&/-]*)*)",
        )
        .unwrap()
    })
}

fn if_re() -> &'static Regex {
    IF_RE.get_or_init(|| Regex::new(r"(?i)^\s*if\s+(.+?)\s*(?:,|\bthen\b)\s*(.*)$").unwrap())
}

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

fn unit_minutes(unit: &str) -> Option<f64> {
    let unit = unit.to_ascii_lowercase();
    let minutes = if unit.starts_with("sec") {
        1.0 / 60.0
    } else if unit.starts_with("min") {
        1.0
    } else if unit.starts_with('h') {
        60.0
    } else if unit.starts_with('d') {
        1440.0
    } else if unit.starts_with('w') {
        10080.0
    } else {
        return None;
    };
    Some(minutes)
}

/// First duration mentioned in `text`, in minutes.
pub fn find_duration_minutes(text: &str) -> Option<f64> {
    let caps = duration_re().captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    Some(value * unit_minutes(&caps[2])?)
}

/// Duration from an explicit attribute; a bare number is read as minutes.
pub fn parse_duration_value(value: &str) -> Option<f64> {
    find_duration_minutes(value).or_else(|| value.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Effort from an explicit attribute; a bare number is read as hours.
pub fn parse_effort_hours(value: &str) -> Option<f64> {
    match find_duration_minutes(value) {
        Some(minutes) => Some(minutes / 60.0),
        None => value.trim().parse::<f64>().ok(),
    }
    .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Drop a parenthesised duration such as `(30 min)` from a step title.
pub fn strip_paren_duration(text: &str) -> String {
    paren_duration_re().replace_all(text, "").trim().to_string()
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// `[Role] Do the thing` prefix; returns the role and the remaining text.
pub fn split_role_prefix(text: &str) -> Option<(String, String)> {
    let caps = role_prefix_re().captures(text)?;
    Some((caps[1].trim().to_string(), caps[2].trim().to_string()))
}

/// Role after a keyword like "by" or "responsible", e.g. "approved by Finance Manager".
pub fn infer_role(text: &str) -> Option<String> {
    let caps = role_by_re().captures(text)?;
    let role = caps[1].trim().trim_end_matches(['.', ',', ';']).to_string();
    (!role.is_empty()).then_some(role)
}

// ---------------------------------------------------------------------------
// Handoffs
// ---------------------------------------------------------------------------

pub fn infer_handoffs(text: &str) -> Vec<Handoff> {
    if let Some(caps) = handoff_re().captures(text) {
        return vec![Handoff {
            to_role: caps[2].trim().to_string(),
            artifact: Some(caps[1].trim().to_string()).filter(|a| !a.is_empty()),
        }];
    }
    if let Some(caps) = handoff_bare_re().captures(text) {
        return vec![Handoff {
            to_role: caps[1].trim().to_string(),
            artifact: None,
        }];
    }
    Vec::new()
}

/// `Legal (signed contract)`, `to Legal - contract`, `Legal: contract` or `Legal`.
pub fn parse_handoff_value(value: &str) -> Option<Handoff> {
    let value = value.trim();
    let value = value
        .strip_prefix("to ")
        .or_else(|| value.strip_prefix("To "))
        .unwrap_or(value)
        .trim();
    if value.is_empty() {
        return None;
    }

    let (role, artifact) = if let Some(open) = value.find('(') {
        let role = &value[..open];
        let artifact = value[open + 1..].trim_end_matches(')');
        (role, Some(artifact))
    } else if let Some((role, artifact)) = value.split_once(" - ") {
        (role, Some(artifact))
    } else if let Some((role, artifact)) = value.split_once(':') {
        (role, Some(artifact))
    } else {
        (value, None)
    };

    let to_role = role.trim().to_string();
    if to_role.is_empty() {
        return None;
    }
    Some(Handoff {
        to_role,
        artifact: artifact
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()),
    })
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

pub fn yes_no() -> Vec<String> {
    vec!["Yes".to_string(), "No".to_string()]
}

/// A decision implied by a step sentence: a question or an "If X, Y" clause.
pub fn infer_decision(text: &str) -> Option<Decision> {
    let text = text.trim();
    if let Some(caps) = if_re().captures(text) {
        let condition = caps[1].trim();
        if !condition.is_empty() {
            return Some(Decision {
                question: format!("{}?", capitalize(condition)),
                criteria: Some(condition.to_string()),
                options: yes_no(),
            });
        }
    }
    if text.ends_with('?') {
        return Some(Decision {
            question: text.to_string(),
            criteria: None,
            options: yes_no(),
        });
    }
    None
}

/// Options listed as `a / b / c`, `a, b`, `a | b` or `a or b`.
pub fn split_options(value: &str) -> Vec<String> {
    let normalized = value.replace(" or ", "/").replace('|', "/").replace(',', "/");
    split_clean(&normalized, &['/'])
}

pub fn split_list(value: &str) -> Vec<String> {
    split_clean(value, &[',', ';'])
}

fn split_clean(value: &str, seps: &[char]) -> Vec<String> {
    value
        .split(|c| seps.contains(&c))
        .map(|s| s.trim().trim_end_matches('.').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Automation potential
// ---------------------------------------------------------------------------

const HIGH_AUTOMATION: &[&str] = &[
    "manual", "manually", "copy", "re-enter", "reenter", "enter data", "data entry", "type",
    "spreadsheet", "excel", "email", "print", "scan", "upload", "download", "export", "import",
    "reconcile", "calculate", "notify", "remind", "file",
];
const LOW_AUTOMATION: &[&str] = &[
    "approve", "negotiate", "decide", "interview", "meet", "discuss", "investigate", "design",
    "sign", "escalate", "judge", "assess",
];

/// Judgement-heavy work wins over repetitive work; anything else is medium.
pub fn infer_automation(text: &str) -> AutomationPotential {
    let lower = text.to_ascii_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();
    let mentions = |keywords: &[&str]| {
        keywords.iter().any(|k| {
            if k.contains(' ') {
                lower.contains(k)
            } else {
                words.iter().any(|w| w.starts_with(k))
            }
        })
    };

    if mentions(LOW_AUTOMATION) {
        AutomationPotential::Low
    } else if mentions(HIGH_AUTOMATION) {
        AutomationPotential::High
    } else {
        AutomationPotential::Medium
    }
}

// ---------------------------------------------------------------------------
// Action verbs (transcripts)
// ---------------------------------------------------------------------------

const ACTION_VERBS: &[&str] = &[
    "submit", "review", "approv", "send", "create", "check", "updat", "enter", "verif", "prepar",
    "schedul", "notif", "process", "sign", "validat", "collect", "assign", "complet", "file",
    "pay", "invoic", "ship", "receiv", "forward", "escalat", "record", "upload", "download",
    "email", "call", "book", "order", "confirm", "draft", "publish", "reconcil", "calculat",
    "generat", "export", "import", "archiv", "hand",
];

pub fn has_action_verb(sentence: &str) -> bool {
    sentence
        .to_ascii_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .any(|w| w.len() > 2 && ACTION_VERBS.iter().any(|v| w.starts_with(v)))
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Collapse runs of whitespace and strip markdown emphasis markers.
pub fn clean_inline(text: &str) -> String {
    text.replace("**", "")
        .replace("__", "")
        .replace('`', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
