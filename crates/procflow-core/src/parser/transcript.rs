//! Meeting and interview transcripts: plain `Speaker: text` logs, WebVTT
//! and SRT captions.

use super::extract::{self, INFERRED};
use super::text;
use crate::document::{ProcessDocument, ProcessStep, Source};
use crate::error::Result;
use crate::types::SourceType;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Confidence for a role taken from the speaker of a first-person sentence.
const SPEAKER_ROLE: f64 = 0.8;
const STRUCTURE: f64 = 0.5;

static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();
static SPEAKER_RE: OnceLock<Regex> = OnceLock::new();
static VOICE_RE: OnceLock<Regex> = OnceLock::new();
static SENTENCE_RE: OnceLock<Regex> = OnceLock::new();

fn timestamp_re() -> &'static Regex {
    TIMESTAMP_RE.get_or_init(|| {
        Regex::new(r"^\s*[\[(]?\d{1,2}:\d{2}(?::\d{2})?(?:[.,]\d+)?[\])]?\s*[-:]?\s*").unwrap()
    })
}

fn speaker_re() -> &'static Regex {
    SPEAKER_RE.get_or_init(|| {
        Regex::new(r"^([A-Z][\w.'-]*(?:\s+[A-Z][\w.'-]*){0,3}|[A-Z][\w.'-]*\s*\([^)]{1,40}\))\s*:\s+(.+)$")
            .unwrap()
    })
}

fn voice_re() -> &'static Regex {
    VOICE_RE.get_or_init(|| Regex::new(r"^<v\.?[^\s>]*\s+([^>]+)>(.*?)(?:</v>)?$").unwrap())
}

fn sentence_re() -> &'static Regex {
    SENTENCE_RE.get_or_init(|| Regex::new(r"[^.!?]+[.!?]*").unwrap())
}

const FILLERS: &[&str] = &[
    "um", "uh", "erm", "like", "you know", "basically", "okay so", "ok so", "so", "well",
    "right", "and then", "then", "and", "first", "next", "after that", "finally", "usually",
];
const FIRST_PERSON: &[&str] = &["i", "i'm", "i'll", "i've", "i'd", "we", "we'll", "we're", "my", "our"];
const SPEAKER_BLOCKLIST: &[&str] = &["Note", "Notes", "WEBVTT", "Kind", "Language", "Http", "Https"];

// ---------------------------------------------------------------------------
// Turn segmentation
// ---------------------------------------------------------------------------

struct Turn {
    speaker: Option<String>,
    text: String,
}

fn is_cue_noise(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("WEBVTT")
        || line.starts_with("NOTE")
        || line.starts_with("Kind:")
        || line.starts_with("Language:")
        || line.contains("-->")
        || line.chars().all(|c| c.is_ascii_digit())
}

fn segment(raw: &str) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if is_cue_noise(line) {
            continue;
        }
        let line = timestamp_re().replace(line, "");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (speaker, text) = if let Some(caps) = voice_re().captures(line) {
            (Some(caps[1].trim().to_string()), caps[2].to_string())
        } else if let Some(caps) = speaker_re()
            .captures(line)
            .filter(|c| !SPEAKER_BLOCKLIST.contains(&c[1].trim()))
        {
            (Some(caps[1].trim().to_string()), caps[2].to_string())
        } else {
            (None, line.to_string())
        };

        if speaker.is_none() {
            if let Some(last) = turns.last_mut() {
                last.text.push(' ');
                last.text.push_str(&text);
                continue;
            }
        }
        turns.push(Turn { speaker, text });
    }
    turns
}

// ---------------------------------------------------------------------------
// Sentence to step
// ---------------------------------------------------------------------------

fn strip_fillers(sentence: &str) -> String {
    let mut s = sentence.trim().trim_start_matches([',', '-']).trim().to_string();
    loop {
        let lower = s.to_ascii_lowercase();
        let filler = FILLERS.iter().find(|f| {
            lower.starts_with(*f)
                && lower[f.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c == ' ' || c == ',')
        });
        match filler {
            Some(f) => s = s[f.len()..].trim_start_matches([' ', ',']).to_string(),
            None => return s,
        }
    }
}

fn words_lower(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

fn is_first_person(sentence: &str) -> bool {
    words_lower(sentence).iter().any(|w| FIRST_PERSON.contains(&w.as_str()))
}

/// "I then submit the form" -> "Submit the form".
fn step_name(sentence: &str) -> String {
    let mut rest = sentence.trim();
    for pronoun in ["I'll ", "I will ", "I ", "We'll ", "We will ", "We ", "we ", "i "] {
        if let Some(r) = rest.strip_prefix(pronoun) {
            rest = r;
            break;
        }
    }
    let rest = strip_fillers(rest);
    let rest = extract::strip_paren_duration(&rest);
    extract::capitalize(rest.trim_end_matches(['.', '!', ',', ';']).trim())
}

fn sentence_step(sentence: &str, speaker: Option<&str>) -> Option<(ProcessStep, Vec<String>)> {
    let sentence = extract::clean_inline(&strip_fillers(sentence));
    if sentence.is_empty() || sentence.ends_with('?') || !extract::has_action_verb(&sentence) {
        return None;
    }
    let name = step_name(&sentence);
    if name.split_whitespace().count() < 2 {
        return None;
    }

    let mut step = ProcessStep::new(String::new(), name, 0);
    let mut role_conf = 0.0;
    let mut duration_conf = 0.0;

    if let (Some(speaker), true) = (speaker, is_first_person(&sentence)) {
        step.role = Some(speaker.to_string());
        role_conf = SPEAKER_ROLE;
    } else if let Some(role) = extract::infer_role(&sentence) {
        step.role = Some(role);
        role_conf = INFERRED;
    }
    if let Some(minutes) = extract::find_duration_minutes(&sentence) {
        step.duration_minutes = Some(minutes);
        duration_conf = INFERRED;
    }
    step.handoffs = extract::infer_handoffs(&sentence);
    step.decisions = extract::infer_decision(&sentence).into_iter().collect();
    step.automation_potential = extract::infer_automation(&sentence);
    step.description = Some(sentence);
    step.confidence =
        crate::document::round2(0.5 * STRUCTURE + 0.25 * role_conf + 0.25 * duration_conf);
    Some((step, Vec::new()))
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub(super) fn parse_transcript_file(path: &Path) -> Result<ProcessDocument> {
    let bytes = crate::io::read_input_bytes(path)?;
    let raw = String::from_utf8_lossy(&bytes);
    let source = Source::new(SourceType::Transcript, path.display().to_string());
    Ok(parse_transcript(&raw, source))
}

pub(super) fn parse_transcript(raw: &str, source: Source) -> ProcessDocument {
    let mut doc = ProcessDocument::new(String::new(), source);
    let turns = segment(raw);

    let mut speakers: Vec<&str> = Vec::new();
    let mut drafts = Vec::new();
    for turn in &turns {
        let speaker = turn.speaker.as_deref();
        if let Some(s) = speaker {
            if !speakers.contains(&s) {
                speakers.push(s);
            }
        }
        for m in sentence_re().find_iter(&turn.text) {
            if let Some(draft) = sentence_step(m.as_str(), speaker) {
                drafts.push(draft);
            }
        }
    }

    if !speakers.is_empty() {
        doc.description = Some(format!(
            "Transcript with {} speaker(s): {}",
            speakers.len(),
            speakers.join(", ")
        ));
    }
    tracing::debug!(turns = turns.len(), candidates = drafts.len(), "segmented transcript");
    text::assemble(&mut doc, drafts);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ProcessDocument {
        parse_transcript(raw, Source::new(SourceType::Transcript, "call.txt"))
    }

    #[test]
    fn first_person_sentences_take_the_speaker_as_role() {
        let doc = parse(
            "[00:00:05] Interviewer: Can you walk me through it?\n\
             [00:00:09] Dana (AP Clerk): Um, so first I enter the invoice into the ledger. \
             That takes about 15 minutes.\n\
             Then I send the batch to Finance Manager.\n\
             Priya: We approve anything under budget. Nice weather today.\n",
        );
        assert_eq!(doc.steps.len(), 3, "{:#?}", doc.steps);

        let s1 = &doc.steps[0];
        assert_eq!(s1.name, "Enter the invoice into the ledger");
        assert_eq!(s1.role.as_deref(), Some("Dana (AP Clerk)"));
        // 0.5 * 0.5 + 0.25 * 0.8
        assert_eq!(s1.confidence, 0.45);

        let s2 = &doc.steps[1];
        assert_eq!(s2.handoffs[0].to_role, "Finance Manager");

        assert_eq!(doc.steps[2].role.as_deref(), Some("Priya"));
        assert!(doc.description.as_deref().unwrap().contains("3 speaker(s)"));
    }

    #[test]
    fn webvtt_cues_are_skipped() {
        let doc = parse(
            "WEBVTT\n\n1\n00:00:01.000 --> 00:00:04.000\n<v Sam>I review the request.</v>\n\n\
             2\n00:00:05.000 --> 00:00:08.000\n<v Sam>Then I email the customer.</v>\n",
        );
        assert_eq!(doc.steps.len(), 2);
        assert_eq!(doc.steps[0].name, "Review the request");
        assert_eq!(doc.steps[1].id, "step_002");
        assert_eq!(doc.steps[1].role.as_deref(), Some("Sam"));
    }

    #[test]
    fn chatter_without_actions_yields_empty_document() {
        let doc = parse("Alex: Hello everyone.\nBo: Good morning! How are you?\n");
        assert!(doc.steps.is_empty());
    }

    #[test]
    fn fillers_are_stripped() {
        assert_eq!(strip_fillers("um, so basically we ship it"), "we ship it");
        assert_eq!(strip_fillers("Then, finally I file it"), "I file it");
        assert_eq!(strip_fillers("Sorting mail"), "Sorting mail");
    }
}
