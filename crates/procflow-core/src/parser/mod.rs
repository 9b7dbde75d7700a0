//! Turn raw process descriptions into a [`ProcessDocument`].
//!
//! Every handler produces a document; empty or unrecognisable content yields
//! zero steps plus seeded gaps rather than an error. Only unreadable inputs,
//! forbidden URLs, network failures and required-but-missing capabilities
//! fail.

mod extract;
mod html;
mod image;
mod text;
mod transcript;
mod url;

use crate::config::Config;
use crate::document::ProcessDocument;
use crate::error::{ProcflowError, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use url::validate_url;

// ---------------------------------------------------------------------------
// InputKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Auto,
    Text,
    Url,
    Image,
    Transcript,
}

impl InputKind {
    pub fn all() -> &'static [InputKind] {
        &[
            InputKind::Auto,
            InputKind::Text,
            InputKind::Url,
            InputKind::Image,
            InputKind::Transcript,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Auto => "auto",
            InputKind::Text => "text",
            InputKind::Url => "url",
            InputKind::Image => "image",
            InputKind::Transcript => "transcript",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputKind {
    type Err = ProcflowError;

    fn from_str(s: &str) -> Result<Self> {
        InputKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProcflowError::InvalidArgument(format!("unknown input kind: {s}")))
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];

/// Pick a handler from the shape of the input string.
pub fn detect_kind(input: &str) -> InputKind {
    let input = input.trim();
    if url::has_scheme(input) {
        return InputKind::Url;
    }

    let path = Path::new(input);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return InputKind::Image;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ext == "vtt" || ext == "srt" || file_name.contains("transcript") {
        return InputKind::Transcript;
    }
    InputKind::Text
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Overrides whatever process name the content suggests.
    pub name: Option<String>,
}

/// Parse a file path or URL into a document with seeded gaps.
pub fn parse(
    input: &str,
    kind: InputKind,
    opts: &ParseOptions,
    cfg: &Config,
) -> Result<ProcessDocument> {
    let kind = match kind {
        InputKind::Auto => detect_kind(input),
        other => other,
    };
    tracing::debug!(input, kind = %kind, "parsing");

    let mut doc = match kind {
        InputKind::Url => url::parse_url(input, &cfg.fetch)?,
        InputKind::Image => image::parse_image(Path::new(input), cfg)?,
        InputKind::Transcript => transcript::parse_transcript_file(Path::new(input))?,
        InputKind::Text | InputKind::Auto => text::parse_text_file(Path::new(input))?,
    };

    finish(&mut doc, opts, input);
    Ok(doc)
}

/// Shared tail of every handler: naming, derived fields and seeded gaps.
fn finish(doc: &mut ProcessDocument, opts: &ParseOptions, input: &str) {
    if let Some(name) = opts.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        doc.process_name = name.to_string();
    }
    if doc.process_name.trim().is_empty() {
        doc.process_name = fallback_name(input);
    }
    doc.normalize();
    for gap in crate::gaps::seed_gaps(doc) {
        if !doc.gaps.iter().any(|g| g.gap_type == gap.gap_type && g.step_id == gap.step_id) {
            doc.gaps.push(gap);
        }
    }
    tracing::info!(
        steps = doc.steps.len(),
        roles = doc.roles.len(),
        confidence = doc.confidence_score,
        gaps = doc.gaps.len(),
        "parsed process"
    );
}

/// A readable name from the file stem or URL path.
fn fallback_name(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    let stem = last.split(['?', '#']).next().unwrap_or(last);
    let stem = Path::new(stem)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(stem);
    let words: Vec<String> = stem
        .split(['-', '_', '.', ' '])
        .filter(|w| !w.is_empty())
        .map(extract::capitalize)
        .collect();
    if words.is_empty() {
        "Untitled process".to_string()
    } else {
        words.join(" ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GapType, Severity, SourceType};
    use tempfile::TempDir;

    #[test]
    fn detects_kinds() {
        assert_eq!(detect_kind("https://example.com/wiki"), InputKind::Url);
        assert_eq!(detect_kind("javascript:alert(1)"), InputKind::Url);
        assert_eq!(detect_kind("scan.PNG"), InputKind::Image);
        assert_eq!(detect_kind("call.vtt"), InputKind::Transcript);
        assert_eq!(detect_kind("notes/onboarding-transcript.txt"), InputKind::Transcript);
        assert_eq!(detect_kind("process.md"), InputKind::Text);
        assert_eq!(detect_kind("C:\\docs\\process.md"), InputKind::Text);
    }

    #[test]
    fn kind_from_str() {
        assert_eq!("Image".parse::<InputKind>().unwrap(), InputKind::Image);
        assert!("pdf".parse::<InputKind>().is_err());
    }

    #[test]
    fn parse_markdown_file_seeds_no_gaps_when_complete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("expense-claims.md");
        std::fs::write(&path, "1. Submit claim\n   Role: Employee\n   Duration: 10 min\n").unwrap();
        let doc = parse(
            path.to_str().unwrap(),
            InputKind::Auto,
            &ParseOptions::default(),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(doc.process_name, "Expense Claims");
        assert_eq!(doc.source.source_type, SourceType::File);
        assert_eq!(doc.roles, vec!["Employee".to_string()]);
        assert_eq!(doc.confidence_score, 1.0);
        assert!(doc.gaps.is_empty());
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn empty_file_gives_valid_empty_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();
        let opts = ParseOptions {
            name: Some("Procurement".to_string()),
        };
        let doc = parse(path.to_str().unwrap(), InputKind::Text, &opts, &Config::default()).unwrap();
        assert_eq!(doc.process_name, "Procurement");
        assert!(doc.steps.is_empty());
        assert_eq!(doc.confidence_score, 0.0);
        assert_eq!(doc.gaps.len(), 1);
        assert_eq!(doc.gaps[0].gap_type, GapType::MissingInfo);
        assert_eq!(doc.gaps[0].severity, Severity::Critical);
    }

    #[test]
    fn steps_without_roles_seed_undefined_role_gap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.md");
        std::fs::write(&path, "1. Open ticket\n2. Close ticket\n").unwrap();
        let doc = parse(
            path.to_str().unwrap(),
            InputKind::Text,
            &ParseOptions::default(),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(doc.gaps.len(), 1);
        assert_eq!(doc.gaps[0].gap_type, GapType::UndefinedRole);
        assert_eq!(doc.gaps[0].severity, Severity::High);
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = parse(
            "/definitely/not/here.md",
            InputKind::Auto,
            &ParseOptions::default(),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProcflowError::FileNotFound(_)));
    }

    #[test]
    fn fallback_names() {
        assert_eq!(fallback_name("docs/vendor_onboarding.md"), "Vendor Onboarding");
        assert_eq!(fallback_name("https://wiki.example.com/ops/refunds?x=1"), "Refunds");
        assert_eq!(fallback_name(""), "Untitled process");
    }
}
