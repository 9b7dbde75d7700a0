use super::text;
use crate::capability::{self, Capability, CapabilityStatus};
use crate::config::{CapabilityPolicy, Config};
use crate::document::{Gap, ProcessDocument, Source};
use crate::error::{ProcflowError, Result};
use crate::types::{GapType, Severity, SourceType};
use std::ffi::OsStr;
use std::path::Path;

/// Multiplier applied to every step confidence read from OCR text.
const OCR_CONFIDENCE_SCALE: f64 = 0.8;

pub(super) fn parse_image(path: &Path, cfg: &Config) -> Result<ProcessDocument> {
    if !path.is_file() {
        return Err(ProcflowError::FileNotFound(path.to_path_buf()));
    }
    let source = Source::new(SourceType::Image, path.display().to_string());

    let settings = Capability::Ocr.settings(cfg);
    let status = capability::probe(Capability::Ocr, settings).require_not_failed(Capability::Ocr)?;
    let program = match status {
        CapabilityStatus::Available { program } => program,
        CapabilityStatus::Degrade { reason } | CapabilityStatus::Fail { reason } => {
            tracing::warn!(image = %path.display(), "OCR unavailable, emitting empty document: {reason}");
            return Ok(unavailable_document(source, &reason));
        }
    };

    let run = capability::run_capture(
        Capability::Ocr,
        &program,
        &[path.as_os_str(), OsStr::new("stdout")],
    );
    let recognized = match run {
        Ok(text) => text,
        Err(e) if settings.policy != CapabilityPolicy::Required => {
            let reason = e.to_string();
            tracing::warn!(image = %path.display(), "OCR failed, emitting empty document: {reason}");
            return Ok(unavailable_document(source, &reason));
        }
        Err(e) => return Err(e),
    };
    tracing::debug!(chars = recognized.len(), "OCR finished");
    Ok(text::parse_text(&recognized, source, OCR_CONFIDENCE_SCALE))
}

fn unavailable_document(source: Source, reason: &str) -> ProcessDocument {
    let mut doc = ProcessDocument::new(String::new(), source);
    doc.gaps.push(
        Gap::new(
            GapType::MissingInfo,
            Severity::Critical,
            None,
            format!("Image could not be read because OCR is unavailable: {reason}"),
        )
        .with_impact("No steps could be extracted from the image.")
        .with_questions(vec![
            "Can the process be provided as text or markdown instead?".to_string(),
            "Can OCR be installed so the image can be transcribed?".to_string(),
        ]),
    );
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn config_with_ocr(command: &str, policy: CapabilityPolicy) -> Config {
        let mut cfg = Config::default();
        cfg.capabilities.ocr.command = command.to_string();
        cfg.capabilities.ocr.policy = policy;
        cfg
    }

    fn image(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("whiteboard.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
        path
    }

    #[test]
    fn missing_ocr_degrades_to_single_critical_gap() {
        let dir = TempDir::new().unwrap();
        let cfg = config_with_ocr("procflow-missing-ocr", CapabilityPolicy::Auto);
        let doc = parse_image(&image(&dir), &cfg).unwrap();
        assert!(doc.steps.is_empty());
        assert_eq!(doc.gaps.len(), 1);
        assert_eq!(doc.gaps[0].gap_type, GapType::MissingInfo);
        assert_eq!(doc.gaps[0].severity, Severity::Critical);
        assert_eq!(doc.source.source_type, SourceType::Image);
    }

    #[test]
    fn disabled_ocr_degrades_even_if_installed() {
        let dir = TempDir::new().unwrap();
        let cfg = config_with_ocr("sh", CapabilityPolicy::Disabled);
        let doc = parse_image(&image(&dir), &cfg).unwrap();
        assert_eq!(doc.gaps.len(), 1);
    }

    #[test]
    fn required_ocr_fails() {
        let dir = TempDir::new().unwrap();
        let cfg = config_with_ocr("procflow-missing-ocr", CapabilityPolicy::Required);
        let err = parse_image(&image(&dir), &cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
    }

    #[cfg(unix)]
    #[test]
    fn failing_ocr_run_degrades_unless_required() {
        let dir = TempDir::new().unwrap();
        let cfg = config_with_ocr("false", CapabilityPolicy::Auto);
        let doc = parse_image(&image(&dir), &cfg).unwrap();
        assert!(doc.steps.is_empty());
        assert_eq!(doc.gaps.len(), 1);
        assert_eq!(doc.gaps[0].severity, Severity::Critical);

        let cfg = config_with_ocr("false", CapabilityPolicy::Required);
        let err = parse_image(&image(&dir), &cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
    }

    #[test]
    fn missing_image_is_file_not_found() {
        let dir = TempDir::new().unwrap();
        let err = parse_image(&dir.path().join("nope.png"), &Config::default()).unwrap_err();
        assert!(matches!(err, ProcflowError::FileNotFound(_)));
    }
}
