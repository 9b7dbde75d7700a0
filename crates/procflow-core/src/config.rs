use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Steps below this confidence are reported as incomplete.
    #[serde(default = "default_low_confidence")]
    pub low_confidence_threshold: f64,
    /// A step is a bottleneck when its duration exceeds this multiple of the mean.
    #[serde(default = "default_duration_multiple")]
    pub bottleneck_duration_multiple: f64,
    /// A step is a bottleneck when it has more handoffs than this.
    #[serde(default = "default_handoff_threshold")]
    pub bottleneck_handoff_threshold: usize,
}

fn default_low_confidence() -> f64 {
    0.4
}

fn default_duration_multiple() -> f64 {
    2.0
}

fn default_handoff_threshold() -> usize {
    2
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: default_low_confidence(),
            bottleneck_duration_multiple: default_duration_multiple(),
            bottleneck_handoff_threshold: default_handoff_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// PrioritizationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrioritizationConfig {
    /// Process executions per period, used as reach for generated improvements.
    #[serde(default = "default_reach")]
    pub reach: f64,
}

fn default_reach() -> f64 {
    100.0
}

impl Default for PrioritizationConfig {
    fn default() -> Self {
        Self {
            reach: default_reach(),
        }
    }
}

// ---------------------------------------------------------------------------
// FetchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout() -> u64 {
    20
}

fn default_user_agent() -> String {
    format!("procflow/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

// ---------------------------------------------------------------------------
// CapabilitySettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityPolicy {
    /// Use the capability when installed, degrade with a warning otherwise.
    #[default]
    Auto,
    /// Abort the run when the capability is missing.
    Required,
    /// Never use the capability.
    Disabled,
}

impl CapabilityPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityPolicy::Auto => "auto",
            CapabilityPolicy::Required => "required",
            CapabilityPolicy::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitySettings {
    pub command: String,
    #[serde(default)]
    pub policy: CapabilityPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default = "default_ocr")]
    pub ocr: CapabilitySettings,
    #[serde(default = "default_rasterizer")]
    pub rasterizer: CapabilitySettings,
}

fn default_ocr() -> CapabilitySettings {
    CapabilitySettings {
        command: "tesseract".to_string(),
        policy: CapabilityPolicy::Auto,
    }
}

fn default_rasterizer() -> CapabilitySettings {
    CapabilitySettings {
        command: "mmdc".to_string(),
        policy: CapabilityPolicy::Auto,
    }
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            ocr: default_ocr(),
            rasterizer: default_rasterizer(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Invocation-time configuration. Every section is optional in the YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub prioritization: PrioritizationConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

impl Config {
    /// Load from an explicit path, or fall back to defaults when none is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = crate::io::read_input(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(&data)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ConfigWarning {
            level: WarnLevel::Error,
            message,
        };
        let warning = |message: String| ConfigWarning {
            level: WarnLevel::Warning,
            message,
        };

        let a = &self.analysis;
        if !(0.0..=1.0).contains(&a.low_confidence_threshold) {
            warnings.push(error(format!(
                "analysis.low_confidence_threshold must be within [0, 1], got {}",
                a.low_confidence_threshold
            )));
        }
        if !(a.bottleneck_duration_multiple.is_finite() && a.bottleneck_duration_multiple > 0.0) {
            warnings.push(error(format!(
                "analysis.bottleneck_duration_multiple must be positive, got {}",
                a.bottleneck_duration_multiple
            )));
        } else if a.bottleneck_duration_multiple < 1.0 {
            warnings.push(warning(format!(
                "analysis.bottleneck_duration_multiple {} is below 1.0; most steps will be flagged",
                a.bottleneck_duration_multiple
            )));
        }

        let reach = self.prioritization.reach;
        if !reach.is_finite() || reach < 0.0 {
            warnings.push(error(format!(
                "prioritization.reach must be non-negative, got {reach}"
            )));
        } else if reach == 0.0 {
            warnings.push(warning(
                "prioritization.reach is 0; every generated improvement scores 0".to_string(),
            ));
        }

        if self.fetch.timeout_seconds == 0 {
            warnings.push(error(
                "fetch.timeout_seconds must be at least 1".to_string(),
            ));
        } else if self.fetch.timeout_seconds > 120 {
            warnings.push(warning(format!(
                "fetch.timeout_seconds {} is long; fetches may appear to hang",
                self.fetch.timeout_seconds
            )));
        }

        for (name, settings) in [
            ("ocr", &self.capabilities.ocr),
            ("rasterizer", &self.capabilities.rasterizer),
        ] {
            if settings.command.trim().is_empty() && settings.policy != CapabilityPolicy::Disabled {
                warnings.push(error(format!(
                    "capabilities.{name}.command is empty"
                )));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_file() {
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg.analysis.low_confidence_threshold, 0.4);
        assert_eq!(cfg.analysis.bottleneck_duration_multiple, 2.0);
        assert_eq!(cfg.analysis.bottleneck_handoff_threshold, 2);
        assert_eq!(cfg.fetch.timeout_seconds, 20);
        assert_eq!(cfg.capabilities.ocr.command, "tesseract");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("procflow.yaml");
        std::fs::write(
            &path,
            "analysis:\n  low_confidence_threshold: 0.6\ncapabilities:\n  ocr:\n    command: ocr-missing\n    policy: required\n",
        )
        .unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.analysis.low_confidence_threshold, 0.6);
        assert_eq!(cfg.analysis.bottleneck_handoff_threshold, 2);
        assert_eq!(cfg.capabilities.ocr.policy, CapabilityPolicy::Required);
        assert_eq!(cfg.capabilities.rasterizer.command, "mmdc");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn validate_flags_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.analysis.low_confidence_threshold = 1.5;
        cfg.fetch.timeout_seconds = 0;
        cfg.prioritization.reach = 0.0;
        let warnings = cfg.validate();
        let errors = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .count();
        assert_eq!(errors, 2);
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn yaml_roundtrip() {
        let cfg = Config::default();
        let yaml = cfg.to_yaml().unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.capabilities.rasterizer.command, "mmdc");
    }
}
