//! Detection and invocation of optional external capabilities.
//!
//! OCR (image parsing) and diagram rasterization depend on binaries that may
//! not be installed. Callers probe first and branch on the tri-state result:
//!
//! - `Available`: the configured command resolved on `PATH`.
//! - `Degrade`:   missing or disabled, and the run continues with a fallback.
//! - `Fail`:      missing under the `required` policy; the run aborts.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;

use crate::config::{CapabilityPolicy, CapabilitySettings, Config};
use crate::error::{ProcflowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Ocr,
    Rasterizer,
}

impl Capability {
    pub fn all() -> &'static [Capability] {
        &[Capability::Ocr, Capability::Rasterizer]
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::Ocr => "ocr",
            Capability::Rasterizer => "rasterizer",
        }
    }

    pub fn settings(self, config: &Config) -> &CapabilitySettings {
        match self {
            Capability::Ocr => &config.capabilities.ocr,
            Capability::Rasterizer => &config.capabilities.rasterizer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CapabilityStatus {
    Available { program: PathBuf },
    Degrade { reason: String },
    Fail { reason: String },
}

impl CapabilityStatus {
    /// Turn `Fail` into a `CapabilityUnavailable` error; pass the rest through.
    pub fn require_not_failed(self, capability: Capability) -> Result<Self> {
        match self {
            CapabilityStatus::Fail { reason } => Err(ProcflowError::CapabilityUnavailable {
                capability: capability.name().to_string(),
                reason,
            }),
            other => Ok(other),
        }
    }
}

/// Resolve a capability against its configured command and policy.
pub fn probe(capability: Capability, settings: &CapabilitySettings) -> CapabilityStatus {
    if settings.policy == CapabilityPolicy::Disabled {
        return CapabilityStatus::Degrade {
            reason: format!("{} is disabled by configuration", capability.name()),
        };
    }

    match which::which(settings.command.trim()) {
        Ok(program) => CapabilityStatus::Available { program },
        Err(_) => {
            let reason = format!(
                "'{}' was not found on PATH; install it to enable {}",
                settings.command,
                capability.name()
            );
            if settings.policy == CapabilityPolicy::Required {
                CapabilityStatus::Fail { reason }
            } else {
                CapabilityStatus::Degrade { reason }
            }
        }
    }
}

/// Run an external capability binary and return its stdout.
///
/// Stderr is captured and folded into the error so that a failing OCR or
/// rasterizer run produces a readable message instead of terminal noise.
pub fn run_capture(capability: Capability, program: &Path, args: &[&std::ffi::OsStr]) -> Result<String> {
    tracing::debug!(capability = capability.name(), program = %program.display(), "invoking");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ProcflowError::CapabilityUnavailable {
            capability: capability.name().to_string(),
            reason: format!("failed to start {}: {e}", program.display()),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let hint: String = stderr.trim().chars().take(500).collect();
        return Err(ProcflowError::CapabilityUnavailable {
            capability: capability.name().to_string(),
            reason: format!("{} exited with {}: {hint}", program.display(), output.status),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
