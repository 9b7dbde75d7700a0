use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Taxonomy code reported at the CLI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InputError,
    SchemaError,
    NetworkError,
    CapabilityUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InputError => "InputError",
            ErrorKind::SchemaError => "SchemaError",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::CapabilityUnavailable => "CapabilityUnavailable",
            ErrorKind::Internal => "InternalError",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::InputError => 2,
            ErrorKind::SchemaError => 3,
            ErrorKind::NetworkError => 4,
            ErrorKind::CapabilityUnavailable => 5,
            ErrorKind::Internal => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProcflowError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProcflowError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("cannot read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("malformed input {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error("invalid source '{0}': only http and https URLs are accepted")]
    InvalidSource(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported schemaVersion '{found}' (supported: {supported}.x)")]
    UnsupportedSchemaVersion { found: String, supported: u32 },

    #[error("document has no schemaVersion")]
    MissingSchemaVersion,

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("capability '{capability}' unavailable: {reason}")]
    CapabilityUnavailable { capability: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ProcflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcflowError::FileNotFound(_)
            | ProcflowError::Unreadable { .. }
            | ProcflowError::MalformedInput { .. }
            | ProcflowError::InvalidSource(_)
            | ProcflowError::InvalidArgument(_)
            | ProcflowError::Yaml(_) => ErrorKind::InputError,
            ProcflowError::UnsupportedSchemaVersion { .. }
            | ProcflowError::MissingSchemaVersion
            | ProcflowError::SchemaViolation(_) => ErrorKind::SchemaError,
            ProcflowError::Network { .. } => ErrorKind::NetworkError,
            ProcflowError::CapabilityUnavailable { .. } => ErrorKind::CapabilityUnavailable,
            ProcflowError::Io(_) | ProcflowError::Json(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcflowError>;
