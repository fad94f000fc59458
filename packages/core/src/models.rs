use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Engine timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("Engine exited with status {}: {diagnostics}", describe_exit(.exit_code))]
    EngineExecution {
        exit_code: Option<i32>,
        diagnostics: String,
    },
    #[error("No {0} output produced by engine")]
    NoArtifactProduced(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Processing failed: {0}")]
    Processing(#[source] Box<EngineError>),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    exit_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Flat view of [`EngineError`] for callers that branch on the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    EngineUnavailable,
    Timeout,
    EngineExecution,
    NoArtifactProduced,
    Storage,
    Config,
}

impl EngineError {
    /// Kind of the underlying failure. `Processing` is transparent here so the
    /// typed cause survives the orchestrator boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            EngineError::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::EngineExecution { .. } => ErrorKind::EngineExecution,
            EngineError::NoArtifactProduced(_) => ErrorKind::NoArtifactProduced,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::Config(_) => ErrorKind::Config,
            EngineError::Processing(inner) => inner.kind(),
        }
    }

    pub fn into_processing(self) -> Self {
        match self {
            EngineError::Processing(_) => self,
            other => EngineError::Processing(Box::new(other)),
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Storage(format!("IO error: {}", err))
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::EngineUnavailable => "ENGINE_UNAVAILABLE",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::EngineExecution => "ENGINE_EXECUTION_ERROR",
            ErrorKind::NoArtifactProduced => "NO_ARTIFACT_PRODUCED",
            ErrorKind::Storage => "STORAGE_ERROR",
            ErrorKind::Config => "CONFIG_ERROR",
        };
        write!(f, "{}", code)
    }
}

/// Selectable recognition backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineVariant {
    /// General-purpose engine on the ONNX runtime.
    #[default]
    Fast,
    /// Same engine with the slower TensorFlow models.
    Accurate,
    /// Independent engine binary.
    Alternate,
}

impl EngineVariant {
    pub const ALL: [EngineVariant; 3] = [
        EngineVariant::Fast,
        EngineVariant::Accurate,
        EngineVariant::Alternate,
    ];
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineVariant::Fast => write!(f, "fast"),
            EngineVariant::Accurate => write!(f, "accurate"),
            EngineVariant::Alternate => write!(f, "alternate"),
        }
    }
}

impl FromStr for EngineVariant {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "onnx" => Ok(EngineVariant::Fast),
            "accurate" | "slow" | "tf" => Ok(EngineVariant::Accurate),
            "alternate" | "homr" => Ok(EngineVariant::Alternate),
            _ => Err(EngineError::EngineUnavailable(format!("Unknown engine variant: {}", s))),
        }
    }
}

/// One recognition session's directory as tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_touched: DateTime<Utc>,
}

impl Workspace {
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_touched)
    }
}

#[derive(Debug, Clone)]
pub struct EngineInvocation {
    pub input_path: PathBuf,
    pub workspace: Workspace,
    pub variant: EngineVariant,
    pub timeout: Duration,
}

/// Output files of a successful run, as names relative to the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub primary: Vec<String>,
    pub auxiliary: Vec<String>,
}

impl ArtifactSet {
    pub fn primary_file(&self) -> Option<&str> {
        self.primary.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.auxiliary.is_empty()
    }
}
