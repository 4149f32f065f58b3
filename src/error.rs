//! Pipeline error taxonomy.
//!
//! Lower layers return these as values; the driver renders them with the
//! failing stage, the full issue list, and a remediation hint.
use crate::validate::{ValidationIssue, ValidationResult};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Config,
    Validate,
    Evidence,
    Discovery,
    Confirmation,
    Compile,
    Export,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Validate => "validate",
            Stage::Evidence => "evidence",
            Stage::Discovery => "discovery",
            Stage::Confirmation => "confirmation",
            Stage::Compile => "compile",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised by an inference provider for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("provider authentication failed: {0}")]
    Auth(String),
    #[error("provider returned a malformed response: {0}")]
    Malformed(String),
    #[error("provider failed: {0}")]
    Failed(String),
    #[error("provider {0:?} is not configured")]
    NotConfigured(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage}: cannot read {}: {source}", .path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage}: cannot parse {}: {message}", .path.display())]
    Unparsable {
        stage: Stage,
        path: PathBuf,
        message: String,
    },
    #[error("{stage}: document failed level {} validation ({} errors)", .result.level, .result.error_count())]
    Invalid {
        stage: Stage,
        result: ValidationResult,
    },
    #[error("{stage}: provenance violation: {message}")]
    Provenance { stage: Stage, message: String },
    #[error("{stage}: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: ProviderError,
    },
    #[error("{stage}: gave up after {attempts} attempts with {} outstanding errors", .errors.len())]
    RetriesExhausted {
        stage: Stage,
        attempts: u32,
        errors: Vec<String>,
    },
    #[error("{stage}: review document has {} errors", .errors.len())]
    Review { stage: Stage, errors: Vec<String> },
    #[error("{stage}: configuration error: {message}")]
    Config { stage: Stage, message: String },
    #[error("{stage}: destination {} already exists", .path.display())]
    Collision { stage: Stage, path: PathBuf },
    #[error("{stage}: cancelled")]
    Cancelled { stage: Stage },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Io { stage, .. }
            | PipelineError::Unparsable { stage, .. }
            | PipelineError::Invalid { stage, .. }
            | PipelineError::Provenance { stage, .. }
            | PipelineError::Provider { stage, .. }
            | PipelineError::RetriesExhausted { stage, .. }
            | PipelineError::Review { stage, .. }
            | PipelineError::Config { stage, .. }
            | PipelineError::Collision { stage, .. }
            | PipelineError::Cancelled { stage } => *stage,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        PipelineError::Config {
            stage: Stage::Config,
            message: message.into(),
        }
    }

    /// Structured issue lines carried by the error, one per entry.
    pub fn issues(&self) -> Vec<String> {
        match self {
            PipelineError::Invalid { result, .. } => {
                result.errors.iter().map(ValidationIssue::to_string).collect()
            }
            PipelineError::RetriesExhausted { errors, .. }
            | PipelineError::Review { errors, .. } => errors.clone(),
            _ => Vec::new(),
        }
    }

    pub fn remediation(&self) -> Option<String> {
        match self {
            PipelineError::Io { .. } => Some("check that the file exists and is readable".into()),
            PipelineError::Unparsable { .. } => {
                Some("fix the document syntax (JSON or YAML) and rerun".into())
            }
            PipelineError::Invalid { result, .. } => result
                .level_gate_errors()
                .find_map(|issue| issue.remediation.clone())
                .or_else(|| Some("fix the listed fields and rerun".into())),
            PipelineError::Provenance { .. } => {
                Some("candidates must cite evidence and carry a confidence in [0, 1]".into())
            }
            PipelineError::Provider { source, .. } => match source {
                ProviderError::NotConfigured(_) => Some(
                    "set discovery.command in config.json or IPACK_PROVIDER_COMMAND".into(),
                ),
                ProviderError::Auth(_) => Some("check the provider credentials".into()),
                _ => None,
            },
            PipelineError::RetriesExhausted { .. } => Some(
                "raise discovery.max_retries or inspect discovery/attempts.jsonl".into(),
            ),
            PipelineError::Review { .. } => {
                Some("fix the listed regions in confirm/checklist.md and rerun --ingest".into())
            }
            PipelineError::Config { .. } => Some("edit config.json and rerun".into()),
            PipelineError::Collision { .. } => {
                Some("pass --force to overwrite or enable export.versioning".into())
            }
            PipelineError::Cancelled { .. } => None,
        }
    }
}
