//! Level-conformance validation for packets and packet fragments.
//!
//! Validation is a pure function of the document and the requested level:
//! structural checks run first, then the nested level gates. Reading and
//! parsing a document from disk is a separate I/O-class concern handled by
//! [`load_document`], so an unparsable file never looks like an invalid one.
use crate::error::{PipelineError, Stage};
use crate::sections::{Level, Section};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;

mod levels;
mod schema;

/// Packet schema version understood by this validator.
pub const PACKET_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Structural errors and level-gate errors are reported as distinct classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueClass {
    Structural,
    LevelGate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub severity: Severity,
    pub class: IssueClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ValidationIssue {
    pub(crate) fn structural(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity: Severity::Error,
            class: IssueClass::Structural,
            remediation: None,
        }
    }

    pub(crate) fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::structural(path, message)
        }
    }

    fn sort_key(&self) -> (IssueClass, &str, &str, Severity) {
        (self.class, &self.path, &self.message, self.severity)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let class = match self.class {
            IssueClass::Structural => "structural",
            IssueClass::LevelGate => "level-gate",
        };
        write!(f, "[{severity}] {class} {}: {}", self.path, self.message)?;
        if let Some(remediation) = &self.remediation {
            write!(f, " (fix: {remediation})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub level: Level,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_issues(level: Level, mut issues: Vec<ValidationIssue>) -> Self {
        issues.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        issues.dedup();
        let valid = !issues
            .iter()
            .any(|issue| issue.severity == Severity::Error);
        Self {
            valid,
            level,
            errors: issues,
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.errors.len() - self.error_count()
    }

    pub fn level_gate_errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors
            .iter()
            .filter(|issue| issue.class == IssueClass::LevelGate)
    }
}

/// Validate a packet document against `declared_level`.
///
/// Unknown top-level fields are permitted. The result ordering is stable so
/// two runs over the same document diff cleanly.
pub fn validate(document: &Value, declared_level: Level) -> ValidationResult {
    let mut issues = Vec::new();
    schema::check_document(document, declared_level, &mut issues);
    if document.is_object() {
        levels::check_gates(document, declared_level, &mut issues);
    }
    ValidationResult::from_issues(declared_level, issues)
}

/// Level declared by a packet; a missing or bad level is treated as level 1,
/// where the validator reports it.
pub fn declared_level(document: &Value) -> Level {
    document
        .get("level")
        .and_then(Value::as_u64)
        .and_then(|number| u8::try_from(number).ok())
        .and_then(|number| Level::try_from(number).ok())
        .unwrap_or(Level::One)
}

/// Structurally validate a single section's content.
///
/// Used for candidate content, which is validated before a packet exists.
pub fn validate_section(section: Section, content: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    schema::check_section(section, content, &format!("$.{section}"), &mut issues);
    issues.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    issues
}

/// Read and parse a packet (JSON or YAML by extension) from disk.
pub fn load_document(path: &Path, stage: Stage) -> Result<Value, PipelineError> {
    let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
        stage,
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&text, path, stage)
}

pub fn parse_document(text: &str, path: &Path, stage: Stage) -> Result<Value, PipelineError> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let parsed = if is_yaml {
        serde_yaml::from_str::<Value>(text).map_err(|err| err.to_string())
    } else {
        serde_json::from_str::<Value>(text).map_err(|err| err.to_string())
    };
    parsed.map_err(|message| PipelineError::Unparsable {
        stage,
        path: path.to_path_buf(),
        message,
    })
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
