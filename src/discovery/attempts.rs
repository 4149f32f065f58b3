//! Provider attempt logging.
//!
//! Every attempt, successful or not, is appended to
//! `discovery/attempts.jsonl` so a failed run can be diagnosed afterwards.
use crate::error::ProviderError;
use crate::util::truncate_string;
use crate::workspace::{now, WorkspacePaths};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::time::Instant;

/// Current schema version for attempt log entries.
pub const ATTEMPT_LOG_SCHEMA_VERSION: u32 = 1;

const PROMPT_PREVIEW_BYTES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Response parsed and every item passed the schema checks.
    Accepted,
    /// Response was malformed or failed schema checks; fed back on retry.
    Invalid,
    /// The provider itself failed (timeout, auth, crash).
    ProviderError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub schema_version: u32,
    pub attempt: u32,
    pub provider: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub prompt_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_preview: Option<String>,
}

/// Builder for attempt records with timing.
pub(crate) struct AttemptBuilder {
    start: Instant,
    started_at: DateTime<Utc>,
    attempt: u32,
    provider: String,
    prompt_bytes: usize,
    prompt_preview: String,
}

impl AttemptBuilder {
    pub(crate) fn new(attempt: u32, provider: &str, prompt: &str) -> Self {
        Self {
            start: Instant::now(),
            started_at: now(),
            attempt,
            provider: provider.to_string(),
            prompt_bytes: prompt.len(),
            prompt_preview: truncate_string(prompt, PROMPT_PREVIEW_BYTES),
        }
    }

    pub(crate) fn accepted(self, response_bytes: usize) -> AttemptRecord {
        self.build(AttemptOutcome::Accepted, Vec::new(), Some(response_bytes))
    }

    pub(crate) fn invalid(self, response_bytes: usize, errors: Vec<String>) -> AttemptRecord {
        self.build(AttemptOutcome::Invalid, errors, Some(response_bytes))
    }

    pub(crate) fn provider_error(self, err: &ProviderError) -> AttemptRecord {
        self.build(AttemptOutcome::ProviderError, vec![err.to_string()], None)
    }

    fn build(
        self,
        outcome: AttemptOutcome,
        errors: Vec<String>,
        response_bytes: Option<usize>,
    ) -> AttemptRecord {
        AttemptRecord {
            schema_version: ATTEMPT_LOG_SCHEMA_VERSION,
            attempt: self.attempt,
            provider: self.provider,
            started_at: self.started_at,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            errors,
            prompt_bytes: self.prompt_bytes,
            response_bytes,
            prompt_preview: Some(self.prompt_preview),
        }
    }
}

/// Append attempt records to the log file.
pub fn append_attempts(paths: &WorkspacePaths, records: &[AttemptRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let log_path = paths.attempts_log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("create discovery directory for attempt log")?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open attempt log for append: {}", log_path.display()))?;
    for record in records {
        let line = serde_json::to_string(record).context("serialize attempt record")?;
        writeln!(file, "{line}").context("write attempt record")?;
    }
    Ok(())
}

pub fn load_attempts(paths: &WorkspacePaths) -> Result<Vec<AttemptRecord>> {
    let log_path = paths.attempts_log_path();
    if !log_path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(&log_path)
        .with_context(|| format!("open attempt log: {}", log_path.display()))?;
    let mut records = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of attempt log", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AttemptRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => {
                tracing::warn!(line = line_num + 1, %err, "skip corrupt attempt record");
            }
        }
    }
    Ok(records)
}
