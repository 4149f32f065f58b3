//! Append-only decision ledgers.
//!
//! `confirm/confirmed.jsonl` and `confirm/rejected.jsonl` are only ever
//! appended to. A changed decision is a new dated entry; the effective
//! decision for a candidate is its latest entry across both logs.
use crate::error::{PipelineError, Stage};
use crate::sections::SectionTag;
use crate::workspace::WorkspacePaths;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Current schema version for ledger entries.
pub const LEDGER_SCHEMA_VERSION: u32 = 1;

/// The only `source` value a confirmed block may carry.
pub const CONFIRMED_SOURCE: &str = "confirmed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Accepted,
    EditedAccepted,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accepted => "accepted",
            Decision::EditedAccepted => "edited-accepted",
            Decision::Rejected => "rejected",
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, Decision::Rejected)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedBlock {
    pub schema_version: u32,
    pub candidate_id: String,
    pub section: SectionTag,
    pub source: String,
    pub decision: Decision,
    pub confirmed_at: DateTime<Utc>,
    pub confirmed_by: String,
    /// `None` for human-authored blocks that never had a candidate.
    #[serde(default)]
    pub original_confidence: Option<f64>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates_digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedBlock {
    pub schema_version: u32,
    pub candidate_id: String,
    pub section: SectionTag,
    pub rejected_at: DateTime<Utc>,
    pub rejected_by: String,
    #[serde(default)]
    pub original_confidence: Option<f64>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates_digest: Option<String>,
}

/// Effective decision for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionState {
    pub decision: Decision,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    pub confirmed: Vec<ConfirmedBlock>,
    pub rejected: Vec<RejectedBlock>,
}

impl Ledger {
    /// Load both logs. A corrupt line is fatal: these logs are pipeline input.
    pub fn load(paths: &WorkspacePaths) -> Result<Self, PipelineError> {
        Ok(Self {
            confirmed: load_log(&paths.confirmed_log_path())?,
            rejected: load_log(&paths.rejected_log_path())?,
        })
    }

    /// Latest entry for `candidate_id` across both logs.
    ///
    /// Later timestamps win; within one log a later line wins over an earlier
    /// one with the same timestamp; across logs a tie resolves to rejection.
    pub fn effective(&self, candidate_id: &str) -> Option<DecisionState> {
        let confirmed = self
            .confirmed
            .iter()
            .filter(|block| block.candidate_id == candidate_id)
            .max_by_key(|block| block.confirmed_at)
            .map(|block| DecisionState {
                decision: block.decision,
                at: block.confirmed_at,
            });
        let rejected = self
            .rejected
            .iter()
            .filter(|block| block.candidate_id == candidate_id)
            .max_by_key(|block| block.rejected_at)
            .map(|block| DecisionState {
                decision: Decision::Rejected,
                at: block.rejected_at,
            });
        match (confirmed, rejected) {
            (Some(c), Some(r)) if c.at > r.at => Some(c),
            (Some(_), Some(r)) => Some(r),
            (c, r) => c.or(r),
        }
    }

    /// Latest confirmed entry per candidate whose effective decision is an
    /// acceptance, paired with its position in the confirmed log.
    pub fn effective_confirmed(&self) -> Vec<(usize, &ConfirmedBlock)> {
        let mut latest: BTreeMap<&str, (usize, &ConfirmedBlock)> = BTreeMap::new();
        for (position, block) in self.confirmed.iter().enumerate() {
            let replace = match latest.get(block.candidate_id.as_str()) {
                Some((_, current)) => block.confirmed_at >= current.confirmed_at,
                None => true,
            };
            if replace {
                latest.insert(block.candidate_id.as_str(), (position, block));
            }
        }
        let mut out: Vec<(usize, &ConfirmedBlock)> = latest
            .into_values()
            .filter(|(_, block)| {
                self.effective(&block.candidate_id)
                    .is_some_and(|state| state.decision.is_accepted())
            })
            .collect();
        out.sort_by_key(|(position, _)| *position);
        out
    }

    /// Latest confirmed content for a candidate, if any.
    pub fn latest_confirmed(&self, candidate_id: &str) -> Option<&ConfirmedBlock> {
        self.confirmed
            .iter()
            .filter(|block| block.candidate_id == candidate_id)
            .max_by_key(|block| block.confirmed_at)
    }

    /// Append a confirmed block to disk and to this in-memory view.
    pub fn append_confirmed(&mut self, paths: &WorkspacePaths, block: ConfirmedBlock) -> Result<()> {
        append_line(&paths.confirmed_log_path(), &block)?;
        self.confirmed.push(block);
        Ok(())
    }

    pub fn append_rejected(&mut self, paths: &WorkspacePaths, block: RejectedBlock) -> Result<()> {
        append_line(&paths.rejected_log_path(), &block)?;
        self.rejected.push(block);
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.confirmed.len() + self.rejected.len()
    }
}

fn append_line<T: Serialize>(path: &Path, entry: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {} for append", path.display()))?;
    let line = serde_json::to_string(entry).context("serialize ledger entry")?;
    writeln!(file, "{line}").with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn load_log<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PipelineError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
        stage: Stage::Confirmation,
        path: path.to_path_buf(),
        source,
    })?;
    let mut entries = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(line).map_err(|err| PipelineError::Unparsable {
            stage: Stage::Confirmation,
            path: path.to_path_buf(),
            message: format!("line {}: {err}", line_num + 1),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
