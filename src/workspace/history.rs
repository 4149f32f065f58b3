//! Append-only stage run history.
use super::{WorkspacePaths, HISTORY_SCHEMA_VERSION};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub schema_version: u32,
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HistoryEntry {
    pub fn new(stage: &str, started_at: DateTime<Utc>, success: bool) -> Self {
        Self {
            schema_version: HISTORY_SCHEMA_VERSION,
            stage: stage.to_string(),
            started_at,
            finished_at: super::now(),
            success,
            inputs_hash: None,
            outputs_hash: None,
            message: None,
        }
    }
}

/// Append a history entry as JSONL.
pub fn append_history(paths: &WorkspacePaths, entry: &HistoryEntry) -> Result<()> {
    let path = paths.history_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create workspace dir")?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let line = serde_json::to_string(entry).context("serialize history entry")?;
    writeln!(file, "{line}").with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn load_history(paths: &WorkspacePaths) -> Result<Vec<HistoryEntry>> {
    let path = paths.history_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of history", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, %err, "skip corrupt history entry");
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_appends_without_rewriting() {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = WorkspacePaths::new(root.path().to_path_buf());

        let first = HistoryEntry::new("evidence", super::super::now(), true);
        append_history(&paths, &first).expect("append first");
        let before = fs::read_to_string(paths.history_path()).expect("read history");

        let mut second = HistoryEntry::new("discovery", super::super::now(), false);
        second.message = Some("gate closed".to_string());
        append_history(&paths, &second).expect("append second");
        let after = fs::read_to_string(paths.history_path()).expect("read history");

        assert!(after.starts_with(&before));
        let entries = load_history(&paths).expect("load history");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].stage, "discovery");
        assert!(!entries[1].success);
    }
}
