//! Typed paths into a workspace layout.
//!
//! Centralizing path construction keeps file access consistent across the
//! stages and prevents drift when the layout evolves.
use std::path::{Path, PathBuf};

/// Convenience wrapper for locating workspace artifacts.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.root.join("evidence")
    }

    pub fn evidence_index_path(&self) -> PathBuf {
        self.evidence_dir().join("index.json")
    }

    pub fn discovery_dir(&self) -> PathBuf {
        self.root.join("discovery")
    }

    pub fn candidates_path(&self) -> PathBuf {
        self.discovery_dir().join("candidates.json")
    }

    pub fn attempts_log_path(&self) -> PathBuf {
        self.discovery_dir().join("attempts.jsonl")
    }

    pub fn confirm_dir(&self) -> PathBuf {
        self.root.join("confirm")
    }

    pub fn checklist_path(&self) -> PathBuf {
        self.confirm_dir().join("checklist.md")
    }

    pub fn confirmed_log_path(&self) -> PathBuf {
        self.confirm_dir().join("confirmed.jsonl")
    }

    pub fn rejected_log_path(&self) -> PathBuf {
        self.confirm_dir().join("rejected.jsonl")
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    /// Default export destination for a packet id and file extension.
    pub fn packet_path(&self, packet_id: &str, extension: &str) -> PathBuf {
        self.out_dir().join(format!("{packet_id}.{extension}"))
    }

    /// Workspace-relative display form of `path`.
    pub fn rel_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}
