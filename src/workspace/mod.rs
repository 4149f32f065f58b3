//! Workspace-owned configuration, paths, and run history.
//!
//! Every pipeline stage reads its inputs from and writes its outputs to the
//! workspace directory; nothing crosses a stage boundary in memory.
/// Current schema version for `config.json`.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;
/// Current schema version for `history.jsonl` entries.
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// Workspace directory name used when none is given.
pub const DEFAULT_WORKSPACE_DIR: &str = ".ipack";

mod config;
mod digest;
mod history;
mod paths;

pub use config::{
    default_config, load_config, resolve_provider_command, validate_config, write_config,
    DiscoveryConfig, EvidenceConfig, PipelineConfig,
};
pub use digest::{now, reproducible_now, sha256_hex, short_digest, Digester};
pub use history::{append_history, load_history, HistoryEntry};
pub use paths::WorkspacePaths;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Persist a snapshot document as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut text = serde_json::to_string_pretty(value).context("serialize JSON document")?;
    text.push('\n');
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Load a snapshot document if it exists.
pub fn load_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let value =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(value))
}
