//! Pipeline configuration helpers.
//!
//! This module loads, validates, and normalizes the workspace-owned config so
//! misconfiguration surfaces at startup instead of deep inside a stage.
use super::{WorkspacePaths, CONFIG_SCHEMA_VERSION};
use crate::compile::ExportFormat;
use crate::discovery::PROVIDER_NAMES;
use crate::evidence::GlobSet;
use crate::sections::Level;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Environment fallback for the command provider.
pub const PROVIDER_COMMAND_ENV: &str = "IPACK_PROVIDER_COMMAND";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EvidenceConfig {
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: default_exclude(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Discovery settings. `enabled` is the persisted half of the dual gate.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Canned response file or directory for the `replay` provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responses: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_target_level")]
    pub target_level: Level,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            command: None,
            responses: None,
            max_retries: default_max_retries(),
            min_confidence: default_min_confidence(),
            timeout_secs: default_timeout_secs(),
            target_level: default_target_level(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default = "default_versioning")]
    pub versioning: bool,
    #[serde(default)]
    pub warn_on_invalid: bool,
    #[serde(default)]
    pub skip_validation: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            versioning: default_versioning(),
            warn_on_invalid: false,
            skip_validation: false,
        }
    }
}

fn default_include() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec![
        ".git/**".to_string(),
        "target/**".to_string(),
        "node_modules/**".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_provider() -> String {
    "command".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_target_level() -> Level {
    Level::One
}

fn default_versioning() -> bool {
    true
}

/// Build the default config used when a workspace is first initialized.
///
/// Discovery starts disabled; turning it on is an explicit opt-in.
pub fn default_config() -> PipelineConfig {
    PipelineConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        evidence: EvidenceConfig::default(),
        discovery: DiscoveryConfig::default(),
        export: ExportConfig::default(),
    }
}

/// Load the workspace config from `config.json`, falling back to defaults
/// when the file is absent.
pub fn load_config(workspace_root: &Path) -> Result<PipelineConfig> {
    let paths = WorkspacePaths::new(workspace_root.to_path_buf());
    let path = paths.config_path();
    if !path.is_file() {
        return Ok(default_config());
    }
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: PipelineConfig =
        serde_json::from_slice(&bytes).context("parse pipeline config JSON")?;
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(workspace_root: &Path, config: &PipelineConfig) -> Result<()> {
    let paths = WorkspacePaths::new(workspace_root.to_path_buf());
    super::write_json(&paths.config_path(), config)
}

/// Validate config schema and value ranges.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.evidence.include.is_empty() {
        return Err(anyhow!("evidence.include must list at least one glob"));
    }
    if config.evidence.max_file_size == 0 {
        return Err(anyhow!("evidence.max_file_size must be greater than zero"));
    }
    GlobSet::new(&config.evidence.include).context("evidence.include")?;
    GlobSet::new(&config.evidence.exclude).context("evidence.exclude")?;

    let discovery = &config.discovery;
    if !PROVIDER_NAMES.contains(&discovery.provider.as_str()) {
        return Err(anyhow!(
            "unknown discovery.provider {:?} (expected one of: {})",
            discovery.provider,
            PROVIDER_NAMES.join(", ")
        ));
    }
    if discovery.max_retries == 0 {
        return Err(anyhow!("discovery.max_retries must be at least 1"));
    }
    if !(0.0..=1.0).contains(&discovery.min_confidence) {
        return Err(anyhow!(
            "discovery.min_confidence must be within [0, 1] (got {})",
            discovery.min_confidence
        ));
    }
    if discovery.timeout_secs == 0 {
        return Err(anyhow!("discovery.timeout_secs must be greater than zero"));
    }
    Ok(())
}

/// Resolve the provider command: CLI flag, then config, then environment.
pub fn resolve_provider_command(cli: Option<&str>, config: &DiscoveryConfig) -> Option<String> {
    cli.map(str::to_string)
        .or_else(|| config.command.clone())
        .or_else(|| env::var(PROVIDER_COMMAND_ENV).ok())
        .map(|command| command.trim().to_string())
        .filter(|command| !command.is_empty())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
