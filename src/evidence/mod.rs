//! Evidence scanning: a read-only walk of the repository producing a hashed,
//! redacted fact index.
//!
//! The index is the only thing discovery ever reads. It is rebuilt from
//! scratch on every run and is byte-identical for identical file contents and
//! glob configuration: files are visited in sorted order, parallel hashing
//! results are merged back in that order, and nothing run-dependent enters the
//! body. `generatedAt` is supplied by the caller so reruns can keep it stable.
use crate::error::{PipelineError, Stage};
use crate::util::Cancellation;
use crate::workspace::{sha256_hex, Digester, EvidenceConfig};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

mod extract;
mod globs;
mod redact;
mod walk;

pub use extract::{Extractor, FileFacts};
pub use globs::GlobSet;

/// Current schema version for `evidence/index.json`.
pub const EVIDENCE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceIndex {
    pub schema_version: u32,
    pub tool_version: String,
    pub generated_at: DateTime<Utc>,
    /// SHA-256 over the serialized body; independent of `generatedAt`.
    pub content_digest: String,
    #[serde(flatten)]
    pub body: EvidenceBody,
}

impl EvidenceIndex {
    pub fn contains_path(&self, path: &str) -> bool {
        self.body
            .files
            .binary_search_by(|file| file.path.as_str().cmp(path))
            .is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBody {
    pub scan: ScanSettings,
    pub files: Vec<FileEntry>,
    pub dependencies: Vec<Dependency>,
    pub routes: Vec<Route>,
    pub auth_signals: Vec<AuthSignal>,
    pub skipped: Vec<SkippedFile>,
    /// True when at least one snippet was masked.
    pub redaction_applied: bool,
    /// Masked snippet count per redaction rule.
    pub redactions: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSettings {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub path: String,
    pub hash: String,
    pub size: u64,
    pub extracted_facts: Vec<Fact>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FactKind {
    Dependency,
    Route,
    AuthSignal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub kind: FactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub ecosystem: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub method: String,
    pub path: String,
    pub file: String,
    pub line: usize,
    pub framework: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSignal {
    pub kind: String,
    pub file: String,
    pub line: usize,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Oversized,
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SkippedFile {
    fn oversized(path: String, size: u64) -> Self {
        Self {
            path,
            reason: SkipReason::Oversized,
            size: Some(size),
            detail: None,
        }
    }

    pub(crate) fn unreadable(path: String, err: &io::Error) -> Self {
        Self {
            path,
            reason: SkipReason::Unreadable,
            size: None,
            detail: Some(err.kind().to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_file_size: u64,
}

impl ScanOptions {
    pub fn from_config(config: &EvidenceConfig) -> Self {
        Self {
            include: config.include.clone(),
            exclude: config.exclude.clone(),
            max_file_size: config.max_file_size,
        }
    }

    /// Exclude an extra directory subtree, given relative to the scan root.
    pub fn exclude_dir(mut self, rel_dir: &str) -> Self {
        let pattern = format!("{}/**", glob::Pattern::escape(rel_dir.trim_end_matches('/')));
        if !self.exclude.contains(&pattern) {
            self.exclude.push(pattern);
        }
        self
    }
}

enum Scanned {
    File(FileEntry, FileFacts),
    Skipped(SkippedFile),
}

/// Build the evidence index for `repo_root`. Never writes under `repo_root`.
pub fn build_evidence(
    repo_root: &Path,
    options: &ScanOptions,
    generated_at: DateTime<Utc>,
    cancel: &Cancellation,
) -> Result<EvidenceIndex, PipelineError> {
    let config_error = |err: anyhow::Error| PipelineError::Config {
        stage: Stage::Evidence,
        message: format!("{err:#}"),
    };
    let include = GlobSet::new(&options.include).map_err(config_error)?;
    let exclude = GlobSet::new(&options.exclude).map_err(config_error)?;
    let extractor = Extractor::new().map_err(config_error)?;

    let metadata = fs::metadata(repo_root).map_err(|source| PipelineError::Io {
        stage: Stage::Evidence,
        path: repo_root.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(PipelineError::Io {
            stage: Stage::Evidence,
            path: repo_root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        });
    }

    let walk = walk::walk(repo_root, &include, &exclude);
    tracing::debug!(files = walk.files.len(), "evidence walk complete");

    // indexed collect keeps walk order regardless of scheduling
    let scanned: Vec<Scanned> = walk
        .files
        .par_iter()
        .map(|entry| {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    stage: Stage::Evidence,
                });
            }
            Ok(scan_file(entry, options.max_file_size, &extractor))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut body = EvidenceBody {
        scan: ScanSettings {
            include: options.include.clone(),
            exclude: options.exclude.clone(),
            max_file_size: options.max_file_size,
        },
        files: Vec::new(),
        dependencies: Vec::new(),
        routes: Vec::new(),
        auth_signals: Vec::new(),
        skipped: walk.skipped,
        redaction_applied: false,
        redactions: BTreeMap::new(),
    };
    for scanned in scanned {
        match scanned {
            Scanned::File(entry, facts) => {
                for kind in &facts.redactions {
                    *body.redactions.entry((*kind).to_string()).or_default() += 1;
                }
                body.dependencies.extend(facts.dependencies);
                body.routes.extend(facts.routes);
                body.auth_signals.extend(facts.auth_signals);
                body.files.push(entry);
            }
            Scanned::Skipped(skipped) => body.skipped.push(skipped),
        }
    }
    body.skipped.sort_by(|a, b| a.path.cmp(&b.path));
    body.redaction_applied = !body.redactions.is_empty();

    let content_digest = digest_body(&body).map_err(|err| PipelineError::Unparsable {
        stage: Stage::Evidence,
        path: repo_root.to_path_buf(),
        message: err.to_string(),
    })?;
    tracing::info!(
        files = body.files.len(),
        skipped = body.skipped.len(),
        dependencies = body.dependencies.len(),
        routes = body.routes.len(),
        auth_signals = body.auth_signals.len(),
        "evidence index built"
    );
    Ok(EvidenceIndex {
        schema_version: EVIDENCE_SCHEMA_VERSION,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at,
        content_digest,
        body,
    })
}

fn scan_file(entry: &walk::WalkEntry, max_file_size: u64, extractor: &Extractor) -> Scanned {
    if entry.size > max_file_size {
        return Scanned::Skipped(SkippedFile::oversized(entry.rel.clone(), entry.size));
    }
    let bytes = match fs::read(&entry.path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = %entry.rel, %err, "skip unreadable file");
            return Scanned::Skipped(SkippedFile::unreadable(entry.rel.clone(), &err));
        }
    };
    let size = bytes.len() as u64;
    if size > max_file_size {
        return Scanned::Skipped(SkippedFile::oversized(entry.rel.clone(), size));
    }
    let facts = match std::str::from_utf8(&bytes) {
        Ok(text) => extractor.extract(&entry.rel, text),
        Err(_) => FileFacts::default(),
    };
    Scanned::File(
        FileEntry {
            path: entry.rel.clone(),
            hash: sha256_hex(&bytes),
            size,
            extracted_facts: facts.facts(),
        },
        facts,
    )
}

/// Digest of the index body, used for caching and idempotent reruns.
pub fn digest_body(body: &EvidenceBody) -> serde_json::Result<String> {
    let bytes = serde_json::to_vec(body)?;
    let mut digester = Digester::new("ipack-evidence-v1");
    digester.update(&bytes);
    Ok(digester.finish())
}

#[cfg(test)]
#[path = "evidence_tests.rs"]
mod tests;
