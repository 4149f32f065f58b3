//! Packet export with validate-before-write and no-clobber semantics.
//!
//! Bytes are written to a temp file in the destination directory, synced,
//! and only then persisted under the final name, so an interrupted export
//! never leaves a partial packet behind.
use crate::error::{PipelineError, Stage};
use crate::validate::{declared_level, validate};
use crate::workspace::sha256_hex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const TOOL_NAME: &str = "ipack";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }

    /// Format implied by a file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Some(ExportFormat::Json),
            Some("yaml") | Some("yml") => Some(ExportFormat::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub versioning: bool,
    pub skip_validation: bool,
    pub warn_on_invalid: bool,
    pub force: bool,
    /// Workspace-relative input path to SHA-256, stamped into `packaging`.
    pub source_hashes: BTreeMap<String, String>,
    pub packaged_at: DateTime<Utc>,
}

impl ExportOptions {
    pub fn policy(&self) -> ValidationPolicy {
        ValidationPolicy::from_flags(self.skip_validation, self.warn_on_invalid)
    }
}

/// What to do with a packet that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    FailClosed,
    WarnAndWrite,
    Skip,
}

impl ValidationPolicy {
    /// Strictest wins: asking to warn still validates even when skipping
    /// was also requested.
    pub fn from_flags(skip_validation: bool, warn_on_invalid: bool) -> Self {
        match (skip_validation, warn_on_invalid) {
            (_, true) => ValidationPolicy::WarnAndWrite,
            (true, false) => ValidationPolicy::Skip,
            (false, false) => ValidationPolicy::FailClosed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStamp {
    pub status: ValidationStatus,
    pub error_count: usize,
    pub warning_count: usize,
}

/// Provenance stamped into every exported packet as `packaging`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packaging {
    pub packaged_at: DateTime<Utc>,
    pub tool_name: String,
    pub tool_version: String,
    pub source_hashes: BTreeMap<String, String>,
    pub validation: ValidationStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrittenArtifact {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub sha256: String,
    pub bytes: usize,
    /// A versioned name was derived because the destination existed.
    pub versioned: bool,
    pub packaging: Packaging,
}

/// Write `packet` to `dest` (or a versioned sibling of it).
///
/// An existing destination is overwritten only with `force`; otherwise a
/// versioned name is derived when `versioning` is on, and the export fails
/// with a collision when it is off.
pub fn export(
    packet: &Value,
    format: ExportFormat,
    dest: &Path,
    options: &ExportOptions,
) -> Result<WrittenArtifact, PipelineError> {
    let Some(document) = packet.as_object() else {
        return Err(PipelineError::Unparsable {
            stage: Stage::Export,
            path: dest.to_path_buf(),
            message: "packet must be a JSON object".to_string(),
        });
    };

    let validation = check(packet, options.policy())?;

    let (target, versioned) = if dest.exists() && !options.force {
        if !options.versioning {
            return Err(PipelineError::Collision {
                stage: Stage::Export,
                path: dest.to_path_buf(),
            });
        }
        (next_versioned_path(dest), true)
    } else {
        (dest.to_path_buf(), false)
    };

    let packaging = Packaging {
        packaged_at: options.packaged_at,
        tool_name: TOOL_NAME.to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        source_hashes: options.source_hashes.clone(),
        validation,
    };
    let mut stamped = document.clone();
    stamped.insert("packaging".to_string(), serde_json::json!(packaging));
    let stamped = Value::Object(stamped);
    let bytes = serialize(&stamped, format, &target)?;

    write_atomic(&target, &bytes, options.force)?;
    tracing::info!(
        path = %target.display(),
        format = format.extension(),
        versioned,
        validation = ?packaging.validation.status,
        "packet exported"
    );
    Ok(WrittenArtifact {
        path: target,
        format,
        sha256: sha256_hex(&bytes),
        bytes: bytes.len(),
        versioned,
        packaging,
    })
}

fn check(packet: &Value, policy: ValidationPolicy) -> Result<ValidationStamp, PipelineError> {
    if policy == ValidationPolicy::Skip {
        tracing::warn!("packet validation skipped on export");
        return Ok(ValidationStamp {
            status: ValidationStatus::Skipped,
            error_count: 0,
            warning_count: 0,
        });
    }
    let level = declared_level(packet);
    let result = validate(packet, level);
    let stamp = ValidationStamp {
        status: if result.valid {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        },
        error_count: result.error_count(),
        warning_count: result.warning_count(),
    };
    if !result.valid {
        if policy == ValidationPolicy::FailClosed {
            return Err(PipelineError::Invalid {
                stage: Stage::Export,
                result,
            });
        }
        for issue in &result.errors {
            tracing::warn!(%issue, "exporting invalid packet");
        }
    }
    Ok(stamp)
}

fn serialize(packet: &Value, format: ExportFormat, target: &Path) -> Result<Vec<u8>, PipelineError> {
    let text = match format {
        ExportFormat::Json => serde_json::to_string_pretty(packet)
            .map(|mut text| {
                text.push('\n');
                text
            })
            .map_err(|err| err.to_string()),
        ExportFormat::Yaml => serde_yaml::to_string(packet).map_err(|err| err.to_string()),
    };
    text.map(String::into_bytes)
        .map_err(|message| PipelineError::Unparsable {
            stage: Stage::Export,
            path: target.to_path_buf(),
            message,
        })
}

/// `<stem>.v<N>.<ext>` with the smallest free `N`, starting at 2. A `.vN`
/// already on `dest` is replaced, not stacked.
pub fn next_versioned_path(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(unversioned_stem)
        .unwrap_or("packet");
    let extension = dest.extension().and_then(|ext| ext.to_str());
    let mut version = 2u32;
    loop {
        let name = match extension {
            Some(ext) => format!("{stem}.v{version}.{ext}"),
            None => format!("{stem}.v{version}"),
        };
        let candidate = dest.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
        version += 1;
    }
}

fn unversioned_stem(stem: &str) -> &str {
    match stem.rsplit_once(".v") {
        Some((base, version))
            if !base.is_empty()
                && !version.is_empty()
                && version.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => stem,
    }
}

fn write_atomic(target: &Path, bytes: &[u8], force: bool) -> Result<(), PipelineError> {
    let io_error = |source: io::Error| PipelineError::Io {
        stage: Stage::Export,
        path: target.to_path_buf(),
        source,
    };
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_error)?;
    let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_error)?;
    temp.as_file_mut().write_all(bytes).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    if force {
        temp.persist(target).map_err(|err| io_error(err.error))?;
    } else {
        temp.persist_noclobber(target).map_err(|err| {
            if err.error.kind() == io::ErrorKind::AlreadyExists {
                PipelineError::Collision {
                    stage: Stage::Export,
                    path: target.to_path_buf(),
                }
            } else {
                io_error(err.error)
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
