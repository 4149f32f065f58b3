use crate::error::{PipelineError, Stage};
use crate::workspace::{
    self, append_history, load_config, validate_config, HistoryEntry, PipelineConfig,
    WorkspacePaths, DEFAULT_WORKSPACE_DIR,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};

/// Repository, workspace, and validated config for one command.
pub(crate) struct PipelineContext {
    pub(crate) repo_root: PathBuf,
    pub(crate) paths: WorkspacePaths,
    pub(crate) config: PipelineConfig,
    pub(crate) config_exists: bool,
}

/// What a finished stage contributes to `history.jsonl`.
#[derive(Debug, Default)]
pub(crate) struct StageOutcome {
    pub(crate) inputs_hash: Option<String>,
    pub(crate) outputs_hash: Option<String>,
    pub(crate) message: Option<String>,
}

impl StageOutcome {
    pub(crate) fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

impl PipelineContext {
    pub(crate) fn load(repo: &Path, workspace: Option<&Path>) -> Result<Self> {
        let repo_root = absolute(repo);
        let workspace_root = workspace
            .map(absolute)
            .unwrap_or_else(|| repo_root.join(DEFAULT_WORKSPACE_DIR));
        let paths = WorkspacePaths::new(workspace_root);
        let config_exists = paths.config_path().is_file();
        let config = load_config(paths.root())
            .and_then(|config| validate_config(&config).map(|()| config))
            .map_err(|err| PipelineError::config(format!("{err:#}")))?;
        Ok(Self {
            repo_root,
            paths,
            config,
            config_exists,
        })
    }

    pub(crate) fn require_config(&self) -> Result<()> {
        if self.config_exists {
            return Ok(());
        }
        Err(anyhow!(
            "missing config at {} (run `ipack init` first)",
            self.paths.config_path().display()
        ))
    }

    /// Workspace location relative to the repository, when it lives inside it.
    pub(crate) fn workspace_in_repo(&self) -> Option<String> {
        self.paths
            .root()
            .strip_prefix(&self.repo_root)
            .ok()
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .filter(|rel| !rel.is_empty())
    }

    /// Error for a stage input that an earlier stage has not produced yet.
    pub(crate) fn missing_input(&self, stage: Stage, path: PathBuf, produced_by: &str) -> PipelineError {
        PipelineError::Io {
            stage,
            path,
            source: io::Error::new(
                io::ErrorKind::NotFound,
                format!("not found (run `ipack {produced_by}` first)"),
            ),
        }
    }

    /// Append the stage run to history and pass the result through.
    ///
    /// A history write failure is logged, never allowed to mask the stage
    /// result.
    pub(crate) fn record(
        &self,
        stage: Stage,
        started_at: DateTime<Utc>,
        result: Result<StageOutcome>,
    ) -> Result<()> {
        let mut entry = HistoryEntry::new(stage.as_str(), started_at, result.is_ok());
        match &result {
            Ok(outcome) => {
                entry.inputs_hash = outcome.inputs_hash.clone();
                entry.outputs_hash = outcome.outputs_hash.clone();
                entry.message = outcome.message.clone();
            }
            Err(err) => entry.message = Some(format!("{err:#}")),
        }
        if let Err(err) = append_history(&self.paths, &entry) {
            tracing::warn!(stage = %stage, err = %format!("{err:#}"), "failed to record history");
        }
        result.map(|_| ())
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        workspace::reproducible_now().unwrap_or_else(workspace::now)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
