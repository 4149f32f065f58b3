//! Inference providers.
//!
//! A provider turns a prompt built from the evidence index into raw response
//! text. Parsing and validation stay in the discovery engine, so every
//! provider is held to the same invariants.
//!
//! Providers are selected by name from config:
//!
//! - `command`: any local tool that reads the prompt on stdin and writes JSON
//!   on stdout (e.g. `llm`, `ollama run`, a wrapper script). The command is
//!   resolved from `--provider-command`, then `discovery.command`, then
//!   `IPACK_PROVIDER_COMMAND`.
//! - `replay`: canned responses read from disk, for tests and offline review.
use crate::error::{PipelineError, ProviderError};
use crate::evidence::EvidenceIndex;
use crate::sections::Level;
use crate::workspace::DiscoveryConfig;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Provider names accepted in `discovery.provider`.
pub const PROVIDER_NAMES: [&str; 2] = ["command", "replay"];

/// Exit status a command provider uses to signal an authentication failure.
pub const AUTH_FAILURE_EXIT_CODE: i32 = 77;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct InferOptions {
    pub target_level: Level,
    /// 1-based attempt number.
    pub attempt: u32,
    pub prompt: String,
    pub timeout: Duration,
}

pub trait InferenceProvider {
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool;

    /// Run one inference attempt and return the raw response text.
    fn infer(
        &self,
        evidence: &EvidenceIndex,
        options: &InferOptions,
    ) -> Result<String, ProviderError>;
}

/// Map a configured provider name to its implementation.
///
/// Unknown names are configuration errors. `command` is the resolved
/// provider command; relative replay paths resolve against `base_dir`.
pub fn provider_for(
    config: &DiscoveryConfig,
    command: Option<String>,
    base_dir: &Path,
) -> Result<Box<dyn InferenceProvider>, PipelineError> {
    match config.provider.as_str() {
        "command" => Ok(Box::new(CommandProvider { command })),
        "replay" => {
            let source = config.responses.as_deref().ok_or_else(|| {
                PipelineError::config("discovery.responses is required for the replay provider")
            })?;
            Ok(Box::new(ReplayProvider::new(base_dir.join(source))))
        }
        other => Err(PipelineError::config(format!(
            "unknown discovery.provider {other:?} (expected one of: {})",
            PROVIDER_NAMES.join(", ")
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct CommandProvider {
    command: Option<String>,
}

impl CommandProvider {
    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }

    fn argv(&self) -> Result<Vec<String>, ProviderError> {
        let command = self
            .command
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("command".to_string()))?;
        let args = shell_words::split(command)
            .map_err(|err| ProviderError::NotConfigured(format!("command: {err}")))?;
        if args.is_empty() {
            return Err(ProviderError::NotConfigured("command".to_string()));
        }
        Ok(args)
    }
}

impl InferenceProvider for CommandProvider {
    fn name(&self) -> &str {
        "command"
    }

    fn is_configured(&self) -> bool {
        match self.argv() {
            Ok(args) => which::which(&args[0]).is_ok(),
            Err(_) => false,
        }
    }

    fn infer(
        &self,
        _evidence: &EvidenceIndex,
        options: &InferOptions,
    ) -> Result<String, ProviderError> {
        let args = self.argv()?;
        let start = Instant::now();
        let mut child = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ProviderError::Failed(format!("spawn {}: {err}", args[0])))?;

        let stdin = child.stdin.take();
        let prompt = options.prompt.clone();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // A child that exits without reading its input is not an error here.
                let _ = stdin.write_all(prompt.as_bytes());
            }
        });
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(err) => return Err(ProviderError::Failed(format!("wait for provider: {err}"))),
            }
            if start.elapsed() > options.timeout {
                let _ = child.kill();
                let _ = child.wait();
                let _ = writer.join();
                tracing::warn!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    attempt = options.attempt,
                    "provider timed out"
                );
                return Err(ProviderError::Timeout {
                    secs: options.timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };
        let _ = writer.join();
        let stdout = join_reader(stdout);
        let stderr = join_reader(stderr);

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = options.prompt.len(),
            response_bytes = stdout.len(),
            attempt = options.attempt,
            "provider invoke complete"
        );

        if status.code() == Some(AUTH_FAILURE_EXIT_CODE) {
            return Err(ProviderError::Auth(
                String::from_utf8_lossy(&stderr).trim().to_string(),
            ));
        }
        if !status.success() {
            return Err(ProviderError::Failed(format!(
                "exit status {}: {}",
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        String::from_utf8(stdout)
            .map_err(|_| ProviderError::Malformed("response is not valid UTF-8".to_string()))
    }
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        buf
    })
}

fn join_reader(handle: thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

/// Replays canned responses from a file, or `attempt-N.json` from a directory.
#[derive(Debug, Clone)]
pub struct ReplayProvider {
    source: PathBuf,
}

impl ReplayProvider {
    pub fn new(source: PathBuf) -> Self {
        Self { source }
    }

    fn response_path(&self, attempt: u32) -> PathBuf {
        if self.source.is_dir() {
            self.source.join(format!("attempt-{attempt}.json"))
        } else {
            self.source.clone()
        }
    }
}

impl InferenceProvider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    fn is_configured(&self) -> bool {
        self.source.exists()
    }

    fn infer(
        &self,
        _evidence: &EvidenceIndex,
        options: &InferOptions,
    ) -> Result<String, ProviderError> {
        let path = self.response_path(options.attempt);
        let text = fs::read_to_string(&path)
            .map_err(|err| ProviderError::Failed(format!("read {}: {err}", path.display())))?;
        tracing::info!(
            path = %path.display(),
            prompt_bytes = options.prompt.len(),
            response_bytes = text.len(),
            attempt = options.attempt,
            "replay response loaded"
        );
        Ok(text)
    }
}
