//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Environment variables that would leak host settings into a run.
const HOST_ENV: [&str; 5] = [
    "IPACK_DISCOVERY",
    "IPACK_PROVIDER_COMMAND",
    "IPACK_LOG",
    "SOURCE_DATE_EPOCH",
    "USER",
];

/// A throwaway repository with a small service to scan.
pub struct TestRepo {
    dir: TempDir,
}

/// Captured result of one `ipack` invocation.
pub struct Run {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Run {
    fn from_output(output: Output) -> Self {
        Self {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    pub fn assert_success(&self) -> &Self {
        assert_eq!(
            self.status, 0,
            "ipack failed\nstdout:\n{}\nstderr:\n{}",
            self.stdout, self.stderr
        );
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert_eq!(
            self.status, 1,
            "expected exit 1\nstdout:\n{}\nstderr:\n{}",
            self.stdout, self.stderr
        );
        self
    }
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp repo");
        let repo = Self { dir };
        repo.write(
            "package.json",
            r#"{"name": "jobs", "dependencies": {"express": "^4.18.0"}}"#,
        );
        repo.write(
            "src/app.js",
            "const express = require('express');\n\
             const app = express();\n\
             app.get('/jobs/:id/status', requireAuth, (req, res) => res.json({}));\n\
             const apiKey = \"sk_live_0123456789abcdef\";\n",
        );
        repo.write("README.md", "# Jobs\nShows job status to operators.\n");
        repo
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn workspace(&self) -> PathBuf {
        self.root().join(".ipack")
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, contents).expect("write repo file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root().join(rel)).expect("read repo file")
    }

    pub fn read_json(&self, rel: &str) -> Value {
        serde_json::from_str(&self.read(rel)).expect("parse JSON")
    }

    /// Run `ipack` in the repository with a clean environment.
    pub fn ipack(&self, args: &[&str]) -> Run {
        self.ipack_with_env(args, &[])
    }

    pub fn ipack_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Run {
        let mut command = Command::new(env!("CARGO_BIN_EXE_ipack"));
        command.args(args).current_dir(self.root());
        for key in HOST_ENV {
            command.env_remove(key);
        }
        for (key, value) in envs {
            command.env(key, value);
        }
        Run::from_output(command.output().expect("spawn ipack"))
    }

    /// Turn on discovery with the replay provider reading `responses`.
    pub fn enable_replay(&self, responses: &Path) {
        let config_path = self.workspace().join("config.json");
        let mut config: Value =
            serde_json::from_str(&fs::read_to_string(&config_path).expect("read config"))
                .expect("parse config");
        config["discovery"]["enabled"] = json!(true);
        config["discovery"]["provider"] = json!("replay");
        config["discovery"]["responses"] = json!(responses.display().to_string());
        fs::write(
            &config_path,
            serde_json::to_string_pretty(&config).expect("serialize config"),
        )
        .expect("write config");
    }

    /// Write `attempt-N.json` replay files, one per response.
    pub fn write_responses(&self, responses: &[Value]) -> PathBuf {
        let dir = self.root().join("replay");
        fs::create_dir_all(&dir).expect("create replay dir");
        for (index, response) in responses.iter().enumerate() {
            fs::write(
                dir.join(format!("attempt-{}.json", index + 1)),
                serde_json::to_string_pretty(response).expect("serialize response"),
            )
            .expect("write response");
        }
        dir
    }
}

/// A provider response proposing level 1 sections plus a permissions section.
pub fn level_one_response() -> Value {
    json!({
        "candidates": [
            {
                "section": "purpose",
                "confidence": 0.9,
                "evidenceRefs": ["README.md"],
                "source": "inferred",
                "content": {
                    "problem": "Operators cannot see job status",
                    "solution": "Expose a job status endpoint"
                }
            },
            {
                "section": "flow",
                "confidence": 0.8,
                "evidenceRefs": ["src/app.js"],
                "content": [
                    {"step": 1, "actor": "operator", "action": "requests job status"},
                    {"step": 2, "actor": "service", "action": "returns the job state"}
                ]
            },
            {
                "section": "dataContracts",
                "confidence": 0.7,
                "evidenceRefs": ["src/app.js"],
                "content": {
                    "outputs": [{
                        "name": "JobStatus",
                        "fields": [{"name": "state", "type": "string", "required": true}]
                    }]
                }
            },
            {
                "section": "permissions",
                "confidence": 0.9,
                "evidenceRefs": ["src/app.js"],
                "content": [{"action": "read status", "requiredRoles": ["operator"]}]
            }
        ]
    })
}

/// Decide the first `count` pending regions of a checklist.
///
/// Candidate regions precede the trailing authored-section region, so this
/// never touches the latter unless `count` covers every candidate.
pub fn decide(text: &str, count: usize, decision: &str) -> String {
    text.replacen("decision: pending", &format!("decision: {decision}"), count)
}
