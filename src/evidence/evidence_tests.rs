use super::*;
use std::path::PathBuf;

fn options(max_file_size: u64) -> ScanOptions {
    ScanOptions {
        include: vec!["**/*".to_string()],
        exclude: vec![".git/**".to_string()],
        max_file_size,
    }
}

fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp")
}

fn sample_repo() -> tempfile::TempDir {
    let root = tempfile::tempdir().expect("tempdir");
    let write = |rel: &str, text: &str| {
        let path = root.path().join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, text).expect("write");
    };
    write(
        "package.json",
        r#"{"dependencies": {"express": "^4.18.0", "passport": "0.6.0"}}"#,
    );
    write(
        "src/server.js",
        "const passport = require('passport');\napp.get('/users', list);\napp.post('/users', create);\n",
    );
    write(
        "src/config.js",
        "const DB_PASSWORD = \"hunter2hunter2\";\nconst jwt = require('jsonwebtoken');\nconst API_TOKEN = \"abcd1234efgh\"; // jwt signing\n",
    );
    write(".git/HEAD", "ref: refs/heads/main\n");
    for idx in 0..20 {
        write(&format!("docs/page{idx:02}.md"), &format!("page {idx}\n"));
    }
    root
}

fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).expect("read dir") {
            let path = entry.expect("entry").path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let bytes = fs::read(&path).expect("read file");
                out.push((path, bytes));
            }
        }
    }
    out.sort();
    out
}

#[test]
fn repeated_builds_are_byte_identical() {
    let repo = sample_repo();
    let cancel = Cancellation::new();
    let first = build_evidence(repo.path(), &options(1024), fixed_time(), &cancel).expect("first");
    let second =
        build_evidence(repo.path(), &options(1024), fixed_time(), &cancel).expect("second");
    let first_bytes = serde_json::to_vec_pretty(&first).expect("serialize");
    let second_bytes = serde_json::to_vec_pretty(&second).expect("serialize");
    assert_eq!(first_bytes, second_bytes);

    let paths: Vec<&str> = first.body.files.iter().map(|f| f.path.as_str()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
    assert!(!paths.iter().any(|path| path.starts_with(".git/")));
    assert_eq!(first.body.files.len(), 23);
}

#[test]
fn content_digest_ignores_generated_at() {
    let repo = sample_repo();
    let cancel = Cancellation::new();
    let early = build_evidence(repo.path(), &options(1024), fixed_time(), &cancel).expect("early");
    let later = build_evidence(
        repo.path(),
        &options(1024),
        fixed_time() + chrono::Duration::hours(1),
        &cancel,
    )
    .expect("later");
    assert_eq!(early.content_digest, later.content_digest);
    assert_ne!(early.generated_at, later.generated_at);

    fs::write(repo.path().join("docs/page00.md"), "changed\n").expect("edit");
    let edited =
        build_evidence(repo.path(), &options(1024), fixed_time(), &cancel).expect("edited");
    assert_ne!(early.content_digest, edited.content_digest);
}

#[test]
fn all_files_oversized_yields_empty_index() {
    let repo = sample_repo();
    let index =
        build_evidence(repo.path(), &options(1), fixed_time(), &Cancellation::new()).expect("build");
    assert!(index.body.files.is_empty());
    assert!(index.body.dependencies.is_empty());
    assert_eq!(index.body.skipped.len(), 23);
    assert!(index
        .body
        .skipped
        .iter()
        .all(|skipped| skipped.reason == SkipReason::Oversized));
}

#[test]
fn facts_are_collected_and_secrets_masked() {
    let repo = sample_repo();
    let index = build_evidence(repo.path(), &options(1024), fixed_time(), &Cancellation::new())
        .expect("build");
    let deps: Vec<&str> = index
        .body
        .dependencies
        .iter()
        .map(|dep| dep.name.as_str())
        .collect();
    assert_eq!(deps, vec!["express", "passport"]);
    assert_eq!(index.body.routes.len(), 2);
    assert!(index.contains_path("src/server.js"));
    assert!(!index.contains_path("src/missing.js"));

    assert!(index.body.redaction_applied);
    assert_eq!(index.body.redactions.get("assignment"), Some(&1));
    let serialized = serde_json::to_string(&index).expect("serialize");
    assert!(!serialized.contains("abcd1234efgh"));
    assert!(!serialized.contains("hunter2hunter2"));
}

#[test]
fn scanning_never_mutates_the_tree() {
    let repo = sample_repo();
    let before = snapshot(repo.path());
    build_evidence(repo.path(), &options(1024), fixed_time(), &Cancellation::new()).expect("build");
    assert_eq!(before, snapshot(repo.path()));
}

#[test]
fn cancelled_scan_returns_cancelled() {
    let repo = sample_repo();
    let cancel = Cancellation::new();
    cancel.cancel();
    let err = build_evidence(repo.path(), &options(1024), fixed_time(), &cancel)
        .expect_err("cancelled");
    assert!(matches!(
        err,
        PipelineError::Cancelled {
            stage: Stage::Evidence
        }
    ));
}

#[test]
fn missing_root_is_an_io_error() {
    let root = tempfile::tempdir().expect("tempdir");
    let err = build_evidence(
        &root.path().join("absent"),
        &options(1024),
        fixed_time(),
        &Cancellation::new(),
    )
    .expect_err("missing root");
    assert!(matches!(err, PipelineError::Io { .. }));
}

#[test]
fn exclude_dir_adds_a_subtree_pattern_once() {
    let options = options(10).exclude_dir(".ipack/").exclude_dir(".ipack");
    assert_eq!(
        options.exclude,
        vec![".git/**".to_string(), ".ipack/**".to_string()]
    );
}

#[test]
fn index_roundtrips_through_json() {
    let repo = sample_repo();
    let index = build_evidence(repo.path(), &options(1024), fixed_time(), &Cancellation::new())
        .expect("build");
    let text = serde_json::to_string_pretty(&index).expect("serialize");
    let value: serde_json::Value = serde_json::from_str(&text).expect("parse value");
    for key in ["files", "dependencies", "routes", "authSignals", "generatedAt", "toolVersion"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    let parsed: EvidenceIndex = serde_json::from_str(&text).expect("parse index");
    assert_eq!(parsed, index);
    assert_eq!(digest_body(&parsed.body).expect("digest"), index.content_digest);
}
