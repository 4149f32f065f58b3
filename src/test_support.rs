//! Fixtures shared by unit tests.
use crate::discovery::{
    Candidate, CandidateDocument, DiscoverySummary, OpenQuestion, CANDIDATES_SCHEMA_VERSION,
};
use crate::evidence::{
    digest_body, EvidenceBody, EvidenceIndex, FileEntry, ScanSettings, EVIDENCE_SCHEMA_VERSION,
};
use crate::sections::{Level, Section};
use crate::workspace::sha256_hex;
use chrono::DateTime;
use serde_json::{json, Value};

pub(crate) fn section_content(section: Section) -> Value {
    match section {
        Section::Purpose => json!({
            "problem": "Operators cannot see which jobs failed overnight",
            "solution": "Expose a job status endpoint with failure reasons",
        }),
        Section::Flow => json!([
            {"step": 1, "actor": "operator", "action": "requests job status"},
            {"step": 2, "actor": "service", "action": "returns the latest run per job"},
        ]),
        Section::DataContracts => json!({
            "outputs": [{
                "name": "JobStatus",
                "fields": [
                    {"name": "job_id", "type": "string", "required": true},
                    {"name": "state", "type": "string"},
                ],
            }],
        }),
        Section::ApiContracts => json!([
            {"endpoint": "/jobs/{id}/status", "method": "GET", "purpose": "fetch status"},
        ]),
        Section::Permissions => json!([
            {"action": "read job status", "requiredRoles": ["operator"]},
        ]),
        Section::Tenancy => json!({"model": "single-tenant", "isolation": "none"}),
        Section::FailureModes => json!([
            {"scenario": "job store unavailable", "impact": "status unknown", "handling": "return 503"},
        ]),
        Section::AuditEvents => json!([
            {"event": "job.status.read", "severity": "info"},
        ]),
        Section::Nfrs => json!({"performance": "p95 < 200ms"}),
        Section::AcceptanceTests => json!([
            {"title": "status of a failed job", "given": "a failed run", "when": "status is requested", "then": "state is failed"},
        ]),
    }
}

/// A packet that satisfies every gate up to `level`.
pub(crate) fn packet_for_level(level: Level) -> Value {
    let mut packet = json!({
        "schemaVersion": "1",
        "packetId": "job-status",
        "title": "Job status",
        "level": level.number(),
    });
    if let Some(obj) = packet.as_object_mut() {
        for section in level.required_sections() {
            obj.insert(section.as_str().to_string(), section_content(section));
        }
    }
    packet
}

/// An evidence index with no files, for provider and engine tests.
pub(crate) fn empty_index() -> EvidenceIndex {
    index_with_files(&[])
}

/// An evidence index listing `paths` (sorted) with placeholder hashes.
pub(crate) fn index_with_files(paths: &[&str]) -> EvidenceIndex {
    let mut sorted: Vec<&str> = paths.to_vec();
    sorted.sort();
    let body = EvidenceBody {
        scan: ScanSettings {
            include: vec!["**/*".to_string()],
            exclude: Vec::new(),
            max_file_size: 1024,
        },
        files: sorted
            .iter()
            .map(|path| FileEntry {
                path: path.to_string(),
                hash: sha256_hex(path.as_bytes()),
                size: 1,
                extracted_facts: Vec::new(),
            })
            .collect(),
        dependencies: Vec::new(),
        routes: Vec::new(),
        auth_signals: Vec::new(),
        skipped: Vec::new(),
        redaction_applied: false,
        redactions: Default::default(),
    };
    EvidenceIndex {
        schema_version: EVIDENCE_SCHEMA_VERSION,
        tool_version: "test".to_string(),
        generated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        content_digest: digest_body(&body).expect("digest test index"),
        body,
    }
}

/// A candidate document with one candidate per section, citing `src/app.js`.
pub(crate) fn candidate_document(sections: &[Section]) -> CandidateDocument {
    let candidates: Vec<Candidate> = sections
        .iter()
        .map(|section| {
            Candidate::new(
                *section,
                0.8,
                vec!["src/app.js".to_string()],
                section_content(*section),
            )
        })
        .collect();
    CandidateDocument {
        schema_version: CANDIDATES_SCHEMA_VERSION,
        tool_version: "test".to_string(),
        generated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        inputs_digest: "inputs".to_string(),
        evidence_digest: "evidence".to_string(),
        target_level: Level::One,
        provider: "replay".to_string(),
        summary: DiscoverySummary {
            attempts: 1,
            proposed: candidates.len(),
            accepted: candidates.len(),
            open_questions: 1,
            ..DiscoverySummary::default()
        },
        candidates,
        open_questions: vec![OpenQuestion::for_sensitive(
            Section::Permissions,
            vec!["src/app.js".to_string()],
        )],
    }
}
