//! Workflow status step.
//!
//! Status reads every stage artifact without side effects and reports what
//! exists, what is pending, and the last recorded stage run.
use super::PipelineContext;
use crate::confirm::{pending_count, Ledger};
use crate::discovery::{load_attempts, CandidateDocument};
use crate::evidence::EvidenceIndex;
use crate::workspace::{load_history, load_json_optional, HistoryEntry};
use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub workspace: String,
    pub config_present: bool,
    pub discovery_enabled: bool,
    pub evidence: EvidenceStatus,
    pub discovery: DiscoveryStatus,
    pub confirmation: ConfirmationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceStatus {
    pub present: bool,
    pub files: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryStatus {
    pub present: bool,
    pub candidates: usize,
    pub open_questions: usize,
    pub attempts_logged: usize,
    /// Candidates were inferred from an older evidence index.
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationStatus {
    pub pending: usize,
    pub decided: usize,
    pub confirmed_entries: usize,
    pub rejected_entries: usize,
}

pub(crate) fn build_status_summary(ctx: &PipelineContext) -> Result<StatusSummary> {
    let paths = &ctx.paths;
    let evidence: Option<EvidenceIndex> = load_json_optional(&paths.evidence_index_path())?;
    let candidates: Option<CandidateDocument> = load_json_optional(&paths.candidates_path())?;
    let ledger = Ledger::load(paths)?;
    let attempts = load_attempts(paths)?;
    let history = load_history(paths)?;

    let (pending, decided) = match &candidates {
        Some(document) => {
            let pending = pending_count(document, &ledger);
            (pending, document.candidates.len() - pending)
        }
        None => (0, 0),
    };
    let stale = match (&evidence, &candidates) {
        (Some(index), Some(document)) => index.content_digest != document.evidence_digest,
        _ => false,
    };

    Ok(StatusSummary {
        workspace: paths.root().display().to_string(),
        config_present: ctx.config_exists,
        discovery_enabled: ctx.config.discovery.enabled,
        evidence: EvidenceStatus {
            present: evidence.is_some(),
            files: evidence.as_ref().map_or(0, |index| index.body.files.len()),
            skipped: evidence.as_ref().map_or(0, |index| index.body.skipped.len()),
            content_digest: evidence.map(|index| index.content_digest),
        },
        discovery: DiscoveryStatus {
            present: candidates.is_some(),
            candidates: candidates
                .as_ref()
                .map_or(0, |document| document.candidates.len()),
            open_questions: candidates
                .as_ref()
                .map_or(0, |document| document.open_questions.len()),
            attempts_logged: attempts.len(),
            stale,
        },
        confirmation: ConfirmationStatus {
            pending,
            decided,
            confirmed_entries: ledger.confirmed.len(),
            rejected_entries: ledger.rejected.len(),
        },
        last_run: history.into_iter().last(),
    })
}

pub(crate) fn render_status(summary: &StatusSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "workspace: {}", summary.workspace);
    if !summary.config_present {
        let _ = writeln!(out, "config: missing (run `ipack init`)");
    }
    let evidence = &summary.evidence;
    if evidence.present {
        let _ = writeln!(
            out,
            "evidence: {} files, {} skipped",
            evidence.files, evidence.skipped
        );
    } else {
        let _ = writeln!(out, "evidence: not built");
    }
    let discovery = &summary.discovery;
    if discovery.present {
        let _ = writeln!(
            out,
            "discovery: {} candidates, {} open questions{}",
            discovery.candidates,
            discovery.open_questions,
            if discovery.stale { " (stale)" } else { "" }
        );
    } else if summary.discovery_enabled {
        let _ = writeln!(out, "discovery: not run");
    } else {
        let _ = writeln!(out, "discovery: disabled in config");
    }
    let confirmation = &summary.confirmation;
    let _ = writeln!(
        out,
        "confirmation: {} pending, {} decided ({} confirmed, {} rejected entries)",
        confirmation.pending,
        confirmation.decided,
        confirmation.confirmed_entries,
        confirmation.rejected_entries
    );
    if let Some(entry) = &summary.last_run {
        let _ = writeln!(
            out,
            "last run: {} {} at {}{}",
            entry.stage,
            if entry.success { "succeeded" } else { "failed" },
            entry.finished_at.to_rfc3339(),
            entry
                .message
                .as_deref()
                .map(|message| format!(" ({message})"))
                .unwrap_or_default()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::Section;
    use crate::test_support::{candidate_document, index_with_files};
    use crate::workspace::write_json;

    #[test]
    fn status_counts_pending_candidates_and_flags_stale_discovery() {
        let repo = tempfile::tempdir().expect("tempdir");
        let ctx = PipelineContext::load(repo.path(), None).expect("context");
        let summary = build_status_summary(&ctx).expect("empty status");
        assert!(!summary.evidence.present);
        assert!(!summary.discovery.present);
        assert!(render_status(&summary).contains("evidence: not built"));

        let index = index_with_files(&["src/app.js"]);
        write_json(&ctx.paths.evidence_index_path(), &index).expect("write index");
        let document = candidate_document(&[Section::Purpose, Section::Flow]);
        write_json(&ctx.paths.candidates_path(), &document).expect("write candidates");

        let summary = build_status_summary(&ctx).expect("status");
        assert_eq!(summary.evidence.files, 1);
        assert_eq!(summary.discovery.candidates, 2);
        assert_eq!(summary.discovery.open_questions, 1);
        assert_eq!(summary.confirmation.pending, 2);
        assert_eq!(summary.confirmation.decided, 0);
        // the fixture document was not inferred from this index
        assert!(summary.discovery.stale);
    }
}
