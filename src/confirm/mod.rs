//! Confirmation: the human gate between inferred candidates and the packet.
//!
//! Every decision is appended to the ledgers; nothing is rewritten. A
//! candidate with an effective decision is terminal here: confirming it again
//! is a no-op that reports the prior decision, and changing it goes through
//! [`revise`], which appends a newer entry.
use crate::discovery::{Candidate, CandidateDocument};
use crate::error::{PipelineError, Stage};
use crate::sections::SectionTag;
use crate::util::Cancellation;
use crate::workspace::{short_digest, WorkspacePaths};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

mod checklist;
mod interactive;
mod ledger;

pub use checklist::{parse_checklist, render_checklist, ChecklistDecision, NEW_BLOCK_ID};
pub use interactive::review_interactive;
pub use ledger::{
    ConfirmedBlock, Decision, Ledger, RejectedBlock, CONFIRMED_SOURCE, LEDGER_SCHEMA_VERSION,
};

/// Prefix of ids given to sections authored directly in the checklist.
pub const AUTHORED_ID_PREFIX: &str = "fp-";

/// Who is deciding, and when.
#[derive(Debug, Clone)]
pub struct ReviewContext {
    pub reviewer: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionNote {
    pub candidate_id: String,
    pub section: SectionTag,
    pub decision: Decision,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmReport {
    pub recorded: Vec<DecisionNote>,
    pub already_decided: Vec<DecisionNote>,
    /// Candidates still without a decision after this run.
    pub pending: usize,
    /// Review stopped early (quit, end of input, or cancellation).
    pub stopped: bool,
}

impl ConfirmReport {
    fn finish(mut self, document: &CandidateDocument, ledger: &Ledger) -> Self {
        self.pending = pending_count(document, ledger);
        self
    }
}

/// Candidates in `document` with no effective decision.
pub fn pending_count(document: &CandidateDocument, ledger: &Ledger) -> usize {
    document
        .candidates
        .iter()
        .filter(|candidate| ledger.effective(&candidate.id).is_none())
        .count()
}

/// Id for a human-authored `full_packet` block, derived from its content.
pub fn authored_block_id(content: &Value) -> String {
    let canonical = serde_json::to_string(content).unwrap_or_default();
    format!("{AUTHORED_ID_PREFIX}{}", short_digest(canonical.as_bytes()))
}

pub(crate) fn confirmed_from_candidate(
    candidate: &Candidate,
    decision: Decision,
    content: Value,
    ctx: &ReviewContext,
    candidates_digest: &str,
) -> ConfirmedBlock {
    ConfirmedBlock {
        schema_version: LEDGER_SCHEMA_VERSION,
        candidate_id: candidate.id.clone(),
        section: candidate.section.into(),
        source: CONFIRMED_SOURCE.to_string(),
        decision,
        confirmed_at: ctx.at,
        confirmed_by: ctx.reviewer.clone(),
        original_confidence: Some(candidate.confidence),
        evidence_refs: candidate.evidence_refs.clone(),
        content,
        candidates_digest: Some(candidates_digest.to_string()),
    }
}

pub(crate) fn rejected_from_candidate(
    candidate: &Candidate,
    ctx: &ReviewContext,
    candidates_digest: &str,
) -> RejectedBlock {
    RejectedBlock {
        schema_version: LEDGER_SCHEMA_VERSION,
        candidate_id: candidate.id.clone(),
        section: candidate.section.into(),
        rejected_at: ctx.at,
        rejected_by: ctx.reviewer.clone(),
        original_confidence: Some(candidate.confidence),
        evidence_refs: candidate.evidence_refs.clone(),
        candidates_digest: Some(candidates_digest.to_string()),
    }
}

fn authored_block(id: String, content: Value, ctx: &ReviewContext, digest: &str) -> ConfirmedBlock {
    ConfirmedBlock {
        schema_version: LEDGER_SCHEMA_VERSION,
        candidate_id: id,
        section: SectionTag::FullPacket,
        source: CONFIRMED_SOURCE.to_string(),
        decision: Decision::Accepted,
        confirmed_at: ctx.at,
        confirmed_by: ctx.reviewer.clone(),
        original_confidence: None,
        evidence_refs: Vec::new(),
        content,
        candidates_digest: Some(digest.to_string()),
    }
}

fn authored_rejection(id: String, ctx: &ReviewContext, digest: &str) -> RejectedBlock {
    RejectedBlock {
        schema_version: LEDGER_SCHEMA_VERSION,
        candidate_id: id,
        section: SectionTag::FullPacket,
        rejected_at: ctx.at,
        rejected_by: ctx.reviewer.clone(),
        original_confidence: None,
        evidence_refs: Vec::new(),
        candidates_digest: Some(digest.to_string()),
    }
}

/// `edited-accepted` when the accepted content differs from the proposal.
fn acceptance_for(candidate: &Candidate, content: &Value) -> Decision {
    if *content == candidate.content {
        Decision::Accepted
    } else {
        Decision::EditedAccepted
    }
}

enum Planned {
    Confirm(ConfirmedBlock),
    Reject(RejectedBlock),
    AlreadyDecided(DecisionNote),
}

/// Apply an edited checklist to the ledgers.
///
/// The whole document is checked before anything is appended, so a review
/// error leaves the ledgers untouched.
pub fn ingest_checklist(
    paths: &WorkspacePaths,
    document: &CandidateDocument,
    ledger: &mut Ledger,
    text: &str,
    ctx: &ReviewContext,
    cancel: &Cancellation,
) -> Result<ConfirmReport> {
    let entries = parse_checklist(text).map_err(|errors| PipelineError::Review {
        stage: Stage::Confirmation,
        errors,
    })?;
    let digest = document.digest();
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();
    let mut plan = Vec::new();

    for entry in entries {
        let line = entry.line;
        if entry.decision == ChecklistDecision::Pending {
            continue;
        }
        let planned = match entry.tag {
            SectionTag::Section(section) => {
                let Some(candidate) = document.find(&entry.candidate_id) else {
                    errors.push(format!(
                        "line {line}: candidate {} is not in discovery/candidates.json",
                        entry.candidate_id
                    ));
                    continue;
                };
                if candidate.section != section {
                    errors.push(format!(
                        "line {line}: candidate {} is a {} candidate but the region is tagged {section}",
                        candidate.id, candidate.section
                    ));
                    continue;
                }
                match entry.decision {
                    ChecklistDecision::Accept => {
                        let decision = acceptance_for(candidate, &entry.content);
                        Planned::Confirm(confirmed_from_candidate(
                            candidate,
                            decision,
                            entry.content,
                            ctx,
                            &digest,
                        ))
                    }
                    _ => Planned::Reject(rejected_from_candidate(candidate, ctx, &digest)),
                }
            }
            SectionTag::FullPacket => match (entry.candidate_id.as_str(), entry.decision) {
                (NEW_BLOCK_ID, ChecklistDecision::Accept) => {
                    let id = authored_block_id(&entry.content);
                    Planned::Confirm(authored_block(id, entry.content, ctx, &digest))
                }
                (NEW_BLOCK_ID, _) => {
                    errors.push(format!(
                        "line {line}: a new full_packet region can only be accepted or left pending"
                    ));
                    continue;
                }
                (id, _) => match ledger.effective(id) {
                    Some(state) => Planned::AlreadyDecided(DecisionNote {
                        candidate_id: id.to_string(),
                        section: SectionTag::FullPacket,
                        decision: state.decision,
                    }),
                    None => {
                        errors.push(format!("line {line}: unknown authored block {id}"));
                        continue;
                    }
                },
            },
        };

        let (id, section) = match &planned {
            Planned::Confirm(block) => (block.candidate_id.clone(), block.section),
            Planned::Reject(block) => (block.candidate_id.clone(), block.section),
            Planned::AlreadyDecided(note) => (note.candidate_id.clone(), note.section),
        };
        if !seen.insert(id.clone()) {
            errors.push(format!("line {line}: candidate {id} appears more than once"));
            continue;
        }
        let planned = match ledger.effective(&id) {
            Some(state) => {
                let wanted_accept = matches!(planned, Planned::Confirm(_));
                if wanted_accept != state.decision.is_accepted() {
                    tracing::warn!(
                        candidate = %id,
                        prior = %state.decision,
                        "checklist decision differs from the recorded one; use --revise to change it"
                    );
                }
                Planned::AlreadyDecided(DecisionNote {
                    candidate_id: id,
                    section,
                    decision: state.decision,
                })
            }
            None => planned,
        };
        plan.push(planned);
    }

    if !errors.is_empty() {
        return Err(PipelineError::Review {
            stage: Stage::Confirmation,
            errors,
        }
        .into());
    }

    let mut report = ConfirmReport::default();
    for planned in plan {
        if cancel.is_cancelled() {
            tracing::info!("confirmation cancelled; recorded decisions are kept");
            report.stopped = true;
            break;
        }
        match planned {
            Planned::Confirm(block) => {
                report.recorded.push(DecisionNote {
                    candidate_id: block.candidate_id.clone(),
                    section: block.section,
                    decision: block.decision,
                });
                ledger.append_confirmed(paths, block)?;
            }
            Planned::Reject(block) => {
                report.recorded.push(DecisionNote {
                    candidate_id: block.candidate_id.clone(),
                    section: block.section,
                    decision: Decision::Rejected,
                });
                ledger.append_rejected(paths, block)?;
            }
            Planned::AlreadyDecided(note) => report.already_decided.push(note),
        }
    }
    Ok(report.finish(document, ledger))
}

/// Record a changed decision as a new dated entry.
///
/// Accepting again reuses the latest confirmed content, so an edited
/// acceptance survives a reject-then-accept round trip. Asking for the
/// decision a candidate already has records nothing.
pub fn revise(
    paths: &WorkspacePaths,
    document: &CandidateDocument,
    ledger: &mut Ledger,
    candidate_id: &str,
    verdict: Verdict,
    ctx: &ReviewContext,
) -> Result<ConfirmReport> {
    let digest = document.digest();
    let previous = ledger.latest_confirmed(candidate_id).cloned();
    let mut report = ConfirmReport::default();

    if let Some(state) = ledger.effective(candidate_id) {
        if state.decision.is_accepted() == (verdict == Verdict::Accept) {
            let section = match (document.find(candidate_id), &previous) {
                (Some(candidate), _) => candidate.section.into(),
                (None, Some(block)) => block.section,
                (None, None) => SectionTag::FullPacket,
            };
            report.already_decided.push(DecisionNote {
                candidate_id: candidate_id.to_string(),
                section,
                decision: state.decision,
            });
            return Ok(report.finish(document, ledger));
        }
    }

    let note = match (document.find(candidate_id), previous) {
        (Some(candidate), previous) => match verdict {
            Verdict::Accept => {
                let content = previous
                    .map(|block| block.content)
                    .unwrap_or_else(|| candidate.content.clone());
                let decision = acceptance_for(candidate, &content);
                let block = confirmed_from_candidate(candidate, decision, content, ctx, &digest);
                ledger.append_confirmed(paths, block)?;
                DecisionNote {
                    candidate_id: candidate.id.clone(),
                    section: candidate.section.into(),
                    decision,
                }
            }
            Verdict::Reject => {
                ledger.append_rejected(paths, rejected_from_candidate(candidate, ctx, &digest))?;
                DecisionNote {
                    candidate_id: candidate.id.clone(),
                    section: candidate.section.into(),
                    decision: Decision::Rejected,
                }
            }
        },
        (None, Some(block)) if block.section == SectionTag::FullPacket => {
            let section = block.section;
            match verdict {
                Verdict::Accept => {
                    let revived = authored_block(block.candidate_id, block.content, ctx, &digest);
                    ledger.append_confirmed(paths, revived)?;
                }
                Verdict::Reject => {
                    ledger.append_rejected(paths, authored_rejection(block.candidate_id, ctx, &digest))?;
                }
            }
            DecisionNote {
                candidate_id: candidate_id.to_string(),
                section,
                decision: match verdict {
                    Verdict::Accept => Decision::Accepted,
                    Verdict::Reject => Decision::Rejected,
                },
            }
        }
        _ => {
            return Err(PipelineError::Review {
                stage: Stage::Confirmation,
                errors: vec![format!(
                    "candidate {candidate_id} is not in discovery/candidates.json or the confirmed log"
                )],
            }
            .into());
        }
    };
    tracing::info!(candidate = %note.candidate_id, decision = %note.decision, "decision revised");
    report.recorded.push(note);
    Ok(report.finish(document, ledger))
}

#[cfg(test)]
#[path = "confirm_tests.rs"]
mod tests;
