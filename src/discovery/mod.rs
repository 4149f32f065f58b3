//! Discovery: inference of candidate packet sections from the evidence index.
//!
//! A run is an explicit state machine bounded by `max_retries` total
//! attempts:
//!
//! ```text
//! attempt -> validate -> accepted
//!               |
//!               +-> retry (errors fed back) -> attempt ...
//!               +-> exhausted (all outstanding errors reported)
//! ```
//!
//! Schema problems (unknown section, invalid content, malformed JSON) fail the
//! attempt and are fed back to the provider. Provenance problems (missing
//! confidence or evidence) reject only the offending item. Security-sensitive
//! sections are never accepted from inference; they become open questions.
use crate::error::{PipelineError, ProviderError, Stage};
use crate::evidence::EvidenceIndex;
use crate::sections::Level;
use crate::util::{extract_json, Cancellation};
use crate::workspace::Digester;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

mod attempts;
mod candidate;
mod gate;
mod prompt;
mod provider;

pub use attempts::{append_attempts, load_attempts, AttemptRecord};
pub use candidate::{
    candidate_id, Candidate, CandidateDocument, DiscoverySummary, OpenQuestion, RejectedItem,
    CANDIDATES_SCHEMA_VERSION,
};
pub use gate::Gate;
pub use provider::{provider_for, InferOptions, InferenceProvider, PROVIDER_NAMES};

use attempts::AttemptBuilder;
use candidate::{check_item, ItemOutcome};

#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub target_level: Level,
    /// Total attempts allowed, including the first.
    pub max_retries: u32,
    pub min_confidence: f64,
    pub timeout: Duration,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryRun {
    /// The dual gate was closed; nothing ran.
    Skipped { reason: String },
    Completed(CandidateDocument),
}

/// Items accepted from one validated response.
#[derive(Debug, Default)]
struct Accepted {
    proposed: usize,
    candidates: Vec<Candidate>,
    open_questions: Vec<OpenQuestion>,
    rejected: Vec<RejectedItem>,
    dropped_low_confidence: usize,
    stripped_sensitive: usize,
}

enum State {
    Attempt(u32),
    Validate {
        attempt: u32,
        builder: AttemptBuilder,
        response: String,
    },
    Retry(u32),
    Exhausted(u32),
    Done {
        attempt: u32,
        accepted: Accepted,
    },
}

/// Digest of everything that determines a discovery run's output.
pub fn inputs_digest(evidence: &EvidenceIndex, request: &DiscoveryRequest, provider: &str) -> String {
    let mut digester = Digester::new("ipack-discovery-v1");
    digester
        .update(evidence.content_digest.as_bytes())
        .update(&[request.target_level.number()])
        .update(provider.as_bytes())
        .update(&request.min_confidence.to_le_bytes());
    digester.finish()
}

/// Run discovery over `evidence`.
///
/// Returns `Skipped` without touching the provider when the gate is closed.
/// Every attempt is recorded in `attempt_log`, including on failure.
pub fn discover(
    gate: Gate,
    evidence: &EvidenceIndex,
    request: &DiscoveryRequest,
    provider: &dyn InferenceProvider,
    cancel: &Cancellation,
    attempt_log: &mut Vec<AttemptRecord>,
) -> Result<DiscoveryRun, PipelineError> {
    if let Some(reason) = gate.skip_reason() {
        tracing::info!(%reason, "discovery skipped");
        return Ok(DiscoveryRun::Skipped { reason });
    }
    if !provider.is_configured() {
        return Err(PipelineError::Provider {
            stage: Stage::Discovery,
            source: ProviderError::NotConfigured(provider.name().to_string()),
        });
    }

    let base_prompt = prompt::build_prompt(evidence, request.target_level);
    let max_attempts = request.max_retries.max(1);
    let mut outstanding: Vec<String> = Vec::new();
    let mut previous_response: Option<String> = None;
    let mut state = State::Attempt(1);

    loop {
        state = match state {
            State::Attempt(attempt) => {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled {
                        stage: Stage::Discovery,
                    });
                }
                let prompt = if attempt == 1 {
                    base_prompt.clone()
                } else {
                    prompt::build_retry_prompt(
                        &base_prompt,
                        attempt - 1,
                        &outstanding,
                        previous_response.as_deref(),
                    )
                };
                let builder = AttemptBuilder::new(attempt, provider.name(), &prompt);
                let options = InferOptions {
                    target_level: request.target_level,
                    attempt,
                    prompt,
                    timeout: request.timeout,
                };
                match provider.infer(evidence, &options) {
                    Ok(response) => State::Validate {
                        attempt,
                        builder,
                        response,
                    },
                    Err(err @ ProviderError::NotConfigured(_)) => {
                        attempt_log.push(builder.provider_error(&err));
                        return Err(PipelineError::Provider {
                            stage: Stage::Discovery,
                            source: err,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(attempt, %err, "provider attempt failed");
                        attempt_log.push(builder.provider_error(&err));
                        outstanding.push(format!("attempt {attempt}: {err}"));
                        previous_response = None;
                        State::Retry(attempt)
                    }
                }
            }
            State::Validate {
                attempt,
                builder,
                response,
            } => match validate_response(&response, evidence, request.min_confidence) {
                Ok(accepted) => {
                    attempt_log.push(builder.accepted(response.len()));
                    State::Done { attempt, accepted }
                }
                Err(errors) => {
                    tracing::warn!(attempt, errors = errors.len(), "provider response rejected");
                    attempt_log.push(builder.invalid(response.len(), errors.clone()));
                    outstanding.extend(
                        errors
                            .into_iter()
                            .map(|error| format!("attempt {attempt}: {error}")),
                    );
                    previous_response = Some(response);
                    State::Retry(attempt)
                }
            },
            State::Retry(attempt) if attempt >= max_attempts => State::Exhausted(attempt),
            State::Retry(attempt) => {
                tracing::info!(attempt = attempt + 1, max_attempts, "retrying discovery");
                State::Attempt(attempt + 1)
            }
            State::Exhausted(attempts) => {
                return Err(PipelineError::RetriesExhausted {
                    stage: Stage::Discovery,
                    attempts,
                    errors: outstanding,
                });
            }
            State::Done { attempt, accepted } => {
                let document = build_document(evidence, request, provider.name(), attempt, accepted);
                tracing::info!(
                    attempts = attempt,
                    accepted = document.summary.accepted,
                    dropped = document.summary.dropped_low_confidence,
                    rejected = document.summary.rejected.len(),
                    stripped = document.summary.stripped_sensitive,
                    "discovery complete"
                );
                return Ok(DiscoveryRun::Completed(document));
            }
        };
    }
}

/// Parse and check one response. `Err` carries attempt-level errors.
fn validate_response(
    text: &str,
    evidence: &EvidenceIndex,
    min_confidence: f64,
) -> Result<Accepted, Vec<String>> {
    let value: Value = serde_json::from_str(extract_json(text))
        .map_err(|err| vec![format!("response is not valid JSON: {err}")])?;
    let items = value
        .get("candidates")
        .and_then(Value::as_array)
        .ok_or_else(|| vec!["response must be an object with a `candidates` array".to_string()])?;

    let mut accepted = Accepted {
        proposed: items.len(),
        ..Accepted::default()
    };
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();
    for (index, raw) in items.iter().enumerate() {
        match check_item(index, raw, evidence, min_confidence) {
            ItemOutcome::Accepted(candidate) => {
                if seen.insert(candidate.id.clone()) {
                    accepted.candidates.push(candidate);
                }
            }
            ItemOutcome::Stripped(question) => {
                tracing::warn!(index, section = ?question.section, "stripped inferred security-sensitive section");
                accepted.stripped_sensitive += 1;
                accepted.open_questions.push(question);
            }
            ItemOutcome::Rejected(rejected) => {
                tracing::warn!(index, reasons = ?rejected.reasons, "rejected candidate with provenance violation");
                accepted.rejected.push(rejected);
            }
            ItemOutcome::Dropped => accepted.dropped_low_confidence += 1,
            ItemOutcome::Retry(item_errors) => errors.extend(item_errors),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    accepted
        .candidates
        .sort_by(|a, b| (a.section, &a.id).cmp(&(b.section, &b.id)));
    Ok(accepted)
}

fn build_document(
    evidence: &EvidenceIndex,
    request: &DiscoveryRequest,
    provider: &str,
    attempts: u32,
    accepted: Accepted,
) -> CandidateDocument {
    let summary = DiscoverySummary {
        attempts,
        proposed: accepted.proposed,
        accepted: accepted.candidates.len(),
        dropped_low_confidence: accepted.dropped_low_confidence,
        rejected: accepted.rejected,
        stripped_sensitive: accepted.stripped_sensitive,
        open_questions: accepted.open_questions.len(),
    };
    CandidateDocument {
        schema_version: CANDIDATES_SCHEMA_VERSION,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: request.generated_at,
        inputs_digest: inputs_digest(evidence, request, provider),
        evidence_digest: evidence.content_digest.clone(),
        target_level: request.target_level,
        provider: provider.to_string(),
        candidates: accepted.candidates,
        open_questions: accepted.open_questions,
        summary,
    }
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
