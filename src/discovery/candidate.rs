//! Candidate documents and per-item checks on provider output.
use crate::evidence::EvidenceIndex;
use crate::sections::{Level, Section};
use crate::validate::validate_section;
use crate::workspace::short_digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current schema version for `discovery/candidates.json`.
pub const CANDIDATES_SCHEMA_VERSION: u32 = 1;

/// The only `source` value a candidate may carry.
pub const INFERRED_SOURCE: &str = "inferred";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub section: Section,
    pub source: String,
    pub confidence: f64,
    pub evidence_refs: Vec<String>,
    pub requires_confirmation: bool,
    pub content: Value,
}

impl Candidate {
    pub fn new(section: Section, confidence: f64, evidence_refs: Vec<String>, content: Value) -> Self {
        let mut evidence_refs = evidence_refs;
        evidence_refs.sort();
        evidence_refs.dedup();
        let id = candidate_id(section, &content, &evidence_refs);
        Self {
            id,
            section,
            source: INFERRED_SOURCE.to_string(),
            confidence,
            evidence_refs,
            requires_confirmation: true,
            content,
        }
    }
}

/// Content address of a candidate: section, canonical content and sorted refs.
pub fn candidate_id(section: Section, content: &Value, evidence_refs: &[String]) -> String {
    let mut refs: Vec<&str> = evidence_refs.iter().map(String::as_str).collect();
    refs.sort_unstable();
    let canonical = serde_json::to_string(content).unwrap_or_default();
    let material = format!("{}\n{}\n{}", section, canonical, refs.join("\n"));
    short_digest(material.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenQuestion {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<Section>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
}

impl OpenQuestion {
    pub fn for_sensitive(section: Section, evidence_refs: Vec<String>) -> Self {
        Self {
            question: format!(
                "`{section}` was proposed by inference and discarded; it must be authored by a human"
            ),
            section: Some(section),
            evidence_refs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedItem {
    /// Position in the provider's `candidates` array.
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySummary {
    pub attempts: u32,
    pub proposed: usize,
    pub accepted: usize,
    pub dropped_low_confidence: usize,
    pub rejected: Vec<RejectedItem>,
    pub stripped_sensitive: usize,
    pub open_questions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDocument {
    pub schema_version: u32,
    pub tool_version: String,
    pub generated_at: DateTime<Utc>,
    pub inputs_digest: String,
    pub evidence_digest: String,
    pub target_level: Level,
    pub provider: String,
    pub candidates: Vec<Candidate>,
    pub open_questions: Vec<OpenQuestion>,
    pub summary: DiscoverySummary,
}

impl CandidateDocument {
    /// SHA-256 over the persisted document bytes, recorded on decisions.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        crate::workspace::sha256_hex(&bytes)
    }

    pub fn find(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|candidate| candidate.id == id)
    }
}

/// What became of one raw item in a provider response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ItemOutcome {
    Accepted(Candidate),
    /// Security-sensitive section; converted to an open question.
    Stripped(OpenQuestion),
    /// Provenance violation; never coerced.
    Rejected(RejectedItem),
    /// Below `min_confidence`.
    Dropped,
    /// Schema problem that the provider can fix on retry.
    Retry(Vec<String>),
}

/// Check one raw candidate against provenance and schema rules.
pub(crate) fn check_item(
    index: usize,
    raw: &Value,
    evidence: &EvidenceIndex,
    min_confidence: f64,
) -> ItemOutcome {
    let at = format!("candidates[{index}]");
    let Some(item) = raw.as_object() else {
        return ItemOutcome::Retry(vec![format!("{at}: expected an object")]);
    };

    let section = match item.get("section") {
        Some(Value::String(name)) => match name.parse::<Section>() {
            Ok(section) => section,
            Err(err) => return ItemOutcome::Retry(vec![format!("{at}.section: {err}")]),
        },
        Some(_) => return ItemOutcome::Retry(vec![format!("{at}.section: expected a string")]),
        None => return ItemOutcome::Retry(vec![format!("{at}.section: required field is missing")]),
    };

    if section.is_security_sensitive() {
        let refs = string_refs(item).unwrap_or_default();
        return ItemOutcome::Stripped(OpenQuestion::for_sensitive(section, refs));
    }

    let reasons = provenance_violations(item, evidence);
    if !reasons.is_empty() {
        return ItemOutcome::Rejected(RejectedItem {
            index,
            section: Some(section.to_string()),
            reasons,
        });
    }

    let content = match item.get("content") {
        Some(content) if !content.is_null() => content.clone(),
        _ => return ItemOutcome::Retry(vec![format!("{at}.content: required field is missing")]),
    };
    let issues = validate_section(section, &content);
    if !issues.is_empty() {
        return ItemOutcome::Retry(
            issues
                .iter()
                .map(|issue| format!("{at}: {}: {}", issue.path, issue.message))
                .collect(),
        );
    }

    // provenance_violations guarantees both fields are well formed here
    let confidence = item
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or_default();
    if confidence < min_confidence {
        return ItemOutcome::Dropped;
    }
    let refs = string_refs(item).unwrap_or_default();
    ItemOutcome::Accepted(Candidate::new(section, confidence, refs, content))
}

fn provenance_violations(item: &Map<String, Value>, evidence: &EvidenceIndex) -> Vec<String> {
    let mut reasons = Vec::new();
    match item.get("confidence") {
        None | Some(Value::Null) => reasons.push("confidence is missing".to_string()),
        Some(value) => match value.as_f64() {
            Some(confidence) if (0.0..=1.0).contains(&confidence) => {}
            Some(confidence) => {
                reasons.push(format!("confidence {confidence} is outside [0, 1]"))
            }
            None => reasons.push("confidence is not a number".to_string()),
        },
    }
    match string_refs(item) {
        None => reasons.push("evidenceRefs is missing or not a list of paths".to_string()),
        Some(refs) if refs.is_empty() => reasons.push("evidenceRefs is empty".to_string()),
        Some(refs) => {
            for reference in refs {
                if !evidence.contains_path(&reference) {
                    reasons.push(format!("evidenceRefs cites {reference:?}, which is not in the evidence index"));
                }
            }
        }
    }
    if let Some(source) = item.get("source") {
        if source.as_str() != Some(INFERRED_SOURCE) {
            reasons.push(format!("source must be {INFERRED_SOURCE:?} (got {source})"));
        }
    }
    reasons
}

fn string_refs(item: &Map<String, Value>) -> Option<Vec<String>> {
    let refs = item.get("evidenceRefs")?.as_array()?;
    refs.iter()
        .map(|reference| reference.as_str().map(str::to_string))
        .collect()
}
