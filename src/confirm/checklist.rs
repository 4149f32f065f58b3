//! Document-based review: `confirm/checklist.md`.
//!
//! Each candidate is rendered as one editable region opened by
//! `<!-- ipack:begin section=<tag> candidate=<id> -->` and closed by
//! `<!-- ipack:end -->`. Inside a region the parser reads a
//! `decision: pending|accept|reject` line and one fenced JSON block with the
//! section content; everything else is commentary for the reviewer.
//!
//! The parser matches regions back by section tag and candidate id. A tag
//! that is not a known section (or `full_packet`) is an error, never an
//! unresolved section.
use super::ledger::Ledger;
use crate::discovery::CandidateDocument;
use crate::sections::{Section, SectionTag};
use crate::validate::validate_section;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::OnceLock;

/// Candidate id used for the trailing region where sections are authored by hand.
pub const NEW_BLOCK_ID: &str = "new";

const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistDecision {
    Pending,
    Accept,
    Reject,
}

impl ChecklistDecision {
    fn as_str(&self) -> &'static str {
        match self {
            ChecklistDecision::Pending => "pending",
            ChecklistDecision::Accept => "accept",
            ChecklistDecision::Reject => "reject",
        }
    }
}

impl FromStr for ChecklistDecision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" | "" => Ok(ChecklistDecision::Pending),
            "accept" | "accepted" => Ok(ChecklistDecision::Accept),
            "reject" | "rejected" => Ok(ChecklistDecision::Reject),
            other => Err(format!(
                "unknown decision {other:?} (expected pending, accept or reject)"
            )),
        }
    }
}

/// One parsed region.
#[derive(Debug, Clone, PartialEq)]
pub struct ChecklistEntry {
    pub tag: SectionTag,
    pub candidate_id: String,
    pub decision: ChecklistDecision,
    pub content: Value,
    /// 1-based line of the begin marker.
    pub line: usize,
}

fn begin_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^<!--\s*ipack:begin\s+section=(\S+)\s+candidate=(\S+)\s*-->$")
            .expect("regex for region begin markers")
    })
}

fn end_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^<!--\s*ipack:end\s*-->$")
            .expect("regex for region end markers")
    })
}

/// Render the review document for every candidate, open question and
/// previously authored full-packet block.
pub fn render_checklist(document: &CandidateDocument, ledger: &Ledger) -> String {
    let mut out = String::new();
    out.push_str("# Intent packet review\n\n");
    out.push_str("Edit the regions below, then run `ipack confirm --ingest`.\n\n");
    out.push_str("- Set `decision:` to `accept` or `reject`; leave `pending` to decide later.\n");
    out.push_str("- Accepting edited JSON records an edited acceptance.\n");
    out.push_str("- Keep the `ipack:begin` and `ipack:end` markers intact.\n");
    out.push_str(
        "- `permissions`, `tenancy` and `auditEvents` are never inferred; author them in the \
         `full_packet` region at the end.\n",
    );
    out.push_str("- Decided candidates are shown for reference; use `ipack confirm --revise` to change them.\n\n");

    if !document.open_questions.is_empty() {
        out.push_str("## Open questions\n\n");
        for question in &document.open_questions {
            let _ = write!(out, "- {}", question.question);
            if !question.evidence_refs.is_empty() {
                let _ = write!(out, " (evidence: {})", question.evidence_refs.join(", "));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str("## Candidates\n\n");
    if document.candidates.is_empty() {
        out.push_str("No candidates were proposed.\n\n");
    }
    for candidate in &document.candidates {
        let state = ledger.effective(&candidate.id);
        let (decision, content, note) = match state {
            Some(state) if state.decision.is_accepted() => {
                let content = ledger
                    .latest_confirmed(&candidate.id)
                    .map(|block| block.content.clone())
                    .unwrap_or_else(|| candidate.content.clone());
                (
                    ChecklistDecision::Accept,
                    content,
                    Some(format!("{} at {}", state.decision, state.at.to_rfc3339())),
                )
            }
            Some(state) => (
                ChecklistDecision::Reject,
                candidate.content.clone(),
                Some(format!("{} at {}", state.decision, state.at.to_rfc3339())),
            ),
            None => (ChecklistDecision::Pending, candidate.content.clone(), None),
        };
        let mut header = vec![
            format!("Confidence: {:.2}", candidate.confidence),
            format!("Evidence: {}", candidate.evidence_refs.join(", ")),
        ];
        if let Some(note) = note {
            header.push(format!("Already decided: {note}"));
        }
        render_region(
            &mut out,
            SectionTag::Section(candidate.section),
            &candidate.id,
            &header,
            decision,
            &content,
        );
    }

    out.push_str("## Authored sections\n\n");
    for (_, block) in ledger.effective_confirmed() {
        if block.section != SectionTag::FullPacket {
            continue;
        }
        let header = vec![format!(
            "Already decided: {} at {}",
            block.decision,
            block.confirmed_at.to_rfc3339()
        )];
        render_region(
            &mut out,
            SectionTag::FullPacket,
            &block.candidate_id,
            &header,
            ChecklistDecision::Accept,
            &block.content,
        );
    }
    let header = vec![
        "Author sections by hand as an object keyed by section name, then accept.".to_string(),
    ];
    render_region(
        &mut out,
        SectionTag::FullPacket,
        NEW_BLOCK_ID,
        &header,
        ChecklistDecision::Pending,
        &Value::Object(Map::new()),
    );
    out
}

fn render_region(
    out: &mut String,
    tag: SectionTag,
    candidate_id: &str,
    header: &[String],
    decision: ChecklistDecision,
    content: &Value,
) {
    let pretty = serde_json::to_string_pretty(content).unwrap_or_else(|_| content.to_string());
    let _ = writeln!(out, "<!-- ipack:begin section={tag} candidate={candidate_id} -->");
    let _ = writeln!(out, "### {tag} ({candidate_id})\n");
    for line in header {
        let _ = writeln!(out, "{line}  ");
    }
    let _ = writeln!(out, "\ndecision: {}\n", decision.as_str());
    let _ = writeln!(out, "{FENCE}json\n{pretty}\n{FENCE}");
    out.push_str("<!-- ipack:end -->\n\n");
}

/// Region being collected by the parser.
struct OpenRegion {
    line: usize,
    tag: Option<SectionTag>,
    candidate_id: String,
    decision: Option<ChecklistDecision>,
    json: Option<String>,
    in_fence: bool,
    fence_line: usize,
}

/// Parse an edited checklist.
///
/// All problems are collected and returned together, each prefixed with its
/// line number, so a reviewer can fix the whole document in one pass.
pub fn parse_checklist(text: &str) -> Result<Vec<ChecklistEntry>, Vec<String>> {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    let mut open: Option<OpenRegion> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if let Some(region) = open.as_mut() {
            if region.in_fence {
                if line == FENCE {
                    region.in_fence = false;
                } else if let Some(json) = region.json.as_mut() {
                    json.push_str(raw);
                    json.push('\n');
                }
                continue;
            }
        }

        if begin_marker().is_match(line) {
            if let Some(region) = open.take() {
                errors.push(format!(
                    "line {}: region is not closed before the next begin marker on line {line_no}",
                    region.line
                ));
            }
            let captures = begin_marker().captures(line);
            let tag_text = captures
                .as_ref()
                .and_then(|c| c.get(1))
                .map_or("", |m| m.as_str());
            let candidate_id = captures
                .as_ref()
                .and_then(|c| c.get(2))
                .map_or("", |m| m.as_str())
                .to_string();
            let tag = match tag_text.parse::<SectionTag>() {
                Ok(tag) => Some(tag),
                Err(err) => {
                    errors.push(format!("line {line_no}: {err}"));
                    None
                }
            };
            open = Some(OpenRegion {
                line: line_no,
                tag,
                candidate_id,
                decision: None,
                json: None,
                in_fence: false,
                fence_line: 0,
            });
            continue;
        }

        if end_marker().is_match(line) {
            match open.take() {
                Some(region) => {
                    if let Some(entry) = finish_region(region, &mut errors) {
                        entries.push(entry);
                    }
                }
                None => errors.push(format!("line {line_no}: end marker without a begin marker")),
            }
            continue;
        }

        if line.starts_with("<!-- ipack:") {
            errors.push(format!("line {line_no}: malformed region marker {line:?}"));
            continue;
        }

        let Some(region) = open.as_mut() else {
            continue;
        };
        if let Some(value) = line.strip_prefix("decision:") {
            if region.decision.is_some() {
                errors.push(format!("line {line_no}: region has more than one decision line"));
                continue;
            }
            match value.parse() {
                Ok(decision) => region.decision = Some(decision),
                Err(message) => errors.push(format!("line {line_no}: {message}")),
            }
        } else if line.starts_with(FENCE) {
            if region.json.is_some() {
                errors.push(format!("line {line_no}: region has more than one JSON block"));
            }
            region.json = Some(String::new());
            region.in_fence = true;
            region.fence_line = line_no;
        }
    }

    if let Some(region) = open {
        errors.push(format!(
            "line {}: region is missing its end marker",
            region.line
        ));
    }

    if errors.is_empty() {
        Ok(entries)
    } else {
        Err(errors)
    }
}

fn finish_region(region: OpenRegion, errors: &mut Vec<String>) -> Option<ChecklistEntry> {
    let line = region.line;
    if region.in_fence {
        errors.push(format!(
            "line {}: JSON block is not closed",
            region.fence_line
        ));
        return None;
    }
    let Some(decision) = region.decision else {
        errors.push(format!("line {line}: region has no `decision:` line"));
        return None;
    };
    let Some(json) = region.json else {
        errors.push(format!("line {line}: region has no JSON content block"));
        return None;
    };
    let content: Value = match serde_json::from_str(&json) {
        Ok(content) => content,
        Err(err) => {
            errors.push(format!(
                "line {}: content is not valid JSON: {err}",
                region.fence_line
            ));
            return None;
        }
    };
    let tag = region.tag?;

    if decision == ChecklistDecision::Accept {
        let issues = content_issues(tag, &content);
        if !issues.is_empty() {
            errors.extend(issues.into_iter().map(|issue| format!("line {line}: {issue}")));
            return None;
        }
    }
    Some(ChecklistEntry {
        tag,
        candidate_id: region.candidate_id,
        decision,
        content,
        line,
    })
}

/// Structural problems in accepted content, as display lines.
pub(crate) fn content_issues(tag: SectionTag, content: &Value) -> Vec<String> {
    match tag {
        SectionTag::Section(section) => validate_section(section, content)
            .iter()
            .map(ToString::to_string)
            .collect(),
        SectionTag::FullPacket => {
            let Some(object) = content.as_object() else {
                return vec!["full_packet content must be an object keyed by section name".into()];
            };
            if object.is_empty() {
                return vec!["full_packet content is empty".into()];
            }
            let mut issues = Vec::new();
            for (key, value) in object {
                match key.parse::<Section>() {
                    Ok(section) => issues.extend(
                        validate_section(section, value)
                            .iter()
                            .map(ToString::to_string),
                    ),
                    Err(err) => issues.push(err.to_string()),
                }
            }
            issues
        }
    }
}

#[cfg(test)]
#[path = "checklist_tests.rs"]
mod tests;
