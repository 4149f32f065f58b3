//! Canonical compiler: merge confirmed blocks into one validated packet.
//!
//! Only blocks whose effective decision is an acceptance contribute. Blocks
//! tagged `full_packet` are expanded into one contribution per section
//! before the merge. Each section keeps the contribution with the latest
//! `confirmedAt`; equal timestamps go to the later ledger position.
use crate::confirm::{ConfirmedBlock, Ledger, CONFIRMED_SOURCE};
use crate::discovery::OpenQuestion;
use crate::error::{PipelineError, Stage};
use crate::sections::{Level, Section, SectionTag};
use crate::validate::{validate, ValidationResult, PACKET_SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

mod export;

pub use export::{export, ExportFormat, ExportOptions, WrittenArtifact};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub packet_id: String,
    pub title: String,
    pub level: Level,
    /// Attached as `openQuestions`, minus those whose section was confirmed.
    pub open_questions: Vec<OpenQuestion>,
}

/// Where a section's content came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSource {
    pub section: Section,
    pub candidate_id: String,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Supersession {
    pub section: Section,
    pub superseded: String,
    pub superseded_at: DateTime<Utc>,
    pub winner: String,
    pub winner_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BuiltPacket {
    pub packet: Value,
    pub sources: Vec<SectionSource>,
    pub superseded: Vec<Supersession>,
    pub validation: ValidationResult,
}

/// One section's worth of confirmed content.
#[derive(Debug, Clone)]
struct Contribution {
    section: Section,
    candidate_id: String,
    confirmed_at: DateTime<Utc>,
    content: Value,
}

/// Build the canonical packet from the effective confirmed blocks.
///
/// Never returns a packet that fails validation at `options.level`.
pub fn build(ledger: &Ledger, options: &BuildOptions) -> Result<BuiltPacket, PipelineError> {
    let mut contributions = Vec::new();
    for (_, block) in ledger.effective_confirmed() {
        expand(block, &mut contributions)?;
    }

    let mut merged: BTreeMap<Section, Contribution> = BTreeMap::new();
    let mut superseded = Vec::new();
    for contribution in contributions {
        match merged.get(&contribution.section) {
            // later position wins ties; contributions arrive in position order
            Some(current) if contribution.confirmed_at < current.confirmed_at => {
                superseded.push(supersession(&contribution, current));
            }
            Some(current) => {
                superseded.push(supersession(current, &contribution));
                merged.insert(contribution.section, contribution);
            }
            None => {
                merged.insert(contribution.section, contribution);
            }
        }
    }
    for entry in &superseded {
        tracing::info!(
            section = %entry.section,
            superseded = %entry.superseded,
            superseded_at = %entry.superseded_at.to_rfc3339(),
            winner = %entry.winner,
            winner_at = %entry.winner_at.to_rfc3339(),
            "confirmed block superseded"
        );
    }

    let mut packet = Map::new();
    packet.insert("schemaVersion".into(), json!(PACKET_SCHEMA_VERSION));
    packet.insert("packetId".into(), json!(options.packet_id));
    packet.insert("title".into(), json!(options.title));
    packet.insert("level".into(), json!(options.level.number()));
    let mut sources = Vec::new();
    for (section, contribution) in merged {
        sources.push(SectionSource {
            section,
            candidate_id: contribution.candidate_id,
            confirmed_at: contribution.confirmed_at,
        });
        packet.insert(section.as_str().to_string(), contribution.content);
    }

    let questions: Vec<&OpenQuestion> = options
        .open_questions
        .iter()
        .filter(|question| {
            question
                .section
                .is_none_or(|section| !packet.contains_key(section.as_str()))
        })
        .collect();
    if !questions.is_empty() {
        packet.insert("openQuestions".into(), json!(questions));
    }

    let packet = Value::Object(packet);
    let validation = validate(&packet, options.level);
    if !validation.valid {
        return Err(PipelineError::Invalid {
            stage: Stage::Compile,
            result: validation,
        });
    }
    tracing::info!(
        packet_id = %options.packet_id,
        level = %options.level,
        sections = sources.len(),
        superseded = superseded.len(),
        warnings = validation.warning_count(),
        "packet built"
    );
    Ok(BuiltPacket {
        packet,
        sources,
        superseded,
        validation,
    })
}

fn expand(
    block: &ConfirmedBlock,
    out: &mut Vec<Contribution>,
) -> Result<(), PipelineError> {
    if block.source != CONFIRMED_SOURCE {
        return Err(PipelineError::Provenance {
            stage: Stage::Compile,
            message: format!(
                "confirmed block {} carries source {:?}; only {CONFIRMED_SOURCE:?} blocks are compiled",
                block.candidate_id, block.source
            ),
        });
    }
    let contribution = |section: Section, content: &Value| Contribution {
        section,
        candidate_id: block.candidate_id.clone(),
        confirmed_at: block.confirmed_at,
        content: content.clone(),
    };
    match block.section {
        SectionTag::Section(section) => out.push(contribution(section, &block.content)),
        SectionTag::FullPacket => {
            let Some(object) = block.content.as_object() else {
                return Err(PipelineError::Provenance {
                    stage: Stage::Compile,
                    message: format!(
                        "full_packet block {} must hold an object keyed by section",
                        block.candidate_id
                    ),
                });
            };
            for (key, content) in object {
                let section = key.parse::<Section>().map_err(|err| PipelineError::Provenance {
                    stage: Stage::Compile,
                    message: format!("full_packet block {}: {err}", block.candidate_id),
                })?;
                out.push(contribution(section, content));
            }
        }
    }
    Ok(())
}

fn supersession(loser: &Contribution, winner: &Contribution) -> Supersession {
    Supersession {
        section: loser.section,
        superseded: loser.candidate_id.clone(),
        superseded_at: loser.confirmed_at,
        winner: winner.candidate_id.clone(),
        winner_at: winner.confirmed_at,
    }
}

#[cfg(test)]
#[path = "compile_tests.rs"]
mod tests;
