//! Line-oriented interactive review.
//!
//! Candidates are presented one at a time. Input and output are generic so
//! the session can be driven by a terminal or by a test script.
use super::checklist::content_issues;
use super::{
    acceptance_for, confirmed_from_candidate, rejected_from_candidate, ConfirmReport,
    DecisionNote, Ledger, ReviewContext,
};
use crate::confirm::Decision;
use crate::discovery::{Candidate, CandidateDocument};
use crate::util::Cancellation;
use crate::workspace::WorkspacePaths;
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, Write};

const CHOICES: &str = "[a]ccept, [r]eject, [e]dit then accept, [s]kip, [q]uit > ";

enum Choice {
    Decided(DecisionNote),
    Skip,
    Quit,
}

/// Review every undecided candidate in `document`.
///
/// `s` leaves a candidate pending; `q` or end of input stops the session
/// with every decision made so far already recorded.
pub fn review_interactive<R: BufRead, W: Write>(
    paths: &WorkspacePaths,
    document: &CandidateDocument,
    ledger: &mut Ledger,
    ctx: &ReviewContext,
    cancel: &Cancellation,
    input: &mut R,
    output: &mut W,
) -> Result<ConfirmReport> {
    let digest = document.digest();
    let total = document.candidates.len();
    let mut report = ConfirmReport::default();

    for (index, candidate) in document.candidates.iter().enumerate() {
        if cancel.is_cancelled() {
            report.stopped = true;
            break;
        }
        if let Some(state) = ledger.effective(&candidate.id) {
            writeln!(
                output,
                "[{}/{total}] {} {}: already {}",
                index + 1,
                candidate.section,
                candidate.id,
                state.decision
            )
            .context("write review output")?;
            report.already_decided.push(DecisionNote {
                candidate_id: candidate.id.clone(),
                section: candidate.section.into(),
                decision: state.decision,
            });
            continue;
        }

        present(output, candidate, index + 1, total)?;
        match ask(paths, ledger, ctx, &digest, candidate, input, output)? {
            Choice::Decided(note) => report.recorded.push(note),
            Choice::Skip => {}
            Choice::Quit => {
                report.stopped = true;
                break;
            }
        }
    }
    output.flush().context("flush review output")?;
    Ok(report.finish(document, ledger))
}

fn present<W: Write>(output: &mut W, candidate: &Candidate, position: usize, total: usize) -> Result<()> {
    let pretty = serde_json::to_string_pretty(&candidate.content)
        .unwrap_or_else(|_| candidate.content.to_string());
    writeln!(
        output,
        "\n[{position}/{total}] {} ({})  confidence {:.2}\nevidence: {}\n{pretty}",
        candidate.section,
        candidate.id,
        candidate.confidence,
        candidate.evidence_refs.join(", ")
    )
    .context("write review output")
}

fn ask<R: BufRead, W: Write>(
    paths: &WorkspacePaths,
    ledger: &mut Ledger,
    ctx: &ReviewContext,
    digest: &str,
    candidate: &Candidate,
    input: &mut R,
    output: &mut W,
) -> Result<Choice> {
    loop {
        write!(output, "{CHOICES}").context("write review prompt")?;
        output.flush().context("flush review prompt")?;
        let Some(line) = read_line(input)? else {
            return Ok(Choice::Quit);
        };
        match line.trim().to_ascii_lowercase().as_str() {
            "a" | "accept" => {
                let block = confirmed_from_candidate(
                    candidate,
                    Decision::Accepted,
                    candidate.content.clone(),
                    ctx,
                    digest,
                );
                ledger.append_confirmed(paths, block)?;
                return Ok(Choice::Decided(note(candidate, Decision::Accepted)));
            }
            "r" | "reject" => {
                ledger.append_rejected(paths, rejected_from_candidate(candidate, ctx, digest))?;
                return Ok(Choice::Decided(note(candidate, Decision::Rejected)));
            }
            "e" | "edit" => {
                let Some(content) = read_edit(candidate, input, output)? else {
                    continue;
                };
                let decision = acceptance_for(candidate, &content);
                let block = confirmed_from_candidate(candidate, decision, content, ctx, digest);
                ledger.append_confirmed(paths, block)?;
                return Ok(Choice::Decided(note(candidate, decision)));
            }
            "s" | "skip" => return Ok(Choice::Skip),
            "q" | "quit" => return Ok(Choice::Quit),
            other => {
                writeln!(output, "unrecognized choice {other:?}").context("write review output")?;
            }
        }
    }
}

/// Read replacement content; `None` sends the reviewer back to the prompt.
fn read_edit<R: BufRead, W: Write>(
    candidate: &Candidate,
    input: &mut R,
    output: &mut W,
) -> Result<Option<Value>> {
    writeln!(output, "enter replacement JSON, end with an empty line:")
        .context("write review output")?;
    let mut text = String::new();
    while let Some(line) = read_line(input)? {
        if line.trim().is_empty() {
            break;
        }
        text.push_str(&line);
        text.push('\n');
    }
    let content: Value = match serde_json::from_str(&text) {
        Ok(content) => content,
        Err(err) => {
            writeln!(output, "invalid JSON: {err}").context("write review output")?;
            return Ok(None);
        }
    };
    let issues = content_issues(candidate.section.into(), &content);
    if !issues.is_empty() {
        for issue in issues {
            writeln!(output, "  {issue}").context("write review output")?;
        }
        return Ok(None);
    }
    Ok(Some(content))
}

fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let read = input.read_line(&mut line).context("read review input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn note(candidate: &Candidate, decision: Decision) -> DecisionNote {
    DecisionNote {
        candidate_id: candidate.id.clone(),
        section: candidate.section.into(),
        decision,
    }
}
