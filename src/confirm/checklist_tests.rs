use super::*;
use crate::confirm::ledger::{ConfirmedBlock, Decision, CONFIRMED_SOURCE, LEDGER_SCHEMA_VERSION};
use crate::test_support::{candidate_document, section_content};
use chrono::DateTime;
use serde_json::json;

fn region(tag: &str, id: &str, decision: &str, json: &str) -> String {
    format!(
        "<!-- ipack:begin section={tag} candidate={id} -->\n\
         decision: {decision}\n\
         ```json\n{json}\n```\n\
         <!-- ipack:end -->\n"
    )
}

#[test]
fn rendered_checklist_parses_back_as_pending() {
    let document = candidate_document(&[Section::Purpose, Section::Flow]);
    let text = render_checklist(&document, &Ledger::default());
    assert!(text.contains("## Open questions"));
    assert!(text.contains("`permissions` was proposed by inference"));

    let entries = parse_checklist(&text).expect("parse rendered checklist");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].tag, SectionTag::Section(Section::Purpose));
    assert_eq!(entries[0].candidate_id, document.candidates[0].id);
    assert_eq!(entries[0].decision, ChecklistDecision::Pending);
    assert_eq!(entries[0].content, section_content(Section::Purpose));
    assert_eq!(entries[2].tag, SectionTag::FullPacket);
    assert_eq!(entries[2].candidate_id, NEW_BLOCK_ID);
    assert_eq!(entries[2].content, json!({}));
}

#[test]
fn edited_decisions_are_read_back() {
    let document = candidate_document(&[Section::Purpose, Section::Flow]);
    let text = render_checklist(&document, &Ledger::default())
        .replacen("decision: pending", "decision: accept", 1)
        .replacen("decision: pending", "decision: Reject", 1);
    let entries = parse_checklist(&text).expect("parse");
    assert_eq!(entries[0].decision, ChecklistDecision::Accept);
    assert_eq!(entries[1].decision, ChecklistDecision::Reject);
    assert_eq!(entries[2].decision, ChecklistDecision::Pending);
}

#[test]
fn unrecognized_section_tag_fails_with_unknown_section_type() {
    let text = region("roadmap", "abc", "accept", "{}");
    let errors = parse_checklist(&text).expect_err("unknown tag");
    assert_eq!(errors, vec!["line 1: unknown section type \"roadmap\"".to_string()]);
}

#[test]
fn every_problem_in_the_document_is_reported() {
    let text = [
        "<!-- ipack:begin section=purpose candidate=a -->",
        "```json",
        "{}",
        "```",
        "<!-- ipack:end -->",
        "<!-- ipack:begin section=flow candidate=b -->",
        "decision: accept",
        "```json",
        "[not json",
        "```",
        "<!-- ipack:end -->",
        "<!-- ipack:end -->",
        "<!-- ipack:begin section=nfrs candidate=c -->",
        "decision: maybe",
    ]
    .join("\n");
    let errors = parse_checklist(&text).expect_err("broken document");
    let expect = [
        "line 1: region has no `decision:` line",
        "line 8: content is not valid JSON",
        "line 12: end marker without a begin marker",
        "line 14: unknown decision \"maybe\"",
        "line 13: region is missing its end marker",
    ];
    assert_eq!(errors.len(), expect.len(), "{errors:#?}");
    for prefix in expect {
        assert!(
            errors.iter().any(|error| error.starts_with(prefix)),
            "missing {prefix:?} in {errors:#?}"
        );
    }
}

#[test]
fn nested_begin_marker_is_an_error() {
    let text = [
        "<!-- ipack:begin section=purpose candidate=a -->",
        "decision: pending",
        "<!-- ipack:begin section=flow candidate=b -->",
        "decision: pending",
        "```json",
        "[]",
        "```",
        "<!-- ipack:end -->",
    ]
    .join("\n");
    let errors = parse_checklist(&text).expect_err("nested");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("line 1: region is not closed"));
}

#[test]
fn accepted_content_must_pass_section_validation() {
    let text = region("purpose", "a", "accept", r#"{"problem": "slow reports"}"#);
    let errors = parse_checklist(&text).expect_err("invalid content");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("$.purpose.solution"), "{errors:?}");

    // rejected or pending content is not validated
    let text = region("purpose", "a", "reject", r#"{"problem": "slow reports"}"#);
    assert!(parse_checklist(&text).is_ok());
}

#[test]
fn full_packet_region_checks_each_keyed_section() {
    let good = json!({
        "permissions": section_content(Section::Permissions),
        "tenancy": section_content(Section::Tenancy),
    });
    let entries = parse_checklist(&region(
        "full_packet",
        NEW_BLOCK_ID,
        "accept",
        &good.to_string(),
    ))
    .expect("valid full packet");
    assert_eq!(entries[0].tag, SectionTag::FullPacket);
    assert_eq!(entries[0].content, good);

    let bad = json!({"roadmap": [], "tenancy": {"model": "pooled"}});
    let errors = parse_checklist(&region(
        "full_packet",
        NEW_BLOCK_ID,
        "accept",
        &bad.to_string(),
    ))
    .expect_err("bad full packet");
    assert!(errors
        .iter()
        .any(|error| error.contains("unknown section type \"roadmap\"")));
    assert!(errors.iter().any(|error| error.contains("$.tenancy.isolation")));

    let errors = parse_checklist(&region("full_packet", NEW_BLOCK_ID, "accept", "{}"))
        .expect_err("empty full packet");
    assert!(errors[0].contains("full_packet content is empty"));
}

#[test]
fn decided_candidates_render_with_their_prior_decision() {
    let document = candidate_document(&[Section::Purpose]);
    let candidate = &document.candidates[0];
    let edited = json!({"problem": "edited problem", "solution": "edited solution"});
    let mut ledger = Ledger::default();
    ledger.confirmed.push(ConfirmedBlock {
        schema_version: LEDGER_SCHEMA_VERSION,
        candidate_id: candidate.id.clone(),
        section: candidate.section.into(),
        source: CONFIRMED_SOURCE.to_string(),
        decision: Decision::EditedAccepted,
        confirmed_at: DateTime::from_timestamp(1_700_000_100, 0).expect("timestamp"),
        confirmed_by: "reviewer".to_string(),
        original_confidence: Some(candidate.confidence),
        evidence_refs: candidate.evidence_refs.clone(),
        content: edited.clone(),
        candidates_digest: None,
    });

    let text = render_checklist(&document, &ledger);
    assert!(text.contains("Already decided: edited-accepted at"));
    let entries = parse_checklist(&text).expect("parse");
    assert_eq!(entries[0].decision, ChecklistDecision::Accept);
    assert_eq!(entries[0].content, edited);
}
