use super::*;
use crate::test_support::{packet_for_level, section_content};
use serde_json::json;
use std::path::PathBuf;

#[test]
fn complete_packets_validate_at_their_level() {
    for level in Level::ALL {
        let packet = packet_for_level(level);
        let result = validate(&packet, level);
        assert!(result.valid, "level {level}: {:?}", result.errors);
        assert!(result.errors.is_empty());
    }
}

#[test]
fn missing_level_two_sections_are_gate_errors_with_remediation() {
    let packet = packet_for_level(Level::One);
    let result = validate(&packet, Level::Two);
    assert!(!result.valid);

    let gated: Vec<_> = result.level_gate_errors().map(|issue| issue.path.as_str()).collect();
    assert_eq!(
        gated,
        vec!["$.apiContracts", "$.failureModes", "$.permissions"]
    );
    assert!(result
        .level_gate_errors()
        .all(|issue| issue.remediation.is_some()));

    let permissions = result
        .errors
        .iter()
        .find(|issue| issue.path == "$.permissions" && issue.class == IssueClass::LevelGate)
        .expect("permissions gate issue");
    assert!(permissions
        .remediation
        .as_deref()
        .unwrap_or_default()
        .contains("never inferred"));
}

#[test]
fn structural_errors_are_distinct_from_gate_errors() {
    let mut packet = packet_for_level(Level::One);
    packet["flow"] = json!([{ "step": 0, "actor": "operator" }]);

    let result = validate(&packet, Level::One);
    assert!(!result.valid);
    assert_eq!(result.level_gate_errors().count(), 0);
    let paths: Vec<_> = result.errors.iter().map(|issue| issue.path.as_str()).collect();
    assert_eq!(paths, vec!["$.flow[0].action", "$.flow[0].step"]);
    assert!(result
        .errors
        .iter()
        .all(|issue| issue.class == IssueClass::Structural));
}

#[test]
fn unknown_top_level_fields_are_permitted() {
    let mut packet = packet_for_level(Level::One);
    packet["x-roadmap"] = json!({"quarter": "Q3"});
    packet["packaging"] = json!({"toolVersion": "0.1.0"});
    assert!(validate(&packet, Level::One).valid);
}

#[test]
fn level_mismatch_is_a_warning_only() {
    let packet = packet_for_level(Level::Two);
    let result = validate(&packet, Level::One);
    assert!(result.valid);
    assert_eq!(result.warning_count(), 1);
    assert_eq!(result.errors[0].path, "$.level");
}

#[test]
fn sections_above_the_declared_level_are_still_checked() {
    let mut packet = packet_for_level(Level::One);
    packet["auditEvents"] = json!([{ "event": "login", "severity": "loud" }]);
    let result = validate(&packet, Level::One);
    assert!(!result.valid);
    assert_eq!(result.errors[0].path, "$.auditEvents[0].severity");
}

#[test]
fn ordering_is_stable_across_runs() {
    let packet = json!({ "level": 9, "flow": "nope", "purpose": [] });
    let first = validate(&packet, Level::Three);
    let second = validate(&packet, Level::Three);
    assert_eq!(first, second);
    let classes: Vec<_> = first.errors.iter().map(|issue| issue.class).collect();
    let mut sorted = classes.clone();
    sorted.sort();
    assert_eq!(classes, sorted);
}

#[test]
fn non_object_documents_fail_structurally() {
    let result = validate(&json!(["not", "a", "packet"]), Level::One);
    assert!(!result.valid);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "$");
}

#[test]
fn validate_section_checks_candidate_content() {
    assert!(validate_section(Section::Nfrs, &section_content(Section::Nfrs)).is_empty());
    let issues = validate_section(Section::ApiContracts, &json!([{ "endpoint": "jobs", "method": "FETCH" }]));
    let paths: Vec<_> = issues.iter().map(|issue| issue.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["$.apiContracts[0].endpoint", "$.apiContracts[0].method"]
    );
}

#[test]
fn unparsable_input_is_an_io_class_failure() {
    let err = parse_document("{ not json", &PathBuf::from("packet.json"), Stage::Validate)
        .expect_err("unparsable");
    assert!(matches!(err, PipelineError::Unparsable { .. }));

    let missing = load_document(&PathBuf::from("/nonexistent/packet.json"), Stage::Validate)
        .expect_err("missing");
    assert!(matches!(missing, PipelineError::Io { .. }));
}

#[test]
fn yaml_documents_are_parsed_by_extension() {
    let text = "schemaVersion: \"1\"\npacketId: job-status\ntitle: Job status\nlevel: 1\n";
    let value = parse_document(text, &PathBuf::from("packet.yaml"), Stage::Validate)
        .expect("parse yaml");
    assert_eq!(value["packetId"], "job-status");
}
