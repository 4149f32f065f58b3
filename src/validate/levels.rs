//! Nested level gates.
use super::{IssueClass, Severity, ValidationIssue};
use crate::sections::{Level, Section};
use serde_json::Value;

pub(super) fn check_gates(document: &Value, declared: Level, issues: &mut Vec<ValidationIssue>) {
    for section in declared.required_sections() {
        if !section_present(document, section) {
            issues.push(gate_issue(section, declared));
        }
    }
}

fn section_present(document: &Value, section: Section) -> bool {
    match document.get(section.as_str()) {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

fn gate_issue(section: Section, declared: Level) -> ValidationIssue {
    let introduced = section.required_from().unwrap_or(declared);
    let remediation = if section.is_security_sensitive() {
        format!("author `{section}` by hand in the checklist full_packet region; it is never inferred")
    } else {
        match introduced {
            Level::One => format!("add a confirmed `{section}` block; every level requires it"),
            Level::Two => format!("add a confirmed `{section}` block, or declare level 1"),
            Level::Three => format!("add a confirmed `{section}` block, or declare level 2"),
        }
    };
    ValidationIssue {
        path: format!("$.{section}"),
        message: format!(
            "level {declared} requires section `{section}` (introduced at level {introduced})"
        ),
        severity: Severity::Error,
        class: IssueClass::LevelGate,
        remediation: Some(remediation),
    }
}
