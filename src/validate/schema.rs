//! Structural rules for the packet document and each section.
use super::{ValidationIssue, PACKET_SCHEMA_VERSION};
use crate::sections::{Level, Section};
use serde_json::{Map, Value};

const HTTP_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];
const AUDIT_SEVERITIES: [&str; 5] = ["debug", "info", "warn", "error", "critical"];

pub(super) fn check_document(document: &Value, declared: Level, issues: &mut Vec<ValidationIssue>) {
    let Some(obj) = document.as_object() else {
        issues.push(ValidationIssue::structural("$", "packet must be an object"));
        return;
    };

    match obj.get("schemaVersion") {
        None => issues.push(missing("$", "schemaVersion")),
        Some(Value::String(version)) if version == PACKET_SCHEMA_VERSION => {}
        Some(Value::String(version)) => issues.push(ValidationIssue::structural(
            "$.schemaVersion",
            format!("unsupported schemaVersion {version:?} (expected {PACKET_SCHEMA_VERSION:?})"),
        )),
        Some(_) => issues.push(ValidationIssue::structural(
            "$.schemaVersion",
            "must be a string",
        )),
    }

    match obj.get("packetId") {
        None => issues.push(missing("$", "packetId")),
        Some(Value::String(id)) if is_kebab_id(id) => {}
        Some(_) => issues.push(ValidationIssue::structural(
            "$.packetId",
            "must be a lowercase kebab-case identifier",
        )),
    }

    require_str(obj, "title", "$", issues);

    match obj.get("level") {
        None => issues.push(missing("$", "level")),
        Some(value) => match value.as_u64().and_then(|n| u8::try_from(n).ok()) {
            Some(number) => match Level::try_from(number) {
                Ok(level) if level != declared => issues.push(ValidationIssue::warning(
                    "$.level",
                    format!("document declares level {level} but level {declared} was requested"),
                )),
                Ok(_) => {}
                Err(message) => issues.push(ValidationIssue::structural("$.level", message)),
            },
            None => issues.push(ValidationIssue::structural(
                "$.level",
                "must be an integer 1, 2, or 3",
            )),
        },
    }

    for section in Section::ALL {
        if let Some(content) = obj.get(section.as_str()) {
            check_section(section, content, &format!("$.{section}"), issues);
        }
    }

    if let Some(questions) = obj.get("openQuestions") {
        check_open_questions(questions, issues);
    }
}

pub(super) fn check_section(
    section: Section,
    content: &Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    match section {
        Section::Purpose => {
            if let Some(obj) = expect_object(content, path, issues) {
                require_str(obj, "problem", path, issues);
                require_str(obj, "solution", path, issues);
                optional_str(obj, "value", path, issues);
            }
        }
        Section::Flow => {
            for_each_entry(content, path, issues, |obj, entry_path, issues| {
                match obj.get("step") {
                    None => issues.push(missing(entry_path, "step")),
                    Some(step) if step.as_u64().is_some_and(|n| n >= 1) => {}
                    Some(_) => issues.push(ValidationIssue::structural(
                        format!("{entry_path}.step"),
                        "must be an integer >= 1",
                    )),
                }
                require_str(obj, "actor", entry_path, issues);
                require_str(obj, "action", entry_path, issues);
            });
        }
        Section::DataContracts => {
            if let Some(obj) = expect_object(content, path, issues) {
                if !obj.contains_key("inputs") && !obj.contains_key("outputs") {
                    issues.push(ValidationIssue::structural(
                        path,
                        "must declare at least one of inputs or outputs",
                    ));
                }
                for key in ["inputs", "outputs"] {
                    if let Some(entities) = obj.get(key) {
                        let entities_path = format!("{path}.{key}");
                        for_each_entry(entities, &entities_path, issues, check_entity);
                    }
                }
            }
        }
        Section::ApiContracts => {
            for_each_entry(content, path, issues, |obj, entry_path, issues| {
                if let Some(endpoint) = require_str(obj, "endpoint", entry_path, issues) {
                    if !endpoint.starts_with('/') {
                        issues.push(ValidationIssue::structural(
                            format!("{entry_path}.endpoint"),
                            "must start with '/'",
                        ));
                    }
                }
                require_enum(obj, "method", &HTTP_METHODS, entry_path, issues);
                optional_str(obj, "purpose", entry_path, issues);
            });
        }
        Section::Permissions => {
            for_each_entry(content, path, issues, |obj, entry_path, issues| {
                require_str(obj, "action", entry_path, issues);
                let roles_path = format!("{entry_path}.requiredRoles");
                match obj.get("requiredRoles") {
                    None => issues.push(missing(entry_path, "requiredRoles")),
                    Some(Value::Array(roles)) if !roles.is_empty() => {
                        for (idx, role) in roles.iter().enumerate() {
                            if !role.as_str().is_some_and(|r| !r.trim().is_empty()) {
                                issues.push(ValidationIssue::structural(
                                    format!("{roles_path}[{idx}]"),
                                    "must be a non-empty string",
                                ));
                            }
                        }
                    }
                    Some(_) => issues.push(ValidationIssue::structural(
                        roles_path,
                        "must be a non-empty array of role names",
                    )),
                }
                optional_str(obj, "description", entry_path, issues);
            });
        }
        Section::Tenancy => {
            if let Some(obj) = expect_object(content, path, issues) {
                require_str(obj, "model", path, issues);
                require_str(obj, "isolation", path, issues);
            }
        }
        Section::FailureModes => {
            for_each_entry(content, path, issues, |obj, entry_path, issues| {
                require_str(obj, "scenario", entry_path, issues);
                require_str(obj, "impact", entry_path, issues);
                require_str(obj, "handling", entry_path, issues);
            });
        }
        Section::AuditEvents => {
            for_each_entry(content, path, issues, |obj, entry_path, issues| {
                require_str(obj, "event", entry_path, issues);
                require_enum(obj, "severity", &AUDIT_SEVERITIES, entry_path, issues);
            });
        }
        Section::Nfrs => {
            if let Some(obj) = expect_object(content, path, issues) {
                if obj.is_empty() {
                    issues.push(ValidationIssue::structural(
                        path,
                        "must declare at least one requirement",
                    ));
                }
            }
        }
        Section::AcceptanceTests => {
            for_each_entry(content, path, issues, |obj, entry_path, issues| {
                for key in ["title", "given", "when", "then"] {
                    require_str(obj, key, entry_path, issues);
                }
            });
        }
    }
}

fn check_entity(obj: &Map<String, Value>, path: &str, issues: &mut Vec<ValidationIssue>) {
    require_str(obj, "name", path, issues);
    match obj.get("fields") {
        None => issues.push(missing(path, "fields")),
        Some(fields) => {
            let fields_path = format!("{path}.fields");
            for_each_entry(fields, &fields_path, issues, |field, field_path, issues| {
                require_str(field, "name", field_path, issues);
                require_str(field, "type", field_path, issues);
                if let Some(required) = field.get("required") {
                    if !required.is_boolean() {
                        issues.push(ValidationIssue::structural(
                            format!("{field_path}.required"),
                            "must be a boolean",
                        ));
                    }
                }
            });
        }
    }
}

fn check_open_questions(questions: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(entries) = questions.as_array() else {
        issues.push(ValidationIssue::structural(
            "$.openQuestions",
            "must be an array",
        ));
        return;
    };
    for (idx, entry) in entries.iter().enumerate() {
        let entry_path = format!("$.openQuestions[{idx}]");
        match entry {
            Value::String(text) if !text.trim().is_empty() => {}
            Value::Object(obj) => {
                require_str(obj, "question", &entry_path, issues);
                if let Some(section) = obj.get("section") {
                    let known = section
                        .as_str()
                        .is_some_and(|name| name.parse::<Section>().is_ok());
                    if !known {
                        issues.push(ValidationIssue::structural(
                            format!("{entry_path}.section"),
                            "must name a known section",
                        ));
                    }
                }
            }
            _ => issues.push(ValidationIssue::structural(
                entry_path,
                "must be a question string or an object with a question",
            )),
        }
    }
}

/// Visit each object entry of a required non-empty array.
fn for_each_entry<F>(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>, mut visit: F)
where
    F: FnMut(&Map<String, Value>, &str, &mut Vec<ValidationIssue>),
{
    let Some(entries) = value.as_array() else {
        issues.push(ValidationIssue::structural(path, "must be an array"));
        return;
    };
    if entries.is_empty() {
        issues.push(ValidationIssue::structural(
            path,
            "must contain at least one entry",
        ));
        return;
    }
    for (idx, entry) in entries.iter().enumerate() {
        let entry_path = format!("{path}[{idx}]");
        match entry.as_object() {
            Some(obj) => visit(obj, &entry_path, issues),
            None => issues.push(ValidationIssue::structural(entry_path, "must be an object")),
        }
    }
}

fn expect_object<'a>(
    value: &'a Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'a Map<String, Value>> {
    let obj = value.as_object();
    if obj.is_none() {
        issues.push(ValidationIssue::structural(path, "must be an object"));
    }
    obj
}

fn require_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'a str> {
    match obj.get(key) {
        None => {
            issues.push(missing(path, key));
            None
        }
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.as_str()),
        Some(_) => {
            issues.push(ValidationIssue::structural(
                format!("{path}.{key}"),
                "must be a non-empty string",
            ));
            None
        }
    }
}

fn optional_str(obj: &Map<String, Value>, key: &str, path: &str, issues: &mut Vec<ValidationIssue>) {
    if let Some(value) = obj.get(key) {
        if !value.is_string() {
            issues.push(ValidationIssue::structural(
                format!("{path}.{key}"),
                "must be a string",
            ));
        }
    }
}

fn require_enum(
    obj: &Map<String, Value>,
    key: &str,
    allowed: &[&str],
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    match obj.get(key) {
        None => issues.push(missing(path, key)),
        Some(Value::String(value)) if allowed.contains(&value.as_str()) => {}
        Some(_) => issues.push(ValidationIssue::structural(
            format!("{path}.{key}"),
            format!("must be one of {}", allowed.join(", ")),
        )),
    }
}

fn missing(path: &str, key: &str) -> ValidationIssue {
    ValidationIssue::structural(format!("{path}.{key}"), "required field is missing")
}

fn is_kebab_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .split('-')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()))
}
