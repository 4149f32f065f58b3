//! Prompt assembly for discovery attempts.
use crate::evidence::EvidenceIndex;
use crate::sections::{Level, Section};
use crate::util::truncate_string;
use serde_json::json;

const DISCOVERY_BASE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/discovery_base.md"
));
const DISCOVERY_RETRY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/discovery_retry.md"
));

const PREVIOUS_RESPONSE_MAX_BYTES: usize = 1000;

/// Sections the provider is asked to draft at `level`.
pub(crate) fn draftable_sections(level: Level) -> Vec<Section> {
    level
        .required_sections()
        .into_iter()
        .filter(|section| !section.is_security_sensitive())
        .collect()
}

/// First-attempt prompt. Only the evidence index is rendered; raw source is
/// never read here.
pub(crate) fn build_prompt(evidence: &EvidenceIndex, level: Level) -> String {
    let sections = draftable_sections(level);
    let names = sections
        .iter()
        .map(|section| format!("`{section}`"))
        .collect::<Vec<_>>()
        .join(", ");
    let shapes = sections
        .iter()
        .map(|section| format!("- `{section}`: {}", section_shape(*section)))
        .collect::<Vec<_>>()
        .join("\n");

    DISCOVERY_BASE
        .replace("{target_level}", &level.to_string())
        .replace("{sections}", &names)
        .replace("{section_shapes}", &shapes)
        .replace("{evidence}", &render_evidence(evidence))
}

/// Prompt for attempt `attempt + 1`, carrying every error seen so far.
pub(crate) fn build_retry_prompt(
    base: &str,
    attempt: u32,
    errors: &[String],
    previous_response: Option<&str>,
) -> String {
    let errors = errors
        .iter()
        .map(|error| format!("- {error}"))
        .collect::<Vec<_>>()
        .join("\n");
    let previous = match previous_response {
        Some(text) if text.len() > PREVIOUS_RESPONSE_MAX_BYTES => format!(
            "{}...(truncated)",
            truncate_string(text, PREVIOUS_RESPONSE_MAX_BYTES)
        ),
        Some(text) => text.to_string(),
        None => "(no response)".to_string(),
    };
    let feedback = DISCOVERY_RETRY
        .replace("{attempt}", &attempt.to_string())
        .replace("{errors}", &errors)
        .replace("{previous_response}", &previous);
    format!("{base}\n{feedback}")
}

fn section_shape(section: Section) -> &'static str {
    match section {
        Section::Purpose => r#"{"problem": str, "solution": str, "value"?: str}"#,
        Section::Flow => r#"[{"step": int >= 1, "actor": str, "action": str}]"#,
        Section::DataContracts => {
            r#"{"inputs"?: [entity], "outputs"?: [entity]} where entity = {"name": str, "fields": [{"name": str, "type": str, "required"?: bool}]}"#
        }
        Section::ApiContracts => {
            r#"[{"endpoint": str, "method": "GET"|"POST"|"PUT"|"PATCH"|"DELETE", "purpose"?: str}]"#
        }
        Section::FailureModes => r#"[{"scenario": str, "impact": str, "handling": str}]"#,
        Section::Nfrs => r#"{"<category>": str, ...} (at least one entry)"#,
        Section::AcceptanceTests => {
            r#"[{"title": str, "given": str, "when": str, "then": str}]"#
        }
        Section::Permissions | Section::Tenancy | Section::AuditEvents => "authored by a human",
    }
}

fn render_evidence(evidence: &EvidenceIndex) -> String {
    let body = &evidence.body;
    let files: Vec<_> = body
        .files
        .iter()
        .map(|file| {
            json!({
                "path": file.path,
                "size": file.size,
                "facts": file.extracted_facts,
            })
        })
        .collect();
    let rendered = json!({
        "files": files,
        "dependencies": body.dependencies,
        "routes": body.routes,
        "authSignals": body.auth_signals,
    });
    serde_json::to_string_pretty(&rendered).unwrap_or_else(|_| rendered.to_string())
}
