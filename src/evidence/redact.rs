//! Best-effort secret masking for extracted snippets.
//!
//! This pass is NOT exhaustive. It masks a fixed set of well-known credential
//! shapes (private key headers, cloud and chat tokens, JWTs, bearer tokens,
//! credentials embedded in URLs, and `secret = "..."` style assignments).
//! Anything else that happens to be sensitive passes through unchanged, which
//! is why raw file contents are never copied into the evidence index.
use anyhow::{Context, Result};
use regex::{Captures, Regex};

struct Rule {
    kind: &'static str,
    regex: Regex,
    /// Keep capture group 1 and mask the rest of the match.
    keep_prefix: bool,
}

/// Snippet text after masking, plus the kinds that fired (one per match).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Masked {
    pub text: String,
    pub kinds: Vec<&'static str>,
}

pub struct Redactor {
    rules: Vec<Rule>,
}

const RULES: [(&str, &str, bool); 8] = [
    ("private_key", r"-----BEGIN [A-Z ]*PRIVATE KEY-----", false),
    ("aws_access_key", r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b", false),
    ("github_token", r"\bgh[pousr]_[A-Za-z0-9]{36,}\b", false),
    ("slack_token", r"\bxox[abprs]-[A-Za-z0-9-]{10,}", false),
    (
        "jwt",
        r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}",
        false,
    ),
    ("bearer", r"(?i)(\bbearer\s+)[A-Za-z0-9\-._~+/]{16,}=*", true),
    ("url_credentials", r"(://)[^/\s:@]+:[^/\s@]+@", true),
    (
        "assignment",
        r#"(?i)(\b[A-Za-z0-9_]*(?:api[_-]?key|secret|token|passwd|password)[A-Za-z0-9_]*["']?\s*[:=]\s*)["'][^"'\s]{4,}["']"#,
        true,
    ),
];

impl Redactor {
    pub fn new() -> Result<Self> {
        let mut rules = Vec::with_capacity(RULES.len());
        for (kind, pattern, keep_prefix) in RULES {
            let regex =
                Regex::new(pattern).with_context(|| format!("compile redaction rule {kind}"))?;
            rules.push(Rule {
                kind,
                regex,
                keep_prefix,
            });
        }
        Ok(Self { rules })
    }

    pub fn mask(&self, text: &str) -> Masked {
        let mut current = text.to_string();
        let mut kinds = Vec::new();
        for rule in &self.rules {
            let hits = rule.regex.find_iter(&current).count();
            if hits == 0 {
                continue;
            }
            kinds.extend(std::iter::repeat(rule.kind).take(hits));
            let replaced = rule.regex.replace_all(&current, |caps: &Captures| {
                let prefix = if rule.keep_prefix {
                    caps.get(1).map(|m| m.as_str()).unwrap_or_default()
                } else {
                    ""
                };
                let suffix = if rule.kind == "url_credentials" { "@" } else { "" };
                let quote = if rule.kind == "assignment" { "\"" } else { "" };
                format!("{prefix}{quote}[REDACTED:{}]{quote}{suffix}", rule.kind)
            });
            current = replaced.into_owned();
        }
        Masked {
            text: current,
            kinds,
        }
    }
}
