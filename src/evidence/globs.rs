//! Include/exclude patterns over `/`-separated relative paths.
//!
//! Matching is `glob::Pattern` with literal separators, so `*`, `?` and
//! `[...]` never cross a `/` while `**` spans directories. `{a,b}`
//! alternatives are expanded before compiling. A pattern without a `/`
//! matches the file name at any depth.
use anyhow::{anyhow, Context, Result};
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct GlobSet {
    patterns: Vec<String>,
    compiled: Vec<Pattern>,
    /// Directory parts of `<dir>/**` patterns. A directory matching one of
    /// these has its whole subtree excluded.
    subtrees: Vec<Pattern>,
}

impl GlobSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::new();
        let mut subtrees = Vec::new();
        for pattern in patterns {
            let anchored = anchor(pattern)?;
            let expanded =
                expand_braces(&anchored).with_context(|| format!("expand glob {pattern:?}"))?;
            for source in expanded {
                compiled.push(
                    Pattern::new(&source).with_context(|| format!("compile glob {pattern:?}"))?,
                );
                let subtree = if source == "**" {
                    Some("**")
                } else {
                    source.strip_suffix("/**")
                };
                if let Some(dir) = subtree {
                    subtrees.push(
                        Pattern::new(dir).with_context(|| format!("compile glob {pattern:?}"))?,
                    );
                }
            }
        }
        Ok(Self {
            patterns: patterns.to_vec(),
            compiled,
            subtrees,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Match a `/`-separated path relative to the scan root.
    pub fn is_match(&self, rel_path: &str) -> bool {
        self.compiled
            .iter()
            .any(|pattern| pattern.matches_with(rel_path, MATCH_OPTIONS))
    }

    /// True when some `<dir>/**` pattern covers `rel_dir`, so every path
    /// below it matches and the walk can prune the directory.
    pub fn covers_dir(&self, rel_dir: &str) -> bool {
        self.subtrees
            .iter()
            .any(|pattern| pattern.matches_with(rel_dir, MATCH_OPTIONS))
    }
}

fn anchor(pattern: &str) -> Result<String> {
    let trimmed = pattern.trim().trim_start_matches("./");
    if trimmed.is_empty() {
        return Err(anyhow!("empty glob pattern"));
    }
    if trimmed.contains('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("**/{trimmed}"))
    }
}

/// Expand the first `{a,b}` group and recurse into each alternative.
fn expand_braces(pattern: &str) -> Result<Vec<String>> {
    let Some(open) = pattern.find('{') else {
        return Ok(vec![pattern.to_string()]);
    };
    let mut depth = 0usize;
    let mut bounds = vec![open];
    let mut close = None;
    for (offset, ch) in pattern[open..].char_indices() {
        let idx = open + offset;
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(idx);
                    break;
                }
            }
            ',' if depth == 1 => bounds.push(idx),
            _ => {}
        }
    }
    let close = close.ok_or_else(|| anyhow!("unclosed '{{'"))?;
    bounds.push(close);

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut out = Vec::new();
    for pair in bounds.windows(2) {
        let alternative = &pattern[pair[0] + 1..pair[1]];
        out.extend(expand_braces(&format!("{prefix}{alternative}{suffix}"))?);
    }
    Ok(out)
}
