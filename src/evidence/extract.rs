//! Pure fact extraction from file text.
//!
//! Nothing here touches the filesystem: callers pass a relative path and the
//! decoded text, so extraction is testable against synthetic content. Facts
//! come from line-oriented pattern matching, not semantic parsing.
use super::redact::Redactor;
use super::{AuthSignal, Dependency, Fact, FactKind, Route};
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;

const SNIPPET_MAX_BYTES: usize = 160;

/// Facts extracted from one file, with snippets already masked.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FileFacts {
    pub dependencies: Vec<Dependency>,
    pub routes: Vec<Route>,
    pub auth_signals: Vec<AuthSignal>,
    pub redactions: Vec<&'static str>,
}

impl FileFacts {
    /// Flattened per-file fact list, ordered by line then kind.
    pub fn facts(&self) -> Vec<Fact> {
        let mut facts = Vec::new();
        for dep in &self.dependencies {
            let detail = match &dep.version {
                Some(version) => format!("{} {} ({})", dep.name, version, dep.ecosystem),
                None => format!("{} ({})", dep.name, dep.ecosystem),
            };
            facts.push(Fact {
                kind: FactKind::Dependency,
                line: dep.line,
                detail,
            });
        }
        for route in &self.routes {
            facts.push(Fact {
                kind: FactKind::Route,
                line: Some(route.line),
                detail: format!("{} {} ({})", route.method, route.path, route.framework),
            });
        }
        for signal in &self.auth_signals {
            facts.push(Fact {
                kind: FactKind::AuthSignal,
                line: Some(signal.line),
                detail: signal.kind.clone(),
            });
        }
        facts.sort_by(|a, b| (a.line, a.kind, &a.detail).cmp(&(b.line, b.kind, &b.detail)));
        facts
    }
}

struct RoutePattern {
    framework: &'static str,
    regex: Regex,
    method_group: Option<usize>,
    path_group: usize,
}

struct AuthPattern {
    kind: &'static str,
    regex: Regex,
}

pub struct Extractor {
    redactor: Redactor,
    routes: Vec<RoutePattern>,
    auth: Vec<AuthPattern>,
    cargo_entry: Regex,
    cargo_version: Regex,
    cargo_table_dep: Regex,
    requirement: Regex,
    go_require: Regex,
}

impl Extractor {
    pub fn new() -> Result<Self> {
        // Decorator forms come before Express so `@api.get(...)` is not
        // attributed to Express; the first pattern to claim a route wins.
        let route_specs: [(&str, &str, Option<usize>, usize); 6] = [
            (
                "flask",
                r#"@\w+\.route\(\s*['"]([^'"]+)['"]"#,
                None,
                1,
            ),
            (
                "fastapi",
                r#"@\w+\.(get|post|put|patch|delete)\(\s*['"]([^'"]+)['"]"#,
                Some(1),
                2,
            ),
            (
                "express",
                r#"\b(?:app|router|server|api)\.(get|post|put|patch|delete)\(\s*['"`]([^'"`]+)['"`]"#,
                Some(1),
                2,
            ),
            (
                "axum",
                r#"\.route\(\s*"([^"]+)"\s*,\s*(get|post|put|patch|delete)\b"#,
                Some(2),
                1,
            ),
            (
                "actix",
                r#"#\[(get|post|put|patch|delete)\(\s*"([^"]+)""#,
                Some(1),
                2,
            ),
            (
                "spring",
                r#"@(Get|Post|Put|Patch|Delete)Mapping\(\s*(?:(?:value|path)\s*=\s*)?"([^"]+)""#,
                Some(1),
                2,
            ),
        ];
        let mut routes = Vec::with_capacity(route_specs.len());
        for (framework, pattern, method_group, path_group) in route_specs {
            routes.push(RoutePattern {
                framework,
                regex: Regex::new(pattern)
                    .with_context(|| format!("compile route pattern {framework}"))?,
                method_group,
                path_group,
            });
        }

        let auth_specs: [(&str, &str); 6] = [
            (
                "auth_middleware",
                r"\b(?:requireAuth|ensureAuthenticated|isAuthenticated|authMiddleware|auth_required|login_required|authenticate)\b",
            ),
            ("jwt", r"(?i)\b(?:jsonwebtoken|jwt|jose)\b"),
            ("oauth", r"(?i)\b(?:oauth2?|openid|oidc)\b"),
            (
                "session",
                r"\b(?:express-session|cookie-session|flask_login|SessionMiddleware)\b",
            ),
            (
                "guard",
                r"\b(?:UseGuards|AuthGuard|PreAuthorize|Secured|RolesAllowed|permission_required|has_permission)\b",
            ),
            ("passport", r"\bpassport(?:\.authenticate)?\b"),
        ];
        let mut auth = Vec::with_capacity(auth_specs.len());
        for (kind, pattern) in auth_specs {
            auth.push(AuthPattern {
                kind,
                regex: Regex::new(pattern)
                    .with_context(|| format!("compile auth pattern {kind}"))?,
            });
        }

        Ok(Self {
            redactor: Redactor::new()?,
            routes,
            auth,
            cargo_entry: Regex::new(r#"^\s*([A-Za-z0-9_\-]+)\s*=\s*(.+?)\s*$"#)
                .context("compile cargo entry pattern")?,
            cargo_version: Regex::new(r#"version\s*=\s*"([^"]+)""#)
                .context("compile cargo version pattern")?,
            cargo_table_dep: Regex::new(r#"^\[(?:[^\]]*\.)?(?:dev-|build-)?dependencies\.([A-Za-z0-9_\-]+)\]$"#)
                .context("compile cargo table pattern")?,
            requirement: Regex::new(r#"^([A-Za-z0-9][A-Za-z0-9._\-]*)(?:\[[^\]]*\])?\s*((?:==|>=|<=|~=|!=|>|<)\s*[^\s;#]+)?"#)
                .context("compile requirement pattern")?,
            go_require: Regex::new(r#"^(?:require\s+)?([A-Za-z0-9._~\-/]+\.[A-Za-z0-9._~\-/]+)\s+(v[0-9][^\s]*)"#)
                .context("compile go require pattern")?,
        })
    }

    /// Extract facts from one file's text. `rel_path` uses `/` separators.
    pub fn extract(&self, rel_path: &str, text: &str) -> FileFacts {
        let mut facts = FileFacts::default();
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        match file_name {
            "Cargo.toml" => self.cargo_dependencies(rel_path, text, &mut facts),
            "package.json" => self.npm_dependencies(rel_path, text, &mut facts),
            "requirements.txt" => self.pip_dependencies(rel_path, text, &mut facts),
            "go.mod" => self.go_dependencies(rel_path, text, &mut facts),
            _ => {}
        }
        self.scan_lines(rel_path, text, &mut facts);
        facts
    }

    fn scan_lines(&self, rel_path: &str, text: &str, facts: &mut FileFacts) {
        let mut seen_routes = BTreeSet::new();
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            for pattern in &self.routes {
                for caps in pattern.regex.captures_iter(line) {
                    let method = pattern
                        .method_group
                        .and_then(|group| caps.get(group))
                        .map(|m| m.as_str().to_ascii_uppercase())
                        .unwrap_or_else(|| "ANY".to_string());
                    let Some(path) = caps.get(pattern.path_group) else {
                        continue;
                    };
                    let masked = self.redactor.mask(path.as_str());
                    facts.redactions.extend(masked.kinds);
                    if seen_routes.insert((line_no, method.clone(), masked.text.clone())) {
                        facts.routes.push(Route {
                            method,
                            path: masked.text,
                            file: rel_path.to_string(),
                            line: line_no,
                            framework: pattern.framework.to_string(),
                        });
                    }
                }
            }
            for pattern in &self.auth {
                if pattern.regex.is_match(line) {
                    let masked = self.redactor.mask(line.trim());
                    facts.redactions.extend(masked.kinds);
                    facts.auth_signals.push(AuthSignal {
                        kind: pattern.kind.to_string(),
                        file: rel_path.to_string(),
                        line: line_no,
                        snippet: crate::util::truncate_string(&masked.text, SNIPPET_MAX_BYTES),
                    });
                }
            }
        }
    }

    fn cargo_dependencies(&self, rel_path: &str, text: &str, facts: &mut FileFacts) {
        let mut in_deps = false;
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.starts_with('[') {
                if let Some(caps) = self.cargo_table_dep.captures(line) {
                    in_deps = false;
                    self.push_dependency(facts, &caps[1], None, "cargo", rel_path, idx + 1);
                } else {
                    in_deps = line.ends_with("dependencies]");
                }
                continue;
            }
            if !in_deps || line.starts_with('#') {
                continue;
            }
            let Some(caps) = self.cargo_entry.captures(line) else {
                continue;
            };
            let value = &caps[2];
            let version = if let Some(stripped) = value.strip_prefix('"') {
                stripped.split('"').next().map(str::to_string)
            } else {
                self.cargo_version
                    .captures(value)
                    .map(|version| version[1].to_string())
            };
            self.push_dependency(facts, &caps[1], version, "cargo", rel_path, idx + 1);
        }
    }

    fn npm_dependencies(&self, rel_path: &str, text: &str, facts: &mut FileFacts) {
        let Ok(manifest) = serde_json::from_str::<serde_json::Value>(text) else {
            tracing::debug!(path = rel_path, "package.json is not valid JSON");
            return;
        };
        for key in ["dependencies", "devDependencies", "peerDependencies"] {
            let Some(entries) = manifest.get(key).and_then(|value| value.as_object()) else {
                continue;
            };
            for (name, version) in entries {
                let version = version.as_str().map(str::to_string);
                let line = text
                    .lines()
                    .position(|line| line.contains(&format!("\"{name}\"")))
                    .map(|idx| idx + 1);
                self.push_dependency_at(facts, name, version, "npm", rel_path, line);
            }
        }
    }

    fn pip_dependencies(&self, rel_path: &str, text: &str, facts: &mut FileFacts) {
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
                continue;
            }
            if let Some(caps) = self.requirement.captures(line) {
                let version = caps.get(2).map(|m| m.as_str().replace(' ', ""));
                self.push_dependency(facts, &caps[1], version, "pypi", rel_path, idx + 1);
            }
        }
    }

    fn go_dependencies(&self, rel_path: &str, text: &str, facts: &mut FileFacts) {
        let mut in_block = false;
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.starts_with("require (") {
                in_block = true;
                continue;
            }
            if in_block && line.starts_with(')') {
                in_block = false;
                continue;
            }
            if !in_block && !line.starts_with("require ") {
                continue;
            }
            if let Some(caps) = self.go_require.captures(line) {
                let version = Some(caps[2].to_string());
                self.push_dependency(facts, &caps[1], version, "go", rel_path, idx + 1);
            }
        }
    }

    fn push_dependency(
        &self,
        facts: &mut FileFacts,
        name: &str,
        version: Option<String>,
        ecosystem: &str,
        rel_path: &str,
        line: usize,
    ) {
        self.push_dependency_at(facts, name, version, ecosystem, rel_path, Some(line));
    }

    fn push_dependency_at(
        &self,
        facts: &mut FileFacts,
        name: &str,
        version: Option<String>,
        ecosystem: &str,
        rel_path: &str,
        line: Option<usize>,
    ) {
        let version = version.map(|raw| {
            let masked = self.redactor.mask(&raw);
            facts.redactions.extend(masked.kinds);
            masked.text
        });
        facts.dependencies.push(Dependency {
            name: name.to_string(),
            version,
            ecosystem: ecosystem.to_string(),
            source: rel_path.to_string(),
            line,
        });
    }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
