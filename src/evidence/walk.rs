//! Read-only directory walk producing the sorted list of files to scan.
use super::globs::GlobSet;
use super::{SkipReason, SkippedFile};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub(crate) struct WalkEntry {
    pub rel: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Walk {
    pub files: Vec<WalkEntry>,
    pub skipped: Vec<SkippedFile>,
}

/// Walk `root`, keeping regular files matched by `include` and not by
/// `exclude`. Symlinks are never followed and excluded directories are
/// pruned without being read. Directories that cannot be listed are recorded
/// as skipped rather than failing the scan.
pub(crate) fn walk(root: &Path, include: &GlobSet, exclude: &GlobSet) -> Walk {
    let mut walk = Walk::default();
    visit(root, "", include, exclude, &mut walk);
    walk.files.sort_by(|a, b| a.rel.cmp(&b.rel));
    walk.skipped.sort_by(|a, b| a.path.cmp(&b.path));
    walk
}

fn visit(dir: &Path, rel_dir: &str, include: &GlobSet, exclude: &GlobSet, walk: &mut Walk) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            walk.skipped.push(SkippedFile::unreadable(rel_dir_label(rel_dir), &err));
            return;
        }
    };
    let mut entries: Vec<_> = entries.filter_map(|entry| entry.ok()).collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let rel = if rel_dir.is_empty() {
            name
        } else {
            format!("{rel_dir}/{name}")
        };
        let path = entry.path();
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                if include.is_match(&rel) && !exclude.is_match(&rel) {
                    walk.skipped.push(SkippedFile::unreadable(rel, &err));
                }
                continue;
            }
        };
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            tracing::debug!(path = %rel, "skip symlink");
            continue;
        }
        if file_type.is_dir() {
            if exclude.covers_dir(&rel) {
                tracing::debug!(path = %rel, "prune excluded directory");
                continue;
            }
            visit(&path, &rel, include, exclude, walk);
            continue;
        }
        if !file_type.is_file() || !include.is_match(&rel) || exclude.is_match(&rel) {
            continue;
        }
        walk.files.push(WalkEntry {
            rel,
            path,
            size: metadata.len(),
        });
    }
}

fn rel_dir_label(rel_dir: &str) -> String {
    if rel_dir.is_empty() {
        ".".to_string()
    } else {
        format!("{rel_dir}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globs(patterns: &[&str]) -> GlobSet {
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        GlobSet::new(&owned).expect("compile globs")
    }

    #[test]
    fn walk_is_sorted_and_prunes_excluded_dirs() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(root.path().join("src/nested")).expect("mkdir");
        fs::create_dir_all(root.path().join("node_modules/pkg")).expect("mkdir");
        fs::write(root.path().join("src/nested/b.rs"), "b").expect("write");
        fs::write(root.path().join("src/a.rs"), "a").expect("write");
        fs::write(root.path().join("README.md"), "readme").expect("write");
        fs::write(root.path().join("node_modules/pkg/index.js"), "x").expect("write");

        let walk = walk(
            root.path(),
            &globs(&["**/*"]),
            &globs(&["node_modules/**", "*.md"]),
        );
        let rels: Vec<&str> = walk.files.iter().map(|entry| entry.rel.as_str()).collect();
        assert_eq!(rels, vec!["src/a.rs", "src/nested/b.rs"]);
        assert!(walk.skipped.is_empty());
    }

    #[test]
    fn single_level_excludes_keep_deeper_files() {
        let root = tempfile::tempdir().expect("tempdir");
        for rel in ["docs/top.txt", "docs/sub/deep.rs", "a/x", "a/b/x"] {
            let path = root.path().join(rel);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(path, rel).expect("write");
        }

        let walk = walk(root.path(), &globs(&["**/*"]), &globs(&["docs/*", "*/x"]));
        let rels: Vec<&str> = walk.files.iter().map(|entry| entry.rel.as_str()).collect();
        assert_eq!(rels, vec!["a/b/x", "docs/sub/deep.rs"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let root = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("outside");
        fs::write(outside.path().join("secret.txt"), "outside").expect("write");
        fs::write(root.path().join("real.txt"), "inside").expect("write");
        std::os::unix::fs::symlink(outside.path(), root.path().join("linked"))
            .expect("symlink dir");
        std::os::unix::fs::symlink(root.path().join("real.txt"), root.path().join("alias.txt"))
            .expect("symlink file");

        let walk = walk(root.path(), &globs(&["**/*"]), &globs(&[]));
        let rels: Vec<&str> = walk.files.iter().map(|entry| entry.rel.as_str()).collect();
        assert_eq!(rels, vec!["real.txt"]);
    }
}
