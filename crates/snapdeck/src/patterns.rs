//! Glob pattern discovery and matching helpers.
//!
//! Patterns are relative to the index root unless absolute. Discovery uses
//! the `glob` crate (alphabetical within a pattern); event filtering for the
//! watcher uses a compiled `globset::GlobSet` with the same semantics.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::error::{IndexError, Result};
use crate::types::ROOT_FOLDER;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Normalize a raw pattern: trimmed, forward slashes, no leading `./`.
pub fn normalize_glob_pattern(raw: &str) -> String {
    let mut pattern = raw.trim().replace('\\', "/");
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest.to_string();
    }
    pattern
}

/// Anchor a pattern at `root` for the `glob` crate unless it is already
/// absolute. The root is escaped so it always matches literally.
pub fn anchor_pattern(root: &Path, raw: &str) -> String {
    anchor_with(root, raw, glob::Pattern::escape)
}

fn anchor_with(root: &Path, raw: &str, escape: fn(&str) -> String) -> String {
    let pattern = normalize_glob_pattern(raw);
    if Path::new(&pattern).is_absolute() {
        pattern
    } else {
        let root = root.to_string_lossy().replace('\\', "/");
        format!("{}/{}", escape(root.trim_end_matches('/')), pattern)
    }
}

/// Files matching the patterns in pattern-match order.
///
/// Pattern order is kept; within a pattern matches come back sorted. A file
/// matched by several patterns keeps its first position.
pub fn discover_ordered(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for raw in patterns {
        let anchored = anchor_pattern(root, raw);
        let paths = glob::glob(&anchored)
            .map_err(|e| IndexError::Pattern(format!("invalid pattern '{}': {}", raw, e)))?;
        for entry in paths {
            let path = entry?;
            if path.is_file() && seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// Set of files matching any of the patterns.
pub fn discover_files(root: &Path, patterns: &[String]) -> Result<BTreeSet<PathBuf>> {
    Ok(discover_ordered(root, patterns)?.into_iter().collect())
}

/// Synthetic suite key for a file: `-/` followed by its path relative to
/// `root` with forward slashes. Files outside the root keep their full path
/// (minus any drive or leading separator).
pub fn suite_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut key = String::from(ROOT_FOLDER);
    for component in relative.components() {
        if let Component::Normal(segment) = component {
            key.push('/');
            key.push_str(&segment.to_string_lossy());
        }
    }
    key
}

/// Longest wildcard-free directory prefix of an unanchored pattern.
pub fn pattern_base_dir(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    let segments: Vec<&str> = pattern.split('/').collect();
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        if i == last || segment.contains(GLOB_META) {
            break;
        }
        if segment.is_empty() {
            if i == 0 {
                base.push("/");
            }
            continue;
        }
        base.push(segment);
    }
    base
}

/// Directory a pattern can only match below: `root` joined with the
/// pattern's literal prefix, or that prefix alone for absolute patterns.
fn watch_base(root: &Path, raw: &str) -> PathBuf {
    let pattern = normalize_glob_pattern(raw);
    let base = pattern_base_dir(&pattern);
    if Path::new(&pattern).is_absolute() {
        base
    } else {
        root.join(base)
    }
}

/// Compiled set of anchored patterns, used to filter watcher events.
#[derive(Debug, Clone)]
pub struct PatternSet {
    bases: Vec<PathBuf>,
    set: GlobSet,
}

impl PatternSet {
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut bases = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let pattern = anchor_with(root, raw, globset::escape);
            let glob = GlobBuilder::new(&pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| IndexError::Pattern(format!("invalid pattern '{}': {}", raw, e)))?;
            builder.add(glob);
            bases.push(watch_base(root, raw));
        }
        let set = builder
            .build()
            .map_err(|e| IndexError::Pattern(e.to_string()))?;
        Ok(Self { bases, set })
    }

    pub fn is_match(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }

    /// Existing directories to watch recursively, nested ones removed.
    ///
    /// Falls back to `fallback` when no pattern base exists yet.
    pub fn watch_roots(&self, fallback: &Path) -> Vec<PathBuf> {
        let mut bases: Vec<PathBuf> = self.bases.iter().filter(|p| p.is_dir()).cloned().collect();
        bases.sort();
        bases.dedup();

        let mut roots: Vec<PathBuf> = Vec::new();
        for base in bases {
            if !roots.iter().any(|r| base.starts_with(r)) {
                roots.push(base);
            }
        }
        if roots.is_empty() && fallback.is_dir() {
            roots.push(fallback.to_path_buf());
        }
        roots
    }
}
