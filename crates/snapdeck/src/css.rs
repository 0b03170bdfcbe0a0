//! CSS cascade resolution
//!
//! Every entry of a suite is rendered with the same cascade:
//! the global sources in pattern-match order, then the suite's own
//! stylesheet (a sibling of the suite file with a `css` extension).
//! Later sources win in the renderer.

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::patterns::discover_ordered;

/// Read every file matching `patterns`, in pattern-match order.
///
/// Any unreadable match fails the whole resolution.
pub async fn resolve_common_css(root: &Path, patterns: &[String]) -> Result<Vec<String>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let discover_root = root.to_path_buf();
    let discover_patterns = patterns.to_vec();
    let files =
        tokio::task::spawn_blocking(move || discover_ordered(&discover_root, &discover_patterns))
            .await??;

    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| IndexError::read(&path, e))?;
        debug!(path = %path.display(), bytes = content.len(), "Loaded common CSS");
        sources.push(content);
    }
    Ok(sources)
}

/// Sibling stylesheet for a suite file (`a.snap.js` → `a.snap.css`).
pub fn suite_css_path(suite_file: &Path) -> PathBuf {
    suite_file.with_extension("css")
}

/// Stylesheet override for a suite, if one can be read.
///
/// Every failure maps to `None`, not only a missing file: an unreadable
/// override behaves exactly like an absent one.
pub async fn resolve_suite_css(suite_file: &Path) -> Option<String> {
    let path = suite_css_path(suite_file);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Some(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unreadable suite CSS");
            None
        }
    }
}

/// Final cascade: globals first, suite override appended last.
pub fn cascade(common: &[String], suite_override: Option<String>) -> Vec<String> {
    let mut sources = Vec::with_capacity(common.len() + 1);
    sources.extend_from_slice(common);
    sources.extend(suite_override);
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cascade_order() {
        let common = vec!["g1".to_string(), "g2".to_string()];
        assert_eq!(cascade(&common, Some("s".to_string())), vec!["g1", "g2", "s"]);
        assert_eq!(cascade(&common, None), vec!["g1", "g2"]);
        assert_eq!(cascade(&[], Some("s".to_string())), vec!["s"]);
    }

    #[test]
    fn test_suite_css_path_replaces_last_extension() {
        assert_eq!(
            suite_css_path(Path::new("/r/x/a.snap.js")),
            PathBuf::from("/r/x/a.snap.css")
        );
        assert_eq!(suite_css_path(Path::new("/r/b.snap")), PathBuf::from("/r/b.css"));
    }

    #[tokio::test]
    async fn test_common_css_in_pattern_order() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("base")).unwrap();
        fs::write(root.join("base/reset.css"), "reset").unwrap();
        fs::write(root.join("theme.css"), "theme").unwrap();

        let css = resolve_common_css(root, &["theme.css".to_string(), "base/*.css".to_string()])
            .await
            .unwrap();
        assert_eq!(css, vec!["theme", "reset"]);
    }

    #[tokio::test]
    async fn test_common_css_without_patterns_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(resolve_common_css(temp.path(), &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_suite_css_absent_and_present() {
        let temp = TempDir::new().unwrap();
        let suite = temp.path().join("a.snap.js");
        fs::write(&suite, "").unwrap();
        assert_eq!(resolve_suite_css(&suite).await, None);

        fs::write(temp.path().join("a.snap.css"), ".a{}").unwrap();
        assert_eq!(resolve_suite_css(&suite).await.as_deref(), Some(".a{}"));
    }

    #[tokio::test]
    async fn test_unreadable_suite_css_is_absent() {
        let temp = TempDir::new().unwrap();
        let suite = temp.path().join("b.snap.js");
        // A directory where the stylesheet should be: read fails with a
        // non-NotFound error.
        fs::create_dir_all(temp.path().join("b.snap.css")).unwrap();
        assert_eq!(resolve_suite_css(&suite).await, None);
    }
}
