//! Suite extraction - one snapshot file into a [`SnapshotSuite`]

use std::path::Path;
use tracing::debug;

use crate::css::{cascade, resolve_suite_css};
use crate::error::Result;
use crate::loader::SnapshotLoader;
use crate::tree::folder_of;
use crate::types::{SnapshotEntry, SnapshotSuite};

/// Marks the start of the optional HTML preview inside a raw snapshot.
pub const PREVIEW_SEPARATOR: &str = "<!-- snapshot:html -->";

/// Split raw content into the primary snapshot and the optional preview.
///
/// Splits at the first separator; the newline directly around the
/// separator belongs to neither part.
pub fn split_preview(raw: &str) -> (String, Option<String>) {
    match raw.split_once(PREVIEW_SEPARATOR) {
        Some((snap, html)) => (
            snap.strip_suffix('\n').unwrap_or(snap).to_string(),
            Some(html.strip_prefix('\n').unwrap_or(html).to_string()),
        ),
        None => (raw.to_string(), None),
    }
}

/// Load `source_path` and build its suite under `file_key`.
///
/// Every entry gets the same cascade: `common_css` plus the suite's own
/// stylesheet when one is readable.
pub async fn extract_suite(
    loader: &dyn SnapshotLoader,
    file_key: &str,
    source_path: &Path,
    common_css: &[String],
) -> Result<SnapshotSuite> {
    let raw = loader.reload(source_path).await?;
    let css = cascade(common_css, resolve_suite_css(source_path).await);

    let entries = raw
        .into_iter()
        .map(|(id, content)| {
            let (snap, html) = split_preview(&content);
            let entry = SnapshotEntry {
                id: id.clone(),
                snap,
                html,
                css: css.clone(),
            };
            (id, entry)
        })
        .collect();

    let suite = SnapshotSuite {
        file_path: file_key.to_string(),
        folder_path: folder_of(file_key).to_string(),
        source_path: source_path.to_path_buf(),
        entries,
    };
    debug!(
        key = file_key,
        entries = suite.len(),
        css_sources = css.len(),
        "Extracted suite"
    );
    Ok(suite)
}
