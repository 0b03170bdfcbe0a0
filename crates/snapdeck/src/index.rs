//! Snapshot index - refresh orchestration, queries and watch control
//!
//! # Design
//!
//! - One [`SnapshotIndex`] owns all mutable state: config, the current
//!   [`IndexState`], the common CSS cache and the watch subscription.
//! - A refresh rebuilds everything from disk: common CSS → suites (one file at
//!   a time, sorted) → folder tree → install → notify.
//! - The installed state is a single `Arc<IndexState>`; readers clone the
//!   `Arc` and never see suites from one refresh next to folders from another.
//! - Refreshes are serialized. A failed refresh leaves the installed state
//!   untouched.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info};

use crate::broadcast::{Broadcaster, IndexEvent};
use crate::config::{ConfigUpdate, IndexerConfig};
use crate::css::resolve_common_css;
use crate::error::Result;
use crate::extractor::extract_suite;
use crate::loader::{ExportsSnapshotLoader, SnapshotLoader};
use crate::patterns::{discover_files, suite_key, PatternSet};
use crate::tree::build_tree;
use crate::types::{FolderNode, IndexState, SnapshotSuite, SuiteDict};
use crate::watcher::WatchHandle;

/// Process-wide snapshot index.
///
/// Starts empty (root folder only, no suites, not watching). Dropping it
/// releases any watch subscription.
pub struct SnapshotIndex {
    config: RwLock<IndexerConfig>,
    loader: Arc<dyn SnapshotLoader>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    state: RwLock<Arc<IndexState>>,
    common_css: RwLock<Arc<Vec<String>>>,
    refresh_lock: tokio::sync::Mutex<()>,
    watch: Mutex<Option<WatchHandle>>,
}

impl SnapshotIndex {
    /// Create an empty index reading snapshot modules from disk.
    pub fn new(config: IndexerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            loader: Arc::new(ExportsSnapshotLoader),
            broadcaster: None,
            state: RwLock::new(Arc::new(IndexState::empty())),
            common_css: RwLock::new(Arc::new(Vec::new())),
            refresh_lock: tokio::sync::Mutex::new(()),
            watch: Mutex::new(None),
        }
    }

    /// Replace the snapshot loader.
    pub fn with_loader(mut self, loader: Arc<dyn SnapshotLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Push a refresh signal through `broadcaster` after each refresh.
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn config(&self) -> IndexerConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge a partial update; takes effect on the next refresh.
    pub fn update_config(&self, update: ConfigUpdate) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        config.merge(update);
        debug!(config = ?*config, "Updated index config");
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current state; stays valid even if a refresh installs a newer one.
    pub fn snapshot(&self) -> Arc<IndexState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get_folder(&self, folder_path: &str) -> Option<FolderNode> {
        self.snapshot().folders.get(folder_path).cloned()
    }

    pub fn get_snapshot_suite(&self, file_key: &str) -> Option<Arc<SnapshotSuite>> {
        self.snapshot().suites.get(file_key).cloned()
    }

    /// Global CSS layer from the last successful CSS resolution.
    ///
    /// The cache is replaced as soon as the stylesheets are read, before
    /// suites are extracted. If that refresh then fails, this returns the new
    /// CSS while the installed suites still carry the CSS of the previous
    /// refresh.
    pub fn common_css(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.common_css.read().unwrap_or_else(PoisonError::into_inner))
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Initial refresh, then watch if configured.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.refresh().await?;
        if self.config().watch {
            self.start_watching()?;
        }
        Ok(())
    }

    /// Rebuild the whole index from disk and install it.
    ///
    /// On error nothing is installed and the previous index keeps serving.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        let started = Instant::now();
        let config = self.config();
        let root = canonical_root(&config.root_dir);

        let common_css = Arc::new(resolve_common_css(&root, &config.css_patterns).await?);
        *self.common_css.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&common_css);

        let discover_root = root.clone();
        let patterns = config.snapshot_patterns.clone();
        let files =
            tokio::task::spawn_blocking(move || discover_files(&discover_root, &patterns)).await??;

        let mut suites = SuiteDict::with_capacity(files.len());
        for path in &files {
            let key = suite_key(&root, path);
            let suite = extract_suite(self.loader.as_ref(), &key, path, &common_css).await?;
            suites.insert(key, Arc::new(suite));
        }

        let folders = build_tree(&suites)?;
        let generation = self.snapshot().generation + 1;
        let state = Arc::new(IndexState {
            suites,
            folders,
            generation,
            built_at: Utc::now(),
        });
        let (suite_count, folder_count, entry_count) =
            (state.suite_count(), state.folders.len(), state.entry_count());

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;

        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.notify(IndexEvent::Refresh);
        }

        info!(
            generation,
            suites = suite_count,
            entries = entry_count,
            folders = folder_count,
            css_sources = common_css.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Snapshot index refreshed"
        );
        Ok(())
    }

    // ========================================================================
    // Watching
    // ========================================================================

    /// Subscribe to changes of snapshot and CSS files.
    ///
    /// Returns `false` when already watching. Must be called from within a
    /// tokio runtime.
    pub fn start_watching(self: &Arc<Self>) -> Result<bool> {
        let mut watch = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
        if watch.is_some() {
            return Ok(false);
        }

        let config = self.config();
        let root = canonical_root(&config.root_dir);
        let patterns = PatternSet::new(&root, &config.watched_patterns())?;
        let roots = patterns.watch_roots(&root);
        *watch = Some(WatchHandle::spawn(Arc::downgrade(self), patterns, roots)?);
        Ok(true)
    }

    /// Release the watch subscription. Returns `false` when not watching.
    pub fn stop_watching(&self) -> bool {
        let handle = self
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                handle.stop();
                info!("Stopped watching for snapshot changes");
                true
            }
            None => false,
        }
    }

    /// Directories currently watched; empty when not watching.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|handle| handle.roots().to_vec())
            .unwrap_or_default()
    }

    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Canonical form of the root so keys and watcher paths line up; the path
/// itself when it cannot be resolved.
fn canonical_root(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelBroadcaster;
    use crate::error::IndexError;
    use crate::loader::RawSnapshots;
    use async_trait::async_trait;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Loader that parks inside `reload` until released.
    struct GatedLoader {
        reached: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl SnapshotLoader for GatedLoader {
        async fn reload(&self, path: &Path) -> Result<RawSnapshots> {
            self.reached.notify_one();
            self.release.notified().await;
            ExportsSnapshotLoader.reload(path).await
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn config_for(root: &Path) -> IndexerConfig {
        IndexerConfig {
            root_dir: root.to_path_buf(),
            css_patterns: vec!["styles/*.css".to_string()],
            ..IndexerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_new_index_is_empty() {
        let index = SnapshotIndex::new(IndexerConfig::default());
        let root = index.get_folder("-").unwrap();
        assert!(root.children_folder_paths.is_empty());
        assert!(index.get_snapshot_suite("-/a.snap.js").is_none());
        assert!(!index.is_watching());
        assert!(!index.stop_watching());
    }

    #[tokio::test]
    async fn test_refresh_builds_suites_and_folders() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "styles/global.css", "g");
        write(root, "x/a.snap.js", "exports[`a 1`] = `A`;");
        write(root, "x/y/b.snap.js", "exports[`b 1`] = `B`;");
        write(root, "z/c.snap.js", "exports[`c 1`] = `C`;");

        let index = SnapshotIndex::new(config_for(root));
        index.refresh().await.unwrap();

        let state = index.snapshot();
        assert_eq!(state.generation, 1);
        assert_eq!(state.suite_count(), 3);
        assert_eq!(
            index.get_folder("-").unwrap().children_folder_paths,
            vec!["-/x", "-/z"]
        );
        let a = index.get_snapshot_suite("-/x/a.snap.js").unwrap();
        assert_eq!(a.folder_path, "-/x");
        assert_eq!(a.get("a 1").unwrap().css, vec!["g"]);
        assert_eq!(*index.common_css(), vec!["g".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_index() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "x/a.snap.js", "exports[`a 1`] = `A`;");

        let index = SnapshotIndex::new(config_for(root));
        index.refresh().await.unwrap();
        let before = index.snapshot();

        write(root, "x/b.snap.js", "exports[`b 1`] = `unterminated");
        let err = index.refresh().await.unwrap_err();
        assert!(matches!(err, IndexError::SnapshotParse { .. }));

        let after = index.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(index.get_snapshot_suite("-/x/b.snap.js").is_none());
        assert!(index.get_snapshot_suite("-/x/a.snap.js").is_some());
    }

    #[tokio::test]
    async fn test_refresh_notifies_broadcaster() {
        let temp = TempDir::new().unwrap();
        let broadcaster = Arc::new(ChannelBroadcaster::new());
        let mut rx = broadcaster.subscribe();

        let index = SnapshotIndex::new(config_for(temp.path())).with_broadcaster(broadcaster);
        index.refresh().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), IndexEvent::Refresh);
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_notify() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "bad.snap.js", "exports[");
        let broadcaster = Arc::new(ChannelBroadcaster::new());
        let mut rx = broadcaster.subscribe();

        let index = SnapshotIndex::new(config_for(temp.path())).with_broadcaster(broadcaster);
        assert!(index.refresh().await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queries_during_refresh_see_prior_index() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "x/a.snap.js", "exports[`a 1`] = `A`;");

        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let loader = GatedLoader {
            reached: Arc::clone(&reached),
            release: Arc::clone(&release),
        };
        let index = Arc::new(SnapshotIndex::new(config_for(root)).with_loader(Arc::new(loader)));

        let first = tokio::spawn({
            let index = Arc::clone(&index);
            async move { index.refresh().await }
        });
        reached.notified().await;
        release.notify_one();
        first.await.unwrap().unwrap();
        let prior = index.snapshot();

        write(root, "z/c.snap.js", "exports[`c 1`] = `C`;");
        let second = tokio::spawn({
            let index = Arc::clone(&index);
            async move { index.refresh().await }
        });

        // Parked mid-pipeline: suites half loaded, nothing installed yet.
        reached.notified().await;
        let during = index.snapshot();
        assert!(Arc::ptr_eq(&prior, &during));
        assert!(index.get_snapshot_suite("-/z/c.snap.js").is_none());
        assert!(index.get_folder("-/z").is_none());

        release.notify_one();
        reached.notified().await;
        release.notify_one();
        second.await.unwrap().unwrap();

        let after = index.snapshot();
        assert_eq!(after.generation, prior.generation + 1);
        assert!(after.suites.contains_key("-/z/c.snap.js"));
        assert!(after.folders.contains("-/z"));
    }

    #[tokio::test]
    async fn test_update_config_applies_on_next_refresh() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "x/a.snap.js", "exports[`a 1`] = `A`;");
        write(root, "x/a.story.js", "exports[`s 1`] = `S`;");

        let index = SnapshotIndex::new(config_for(root));
        index.refresh().await.unwrap();
        assert_eq!(index.snapshot().suite_count(), 1);

        index.update_config(ConfigUpdate {
            snapshot_patterns: Some(vec!["**/*.js".to_string()]),
            ..ConfigUpdate::default()
        });
        assert_eq!(index.snapshot().suite_count(), 1);

        index.refresh().await.unwrap();
        assert_eq!(index.snapshot().suite_count(), 2);
    }

    #[tokio::test]
    async fn test_start_watching_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let index = Arc::new(SnapshotIndex::new(config_for(temp.path())));

        assert!(index.start_watching().unwrap());
        assert!(!index.start_watching().unwrap());
        assert!(index.is_watching());
        assert_eq!(index.watch_roots(), vec![temp.path().canonicalize().unwrap()]);
        assert!(index.stop_watching());
        assert!(!index.is_watching());
        assert!(index.watch_roots().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_refreshes_install_in_order() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "x/a.snap.js", "exports[`a 1`] = `A`;");

        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let loader = GatedLoader {
            reached: Arc::clone(&reached),
            release: Arc::clone(&release),
        };
        let index = Arc::new(SnapshotIndex::new(config_for(root)).with_loader(Arc::new(loader)));
        let prior = index.snapshot();

        // First refresh discovers only x/a.snap.js, then parks loading it.
        let first = tokio::spawn({
            let index = Arc::clone(&index);
            async move { index.refresh().await }
        });
        reached.notified().await;

        write(root, "z/c.snap.js", "exports[`c 1`] = `C`;");
        let second = tokio::spawn({
            let index = Arc::clone(&index);
            async move { index.refresh().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!second.is_finished());
        assert!(Arc::ptr_eq(&prior, &index.snapshot()));

        release.notify_one();
        first.await.unwrap().unwrap();
        let after_first = index.snapshot();
        assert_eq!(after_first.generation, prior.generation + 1);
        assert!(!after_first.suites.contains_key("-/z/c.snap.js"));

        // Second refresh only now reaches the loader, once per file.
        for _ in 0..2 {
            reached.notified().await;
            release.notify_one();
        }
        second.await.unwrap().unwrap();

        let latest = index.snapshot();
        assert_eq!(latest.generation, prior.generation + 2);
        assert!(latest.suites.contains_key("-/x/a.snap.js"));
        assert!(latest.suites.contains_key("-/z/c.snap.js"));
        assert!(latest.folders.contains("-/z"));
    }
}
