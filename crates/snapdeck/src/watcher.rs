//! Filesystem watching - full refresh on any matching change
//!
//! Events are never applied incrementally. Any create/modify/remove of a file
//! matching the snapshot or CSS patterns queues a refresh, as does any rename
//! and any folder create/remove (those events carry only the folder path, not
//! the files moved with it). Events that arrive while a refresh is queued are
//! folded into it.

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Weak;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::index::SnapshotIndex;
use crate::patterns::PatternSet;

/// Live subscription. Dropping it releases the OS watch and stops the
/// refresh task.
pub struct WatchHandle {
    watcher: Option<RecommendedWatcher>,
    task: JoinHandle<()>,
    roots: Vec<PathBuf>,
}

impl WatchHandle {
    /// Watch `roots` recursively and refresh `index` on relevant events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(index: Weak<SnapshotIndex>, patterns: PatternSet, roots: Vec<PathBuf>) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = recommended_watcher(move |event_result: notify::Result<Event>| {
            match event_result {
                Ok(event) => {
                    if is_relevant(&event, &patterns) {
                        debug!(kind = ?event.kind, paths = ?event.paths, "Snapshot change");
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "Watch error"),
            }
        })?;

        for root in &roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            info!(root = %root.display(), "Watching for snapshot changes");
        }

        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                while rx.try_recv().is_ok() {}

                let Some(index) = index.upgrade() else {
                    break;
                };
                if let Err(e) = index.refresh().await {
                    warn!(error = %e, "Refresh after file change failed; keeping previous index");
                }
            }
        });

        Ok(Self {
            watcher: Some(watcher),
            task,
            roots,
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Release the subscription.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.watcher.take();
        self.task.abort();
    }
}

/// Create, modify and remove events touching a watched file, plus renames and
/// folder-level changes that may move watched files without naming them.
fn is_relevant(event: &Event, patterns: &PatternSet) -> bool {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(_))
        | EventKind::Create(CreateKind::Folder)
        | EventKind::Remove(RemoveKind::Folder) => true,
        // Backends that cannot tell files from folders
        EventKind::Create(_) => event.paths.iter().any(|p| patterns.is_match(p) || p.is_dir()),
        EventKind::Modify(_) | EventKind::Remove(_) => {
            event.paths.iter().any(|p| patterns.is_match(p))
        }
        _ => false,
    }
}
