//! Snapdeck - Snapshot Folder-Tree Index
//!
//! Indexes snapshot files produced by a test pipeline into a folder
//! hierarchy mirroring their source tree, with a CSS cascade per suite.
//! A viewer queries the index by folder path or suite key.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSS globs  │────▶│  Extractor  │────▶│ Tree build  │────▶│   Install   │
//! │ (common CSS)│     │ (per suite) │     │  (folders)  │     │ + broadcast │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                                                            │
//!        └──────────────────── watcher (full refresh) ◀───────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Suite**: the snapshot entries extracted from one file
//! - **Entry**: one snapshot (primary content, optional HTML preview, CSS)
//! - **Folder node**: a folder holding suites; empty intermediate folders are
//!   skipped, so a node's parent is its nearest non-empty ancestor
//! - **Synthetic root**: `-`, the common ancestor of every suite key

pub mod broadcast;
pub mod config;
pub mod css;
pub mod error;
pub mod extractor;
pub mod index;
pub mod loader;
pub mod patterns;
pub mod tree;
pub mod types;
pub mod watcher;

// Re-exports for convenience
pub use broadcast::{Broadcaster, ChannelBroadcaster, IndexEvent};
pub use config::{ConfigUpdate, IndexerConfig};
pub use error::{IndexError, Result};
pub use index::SnapshotIndex;
pub use loader::{ExportsSnapshotLoader, RawSnapshots, SnapshotLoader};
pub use tree::{build_tree, FolderDict};
pub use types::{FolderNode, IndexState, SnapshotEntry, SnapshotSuite, ROOT_FOLDER};
