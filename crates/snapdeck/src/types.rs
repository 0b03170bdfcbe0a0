//! Core types for the snapshot index
//!
//! Everything here is rebuilt from scratch on each refresh and never
//! mutated after it has been installed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::tree::FolderDict;

/// Synthetic root folder shared by every suite key.
pub const ROOT_FOLDER: &str = "-";

// ============================================================================
// Snapshot Types
// ============================================================================

/// One rendered snapshot unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Identifier, unique within the owning suite
    pub id: String,
    /// Primary serialized content
    pub snap: String,
    /// Optional HTML preview
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// CSS sources in cascade order (globals first, suite override last)
    pub css: Vec<String>,
}

/// All snapshot entries extracted from a single source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSuite {
    /// Synthetic key, e.g. `-/src/button.snap.js`
    pub file_path: String,
    /// Folder containing the suite, e.g. `-/src`
    pub folder_path: String,
    /// Absolute path the suite was loaded from
    pub source_path: PathBuf,
    /// Entries keyed by id
    pub entries: BTreeMap<String, SnapshotEntry>,
}

impl SnapshotSuite {
    pub fn get(&self, id: &str) -> Option<&SnapshotEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Folder Types
// ============================================================================

/// One registered folder of the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub folder_path: String,
    /// Suite keys whose immediate folder is this node
    pub file_paths: Vec<String>,
    /// Nearest registered ancestor; `None` only for the root
    pub parent_folder_path: Option<String>,
    pub children_folder_paths: Vec<String>,
}

impl FolderNode {
    pub fn new(folder_path: impl Into<String>, parent_folder_path: Option<String>) -> Self {
        Self {
            folder_path: folder_path.into(),
            file_paths: Vec::new(),
            parent_folder_path,
            children_folder_paths: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_folder_path.is_none()
    }

    /// Last path segment, `-` for the root.
    pub fn name(&self) -> &str {
        self.folder_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.folder_path)
    }
}

// ============================================================================
// Index State
// ============================================================================

/// Suites keyed by synthetic file key
pub type SuiteDict = HashMap<String, Arc<SnapshotSuite>>;

/// Immutable snapshot of the whole index.
///
/// Readers hold an `Arc<IndexState>`, so a refresh never exposes a folder
/// dictionary paired with another refresh's suites.
#[derive(Debug, Clone)]
pub struct IndexState {
    pub suites: SuiteDict,
    pub folders: FolderDict,
    /// Number of successful refreshes that produced this state (0 = empty)
    pub generation: u64,
    pub built_at: DateTime<Utc>,
}

impl IndexState {
    /// Empty index: root folder only, no suites.
    pub fn empty() -> Self {
        Self {
            suites: HashMap::new(),
            folders: FolderDict::with_root(),
            generation: 0,
            built_at: Utc::now(),
        }
    }

    pub fn suite_count(&self) -> usize {
        self.suites.len()
    }

    pub fn entry_count(&self) -> usize {
        self.suites.values().map(|s| s.len()).sum()
    }
}

impl Default for IndexState {
    fn default() -> Self {
        Self::empty()
    }
}
