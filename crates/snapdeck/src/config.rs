//! Configuration for the snapshot index

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

/// Main configuration for the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Directory suite keys are relative to; relative patterns anchor here
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Globs selecting snapshot files
    #[serde(default = "default_snapshot_patterns")]
    pub snapshot_patterns: Vec<String>,

    /// Globs selecting global stylesheets, applied in order
    #[serde(default)]
    pub css_patterns: Vec<String>,

    /// Start watching after the initial refresh
    #[serde(default)]
    pub watch: bool,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_snapshot_patterns() -> Vec<String> {
    vec!["**/*.snap.js".to_string()]
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            snapshot_patterns: default_snapshot_patterns(),
            css_patterns: Vec::new(),
            watch: false,
        }
    }
}

impl IndexerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| IndexError::read(path, e))?;
        let config: IndexerConfig =
            toml::from_str(&content).map_err(|e| IndexError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| IndexError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Merge a partial update over this configuration.
    pub fn merge(&mut self, update: ConfigUpdate) {
        if let Some(root_dir) = update.root_dir {
            self.root_dir = root_dir;
        }
        if let Some(patterns) = update.snapshot_patterns {
            self.snapshot_patterns = patterns;
        }
        if let Some(patterns) = update.css_patterns {
            self.css_patterns = patterns;
        }
        if let Some(watch) = update.watch {
            self.watch = watch;
        }
    }

    /// Snapshot and CSS patterns together, as watched by the watcher.
    pub fn watched_patterns(&self) -> Vec<String> {
        self.snapshot_patterns
            .iter()
            .chain(self.css_patterns.iter())
            .cloned()
            .collect()
    }
}

/// Partial configuration; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub root_dir: Option<PathBuf>,
    pub snapshot_patterns: Option<Vec<String>>,
    pub css_patterns: Option<Vec<String>>,
    pub watch: Option<bool>,
}
