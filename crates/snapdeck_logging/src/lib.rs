//! Logging setup for the `snapdeck` binary.
//!
//! Console output always goes to stderr. Long-running commands (`watch`)
//! also log to `snapdeck.log` under the Snapdeck logs directory, rotated by
//! size so a watcher left running for days stays bounded.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILE_FILTER: &str = "snapdeck=info";
const VERBOSE_CONSOLE_FILTER: &str = "snapdeck=debug";
const LOG_FILE_NAME: &str = "snapdeck.log";
const MAX_LOG_FILE_SIZE: u64 = 5 * 1024 * 1024;
const LOG_BACKUPS: usize = 2;

pub struct LogConfig {
    /// Debug output on the console instead of warnings only
    pub verbose: bool,
    /// Also write to the rotating log file
    pub log_to_file: bool,
}

/// Install the global subscriber. Returns the log file path when file
/// logging is enabled.
///
/// The file always gets the `RUST_LOG` (or default) filter; the console
/// shows warnings unless `verbose`.
pub fn init_logging(config: LogConfig) -> Result<Option<PathBuf>> {
    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(VERBOSE_CONSOLE_FILTER))
    } else {
        EnvFilter::new("warn")
    };
    let console = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(config.verbose)
        .with_filter(console_filter);

    let (file_layer, log_path) = if config.log_to_file {
        let path = ensure_logs_dir()?.join(LOG_FILE_NAME);
        let log = LogFile::open(path.clone(), MAX_LOG_FILE_SIZE, LOG_BACKUPS)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let file_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILE_FILTER));
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(log))
            .with_ansi(false)
            .with_filter(file_filter);
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(log_path)
}

/// Snapdeck home directory: ~/.snapdeck (`SNAPDECK_HOME` overrides)
pub fn snapdeck_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("SNAPDECK_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".snapdeck")
}

pub fn logs_dir() -> PathBuf {
    snapdeck_home().join("logs")
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Append-only log file that moves itself to `<name>.1` once a write would
/// push it past `max_size`. Older backups shift to `<name>.2` and so on; the
/// one past `backups` is overwritten.
struct LogFile {
    path: PathBuf,
    max_size: u64,
    backups: usize,
    file: File,
    size: u64,
}

impl LogFile {
    fn open(path: PathBuf, max_size: u64, backups: usize) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            max_size,
            backups,
            file,
            size,
        })
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let mut options = OpenOptions::new();
        options.create(true);

        if self.backups == 0 {
            options.write(true).truncate(true);
        } else {
            for n in (1..self.backups).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
            options.append(true);
        }

        self.file = options.open(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.size > 0 && self.size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
