//! Snapdeck command line
//!
//! Builds the snapshot index for a directory and prints it, or keeps it
//! fresh while snapshot and CSS files change.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use snapdeck::{
    ChannelBroadcaster, ConfigUpdate, IndexState, IndexerConfig, SnapshotIndex,
};
use snapdeck_logging::LogConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG_FILE: &str = "snapdeck.toml";

#[derive(Parser, Debug)]
#[command(name = "snapdeck", about = "Index snapshot files into a browsable folder tree")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory suite keys are relative to
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Snapshot file glob (repeatable, replaces configured patterns)
    #[arg(long = "snapshots", global = true)]
    snapshots: Vec<String>,

    /// Global CSS glob (repeatable, replaces configured patterns)
    #[arg(long = "css", global = true)]
    css: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the folder tree
    Tree {
        /// Output the folder dictionary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one suite as JSON
    Show {
        /// Suite key, e.g. -/src/button.snap.js
        key: String,
    },
    /// Print one folder node as JSON
    Folder {
        /// Folder path, e.g. -/src
        #[arg(default_value = "-")]
        path: String,
    },
    /// Keep the index fresh and report every refresh until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match snapdeck_logging::init_logging(LogConfig {
        verbose: cli.verbose,
        log_to_file: matches!(cli.command, Commands::Watch),
    }) {
        Ok(Some(path)) => debug!(log_file = %path.display(), "Logging to file"),
        Ok(None) => {}
        Err(e) => eprintln!("Warning: logging disabled: {e:#}"),
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Tree { json } => {
            let index = SnapshotIndex::new(config);
            index.refresh().await.context("Failed to build snapshot index")?;
            let state = index.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&state.folders)?);
            } else {
                print_tree(&state);
            }
        }
        Commands::Show { key } => {
            let index = SnapshotIndex::new(config);
            index.refresh().await.context("Failed to build snapshot index")?;
            let Some(suite) = index.get_snapshot_suite(&key) else {
                bail!("No suite with key '{}'", key);
            };
            println!("{}", serde_json::to_string_pretty(suite.as_ref())?);
        }
        Commands::Folder { path } => {
            let index = SnapshotIndex::new(config);
            index.refresh().await.context("Failed to build snapshot index")?;
            let Some(folder) = index.get_folder(&path) else {
                bail!("No folder '{}'", path);
            };
            println!("{}", serde_json::to_string_pretty(&folder)?);
        }
        Commands::Watch => watch(config).await?,
    }

    Ok(())
}

/// Config file (explicit, or `snapdeck.toml` if present) with flags on top.
fn load_config(cli: &Cli) -> Result<IndexerConfig> {
    let mut config = match &cli.config {
        Some(path) => IndexerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            IndexerConfig::load(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG_FILE))?
        }
        None => IndexerConfig::default(),
    };

    config.merge(ConfigUpdate {
        root_dir: cli.root.clone(),
        snapshot_patterns: (!cli.snapshots.is_empty()).then(|| cli.snapshots.clone()),
        css_patterns: (!cli.css.is_empty()).then(|| cli.css.clone()),
        watch: matches!(cli.command, Commands::Watch).then_some(true),
    });
    Ok(config)
}

async fn watch(config: IndexerConfig) -> Result<()> {
    let broadcaster = Arc::new(ChannelBroadcaster::new());
    let mut events = broadcaster.subscribe();
    let index = Arc::new(SnapshotIndex::new(config).with_broadcaster(broadcaster));

    index.start().await.context("Failed to build snapshot index")?;
    for root in index.watch_roots() {
        println!("watching {}", root.display());
    }
    info!("Watching; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(_) => {
                    let state = index.snapshot();
                    println!(
                        "refresh #{}: {} suites, {} folders",
                        state.generation,
                        state.suite_count(),
                        state.folders.len()
                    );
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        }
    }

    index.stop_watching();
    Ok(())
}

fn print_tree(state: &IndexState) {
    for (depth, node) in state.folders.walk() {
        let indent = "  ".repeat(depth);
        println!("{}{}/", indent, node.name());
        for file in &node.file_paths {
            let name = file.rsplit('/').next().unwrap_or(file);
            let entries = state.suites.get(file).map(|s| s.len()).unwrap_or(0);
            println!("{}  {} ({} snapshots)", indent, name, entries);
        }
    }
}
