use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use collaboration::{
    DocumentBackend, DocumentId, HttpBackend, Origin, SignalSource, SyncConfig, SyncSession,
    UserId,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use timeline::{apply_operations, diff, Operation, Timeline};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "timeline-sync")]
#[command(about = "Timeline snapshot diffing and live document synchronization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the operations that turn one snapshot into another
    Diff {
        /// Snapshot before the edit
        old: PathBuf,

        /// Snapshot after the edit
        new: PathBuf,
    },

    /// Apply an operation list to a snapshot and print the result
    Apply {
        /// Snapshot to patch
        timeline: PathBuf,

        /// JSON array of operations
        operations: PathBuf,
    },

    /// Check a snapshot for duplicate ids
    Validate {
        /// Snapshot file path
        timeline: PathBuf,
    },

    /// Follow a backend document and log its activity until Ctrl-C
    Watch {
        /// Backend base URL
        #[arg(long)]
        base_url: String,

        /// Document id
        #[arg(short, long)]
        document: String,

        /// Identity this session writes and filters under
        #[arg(short, long)]
        user: String,

        /// Sync configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Poll only, without the server-push channel
        #[arg(long)]
        no_push: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Diff { old, new } => diff_command(old, new),
        Commands::Apply {
            timeline,
            operations,
        } => apply_command(timeline, operations),
        Commands::Validate { timeline } => validate_command(timeline),
        Commands::Watch {
            base_url,
            document,
            user,
            config,
            no_push,
        } => watch_command(base_url, document, user, config, no_push).await,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn diff_command(old_path: PathBuf, new_path: PathBuf) -> Result<()> {
    let old: Timeline = read_json(&old_path)?;
    let new: Timeline = read_json(&new_path)?;

    let operations = diff(&old, &new);
    info!("{} operation(s)", operations.len());
    println!("{}", serde_json::to_string_pretty(&operations)?);
    Ok(())
}

fn apply_command(timeline_path: PathBuf, operations_path: PathBuf) -> Result<()> {
    let mut timeline: Timeline = read_json(&timeline_path)?;
    let operations: Vec<Operation> = read_json(&operations_path)?;

    let report = apply_operations(&mut timeline, &operations);
    for skipped in &report.skipped {
        warn!(
            "skipped operation #{} ({}): {}",
            skipped.index, skipped.kind, skipped.reason
        );
    }
    info!(
        "applied {} of {} operation(s)",
        report.applied,
        operations.len()
    );

    println!("{}", serde_json::to_string_pretty(&timeline)?);
    Ok(())
}

fn validate_command(timeline_path: PathBuf) -> Result<()> {
    let timeline: Timeline = read_json(&timeline_path)?;
    timeline
        .validate()
        .with_context(|| format!("{} is not a valid timeline", timeline_path.display()))?;

    info!(
        "{}: {} layer(s), {} audio track(s), {} clip(s), {} marker(s), version {}",
        timeline_path.display(),
        timeline.layers.len(),
        timeline.audio_tracks.len(),
        timeline.clip_count(),
        timeline.markers.len(),
        timeline.version
    );
    Ok(())
}

async fn watch_command(
    base_url: String,
    document: String,
    user: String,
    config_path: Option<PathBuf>,
    no_push: bool,
) -> Result<()> {
    let config = match config_path {
        Some(path) => SyncConfig::from_path(&path)?,
        None => SyncConfig::default(),
    };

    let http = HttpBackend::new(
        base_url,
        DocumentId::from(document.as_str()),
        UserId::from(user.as_str()),
    );
    let signals: Option<Arc<dyn SignalSource>> = if no_push {
        None
    } else {
        Some(Arc::new(http.signal_source()))
    };
    let backend: Arc<dyn DocumentBackend> = Arc::new(http);

    let session = SyncSession::load(UserId::from(user.as_str()), backend, signals, config)
        .await
        .context("failed to load document")?;
    let initial = session.editor().current();
    info!(
        "Watching document {} at version {} ({} clip(s))",
        document,
        initial.version,
        initial.clip_count()
    );

    session.start();
    let mut activity = session.activity();
    let mut last_seen: Option<String> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = activity.changed() => {
                if changed.is_err() {
                    break;
                }
                let entries = activity.borrow_and_update().clone();
                for entry in entries
                    .iter()
                    .take_while(|e| Some(&e.id) != last_seen.as_ref())
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                {
                    let origin = match entry.origin {
                        Origin::Local => "local",
                        Origin::Remote => "remote",
                    };
                    info!(
                        "v{} {} by {} ({}, {} operation(s))",
                        entry.version, entry.kind, entry.user_id, origin, entry.operation_count
                    );
                }
                last_seen = entries.first().map(|e| e.id.clone());
            }
        }
    }

    info!("Stopping sync");
    session.pause().await;
    Ok(())
}
