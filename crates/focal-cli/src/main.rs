//! Focal CLI - Inspect the sync engine's local state
//!
//! Read-only views over the state database (sessions, queue, conflicts)
//! plus queue maintenance. Never talks to the network.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use focal_core::db::Database;
use focal_core::models::{SessionWithOperations, SyncConflict, SyncOperation};
use focal_core::queue::OfflineQueue;
use focal_core::tracker::StatusTracker;
use focal_core::SyncConfig;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "focal")]
#[command(about = "Inspect the Focal sync engine's local state")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the state database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show queue, conflict, and last-sync summary
    Status,
    /// List recent sync sessions with their operations
    Sessions {
        /// Number of sessions to show
        #[arg(short, long, default_value = "5")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect the offline operation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// List open sync conflicts
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete completed queue entries older than the horizon
    Cleanup {
        /// Horizon in days
        #[arg(long, default_value = "7")]
        days: u64,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Aggregate queue statistics
    Stats,
    /// List operations eligible for execution
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] focal_core::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("focal=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Status => run_status(&db_path).await?,
        Commands::Sessions { limit, json } => run_sessions(limit, json, &db_path).await?,
        Commands::Queue { command } => match command {
            QueueCommands::Stats => run_queue_stats(&db_path).await?,
            QueueCommands::List { json } => run_queue_list(json, &db_path).await?,
        },
        Commands::Conflicts { json } => run_conflicts(json, &db_path).await?,
        Commands::Cleanup { days } => run_cleanup(days, &db_path).await?,
    }

    Ok(())
}

fn resolve_db_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("focal")
        .join("sync.db")
}

fn open_queue(db_path: &Path) -> Result<OfflineQueue, CliError> {
    let db = Database::open(db_path)?.into_shared();
    Ok(OfflineQueue::new(db, SyncConfig::default().max_retries))
}

fn open_tracker(db_path: &Path) -> Result<StatusTracker, CliError> {
    Ok(StatusTracker::new(Database::open(db_path)?.into_shared()))
}

fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

async fn run_status(db_path: &Path) -> Result<(), CliError> {
    let db = Database::open(db_path)?.into_shared();
    let queue = OfflineQueue::new(db.clone(), SyncConfig::default().max_retries);
    let tracker = StatusTracker::new(db.clone());

    let stats = queue.stats().await?;
    let tracker_stats = tracker.statistics().await?;
    let session = tracker.last_session().await?;

    match tracker_stats.sessions.last_sync_at {
        Some(at) => println!("Last sync:       {}", format_timestamp(at)),
        None => println!("Last sync:       never"),
    }
    if let Some(session) = session {
        println!("Last session:    {} ({})", session.id, session.status.as_str());
    }
    println!("Queued:          {} total", stats.total);
    println!("  pending up:    {}", stats.pending_uploads);
    println!("  pending down:  {}", stats.pending_downloads);
    println!("  failed:        {}", stats.failed);

    let open = {
        use focal_core::db::{ConflictRepository, SqliteConflictRepository};
        let db = db.lock().await;
        SqliteConflictRepository::new(db.connection()).count_open()?
    };
    println!("Open conflicts:  {open}");
    Ok(())
}

async fn run_sessions(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let tracker = open_tracker(db_path)?;
    let sessions = tracker.recent_sessions(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else {
        for line in format_session_lines(&sessions) {
            println!("{line}");
        }
    }
    Ok(())
}

fn format_session_lines(sessions: &[SessionWithOperations]) -> Vec<String> {
    if sessions.is_empty() {
        return vec!["No sessions recorded".to_string()];
    }
    let mut lines = Vec::new();
    for entry in sessions {
        let session = &entry.session;
        lines.push(format!(
            "{}  {}  {}  ops {}/{} ok, {} failed, {} bytes",
            format_timestamp(session.started_at),
            session.id,
            session.status.as_str(),
            session.summary.completed_operations,
            session.summary.total_operations,
            session.summary.failed_operations,
            session.summary.bytes_transferred,
        ));
        for op in &entry.operations {
            lines.push(format!("    {}", format_operation(op)));
        }
    }
    lines
}

fn format_operation(op: &SyncOperation) -> String {
    let error = op
        .error
        .as_deref()
        .map(|e| format!("  [{e}]"))
        .unwrap_or_default();
    format!(
        "{:<13} {:<11} photo {}  retries {}{}",
        op.kind.as_str(),
        op.status.as_str(),
        op.photo_id,
        op.retry_count,
        error,
    )
}

async fn run_queue_stats(db_path: &Path) -> Result<(), CliError> {
    let stats = open_queue(db_path)?.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn run_queue_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let ops = open_queue(db_path)?.eligible().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&ops)?);
    } else if ops.is_empty() {
        println!("Queue is empty");
    } else {
        for op in &ops {
            println!("{}  {}", op.id, format_operation(op));
        }
    }
    Ok(())
}

async fn run_conflicts(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    use focal_core::db::{ConflictRepository, SqliteConflictRepository};

    let db = Database::open(db_path)?.into_shared();
    let conflicts = {
        let db = db.lock().await;
        SqliteConflictRepository::new(db.connection()).all_open()?
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
    } else if conflicts.is_empty() {
        println!("No open conflicts");
    } else {
        for conflict in &conflicts {
            println!("{}", format_conflict(conflict));
        }
    }
    Ok(())
}

fn format_conflict(conflict: &SyncConflict) -> String {
    format!(
        "{}  {}  photo {}  fields: {}",
        format_timestamp(conflict.details.detected_at),
        conflict.conflict_type.as_str(),
        conflict.photo_id,
        conflict.details.fields.join(", "),
    )
}

async fn run_cleanup(days: u64, db_path: &Path) -> Result<(), CliError> {
    let removed = open_queue(db_path)?
        .cleanup(Duration::from_secs(days * 24 * 60 * 60))
        .await?;
    tracing::info!(removed, days, "queue cleanup finished");
    println!("Removed {removed} completed operations");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use focal_core::models::{
        OperationKind, PhotoId, SessionStatus, SyncOperation, SyncSession,
    };

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_format_operation_includes_error() {
        let mut op = SyncOperation::new(OperationKind::Upload, PhotoId::new());
        op.error = Some("timed out".to_string());
        op.retry_count = 2;
        let line = format_operation(&op);
        assert!(line.contains("upload"));
        assert!(line.contains("retries 2"));
        assert!(line.contains("[timed out]"));
    }

    #[test]
    fn test_format_session_lines_empty() {
        assert_eq!(format_session_lines(&[]), vec!["No sessions recorded"]);
    }

    #[test]
    fn test_format_session_lines() {
        let mut session = SyncSession::new("user-1");
        session.status = SessionStatus::Completed;
        session.summary.total_operations = 2;
        session.summary.completed_operations = 2;
        let entry = SessionWithOperations {
            session,
            operations: vec![SyncOperation::new(OperationKind::Upload, PhotoId::new())],
        };
        let lines = format_session_lines(&[entry]);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("completed"));
        assert!(lines[0].contains("ops 2/2 ok"));
    }
}
