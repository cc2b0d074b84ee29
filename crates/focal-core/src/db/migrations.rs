//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    debug_assert!(get_version(conn)? == CURRENT_VERSION);
    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|v| v != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: initial schema
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- Offline queue
        CREATE TABLE IF NOT EXISTS queued_operations (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            photo_id TEXT NOT NULL,
            status TEXT NOT NULL,
            progress REAL NOT NULL DEFAULT 0,
            error TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_queue_status ON queued_operations(status);
        CREATE INDEX IF NOT EXISTS idx_queue_kind ON queued_operations(kind);
        CREATE INDEX IF NOT EXISTS idx_queue_photo ON queued_operations(photo_id);
        CREATE INDEX IF NOT EXISTS idx_queue_created ON queued_operations(created_at);

        -- Session history
        CREATE TABLE IF NOT EXISTS sync_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER,
            status TEXT NOT NULL,
            total_operations INTEGER NOT NULL DEFAULT 0,
            completed_operations INTEGER NOT NULL DEFAULT 0,
            failed_operations INTEGER NOT NULL DEFAULT 0,
            conflicts_resolved INTEGER NOT NULL DEFAULT 0,
            bytes_transferred INTEGER NOT NULL DEFAULT 0,
            conflict_ids TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_started ON sync_sessions(started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sync_sessions(status);

        -- Operations recorded against sessions (session_id is NULL for
        -- queue replays executed outside a session)
        CREATE TABLE IF NOT EXISTS session_operations (
            id TEXT PRIMARY KEY,
            session_id TEXT REFERENCES sync_sessions(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            photo_id TEXT NOT NULL,
            status TEXT NOT NULL,
            progress REAL NOT NULL DEFAULT 0,
            error TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_session_ops_session ON session_operations(session_id);
        CREATE INDEX IF NOT EXISTS idx_session_ops_status ON session_operations(status);
        CREATE INDEX IF NOT EXISTS idx_session_ops_updated ON session_operations(updated_at);

        -- Open conflicts; the UNIQUE photo_id enforces at most one open
        -- conflict per photo
        CREATE TABLE IF NOT EXISTS sync_conflicts (
            id TEXT PRIMARY KEY,
            photo_id TEXT NOT NULL UNIQUE,
            conflict_type TEXT NOT NULL,
            local_photo TEXT,
            remote_photo TEXT,
            details TEXT NOT NULL,
            detected_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conflicts_detected ON sync_conflicts(detected_at);

        -- Append-only resolution audit log
        CREATE TABLE IF NOT EXISTS conflict_resolutions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            conflict_id TEXT NOT NULL,
            strategy TEXT NOT NULL,
            resolved_photo TEXT NOT NULL,
            resolved_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_resolutions_conflict ON conflict_resolutions(conflict_id);

        INSERT INTO schema_version (version) VALUES (1);

        COMMIT;",
    )?;

    Ok(())
}
