//! Offline queue repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for counters

use rusqlite::types::Type;
use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{now_ms, OperationId, OperationKind, OperationStatus, PhotoId, SyncOperation};

/// Aggregate statistics over the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct QueueStats {
    pub total: u32,
    pub pending: u32,
    pub in_progress: u32,
    pub completed: u32,
    pub failed: u32,
    pub uploads: u32,
    pub downloads: u32,
    pub deletes: u32,
    pub metadata_syncs: u32,
    pub pending_uploads: u32,
    pub pending_downloads: u32,
}

/// Trait for durable queued-operation storage
pub trait QueueRepository {
    /// Append a new operation
    fn insert(&self, op: &SyncOperation) -> Result<()>;

    /// Fetch an operation by ID
    fn get(&self, id: &OperationId) -> Result<Option<SyncOperation>>;

    /// Remove an operation by ID
    fn remove(&self, id: &OperationId) -> Result<()>;

    /// Replace an operation in place
    fn update(&self, op: &SyncOperation) -> Result<()>;

    /// Operations eligible for execution: pending, or failed with retry
    /// count below the maximum, ordered by creation time
    fn eligible(&self, max_retries: u32) -> Result<Vec<SyncOperation>>;

    /// All operations of the given kind, oldest first
    fn by_kind(&self, kind: OperationKind) -> Result<Vec<SyncOperation>>;

    /// All operations targeting the given photo, oldest first
    fn by_photo(&self, photo_id: &PhotoId) -> Result<Vec<SyncOperation>>;

    /// Failed operations with retry count below the maximum
    fn retryable(&self, max_retries: u32) -> Result<Vec<SyncOperation>>;

    /// Oldest pending operation, if any
    fn next_pending(&self) -> Result<Option<SyncOperation>>;

    /// Whether an operation with the given ID is queued
    fn contains(&self, id: &OperationId) -> Result<bool>;

    /// Transition to `in_progress`
    fn mark_in_progress(&self, id: &OperationId) -> Result<()>;

    /// Transition to `completed` with full progress
    fn mark_completed(&self, id: &OperationId) -> Result<()>;

    /// Transition to `failed`, incrementing the retry count and recording
    /// the error
    fn mark_failed(&self, id: &OperationId, error: &str) -> Result<()>;

    /// Transition back to `pending` for a later retry
    fn mark_pending(&self, id: &OperationId) -> Result<()>;

    /// Delete completed entries updated before the given time; returns the
    /// number removed
    fn cleanup_completed(&self, older_than_ms: i64) -> Result<usize>;

    /// Aggregate counts by status and kind
    fn stats(&self) -> Result<QueueStats>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

const SELECT_COLUMNS: &str =
    "id, kind, photo_id, status, progress, error, retry_count, created_at, updated_at";

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an operation from a database row
    fn parse_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncOperation> {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let photo_id: String = row.get(2)?;
        let status: String = row.get(3)?;
        Ok(SyncOperation {
            id: id
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
            kind: kind
                .parse()
                .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?,
            photo_id: photo_id
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
            status: status
                .parse()
                .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?,
            progress: row.get(4)?,
            error: row.get(5)?,
            retry_count: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn query_list(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<SyncOperation>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ops = stmt
            .query_map(params, Self::parse_operation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ops)
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> Result<u32> {
        let count: u32 = self.conn.query_row(sql, params, |row| row.get(0))?;
        Ok(count)
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn insert(&self, op: &SyncOperation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO queued_operations
             (id, kind, photo_id, status, progress, error, retry_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                op.id.as_str(),
                op.kind.as_str(),
                op.photo_id.as_str(),
                op.status.as_str(),
                op.progress,
                op.error,
                op.retry_count,
                op.created_at,
                op.updated_at
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &OperationId) -> Result<Option<SyncOperation>> {
        let result = self.conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM queued_operations WHERE id = ?"),
            params![id.as_str()],
            Self::parse_operation,
        );

        match result {
            Ok(op) => Ok(Some(op)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, id: &OperationId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM queued_operations WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(())
    }

    fn update(&self, op: &SyncOperation) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE queued_operations
             SET kind = ?, photo_id = ?, status = ?, progress = ?, error = ?,
                 retry_count = ?, updated_at = ?
             WHERE id = ?",
            params![
                op.kind.as_str(),
                op.photo_id.as_str(),
                op.status.as_str(),
                op.progress,
                op.error,
                op.retry_count,
                now_ms(),
                op.id.as_str()
            ],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(op.id.to_string()));
        }
        Ok(())
    }

    fn eligible(&self, max_retries: u32) -> Result<Vec<SyncOperation>> {
        self.query_list(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM queued_operations
                 WHERE status = 'pending' OR (status = 'failed' AND retry_count < ?)
                 ORDER BY created_at ASC"
            ),
            params![max_retries],
        )
    }

    fn by_kind(&self, kind: OperationKind) -> Result<Vec<SyncOperation>> {
        self.query_list(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM queued_operations
                 WHERE kind = ? ORDER BY created_at ASC"
            ),
            params![kind.as_str()],
        )
    }

    fn by_photo(&self, photo_id: &PhotoId) -> Result<Vec<SyncOperation>> {
        self.query_list(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM queued_operations
                 WHERE photo_id = ? ORDER BY created_at ASC"
            ),
            params![photo_id.as_str()],
        )
    }

    fn retryable(&self, max_retries: u32) -> Result<Vec<SyncOperation>> {
        self.query_list(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM queued_operations
                 WHERE status = 'failed' AND retry_count < ?
                 ORDER BY created_at ASC"
            ),
            params![max_retries],
        )
    }

    fn next_pending(&self) -> Result<Option<SyncOperation>> {
        let result = self.conn.query_row(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM queued_operations
                 WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1"
            ),
            [],
            Self::parse_operation,
        );

        match result {
            Ok(op) => Ok(Some(op)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, id: &OperationId) -> Result<bool> {
        let count = self.count(
            "SELECT COUNT(*) FROM queued_operations WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(count > 0)
    }

    fn mark_in_progress(&self, id: &OperationId) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE queued_operations SET status = 'in_progress', updated_at = ? WHERE id = ?",
            params![now_ms(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn mark_completed(&self, id: &OperationId) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE queued_operations
             SET status = 'completed', progress = 100, error = NULL, updated_at = ?
             WHERE id = ?",
            params![now_ms(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn mark_failed(&self, id: &OperationId, error: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE queued_operations
             SET status = 'failed', retry_count = retry_count + 1, error = ?, updated_at = ?
             WHERE id = ?",
            params![error, now_ms(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn mark_pending(&self, id: &OperationId) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE queued_operations SET status = 'pending', updated_at = ? WHERE id = ?",
            params![now_ms(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn cleanup_completed(&self, older_than_ms: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM queued_operations WHERE status = 'completed' AND updated_at < ?",
            params![older_than_ms],
        )?;
        Ok(rows)
    }

    fn stats(&self) -> Result<QueueStats> {
        let status_count = |status: &str| {
            self.count(
                "SELECT COUNT(*) FROM queued_operations WHERE status = ?",
                params![status],
            )
        };
        let kind_count = |kind: &str| {
            self.count(
                "SELECT COUNT(*) FROM queued_operations WHERE kind = ?",
                params![kind],
            )
        };
        let pending_kind_count = |kind: &str| {
            self.count(
                "SELECT COUNT(*) FROM queued_operations WHERE status = 'pending' AND kind = ?",
                params![kind],
            )
        };

        Ok(QueueStats {
            total: self.count("SELECT COUNT(*) FROM queued_operations", [])?,
            pending: status_count("pending")?,
            in_progress: status_count("in_progress")?,
            completed: status_count("completed")?,
            failed: status_count("failed")?,
            uploads: kind_count("upload")?,
            downloads: kind_count("download")?,
            deletes: kind_count("delete")?,
            metadata_syncs: kind_count("metadata_sync")?,
            pending_uploads: pending_kind_count("upload")?,
            pending_downloads: pending_kind_count("download")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn op(kind: OperationKind) -> SyncOperation {
        SyncOperation::new(kind, PhotoId::new())
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let operation = op(OperationKind::Upload);
        repo.insert(&operation).unwrap();

        let fetched = repo.get(&operation.id).unwrap().unwrap();
        assert_eq!(fetched, operation);
        assert!(repo.contains(&operation.id).unwrap());
    }

    #[test]
    fn test_eligible_ordering_and_filtering() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let mut first = op(OperationKind::Upload);
        first.created_at = 100;
        let mut second = op(OperationKind::Download);
        second.created_at = 200;
        let mut exhausted = op(OperationKind::Upload);
        exhausted.created_at = 50;
        exhausted.status = OperationStatus::Failed;
        exhausted.retry_count = 3;

        repo.insert(&first).unwrap();
        repo.insert(&second).unwrap();
        repo.insert(&exhausted).unwrap();

        let eligible = repo.eligible(3).unwrap();
        assert_eq!(eligible.len(), 2);
        assert_eq!(eligible[0].id, first.id);
        assert_eq!(eligible[1].id, second.id);
    }

    #[test]
    fn test_mark_failed_increments_retry() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let operation = op(OperationKind::Upload);
        repo.insert(&operation).unwrap();

        repo.mark_failed(&operation.id, "connection reset").unwrap();
        let fetched = repo.get(&operation.id).unwrap().unwrap();
        assert_eq!(fetched.status, OperationStatus::Failed);
        assert_eq!(fetched.retry_count, 1);
        assert_eq!(fetched.error.as_deref(), Some("connection reset"));

        repo.mark_failed(&operation.id, "timeout").unwrap();
        let fetched = repo.get(&operation.id).unwrap().unwrap();
        assert_eq!(fetched.retry_count, 2);
        assert_eq!(fetched.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_mark_completed_clears_error() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let operation = op(OperationKind::Download);
        repo.insert(&operation).unwrap();
        repo.mark_failed(&operation.id, "oops").unwrap();
        repo.mark_completed(&operation.id).unwrap();

        let fetched = repo.get(&operation.id).unwrap().unwrap();
        assert_eq!(fetched.status, OperationStatus::Completed);
        assert!(fetched.error.is_none());
        assert!((fetched.progress - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mark_missing_is_not_found() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());
        let missing = OperationId::new();
        assert!(matches!(
            repo.mark_in_progress(&missing),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_cleanup_only_removes_old_completed() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let done = op(OperationKind::Upload);
        let pending = op(OperationKind::Upload);
        repo.insert(&done).unwrap();
        repo.insert(&pending).unwrap();
        repo.mark_completed(&done.id).unwrap();

        // Horizon in the future relative to the completed entry
        let removed = repo.cleanup_completed(now_ms() + 1000).unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get(&done.id).unwrap().is_none());
        assert!(repo.get(&pending.id).unwrap().is_some());
    }

    #[test]
    fn test_stats() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        repo.insert(&op(OperationKind::Upload)).unwrap();
        repo.insert(&op(OperationKind::Upload)).unwrap();
        repo.insert(&op(OperationKind::Download)).unwrap();
        let failed = op(OperationKind::MetadataSync);
        repo.insert(&failed).unwrap();
        repo.mark_failed(&failed.id, "boom").unwrap();

        let stats = repo.stats().unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.uploads, 2);
        assert_eq!(stats.pending_uploads, 2);
        assert_eq!(stats.pending_downloads, 1);
        assert_eq!(stats.metadata_syncs, 1);
    }

    #[test]
    fn test_next_pending_is_oldest() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let mut newer = op(OperationKind::Upload);
        newer.created_at = 500;
        let mut older = op(OperationKind::Download);
        older.created_at = 100;
        repo.insert(&newer).unwrap();
        repo.insert(&older).unwrap();

        let next = repo.next_pending().unwrap().unwrap();
        assert_eq!(next.id, older.id);
    }
}
