//! Session and session-operation repository

use rusqlite::types::Type;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{SessionId, SessionSummary, SyncOperation, SyncSession};

/// Aggregates over the full session history
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct SessionAggregates {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub cancelled: u32,
    /// Mean duration of finalized sessions in milliseconds; 0 when empty
    pub avg_duration_ms: f64,
    pub total_bytes_transferred: u64,
    /// End time of the most recent completed session
    pub last_sync_at: Option<i64>,
}

/// Aggregates over recorded operations, optionally windowed
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct OperationAggregates {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    /// Mean wall time of completed operations in milliseconds; 0 when empty
    pub avg_duration_ms: f64,
}

/// Trait for durable session/operation history storage
pub trait SessionRepository {
    /// Insert or replace a session
    fn upsert_session(&self, session: &SyncSession) -> Result<()>;

    /// Fetch a session by ID
    fn session(&self, id: &SessionId) -> Result<Option<SyncSession>>;

    /// Most recently started session
    fn last_session(&self) -> Result<Option<SyncSession>>;

    /// The N most recently started sessions
    fn recent_sessions(&self, limit: usize) -> Result<Vec<SyncSession>>;

    /// Insert or replace an operation record; `session_id` is `None` for
    /// queue replays executed outside a session
    fn upsert_operation(&self, session_id: Option<&SessionId>, op: &SyncOperation) -> Result<()>;

    /// Operations recorded for a session, in creation order
    fn operations_for(&self, session_id: &SessionId) -> Result<Vec<SyncOperation>>;

    /// Failed operations still below the retry maximum, across all history
    fn failed_retryable(&self, max_retries: u32) -> Result<Vec<SyncOperation>>;

    /// Aggregates over all sessions
    fn session_aggregates(&self) -> Result<SessionAggregates>;

    /// Aggregates over operations updated at or after `since_ms`
    /// (pass 0 for all history)
    fn operation_aggregates(&self, since_ms: i64) -> Result<OperationAggregates>;
}

/// `SQLite` implementation of `SessionRepository`
pub struct SqliteSessionRepository<'a> {
    conn: &'a Connection,
}

const SESSION_COLUMNS: &str = "id, user_id, started_at, ended_at, status, total_operations, \
     completed_operations, failed_operations, conflicts_resolved, bytes_transferred, conflict_ids";

const OPERATION_COLUMNS: &str =
    "id, kind, photo_id, status, progress, error, retry_count, created_at, updated_at";

impl<'a> SqliteSessionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncSession> {
        let id: String = row.get(0)?;
        let status: String = row.get(4)?;
        let conflict_ids: String = row.get(10)?;
        Ok(SyncSession {
            id: id
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
            user_id: row.get(1)?,
            started_at: row.get(2)?,
            ended_at: row.get(3)?,
            status: status
                .parse()
                .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?,
            summary: SessionSummary {
                total_operations: row.get(5)?,
                completed_operations: row.get(6)?,
                failed_operations: row.get(7)?,
                conflicts_resolved: row.get(8)?,
                bytes_transferred: row.get(9)?,
            },
            conflict_ids: serde_json::from_str(&conflict_ids).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e))
            })?,
        })
    }

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
}

impl SessionRepository for SqliteSessionRepository<'_> {
    fn upsert_session(&self, session: &SyncSession) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_sessions
             (id, user_id, started_at, ended_at, status, total_operations,
              completed_operations, failed_operations, conflicts_resolved,
              bytes_transferred, conflict_ids)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                session.id.as_str(),
                session.user_id,
                session.started_at,
                session.ended_at,
                session.status.as_str(),
                session.summary.total_operations,
                session.summary.completed_operations,
                session.summary.failed_operations,
                session.summary.conflicts_resolved,
                session.summary.bytes_transferred,
                serde_json::to_string(&session.conflict_ids)?,
            ],
        )?;
        Ok(())
    }

    fn session(&self, id: &SessionId) -> Result<Option<SyncSession>> {
        let result = self.conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sync_sessions WHERE id = ?"),
            params![id.as_str()],
            Self::parse_session,
        );

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn last_session(&self) -> Result<Option<SyncSession>> {
        let result = self.conn.query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sync_sessions
                 ORDER BY started_at DESC LIMIT 1"
            ),
            [],
            Self::parse_session,
        );

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn recent_sessions(&self, limit: usize) -> Result<Vec<SyncSession>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sync_sessions
             ORDER BY started_at DESC LIMIT ?"
        ))?;
        let sessions = stmt
            .query_map(params![limit as i64], Self::parse_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    fn upsert_operation(&self, session_id: Option<&SessionId>, op: &SyncOperation) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO session_operations
             (id, session_id, kind, photo_id, status, progress, error,
              retry_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                op.id.as_str(),
                session_id.map(SessionId::as_str),
                op.kind.as_str(),
                op.photo_id.as_str(),
                op.status.as_str(),
                op.progress,
                op.error,
                op.retry_count,
                op.created_at,
                op.updated_at,
            ],
        )?;
        Ok(())
    }

    fn operations_for(&self, session_id: &SessionId) -> Result<Vec<SyncOperation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OPERATION_COLUMNS} FROM session_operations
             WHERE session_id = ? ORDER BY created_at ASC"
        ))?;
        let ops = stmt
            .query_map(params![session_id.as_str()], Self::parse_operation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ops)
    }

    fn failed_retryable(&self, max_retries: u32) -> Result<Vec<SyncOperation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OPERATION_COLUMNS} FROM session_operations
             WHERE status = 'failed' AND retry_count < ?
             ORDER BY created_at ASC"
        ))?;
        let ops = stmt
            .query_map(params![max_retries], Self::parse_operation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ops)
    }

    fn session_aggregates(&self) -> Result<SessionAggregates> {
        let row = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'completed'), 0),
                    COALESCE(SUM(status = 'failed'), 0),
                    COALESCE(SUM(status = 'cancelled'), 0),
                    COALESCE(AVG(CASE WHEN ended_at IS NOT NULL
                                 THEN ended_at - started_at END), 0),
                    COALESCE(SUM(bytes_transferred), 0),
                    MAX(CASE WHEN status = 'completed' THEN ended_at END)
             FROM sync_sessions",
            [],
            |row| {
                Ok(SessionAggregates {
                    total: row.get(0)?,
                    completed: row.get(1)?,
                    failed: row.get(2)?,
                    cancelled: row.get(3)?,
                    avg_duration_ms: row.get(4)?,
                    total_bytes_transferred: row.get(5)?,
                    last_sync_at: row.get(6)?,
                })
            },
        )?;
        Ok(row)
    }

    fn operation_aggregates(&self, since_ms: i64) -> Result<OperationAggregates> {
        let row = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'completed'), 0),
                    COALESCE(SUM(status = 'failed'), 0),
                    COALESCE(AVG(CASE WHEN status = 'completed'
                                 THEN updated_at - created_at END), 0)
             FROM session_operations
             WHERE updated_at >= ?",
            params![since_ms],
            |row| {
                Ok(OperationAggregates {
                    total: row.get(0)?,
                    completed: row.get(1)?,
                    failed: row.get(2)?,
                    avg_duration_ms: row.get(3)?,
                })
            },
        )?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{OperationKind, OperationStatus, PhotoId, SessionStatus};

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_upsert_and_fetch_session() {
        let db = setup();
        let repo = SqliteSessionRepository::new(db.connection());

        let session = SyncSession::new("user-1");
        repo.upsert_session(&session).unwrap();

        let fetched = repo.session(&session.id).unwrap().unwrap();
        assert_eq!(fetched, session);
    }

    #[test]
    fn test_upsert_replaces() {
        let db = setup();
        let repo = SqliteSessionRepository::new(db.connection());

        let mut session = SyncSession::new("user-1");
        repo.upsert_session(&session).unwrap();

        session.status = SessionStatus::Completed;
        session.ended_at = Some(session.started_at + 100);
        session.summary.total_operations = 4;
        repo.upsert_session(&session).unwrap();

        let fetched = repo.session(&session.id).unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Completed);
        assert_eq!(fetched.summary.total_operations, 4);
    }

    #[test]
    fn test_last_and_recent_sessions() {
        let db = setup();
        let repo = SqliteSessionRepository::new(db.connection());

        let mut older = SyncSession::new("user-1");
        older.started_at = 100;
        let mut newer = SyncSession::new("user-1");
        newer.started_at = 200;
        repo.upsert_session(&older).unwrap();
        repo.upsert_session(&newer).unwrap();

        assert_eq!(repo.last_session().unwrap().unwrap().id, newer.id);

        let recent = repo.recent_sessions(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, newer.id);

        assert_eq!(repo.recent_sessions(1).unwrap().len(), 1);
    }

    #[test]
    fn test_operations_for_session() {
        let db = setup();
        let repo = SqliteSessionRepository::new(db.connection());

        let session = SyncSession::new("user-1");
        repo.upsert_session(&session).unwrap();

        let mut first = SyncOperation::new(OperationKind::Upload, PhotoId::new());
        first.created_at = 100;
        let mut second = SyncOperation::new(OperationKind::Download, PhotoId::new());
        second.created_at = 200;
        repo.upsert_operation(Some(&session.id), &second).unwrap();
        repo.upsert_operation(Some(&session.id), &first).unwrap();

        let ops = repo.operations_for(&session.id).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].id, first.id);
    }

    #[test]
    fn test_operation_without_session() {
        let db = setup();
        let repo = SqliteSessionRepository::new(db.connection());

        let mut op = SyncOperation::new(OperationKind::Upload, PhotoId::new());
        op.status = OperationStatus::Failed;
        op.retry_count = 1;
        repo.upsert_operation(None, &op).unwrap();

        let retryable = repo.failed_retryable(3).unwrap();
        assert_eq!(retryable.len(), 1);
        assert_eq!(retryable[0].id, op.id);

        assert!(repo.failed_retryable(1).unwrap().is_empty());
    }

    #[test]
    fn test_aggregates_on_empty_history() {
        let db = setup();
        let repo = SqliteSessionRepository::new(db.connection());

        let sessions = repo.session_aggregates().unwrap();
        assert_eq!(sessions.total, 0);
        assert!(sessions.avg_duration_ms.abs() < f64::EPSILON);
        assert!(sessions.last_sync_at.is_none());

        let ops = repo.operation_aggregates(0).unwrap();
        assert_eq!(ops.total, 0);
        assert!(ops.avg_duration_ms.abs() < f64::EPSILON);
    }

    #[test]
    fn test_session_aggregates() {
        let db = setup();
        let repo = SqliteSessionRepository::new(db.connection());

        let mut done = SyncSession::new("user-1");
        done.status = SessionStatus::Completed;
        done.started_at = 1000;
        done.ended_at = Some(3000);
        done.summary.bytes_transferred = 500;
        let mut failed = SyncSession::new("user-1");
        failed.status = SessionStatus::Failed;
        failed.started_at = 4000;
        failed.ended_at = Some(5000);
        repo.upsert_session(&done).unwrap();
        repo.upsert_session(&failed).unwrap();

        let agg = repo.session_aggregates().unwrap();
        assert_eq!(agg.total, 2);
        assert_eq!(agg.completed, 1);
        assert_eq!(agg.failed, 1);
        assert!((agg.avg_duration_ms - 1500.0).abs() < f64::EPSILON);
        assert_eq!(agg.total_bytes_transferred, 500);
        assert_eq!(agg.last_sync_at, Some(3000));
    }
}
