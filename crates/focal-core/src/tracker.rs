//! Session and operation status tracking
//!
//! Durable recorder of sync sessions and their operations, with progress
//! computation, aggregate statistics, health metrics, and a synchronous
//! progress-subscription mechanism.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use crate::db::{
    OperationAggregates, SessionAggregates, SessionRepository, SharedDatabase,
    SqliteSessionRepository,
};
use crate::error::Result;
use crate::models::{
    now_ms, OperationStatus, SessionId, SessionWithOperations, SyncOperation, SyncSession,
};

/// Snapshot of an active session's progress
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SyncProgress {
    pub session_id: SessionId,
    pub total_operations: u32,
    pub completed_operations: u32,
    pub failed_operations: u32,
    /// The operation currently in flight, if any
    pub current_operation: Option<SyncOperation>,
    /// Completion percentage in [0, 100]; 100 when there is nothing to do
    pub percent_complete: f64,
    /// Estimated remaining time in milliseconds, derived from the mean
    /// duration of completed operations; absent without a basis
    pub eta_ms: Option<f64>,
}

/// Combined session and operation aggregates over the full history
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct TrackerStats {
    pub sessions: SessionAggregates,
    pub operations: OperationAggregates,
}

/// Health metrics over a trailing window
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct HealthReport {
    /// Share of windowed operations that completed, in [0, 100];
    /// 100 when the window holds no operations
    pub success_rate: f64,
    pub avg_operation_duration_ms: f64,
    pub recent_failures: u32,
    pub queue_backlog: u32,
}

type ProgressCallback = Box<dyn Fn(&SyncProgress) + Send + Sync>;

/// Handle returned by [`StatusTracker::subscribe`]; dropping it does NOT
/// unsubscribe, call [`SubscriptionHandle::unsubscribe`]
pub struct SubscriptionHandle {
    id: u64,
    subscribers: Arc<StdMutex<Vec<(u64, ProgressCallback)>>>,
}

impl SubscriptionHandle {
    /// Remove the associated callback
    pub fn unsubscribe(self) {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|(id, _)| *id != self.id);
    }
}

/// Records sessions and operations and answers status queries
#[derive(Clone)]
pub struct StatusTracker {
    db: SharedDatabase,
    subscribers: Arc<StdMutex<Vec<(u64, ProgressCallback)>>>,
    next_subscriber: Arc<AtomicU64>,
}

impl StatusTracker {
    /// Create a tracker over the given database
    #[must_use]
    pub fn new(db: SharedDatabase) -> Self {
        Self {
            db,
            subscribers: Arc::new(StdMutex::new(Vec::new())),
            next_subscriber: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Insert or replace a session record
    pub async fn record_session(&self, session: &SyncSession) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSessionRepository::new(db.connection()).upsert_session(session)
    }

    /// Insert or replace an operation record, then notify subscribers
    /// with a fresh progress snapshot
    ///
    /// Operations replayed outside a session are recorded with no session
    /// reference and produce no notification.
    pub async fn record_operation(
        &self,
        session_id: Option<&SessionId>,
        op: &SyncOperation,
    ) -> Result<()> {
        {
            let db = self.db.lock().await;
            SqliteSessionRepository::new(db.connection()).upsert_operation(session_id, op)?;
        }

        if let Some(session_id) = session_id {
            if let Some(progress) = self.progress(session_id).await? {
                self.notify(&progress);
            }
        }
        Ok(())
    }

    /// Most recently started session
    pub async fn last_session(&self) -> Result<Option<SyncSession>> {
        let db = self.db.lock().await;
        SqliteSessionRepository::new(db.connection()).last_session()
    }

    /// Session by ID
    pub async fn session(&self, id: &SessionId) -> Result<Option<SyncSession>> {
        let db = self.db.lock().await;
        SqliteSessionRepository::new(db.connection()).session(id)
    }

    /// The N most recent sessions with their operations loaded
    pub async fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionWithOperations>> {
        let db = self.db.lock().await;
        let repo = SqliteSessionRepository::new(db.connection());
        let sessions = repo.recent_sessions(limit)?;
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            let operations = repo.operations_for(&session.id)?;
            out.push(SessionWithOperations {
                session,
                operations,
            });
        }
        Ok(out)
    }

    /// Operations recorded for a session, in creation order
    pub async fn operations(&self, session_id: &SessionId) -> Result<Vec<SyncOperation>> {
        let db = self.db.lock().await;
        SqliteSessionRepository::new(db.connection()).operations_for(session_id)
    }

    /// Failed operations still eligible for retry
    pub async fn failed_retryable(&self, max_retries: u32) -> Result<Vec<SyncOperation>> {
        let db = self.db.lock().await;
        SqliteSessionRepository::new(db.connection()).failed_retryable(max_retries)
    }

    /// Aggregate statistics over the full history
    ///
    /// Empty history yields zero counts, zero averages, and no last-sync
    /// time rather than NaN.
    pub async fn statistics(&self) -> Result<TrackerStats> {
        let db = self.db.lock().await;
        let repo = SqliteSessionRepository::new(db.connection());
        Ok(TrackerStats {
            sessions: repo.session_aggregates()?,
            operations: repo.operation_aggregates(0)?,
        })
    }

    /// Progress snapshot for a session, or `None` if the session is unknown
    pub async fn progress(&self, session_id: &SessionId) -> Result<Option<SyncProgress>> {
        let db = self.db.lock().await;
        let repo = SqliteSessionRepository::new(db.connection());
        if repo.session(session_id)?.is_none() {
            return Ok(None);
        }
        let ops = repo.operations_for(session_id)?;
        drop(db);
        Ok(Some(compute_progress(*session_id, &ops)))
    }

    /// Health metrics over a trailing window
    ///
    /// `queue_backlog` is supplied by the caller because the queue owns
    /// its own state.
    pub async fn health(&self, window: Duration, queue_backlog: u32) -> Result<HealthReport> {
        let since = now_ms() - i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let db = self.db.lock().await;
        let ops = SqliteSessionRepository::new(db.connection()).operation_aggregates(since)?;
        drop(db);

        let success_rate = if ops.total == 0 {
            100.0
        } else {
            f64::from(ops.completed) / f64::from(ops.total) * 100.0
        };
        Ok(HealthReport {
            success_rate,
            avg_operation_duration_ms: ops.avg_duration_ms,
            recent_failures: ops.failed,
            queue_backlog,
        })
    }

    /// Register a progress callback, invoked synchronously after every
    /// in-session operation update in registration order
    ///
    /// A panicking callback is isolated: it neither prevents later
    /// callbacks from running nor the update from persisting.
    #[must_use]
    pub fn subscribe(
        &self,
        callback: impl Fn(&SyncProgress) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((id, Box::new(callback)));
        SubscriptionHandle {
            id,
            subscribers: self.subscribers.clone(),
        }
    }

    fn notify(&self, progress: &SyncProgress) {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (id, callback) in subscribers.iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(progress))).is_err() {
                tracing::warn!(subscriber = id, "progress callback panicked");
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn compute_progress(session_id: SessionId, ops: &[SyncOperation]) -> SyncProgress {
    let total = ops.len() as u32;
    let completed = ops
        .iter()
        .filter(|op| op.status == OperationStatus::Completed)
        .count() as u32;
    let failed = ops
        .iter()
        .filter(|op| op.status == OperationStatus::Failed)
        .count() as u32;
    let current = ops
        .iter()
        .find(|op| op.status == OperationStatus::InProgress)
        .cloned();

    let percent_complete = if total == 0 {
        100.0
    } else {
        f64::from(completed) / f64::from(total) * 100.0
    };

    let durations: Vec<i64> = ops
        .iter()
        .filter(|op| op.status == OperationStatus::Completed)
        .map(|op| op.updated_at - op.created_at)
        .collect();
    let remaining = total - completed - failed;
    let eta_ms = if durations.is_empty() || remaining == 0 {
        None
    } else {
        #[allow(clippy::cast_precision_loss)]
        let avg = durations.iter().sum::<i64>() as f64 / durations.len() as f64;
        Some(avg * f64::from(remaining))
    };

    SyncProgress {
        session_id,
        total_operations: total,
        completed_operations: completed,
        failed_operations: failed,
        current_operation: current,
        percent_complete,
        eta_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{OperationKind, PhotoId, SessionStatus};
    use pretty_assertions::assert_eq;

    fn tracker() -> StatusTracker {
        StatusTracker::new(Database::open_in_memory().unwrap().into_shared())
    }

    fn op_with(status: OperationStatus, created_at: i64, updated_at: i64) -> SyncOperation {
        let mut op = SyncOperation::new(OperationKind::Upload, PhotoId::new());
        op.status = status;
        op.created_at = created_at;
        op.updated_at = updated_at;
        op
    }

    #[tokio::test]
    async fn test_progress_counts_and_percentage() {
        let tracker = tracker();
        let session = SyncSession::new("user-1");
        tracker.record_session(&session).await.unwrap();

        tracker
            .record_operation(Some(&session.id), &op_with(OperationStatus::Completed, 0, 100))
            .await
            .unwrap();
        tracker
            .record_operation(Some(&session.id), &op_with(OperationStatus::Failed, 0, 50))
            .await
            .unwrap();
        tracker
            .record_operation(Some(&session.id), &op_with(OperationStatus::InProgress, 0, 0))
            .await
            .unwrap();
        tracker
            .record_operation(Some(&session.id), &op_with(OperationStatus::Pending, 0, 0))
            .await
            .unwrap();

        let progress = tracker.progress(&session.id).await.unwrap().unwrap();
        assert_eq!(progress.total_operations, 4);
        assert_eq!(progress.completed_operations, 1);
        assert_eq!(progress.failed_operations, 1);
        assert_eq!(
            progress.current_operation.unwrap().status,
            OperationStatus::InProgress
        );
        assert!((progress.percent_complete - 25.0).abs() < f64::EPSILON);
        // One completed op took 100ms; two ops remain
        assert!((progress.eta_ms.unwrap() - 200.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_progress_without_operations_is_complete() {
        let tracker = tracker();
        let session = SyncSession::new("user-1");
        tracker.record_session(&session).await.unwrap();

        let progress = tracker.progress(&session.id).await.unwrap().unwrap();
        assert_eq!(progress.total_operations, 0);
        assert!((progress.percent_complete - 100.0).abs() < f64::EPSILON);
        assert!(progress.eta_ms.is_none());
    }

    #[tokio::test]
    async fn test_progress_for_unknown_session() {
        let tracker = tracker();
        let progress = tracker.progress(&SessionId::new()).await.unwrap();
        assert!(progress.is_none());
    }

    #[tokio::test]
    async fn test_eta_requires_completed_operations() {
        let tracker = tracker();
        let session = SyncSession::new("user-1");
        tracker.record_session(&session).await.unwrap();
        tracker
            .record_operation(Some(&session.id), &op_with(OperationStatus::Pending, 0, 0))
            .await
            .unwrap();

        let progress = tracker.progress(&session.id).await.unwrap().unwrap();
        assert!(progress.eta_ms.is_none());
    }

    #[tokio::test]
    async fn test_statistics_on_empty_history() {
        let tracker = tracker();
        let stats = tracker.statistics().await.unwrap();
        assert_eq!(stats, TrackerStats::default());
        assert!(stats.sessions.last_sync_at.is_none());
    }

    #[tokio::test]
    async fn test_recent_sessions_load_operations() {
        let tracker = tracker();
        let session = SyncSession::new("user-1");
        tracker.record_session(&session).await.unwrap();
        tracker
            .record_operation(Some(&session.id), &op_with(OperationStatus::Completed, 0, 10))
            .await
            .unwrap();

        let recent = tracker.recent_sessions(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].session.id, session.id);
        assert_eq!(recent[0].operations.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_run_in_order_and_unsubscribe() {
        let tracker = tracker();
        let session = SyncSession::new("user-1");
        tracker.record_session(&session).await.unwrap();

        let calls = Arc::new(StdMutex::new(Vec::new()));
        let first_calls = calls.clone();
        let first = tracker.subscribe(move |_| first_calls.lock().unwrap().push("first"));
        let second_calls = calls.clone();
        let _second = tracker.subscribe(move |_| second_calls.lock().unwrap().push("second"));

        tracker
            .record_operation(Some(&session.id), &op_with(OperationStatus::Completed, 0, 10))
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);

        first.unsubscribe();
        tracker
            .record_operation(Some(&session.id), &op_with(OperationStatus::Completed, 0, 10))
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "second"]);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let tracker = tracker();
        let session = SyncSession::new("user-1");
        tracker.record_session(&session).await.unwrap();

        let _bad = tracker.subscribe(|_| panic!("subscriber bug"));
        let seen = Arc::new(StdMutex::new(0_u32));
        let seen_inner = seen.clone();
        let _good = tracker.subscribe(move |_| *seen_inner.lock().unwrap() += 1);

        let op = op_with(OperationStatus::Completed, 0, 10);
        tracker
            .record_operation(Some(&session.id), &op)
            .await
            .unwrap();

        // The later callback still ran and the update persisted
        assert_eq!(*seen.lock().unwrap(), 1);
        let ops = tracker.operations(&session.id).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, op.id);
    }

    #[tokio::test]
    async fn test_health_over_window() {
        let tracker = tracker();
        let session = SyncSession::new("user-1");
        tracker.record_session(&session).await.unwrap();

        let now = now_ms();
        tracker
            .record_operation(
                Some(&session.id),
                &op_with(OperationStatus::Completed, now - 100, now),
            )
            .await
            .unwrap();
        tracker
            .record_operation(
                Some(&session.id),
                &op_with(OperationStatus::Failed, now - 100, now),
            )
            .await
            .unwrap();

        let health = tracker
            .health(Duration::from_secs(60 * 60), 3)
            .await
            .unwrap();
        assert!((health.success_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(health.recent_failures, 1);
        assert_eq!(health.queue_backlog, 3);
        assert!((health.avg_operation_duration_ms - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_health_with_empty_window() {
        let tracker = tracker();
        let health = tracker.health(Duration::from_secs(60), 0).await.unwrap();
        assert!((health.success_rate - 100.0).abs() < f64::EPSILON);
        assert_eq!(health.recent_failures, 0);
    }

    #[tokio::test]
    async fn test_session_aggregates_through_tracker() {
        let tracker = tracker();
        let mut session = SyncSession::new("user-1");
        session.status = SessionStatus::Completed;
        session.started_at = 1000;
        session.ended_at = Some(2000);
        session.summary.bytes_transferred = 42;
        tracker.record_session(&session).await.unwrap();

        let stats = tracker.statistics().await.unwrap();
        assert_eq!(stats.sessions.completed, 1);
        assert_eq!(stats.sessions.total_bytes_transferred, 42);
        assert_eq!(stats.sessions.last_sync_at, Some(2000));
    }
}
