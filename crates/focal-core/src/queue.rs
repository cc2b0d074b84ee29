//! Offline operation queue
//!
//! Durable FIFO-ish store of pending and failed sync operations,
//! independent of network availability. The queue itself never expires a
//! pending operation; only the orchestrator drops operations once retries
//! are exhausted.

use std::time::Duration;

use crate::db::{QueueRepository, QueueStats, SharedDatabase, SqliteQueueRepository};
use crate::error::Result;
use crate::models::{now_ms, OperationId, OperationKind, PhotoId, SyncOperation};

/// Thread-safe service over the durable queue
#[derive(Clone)]
pub struct OfflineQueue {
    db: SharedDatabase,
    max_retries: u32,
}

impl OfflineQueue {
    /// Create a queue over the shared state database
    #[must_use]
    pub const fn new(db: SharedDatabase, max_retries: u32) -> Self {
        Self { db, max_retries }
    }

    /// Append an operation
    pub async fn enqueue(&self, op: &SyncOperation) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).insert(op)?;
        tracing::debug!(operation = %op.id, kind = op.kind.as_str(), "queued operation");
        Ok(())
    }

    /// Fetch an operation by ID
    pub async fn get(&self, id: &OperationId) -> Result<Option<SyncOperation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).get(id)
    }

    /// Remove an operation by ID
    pub async fn remove(&self, id: &OperationId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).remove(id)
    }

    /// Replace an operation in place
    pub async fn update(&self, op: &SyncOperation) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).update(op)
    }

    /// Operations eligible for execution, ordered by creation time
    pub async fn eligible(&self) -> Result<Vec<SyncOperation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).eligible(self.max_retries)
    }

    /// All queued operations of one kind
    pub async fn by_kind(&self, kind: OperationKind) -> Result<Vec<SyncOperation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).by_kind(kind)
    }

    /// All queued operations targeting one photo
    pub async fn by_photo(&self, photo_id: &PhotoId) -> Result<Vec<SyncOperation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).by_photo(photo_id)
    }

    /// Failed operations still below the retry maximum
    pub async fn retryable(&self) -> Result<Vec<SyncOperation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).retryable(self.max_retries)
    }

    /// Oldest pending operation, if any
    pub async fn next_pending(&self) -> Result<Option<SyncOperation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).next_pending()
    }

    /// Whether an operation with the given ID is queued
    pub async fn contains(&self, id: &OperationId) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).contains(id)
    }

    /// Transition an operation to `in_progress`
    pub async fn mark_in_progress(&self, id: &OperationId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).mark_in_progress(id)
    }

    /// Transition an operation to `completed`
    pub async fn mark_completed(&self, id: &OperationId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).mark_completed(id)
    }

    /// Transition an operation to `failed`, incrementing its retry count
    pub async fn mark_failed(&self, id: &OperationId, error: &str) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).mark_failed(id, error)
    }

    /// Transition an operation back to `pending` for a later retry
    pub async fn mark_pending(&self, id: &OperationId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).mark_pending(id)
    }

    /// Delete completed entries older than the horizon; returns the number
    /// removed
    pub async fn cleanup(&self, horizon: Duration) -> Result<usize> {
        let cutoff = now_ms() - i64::try_from(horizon.as_millis()).unwrap_or(i64::MAX);
        let db = self.db.lock().await;
        let removed = SqliteQueueRepository::new(db.connection()).cleanup_completed(cutoff)?;
        if removed > 0 {
            tracing::debug!(removed, "cleaned up completed queue entries");
        }
        Ok(removed)
    }

    /// Aggregate statistics by status and kind
    pub async fn stats(&self) -> Result<QueueStats> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::OperationStatus;

    fn queue() -> OfflineQueue {
        OfflineQueue::new(Database::open_in_memory().unwrap().into_shared(), 3)
    }

    #[tokio::test]
    async fn test_enqueue_and_eligible() {
        let queue = queue();
        let op = SyncOperation::new(OperationKind::Upload, PhotoId::new());
        queue.enqueue(&op).await.unwrap();

        let eligible = queue.eligible().await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, op.id);
        assert!(queue.contains(&op.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_exhausted_operations_are_not_eligible() {
        let queue = queue();
        let op = SyncOperation::new(OperationKind::Upload, PhotoId::new());
        queue.enqueue(&op).await.unwrap();

        for _ in 0..3 {
            queue.mark_failed(&op.id, "network down").await.unwrap();
        }

        assert!(queue.eligible().await.unwrap().is_empty());
        assert!(queue.retryable().await.unwrap().is_empty());
        // Still present until the orchestrator drops it
        let stored = queue.get(&op.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Failed);
        assert_eq!(stored.retry_count, 3);
    }

    #[tokio::test]
    async fn test_cleanup_honors_horizon() {
        let queue = queue();
        let op = SyncOperation::new(OperationKind::Download, PhotoId::new());
        queue.enqueue(&op).await.unwrap();
        queue.mark_completed(&op.id).await.unwrap();

        // Entry was just completed; a wide horizon keeps it
        assert_eq!(queue.cleanup(Duration::from_secs(3600)).await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.cleanup(Duration::ZERO).await.unwrap(), 1);
    }
}
