//! Sync orchestrator
//!
//! Composes the offline queue, conflict resolver, and status tracker into
//! full sync sessions (upload, then download, then conflict resolution),
//! replays queued operations while online, and answers status queries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::auth::AuthProvider;
use crate::config::SyncConfig;
use crate::conflict::ConflictResolver;
use crate::db::SharedDatabase;
use crate::error::{Error, Result};
use crate::models::{
    now_ms, OperationKind, OperationStatus, Photo, PhotoId, SessionId, SessionStatus,
    SyncOperation, SyncSession, SyncStatus,
};
use crate::queue::OfflineQueue;
use crate::remote::{BatchOutcome, CloudPhoto, MetadataEntry, RemoteEndpoint};
use crate::retry::RetryPolicy;
use crate::store::{BlobCache, PhotoPatch, PhotoStore};
use crate::tracker::{HealthReport, StatusTracker};

/// Result of a full sync session
///
/// `success` is true whenever the session completed its phases, even with
/// per-item failures; inspect `errors` for partial-failure detail.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub uploaded: u32,
    pub downloaded: u32,
    pub conflicts_resolved: u32,
    pub errors: Vec<String>,
    pub bytes_transferred: u64,
}

/// Result of one upload or download phase
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct PhaseReport {
    pub count: u32,
    pub bytes: u64,
    pub errors: Vec<String>,
}

/// Read-only aggregation over queue, tracker, and resolver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SyncStatusSnapshot {
    pub online: bool,
    /// End time of the most recent completed session (unix ms)
    pub last_sync_at: Option<i64>,
    pub queued_operations: u32,
    pub pending_uploads: u32,
    pub pending_downloads: u32,
    pub open_conflicts: u32,
}

/// Orchestrates sync sessions against the remote endpoint
pub struct SyncEngine {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn PhotoStore>,
    blobs: Arc<dyn BlobCache>,
    remote: Arc<dyn RemoteEndpoint>,
    queue: OfflineQueue,
    resolver: ConflictResolver,
    tracker: StatusTracker,
    config: SyncConfig,
    retry: RetryPolicy,
    active_session: Arc<Mutex<Option<SessionId>>>,
    online: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Assemble an engine over the shared state database and the injected
    /// collaborators
    pub fn new(
        db: SharedDatabase,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn PhotoStore>,
        blobs: Arc<dyn BlobCache>,
        remote: Arc<dyn RemoteEndpoint>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let retry = RetryPolicy::from_config(&config);
        Ok(Self {
            auth,
            store: store.clone(),
            blobs,
            remote,
            queue: OfflineQueue::new(db.clone(), config.max_retries),
            resolver: ConflictResolver::new(db.clone(), store, config.default_strategy),
            tracker: StatusTracker::new(db),
            config,
            retry,
            active_session: Arc::new(Mutex::new(None)),
            online: Arc::new(AtomicBool::new(true)),
        })
    }

    /// The engine's offline queue
    #[must_use]
    pub const fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// The engine's conflict resolver
    #[must_use]
    pub const fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// The engine's status tracker
    #[must_use]
    pub const fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Flip the engine's connectivity flag; driven by an external
    /// network-state watcher
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Current connectivity flag
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Run a full sync session: upload curated photos, download
    /// remote-only photos, then resolve open conflicts
    ///
    /// Fails with an authentication error for unauthenticated callers and
    /// rejects a second invocation while a session is active. Per-item
    /// failures inside the phases are collected into the report's error
    /// list; the session still finalizes as completed. Only setup failures
    /// and unrecoverable phase errors finalize it as failed.
    pub async fn start_sync(&self) -> Result<SyncReport> {
        if !self.auth.is_authenticated().await {
            return Err(Error::Auth("sync requires a signed-in user".to_string()));
        }
        let user_id = self.auth.current_user_id().await?;

        let mut active = self.active_session.lock().await;
        if let Some(existing) = active.as_ref() {
            return Err(Error::SessionActive(existing.to_string()));
        }
        let mut session = SyncSession::new(user_id);
        *active = Some(session.id);
        drop(active);
        self.tracker.record_session(&session).await?;
        tracing::info!(session = %session.id, "sync session started");

        match self.run_phases(&mut session).await {
            Ok(report) => {
                self.finalize(&mut session, SessionStatus::Completed, &report)
                    .await?;
                tracing::info!(
                    session = %session.id,
                    uploaded = report.uploaded,
                    downloaded = report.downloaded,
                    conflicts_resolved = report.conflicts_resolved,
                    errors = report.errors.len(),
                    "sync session completed"
                );
                Ok(report)
            }
            Err(error) => {
                tracing::error!(session = %session.id, %error, "sync session failed");
                let report = SyncReport {
                    success: false,
                    uploaded: 0,
                    downloaded: 0,
                    conflicts_resolved: 0,
                    errors: vec![error.to_string()],
                    bytes_transferred: 0,
                };
                if let Err(finalize_error) =
                    self.finalize(&mut session, SessionStatus::Failed, &report).await
                {
                    tracing::error!(
                        session = %session.id,
                        %finalize_error,
                        "failed to finalize failed session"
                    );
                }
                Err(error)
            }
        }
    }

    async fn run_phases(&self, session: &mut SyncSession) -> Result<SyncReport> {
        let upload = self.upload_phase(Some(session.id), None).await?;
        let download = self.download_phase(Some(session.id)).await?;

        for conflict in self.resolver.open_conflicts().await? {
            session.conflict_ids.push(conflict.id);
        }
        let resolved = self.resolver.auto_resolve().await?;

        let mut errors = upload.errors;
        errors.extend(download.errors);
        errors.extend(resolved.errors);
        Ok(SyncReport {
            success: true,
            uploaded: upload.count,
            downloaded: download.count,
            conflicts_resolved: resolved.resolved,
            errors,
            bytes_transferred: upload.bytes + download.bytes,
        })
    }

    /// Finalize exactly once, deriving summary counters from the recorded
    /// operations so they match tracker aggregates
    ///
    /// A session that is no longer the active one was already finalized by
    /// `cancel_sync`; its terminal status must not be overwritten.
    async fn finalize(
        &self,
        session: &mut SyncSession,
        status: SessionStatus,
        report: &SyncReport,
    ) -> Result<()> {
        {
            let mut active = self.active_session.lock().await;
            if *active != Some(session.id) {
                tracing::debug!(session = %session.id, "session already finalized, keeping its status");
                return Ok(());
            }
            *active = None;
        }
        let ops = self.tracker.operations(&session.id).await?;
        session.status = status;
        session.ended_at = Some(now_ms());
        session.summary.total_operations = count_ops(&ops, None);
        session.summary.completed_operations = count_ops(&ops, Some(OperationStatus::Completed));
        session.summary.failed_operations = count_ops(&ops, Some(OperationStatus::Failed));
        session.summary.conflicts_resolved = report.conflicts_resolved;
        session.summary.bytes_transferred = report.bytes_transferred;
        self.tracker.record_session(session).await?;
        Ok(())
    }

    /// Upload the given photos, or the currently curated set when omitted
    ///
    /// One photo's failure is recorded on its operation and collected into
    /// the report; the rest of the batch proceeds.
    pub async fn upload_curated_photos(&self, photos: Option<Vec<Photo>>) -> Result<PhaseReport> {
        self.upload_phase(None, photos).await
    }

    async fn upload_phase(
        &self,
        session_id: Option<SessionId>,
        photos: Option<Vec<Photo>>,
    ) -> Result<PhaseReport> {
        let photos = match photos {
            Some(photos) => photos,
            None => self.store.curated_photos().await?,
        };
        if photos.is_empty() {
            return Ok(PhaseReport::default());
        }
        let token = self.auth.token().await?;

        let mut report = PhaseReport::default();
        for photo in &photos {
            let mut op = SyncOperation::new(OperationKind::Upload, photo.id);
            op.status = OperationStatus::InProgress;
            self.tracker
                .record_operation(session_id.as_ref(), &op)
                .await?;

            match self.upload_one(&token, photo).await {
                Ok(bytes) => {
                    op.status = OperationStatus::Completed;
                    op.progress = 100.0;
                    report.count += 1;
                    report.bytes += bytes;
                }
                Err(error) => {
                    op.status = OperationStatus::Failed;
                    op.error = Some(error.to_string());
                    op.retry_count += 1;
                    report.errors.push(format!("upload {}: {error}", photo.id));
                    tracing::warn!(photo = %photo.id, %error, "upload failed");
                }
            }
            op.updated_at = now_ms();
            self.tracker
                .record_operation(session_id.as_ref(), &op)
                .await?;
        }
        Ok(report)
    }

    async fn upload_one(&self, token: &str, photo: &Photo) -> Result<u64> {
        let bytes = self.blobs.load_payload(&photo.blob_ref).await?;
        let cloud_url = self.remote.upload_photo(token, photo, &bytes).await?;
        self.store
            .update_photo(&photo.id, PhotoPatch::synced(cloud_url, now_ms()))
            .await?;
        Ok(bytes.len() as u64)
    }

    /// Download photos that exist remotely but not locally
    ///
    /// Remote descriptors are matched against local photos by originating
    /// photo ID; per-item failures behave as in upload.
    pub async fn download_user_library(&self) -> Result<PhaseReport> {
        self.download_phase(None).await
    }

    async fn download_phase(&self, session_id: Option<SessionId>) -> Result<PhaseReport> {
        let token = self.auth.token().await?;
        let remote_photos = self.remote.curated_photos(&token).await?;
        let present: HashSet<String> = self
            .store
            .all_photos()
            .await?
            .iter()
            .map(|photo| photo.id.as_str())
            .collect();

        let mut report = PhaseReport::default();
        for cloud in remote_photos
            .iter()
            .filter(|cloud| !present.contains(&cloud.photo_id))
        {
            let Ok(photo_id) = cloud.photo_id.parse::<PhotoId>() else {
                report
                    .errors
                    .push(format!("download {}: invalid photo id", cloud.photo_id));
                continue;
            };

            let mut op = SyncOperation::new(OperationKind::Download, photo_id);
            op.status = OperationStatus::InProgress;
            self.tracker
                .record_operation(session_id.as_ref(), &op)
                .await?;

            match self.download_one(&token, photo_id, cloud).await {
                Ok(bytes) => {
                    op.status = OperationStatus::Completed;
                    op.progress = 100.0;
                    report.count += 1;
                    report.bytes += bytes;
                }
                Err(error) => {
                    op.status = OperationStatus::Failed;
                    op.error = Some(error.to_string());
                    op.retry_count += 1;
                    report.errors.push(format!("download {photo_id}: {error}"));
                    tracing::warn!(photo = %photo_id, %error, "download failed");
                }
            }
            op.updated_at = now_ms();
            self.tracker
                .record_operation(session_id.as_ref(), &op)
                .await?;
        }
        Ok(report)
    }

    async fn download_one(
        &self,
        token: &str,
        photo_id: PhotoId,
        cloud: &CloudPhoto,
    ) -> Result<u64> {
        let bytes = self.remote.download(token, &cloud.url).await?;
        let blob_ref = self.blobs.store_payload(&bytes, &cloud.photo_id).await?;

        let mut photo = Photo::new(blob_ref, cloud.metadata.clone());
        photo.id = photo_id;
        photo.sync_status = SyncStatus::Synced;
        photo.cloud_url = Some(cloud.url.clone());
        photo.updated_at = cloud.last_modified;
        photo.last_synced_at = Some(now_ms());
        self.store.save_photo(&photo).await?;
        Ok(bytes.len() as u64)
    }

    /// Push derived metadata for the given photos in fixed-size batches
    ///
    /// Unlike upload/download, this path is atomic per batch: a transport
    /// failure or a batch-level error list aborts the whole call.
    pub async fn sync_metadata(&self, photos: &[Photo]) -> Result<BatchOutcome> {
        if photos.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let token = self.auth.token().await?;

        let mut total = BatchOutcome::default();
        for chunk in photos.chunks(self.config.batch_size) {
            let entries: Vec<MetadataEntry> = chunk.iter().map(MetadataEntry::from_photo).collect();
            let outcome = self.remote.batch_sync_metadata(&token, &entries).await?;
            total.success += outcome.success;
            total.failed += outcome.failed;
            total.errors.extend(outcome.errors);
        }
        tracing::debug!(
            photos = photos.len(),
            accepted = total.success,
            rejected = total.failed,
            "metadata sync finished"
        );
        Ok(total)
    }

    /// Create a pending operation and append it to the offline queue
    pub async fn queue_for_sync(
        &self,
        kind: OperationKind,
        photo_id: PhotoId,
    ) -> Result<SyncOperation> {
        let op = SyncOperation::new(kind, photo_id);
        self.queue.enqueue(&op).await?;
        Ok(op)
    }

    /// Execute every eligible queued operation
    ///
    /// No-op while offline. A retryable failure increments the retry count
    /// and re-queues the operation as pending, unless the count has reached
    /// the maximum, in which case the operation is dropped from the queue
    /// and recorded as a terminal failure with the tracker. Non-retryable
    /// failures are terminal immediately.
    pub async fn process_queued_operations(&self) -> Result<()> {
        if !self.is_online() {
            return Ok(());
        }
        let ops = self.queue.eligible().await?;
        if ops.is_empty() {
            return Ok(());
        }
        let token = self.auth.token().await?;

        for op in ops {
            if op.retry_count > 0 {
                tokio::time::sleep(self.retry.delay_for(op.retry_count)).await;
            }
            self.queue.mark_in_progress(&op.id).await?;

            match self.execute_queued(&token, &op).await {
                Ok(()) => {
                    self.queue.remove(&op.id).await?;
                    tracing::debug!(operation = %op.id, "queued operation replayed");
                }
                Err(error) => {
                    self.queue.mark_failed(&op.id, &error.to_string()).await?;
                    let exhausted = !self.retry.allows(op.retry_count + 1);
                    if error.is_retryable() && !exhausted {
                        self.queue.mark_pending(&op.id).await?;
                    } else {
                        // Terminal: surface through the tracker, then drop
                        if let Some(failed) = self.queue.get(&op.id).await? {
                            self.tracker.record_operation(None, &failed).await?;
                        }
                        self.queue.remove(&op.id).await?;
                        tracing::warn!(
                            operation = %op.id,
                            %error,
                            "queued operation permanently failed"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    async fn execute_queued(&self, token: &str, op: &SyncOperation) -> Result<()> {
        match op.kind {
            OperationKind::Upload => {
                let photo = self.require_photo(&op.photo_id).await?;
                self.upload_one(token, &photo).await?;
            }
            OperationKind::Download => {
                let target = op.photo_id.as_str();
                let cloud = self
                    .remote
                    .curated_photos(token)
                    .await?
                    .into_iter()
                    .find(|cloud| cloud.photo_id == target)
                    .ok_or_else(|| Error::NotFound(format!("remote photo {target}")))?;
                self.download_one(token, op.photo_id, &cloud).await?;
            }
            OperationKind::Delete => {
                self.remote.delete_photo(token, &op.photo_id.as_str()).await?;
            }
            OperationKind::MetadataSync => {
                let photo = self.require_photo(&op.photo_id).await?;
                let entries = [MetadataEntry::from_photo(&photo)];
                self.remote.batch_sync_metadata(token, &entries).await?;
            }
        }
        Ok(())
    }

    async fn require_photo(&self, id: &PhotoId) -> Result<Photo> {
        self.store
            .photo(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("photo {id}")))
    }

    /// Read-only status aggregation over queue, tracker, and resolver
    pub async fn get_sync_status(&self) -> Result<SyncStatusSnapshot> {
        let stats = self.queue.stats().await?;
        let tracker_stats = self.tracker.statistics().await?;
        let open_conflicts = self.resolver.count_open().await?;
        Ok(SyncStatusSnapshot {
            online: self.is_online(),
            last_sync_at: tracker_stats.sessions.last_sync_at,
            queued_operations: stats.total,
            pending_uploads: stats.pending_uploads,
            pending_downloads: stats.pending_downloads,
            open_conflicts,
        })
    }

    /// Health metrics over the configured trailing window
    pub async fn health(&self) -> Result<HealthReport> {
        let backlog = self.queue.stats().await?.total;
        self.tracker.health(self.config.health_window, backlog).await
    }

    /// Drop completed queue entries older than the configured horizon
    pub async fn cleanup_queue(&self) -> Result<usize> {
        self.queue.cleanup(self.config.cleanup_horizon).await
    }

    /// Finalize the active session as cancelled, if any
    ///
    /// Cooperative: in-flight operations are not aborted and may complete
    /// after cancellation.
    pub async fn cancel_sync(&self) -> Result<()> {
        let mut active = self.active_session.lock().await;
        let Some(id) = active.take() else {
            return Ok(());
        };
        drop(active);

        if let Some(mut session) = self.tracker.session(&id).await? {
            let ops = self.tracker.operations(&id).await?;
            session.status = SessionStatus::Cancelled;
            session.ended_at = Some(now_ms());
            session.summary.total_operations = count_ops(&ops, None);
            session.summary.completed_operations =
                count_ops(&ops, Some(OperationStatus::Completed));
            session.summary.failed_operations = count_ops(&ops, Some(OperationStatus::Failed));
            self.tracker.record_session(&session).await?;
            tracing::info!(session = %id, "sync session cancelled");
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn count_ops(ops: &[SyncOperation], status: Option<OperationStatus>) -> u32 {
    ops.iter()
        .filter(|op| status.is_none_or(|s| op.status == s))
        .count() as u32
}
