//! Conflict detection and resolution
//!
//! Divergence between local and remote copies of the same logical photo is
//! detected field by field, persisted as an open conflict, and resolved
//! according to a strategy. Every resolution leaves an audit record.

use std::sync::Arc;

use crate::db::{ConflictRepository, SharedDatabase, SqliteConflictRepository};
use crate::error::{Error, Result};
use crate::models::{
    now_ms, AnalysisScore, ConflictDetails, ConflictId, ConflictResolution, ConflictType,
    Features, Photo, PhotoId, ResolutionStrategy, ResolutionSuggestion, SyncConflict,
};
use crate::store::PhotoStore;

/// Timestamp differences under this tolerance are clock-precision noise,
/// not conflicts
pub const TIMESTAMP_TOLERANCE_MS: i64 = 1000;

/// Result of a batch auto-resolution run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AutoResolveOutcome {
    pub resolved: u32,
    pub failed: u32,
    /// One entry per failed resolution
    pub errors: Vec<String>,
}

/// Detects divergence and applies resolution strategies
pub struct ConflictResolver {
    db: SharedDatabase,
    store: Arc<dyn PhotoStore>,
    default_strategy: ResolutionStrategy,
}

impl ConflictResolver {
    /// Create a resolver writing resolved photos back to the given store
    #[must_use]
    pub fn new(
        db: SharedDatabase,
        store: Arc<dyn PhotoStore>,
        default_strategy: ResolutionStrategy,
    ) -> Self {
        Self {
            db,
            store,
            default_strategy,
        }
    }

    /// Compare two versions of the same logical photo
    ///
    /// Returns `None` when no tracked field differs (timestamps within
    /// tolerance). Otherwise persists and returns the conflict: a
    /// `VersionConflict` when the timestamps diverge beyond tolerance,
    /// else a `MetadataMismatch`.
    pub async fn detect(&self, local: &Photo, remote: &Photo) -> Result<Option<SyncConflict>> {
        if local.id != remote.id {
            return Err(Error::Validation(format!(
                "cannot compare distinct photos {} and {}",
                local.id, remote.id
            )));
        }

        let fields = diff_fields(local, remote);
        if fields.is_empty() {
            return Ok(None);
        }

        let version_diverged =
            (local.updated_at - remote.updated_at).abs() >= TIMESTAMP_TOLERANCE_MS;
        let conflict = SyncConflict {
            id: ConflictId::new(),
            photo_id: local.id,
            conflict_type: if version_diverged {
                ConflictType::VersionConflict
            } else {
                ConflictType::MetadataMismatch
            },
            local: Some(local.clone()),
            remote: Some(remote.clone()),
            details: ConflictDetails {
                fields,
                detected_at: now_ms(),
                local_updated_at: local.updated_at,
                remote_updated_at: remote.updated_at,
            },
        };

        self.record(&conflict).await?;
        tracing::debug!(
            photo = %conflict.photo_id,
            conflict_type = conflict.conflict_type.as_str(),
            fields = ?conflict.details.fields,
            "detected sync conflict"
        );
        Ok(Some(conflict))
    }

    /// Persist an open conflict, refreshing any prior one for the photo
    pub async fn record(&self, conflict: &SyncConflict) -> Result<()> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).upsert(conflict)
    }

    /// Apply a strategy to an open conflict
    ///
    /// Falls back to the configured default when no strategy is given.
    /// The chosen (or merged) photo replaces the stored one, an audit
    /// record is appended, and the open conflict is deleted. `Manual`
    /// always fails without touching the store.
    pub async fn resolve(
        &self,
        conflict: &SyncConflict,
        strategy: Option<ResolutionStrategy>,
    ) -> Result<Photo> {
        let strategy = strategy.unwrap_or(self.default_strategy);

        let resolved = match strategy {
            ResolutionStrategy::LocalWins => conflict.local.clone().ok_or_else(|| {
                Error::Conflict(format!("local version of {} is absent", conflict.photo_id))
            })?,
            ResolutionStrategy::RemoteWins => conflict.remote.clone().ok_or_else(|| {
                Error::Conflict(format!("remote version of {} is absent", conflict.photo_id))
            })?,
            ResolutionStrategy::Merge => {
                let local = conflict.local.as_ref().ok_or_else(|| {
                    Error::Conflict(format!("merge requires a local version of {}", conflict.photo_id))
                })?;
                let remote = conflict.remote.as_ref().ok_or_else(|| {
                    Error::Conflict(format!("merge requires a remote version of {}", conflict.photo_id))
                })?;
                merge(local, remote)
            }
            ResolutionStrategy::Manual => {
                return Err(Error::Conflict(format!(
                    "conflict {} requires manual resolution",
                    conflict.id
                )));
            }
        };

        self.store.save_photo(&resolved).await?;

        let db = self.db.lock().await;
        let repo = SqliteConflictRepository::new(db.connection());
        repo.append_resolution(&ConflictResolution {
            conflict_id: conflict.id,
            strategy,
            resolved: resolved.clone(),
            resolved_at: now_ms(),
        })?;
        repo.delete(&conflict.id)?;
        drop(db);

        tracing::info!(
            conflict = %conflict.id,
            photo = %conflict.photo_id,
            strategy = strategy.as_str(),
            "resolved sync conflict"
        );
        Ok(resolved)
    }

    /// Resolve every open conflict eligible for automatic resolution
    ///
    /// Eligible means the configured strategy is not `Manual` and the
    /// conflict is not a deletion conflict. One conflict's failure does
    /// not stop the rest.
    pub async fn auto_resolve(&self) -> Result<AutoResolveOutcome> {
        let mut outcome = AutoResolveOutcome::default();

        for conflict in self.open_conflicts().await? {
            if self.default_strategy == ResolutionStrategy::Manual
                || conflict.conflict_type == ConflictType::DeletionConflict
            {
                continue;
            }
            match self.resolve(&conflict, None).await {
                Ok(_) => outcome.resolved += 1,
                Err(error) => {
                    outcome.failed += 1;
                    outcome
                        .errors
                        .push(format!("resolve {}: {error}", conflict.photo_id));
                    tracing::warn!(
                        conflict = %conflict.id,
                        %error,
                        "automatic conflict resolution failed"
                    );
                }
            }
        }

        Ok(outcome)
    }

    /// All open conflicts, oldest detection first
    pub async fn open_conflicts(&self) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).all_open()
    }

    /// The open conflict for a photo, if any
    pub async fn conflict_for(&self, photo_id: &PhotoId) -> Result<Option<SyncConflict>> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).for_photo(photo_id)
    }

    /// Number of open conflicts
    pub async fn count_open(&self) -> Result<u32> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).count_open()
    }

    /// Recent resolution audit records, newest first
    pub async fn recent_resolutions(&self, limit: usize) -> Result<Vec<ConflictResolution>> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).recent_resolutions(limit)
    }
}

/// Advisory recommendation based on which side was modified more recently
///
/// Drives manual-resolution UIs; automatic resolution does not consult it.
#[must_use]
pub fn suggest(conflict: &SyncConflict) -> ResolutionSuggestion {
    let local = conflict.details.local_updated_at;
    let remote = conflict.details.remote_updated_at;

    if local > remote {
        ResolutionSuggestion {
            recommended: ResolutionStrategy::LocalWins,
            reasons: vec![format!(
                "local version is more recent (modified {}ms after remote)",
                local - remote
            )],
            alternatives: vec![ResolutionStrategy::Merge, ResolutionStrategy::RemoteWins],
        }
    } else if remote > local {
        ResolutionSuggestion {
            recommended: ResolutionStrategy::RemoteWins,
            reasons: vec![format!(
                "remote version is more recent (modified {}ms after local)",
                remote - local
            )],
            alternatives: vec![ResolutionStrategy::Merge, ResolutionStrategy::LocalWins],
        }
    } else {
        ResolutionSuggestion {
            recommended: ResolutionStrategy::Merge,
            reasons: vec!["both versions were modified at the same time".to_string()],
            alternatives: vec![ResolutionStrategy::LocalWins, ResolutionStrategy::RemoteWins],
        }
    }
}

/// Field-level reconciliation of two photo versions
///
/// Local is the base. Missing geolocation falls back to remote's; each
/// analysis score keeps the side with the higher overall value; feature
/// object/scene lists are unioned; face lists are concatenated from both
/// sides without de-duplication (repeated merges may therefore accumulate
/// duplicate faces). Sync status and last-sync time follow the side with
/// the later `updated_at`.
#[must_use]
pub fn merge(local: &Photo, remote: &Photo) -> Photo {
    let newer = if remote.updated_at > local.updated_at {
        remote
    } else {
        local
    };

    let mut merged = local.clone();
    if merged.metadata.location.is_none() {
        merged.metadata.location = remote.metadata.location;
    }
    merged.quality_score = better_score(&local.quality_score, &remote.quality_score);
    merged.composition_score = better_score(&local.composition_score, &remote.composition_score);
    merged.content_score = better_score(&local.content_score, &remote.content_score);
    merged.features = merge_features(local.features.as_ref(), remote.features.as_ref());
    merged.faces = match (local.faces.clone(), remote.faces.clone()) {
        (None, None) => None,
        (local_faces, remote_faces) => {
            let mut faces = local_faces.unwrap_or_default();
            faces.extend(remote_faces.unwrap_or_default());
            Some(faces)
        }
    };
    merged.cloud_url = local.cloud_url.clone().or_else(|| remote.cloud_url.clone());
    merged.updated_at = local.updated_at.max(remote.updated_at);
    merged.sync_status = newer.sync_status;
    merged.last_synced_at = newer.last_synced_at;
    merged
}

fn better_score(
    local: &Option<AnalysisScore>,
    remote: &Option<AnalysisScore>,
) -> Option<AnalysisScore> {
    match (local, remote) {
        (Some(l), Some(r)) => {
            if r.overall > l.overall {
                Some(r.clone())
            } else {
                Some(l.clone())
            }
        }
        (Some(l), None) => Some(l.clone()),
        (None, r) => r.clone(),
    }
}

fn merge_features(local: Option<&Features>, remote: Option<&Features>) -> Option<Features> {
    match (local, remote) {
        (None, None) => None,
        (Some(l), None) => Some(l.clone()),
        (None, Some(r)) => Some(r.clone()),
        (Some(l), Some(r)) => {
            let mut objects = l.objects.clone();
            for object in &r.objects {
                if !objects.contains(object) {
                    objects.push(object.clone());
                }
            }
            let mut scenes = l.scenes.clone();
            for scene in &r.scenes {
                if !scenes.contains(scene) {
                    scenes.push(scene.clone());
                }
            }
            let embedding = if l.embedding.is_empty() {
                r.embedding.clone()
            } else {
                l.embedding.clone()
            };
            Some(Features {
                embedding,
                objects,
                scenes,
            })
        }
    }
}

fn diff_fields(local: &Photo, remote: &Photo) -> Vec<String> {
    let mut fields = Vec::new();

    if local.metadata != remote.metadata {
        fields.push("metadata_mismatch".to_string());
    }
    if local.quality_score != remote.quality_score {
        fields.push("quality_score_mismatch".to_string());
    }
    if local.composition_score != remote.composition_score {
        fields.push("composition_score_mismatch".to_string());
    }
    if local.content_score != remote.content_score {
        fields.push("content_score_mismatch".to_string());
    }
    if local.features != remote.features {
        fields.push("features_mismatch".to_string());
    }
    if local.sync_status != remote.sync_status {
        fields.push("sync_status_mismatch".to_string());
    }
    if (local.updated_at - remote.updated_at).abs() >= TIMESTAMP_TOLERANCE_MS {
        fields.push("updated_at_mismatch".to_string());
    }

    fields
}
