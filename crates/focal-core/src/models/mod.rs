//! Data models for the sync engine

mod conflict;
mod operation;
mod photo;
mod session;

pub use conflict::{
    ConflictDetails, ConflictId, ConflictResolution, ConflictType, ResolutionStrategy,
    ResolutionSuggestion, SyncConflict,
};
pub use operation::{OperationId, OperationKind, OperationStatus, SyncOperation};
pub use photo::{AnalysisScore, Face, Features, GeoPoint, Photo, PhotoId, PhotoMetadata, SyncStatus};
pub use session::{SessionId, SessionStatus, SessionSummary, SessionWithOperations, SyncSession};

/// Current time as unix milliseconds
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
