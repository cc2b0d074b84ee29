//! Sync operation model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PhotoId;

/// A unique identifier for a sync operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of sync work an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Upload,
    Download,
    Delete,
    MetadataSync,
}

impl OperationKind {
    /// Stable string tag used in storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Delete => "delete",
            Self::MetadataSync => "metadata_sync",
        }
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            "delete" => Ok(Self::Delete),
            "metadata_sync" => Ok(Self::MetadataSync),
            other => Err(format!("unknown operation kind: {other}")),
        }
    }
}

/// Lifecycle state of a sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl OperationStatus {
    /// Stable string tag used in storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown operation status: {other}")),
        }
    }
}

/// One unit of sync work against one photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Unique identifier
    pub id: OperationId,
    /// Kind of work
    pub kind: OperationKind,
    /// Target photo
    pub photo_id: PhotoId,
    /// Lifecycle state
    pub status: OperationStatus,
    /// Progress percentage in [0, 100]
    pub progress: f64,
    /// Error from the most recent failed attempt
    pub error: Option<String>,
    /// Number of failed attempts so far
    pub retry_count: u32,
    /// Creation timestamp (unix ms)
    pub created_at: i64,
    /// Last update timestamp (unix ms)
    pub updated_at: i64,
}

impl SyncOperation {
    /// Create a pending operation for the given photo
    #[must_use]
    pub fn new(kind: OperationKind, photo_id: PhotoId) -> Self {
        let now = super::now_ms();
        Self {
            id: OperationId::new(),
            kind,
            photo_id,
            status: OperationStatus::Pending,
            progress: 0.0,
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
