//! Sync session model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConflictId, SyncOperation};

/// A unique identifier for a sync session, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique session ID using UUID v7
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

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Outcome state of a sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Stable string tag used in storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Summary counters for a session
///
/// At finalization these must equal aggregates over the session's
/// recorded operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_operations: u32,
    pub completed_operations: u32,
    pub failed_operations: u32,
    pub conflicts_resolved: u32,
    pub bytes_transferred: u64,
}

/// One run of the full upload -> download -> resolve pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSession {
    /// Unique identifier
    pub id: SessionId,
    /// Owning user
    pub user_id: String,
    /// Start timestamp (unix ms)
    pub started_at: i64,
    /// End timestamp, set exactly once at finalization (unix ms)
    pub ended_at: Option<i64>,
    /// Outcome state
    pub status: SessionStatus,
    /// Summary counters
    pub summary: SessionSummary,
    /// Conflicts encountered during this session
    pub conflict_ids: Vec<ConflictId>,
}

impl SyncSession {
    /// Create a new active session for the given user
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            user_id: user_id.into(),
            started_at: super::now_ms(),
            ended_at: None,
            status: SessionStatus::Active,
            summary: SessionSummary::default(),
            conflict_ids: Vec::new(),
        }
    }

    /// Session duration in milliseconds, if finalized
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at.map(|ended| ended - self.started_at)
    }
}

/// A session with its operations eagerly loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWithOperations {
    pub session: SyncSession,
    pub operations: Vec<SyncOperation>,
}
