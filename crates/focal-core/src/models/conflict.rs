//! Sync conflict model and resolution records

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Photo, PhotoId};

/// A unique identifier for a sync conflict, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
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

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Classification of a detected divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    MetadataMismatch,
    VersionConflict,
    DeletionConflict,
}

impl ConflictType {
    /// Stable string tag used in storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MetadataMismatch => "metadata_mismatch",
            Self::VersionConflict => "version_conflict",
            Self::DeletionConflict => "deletion_conflict",
        }
    }
}

impl FromStr for ConflictType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata_mismatch" => Ok(Self::MetadataMismatch),
            "version_conflict" => Ok(Self::VersionConflict),
            "deletion_conflict" => Ok(Self::DeletionConflict),
            other => Err(format!("unknown conflict type: {other}")),
        }
    }
}

/// How a conflict is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    LocalWins,
    RemoteWins,
    Merge,
    Manual,
}

impl ResolutionStrategy {
    /// Stable string tag used in storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
            Self::Merge => "merge",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_wins" => Ok(Self::LocalWins),
            "remote_wins" => Ok(Self::RemoteWins),
            "merge" => Ok(Self::Merge),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown resolution strategy: {other}")),
        }
    }
}

/// Supporting detail recorded with a detected conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetails {
    /// Tags naming the fields that diverged (e.g. `quality_score_mismatch`)
    pub fields: Vec<String>,
    /// Detection timestamp (unix ms)
    pub detected_at: i64,
    /// Local side's last modification (unix ms)
    pub local_updated_at: i64,
    /// Remote side's last modification (unix ms)
    pub remote_updated_at: i64,
}

/// Detected divergence between local and remote versions of one photo
///
/// A deletion conflict carries only the surviving side; the other snapshot
/// is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Unique identifier
    pub id: ConflictId,
    /// Target photo
    pub photo_id: PhotoId,
    /// Divergence classification
    pub conflict_type: ConflictType,
    /// Local snapshot
    pub local: Option<Photo>,
    /// Remote snapshot
    pub remote: Option<Photo>,
    /// Supporting detail
    pub details: ConflictDetails,
}

/// Append-only audit record of a resolved conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// The conflict this record resolves
    pub conflict_id: ConflictId,
    /// Strategy applied
    pub strategy: ResolutionStrategy,
    /// Resulting photo snapshot
    pub resolved: Photo,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
}

/// Advisory recommendation for manual resolution UIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSuggestion {
    /// Recommended strategy
    pub recommended: ResolutionStrategy,
    /// Human-readable reasons supporting the recommendation
    pub reasons: Vec<String>,
    /// Other strategies worth offering
    pub alternatives: Vec<ResolutionStrategy>,
}
