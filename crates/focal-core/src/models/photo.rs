//! Photo model and analysis payloads
//!
//! Photos are owned by the external photo store; the engine references
//! them and updates sync bookkeeping fields only.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a photo, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoId(Uuid);

impl PhotoId {
    /// Create a new unique photo ID using UUID v7
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

impl Default for PhotoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhotoId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Capture location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Content metadata captured with the photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMetadata {
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// Capture timestamp (unix ms)
    pub captured_at: i64,
    /// Optional capture location
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// One on-device analysis score: an overall value plus named sub-metrics,
/// all in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisScore {
    pub overall: f64,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl AnalysisScore {
    /// Score with an overall value and no sub-metrics
    #[must_use]
    pub const fn overall(value: f64) -> Self {
        Self {
            overall: value,
            metrics: BTreeMap::new(),
        }
    }
}

/// Derived feature payload from the inference pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Features {
    /// Embedding vector
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Detected object labels
    #[serde(default)]
    pub objects: Vec<String>,
    /// Detected scene tags
    #[serde(default)]
    pub scenes: Vec<String>,
}

/// A detected face region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    /// Bounding box as x, y, width, height in relative coordinates
    pub bounds: [f32; 4],
    /// Optional identity label
    #[serde(default)]
    pub label: Option<String>,
}

/// Synchronization state of a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    LocalOnly,
    PendingUpload,
    Synced,
    Conflict,
}

impl SyncStatus {
    /// Stable string tag used in storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalOnly => "local_only",
            Self::PendingUpload => "pending_upload",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_only" => Ok(Self::LocalOnly),
            "pending_upload" => Ok(Self::PendingUpload),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// A photo in the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    /// Unique identifier
    pub id: PhotoId,
    /// Reference to the binary payload in the blob cache
    pub blob_ref: String,
    /// Content metadata
    pub metadata: PhotoMetadata,
    /// Quality analysis score
    #[serde(default)]
    pub quality_score: Option<AnalysisScore>,
    /// Composition analysis score
    #[serde(default)]
    pub composition_score: Option<AnalysisScore>,
    /// Content analysis score
    #[serde(default)]
    pub content_score: Option<AnalysisScore>,
    /// Derived feature payload
    #[serde(default)]
    pub features: Option<Features>,
    /// Detected faces
    #[serde(default)]
    pub faces: Option<Vec<Face>>,
    /// Synchronization state
    pub sync_status: SyncStatus,
    /// Remote location handle once uploaded
    #[serde(default)]
    pub cloud_url: Option<String>,
    /// Last local modification (unix ms)
    pub updated_at: i64,
    /// Last successful sync (unix ms)
    #[serde(default)]
    pub last_synced_at: Option<i64>,
}

impl Photo {
    /// Create a new local-only photo with the given payload reference
    #[must_use]
    pub fn new(blob_ref: impl Into<String>, metadata: PhotoMetadata) -> Self {
        Self {
            id: PhotoId::new(),
            blob_ref: blob_ref.into(),
            metadata,
            quality_score: None,
            composition_score: None,
            content_score: None,
            features: None,
            faces: None,
            sync_status: SyncStatus::LocalOnly,
            cloud_url: None,
            updated_at: super::now_ms(),
            last_synced_at: None,
        }
    }

    /// Whether any derived metadata (scores, features, faces) is present
    #[must_use]
    pub const fn has_derived_metadata(&self) -> bool {
        self.quality_score.is_some()
            || self.composition_score.is_some()
            || self.content_score.is_some()
            || self.features.is_some()
            || self.faces.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> PhotoMetadata {
        PhotoMetadata {
            width: 4000,
            height: 3000,
            size_bytes: 2_400_000,
            captured_at: 1_700_000_000_000,
            location: None,
        }
    }

    #[test]
    fn test_photo_id_unique() {
        assert_ne!(PhotoId::new(), PhotoId::new());
    }

    #[test]
    fn test_photo_id_parse() {
        let id = PhotoId::new();
        let parsed: PhotoId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_photo_new_defaults() {
        let photo = Photo::new("blobs/abc", metadata());
        assert_eq!(photo.sync_status, SyncStatus::LocalOnly);
        assert!(photo.cloud_url.is_none());
        assert!(photo.last_synced_at.is_none());
        assert!(!photo.has_derived_metadata());
        assert!(photo.updated_at > 0);
    }

    #[test]
    fn test_sync_status_round_trip() {
        for status in [
            SyncStatus::LocalOnly,
            SyncStatus::PendingUpload,
            SyncStatus::Synced,
            SyncStatus::Conflict,
        ] {
            let parsed: SyncStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_has_derived_metadata() {
        let mut photo = Photo::new("blobs/abc", metadata());
        photo.quality_score = Some(AnalysisScore::overall(0.8));
        assert!(photo.has_derived_metadata());
    }
}
