//! Abstract remote endpoint and wire types
//!
//! The engine issues requests against this seam only; `HttpRemote` is the
//! production implementation of the wire contract.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpRemote;

use crate::error::Result;
use crate::models::{AnalysisScore, Face, Features, Photo, PhotoMetadata};

/// Descriptor of a photo stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudPhoto {
    /// Remote record identifier
    pub id: String,
    /// Originating local photo identifier
    pub photo_id: String,
    /// URL of the binary payload
    pub url: String,
    /// Content metadata
    pub metadata: PhotoMetadata,
    /// Upload timestamp (unix ms)
    pub uploaded_at: i64,
    /// Remote last-modified timestamp (unix ms)
    pub last_modified: i64,
}

/// JSON metadata part accompanying a multipart upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub photo_id: String,
    pub metadata: PhotoMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<AnalysisScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition_score: Option<AnalysisScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_score: Option<AnalysisScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Features>,
}

impl UploadMetadata {
    /// Build the upload payload for a photo
    #[must_use]
    pub fn from_photo(photo: &Photo) -> Self {
        Self {
            photo_id: photo.id.as_str(),
            metadata: photo.metadata.clone(),
            quality_score: photo.quality_score.clone(),
            composition_score: photo.composition_score.clone(),
            content_score: photo.content_score.clone(),
            features: photo.features.clone(),
        }
    }
}

/// Derived metadata sent through the batch endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<AnalysisScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition_score: Option<AnalysisScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_score: Option<AnalysisScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Features>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces: Option<Vec<Face>>,
}

/// One entry of a batch metadata mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    pub photo_id: String,
    pub metadata: DerivedMetadata,
}

impl MetadataEntry {
    /// Build a batch entry from a photo's derived metadata
    #[must_use]
    pub fn from_photo(photo: &Photo) -> Self {
        Self {
            photo_id: photo.id.as_str(),
            metadata: DerivedMetadata {
                quality_score: photo.quality_score.clone(),
                composition_score: photo.composition_score.clone(),
                content_score: photo.content_score.clone(),
                features: photo.features.clone(),
                faces: photo.faces.clone(),
            },
        }
    }
}

/// Result of a batch metadata mutation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Entries accepted
    pub success: u32,
    /// Entries rejected
    pub failed: u32,
    /// Per-entry error messages
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Abstract remote endpoint consumed by the orchestrator
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Upload a photo's payload and metadata; returns the cloud URL
    async fn upload_photo(&self, token: &str, photo: &Photo, bytes: &[u8]) -> Result<String>;

    /// List the user's remotely stored photos
    async fn curated_photos(&self, token: &str) -> Result<Vec<CloudPhoto>>;

    /// Download a binary payload by cloud URL
    async fn download(&self, token: &str, url: &str) -> Result<Vec<u8>>;

    /// Push one batch of derived metadata; transport failure or a
    /// top-level error list fails the whole call
    async fn batch_sync_metadata(
        &self,
        token: &str,
        entries: &[MetadataEntry],
    ) -> Result<BatchOutcome>;

    /// Delete a photo from the remote store
    async fn delete_photo(&self, token: &str, photo_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhotoMetadata;

    fn photo() -> Photo {
        let mut photo = Photo::new(
            "blobs/p",
            PhotoMetadata {
                width: 800,
                height: 600,
                size_bytes: 1234,
                captured_at: 1_700_000_000_000,
                location: None,
            },
        );
        photo.quality_score = Some(AnalysisScore::overall(0.9));
        photo
    }

    #[test]
    fn test_upload_metadata_serializes_camel_case() {
        let payload = UploadMetadata::from_photo(&photo());
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("photoId").is_some());
        assert!(json.get("qualityScore").is_some());
        // Absent scores are omitted entirely
        assert!(json.get("compositionScore").is_none());
    }

    #[test]
    fn test_cloud_photo_deserializes() {
        let json = r#"{
            "id": "r-1",
            "photoId": "018f0d51-7d2c-7c7e-b93f-2f4b57a9c001",
            "url": "https://cdn.example.com/r-1",
            "metadata": {"width": 800, "height": 600, "sizeBytes": 1234, "capturedAt": 1},
            "uploadedAt": 2,
            "lastModified": 3
        }"#;
        let cloud: CloudPhoto = serde_json::from_str(json).unwrap();
        assert_eq!(cloud.id, "r-1");
        assert_eq!(cloud.metadata.width, 800);
    }
}
