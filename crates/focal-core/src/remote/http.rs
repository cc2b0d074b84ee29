//! reqwest-backed implementation of the remote wire contract

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Photo;

use super::{BatchOutcome, CloudPhoto, MetadataEntry, RemoteEndpoint, UploadMetadata};

const BATCH_SYNC_MUTATION: &str = "mutation BatchSyncMetadata($entries: [PhotoMetadataInput!]!) {
    batchSyncMetadata(entries: $entries) { success failed errors }
}";

/// HTTP client for the remote photo API
#[derive(Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Create a remote client for the given base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemote {
    async fn upload_photo(&self, token: &str, photo: &Photo, bytes: &[u8]) -> Result<String> {
        let metadata = serde_json::to_string(&UploadMetadata::from_photo(photo))?;
        let form = Form::new()
            .part(
                "photo",
                Part::bytes(bytes.to_vec())
                    .file_name(photo.id.as_str())
                    .mime_str("application/octet-stream")
                    .map_err(Error::Network)?,
            )
            .part(
                "metadata",
                Part::text(metadata)
                    .mime_str("application/json")
                    .map_err(Error::Network)?,
            );

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let payload = response.json::<UploadResponse>().await?;
        Ok(payload.cloud_url)
    }

    async fn curated_photos(&self, token: &str) -> Result<Vec<CloudPhoto>> {
        let response = self
            .client
            .get(format!("{}/curated-photos", self.base_url))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn download(&self, token: &str, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let response = Self::check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn batch_sync_metadata(
        &self,
        token: &str,
        entries: &[MetadataEntry],
    ) -> Result<BatchOutcome> {
        let body = GraphQlRequest {
            query: BATCH_SYNC_MUTATION,
            variables: BatchVariables { entries },
        };

        let response = self
            .client
            .post(format!("{}/graphql", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let payload = response.json::<GraphQlResponse>().await?;
        if let Some(errors) = payload.errors.filter(|errors| !errors.is_empty()) {
            let joined = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::BatchSync(joined));
        }

        payload
            .data
            .map(|data| data.batch_sync_metadata)
            .ok_or_else(|| Error::BatchSync("response carried no data".to_string()))
    }

    async fn delete_photo(&self, token: &str, photo_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/photos/{photo_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    cloud_url: String,
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'static str,
    variables: BatchVariables<'a>,
}

#[derive(Serialize)]
struct BatchVariables<'a> {
    entries: &'a [MetadataEntry],
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<GraphQlData>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlData {
    batch_sync_metadata: BatchOutcome,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(Error::Validation(
            "remote base URL must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::Validation(
            "remote base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_endpoint("https://api.example.com/".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_parse_api_error_prefers_json_message() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"message": "payload too large"}"#,
        );
        assert_eq!(message, "payload too large");
    }

    #[test]
    fn test_parse_api_error_falls_back_to_body() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream unavailable"),
            "upstream unavailable"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn test_graphql_response_with_top_level_errors() {
        let payload: GraphQlResponse = serde_json::from_str(
            r#"{"errors": [{"message": "unauthorized"}, {"message": "rate limited"}]}"#,
        )
        .unwrap();
        assert!(payload.data.is_none());
        assert_eq!(payload.errors.unwrap().len(), 2);
    }

    #[test]
    fn test_graphql_response_with_data() {
        let payload: GraphQlResponse = serde_json::from_str(
            r#"{"data": {"batchSyncMetadata": {"success": 5, "failed": 0, "errors": []}}}"#,
        )
        .unwrap();
        let outcome = payload.data.unwrap().batch_sync_metadata;
        assert_eq!(outcome.success, 5);
        assert!(outcome.errors.is_empty());
    }
}
