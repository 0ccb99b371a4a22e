//! Submission of preservation packages to the external preservation registry.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::CollaboratorError;
use super::http::{ensure_success, join};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    Pending,
    Processing,
    Success,
    Failed,
    Cancelled,
}

impl PackageState {
    pub fn is_final(&self) -> bool {
        matches!(self, PackageState::Success | PackageState::Failed | PackageState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageStatus {
    pub status: PackageState,
    pub processed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PreservationRegistry: Send + Sync {
    async fn submit_package(&self, path: &Path) -> Result<(), CollaboratorError>;

    async fn query_status(&self, package_name: &str) -> Result<PackageStatus, CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct HttpPreservationRegistry {
    client: Client,
    base_url: String,
    user: String,
    api_key: String,
}

impl HttpPreservationRegistry {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        user: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            user: user.into(),
            api_key: api_key.into(),
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("X-Pharos-API-User", &self.user)
            .header("X-Pharos-API-Key", &self.api_key)
    }
}

#[async_trait]
impl PreservationRegistry for HttpPreservationRegistry {
    async fn submit_package(&self, path: &Path) -> Result<(), CollaboratorError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CollaboratorError::invalid("submit package", path.display().to_string(), "no file name"))?;
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| CollaboratorError::io("submit package", path, e))?;

        let url = join(&self.base_url, &format!("packages/{name}"));
        let response = self
            .authorized(self.client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-tar")
            .body(body)
            .send()
            .await
            .map_err(|e| CollaboratorError::transport("submit package", &name, e))?;
        ensure_success("submit package", name, response).await?;
        Ok(())
    }

    async fn query_status(&self, package_name: &str) -> Result<PackageStatus, CollaboratorError> {
        let url = join(&self.base_url, &format!("packages/{package_name}/status"));
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport("query package", package_name, e))?;
        ensure_success("query package", package_name, response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::transport("query package", package_name, e))
    }
}
