//! Digital library (discovery) reindexing.

use async_trait::async_trait;
use reqwest::Client;

use super::CollaboratorError;
use super::http::{ensure_success, join};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexTarget {
    Pid(String),
    CatalogKey(String),
}

impl ReindexTarget {
    fn path(&self) -> String {
        match self {
            ReindexTarget::Pid(pid) => format!("pid/{pid}"),
            ReindexTarget::CatalogKey(key) => format!("catalog/{key}"),
        }
    }
}

impl core::fmt::Display for ReindexTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ReindexTarget::Pid(pid) => write!(f, "pid {pid}"),
            ReindexTarget::CatalogKey(key) => write!(f, "catalog key {key}"),
        }
    }
}

#[async_trait]
pub trait ReindexService: Send + Sync {
    async fn reindex(&self, target: &ReindexTarget) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct HttpReindexService {
    client: Client,
    base_url: String,
}

impl HttpReindexService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ReindexService for HttpReindexService {
    async fn reindex(&self, target: &ReindexTarget) -> Result<(), CollaboratorError> {
        let url = join(&self.base_url, &target.path());
        let response = self
            .client
            .put(&url)
            .send()
            .await
            .map_err(|e| CollaboratorError::transport("reindex", target.to_string(), e))?;
        ensure_success("reindex", target.to_string(), response).await?;
        Ok(())
    }
}
