//! Publication year lookup in the library catalog.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use super::CollaboratorError;
use super::http::{ensure_success, join};

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Publication year of a catalog record, if the record states one.
    async fn publication_year(&self, catalog_key: &str) -> Result<Option<i32>, CollaboratorError>;
}

/// Looks the record up as MARC XML.
#[derive(Debug, Clone)]
pub struct HttpCatalogLookup {
    client: Client,
    base_url: String,
}

impl HttpCatalogLookup {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CatalogLookup for HttpCatalogLookup {
    async fn publication_year(&self, catalog_key: &str) -> Result<Option<i32>, CollaboratorError> {
        let url = join(&self.base_url, &format!("{catalog_key}?type=xml"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CollaboratorError::transport("catalog lookup", catalog_key, e))?;
        let body = ensure_success("catalog lookup", catalog_key, response)
            .await?
            .text()
            .await
            .map_err(|e| CollaboratorError::transport("catalog lookup", catalog_key, e))?;
        Ok(marc_publication_year(&body))
    }
}

static CONTROL_008: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:marc:)?controlfield[^>]*tag="008"[^>]*>([^<]*)</"#)
        .expect("valid control field pattern")
});

/// Date 1 of MARC control field 008 (character positions 7-10).
pub fn marc_publication_year(xml: &str) -> Option<i32> {
    let field = CONTROL_008.captures(xml)?.get(1)?.as_str();
    let year = field.get(7..11)?;
    if !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    year.parse().ok()
}
