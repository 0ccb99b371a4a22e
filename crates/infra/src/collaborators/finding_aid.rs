//! Linking digitized items into the archival finding-aid system.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use super::CollaboratorError;
use super::http::{ensure_success, join};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalObject {
    pub uri: String,
    pub title: String,
    /// Repository the object belongs to, e.g. `/repositories/3`.
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDigitalObject {
    pub repository: String,
    pub identifier: String,
    pub title: String,
    pub file_uri: String,
}

#[async_trait]
pub trait FindingAidService: Send + Sync {
    async fn lookup_archival_object(&self, uri: &str) -> Result<ArchivalObject, CollaboratorError>;

    /// URI of the digital object with `identifier` in `repository`, if one exists.
    async fn find_digital_object(
        &self,
        repository: &str,
        identifier: &str,
    ) -> Result<Option<String>, CollaboratorError>;

    async fn create_digital_object(&self, object: &NewDigitalObject) -> Result<String, CollaboratorError>;

    /// Attach a digital object instance to an archival object.
    async fn link_digital_object(
        &self,
        archival_object_uri: &str,
        digital_object_uri: &str,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Finding-aid service reached over its REST API. The login session is
/// cached and renewed once it has expired.
#[derive(Debug)]
pub struct HttpFindingAidService {
    client: Client,
    base_url: String,
    user: String,
    password: String,
    session_ttl: Duration,
    session: Mutex<Option<Session>>,
}

#[derive(Deserialize)]
struct LoginResponse {
    session: String,
}

#[derive(Deserialize)]
struct CreatedResponse {
    uri: String,
}

impl HttpFindingAidService {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            user: user.into(),
            password: password.into(),
            session_ttl,
            session: Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String, CollaboratorError> {
        let mut session = self.session.lock().await;
        if let Some(s) = session.as_ref().filter(|s| s.expires_at > Utc::now()) {
            return Ok(s.token.clone());
        }

        debug!(user = %self.user, "logging in to finding-aid service");
        let url = join(&self.base_url, &format!("users/{}/login", self.user));
        let response = self
            .client
            .post(&url)
            .query(&[("password", self.password.as_str())])
            .send()
            .await
            .map_err(|e| CollaboratorError::transport("finding-aid login", &self.user, e))?;
        let login: LoginResponse = ensure_success("finding-aid login", &self.user, response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::transport("finding-aid login", &self.user, e))?;

        let ttl = chrono::Duration::from_std(self.session_ttl).unwrap_or(chrono::Duration::hours(1));
        *session = Some(Session {
            token: login.session.clone(),
            expires_at: Utc::now() + ttl,
        });
        Ok(login.session)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, CollaboratorError> {
        Ok(request.header("X-ArchivesSpace-Session", self.token().await?))
    }

    async fn get_json(&self, op: &'static str, path: &str) -> Result<Value, CollaboratorError> {
        let url = join(&self.base_url, path);
        let response = self
            .authorized(self.client.get(&url))
            .await?
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(op, path, e))?;
        ensure_success(op, path, response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::transport(op, path, e))
    }

    async fn post_json(&self, op: &'static str, path: &str, body: &Value) -> Result<Value, CollaboratorError> {
        let url = join(&self.base_url, path);
        let response = self
            .authorized(self.client.post(&url))
            .await?
            .json(body)
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(op, path, e))?;
        ensure_success(op, path, response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::transport(op, path, e))
    }
}

#[async_trait]
impl FindingAidService for HttpFindingAidService {
    async fn lookup_archival_object(&self, uri: &str) -> Result<ArchivalObject, CollaboratorError> {
        let body = self.get_json("lookup archival object", uri).await?;
        let title = body["title"]
            .as_str()
            .or_else(|| body["display_string"].as_str())
            .unwrap_or_default()
            .to_string();
        let repository = body["repository"]["ref"]
            .as_str()
            .ok_or_else(|| CollaboratorError::invalid("lookup archival object", uri, "no repository ref"))?
            .to_string();
        Ok(ArchivalObject {
            uri: uri.to_string(),
            title,
            repository,
        })
    }

    async fn find_digital_object(
        &self,
        repository: &str,
        identifier: &str,
    ) -> Result<Option<String>, CollaboratorError> {
        let path = format!("{repository}/find_by_id/digital_objects?digital_object_id[]={identifier}");
        let body = self.get_json("find digital object", &path).await?;
        Ok(body["digital_objects"]
            .as_array()
            .and_then(|objects| objects.first())
            .and_then(|o| o["ref"].as_str())
            .map(str::to_string))
    }

    async fn create_digital_object(&self, object: &NewDigitalObject) -> Result<String, CollaboratorError> {
        let body = json!({
            "jsonmodel_type": "digital_object",
            "digital_object_id": object.identifier,
            "title": object.title,
            "publish": true,
            "file_versions": [{
                "file_uri": object.file_uri,
                "use_statement": "image-service-manifest",
            }],
        });
        let created = self
            .post_json("create digital object", &format!("{}/digital_objects", object.repository), &body)
            .await?;
        serde_json::from_value::<CreatedResponse>(created)
            .map(|c| c.uri)
            .map_err(|e| CollaboratorError::invalid("create digital object", &object.identifier, e.to_string()))
    }

    async fn link_digital_object(
        &self,
        archival_object_uri: &str,
        digital_object_uri: &str,
    ) -> Result<(), CollaboratorError> {
        let mut object = self.get_json("link digital object", archival_object_uri).await?;
        let instances = object["instances"].as_array().cloned().unwrap_or_default();
        let already_linked = instances
            .iter()
            .any(|i| i["digital_object"]["ref"].as_str() == Some(digital_object_uri));
        if already_linked {
            return Ok(());
        }

        let mut updated = instances;
        updated.push(json!({
            "instance_type": "digital_object",
            "digital_object": { "ref": digital_object_uri },
        }));
        object["instances"] = Value::Array(updated);
        self.post_json("link digital object", archival_object_uri, &object).await?;
        Ok(())
    }
}
