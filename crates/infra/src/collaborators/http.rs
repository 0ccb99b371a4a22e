//! Shared HTTP plumbing for the web-service collaborators.

use std::time::Duration;

use reqwest::{Client, Response};

use super::CollaboratorError;

/// Build the client shared by every HTTP collaborator.
pub fn client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Turn a non-success response into `CollaboratorError::Http`, keeping the body.
pub async fn ensure_success(
    op: &'static str,
    entity: impl Into<String>,
    response: Response,
) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Http {
        op,
        entity: entity.into(),
        status: status.as_u16(),
        body: body.chars().take(512).collect(),
    })
}

pub fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_normalizes_slashes() {
        assert_eq!(join("http://ocr/", "/jobs/1"), "http://ocr/jobs/1");
        assert_eq!(join("http://ocr", "jobs/1"), "http://ocr/jobs/1");
    }
}
