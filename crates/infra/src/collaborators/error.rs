use std::path::Path;

use digiserv_units::ExtractionError;

/// Failure of an external collaborator, with the operation and entity it concerned.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{op} {entity}: HTTP {status}: {body}")]
    Http {
        op: &'static str,
        entity: String,
        status: u16,
        body: String,
    },
    #[error("{op} {entity}: request failed: {source}")]
    Transport {
        op: &'static str,
        entity: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{op}: {program} failed ({status}): {stderr}")]
    Command {
        op: &'static str,
        program: String,
        status: String,
        stderr: String,
    },
    #[error("{op} {entity}: {message}")]
    Invalid {
        op: &'static str,
        entity: String,
        message: String,
    },
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl CollaboratorError {
    pub fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.display().to_string(),
            source,
        }
    }

    pub fn transport(op: &'static str, entity: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            op,
            entity: entity.into(),
            source,
        }
    }

    pub fn invalid(op: &'static str, entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            op,
            entity: entity.into(),
            message: message.into(),
        }
    }
}
