//! Process configuration read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use digiserv_observability::LogFormat;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{0} must be set when COLLABORATORS=live")]
    Missing(&'static str),
}

/// Which collaborator implementations to wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorMode {
    Live,
    /// In-memory fakes; for local development.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectTrackerKind {
    /// Mark units done in this service's own store.
    Direct,
    Http,
}

/// Base URL and credentials of an authenticated collaborator.
#[derive(Debug, Clone, Default)]
pub struct ServiceCredentials {
    pub url: String,
    pub user: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Unset means in-memory stores.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_format: LogFormat,
    pub service_url: String,

    pub staging_dir: PathBuf,
    pub work_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub iiif_dir: PathBuf,
    pub delivery_dir: PathBuf,
    pub package_dir: PathBuf,
    pub image_tool: String,

    pub iiif_batches: usize,
    pub ocr_timeout: Duration,
    pub http_timeout: Duration,
    pub preservation_poll_interval: Duration,
    pub preservation_max_polls: u32,
    pub finding_aid_session_ttl: Duration,

    pub collaborators: CollaboratorMode,
    pub project_tracker: ProjectTrackerKind,
    pub ocr_url: String,
    pub reindex_url: String,
    pub catalog_url: String,
    pub projects_url: String,
    pub iiif_manifest_url: String,
    pub preservation: ServiceCredentials,
    pub finding_aid: ServiceCredentials,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let collaborators = match env.get("COLLABORATORS").as_deref() {
            None | Some("live") => CollaboratorMode::Live,
            Some("memory") => CollaboratorMode::Memory,
            Some(other) => return Err(invalid("COLLABORATORS", other, "'live' or 'memory'")),
        };
        let project_tracker = match env.get("PROJECT_TRACKER").as_deref() {
            None | Some("direct") => ProjectTrackerKind::Direct,
            Some("http") => ProjectTrackerKind::Http,
            Some(other) => return Err(invalid("PROJECT_TRACKER", other, "'direct' or 'http'")),
        };
        let log_format = match env.get("LOG_FORMAT") {
            None => LogFormat::default(),
            Some(v) => v
                .parse()
                .map_err(|_| invalid("LOG_FORMAT", &v, "'json' or 'pretty'"))?,
        };

        let live = collaborators == CollaboratorMode::Live;
        let url = |name: &'static str, needed: bool| -> Result<String, ConfigError> {
            match env.get(name) {
                Some(v) => Ok(v),
                None if needed => Err(ConfigError::Missing(name)),
                None => Ok(String::new()),
            }
        };

        let data = PathBuf::from(env.get("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let dir = |name: &str, default: &str| {
            env.get(name)
                .map(PathBuf::from)
                .unwrap_or_else(|| data.join(default))
        };

        Ok(Self {
            bind_addr: env.get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_url: env.get("DATABASE_URL"),
            db_max_connections: env.parse("DB_MAX_CONNECTIONS", 10, "a positive integer")?,
            log_format,
            service_url: env
                .get("SERVICE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),

            staging_dir: dir("STAGING_DIR", "staging"),
            work_dir: dir("WORK_DIR", "work"),
            archive_dir: dir("ARCHIVE_DIR", "archive"),
            iiif_dir: dir("IIIF_DIR", "iiif"),
            delivery_dir: dir("DELIVERY_DIR", "delivery"),
            package_dir: dir("PACKAGE_DIR", "packages"),
            image_tool: env.get("IMAGE_TOOL").unwrap_or_else(|| "magick".to_string()),

            iiif_batches: env.parse("IIIF_BATCHES", 4, "a positive integer")?,
            ocr_timeout: env.seconds("OCR_TIMEOUT_SECS", 4 * 60 * 60)?,
            http_timeout: env.seconds("HTTP_TIMEOUT_SECS", 30)?,
            preservation_poll_interval: env.seconds("PRESERVATION_POLL_SECS", 5 * 60)?,
            preservation_max_polls: env.parse("PRESERVATION_MAX_POLLS", 288, "a positive integer")?,
            finding_aid_session_ttl: env.seconds("ASPACE_SESSION_SECS", 60 * 60)?,

            collaborators,
            project_tracker,
            ocr_url: url("OCR_URL", live)?,
            reindex_url: url("REINDEX_URL", live)?,
            catalog_url: url("CATALOG_URL", live)?,
            projects_url: url("PROJECTS_URL", live && project_tracker == ProjectTrackerKind::Http)?,
            iiif_manifest_url: url("IIIF_MANIFEST_URL", live)?,
            preservation: ServiceCredentials {
                url: url("APTRUST_URL", live)?,
                user: url("APTRUST_USER", live)?,
                secret: url("APTRUST_KEY", live)?,
            },
            finding_aid: ServiceCredentials {
                url: url("ASPACE_URL", live)?,
                user: url("ASPACE_USER", live)?,
                secret: url("ASPACE_PASSWORD", live)?,
            },
        })
    }
}

fn invalid(name: &'static str, value: &str, expected: &'static str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        expected,
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Non-blank value of a variable.
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr + PartialOrd + Default>(
        &self,
        name: &'static str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        let Some(raw) = self.get(name) else {
            return Ok(default);
        };
        match raw.parse::<T>() {
            Ok(v) if v > T::default() => Ok(v),
            _ => Err(invalid(name, &raw, expected)),
        }
    }

    fn seconds(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(name, default, "a positive number of seconds")
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn memory_mode_needs_no_collaborator_urls() {
        let cfg = config(&[("COLLABORATORS", "memory")]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.iiif_batches, 4);
        assert_eq!(cfg.ocr_timeout, Duration::from_secs(4 * 60 * 60));
        assert_eq!(cfg.image_tool, "magick");
        assert_eq!(cfg.staging_dir, PathBuf::from("data/staging"));
        assert_eq!(cfg.project_tracker, ProjectTrackerKind::Direct);
    }

    #[test]
    fn live_mode_requires_collaborator_urls() {
        let err = config(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OCR_URL")), "{err}");
    }

    #[test]
    fn malformed_numbers_fail_startup() {
        let err = config(&[("COLLABORATORS", "memory"), ("IIIF_BATCHES", "lots")]).unwrap_err();
        assert!(err.to_string().contains("IIIF_BATCHES"));
        let err = config(&[("COLLABORATORS", "memory"), ("OCR_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "OCR_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("COLLABORATORS", "memory"),
            ("DATABASE_URL", "  "),
            ("STAGING_DIR", "/mnt/staging"),
        ])
        .unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.staging_dir, PathBuf::from("/mnt/staging"));
    }
}
