use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digiserv_core::{DomainError, MetadataId};

/// Where a metadata record's descriptive data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    /// Catalog (MARC) record.
    Sirsi,
    Xml,
    External,
}

impl MetadataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKind::Sirsi => "sirsi",
            MetadataKind::Xml => "xml",
            MetadataKind::External => "external",
        }
    }
}

impl core::str::FromStr for MetadataKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sirsi" => Ok(MetadataKind::Sirsi),
            "xml" => Ok(MetadataKind::Xml),
            "external" => Ok(MetadataKind::External),
            other => Err(DomainError::validation(format!("unknown metadata kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityPolicy {
    Public,
    UvaOnly,
    Restricted,
}

impl AvailabilityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityPolicy::Public => "public",
            AvailabilityPolicy::UvaOnly => "uva_only",
            AvailabilityPolicy::Restricted => "restricted",
        }
    }
}

impl core::str::FromStr for AvailabilityPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(AvailabilityPolicy::Public),
            "uva_only" => Ok(AvailabilityPolicy::UvaOnly),
            "restricted" => Ok(AvailabilityPolicy::Restricted),
            other => Err(DomainError::validation(format!("unknown availability policy: {other}"))),
        }
    }
}

/// Describes what kind of text (if any) the scanned pages carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrHint {
    pub id: i64,
    pub name: String,
    pub ocr_candidate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: MetadataId,
    pub pid: String,
    pub title: String,
    pub kind: MetadataKind,
    pub catalog_key: Option<String>,
    pub is_manuscript: bool,
    pub is_personal_item: bool,
    pub availability_policy: Option<AvailabilityPolicy>,
    pub ocr_hint: Option<OcrHint>,
    pub ocr_language_hint: Option<String>,
    pub date_dl_ingest: Option<DateTime<Utc>>,
}

impl Metadata {
    pub fn new(id: MetadataId, pid: impl Into<String>, title: impl Into<String>, kind: MetadataKind) -> Self {
        Self {
            id,
            pid: pid.into(),
            title: title.into(),
            kind,
            catalog_key: None,
            is_manuscript: false,
            is_personal_item: false,
            availability_policy: None,
            ocr_hint: None,
            ocr_language_hint: None,
            date_dl_ingest: None,
        }
    }

    /// Catalog key of a catalog record, ignoring blank keys.
    pub fn catalog_key(&self) -> Option<&str> {
        self.catalog_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_catalog_key_is_absent() {
        let mut md = Metadata::new(MetadataId::new(1), "uva-lib:1", "Letters", MetadataKind::Sirsi);
        assert_eq!(md.catalog_key(), None);
        md.catalog_key = Some("  ".to_string());
        assert_eq!(md.catalog_key(), None);
        md.catalog_key = Some(" u123 ".to_string());
        assert_eq!(md.catalog_key(), Some("u123"));
    }

    #[test]
    fn policy_parses_stored_names() {
        assert_eq!("uva_only".parse::<AvailabilityPolicy>().unwrap(), AvailabilityPolicy::UvaOnly);
        assert!("everyone".parse::<AvailabilityPolicy>().is_err());
    }
}
