//! Master files: the archived page images of a unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digiserv_core::{MasterFileId, UnitId};

/// Colorspaces accepted for archival master images.
const SUPPORTED_COLORSPACES: &[&str] = &["srgb", "rgb", "gray", "grey", "cmyk"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTechMeta {
    pub width: u32,
    pub height: u32,
    pub colorspace: String,
    pub compression: String,
    pub resolution: Option<u32>,
    pub capture_date: Option<String>,
}

impl ImageTechMeta {
    /// Reject metadata that cannot describe a usable master image.
    pub fn validate(&self, filename: &str) -> Result<(), ExtractionError> {
        if self.width == 0 || self.height == 0 {
            return Err(ExtractionError::ZeroDimensions {
                filename: filename.to_string(),
                width: self.width,
                height: self.height,
            });
        }
        let colorspace = self.colorspace.to_ascii_lowercase();
        if !SUPPORTED_COLORSPACES.contains(&colorspace.as_str()) {
            return Err(ExtractionError::UnsupportedColorspace {
                filename: filename.to_string(),
                colorspace: self.colorspace.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("{filename}: invalid dimensions {width}x{height}")]
    ZeroDimensions {
        filename: String,
        width: u32,
        height: u32,
    },
    #[error("{filename}: unsupported colorspace {colorspace}")]
    UnsupportedColorspace { filename: String, colorspace: String },
    #[error("{filename}: unreadable image metadata: {reason}")]
    Unreadable { filename: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterFile {
    pub id: MasterFileId,
    pub unit_id: UnitId,
    pub pid: String,
    pub filename: String,
    pub title: Option<String>,
    pub filesize: u64,
    pub checksum: String,
    pub tech_meta: Option<ImageTechMeta>,
    pub date_archived: Option<DateTime<Utc>>,
}

impl MasterFile {
    /// IIIF identifier of the derivative generated for this file.
    pub fn iiif_id(&self) -> &str {
        &self.pid
    }

    pub fn is_archived(&self) -> bool {
        self.date_archived.is_some()
    }
}

/// Fields of a master file about to be created. The store assigns id and pid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMasterFile {
    pub unit_id: UnitId,
    pub filename: String,
    pub title: String,
    pub filesize: u64,
    pub checksum: String,
    pub tech_meta: ImageTechMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(width: u32, height: u32, colorspace: &str) -> ImageTechMeta {
        ImageTechMeta {
            width,
            height,
            colorspace: colorspace.to_string(),
            compression: "None".to_string(),
            resolution: Some(600),
            capture_date: None,
        }
    }

    #[test]
    fn accepts_ordinary_scans() {
        assert!(meta(2400, 3600, "sRGB").validate("a.tif").is_ok());
        assert!(meta(2400, 3600, "Gray").validate("a.tif").is_ok());
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            meta(0, 3600, "sRGB").validate("a.tif"),
            Err(ExtractionError::ZeroDimensions { width: 0, .. })
        ));
    }

    #[test]
    fn rejects_unknown_colorspace() {
        let err = meta(10, 10, "YCbCr").validate("000000001_0001.tif").unwrap_err();
        assert_eq!(err.to_string(), "000000001_0001.tif: unsupported colorspace YCbCr");
    }
}
