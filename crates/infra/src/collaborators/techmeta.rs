//! Technical metadata extraction from master images.

use std::path::Path;

use async_trait::async_trait;

use digiserv_units::{ExtractionError, ImageTechMeta};

use super::CollaboratorError;
use super::command;

/// Reads technical metadata from an image. Callers validate the result.
#[async_trait]
pub trait TechMetadataExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ImageTechMeta, CollaboratorError>;
}

const IDENTIFY_FORMAT: &str = "%w|%h|%[colorspace]|%C|%x|%[EXIF:DateTimeOriginal]\n";

/// Extraction through `<tool> identify`.
#[derive(Debug, Clone)]
pub struct IdentifyExtractor {
    program: String,
}

impl IdentifyExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl TechMetadataExtractor for IdentifyExtractor {
    async fn extract(&self, path: &Path) -> Result<ImageTechMeta, CollaboratorError> {
        // Only the first frame; multi-page TIFFs would otherwise print one line per page.
        let target = format!("{}[0]", path.display());
        let stdout = command::run(
            "extract tech metadata",
            &self.program,
            ["identify", "-format", IDENTIFY_FORMAT, target.as_str()],
        )
        .await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(parse_identify(&filename, &stdout)?)
    }
}

/// Parse one `IDENTIFY_FORMAT` line.
pub fn parse_identify(filename: &str, output: &str) -> Result<ImageTechMeta, ExtractionError> {
    let unreadable = |reason: &str| ExtractionError::Unreadable {
        filename: filename.to_string(),
        reason: reason.to_string(),
    };
    let line = output.lines().next().ok_or_else(|| unreadable("no output"))?;
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(unreadable("too few fields"));
    }
    let width = fields[0].parse().map_err(|_| unreadable("bad width"))?;
    let height = fields[1].parse().map_err(|_| unreadable("bad height"))?;
    let resolution = fields
        .get(4)
        .and_then(|r| r.split_whitespace().next())
        .and_then(|r| r.parse::<f64>().ok())
        .map(|r| r.round() as u32)
        .filter(|r| *r > 0);
    let capture_date = fields
        .get(5)
        .map(|d| d.to_string())
        .filter(|d| !d.is_empty());

    Ok(ImageTechMeta {
        width,
        height,
        colorspace: fields[2].to_string(),
        compression: fields[3].to_string(),
        resolution,
        capture_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identify_line() {
        let meta = parse_identify(
            "a.tif",
            "2400|3600|sRGB|None|600 PixelsPerInch|2021:03:04 10:11:12\n",
        )
        .unwrap();
        assert_eq!(meta.width, 2400);
        assert_eq!(meta.height, 3600);
        assert_eq!(meta.colorspace, "sRGB");
        assert_eq!(meta.resolution, Some(600));
        assert_eq!(meta.capture_date.as_deref(), Some("2021:03:04 10:11:12"));
    }

    #[test]
    fn missing_optional_fields_are_none() {
        let meta = parse_identify("a.tif", "10|20|Gray|LZW||").unwrap();
        assert_eq!(meta.resolution, None);
        assert_eq!(meta.capture_date, None);
    }

    #[test]
    fn garbage_is_unreadable() {
        assert!(matches!(
            parse_identify("a.tif", "identify: improper image header"),
            Err(ExtractionError::Unreadable { .. })
        ));
        assert!(parse_identify("a.tif", "").is_err());
    }
}
