//! Naming and layout rules for a unit's staging directory.
//!
//! The caller lists the directory; this module only judges the listing.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use digiserv_core::UnitId;

/// Images smaller than this are treated as truncated captures.
pub const MIN_IMAGE_BYTES: u64 = 10 * 1024;

static IMAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{9})_(\d{4,})\.(?i:tif)$").expect("valid image name pattern"));

/// One direct child of the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedEntry {
    File { name: String, size: u64 },
    Dir { name: String },
}

impl StagedEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        StagedEntry::File {
            name: name.into(),
            size,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        StagedEntry::Dir { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            StagedEntry::File { name, .. } | StagedEntry::Dir { name } => name,
        }
    }
}

/// An image that passed the naming rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedImage {
    pub filename: String,
    pub sequence: u32,
    pub size: u64,
}

impl StagedImage {
    /// Title given to the master file created from this image.
    pub fn title(&self) -> String {
        self.sequence.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StagingProblem {
    #[error("no images found in staging directory")]
    NoImages,
    #[error("{name}: image name must match {unit}_<sequence>.tif")]
    BadName { name: String, unit: String },
    #[error("{name}: image belongs to unit {found}, not {expected}")]
    WrongUnit { name: String, expected: String, found: String },
    #[error("{name}: duplicate sequence number {sequence}")]
    DuplicateSequence { name: String, sequence: u32 },
    #[error("{name}: expected sequence {expected}, found {found}")]
    SequenceGap { name: String, expected: u32, found: u32 },
    #[error("{name}: {size} bytes is below the {min} byte minimum")]
    TooSmall { name: String, size: u64, min: u64 },
    #[error("{name}: unexpected file")]
    UnexpectedFile { name: String },
    #[error("{name}: unexpected directory")]
    UnexpectedDirectory { name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingReport {
    /// Well-named images in sequence order.
    pub images: Vec<StagedImage>,
    pub problems: Vec<StagingProblem>,
}

impl StagingReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Judge a staging directory listing against the rules for `unit`.
pub fn inspect(unit: UnitId, entries: &[StagedEntry]) -> StagingReport {
    let unit_prefix = format!("{:09}", unit.get());
    let mut report = StagingReport::default();

    for entry in entries {
        let name = entry.name();
        if name.starts_with('.') {
            continue;
        }
        let size = match entry {
            StagedEntry::Dir { .. } => {
                report.problems.push(StagingProblem::UnexpectedDirectory {
                    name: name.to_string(),
                });
                continue;
            }
            StagedEntry::File { size, .. } => *size,
        };

        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".txt") {
            continue;
        }
        if !lower.ends_with(".tif") {
            report.problems.push(StagingProblem::UnexpectedFile {
                name: name.to_string(),
            });
            continue;
        }

        let Some(caps) = IMAGE_NAME.captures(name) else {
            report.problems.push(StagingProblem::BadName {
                name: name.to_string(),
                unit: unit_prefix.clone(),
            });
            continue;
        };
        if caps[1] != unit_prefix {
            report.problems.push(StagingProblem::WrongUnit {
                name: name.to_string(),
                expected: unit_prefix.clone(),
                found: caps[1].to_string(),
            });
            continue;
        }
        let Ok(sequence) = caps[2].parse::<u32>() else {
            report.problems.push(StagingProblem::BadName {
                name: name.to_string(),
                unit: unit_prefix.clone(),
            });
            continue;
        };

        if size < MIN_IMAGE_BYTES {
            report.problems.push(StagingProblem::TooSmall {
                name: name.to_string(),
                size,
                min: MIN_IMAGE_BYTES,
            });
        }
        report.images.push(StagedImage {
            filename: name.to_string(),
            sequence,
            size,
        });
    }

    report.images.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.filename.cmp(&b.filename)));
    check_sequence(&report.images, &mut report.problems);

    if report.images.is_empty() {
        report.problems.push(StagingProblem::NoImages);
    }
    report
}

/// Sequences must run 1..=N with no gaps or repeats.
fn check_sequence(images: &[StagedImage], problems: &mut Vec<StagingProblem>) {
    let mut expected = 1;
    let mut previous = None;
    for image in images {
        if previous == Some(image.sequence) {
            problems.push(StagingProblem::DuplicateSequence {
                name: image.filename.clone(),
                sequence: image.sequence,
            });
            continue;
        }
        if image.sequence != expected {
            problems.push(StagingProblem::SequenceGap {
                name: image.filename.clone(),
                expected,
                found: image.sequence,
            });
        }
        previous = Some(image.sequence);
        expected = image.sequence.saturating_add(1);
    }
}
