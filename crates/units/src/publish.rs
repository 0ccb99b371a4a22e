//! Automatic digital-library publication of public-domain catalog items.

use crate::metadata::{AvailabilityPolicy, Metadata, MetadataKind};
use crate::unit::{Unit, UnitContext};

/// Items published before this year are treated as public domain.
pub const PUBLIC_DOMAIN_CUTOFF_YEAR: i32 = 1923;

/// Why a unit is not considered for auto-publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("unit is already flagged for the digital library")]
    AlreadyIncluded,
    #[error("unit is a re-order")]
    Reorder,
    #[error("unit is throw away")]
    ThrowAway,
    #[error("unit is not a complete scan")]
    IncompleteScan,
    #[error("unit has no metadata")]
    NoMetadata,
    #[error("metadata is not a catalog record")]
    NotCatalogRecord,
    #[error("catalog record has no catalog key")]
    NoCatalogKey,
    #[error("item is a manuscript")]
    Manuscript,
    #[error("item is a personal item")]
    PersonalItem,
}

/// Return the catalog key to look up when the unit may be auto-published.
pub fn eligibility(ctx: &UnitContext) -> Result<&str, SkipReason> {
    let unit = &ctx.unit;
    if unit.include_in_dl {
        return Err(SkipReason::AlreadyIncluded);
    }
    if unit.reorder {
        return Err(SkipReason::Reorder);
    }
    if unit.throw_away {
        return Err(SkipReason::ThrowAway);
    }
    if !unit.complete_scan {
        return Err(SkipReason::IncompleteScan);
    }
    let md = ctx.metadata.as_ref().ok_or(SkipReason::NoMetadata)?;
    if md.kind != MetadataKind::Sirsi {
        return Err(SkipReason::NotCatalogRecord);
    }
    if md.is_manuscript {
        return Err(SkipReason::Manuscript);
    }
    if md.is_personal_item {
        return Err(SkipReason::PersonalItem);
    }
    md.catalog_key().ok_or(SkipReason::NoCatalogKey)
}

/// Outcome of comparing a publication year with the public-domain cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPublish {
    Publish { year: i32 },
    TooRecent { year: i32 },
}

impl AutoPublish {
    pub fn for_year(year: i32) -> Self {
        if year < PUBLIC_DOMAIN_CUTOFF_YEAR {
            AutoPublish::Publish { year }
        } else {
            AutoPublish::TooRecent { year }
        }
    }

    pub fn publishes(&self) -> bool {
        matches!(self, AutoPublish::Publish { .. })
    }

    /// Flag the unit for the digital library and default the policy to public.
    ///
    /// Returns whether the metadata record changed.
    pub fn apply(&self, unit: &mut Unit, metadata: &mut Metadata) -> bool {
        if !self.publishes() {
            return false;
        }
        unit.include_in_dl = true;
        if metadata.availability_policy.is_none() {
            metadata.availability_policy = Some(AvailabilityPolicy::Public);
            return true;
        }
        false
    }
}
