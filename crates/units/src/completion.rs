//! Final checks before a unit may be marked done.

use crate::master_file::MasterFile;
use crate::unit::UnitContext;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionProblem {
    #[error("unit has not been archived")]
    NotArchived,
    #[error("unit has no master files")]
    NoMasterFiles,
    #[error("master file {filename} has no title")]
    MissingTitle { filename: String },
    #[error("master file {filename} has no technical metadata")]
    MissingTechMetadata { filename: String },
    #[error("patron deliverables are not ready")]
    PatronDeliverablesNotReady,
    #[error("digital library deliverables are not ready")]
    DlDeliverablesNotReady,
}

/// Check a freshly reloaded unit and its master files. Empty means complete.
pub fn completion_problems(ctx: &UnitContext, master_files: &[MasterFile]) -> Vec<CompletionProblem> {
    let unit = &ctx.unit;
    let mut problems = Vec::new();

    if !unit.throw_away && unit.date_archived.is_none() {
        problems.push(CompletionProblem::NotArchived);
    }

    if master_files.is_empty() {
        problems.push(CompletionProblem::NoMasterFiles);
    }
    for mf in master_files {
        if mf.title.as_deref().is_none_or(|t| t.trim().is_empty()) {
            problems.push(CompletionProblem::MissingTitle {
                filename: mf.filename.clone(),
            });
        }
        if mf.tech_meta.is_none() {
            problems.push(CompletionProblem::MissingTechMetadata {
                filename: mf.filename.clone(),
            });
        }
    }

    if unit.needs_patron_deliverables() && unit.date_patron_deliverables_ready.is_none() {
        problems.push(CompletionProblem::PatronDeliverablesNotReady);
    }
    if unit.include_in_dl && unit.date_dl_deliverables_ready.is_none() {
        problems.push(CompletionProblem::DlDeliverablesNotReady);
    }

    problems
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::master_file::ImageTechMeta;
    use crate::order::{Order, OrderStatus};
    use crate::unit::{DIGITAL_COLLECTION_BUILDING, Unit};
    use digiserv_core::{IntendedUseId, MasterFileId, OrderId, UnitId};

    fn ctx() -> UnitContext {
        let mut unit = Unit::approved(UnitId::new(12), OrderId::new(1));
        unit.intended_use_id = Some(DIGITAL_COLLECTION_BUILDING);
        unit.date_archived = Some(Utc::now());
        UnitContext {
            unit,
            order: Order::new(OrderId::new(1), OrderStatus::Approved),
            metadata: None,
            intended_use: None,
        }
    }

    fn master_file(seq: i64) -> MasterFile {
        MasterFile {
            id: MasterFileId::new(seq),
            unit_id: UnitId::new(12),
            pid: format!("tsm:{seq}"),
            filename: format!("000000012_{seq:04}.tif"),
            title: Some(seq.to_string()),
            filesize: 40_000,
            checksum: "ab".repeat(32),
            tech_meta: Some(ImageTechMeta {
                width: 100,
                height: 200,
                colorspace: "sRGB".to_string(),
                compression: "None".to_string(),
                resolution: None,
                capture_date: None,
            }),
            date_archived: Some(Utc::now()),
        }
    }

    #[test]
    fn archived_unit_with_described_files_is_complete() {
        assert!(completion_problems(&ctx(), &[master_file(1), master_file(2)]).is_empty());
    }

    #[test]
    fn throw_away_units_need_no_archive() {
        let mut c = ctx();
        c.unit.date_archived = None;
        assert_eq!(completion_problems(&c, &[master_file(1)]), vec![CompletionProblem::NotArchived]);
        c.unit.throw_away = true;
        assert!(completion_problems(&c, &[master_file(1)]).is_empty());
    }

    #[test]
    fn file_and_deliverable_gaps_are_all_listed() {
        let mut c = ctx();
        c.unit.intended_use_id = Some(IntendedUseId::new(101));
        c.unit.include_in_dl = true;
        let mut mf = master_file(1);
        mf.title = None;
        mf.tech_meta = None;

        let problems = completion_problems(&c, &[mf]);
        assert_eq!(problems.len(), 4);
        assert!(problems.contains(&CompletionProblem::PatronDeliverablesNotReady));
        assert!(problems.contains(&CompletionProblem::DlDeliverablesNotReady));
    }

    #[test]
    fn unit_without_files_is_incomplete() {
        assert_eq!(completion_problems(&ctx(), &[]), vec![CompletionProblem::NoMasterFiles]);
    }
}
