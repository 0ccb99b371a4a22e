//! Unit-level QA performed before any file is touched.
//!
//! Every rule is evaluated so a single run reports all problems at once.

use crate::metadata::MetadataKind;
use crate::unit::UnitContext;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QaProblem {
    #[error("unit has no metadata assigned")]
    MissingMetadata,
    #[error("unit is flagged for the digital library but metadata has no availability policy")]
    MissingAvailabilityPolicy,
    #[error("unit has no intended use")]
    MissingIntendedUse,
    #[error("metadata has no OCR hint")]
    MissingOcrHint,
    #[error("OCR was requested but the OCR hint '{hint}' is not an OCR candidate")]
    NotOcrCandidate { hint: String },
    #[error("OCR was requested but metadata has no OCR language hint")]
    MissingOcrLanguage,
    #[error("unit is flagged both for the digital library and throw away")]
    ThrowAwayInDl,
}

/// Evaluate the unit QA rules. An empty result means the unit passed.
pub fn qa_unit(ctx: &UnitContext) -> Vec<QaProblem> {
    let unit = &ctx.unit;
    let mut problems = Vec::new();

    match &ctx.metadata {
        None => problems.push(QaProblem::MissingMetadata),
        Some(md) => {
            if unit.include_in_dl
                && md.kind != MetadataKind::External
                && md.availability_policy.is_none()
            {
                problems.push(QaProblem::MissingAvailabilityPolicy);
            }
        }
    }

    if unit.intended_use_id.is_none() {
        problems.push(QaProblem::MissingIntendedUse);
    }

    if let Some(md) = &ctx.metadata {
        match &md.ocr_hint {
            None => problems.push(QaProblem::MissingOcrHint),
            Some(hint) if unit.ocr_master_files && !hint.ocr_candidate => {
                problems.push(QaProblem::NotOcrCandidate {
                    hint: hint.name.clone(),
                });
            }
            Some(_) => {}
        }
        let language = md.ocr_language_hint.as_deref().map(str::trim).unwrap_or("");
        if unit.ocr_master_files && language.is_empty() {
            problems.push(QaProblem::MissingOcrLanguage);
        }
    }

    if unit.include_in_dl && unit.throw_away {
        problems.push(QaProblem::ThrowAwayInDl);
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AvailabilityPolicy, Metadata, OcrHint};
    use crate::order::{Order, OrderStatus};
    use crate::unit::{DeliverableFormat, IntendedUse, Unit};
    use digiserv_core::{IntendedUseId, MetadataId, OrderId, UnitId};

    fn passing() -> UnitContext {
        let mut unit = Unit::approved(UnitId::new(9), OrderId::new(3));
        unit.metadata_id = Some(MetadataId::new(4));
        unit.intended_use_id = Some(IntendedUseId::new(101));
        let mut md = Metadata::new(MetadataId::new(4), "uva-lib:4", "Diary", MetadataKind::Sirsi);
        md.ocr_hint = Some(OcrHint {
            id: 1,
            name: "Modern Font".to_string(),
            ocr_candidate: true,
        });
        md.ocr_language_hint = Some("eng".to_string());
        UnitContext {
            unit,
            order: Order::new(OrderId::new(3), OrderStatus::Approved),
            metadata: Some(md),
            intended_use: Some(IntendedUse {
                id: IntendedUseId::new(101),
                description: "Research".to_string(),
                deliverable_format: DeliverableFormat::Pdf,
            }),
        }
    }

    #[test]
    fn complete_unit_passes() {
        assert!(qa_unit(&passing()).is_empty());
    }

    #[test]
    fn missing_intended_use_and_ocr_hint_with_ocr_requested_reports_both() {
        let mut ctx = passing();
        ctx.unit.intended_use_id = None;
        ctx.unit.ocr_master_files = true;
        ctx.metadata.as_mut().unwrap().ocr_hint = None;

        let problems = qa_unit(&ctx);
        assert!(problems.len() >= 2);
        assert!(problems.contains(&QaProblem::MissingIntendedUse));
        assert!(problems.contains(&QaProblem::MissingOcrHint));
    }

    #[test]
    fn missing_metadata_skips_metadata_rules() {
        let mut ctx = passing();
        ctx.metadata = None;
        ctx.unit.ocr_master_files = true;
        assert_eq!(qa_unit(&ctx), vec![QaProblem::MissingMetadata]);
    }

    #[test]
    fn dl_inclusion_needs_policy_unless_external() {
        let mut ctx = passing();
        ctx.unit.include_in_dl = true;
        assert_eq!(qa_unit(&ctx), vec![QaProblem::MissingAvailabilityPolicy]);

        ctx.metadata.as_mut().unwrap().kind = MetadataKind::External;
        assert!(qa_unit(&ctx).is_empty());

        ctx.metadata.as_mut().unwrap().kind = MetadataKind::Xml;
        ctx.metadata.as_mut().unwrap().availability_policy = Some(AvailabilityPolicy::Public);
        assert!(qa_unit(&ctx).is_empty());
    }

    #[test]
    fn ocr_request_needs_candidate_hint_and_language() {
        let mut ctx = passing();
        ctx.unit.ocr_master_files = true;
        let md = ctx.metadata.as_mut().unwrap();
        md.ocr_hint.as_mut().unwrap().ocr_candidate = false;
        md.ocr_language_hint = None;

        let problems = qa_unit(&ctx);
        assert_eq!(problems.len(), 2);
        assert!(matches!(problems[0], QaProblem::NotOcrCandidate { .. }));
        assert_eq!(problems[1], QaProblem::MissingOcrLanguage);
    }

    #[test]
    fn throw_away_cannot_go_to_the_digital_library() {
        let mut ctx = passing();
        ctx.unit.include_in_dl = true;
        ctx.unit.throw_away = true;
        ctx.metadata.as_mut().unwrap().availability_policy = Some(AvailabilityPolicy::UvaOnly);
        assert_eq!(qa_unit(&ctx), vec![QaProblem::ThrowAwayInDl]);
    }
}
