use tokio::time::timeout;

use digiserv_jobs::JobTracker;
use digiserv_units::UnitContext;

use super::FinalizeUnit;
use crate::collaborators::{OcrOutcome, OcrRequest};

impl FinalizeUnit {
    /// Request OCR and wait for its callback. Every failure here is recoverable.
    pub(super) async fn ocr(&self, tracker: &JobTracker, ctx: &UnitContext) {
        let Some(metadata) = ctx.metadata.as_ref() else {
            tracker.error("OCR requested but the unit has no metadata").await;
            return;
        };
        let Some(language) = metadata.ocr_language_hint.clone() else {
            tracker.error("OCR requested but no OCR language is set").await;
            return;
        };

        let waits = &self.collaborators().ocr_waits;
        let receiver = waits.register(self.job_id);
        let request = OcrRequest {
            pid: metadata.pid.clone(),
            language,
            unit_id: self.unit_id,
            callback_url: format!(
                "{}/callbacks/ocr/{}",
                self.settings().service_url.trim_end_matches('/'),
                self.job_id
            ),
        };
        if let Err(e) = self.collaborators().ocr.request_ocr(&request).await {
            waits.cancel(self.job_id);
            tracker.error(format!("OCR request failed: {e}")).await;
            return;
        }
        tracker
            .info(format!("OCR requested for {}; waiting for results", request.pid))
            .await;

        let limit = self.settings().ocr_timeout;
        match timeout(limit, receiver).await {
            Ok(Ok(OcrOutcome::Success)) => tracker.info("OCR complete; continuing").await,
            // The callback handler already logged the failure on this job.
            Ok(Ok(OcrOutcome::Failure(_))) => tracker.info("Continuing without OCR").await,
            Ok(Err(_)) => tracker.error("OCR wait ended without a result").await,
            Err(_) => {
                waits.cancel(self.job_id);
                tracker
                    .error(format!("OCR did not finish within {} seconds", limit.as_secs()))
                    .await;
            }
        }
    }
}
