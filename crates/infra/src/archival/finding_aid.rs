use std::sync::Arc;

use async_trait::async_trait;

use digiserv_jobs::{JobTracker, JobWork};

use crate::collaborators::{CollaboratorError, FindingAidService, NewDigitalObject};

pub(super) struct PublishToFindingAid {
    pub(super) service: Arc<dyn FindingAidService>,
    pub(super) archival_object_uri: String,
    pub(super) pid: String,
    pub(super) title: String,
    pub(super) manifest_url: String,
}

#[async_trait]
impl JobWork for PublishToFindingAid {
    type Error = CollaboratorError;

    async fn run(&mut self, tracker: &JobTracker) -> Result<(), CollaboratorError> {
        let archival_object = self
            .service
            .lookup_archival_object(&self.archival_object_uri)
            .await?;
        tracker
            .info(format!("Found archival object '{}'", archival_object.title))
            .await;

        let digital_object = match self
            .service
            .find_digital_object(&archival_object.repository, &self.pid)
            .await?
        {
            Some(uri) => {
                tracker.info(format!("Reusing digital object {uri}")).await;
                uri
            }
            None => {
                let uri = self
                    .service
                    .create_digital_object(&NewDigitalObject {
                        repository: archival_object.repository.clone(),
                        identifier: self.pid.clone(),
                        title: self.title.clone(),
                        file_uri: self.manifest_url.clone(),
                    })
                    .await?;
                tracker.info(format!("Created digital object {uri}")).await;
                uri
            }
        };

        self.service
            .link_digital_object(&archival_object.uri, &digital_object)
            .await?;
        tracker
            .info(format!("Linked {digital_object} to {}", archival_object.uri))
            .await;
        Ok(())
    }
}
