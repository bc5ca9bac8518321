// Publish service - Upload generated dashboards and collect the responses
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::dashboard_uploader::DashboardUploader;
use crate::application::generation_service::GeneratedDashboard;
use crate::domain::report::UploadLogEntry;

#[derive(Clone)]
pub struct PublishService {
    uploader: Arc<dyn DashboardUploader>,
    folder_id: i64,
    overwrite: bool,
}

impl PublishService {
    pub fn new(uploader: Arc<dyn DashboardUploader>, folder_id: i64, overwrite: bool) -> Self {
        Self {
            uploader,
            folder_id,
            overwrite,
        }
    }

    pub fn folder_id(&self) -> i64 {
        self.folder_id
    }

    /// Upload each dashboard in order. One failure does not stop the rest.
    pub async fn publish(
        &self,
        dashboards: &[GeneratedDashboard],
        generated_at: DateTime<Utc>,
    ) -> Vec<UploadLogEntry> {
        let mut entries = Vec::with_capacity(dashboards.len());

        for dashboard in dashboards {
            let document = &dashboard.document;
            let mut envelope = document.envelope(self.folder_id, self.overwrite);
            envelope.message = Some(format!("Created via API at {}", generated_at.to_rfc3339()));

            let result = self.uploader.upload(&envelope).await;
            let name = document.display_name();
            if result.success {
                tracing::info!(dashboard = %name, title = %document.title, "Uploaded dashboard");
            } else {
                tracing::error!(dashboard = %name, message = %result.message, "Upload failed");
            }

            entries.push(UploadLogEntry {
                dashboard: name,
                device: document.device.clone(),
                result,
            });
        }

        entries
    }
}
