// Seam for the dashboard server receiving generated documents
use async_trait::async_trait;

use crate::domain::report::UploadResult;
use crate::domain::template::ImportEnvelope;

#[async_trait]
pub trait DashboardUploader: Send + Sync {
    /// Upload one envelope. Transport failures come back as an unsuccessful result.
    async fn upload(&self, envelope: &ImportEnvelope<'_>) -> UploadResult;
}
