// Seam for the time-series store holding telemetry topics
use async_trait::async_trait;

use crate::domain::error::DatasourceError;

#[async_trait]
pub trait TopicSource: Send + Sync {
    /// Topic names (`campus/building/device/metric`) stored under a campus and building
    async fn topic_names(&self, campus: &str, building: &str) -> Result<Vec<String>, DatasourceError>;
}
