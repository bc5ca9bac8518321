// Device discovery - distinct device segments under campus/building
use std::collections::HashSet;

use crate::application::topic_source::TopicSource;
use crate::domain::device::DeviceId;
use crate::domain::error::DatasourceError;

/// Distinct devices seen under `campus/building/*`. Unordered; empty is not an error.
pub async fn discover_devices(
    source: &dyn TopicSource,
    campus: &str,
    building: &str,
) -> Result<HashSet<DeviceId>, DatasourceError> {
    let topics = source.topic_names(campus, building).await?;
    tracing::debug!(campus, building, topics = topics.len(), "Fetched topic names");

    let mut devices = HashSet::new();
    for topic in &topics {
        match DeviceId::from_topic(topic, campus, building) {
            Some(device) => {
                devices.insert(device);
            }
            None => tracing::debug!(campus, building, topic = %topic, "Ignoring topic outside scope"),
        }
    }

    Ok(devices)
}
