// Device identifiers discovered from telemetry topics
use std::fmt;

use serde::Serialize;

/// One RTU, the third segment of a `campus/building/device/metric` topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Extract the device segment of a topic scoped to `campus/building`.
    pub fn from_topic(topic: &str, campus: &str, building: &str) -> Option<Self> {
        let mut parts = topic.split('/');
        if parts.next()? != campus || parts.next()? != building {
            return None;
        }
        Self::new(parts.next()?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
