// Coverage reports and upload records
use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::domain::device::DeviceId;

/// Mapping coverage for one generated document. Never fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub missing_in_mapping: BTreeSet<String>,
    pub unused_in_template: BTreeSet<String>,
    /// Recognized placeholders still present after instantiation.
    pub unresolved: BTreeSet<String>,
    pub has_errors: bool,
}

/// Per-document result returned by the uploader, relayed as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadLogEntry {
    pub dashboard: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,
    #[serde(flatten)]
    pub result: UploadResult,
}

/// Contents of the `*_upload_response_*.json` file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadLog {
    pub upload_time: String,
    pub grafana_url: String,
    pub folder_id: i64,
    pub devices_count: usize,
    pub responses: Vec<UploadLogEntry>,
}

impl UploadLogEntry {
    /// Grafana-relative URL of the uploaded dashboard, when the server returned one.
    pub fn url(&self) -> Option<&str> {
        self.result.data.as_ref()?.get("url")?.as_str()
    }
}
