// Operator summary printed at the end of a run
use std::fmt::Write;

use crate::application::generation_service::GeneratedDashboard;
use crate::domain::report::UploadLogEntry;

pub struct RunSummary<'a> {
    pub campus: &'a str,
    pub building: &'a str,
    pub datasource_uid: Option<&'a str>,
    pub grafana_url: Option<&'a str>,
    pub folder_id: i64,
    pub dashboards: &'a [GeneratedDashboard],
    pub uploads: &'a [UploadLogEntry],
}

impl RunSummary<'_> {
    pub fn render(&self) -> String {
        let rule = "=".repeat(56);
        let mut out = String::new();

        let _ = writeln!(out, "Summary");
        let _ = writeln!(out, "  {}", rule);
        let _ = writeln!(out, "  Campus/Building: {}/{}", self.campus, self.building);
        let _ = writeln!(out, "  Datasource UID: {}", self.datasource_uid.unwrap_or("-"));
        let rtu_count = self
            .dashboards
            .iter()
            .filter(|d| d.document.device.is_some())
            .count();
        let _ = writeln!(out, "  RTU Dashboards: {}", rtu_count);
        if let Some(url) = self.grafana_url {
            let _ = writeln!(out, "  Grafana URL: {}", url);
            let _ = writeln!(out, "  Target Folder ID: {}", self.folder_id);
        }
        let _ = writeln!(out, "  {}", rule);
        let _ = writeln!(out, "  Generated Files:");
        for dashboard in self.dashboards {
            let status = if dashboard.report.has_errors {
                format!("missing: {}", join(&dashboard.report.missing_in_mapping))
            } else {
                "ok".to_string()
            };
            let _ = writeln!(out, "    - {} ({})", dashboard.filename(), status);
        }
        if !self.uploads.is_empty() {
            let _ = writeln!(out, "  Uploads:");
            for upload in self.uploads {
                let mark = if upload.result.success { "ok" } else { "FAILED" };
                let _ = writeln!(out, "    - {} [{}] {}", upload.dashboard, mark, upload.result.message);
            }
        }
        let _ = writeln!(out, "  {}", rule);
        out
    }
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
