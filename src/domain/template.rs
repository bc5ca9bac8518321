// Dashboard templates and the documents instantiated from them
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::dashboard::DashboardModel;
use crate::domain::device::DeviceId;
use crate::domain::error::TemplateError;
use crate::domain::placeholder;

/// Grafana limits dashboard uids to 40 characters.
const MAX_UID_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateKind {
    RtuOverview,
    SiteOverview,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 2] = [TemplateKind::RtuOverview, TemplateKind::SiteOverview];

    /// Suffix used in titles and file names.
    pub fn label(self) -> &'static str {
        match self {
            TemplateKind::RtuOverview => "RTU_Overview",
            TemplateKind::SiteOverview => "Site_Overview",
        }
    }

    /// Name the template loader looks up.
    pub fn template_name(self) -> &'static str {
        match self {
            TemplateKind::RtuOverview => "rtu_overview",
            TemplateKind::SiteOverview => "site_overview",
        }
    }

    pub fn per_device(self) -> bool {
        matches!(self, TemplateKind::RtuOverview)
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_name())
    }
}

/// A parsed template. Read-only; instantiation works on a deep copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    kind: TemplateKind,
    model: DashboardModel,
}

impl Template {
    pub fn new(kind: TemplateKind, model: DashboardModel) -> Result<Self, TemplateError> {
        let template = Self { kind, model };
        template.referenced_keys()?;
        Ok(template)
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn model(&self) -> &DashboardModel {
        &self.model
    }

    /// Canonical keys referenced through `{point:<key>}` anywhere in the template.
    pub fn referenced_keys(&self) -> Result<BTreeSet<String>, TemplateError> {
        let mut keys = BTreeSet::new();
        for s in self.model.strings() {
            for key in placeholder::point_keys(&s)? {
                keys.insert(key.to_string());
            }
        }
        Ok(keys)
    }
}

/// A fully substituted dashboard ready for the writer and uploader.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardDocument {
    pub kind: TemplateKind,
    pub campus: String,
    pub building: String,
    pub device: Option<DeviceId>,
    pub title: String,
    pub uid: String,
    pub model: DashboardModel,
}

/// Upload envelope accepted by `POST /api/dashboards/db`.
#[derive(Debug, Clone, Serialize)]
pub struct ImportEnvelope<'a> {
    pub dashboard: &'a DashboardModel,
    #[serde(rename = "folderId")]
    pub folder_id: i64,
    pub overwrite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DashboardDocument {
    pub fn title_for(
        kind: TemplateKind,
        campus: &str,
        building: &str,
        device: Option<&DeviceId>,
    ) -> String {
        match device {
            Some(device) => format!("{}_{}_{}_{}", campus, building, device, kind.label()),
            None => format!("{}_{}_{}", campus, building, kind.label()),
        }
    }

    /// Human-readable slug plus generation time, kept within Grafana's uid limit.
    /// A slug too long to fit is cut short and tagged with a checksum of the
    /// full title, so titles sharing a long prefix still get distinct uids.
    pub fn uid_for(title: &str, generated_at: DateTime<Utc>) -> String {
        let stamp = generated_at.format("%y%m%d%H%M%S").to_string();
        let mut slug = String::with_capacity(title.len());
        for c in title.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }

        let slug = slug.trim_matches('-');
        let budget = MAX_UID_LEN - stamp.len() - 1;
        if slug.len() <= budget {
            return format!("{}-{}", slug, stamp);
        }

        let checksum = format!("{:08x}", crc32fast::hash(title.as_bytes()));
        let head: String = slug.chars().take(budget - checksum.len() - 1).collect();
        format!("{}-{}-{}", head.trim_end_matches('-'), checksum, stamp)
    }

    pub fn filename(&self) -> String {
        format!("{}.json", self.title)
    }

    pub fn import_filename(&self) -> String {
        format!("{}_import.json", self.title)
    }

    pub fn envelope(&self, folder_id: i64, overwrite: bool) -> ImportEnvelope<'_> {
        ImportEnvelope {
            dashboard: &self.model,
            folder_id,
            overwrite,
            message: None,
        }
    }

    /// Name used in logs and the upload response log.
    pub fn display_name(&self) -> String {
        match &self.device {
            Some(device) => format!("RTU Overview - {}", device),
            None => match self.kind {
                TemplateKind::RtuOverview => "RTU Overview".to_string(),
                TemplateKind::SiteOverview => "Site Overview".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_titles() {
        let device = DeviceId::new("rtu01").unwrap();
        assert_eq!(
            DashboardDocument::title_for(TemplateKind::RtuOverview, "PNNL", "ROB", Some(&device)),
            "PNNL_ROB_rtu01_RTU_Overview"
        );
        assert_eq!(
            DashboardDocument::title_for(TemplateKind::SiteOverview, "PNNL", "ROB", None),
            "PNNL_ROB_Site_Overview"
        );
    }

    #[test]
    fn test_uid_is_slug_with_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 5).unwrap();
        assert_eq!(
            DashboardDocument::uid_for("PNNL_ROB_rtu01_RTU_Overview", at),
            "pnnl-rob-rtu01-rtu-overview-261016093005"
        );
    }

    #[test]
    fn test_uid_fits_grafana_limit() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 5).unwrap();
        let uid = DashboardDocument::uid_for(
            "Pacific_Northwest_Campus_Research_Operations_Building_rtu_0001_RTU_Overview",
            at,
        );
        assert!(uid.len() <= MAX_UID_LEN);
        assert!(uid.ends_with("-261016093005"));
        assert!(uid.starts_with("pacific-northwest"));
    }

    #[test]
    fn test_long_titles_keep_distinct_uids() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 5).unwrap();
        let uid = |name: &str| {
            let device = DeviceId::new(name).unwrap();
            let title = DashboardDocument::title_for(
                TemplateKind::RtuOverview,
                "Richland",
                "Research_Operations",
                Some(&device),
            );
            DashboardDocument::uid_for(&title, at)
        };

        let first = uid("rtu01");
        let second = uid("rtu02");
        assert_ne!(first, second);
        for uid in [&first, &second] {
            assert!(uid.len() <= MAX_UID_LEN);
            assert!(uid.starts_with("richland-research"));
            assert!(uid.ends_with("-261016093005"));
        }
        // stable across runs for the same title
        assert_eq!(first, uid("rtu01"));
    }
}
