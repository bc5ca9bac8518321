// Generation service - Discovery, instantiation and validation for one site
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::discovery::discover_devices;
use crate::application::instantiator::{Instantiator, Scope};
use crate::application::topic_source::TopicSource;
use crate::application::validator::validate;
use crate::domain::device::DeviceId;
use crate::domain::error::DatasourceError;
use crate::domain::mapping::PointMapping;
use crate::domain::report::ValidationReport;
use crate::domain::template::{DashboardDocument, Template};

/// One document handed to the writer and uploader.
#[derive(Debug, Clone)]
pub struct GeneratedDashboard {
    pub document: DashboardDocument,
    pub report: ValidationReport,
}

impl GeneratedDashboard {
    pub fn filename(&self) -> String {
        self.document.filename()
    }
}

/// What a single instantiation is for.
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Device(&'a DeviceId),
    /// Per-device template left on Grafana's device selector.
    Selector,
    Site,
}

impl Target<'_> {
    fn label(&self) -> &str {
        match self {
            Target::Device(device) => device.as_str(),
            Target::Selector => "*",
            Target::Site => "-",
        }
    }
}

#[derive(Clone)]
pub struct GenerationService {
    source: Option<Arc<dyn TopicSource>>,
    instantiator: Instantiator,
    mapping: Arc<PointMapping>,
    campus: String,
    building: String,
    static_devices: Vec<DeviceId>,
}

impl GenerationService {
    pub fn new(
        source: Option<Arc<dyn TopicSource>>,
        instantiator: Instantiator,
        mapping: Arc<PointMapping>,
        campus: String,
        building: String,
        static_devices: Vec<DeviceId>,
    ) -> Self {
        Self {
            source,
            instantiator,
            mapping,
            campus,
            building,
            static_devices,
        }
    }

    /// Devices to generate for, sorted. Falls back to the configured list when
    /// discovery fails or finds nothing.
    pub async fn resolve_devices(&self) -> Result<Vec<DeviceId>, DatasourceError> {
        let Some(source) = &self.source else {
            tracing::info!(
                count = self.static_devices.len(),
                "No datasource available, using configured devices"
            );
            return Ok(sorted(self.static_devices.iter().cloned()));
        };

        tracing::info!(campus = %self.campus, building = %self.building, "Querying devices");
        match discover_devices(source.as_ref(), &self.campus, &self.building).await {
            Ok(found) if !found.is_empty() => {
                let devices = sorted(found);
                tracing::info!(
                    count = devices.len(),
                    devices = %join(&devices),
                    "Discovered devices"
                );
                Ok(devices)
            }
            Ok(_) => {
                tracing::warn!(
                    campus = %self.campus,
                    building = %self.building,
                    fallback = self.static_devices.len(),
                    "No devices discovered, using configured devices"
                );
                Ok(sorted(self.static_devices.iter().cloned()))
            }
            Err(e) if !self.static_devices.is_empty() => {
                tracing::warn!(
                    campus = %self.campus,
                    building = %self.building,
                    error = %e,
                    "Device discovery failed, using configured devices"
                );
                Ok(sorted(self.static_devices.iter().cloned()))
            }
            Err(e) => Err(e),
        }
    }

    /// Instantiate every template: per-device templates once per device in
    /// sorted order, site templates once. With no devices, a per-device
    /// template is instantiated once against the device selector variable
    /// when one is configured. A failing instantiation is logged and skipped.
    pub fn generate(
        &self,
        templates: &[Template],
        devices: &[DeviceId],
        generated_at: DateTime<Utc>,
    ) -> Vec<GeneratedDashboard> {
        let devices = sorted(devices.iter().cloned());
        let mut generated = Vec::new();

        for template in templates {
            let declared = match template.referenced_keys() {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::error!(kind = %template.kind(), error = %e, "Skipping template");
                    continue;
                }
            };

            if template.kind().per_device() {
                if devices.is_empty() {
                    match self.instantiator.device_variable() {
                        Some(variable) => {
                            tracing::warn!(
                                kind = %template.kind(),
                                campus = %self.campus,
                                building = %self.building,
                                variable,
                                "No devices, generating one dashboard on the device selector"
                            );
                            if let Some(dashboard) =
                                self.generate_one(template, Target::Selector, &declared, generated_at)
                            {
                                generated.push(dashboard);
                            }
                        }
                        None => tracing::warn!(
                            kind = %template.kind(),
                            campus = %self.campus,
                            building = %self.building,
                            "No devices to generate for"
                        ),
                    }
                }
                for device in &devices {
                    if let Some(dashboard) =
                        self.generate_one(template, Target::Device(device), &declared, generated_at)
                    {
                        generated.push(dashboard);
                    }
                }
            } else if let Some(dashboard) =
                self.generate_one(template, Target::Site, &declared, generated_at)
            {
                generated.push(dashboard);
            }
        }

        generated
    }

    fn generate_one(
        &self,
        template: &Template,
        target: Target<'_>,
        declared: &BTreeSet<String>,
        generated_at: DateTime<Utc>,
    ) -> Option<GeneratedDashboard> {
        let device = match target {
            Target::Device(device) => Some(device),
            Target::Selector | Target::Site => None,
        };
        let scope = Scope {
            campus: &self.campus,
            building: &self.building,
            device,
            mapping: &self.mapping,
            generated_at,
        };
        let device_label = target.label();

        let instantiated = match target {
            Target::Selector => self.instantiator.instantiate_selectable(template, &scope),
            Target::Device(_) | Target::Site => self.instantiator.instantiate(template, &scope),
        };
        let instantiation = match instantiated {
            Ok(instantiation) => instantiation,
            Err(e) => {
                tracing::error!(
                    kind = %template.kind(),
                    campus = %self.campus,
                    building = %self.building,
                    device = device_label,
                    error = %e,
                    "Failed to instantiate dashboard"
                );
                return None;
            }
        };

        let report = validate(&instantiation.document, &self.mapping, declared);
        for key in &report.missing_in_mapping {
            tracing::warn!(
                kind = %template.kind(),
                campus = %self.campus,
                building = %self.building,
                device = device_label,
                key = %key,
                "Point not in device_mapping, using canonical key"
            );
        }
        if !report.unused_in_template.is_empty() {
            tracing::info!(
                kind = %template.kind(),
                device = device_label,
                keys = ?report.unused_in_template,
                "Mapped points not used in this dashboard"
            );
        }
        for text in &report.unresolved {
            tracing::error!(device = device_label, text = %text, "Unresolved placeholder");
        }
        tracing::debug!(title = %instantiation.document.title, "Generated dashboard");

        Some(GeneratedDashboard {
            document: instantiation.document,
            report,
        })
    }
}

fn sorted(devices: impl IntoIterator<Item = DeviceId>) -> Vec<DeviceId> {
    let mut devices: Vec<DeviceId> = devices.into_iter().collect();
    devices.sort();
    devices.dedup();
    devices
}

fn join(devices: &[DeviceId]) -> String {
    devices
        .iter()
        .map(DeviceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
