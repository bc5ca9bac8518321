use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::device::DeviceId;
use crate::domain::error::ConfigError;
use crate::domain::mapping::{PointMapping, StateLabels};

const ENV_PREFIX: &str = "DASHGEN";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub dashboard: DashboardSettings,
    #[serde(default)]
    pub device_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub grafana: Option<GrafanaSettings>,
    #[serde(default)]
    pub occupancy: OccupancySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardSettings {
    #[serde(default)]
    pub campus: String,
    #[serde(default)]
    pub building: String,
    #[serde(default = "default_output_dir", alias = "output-dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_template_dir", alias = "template-dir")]
    pub template_dir: PathBuf,
    #[serde(default, deserialize_with = "list_or_csv")]
    pub devices: Vec<String>,
    #[serde(default)]
    pub device_variable: Option<String>,
    #[serde(default = "default_discovery_point")]
    pub discovery_point: String,
    #[serde(default)]
    pub folder_id: i64,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GrafanaSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub verify_ssl: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub datasource_uid: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OccupancySettings {
    #[serde(default = "default_occupancy_point")]
    pub point: String,
    #[serde(default)]
    pub states: BTreeMap<String, String>,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            campus: String::new(),
            building: String::new(),
            output_dir: default_output_dir(),
            timezone: default_timezone(),
            template_dir: default_template_dir(),
            devices: Vec::new(),
            device_variable: None,
            discovery_point: default_discovery_point(),
            folder_id: 0,
            overwrite: false,
        }
    }
}

impl Default for OccupancySettings {
    fn default() -> Self {
        Self {
            point: default_occupancy_point(),
            states: BTreeMap::new(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_discovery_point() -> String {
    "ZoneTemperature".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_occupancy_point() -> String {
    "occupancy".to_string()
}

/// INI files cannot hold arrays, so a comma separated string is accepted too.
fn list_or_csv<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    let items = match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(items) => items,
        ListOrCsv::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Load configuration from `path` (extension optional) plus `DASHGEN__*` overrides.
pub fn load_app_config(path: &str) -> Result<AppConfig, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.dashboard.campus.trim().is_empty() {
            return Err(ConfigError::Missing("dashboard.campus"));
        }
        if self.dashboard.building.trim().is_empty() {
            return Err(ConfigError::Missing("dashboard.building"));
        }
        if self.device_mapping.is_empty() {
            return Err(ConfigError::EmptyMapping);
        }
        if let Some(grafana) = &self.grafana {
            if !grafana.url.starts_with("http://") && !grafana.url.starts_with("https://") {
                return Err(ConfigError::Invalid {
                    key: "grafana.url",
                    reason: format!("`{}` is not an http(s) URL", grafana.url),
                });
            }
        }
        for device in &self.dashboard.devices {
            if DeviceId::new(device.as_str()).is_none() {
                return Err(ConfigError::Invalid {
                    key: "dashboard.devices",
                    reason: format!("`{}` is not a device id", device),
                });
            }
        }
        Ok(())
    }

    pub fn point_mapping(&self) -> Result<PointMapping, ConfigError> {
        PointMapping::load(&self.device_mapping)
    }

    pub fn static_devices(&self) -> Vec<DeviceId> {
        self.dashboard
            .devices
            .iter()
            .filter_map(|d| DeviceId::new(d.as_str()))
            .collect()
    }

    pub fn state_labels(&self) -> Option<StateLabels> {
        if self.occupancy.states.is_empty() {
            return None;
        }
        Some(StateLabels {
            point: self.occupancy.point.clone(),
            labels: self.occupancy.states.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(contents: &str, extension: &str) -> Result<AppConfig, ConfigError> {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        load_app_config(file.path().to_str().unwrap())
    }

    #[test]
    fn test_load_toml() {
        let config = load(
            r#"
[dashboard]
campus = "PNNL"
building = "ROB"
devices = ["rtu01", "rtu02"]
device_variable = "RTU_ROB"

[device_mapping]
zone_temperature = "ZoneTemperature"
occupancy = "OccupancyMode"

[grafana]
url = "https://grafana.example.org"
username = "admin"
password = "secret"

[occupancy.states]
"0" = "Unoccupied"
"1" = "Occupied"
"#,
            ".toml",
        )
        .unwrap();

        assert_eq!(config.dashboard.campus, "PNNL");
        assert_eq!(config.dashboard.output_dir, PathBuf::from("output"));
        assert_eq!(config.dashboard.timezone, "America/Los_Angeles");
        assert_eq!(config.static_devices().len(), 2);
        assert_eq!(config.point_mapping().unwrap().get("occupancy"), Some("OccupancyMode"));

        let grafana = config.grafana.as_ref().unwrap();
        assert!(!grafana.verify_ssl);
        assert_eq!(grafana.timeout_secs, 30);

        let labels = config.state_labels().unwrap();
        assert_eq!(labels.point, "occupancy");
        assert_eq!(labels.labels.get("1").map(String::as_str), Some("Occupied"));
    }

    #[test]
    fn test_load_ini() {
        let config = load(
            "[dashboard]\ncampus = PNNL\nbuilding = ROB\ndevices = rtu01, rtu03\n\n[device_mapping]\nzone_temperature = ZoneTemperature\n",
            ".ini",
        )
        .unwrap();

        assert_eq!(config.dashboard.building, "ROB");
        assert_eq!(config.dashboard.devices, vec!["rtu01", "rtu03"]);
        assert!(config.grafana.is_none());
        assert!(config.state_labels().is_none());
    }

    #[test]
    fn test_missing_campus() {
        let result = load(
            "[dashboard]\nbuilding = \"ROB\"\n[device_mapping]\na = \"A\"\n",
            ".toml",
        );
        assert!(matches!(result, Err(ConfigError::Missing("dashboard.campus"))));
    }

    #[test]
    fn test_missing_mapping() {
        let result = load("[dashboard]\ncampus = \"PNNL\"\nbuilding = \"ROB\"\n", ".toml");
        assert!(matches!(result, Err(ConfigError::EmptyMapping)));
    }
}
