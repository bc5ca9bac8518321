// Point mapping - canonical point keys to device-reported point names
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Value, json};

use crate::domain::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointMapping {
    points: BTreeMap<String, String>,
}

/// Several canonical keys pointing at the same device point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousAlias {
    pub device_point: String,
    pub keys: Vec<String>,
}

impl PointMapping {
    pub fn load(entries: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyMapping);
        }

        let mut points = BTreeMap::new();
        for (key, value) in entries {
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return Err(ConfigError::Invalid {
                    key: "device_mapping",
                    reason: format!("empty entry `{}` = `{}`", key, value),
                });
            }
            points.insert(key.to_string(), value.to_string());
        }

        Ok(Self { points })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.points.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.points.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.points.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Device point names claimed by more than one canonical key.
    pub fn ambiguous_aliases(&self) -> Vec<AmbiguousAlias> {
        let mut by_value: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (key, value) in &self.points {
            by_value.entry(value).or_default().insert(key);
        }

        by_value
            .into_iter()
            .filter(|(_, keys)| keys.len() > 1)
            .map(|(value, keys)| AmbiguousAlias {
                device_point: value.to_string(),
                keys: keys.into_iter().map(str::to_string).collect(),
            })
            .collect()
    }
}

/// Numeric state codes and their labels for one canonical point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLabels {
    pub point: String,
    pub labels: BTreeMap<String, String>,
}

impl StateLabels {
    /// Grafana value-mapping list for `fieldConfig.defaults.mappings`.
    pub fn to_value_mappings(&self) -> Value {
        let options: serde_json::Map<String, Value> = self
            .labels
            .iter()
            .enumerate()
            .map(|(index, (code, label))| (code.clone(), json!({ "text": label, "index": index })))
            .collect();

        json!([{ "type": "value", "options": options }])
    }
}
