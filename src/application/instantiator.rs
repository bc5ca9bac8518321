//! Template instantiation.
//!
//! Turns a read-only [`Template`] into a [`DashboardDocument`] for one scope
//! (a device, or the whole site). A `{point:<key>}` with no mapping entry is
//! not an error: the canonical key itself is substituted and recorded as a
//! miss, so generation always yields a usable dashboard.
//!
//! A per-device template can also be instantiated once for the building with
//! the device left to Grafana's selector variable; see
//! [`Instantiator::instantiate_selectable`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::dashboard::{DashboardModel, PanelNode};
use crate::domain::device::DeviceId;
use crate::domain::error::TemplateError;
use crate::domain::mapping::{PointMapping, StateLabels};
use crate::domain::placeholder::{self, Token};
use crate::domain::template::{DashboardDocument, Template};

const POSTGRES: &str = "postgres";

#[derive(Debug, Clone, Default)]
pub struct InstantiationOptions {
    pub timezone: Option<String>,
    pub datasource_uid: Option<String>,
    /// Grafana variable the template used to select a device, e.g. `RTU_ROB`.
    pub device_variable: Option<String>,
    pub state_labels: Option<StateLabels>,
}

#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub campus: &'a str,
    pub building: &'a str,
    pub device: Option<&'a DeviceId>,
    pub mapping: &'a PointMapping,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Instantiation {
    pub document: DashboardDocument,
    /// Canonical keys substituted by their own name for lack of a mapping.
    pub misses: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Instantiator {
    options: InstantiationOptions,
}

impl Instantiator {
    pub fn new(options: InstantiationOptions) -> Self {
        Self { options }
    }

    pub fn device_variable(&self) -> Option<&str> {
        self.options.device_variable.as_deref()
    }

    pub fn instantiate(
        &self,
        template: &Template,
        scope: &Scope<'_>,
    ) -> Result<Instantiation, TemplateError> {
        let device = scope.device.map(|d| d.as_str().to_string());
        self.build(template, scope, device.as_deref())
    }

    /// Instantiate for the building as a whole, rendering `{device}` as a
    /// reference to the configured selector variable (`${RTU_ROB}`) and
    /// keeping that variable in the templating list.
    ///
    /// Without a configured variable this behaves like a site-scope
    /// [`instantiate`](Self::instantiate), so a `{device}` is an error.
    pub fn instantiate_selectable(
        &self,
        template: &Template,
        scope: &Scope<'_>,
    ) -> Result<Instantiation, TemplateError> {
        let site = Scope { device: None, ..*scope };
        let selector = self.device_variable().map(|v| format!("${{{}}}", v));
        self.build(template, &site, selector.as_deref())
    }

    fn build(
        &self,
        template: &Template,
        scope: &Scope<'_>,
        device: Option<&str>,
    ) -> Result<Instantiation, TemplateError> {
        let mut model = template.model().clone();

        if let Some(labels) = &self.options.state_labels {
            apply_state_labels(&mut model, labels)?;
        }

        let mut misses = BTreeSet::new();
        model.visit_strings(&mut |s: &mut String| {
            *s = render(s, scope, device, &mut misses)?;
            Ok::<(), TemplateError>(())
        })?;

        if let (Some(variable), Some(device)) = (&self.options.device_variable, scope.device) {
            pin_device_variable(&mut model, variable, device);
        }

        let title = DashboardDocument::title_for(
            template.kind(),
            scope.campus,
            scope.building,
            scope.device,
        );
        let uid = DashboardDocument::uid_for(&title, scope.generated_at);

        model.id = None;
        model.uid = Some(uid.clone());
        model.title = title.clone();
        model.version = 0;
        if let Some(timezone) = &self.options.timezone {
            model.timezone = Some(timezone.clone());
        }
        if let Some(datasource_uid) = &self.options.datasource_uid {
            model.retarget_datasource(POSTGRES, datasource_uid);
        }

        Ok(Instantiation {
            document: DashboardDocument {
                kind: template.kind(),
                campus: scope.campus.to_string(),
                building: scope.building.to_string(),
                device: scope.device.cloned(),
                title,
                uid,
                model,
            },
            misses,
        })
    }
}

/// Resolve every placeholder in one string.
fn render(
    input: &str,
    scope: &Scope<'_>,
    device: Option<&str>,
    misses: &mut BTreeSet<String>,
) -> Result<String, TemplateError> {
    let tokens = placeholder::tokenize(input)?;
    let mut out = String::with_capacity(input.len());

    for token in tokens {
        match token {
            Token::Literal(text) => out.push_str(text),
            Token::Campus => out.push_str(scope.campus),
            Token::Building => out.push_str(scope.building),
            Token::Device => match device {
                Some(device) => out.push_str(device),
                None => {
                    return Err(TemplateError::DeviceInSiteScope {
                        context: input.to_string(),
                    });
                }
            },
            Token::Point(key) => match scope.mapping.get(key) {
                Some(point) => out.push_str(point),
                None => {
                    misses.insert(key.to_string());
                    out.push_str(key);
                }
            },
        }
    }

    Ok(out)
}

/// Replace a Grafana device-selector variable with a fixed device.
fn pin_device_variable(model: &mut DashboardModel, variable: &str, device: &DeviceId) {
    let _ = model.visit_strings(&mut |s: &mut String| {
        if s.contains('$') {
            *s = replace_variable(s, variable, device.as_str());
        }
        Ok::<(), std::convert::Infallible>(())
    });
    model.templating.list.retain(|v| v.name != variable);
}

/// Substitute `${name}` and `$name`. The bare form only matches a whole
/// variable name, so `$name_2` is left alone.
fn replace_variable(input: &str, name: &str, value: &str) -> String {
    let braced = format!("${{{}}}", name);
    let bare = format!("${}", name);
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with(&braced) {
            out.push_str(value);
            rest = &tail[braced.len()..];
        } else if tail.starts_with(&bare)
            && !tail[bare.len()..].starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
        {
            out.push_str(value);
            rest = &tail[bare.len()..];
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// Install value mappings on panels querying the labelled point.
fn apply_state_labels(model: &mut DashboardModel, labels: &StateLabels) -> Result<(), TemplateError> {
    if labels.labels.is_empty() {
        return Ok(());
    }

    for panel in &mut model.panels {
        let PanelNode::Typed(panel) = panel else {
            continue;
        };
        let body = panel.body_mut();

        let mut queries_point = false;
        for sql in body.targets.iter().filter_map(|t| t.raw_sql.as_deref()) {
            if placeholder::point_keys(sql)?.contains(&labels.point.as_str()) {
                queries_point = true;
            }
        }
        if !queries_point {
            continue;
        }

        let field_config = body
            .extra
            .entry("fieldConfig".to_string())
            .or_insert_with(|| json!({}));
        if !field_config.is_object() {
            *field_config = json!({});
        }
        if !field_config["defaults"].is_object() {
            field_config["defaults"] = json!({});
        }
        field_config["defaults"]["mappings"] = labels.to_value_mappings();
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::template::TemplateKind;
    use chrono::TimeZone;
    use serde_json::Value;
    use std::collections::BTreeMap;

    pub(crate) fn mapping(pairs: &[(&str, &str)]) -> PointMapping {
        let entries: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PointMapping::load(&entries).unwrap()
    }

    pub(crate) fn rtu_template() -> Template {
        let model = serde_json::from_value(json!({
            "title": "RTU Overview",
            "panels": [
                {
                    "type": "gauge",
                    "title": "{device} Zone Temperature",
                    "datasource": {"type": "postgres", "uid": "template-ds"},
                    "targets": [{
                        "refId": "A",
                        "datasource": {"type": "postgres", "uid": "template-ds"},
                        "rawSql": "SELECT ts, value_string FROM data WHERE topic_name = '{campus}/{building}/{device}/{point:zone_temperature}' AND $__timeFilter(ts)"
                    }]
                },
                {
                    "type": "stat",
                    "title": "Occupancy",
                    "targets": [{
                        "refId": "A",
                        "rawSql": "SELECT value FROM data WHERE topic_name = '{campus}/{building}/{device}/{point:occupancy}'"
                    }]
                },
                {
                    "type": "timeseries",
                    "title": "Fan",
                    "targets": [{"refId": "A", "rawSql": "SELECT '{point:supply_fan_status}' AS \"{{topic}}\" FROM data WHERE d = '${RTU_ROB}'"}]
                }
            ],
            "templating": {"list": [
                {"name": "RTU_ROB", "type": "query", "datasource": {"type": "postgres", "uid": "template-ds"}},
                {"name": "interval", "type": "interval"}
            ]}
        }))
        .unwrap();
        Template::new(TemplateKind::RtuOverview, model).unwrap()
    }

    pub(crate) fn site_template() -> Template {
        let model = serde_json::from_value(json!({
            "title": "Site Overview",
            "panels": [{
                "type": "timeseries",
                "title": "{campus} {building} Zone Temperatures",
                "targets": [{"refId": "A", "rawSql": "SELECT * FROM data WHERE topic_name LIKE '{campus}/{building}/%/{point:zone_temperature}'"}]
            }]
        }))
        .unwrap();
        Template::new(TemplateKind::SiteOverview, model).unwrap()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn full_mapping() -> PointMapping {
        mapping(&[
            ("zone_temperature", "ZoneTemperature"),
            ("occupancy", "OccupancyMode"),
            ("supply_fan_status", "SupplyFanStatus"),
        ])
    }

    #[test]
    fn test_instantiate_device_document() {
        let mapping = full_mapping();
        let device = DeviceId::new("rtu01").unwrap();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: Some(&device),
            mapping: &mapping,
            generated_at: at(),
        };

        let result = Instantiator::default().instantiate(&rtu_template(), &scope).unwrap();
        let doc = serde_json::to_value(&result.document.model).unwrap();

        assert!(result.misses.is_empty());
        assert_eq!(result.document.title, "PNNL_ROB_rtu01_RTU_Overview");
        assert_eq!(doc["title"], "PNNL_ROB_rtu01_RTU_Overview");
        assert_eq!(doc["id"], Value::Null);
        assert_eq!(doc["version"], 0);
        assert_eq!(doc["panels"][0]["title"], "rtu01 Zone Temperature");
        assert_eq!(
            doc["panels"][0]["targets"][0]["rawSql"],
            "SELECT ts, value_string FROM data WHERE topic_name = 'PNNL/ROB/rtu01/ZoneTemperature' AND $__timeFilter(ts)"
        );
        assert_eq!(
            doc["panels"][2]["targets"][0]["rawSql"],
            "SELECT 'SupplyFanStatus' AS \"{{topic}}\" FROM data WHERE d = '${RTU_ROB}'"
        );
    }

    #[test]
    fn test_instantiate_is_deterministic() {
        let mapping = full_mapping();
        let device = DeviceId::new("rtu02").unwrap();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: Some(&device),
            mapping: &mapping,
            generated_at: at(),
        };
        let instantiator = Instantiator::default();
        let template = rtu_template();

        let first = instantiator.instantiate(&template, &scope).unwrap();
        let later = Scope {
            generated_at: at() + chrono::Duration::seconds(90),
            ..scope
        };
        let second = instantiator.instantiate(&template, &later).unwrap();

        let mut a = serde_json::to_value(&first.document.model).unwrap();
        let mut b = serde_json::to_value(&second.document.model).unwrap();
        assert_ne!(a["uid"], b["uid"]);
        a["uid"] = Value::Null;
        b["uid"] = Value::Null;
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
        assert_eq!(template, rtu_template());
    }

    #[test]
    fn test_missing_mapping_falls_back_to_key() {
        let mapping = mapping(&[("zone_temperature", "ZoneTemperature")]);
        let device = DeviceId::new("rtu01").unwrap();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: Some(&device),
            mapping: &mapping,
            generated_at: at(),
        };

        let result = Instantiator::default().instantiate(&rtu_template(), &scope).unwrap();
        let doc = serde_json::to_value(&result.document.model).unwrap();

        assert_eq!(
            result.misses.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["occupancy", "supply_fan_status"]
        );
        assert_eq!(
            doc["panels"][1]["targets"][0]["rawSql"],
            "SELECT value FROM data WHERE topic_name = 'PNNL/ROB/rtu01/occupancy'"
        );
    }

    #[test]
    fn test_device_placeholder_in_site_scope() {
        let mapping = full_mapping();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: None,
            mapping: &mapping,
            generated_at: at(),
        };

        let result = Instantiator::default().instantiate(&rtu_template(), &scope);
        assert!(matches!(result, Err(TemplateError::DeviceInSiteScope { .. })));
    }

    #[test]
    fn test_site_document() {
        let mapping = full_mapping();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: None,
            mapping: &mapping,
            generated_at: at(),
        };

        let result = Instantiator::default().instantiate(&site_template(), &scope).unwrap();
        assert_eq!(result.document.title, "PNNL_ROB_Site_Overview");
        assert!(result.document.device.is_none());
    }

    #[test]
    fn test_options_applied() {
        let mapping = full_mapping();
        let device = DeviceId::new("rtu03").unwrap();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: Some(&device),
            mapping: &mapping,
            generated_at: at(),
        };
        let instantiator = Instantiator::new(InstantiationOptions {
            timezone: Some("America/Los_Angeles".to_string()),
            datasource_uid: Some("live-ds".to_string()),
            device_variable: Some("RTU_ROB".to_string()),
            state_labels: Some(StateLabels {
                point: "occupancy".to_string(),
                labels: [("0", "Unoccupied"), ("1", "Occupied")]
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
        });

        let result = instantiator.instantiate(&rtu_template(), &scope).unwrap();
        let doc = serde_json::to_value(&result.document.model).unwrap();

        assert_eq!(doc["timezone"], "America/Los_Angeles");
        assert_eq!(doc["panels"][0]["datasource"]["uid"], "live-ds");
        assert_eq!(doc["panels"][0]["targets"][0]["datasource"]["uid"], "live-ds");
        assert_eq!(
            doc["panels"][2]["targets"][0]["rawSql"],
            "SELECT 'SupplyFanStatus' AS \"{{topic}}\" FROM data WHERE d = 'rtu03'"
        );
        assert_eq!(doc["templating"]["list"].as_array().unwrap().len(), 1);
        assert_eq!(doc["templating"]["list"][0]["name"], "interval");
        assert_eq!(
            doc["panels"][1]["fieldConfig"]["defaults"]["mappings"][0]["options"]["1"]["text"],
            "Occupied"
        );
        assert!(doc["panels"][0].get("fieldConfig").is_none());
    }

    #[test]
    fn test_selectable_document_keeps_variable() {
        let mapping = full_mapping();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: None,
            mapping: &mapping,
            generated_at: at(),
        };
        let instantiator = Instantiator::new(InstantiationOptions {
            device_variable: Some("RTU_ROB".to_string()),
            ..Default::default()
        });

        let result = instantiator.instantiate_selectable(&rtu_template(), &scope).unwrap();
        let doc = serde_json::to_value(&result.document.model).unwrap();

        assert_eq!(result.document.title, "PNNL_ROB_RTU_Overview");
        assert!(result.document.device.is_none());
        assert_eq!(result.document.display_name(), "RTU Overview");
        assert_eq!(doc["panels"][0]["title"], "${RTU_ROB} Zone Temperature");
        assert_eq!(
            doc["panels"][1]["targets"][0]["rawSql"],
            "SELECT value FROM data WHERE topic_name = 'PNNL/ROB/${RTU_ROB}/OccupancyMode'"
        );
        assert_eq!(doc["templating"]["list"][0]["name"], "RTU_ROB");
        assert_eq!(doc["templating"]["list"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_selectable_without_variable_needs_device() {
        let mapping = full_mapping();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: None,
            mapping: &mapping,
            generated_at: at(),
        };

        let result = Instantiator::default().instantiate_selectable(&rtu_template(), &scope);
        assert!(matches!(result, Err(TemplateError::DeviceInSiteScope { .. })));
    }

    #[test]
    fn test_replace_variable_matches_whole_name() {
        assert_eq!(replace_variable("d = '$RTU'", "RTU", "rtu01"), "d = 'rtu01'");
        assert_eq!(replace_variable("d = '${RTU}'", "RTU", "rtu01"), "d = 'rtu01'");
        assert_eq!(replace_variable("$RTU_ROB and $RTU2", "RTU", "rtu01"), "$RTU_ROB and $RTU2");
        assert_eq!(
            replace_variable("$__timeFilter(ts) AND d = $RTU", "RTU", "rtu01"),
            "$__timeFilter(ts) AND d = rtu01"
        );
        assert_eq!(replace_variable("cost $", "RTU", "rtu01"), "cost $");
    }

    #[test]
    fn test_pinning_leaves_longer_variables() {
        let model = serde_json::from_value(json!({
            "title": "RTU Overview",
            "panels": [{
                "type": "stat",
                "title": "{device}",
                "targets": [{"refId": "A", "rawSql": "SELECT value FROM data WHERE d = $RTU AND z = $RTU_ROB"}]
            }],
            "templating": {"list": [{"name": "RTU", "type": "query"}, {"name": "RTU_ROB", "type": "query"}]}
        }))
        .unwrap();
        let template = Template::new(TemplateKind::RtuOverview, model).unwrap();
        let mapping = full_mapping();
        let device = DeviceId::new("rtu01").unwrap();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: Some(&device),
            mapping: &mapping,
            generated_at: at(),
        };
        let instantiator = Instantiator::new(InstantiationOptions {
            device_variable: Some("RTU".to_string()),
            ..Default::default()
        });

        let result = instantiator.instantiate(&template, &scope).unwrap();
        let doc = serde_json::to_value(&result.document.model).unwrap();

        assert_eq!(
            doc["panels"][0]["targets"][0]["rawSql"],
            "SELECT value FROM data WHERE d = rtu01 AND z = $RTU_ROB"
        );
        assert_eq!(doc["templating"]["list"].as_array().unwrap().len(), 1);
        assert_eq!(doc["templating"]["list"][0]["name"], "RTU_ROB");
    }

    #[test]
    fn test_placeholders_in_object_keys() {
        let model = serde_json::from_value(json!({
            "title": "RTU Overview",
            "panels": [{
                "type": "timeseries",
                "title": "Temperatures",
                "targets": [],
                "options": {"seriesColors": {"{device} {point:zone_temperature}": "red"}}
            }]
        }))
        .unwrap();
        let template = Template::new(TemplateKind::RtuOverview, model).unwrap();
        assert!(template.referenced_keys().unwrap().contains("zone_temperature"));

        let mapping = full_mapping();
        let device = DeviceId::new("rtu01").unwrap();
        let scope = Scope {
            campus: "PNNL",
            building: "ROB",
            device: Some(&device),
            mapping: &mapping,
            generated_at: at(),
        };

        let result = Instantiator::default().instantiate(&template, &scope).unwrap();
        let doc = serde_json::to_value(&result.document.model).unwrap();
        let colors = doc["panels"][0]["options"]["seriesColors"].as_object().unwrap();
        assert_eq!(colors.keys().collect::<Vec<_>>(), vec!["rtu01 ZoneTemperature"]);
    }
}
