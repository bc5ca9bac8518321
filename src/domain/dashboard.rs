//! Typed Grafana dashboard tree.
//!
//! Only the parts the generator interprets are modeled: panels of the known
//! kinds, their queries, datasource references and templating variables.
//! Everything else rides along in `extra` bags so a template round-trips
//! without loss. Panels of any other type are kept as opaque JSON objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Extra = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardModel {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub panels: Vec<PanelNode>,
    #[serde(default)]
    pub templating: Templating,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PanelNode {
    Typed(Panel),
    Opaque(Extra),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Panel {
    #[serde(rename = "gauge")]
    Gauge(PanelBody),
    #[serde(rename = "stat")]
    Stat(PanelBody),
    #[serde(rename = "timeseries")]
    TimeSeries(PanelBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource: Option<DatasourceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "refId", default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource: Option<DatasourceRef>,
    #[serde(rename = "rawSql", default, skip_serializing_if = "Option::is_none")]
    pub raw_sql: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasourceRef {
    Object(DatasourceObject),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceObject {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Templating {
    #[serde(default)]
    pub list: Vec<Variable>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource: Option<DatasourceRef>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Panel {
    pub fn body_mut(&mut self) -> &mut PanelBody {
        match self {
            Panel::Gauge(body) | Panel::Stat(body) | Panel::TimeSeries(body) => body,
        }
    }
}

impl DatasourceRef {
    /// Point a reference of the given type at a new datasource uid.
    pub fn retarget(&mut self, kind: &str, uid: &str) {
        if let DatasourceRef::Object(object) = self {
            if object.kind.as_deref() == Some(kind) {
                object.uid = Some(uid.to_string());
            }
        }
    }
}

impl DashboardModel {
    /// Apply `f` to every string leaf of the tree, typed and untyped alike,
    /// including the keys of untyped objects.
    pub fn visit_strings<E>(
        &mut self,
        f: &mut impl FnMut(&mut String) -> Result<(), E>,
    ) -> Result<(), E> {
        f(&mut self.title)?;
        for panel in &mut self.panels {
            panel.visit_strings(f)?;
        }
        for variable in &mut self.templating.list {
            f(&mut variable.name)?;
            visit_datasource(variable.datasource.as_mut(), f)?;
            visit_extra(&mut variable.extra, f)?;
        }
        visit_extra(&mut self.templating.extra, f)?;
        visit_extra(&mut self.extra, f)
    }

    /// Every string leaf and untyped object key, in document order.
    pub fn strings(&self) -> Vec<String> {
        let mut copy = self.clone();
        let mut out = Vec::new();
        let _ = copy.visit_strings(&mut |s: &mut String| {
            out.push(s.clone());
            Ok::<(), std::convert::Infallible>(())
        });
        out
    }

    /// Rewrite every datasource reference of `kind` to `uid`.
    pub fn retarget_datasource(&mut self, kind: &str, uid: &str) {
        for panel in &mut self.panels {
            match panel {
                PanelNode::Typed(panel) => {
                    let body = panel.body_mut();
                    if let Some(ds) = body.datasource.as_mut() {
                        ds.retarget(kind, uid);
                    }
                    for target in &mut body.targets {
                        if let Some(ds) = target.datasource.as_mut() {
                            ds.retarget(kind, uid);
                        }
                    }
                }
                PanelNode::Opaque(fields) => retarget_object(fields, kind, uid),
            }
        }
        for variable in &mut self.templating.list {
            if let Some(ds) = variable.datasource.as_mut() {
                ds.retarget(kind, uid);
            }
        }
    }
}

impl PanelNode {
    fn visit_strings<E>(
        &mut self,
        f: &mut impl FnMut(&mut String) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            PanelNode::Typed(panel) => {
                let body = panel.body_mut();
                f(&mut body.title)?;
                visit_datasource(body.datasource.as_mut(), f)?;
                for target in &mut body.targets {
                    if let Some(ref_id) = target.ref_id.as_mut() {
                        f(ref_id)?;
                    }
                    if let Some(sql) = target.raw_sql.as_mut() {
                        f(sql)?;
                    }
                    visit_datasource(target.datasource.as_mut(), f)?;
                    visit_extra(&mut target.extra, f)?;
                }
                visit_extra(&mut body.extra, f)
            }
            PanelNode::Opaque(fields) => visit_extra(fields, f),
        }
    }
}

fn visit_datasource<E>(
    ds: Option<&mut DatasourceRef>,
    f: &mut impl FnMut(&mut String) -> Result<(), E>,
) -> Result<(), E> {
    match ds {
        Some(DatasourceRef::Named(name)) => f(name),
        Some(DatasourceRef::Object(object)) => {
            if let Some(uid) = object.uid.as_mut() {
                f(uid)?;
            }
            visit_extra(&mut object.extra, f)
        }
        None => Ok(()),
    }
}

/// Visits keys as well as values; a key the visitor changes is moved.
fn visit_extra<E>(
    extra: &mut Extra,
    f: &mut impl FnMut(&mut String) -> Result<(), E>,
) -> Result<(), E> {
    let keys: Vec<String> = extra.keys().cloned().collect();
    for key in keys {
        let mut renamed = key.clone();
        f(&mut renamed)?;
        if renamed == key {
            if let Some(value) = extra.get_mut(&key) {
                visit_value(value, f)?;
            }
        } else if let Some(mut value) = extra.remove(&key) {
            visit_value(&mut value, f)?;
            extra.insert(renamed, value);
        }
    }
    Ok(())
}

fn visit_value<E>(
    value: &mut Value,
    f: &mut impl FnMut(&mut String) -> Result<(), E>,
) -> Result<(), E> {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => {
            for item in items {
                visit_value(item, f)?;
            }
            Ok(())
        }
        Value::Object(fields) => visit_extra(fields, f),
        _ => Ok(()),
    }
}

fn retarget_object(fields: &mut Extra, kind: &str, uid: &str) {
    if let Some(Value::Object(ds)) = fields.get_mut("datasource") {
        if ds.get("type").and_then(Value::as_str) == Some(kind) {
            ds.insert("uid".to_string(), Value::String(uid.to_string()));
        }
    }
    for child in fields.values_mut() {
        retarget_value(child, kind, uid);
    }
}

fn retarget_value(value: &mut Value, kind: &str, uid: &str) {
    match value {
        Value::Object(fields) => retarget_object(fields, kind, uid),
        Value::Array(items) => {
            for item in items {
                retarget_value(item, kind, uid);
            }
        }
        _ => {}
    }
}
