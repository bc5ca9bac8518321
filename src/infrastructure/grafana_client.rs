// Grafana HTTP API client
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::dashboard_uploader::DashboardUploader;
use crate::application::topic_source::TopicSource;
use crate::domain::error::{DatasourceError, UploadError};
use crate::domain::report::UploadResult;
use crate::domain::template::ImportEnvelope;
use crate::infrastructure::config::GrafanaSettings;

const POSTGRES: &str = "postgres";

#[derive(Debug, Clone)]
pub struct GrafanaClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasourceInfo {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderInfo {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

/// Title of the folder dashboards will be imported into. Folder 0 is
/// Grafana's built-in General folder, which `/api/folders` does not list.
pub fn folder_title(folders: &[FolderInfo], folder_id: i64) -> Option<&str> {
    if folder_id == 0 {
        return Some("General");
    }
    folders
        .iter()
        .find(|f| f.id == folder_id)
        .map(|f| f.title.as_str())
}

#[derive(Debug, Deserialize)]
struct DsQueryResponse {
    results: BTreeMap<String, DsQueryResult>,
}

#[derive(Debug, Deserialize)]
struct DsQueryResult {
    #[serde(default)]
    frames: Vec<DsFrame>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DsFrame {
    data: DsFrameData,
}

#[derive(Debug, Deserialize)]
struct DsFrameData {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GrafanaClient {
    pub fn new(settings: &GrafanaSettings) -> Result<Self, UploadError> {
        let base_url = settings.url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()
            .map_err(|source| UploadError::Request {
                url: base_url.clone(),
                source,
            })?;

        if !settings.verify_ssl {
            tracing::warn!(url = %base_url, "TLS certificate verification is disabled");
        }

        Ok(Self {
            base_url,
            username: settings.username.clone(),
            password: settings.password.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, UploadError> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|source| UploadError::Request {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(UploadError::Status { url, status, message });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| UploadError::Request { url, source })
    }

    /// `GET /api/health`
    pub async fn health(&self) -> Result<(), UploadError> {
        self.get_json::<Value>("/api/health").await.map(|_| ())
    }

    /// `GET /api/datasources`
    pub async fn datasources(&self) -> Result<Vec<DatasourceInfo>, UploadError> {
        self.get_json("/api/datasources").await
    }

    /// `GET /api/folders`
    pub async fn folders(&self) -> Result<Vec<FolderInfo>, UploadError> {
        self.get_json("/api/folders").await
    }

    /// First PostgreSQL datasource known to the server.
    pub async fn find_postgres_datasource(&self) -> Result<Option<DatasourceInfo>, UploadError> {
        Ok(self
            .datasources()
            .await?
            .into_iter()
            .find(|ds| ds.kind == POSTGRES))
    }

    /// Run a raw SQL query through `POST /api/ds/query`, returning every string cell.
    pub async fn query_strings(
        &self,
        datasource_uid: &str,
        sql: &str,
    ) -> Result<Vec<String>, DatasourceError> {
        let payload = json!({
            "queries": [{
                "refId": "A",
                "datasource": { "type": POSTGRES, "uid": datasource_uid },
                "rawSql": sql,
                "format": "table"
            }]
        });

        tracing::debug!(sql, "Executing datasource query");
        let response = self
            .http
            .post(self.url("/api/ds/query"))
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send()
            .await
            .map_err(|e| DatasourceError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DatasourceError::Status { status, body });
        }

        let data = response
            .json::<DsQueryResponse>()
            .await
            .map_err(|e| DatasourceError::Malformed(e.to_string()))?;

        string_cells(data)
    }

    /// `POST /api/dashboards/db`
    pub async fn create_dashboard(&self, envelope: &ImportEnvelope<'_>) -> UploadResult {
        let url = self.url("/api/dashboards/db");
        let sent = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(envelope)
            .send()
            .await;

        let (success, message, data) = match sent {
            Ok(response) if response.status().is_success() => match response.json::<Value>().await {
                Ok(data) => (true, "Dashboard created successfully".to_string(), Some(data)),
                Err(e) => (true, format!("Dashboard created, unreadable response: {}", e), None),
            },
            Ok(response) => {
                let body = response.text().await.unwrap_or_default();
                (false, format!("Failed: {}", error_message(&body)), None)
            }
            Err(e) => (false, format!("Exception: {}", e), None),
        };

        UploadResult {
            success,
            message,
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Grafana error bodies are usually `{"message": "..."}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn string_cells(response: DsQueryResponse) -> Result<Vec<String>, DatasourceError> {
    let mut cells = Vec::new();
    for (ref_id, result) in response.results {
        if let Some(error) = result.error {
            return Err(DatasourceError::Malformed(format!("query {}: {}", ref_id, error)));
        }
        for frame in result.frames {
            for column in frame.data.values {
                cells.extend(column.into_iter().filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                }));
            }
        }
    }
    Ok(cells)
}

/// Topic lookup through a Grafana-proxied PostgreSQL datasource.
#[derive(Debug, Clone)]
pub struct GrafanaTopicSource {
    client: Arc<GrafanaClient>,
    datasource_uid: String,
    discovery_point: String,
}

impl GrafanaTopicSource {
    pub fn new(client: Arc<GrafanaClient>, datasource_uid: String, discovery_point: String) -> Self {
        Self {
            client,
            datasource_uid,
            discovery_point,
        }
    }

    fn topics_query(&self, campus: &str, building: &str) -> String {
        format!(
            "select topic_name from topics where topic_name like '{}/{}/%/{}'",
            sql_literal(campus),
            sql_literal(building),
            sql_literal(&self.discovery_point)
        )
    }
}

fn sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl TopicSource for GrafanaTopicSource {
    async fn topic_names(&self, campus: &str, building: &str) -> Result<Vec<String>, DatasourceError> {
        let query = self.topics_query(campus, building);
        self.client.query_strings(&self.datasource_uid, &query).await
    }
}

#[async_trait]
impl DashboardUploader for GrafanaClient {
    async fn upload(&self, envelope: &ImportEnvelope<'_>) -> UploadResult {
        self.create_dashboard(envelope).await
    }
}
