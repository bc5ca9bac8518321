// Error taxonomy shared by every layer
use std::path::PathBuf;

use thiserror::Error;

/// Required configuration is missing or malformed. Aborts the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("section `device_mapping` is absent or empty")]
    EmptyMapping,

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A named template could not be loaded. Only that template kind is skipped.
#[derive(Debug, Error)]
pub enum TemplateLoadError {
    #[error("template {path:?} not found: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {path:?} is not a valid dashboard: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("template {path:?} has malformed placeholders: {source}")]
    Placeholder {
        path: PathBuf,
        #[source]
        source: TemplateError,
    },
}

/// Device discovery against the external store failed.
#[derive(Debug, Error)]
pub enum DatasourceError {
    #[error("datasource unreachable: {0}")]
    Unreachable(String),

    #[error("datasource query failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed datasource response: {0}")]
    Malformed(String),
}

/// Malformed placeholder usage. Fatal for a single instantiation only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("`{{device}}` used in site scope at `{context}`")]
    DeviceInSiteScope { context: String },

    #[error("malformed point placeholder `{token}`")]
    MalformedPoint { token: String },

    #[error("unterminated placeholder in `{context}`")]
    Unterminated { context: String },
}

/// Transport failure talking to the dashboard server.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },
}
