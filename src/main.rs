// Main entry point - Configuration, dependency wiring and the generation run
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::application::generation_service::GenerationService;
use crate::application::instantiator::{InstantiationOptions, Instantiator};
use crate::application::publish_service::PublishService;
use crate::application::topic_source::TopicSource;
use crate::domain::report::UploadLog;
use crate::infrastructure::config::{AppConfig, GrafanaSettings, load_app_config};
use crate::infrastructure::grafana_client::{GrafanaClient, GrafanaTopicSource, folder_title};
use crate::infrastructure::output_writer::OutputWriter;
use crate::infrastructure::template_store::TemplateStore;
use crate::presentation::cli::Cli;
use crate::presentation::summary::RunSummary;

/// A verified Grafana connection and the datasource queries go through.
struct Connection {
    client: Arc<GrafanaClient>,
    datasource_uid: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("building_dashboards={}", cli.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let config = load_app_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    let campus = config.dashboard.campus.clone();
    let building = config.dashboard.building.clone();
    tracing::info!(
        campus = %campus,
        building = %building,
        output_dir = ?config.dashboard.output_dir,
        "Loaded configuration"
    );

    let mapping = Arc::new(config.point_mapping()?);
    tracing::info!(count = mapping.len(), "Loaded device mappings");
    for alias in mapping.ambiguous_aliases() {
        tracing::warn!(
            device_point = %alias.device_point,
            keys = ?alias.keys,
            "Several canonical keys map to the same device point"
        );
    }

    // Connect to Grafana unless running offline
    let connection = match (&config.grafana, cli.offline) {
        (_, true) => None,
        (Some(settings), false) => Some(connect(settings, config.dashboard.folder_id).await?),
        (None, false) => {
            tracing::warn!("No [grafana] section configured, generating files only");
            None
        }
    };

    // Load templates
    let templates = TemplateStore::new(&config.dashboard.template_dir).load_all();
    if templates.is_empty() {
        bail!(
            "No dashboard templates could be loaded from {:?}",
            config.dashboard.template_dir
        );
    }

    // Create services (application layer)
    let instantiator = Instantiator::new(instantiation_options(&config, connection.as_ref()));
    let source = connection.as_ref().map(|c| {
        Arc::new(GrafanaTopicSource::new(
            c.client.clone(),
            c.datasource_uid.clone(),
            config.dashboard.discovery_point.clone(),
        )) as Arc<dyn TopicSource>
    });
    let generation = GenerationService::new(
        source,
        instantiator,
        mapping.clone(),
        campus.clone(),
        building.clone(),
        config.static_devices(),
    );

    // Generate and write dashboards
    let devices = generation
        .resolve_devices()
        .await
        .context("Device discovery failed and no static device list is configured")?;
    let generated_at = Utc::now();
    let dashboards = generation.generate(&templates, &devices, generated_at);

    let writer = OutputWriter::new(&config.dashboard.output_dir);
    for dashboard in &dashboards {
        let files = writer.write_dashboard(
            dashboard,
            config.dashboard.folder_id,
            config.dashboard.overwrite,
        )?;
        tracing::info!(
            title = %dashboard.document.title,
            path = ?files.dashboard,
            import = ?files.import,
            "Generated dashboard"
        );
    }

    // Upload
    let mut uploads = Vec::new();
    if let Some(connection) = &connection {
        let publisher = PublishService::new(
            connection.client.clone(),
            config.dashboard.folder_id,
            config.dashboard.overwrite,
        );
        uploads = publisher.publish(&dashboards, generated_at).await;

        let log = UploadLog {
            upload_time: Utc::now().to_rfc3339(),
            grafana_url: connection.client.base_url().to_string(),
            folder_id: publisher.folder_id(),
            devices_count: devices.len(),
            responses: uploads.clone(),
        };
        let path = writer.write_upload_log(&log, &campus, &building, Utc::now())?;
        tracing::info!(path = ?path, "Upload responses saved");

        for upload in uploads.iter().filter(|u| u.result.success) {
            if let Some(url) = upload.url() {
                tracing::info!(dashboard = %upload.dashboard, url = %format!("{}{}", connection.client.base_url(), url), "Dashboard available");
            }
        }
    }

    let summary = RunSummary {
        campus: &campus,
        building: &building,
        datasource_uid: connection.as_ref().map(|c| c.datasource_uid.as_str()),
        grafana_url: connection.as_ref().map(|c| c.client.base_url()),
        folder_id: config.dashboard.folder_id,
        dashboards: &dashboards,
        uploads: &uploads,
    };
    println!("{}", summary.render());

    Ok(())
}

async fn connect(settings: &GrafanaSettings, folder_id: i64) -> anyhow::Result<Connection> {
    let client = Arc::new(GrafanaClient::new(settings)?);
    tracing::info!(url = %client.base_url(), username = %settings.username, "Testing Grafana connection");
    client
        .health()
        .await
        .context("Cannot connect to Grafana; check the URL and credentials")?;

    let datasource_uid = match &settings.datasource_uid {
        Some(uid) => uid.clone(),
        None => match client.find_postgres_datasource().await? {
            Some(ds) => {
                tracing::info!(name = %ds.name, uid = %ds.uid, "Auto-selected PostgreSQL datasource");
                ds.uid
            }
            None => bail!("No PostgreSQL datasource found in Grafana"),
        },
    };

    match client.folders().await {
        Ok(folders) => match folder_title(&folders, folder_id) {
            Some(title) => tracing::info!(folder_id, folder = %title, "Uploading into Grafana folder"),
            None => tracing::warn!(
                folder_id,
                available = ?folders.iter().map(|f| f.title.as_str()).collect::<Vec<_>>(),
                "Configured folder not found in Grafana, uploads may be rejected"
            ),
        },
        Err(e) => tracing::warn!(error = %e, "Could not list Grafana folders"),
    }

    Ok(Connection {
        client,
        datasource_uid,
    })
}

fn instantiation_options(config: &AppConfig, connection: Option<&Connection>) -> InstantiationOptions {
    InstantiationOptions {
        timezone: Some(config.dashboard.timezone.clone()),
        datasource_uid: connection
            .map(|c| c.datasource_uid.clone())
            .or_else(|| config.grafana.as_ref().and_then(|g| g.datasource_uid.clone())),
        device_variable: config.dashboard.device_variable.clone(),
        state_labels: config.state_labels(),
    }
}
