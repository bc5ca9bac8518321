// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod grafana_client;
pub mod output_writer;
pub mod template_store;
