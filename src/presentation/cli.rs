use clap::Parser;

/// Generate Grafana dashboards for building-automation telemetry
///
/// Discovers RTU devices under the configured campus and building, stamps
/// out one RTU overview per device plus a site overview from the JSON
/// templates, writes them to the output directory and uploads them to
/// Grafana.
#[derive(Debug, Parser)]
#[command(name = "building-dashboards", version)]
pub struct Cli {
    /// Configuration file, extension optional (TOML or INI)
    #[arg(short, long, default_value = "config/dashboards")]
    pub config: String,

    /// Only write files; skip every Grafana call and use the configured device list
    #[arg(long)]
    pub offline: bool,

    /// Default log directive when RUST_LOG is unset, e.g. 'debug'
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
