mod config;
mod handlers;

use clap::Parser;
use config::{AppConfig, StatsdConfig};
use datastore::schema::SchemaCatalog;
use datastore::MemoryStore;
use ingest::metrics_defs::{ALL_METRICS, MetricType};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "floodgate", about = "Bulk data ingestion gateway")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "Gateway exited");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let app = AppConfig::from_file(&cli.config)?;

    if let Some(statsd) = &app.statsd {
        install_statsd_exporter(statsd)?;
    }

    let schemas = SchemaCatalog::new(app.schemas)?;
    let store = Arc::new(MemoryStore::new(schemas));
    let permissions = Arc::new(app.profiles);

    ingest::run(app.gateway, store, permissions, handlers::builtin_catalog()).await?;
    Ok(())
}

fn install_statsd_exporter(statsd: &StatsdConfig) -> Result<(), Box<dyn std::error::Error>> {
    let recorder = StatsdBuilder::from(statsd.host.as_str(), statsd.port)
        .with_queue_size(5000)
        .with_buffer_size(1024)
        .build(Some(&statsd.prefix))?;
    metrics::set_global_recorder(recorder)?;
    for def in ALL_METRICS {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }
    tracing::info!(host = %statsd.host, port = statsd.port, "StatsD exporter installed");
    Ok(())
}
