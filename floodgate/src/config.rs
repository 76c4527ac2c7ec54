use datastore::permissions::ProfilePermissions;
use datastore::schema::{RecordSchema, SchemaError};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid gateway configuration: {0}")]
    Gateway(#[from] ingest::config::ValidationError),

    #[error("Invalid schema catalog: {0}")]
    Schema(#[from] SchemaError),
}

/// Full process configuration: the gateway section consumed by the ingest
/// crate, plus the record-type schemas and permission profiles that back it.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub gateway: ingest::config::Config,
    pub schemas: Vec<RecordSchema>,
    #[serde(default)]
    pub profiles: ProfilePermissions,
    pub statsd: Option<StatsdConfig>,
}

#[derive(Debug, Deserialize)]
pub struct StatsdConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "floodgate".to_string()
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&raw)?;
        config.gateway.validate()?;
        Ok(config)
    }
}
