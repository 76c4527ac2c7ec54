use crate::handlers::Phase;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("max_records cannot be 0")]
    InvalidMaxRecords,

    #[error("Handler mapping with empty record type")]
    EmptyRecordType,

    #[error("Handler mapping with empty handler name")]
    EmptyHandlerName,

    #[error("Duplicate {phase} handler mapping for record type {record_type}")]
    DuplicateHandlerMapping {
        record_type: String,
        phase: &'static str,
    },

    #[error("Client token mapped to empty profile")]
    EmptyClientProfile,
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for incoming ingest requests
    pub listener: Listener,
    /// (record type, phase) → handler name mappings
    #[serde(default)]
    pub handlers: Vec<HandlerMapping>,
    /// Request size limits
    #[serde(default)]
    pub limits: Limits,
    /// Bearer token → permission profile. Token verification beyond this
    /// lookup belongs to the fronting transport.
    #[serde(default)]
    pub clients: HashMap<String, String>,
}

impl Config {
    /// Validates the gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;

        if self.limits.max_records == 0 {
            return Err(ValidationError::InvalidMaxRecords);
        }

        // At most one mapping per (record type, phase)
        let mut seen: HashSet<(&String, Phase)> = HashSet::new();
        for mapping in &self.handlers {
            if mapping.record_type.is_empty() {
                return Err(ValidationError::EmptyRecordType);
            }
            if mapping.handler.is_empty() {
                return Err(ValidationError::EmptyHandlerName);
            }
            if !seen.insert((&mapping.record_type, mapping.phase)) {
                return Err(ValidationError::DuplicateHandlerMapping {
                    record_type: mapping.record_type.clone(),
                    phase: mapping.phase.as_str(),
                });
            }
        }

        for profile in self.clients.values() {
            if profile.is_empty() {
                return Err(ValidationError::EmptyClientProfile);
            }
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Maps one (record type, phase) pair onto a named handler from the catalog.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HandlerMapping {
    pub record_type: String,
    pub handler: String,
    pub phase: Phase,
}

/// Request size limits
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Limits {
    /// Maximum number of parent records per batch
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

fn default_max_records() -> usize {
    200
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}
