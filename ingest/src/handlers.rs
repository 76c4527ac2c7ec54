//! Handler dispatch.
//!
//! Custom per-type logic plugs into the pipeline at two phases. Handler
//! implementations are registered by name in a [`HandlerCatalog`] at process
//! start; configuration then maps (record type, phase) pairs onto those
//! names. The [`HandlerRegistry`] resolves every mapping eagerly when it is
//! built, so an unknown name, a phase mismatch, or an ambiguous mapping
//! fails startup instead of surfacing mid-batch.

use crate::config::HandlerMapping;
use crate::errors::GatewayError;
use crate::record::Record;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Point in the pipeline at which a handler runs.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
        }
    }
}

/// Error raised by a handler. Before-phase errors keep the covered records
/// out of persistence; After-phase errors downgrade already-committed
/// records to Error in the response.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Runs before the upsert over the full ordered list of records of one type.
///
/// Handlers mutate records in place; the slice contract means they cannot
/// add, remove, or reorder records, which would desynchronize result
/// correlation.
#[async_trait]
pub trait BeforeHandler: Send + Sync {
    async fn before_upsert(&self, records: &mut [Record]) -> Result<(), HandlerError>;
}

/// Runs after children are inserted, over the successfully completed records
/// only. Records carry their assigned persistent identifier under the `id`
/// field. Side effects are the handler's own responsibility; the gateway
/// does not track or roll them back.
#[async_trait]
pub trait AfterHandler: Send + Sync {
    async fn after_upsert(&self, records: &[Record]) -> Result<(), HandlerError>;
}

/// Named handler implementations available for configuration to map.
#[derive(Default)]
pub struct HandlerCatalog {
    before: HashMap<String, Arc<dyn BeforeHandler>>,
    after: HashMap<String, Arc<dyn AfterHandler>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_before(&mut self, name: impl Into<String>, handler: Arc<dyn BeforeHandler>) {
        self.before.insert(name.into(), handler);
    }

    pub fn register_after(&mut self, name: impl Into<String>, handler: Arc<dyn AfterHandler>) {
        self.after.insert(name.into(), handler);
    }
}

/// Resolved (record type, phase) → handler table, immutable after startup.
#[derive(Default)]
pub struct HandlerRegistry {
    before: HashMap<String, Arc<dyn BeforeHandler>>,
    after: HashMap<String, Arc<dyn AfterHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("before", &self.before.keys().collect::<Vec<_>>())
            .field("after", &self.after.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    /// Builds the registry from configuration, validating every mapping.
    pub fn from_mappings(
        catalog: &HandlerCatalog,
        mappings: &[HandlerMapping],
    ) -> Result<Self, GatewayError> {
        let mut registry = HandlerRegistry::default();

        for mapping in mappings {
            let occupied = match mapping.phase {
                Phase::Before => registry.before.contains_key(&mapping.record_type),
                Phase::After => registry.after.contains_key(&mapping.record_type),
            };
            if occupied {
                return Err(GatewayError::Configuration(format!(
                    "Conflicting {} handler mappings for record type {}",
                    mapping.phase.as_str(),
                    mapping.record_type
                )));
            }

            match mapping.phase {
                Phase::Before => {
                    let Some(handler) = catalog.before.get(&mapping.handler) else {
                        return Err(Self::unknown_handler(catalog, mapping));
                    };
                    registry
                        .before
                        .insert(mapping.record_type.clone(), handler.clone());
                }
                Phase::After => {
                    let Some(handler) = catalog.after.get(&mapping.handler) else {
                        return Err(Self::unknown_handler(catalog, mapping));
                    };
                    registry
                        .after
                        .insert(mapping.record_type.clone(), handler.clone());
                }
            }
            tracing::debug!(
                record_type = %mapping.record_type,
                handler = %mapping.handler,
                phase = mapping.phase.as_str(),
                "Mapped handler"
            );
        }

        Ok(registry)
    }

    fn unknown_handler(catalog: &HandlerCatalog, mapping: &HandlerMapping) -> GatewayError {
        // Distinguish a typo from a handler wired to the wrong phase
        let other_phase = match mapping.phase {
            Phase::Before => catalog.after.contains_key(&mapping.handler),
            Phase::After => catalog.before.contains_key(&mapping.handler),
        };
        if other_phase {
            GatewayError::Configuration(format!(
                "Handler {} does not implement the {} phase interface",
                mapping.handler,
                mapping.phase.as_str()
            ))
        } else {
            GatewayError::Configuration(format!("Unknown handler: {}", mapping.handler))
        }
    }

    /// Before handler for a record type. None means no handler is
    /// configured, which is a normal condition. Exact, case-sensitive match.
    pub fn before(&self, type_name: &str) -> Option<Arc<dyn BeforeHandler>> {
        self.before.get(type_name).cloned()
    }

    /// After handler for a record type, if configured.
    pub fn after(&self, type_name: &str) -> Option<Arc<dyn AfterHandler>> {
        self.after.get(type_name).cloned()
    }
}
