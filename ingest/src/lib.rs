pub mod config;
pub mod errors;
pub mod guard;
pub mod handlers;
pub mod http;
pub mod metrics_defs;
pub mod processor;
pub mod protocol;
pub mod record;
pub mod results;
pub mod service;

use crate::errors::{GatewayError, Result};
use crate::guard::PermissionGuard;
use crate::handlers::{HandlerCatalog, HandlerRegistry};
use crate::processor::BulkProcessor;
use crate::service::GatewayService;
use datastore::permissions::PermissionEngine;
use datastore::store::RecordStore;
use std::sync::Arc;

/// Wires the gateway together from validated configuration and runs it until
/// the process exits. Handler mappings are resolved here, before the
/// listener binds, so a bad mapping never serves a single request.
pub async fn run(
    config: config::Config,
    store: Arc<dyn RecordStore>,
    permissions: Arc<dyn PermissionEngine>,
    catalog: HandlerCatalog,
) -> Result<()> {
    config
        .validate()
        .map_err(|e| GatewayError::Configuration(e.to_string()))?;
    let registry = HandlerRegistry::from_mappings(&catalog, &config.handlers)?;

    let processor = Arc::new(BulkProcessor::new(
        store,
        PermissionGuard::new(permissions),
        Arc::new(registry),
    ));
    let service = GatewayService::new(processor, config.clients, config.limits.max_records);

    http::run_http_service(&config.listener.host, config.listener.port, service).await?;
    Ok(())
}
