//! Built-in handler implementations.
//!
//! These are the stock handlers a deployment can map onto record types from
//! configuration alone. Anything more specific links against the ingest
//! crate and registers its own implementations in the catalog.

use async_trait::async_trait;
use ingest::handlers::{AfterHandler, BeforeHandler, HandlerCatalog, HandlerError};
use ingest::record::Record;
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stamps `receivedAt` (epoch seconds) on records that do not carry one.
struct ReceivedTimestamp;

#[async_trait]
impl BeforeHandler for ReceivedTimestamp {
    async fn before_upsert(&self, records: &mut [Record]) -> Result<(), HandlerError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| HandlerError::new(format!("System clock error: {e}")))?
            .as_secs();
        for record in records {
            if record.field("receivedAt").is_none_or(|v| v.is_null()) {
                record.set_field("receivedAt", json!(now));
            }
        }
        Ok(())
    }
}

/// Logs one line per successfully written record.
struct AuditLog;

#[async_trait]
impl AfterHandler for AuditLog {
    async fn after_upsert(&self, records: &[Record]) -> Result<(), HandlerError> {
        for record in records {
            let id = record.field("id").and_then(|v| v.as_str()).unwrap_or("-");
            tracing::info!(record_type = %record.type_name(), id = %id, "Record written");
        }
        Ok(())
    }
}

pub fn builtin_catalog() -> HandlerCatalog {
    let mut catalog = HandlerCatalog::new();
    catalog.register_before("received_timestamp", Arc::new(ReceivedTimestamp));
    catalog.register_after("audit_log", Arc::new(AuditLog));
    catalog
}
