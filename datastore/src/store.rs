//! Storage collaborator contract.
//!
//! The gateway requires partial-success batched writes: every call takes a
//! batch of rows and returns one [`WriteOutcome`] per row, aligned with input
//! order. A row failing validation must not prevent its siblings in the same
//! call from persisting. Whole-call errors ([`StoreError`]) are reserved for
//! problems with the call itself, not with individual rows.

use crate::schema::RecordSchema;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

/// Store-assigned persistent identifier.
pub type RecordId = String;

/// One row of field values, in payload order.
pub type Row = IndexMap<String, JsonValue>;

/// Errors that fail an entire store call.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown record type: {0}")]
    UnknownType(String),

    #[error("{record_type} has no field {field} to match external ids on")]
    UnknownExternalIdField { record_type: String, field: String },
}

/// Per-row outcome of a batched write, aligned with input order.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOutcome {
    Success { id: RecordId, created: bool },
    Failure { message: String },
}

impl WriteOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        WriteOutcome::Failure {
            message: message.into(),
        }
    }

    pub fn id(&self) -> Option<&RecordId> {
        match self {
            WriteOutcome::Success { id, .. } => Some(id),
            WriteOutcome::Failure { .. } => None,
        }
    }
}

/// A permission-governed record store with partial-success batch writes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Schema for a record type, or None if the type does not exist.
    fn schema(&self, type_name: &str) -> Option<Arc<RecordSchema>>;

    /// Upserts a batch of rows, matching existing records by the value of
    /// `external_id_field`. Rows with a matching record are updated in place
    /// (field merge); the rest are created. One outcome per input row.
    async fn upsert(
        &self,
        type_name: &str,
        external_id_field: &str,
        rows: Vec<Row>,
    ) -> Result<Vec<WriteOutcome>, StoreError>;

    /// Inserts a batch of rows unconditionally. One outcome per input row.
    async fn insert(
        &self,
        type_name: &str,
        rows: Vec<Row>,
    ) -> Result<Vec<WriteOutcome>, StoreError>;
}
