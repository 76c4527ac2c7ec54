//! In-memory reference implementation of [`RecordStore`].
//!
//! Rows are validated against the schema catalog on every write; each row's
//! outcome is independent of its siblings in the same call. Upserts match
//! existing rows by the external id field's value and merge fields into the
//! matched row; inserts always create.

use crate::schema::{RecordSchema, SchemaCatalog};
use crate::store::{RecordId, RecordStore, Row, StoreError, WriteOutcome};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    /// type name -> id -> row, in insertion order
    tables: HashMap<String, IndexMap<RecordId, Row>>,
    next_id: u64,
}

pub struct MemoryStore {
    schemas: SchemaCatalog,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new(schemas: SchemaCatalog) -> Self {
        Self {
            schemas,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of rows currently stored for a type.
    pub fn row_count(&self, type_name: &str) -> usize {
        let inner = self.inner.read();
        inner.tables.get(type_name).map_or(0, |t| t.len())
    }

    /// Snapshot of one row by id.
    pub fn row(&self, type_name: &str, id: &str) -> Option<Row> {
        let inner = self.inner.read();
        inner.tables.get(type_name)?.get(id).cloned()
    }

    /// Snapshot of all rows of a type, in insertion order.
    pub fn rows(&self, type_name: &str) -> Vec<(RecordId, Row)> {
        let inner = self.inner.read();
        inner.tables.get(type_name).map_or_else(Vec::new, |t| {
            t.iter().map(|(id, row)| (id.clone(), row.clone())).collect()
        })
    }

    fn validate_row(schema: &RecordSchema, row: &Row) -> Result<(), String> {
        for field in row.keys() {
            if !schema.has_field(field) {
                return Err(format!(
                    "Unknown field {field} on {}",
                    schema.type_name
                ));
            }
        }
        for required in schema.required_fields() {
            match row.get(required) {
                Some(value) if !value.is_null() => {}
                _ => return Err(format!("Required field missing: {required}")),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn schema(&self, type_name: &str) -> Option<Arc<RecordSchema>> {
        self.schemas.get(type_name)
    }

    async fn upsert(
        &self,
        type_name: &str,
        external_id_field: &str,
        rows: Vec<Row>,
    ) -> Result<Vec<WriteOutcome>, StoreError> {
        let schema = self
            .schemas
            .get(type_name)
            .ok_or_else(|| StoreError::UnknownType(type_name.to_string()))?;
        if !schema.has_field(external_id_field) {
            return Err(StoreError::UnknownExternalIdField {
                record_type: type_name.to_string(),
                field: external_id_field.to_string(),
            });
        }

        let mut inner = self.inner.write();
        let mut outcomes = Vec::with_capacity(rows.len());

        for row in rows {
            if let Err(message) = Self::validate_row(&schema, &row) {
                outcomes.push(WriteOutcome::failure(message));
                continue;
            }
            let Some(external_value) = row.get(external_id_field).filter(|v| !v.is_null()) else {
                outcomes.push(WriteOutcome::failure(format!(
                    "Missing value for external id field {external_id_field}"
                )));
                continue;
            };
            let external_value = external_value.clone();

            let table = inner.tables.entry(type_name.to_string()).or_default();
            let existing = table
                .iter()
                .find(|(_, stored)| stored.get(external_id_field) == Some(&external_value))
                .map(|(id, _)| id.clone());

            match existing {
                Some(id) => {
                    // Field merge: only the submitted fields change
                    if let Some(stored) = table.get_mut(&id) {
                        stored.extend(row);
                    }
                    tracing::debug!(record_type = %type_name, id = %id, "Updated existing record");
                    outcomes.push(WriteOutcome::Success { id, created: false });
                }
                None => {
                    inner.next_id += 1;
                    let id = format!("{}-{:06}", type_name.to_lowercase(), inner.next_id);
                    inner
                        .tables
                        .entry(type_name.to_string())
                        .or_default()
                        .insert(id.clone(), row);
                    tracing::debug!(record_type = %type_name, id = %id, "Created record");
                    outcomes.push(WriteOutcome::Success { id, created: true });
                }
            }
        }

        Ok(outcomes)
    }

    async fn insert(
        &self,
        type_name: &str,
        rows: Vec<Row>,
    ) -> Result<Vec<WriteOutcome>, StoreError> {
        let schema = self
            .schemas
            .get(type_name)
            .ok_or_else(|| StoreError::UnknownType(type_name.to_string()))?;

        let mut inner = self.inner.write();
        let mut outcomes = Vec::with_capacity(rows.len());

        for row in rows {
            if let Err(message) = Self::validate_row(&schema, &row) {
                outcomes.push(WriteOutcome::failure(message));
                continue;
            }
            inner.next_id += 1;
            let id = format!("{}-{:06}", type_name.to_lowercase(), inner.next_id);
            inner
                .tables
                .entry(type_name.to_string())
                .or_default()
                .insert(id.clone(), row);
            tracing::debug!(record_type = %type_name, id = %id, "Inserted record");
            outcomes.push(WriteOutcome::Success { id, created: true });
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, RecordSchema, RelationshipDef};
    use serde_json::json;

    fn store() -> MemoryStore {
        let schemas = SchemaCatalog::new(vec![
            RecordSchema {
                type_name: "Order".to_string(),
                fields: vec![
                    FieldDef {
                        name: "orderNumber".to_string(),
                        required: true,
                    },
                    FieldDef {
                        name: "status".to_string(),
                        required: false,
                    },
                ],
                relationships: vec![RelationshipDef {
                    name: "lineItems".to_string(),
                    child_type: "OrderItem".to_string(),
                    parent_link_field: "orderId".to_string(),
                }],
            },
            RecordSchema {
                type_name: "OrderItem".to_string(),
                fields: vec![
                    FieldDef {
                        name: "orderId".to_string(),
                        required: false,
                    },
                    FieldDef {
                        name: "sku".to_string(),
                        required: true,
                    },
                ],
                relationships: vec![],
            },
        ])
        .unwrap();
        MemoryStore::new(schemas)
    }

    fn row(pairs: &[(&str, JsonValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let store = store();

        let outcomes = store
            .upsert(
                "Order",
                "orderNumber",
                vec![row(&[
                    ("orderNumber", json!("A-1")),
                    ("status", json!("Open")),
                ])],
            )
            .await
            .unwrap();
        let WriteOutcome::Success { id, created: true } = &outcomes[0] else {
            panic!("expected created outcome, got {:?}", outcomes[0]);
        };

        // Same external id: update in place, merging fields
        let outcomes = store
            .upsert(
                "Order",
                "orderNumber",
                vec![row(&[
                    ("orderNumber", json!("A-1")),
                    ("status", json!("Closed")),
                ])],
            )
            .await
            .unwrap();
        assert_eq!(
            outcomes[0],
            WriteOutcome::Success {
                id: id.clone(),
                created: false
            }
        );
        assert_eq!(store.row_count("Order"), 1);
        assert_eq!(
            store.row("Order", id).unwrap().get("status"),
            Some(&json!("Closed"))
        );
    }

    #[tokio::test]
    async fn test_partial_success_within_one_call() {
        let store = store();

        let outcomes = store
            .upsert(
                "Order",
                "orderNumber",
                vec![
                    row(&[("orderNumber", json!("A-1"))]),
                    row(&[("status", json!("Open"))]), // required orderNumber missing
                    row(&[("orderNumber", json!("A-2"))]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], WriteOutcome::Success { .. }));
        assert!(matches!(
            &outcomes[1],
            WriteOutcome::Failure { message } if message.contains("orderNumber")
        ));
        assert!(matches!(outcomes[2], WriteOutcome::Success { .. }));
        assert_eq!(store.row_count("Order"), 2);
    }

    #[tokio::test]
    async fn test_unknown_field_fails_that_row() {
        let store = store();

        let outcomes = store
            .upsert(
                "Order",
                "orderNumber",
                vec![row(&[
                    ("orderNumber", json!("A-1")),
                    ("color", json!("red")),
                ])],
            )
            .await
            .unwrap();
        assert!(matches!(
            &outcomes[0],
            WriteOutcome::Failure { message } if message.contains("color")
        ));
        assert_eq!(store.row_count("Order"), 0);
    }

    #[tokio::test]
    async fn test_insert_always_creates() {
        let store = store();

        for _ in 0..2 {
            let outcomes = store
                .insert("OrderItem", vec![row(&[("sku", json!("SKU-9"))])])
                .await
                .unwrap();
            assert!(matches!(
                outcomes[0],
                WriteOutcome::Success { created: true, .. }
            ));
        }
        assert_eq!(store.row_count("OrderItem"), 2);
    }

    #[tokio::test]
    async fn test_whole_call_errors() {
        let store = store();

        assert!(matches!(
            store.upsert("Ghost", "x", vec![]).await.unwrap_err(),
            StoreError::UnknownType(_)
        ));
        assert!(matches!(
            store.upsert("Order", "ghostField", vec![]).await.unwrap_err(),
            StoreError::UnknownExternalIdField { .. }
        ));
        assert!(matches!(
            store.insert("Ghost", vec![]).await.unwrap_err(),
            StoreError::UnknownType(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writers_share_the_store() {
        let store = Arc::new(store());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let outcomes = store
                    .insert("OrderItem", vec![row(&[("sku", json!(format!("SKU-{i}")))])])
                    .await
                    .unwrap();
                outcomes[0].id().unwrap().clone()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(store.row_count("OrderItem"), 8);
    }

    #[tokio::test]
    async fn test_missing_external_id_value_fails_row() {
        let store = store();

        let outcomes = store
            .upsert("Order", "orderNumber", vec![row(&[("status", json!("Open"))])])
            .await
            .unwrap();
        assert!(matches!(&outcomes[0], WriteOutcome::Failure { .. }));
    }
}
