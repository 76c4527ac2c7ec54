//! Bulk processing engine.
//!
//! Drives every batch through the per-record pipeline
//! `Pending → Validated → BeforeApplied → Upserted → ChildrenInserted →
//! AfterApplied → Done`, with `Failed(reason)` reachable from any stage. A
//! record leaves the surviving set the moment it fails and its outcome is
//! recorded against its input index; sibling records continue. Only the
//! permission guard and configuration problems abort a whole batch.
//!
//! Persistence is grouped by record type, never by record: one upsert call
//! for all surviving parents, one insert call per distinct child type. The
//! number of store calls is proportional to the number of distinct types in
//! the batch, which is what keeps large batches within store operation
//! limits.

use crate::errors::{GatewayError, Result};
use crate::guard::PermissionGuard;
use crate::handlers::HandlerRegistry;
use crate::metrics_defs::{BATCH_DURATION, RECORDS_PROCESSED};
use crate::protocol::IngestRequest;
use crate::record::Record;
use crate::results::{RecordResult, ResultAggregator};
use datastore::permissions::Principal;
use datastore::store::{RecordId, RecordStore, Row, WriteOutcome};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// A parent that made it through the upsert, tracked until its children and
/// After handler settle its final outcome.
struct Persisted {
    /// Original input index
    index: usize,
    id: RecordId,
    record: Record,
    /// Set when one of this parent's children failed to insert. The parent
    /// row itself is committed, but the tree is reported as Error.
    child_error: Option<String>,
}

pub struct BulkProcessor {
    store: Arc<dyn RecordStore>,
    guard: PermissionGuard,
    registry: Arc<HandlerRegistry>,
}

impl BulkProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        guard: PermissionGuard,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            store,
            guard,
            registry,
        }
    }

    /// Processes one batch for one record type. Returns a result entry per
    /// input record in input order, or a request-level error if the batch as
    /// a whole cannot proceed.
    pub async fn process(
        &self,
        principal: &Principal,
        type_name: &str,
        request: IngestRequest,
    ) -> Result<Vec<RecordResult>> {
        let started = Instant::now();
        let schema = self
            .store
            .schema(type_name)
            .ok_or_else(|| GatewayError::UnknownRecordType(type_name.to_string()))?;

        let total = request.data.len();
        tracing::info!(
            record_type = %type_name,
            records = total,
            external_id_field = %request.external_id_field,
            "Processing batch"
        );

        let mut aggregator = ResultAggregator::new(total);

        // Pending → parsed record models; a malformed payload fails only
        // that record
        let mut alive: Vec<(usize, Record)> = Vec::with_capacity(total);
        for (index, payload) in request.data.into_iter().enumerate() {
            match Record::from_payload(self.store.as_ref(), &schema, payload) {
                Ok(record) => alive.push((index, record)),
                Err(e) => aggregator.error(index, e.to_string()),
            }
        }

        // → Validated: one guard pass per distinct type in the batch, over
        // the union of fields the batch actually references
        self.authorize_batch(principal, type_name, &alive)?;

        // → BeforeApplied: a handler error fails every record it covered
        // and keeps them away from persistence entirely
        if let Some(handler) = self.registry.before(type_name) {
            let mut records: Vec<Record> = alive.iter().map(|(_, r)| r.clone()).collect();
            match handler.before_upsert(&mut records).await {
                Ok(()) => {
                    for ((_, slot), mutated) in alive.iter_mut().zip(records) {
                        *slot = mutated;
                    }
                }
                Err(e) => {
                    tracing::warn!(record_type = %type_name, error = %e, "Before handler failed");
                    for (index, _) in alive.drain(..) {
                        aggregator.error(index, format!("Before handler failed: {e}"));
                    }
                }
            }
        }

        // → Upserted: one partial-success call for the whole surviving batch
        let mut persisted: Vec<Persisted> = Vec::with_capacity(alive.len());
        if !alive.is_empty() {
            let rows: Vec<Row> = alive.iter().map(|(_, r)| r.to_row()).collect();
            let outcomes = self
                .store
                .upsert(type_name, &request.external_id_field, rows)
                .await?;

            for ((index, record), outcome) in alive.into_iter().zip(outcomes) {
                match outcome {
                    WriteOutcome::Success { id, .. } => persisted.push(Persisted {
                        index,
                        id,
                        record,
                        child_error: None,
                    }),
                    WriteOutcome::Failure { message } => aggregator.error(index, message),
                }
            }
        }

        // → ChildrenInserted: stamp parent links, then one insert call per
        // distinct child type across all parents
        self.insert_children(&mut persisted).await?;

        // → AfterApplied → Done: the After handler sees only fully
        // successful records, annotated with their assigned ids; an error
        // downgrades them without unwinding committed writes
        let mut completed: Vec<(usize, RecordId, Record)> = Vec::new();
        let mut failed_trees = 0usize;
        for p in persisted {
            match p.child_error {
                Some(message) => {
                    failed_trees += 1;
                    aggregator.error_committed(p.index, p.id, message);
                }
                None => {
                    let mut record = p.record;
                    record.set_field("id", json!(p.id.clone()));
                    completed.push((p.index, p.id, record));
                }
            }
        }

        let mut after_error: Option<String> = None;
        if let Some(handler) = self.registry.after(type_name) {
            if !completed.is_empty() {
                let records: Vec<Record> = completed.iter().map(|(_, _, r)| r.clone()).collect();
                if let Err(e) = handler.after_upsert(&records).await {
                    tracing::warn!(record_type = %type_name, error = %e, "After handler failed");
                    after_error = Some(format!("After handler failed: {e}"));
                }
            }
        }

        let mut succeeded = 0usize;
        for (index, id, _) in completed {
            match &after_error {
                // Data is committed; the caller is told to treat the record
                // as failed but still gets the id
                Some(message) => aggregator.error_committed(index, id, message.clone()),
                None => {
                    succeeded += 1;
                    aggregator.success(index, id);
                }
            }
        }

        let results = aggregator.into_results();
        let errored = results.len() - succeeded;
        metrics::histogram!(BATCH_DURATION.name, "record_type" => type_name.to_string())
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(
            RECORDS_PROCESSED.name,
            "record_type" => type_name.to_string(),
            "status" => "success"
        )
        .increment(succeeded as u64);
        metrics::counter!(
            RECORDS_PROCESSED.name,
            "record_type" => type_name.to_string(),
            "status" => "error"
        )
        .increment(errored as u64);
        tracing::info!(
            record_type = %type_name,
            succeeded,
            errored,
            failed_trees,
            "Batch processed"
        );

        Ok(results)
    }

    /// One authorization pass per distinct type: the parent type with the
    /// union of parent fields, then each child type with the union of child
    /// fields plus the parent-link field the gateway itself writes.
    fn authorize_batch(
        &self,
        principal: &Principal,
        type_name: &str,
        alive: &[(usize, Record)],
    ) -> Result<()> {
        if alive.is_empty() {
            return Ok(());
        }

        let mut parent_fields: BTreeSet<&str> = BTreeSet::new();
        let mut child_fields: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (_, record) in alive {
            parent_fields.extend(record.field_names());
            for collection in record.children() {
                let fields = child_fields.entry(&collection.child_type).or_default();
                fields.insert(collection.parent_link_field.as_str());
                for child in &collection.records {
                    fields.extend(child.field_names());
                }
            }
        }

        self.guard.authorize(principal, type_name, parent_fields)?;
        for (child_type, fields) in child_fields {
            self.guard.authorize(principal, child_type, fields)?;
        }
        Ok(())
    }

    /// Sets the parent-link field on every child of every surviving parent,
    /// then inserts all children of each child type in one partial-success
    /// call. A failed child marks its parent's tree as failed.
    async fn insert_children(&self, persisted: &mut [Persisted]) -> Result<()> {
        // child type -> (position in `persisted`, row), across all parents
        let mut batches: BTreeMap<String, Vec<(usize, Row)>> = BTreeMap::new();
        for (position, p) in persisted.iter_mut().enumerate() {
            let parent_id = p.id.clone();
            for collection in p.record.children_mut() {
                let batch = batches.entry(collection.child_type.clone()).or_default();
                for child in &mut collection.records {
                    child.set_field(collection.parent_link_field.clone(), json!(parent_id));
                    batch.push((position, child.to_row()));
                }
            }
        }

        for (child_type, entries) in batches {
            let (positions, rows): (Vec<usize>, Vec<Row>) = entries.into_iter().unzip();
            let outcomes = self.store.insert(&child_type, rows).await?;
            for (position, outcome) in positions.into_iter().zip(outcomes) {
                if let WriteOutcome::Failure { message } = outcome {
                    let parent = &mut persisted[position];
                    tracing::debug!(
                        child_type = %child_type,
                        parent_id = %parent.id,
                        error = %message,
                        "Child insert failed"
                    );
                    // First failure wins; the tree is already failed
                    parent.child_error.get_or_insert(format!(
                        "{child_type} child insert failed: {message}"
                    ));
                }
            }
        }
        Ok(())
    }
}
