//! Per-record outcome aggregation.
//!
//! The processor advances records through its state machine in batched,
//! type-grouped persistence calls; the aggregator maps whatever happened
//! back to original input indices so the response is always one entry per
//! input record, in input order.

use datastore::RecordId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub enum RecordStatus {
    Success,
    Error,
}

/// Final outcome for one input record.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RecordResult {
    pub index: usize,
    pub status: RecordStatus,
    /// Assigned persistent id. Present on success, and on records that were
    /// committed but downgraded by an After handler failure.
    pub id: Option<RecordId>,
    pub message: Option<String>,
}

/// Collects per-record outcomes keyed by input index.
pub struct ResultAggregator {
    slots: Vec<Option<RecordResult>>,
}

impl ResultAggregator {
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
        }
    }

    pub fn success(&mut self, index: usize, id: RecordId) {
        self.slots[index] = Some(RecordResult {
            index,
            status: RecordStatus::Success,
            id: Some(id),
            message: None,
        });
    }

    pub fn error(&mut self, index: usize, message: impl Into<String>) {
        self.slots[index] = Some(RecordResult {
            index,
            status: RecordStatus::Error,
            id: None,
            message: Some(message.into()),
        });
    }

    /// Error for a record whose row is committed (child insertion or After
    /// handler failure): the caller is told to treat it as failed but still
    /// gets the assigned id.
    pub fn error_committed(&mut self, index: usize, id: RecordId, message: impl Into<String>) {
        self.slots[index] = Some(RecordResult {
            index,
            status: RecordStatus::Error,
            id: Some(id),
            message: Some(message.into()),
        });
    }

    /// Emits results in input order. Every index yields exactly one entry;
    /// an unfilled slot is a processor bug and is reported as an Error entry
    /// rather than dropped.
    pub fn into_results(self) -> Vec<RecordResult> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    tracing::error!(index, "Record produced no outcome");
                    RecordResult {
                        index,
                        status: RecordStatus::Error,
                        id: None,
                        message: Some("Internal error: record produced no outcome".to_string()),
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_preserve_input_order() {
        let mut aggregator = ResultAggregator::new(3);
        // Filled out of order, as batched persistence does
        aggregator.error(2, "boom");
        aggregator.success(0, "order-000001".to_string());
        aggregator.error_committed(1, "order-000002".to_string(), "child insert failed");

        let results = aggregator.into_results();
        assert_eq!(results.len(), 3);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i);
        }
        assert_eq!(results[0].status, RecordStatus::Success);
        assert_eq!(results[1].status, RecordStatus::Error);
        assert_eq!(results[1].id.as_deref(), Some("order-000002"));
        assert_eq!(results[2].id, None);
    }

    #[test]
    fn test_unfilled_slot_becomes_error_entry() {
        let mut aggregator = ResultAggregator::new(2);
        aggregator.success(0, "order-000001".to_string());

        let results = aggregator.into_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].status, RecordStatus::Error);
        assert!(results[1].message.as_ref().unwrap().contains("no outcome"));
    }
}
