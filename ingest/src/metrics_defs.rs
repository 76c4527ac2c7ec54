#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const BATCH_DURATION: MetricDef = MetricDef {
    name: "ingest.batch.duration",
    metric_type: MetricType::Histogram,
    description: "Batch processing duration in seconds. Tagged with record_type.",
};

pub const RECORDS_PROCESSED: MetricDef = MetricDef {
    name: "ingest.records.processed",
    metric_type: MetricType::Counter,
    description: "Parent records processed. Tagged with record_type, status.",
};

pub const REQUESTS_REJECTED: MetricDef = MetricDef {
    name: "ingest.requests.rejected",
    metric_type: MetricType::Counter,
    description: "Requests rejected before processing. Tagged with reason.",
};

pub const ALL_METRICS: &[MetricDef] = &[BATCH_DURATION, RECORDS_PROCESSED, REQUESTS_REJECTED];
