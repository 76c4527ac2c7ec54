use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Errors that abort a whole ingest request.
///
/// Per-record data problems never surface here; they land in the record's
/// own result entry. Everything in this enum is a request-level failure.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Batch of {got} records exceeds the limit of {limit}")]
    BatchTooLarge { got: usize, limit: usize },

    #[error("Profile {profile} may not modify {record_type}")]
    TypeNotWritable {
        profile: String,
        record_type: String,
    },

    #[error("Profile {profile} may not write {record_type}.{field}")]
    FieldNotWritable {
        profile: String,
        record_type: String,
        field: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Response serialization error: {0}")]
    ResponseSerializationError(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] datastore::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// True for permission-guard failures, which map to HTTP 403.
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            GatewayError::TypeNotWritable { .. } | GatewayError::FieldNotWritable { .. }
        )
    }
}
