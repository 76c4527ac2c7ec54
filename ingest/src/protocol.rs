//! Wire types for the ingest endpoint.
//!
//! Request: `{"externalIdField": "...", "data": [{...}, ...]}` where each
//! data element is a parent payload of scalar fields plus relationship-named
//! keys holding arrays of child objects.
//!
//! Response: `{"results": [{"index": 0, "status": "Success", "id": "...",
//! "message": null}, ...]}`, one entry per input record, input order
//! preserved.

use crate::results::RecordResult;
use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One parent payload as received on the wire, key order preserved.
pub type ParentPayload = Map<String, JsonValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Field used to match existing records for upsert. Type-specific and
    /// assumed unique-indexed in the store.
    #[serde(rename = "externalIdField")]
    pub external_id_field: String,

    /// Parent payloads, all of the record type named in the request path.
    pub data: Vec<ParentPayload>,
}

impl IngestRequest {
    pub fn from_bytes(bytes: &Bytes) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub results: Vec<RecordResult>,
}

impl IngestResponse {
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Bytes::from(json))
    }
}
