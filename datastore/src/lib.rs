pub mod memory;
pub mod permissions;
pub mod schema;
pub mod store;

pub use memory::MemoryStore;
pub use permissions::{PermissionEngine, Principal, ProfilePermissions};
pub use schema::{FieldDef, RecordSchema, RelationshipDef, SchemaCatalog};
pub use store::{RecordId, RecordStore, Row, StoreError, WriteOutcome};
