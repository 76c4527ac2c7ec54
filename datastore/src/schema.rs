//! Record-type schemas.
//!
//! A schema declares the fields a record type carries and, explicitly, the
//! child relationships hanging off it: each relationship names the child
//! record type and the field on the child that links back to the parent.
//! The gateway never infers relationships from payload shape; only declared
//! relationship names are treated as child collections.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Duplicate record type: {0}")]
    DuplicateType(String),

    #[error("Duplicate field {field} on record type {record_type}")]
    DuplicateField { record_type: String, field: String },

    #[error("Relationship {relationship} on {record_type} references unknown child type: {child_type}")]
    UnknownChildType {
        record_type: String,
        relationship: String,
        child_type: String,
    },

    #[error("Relationship {relationship} on {record_type} links via {parent_link_field}, which is not a field of {child_type}")]
    UnknownParentLinkField {
        record_type: String,
        relationship: String,
        child_type: String,
        parent_link_field: String,
    },

    #[error("Duplicate relationship name {relationship} on record type {record_type}")]
    DuplicateRelationship {
        record_type: String,
        relationship: String,
    },
}

/// A single field declaration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FieldDef {
    pub name: String,
    /// Required fields must be present and non-null on every write.
    #[serde(default)]
    pub required: bool,
}

/// A declared parent→child relationship.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RelationshipDef {
    /// Payload key under which child objects arrive (e.g. "lineItems").
    pub name: String,
    /// Record type of the children.
    pub child_type: String,
    /// Field on the child that is stamped with the parent's id.
    pub parent_link_field: String,
}

/// Schema for one record type.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RecordSchema {
    pub type_name: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl RecordSchema {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Iterator over fields that must be present and non-null on writes.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }

    /// Looks up a relationship by its payload key. Exact, case-sensitive.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

/// All record-type schemas known to the store, built once at startup.
#[derive(Clone, Debug, Default)]
pub struct SchemaCatalog {
    types: HashMap<String, Arc<RecordSchema>>,
}

impl SchemaCatalog {
    /// Builds a catalog from schema declarations, validating cross-type
    /// references eagerly so misconfiguration fails at startup.
    pub fn new(schemas: Vec<RecordSchema>) -> Result<Self, SchemaError> {
        let mut types: HashMap<String, Arc<RecordSchema>> = HashMap::new();
        for schema in schemas {
            let mut seen_fields = Vec::new();
            for field in &schema.fields {
                if seen_fields.contains(&&field.name) {
                    return Err(SchemaError::DuplicateField {
                        record_type: schema.type_name.clone(),
                        field: field.name.clone(),
                    });
                }
                seen_fields.push(&field.name);
            }
            if types
                .insert(schema.type_name.clone(), Arc::new(schema.clone()))
                .is_some()
            {
                return Err(SchemaError::DuplicateType(schema.type_name));
            }
        }

        // Relationship targets have to resolve against the full catalog
        for schema in types.values() {
            let mut seen = Vec::new();
            for rel in &schema.relationships {
                if seen.contains(&&rel.name) {
                    return Err(SchemaError::DuplicateRelationship {
                        record_type: schema.type_name.clone(),
                        relationship: rel.name.clone(),
                    });
                }
                seen.push(&rel.name);

                let child = types.get(&rel.child_type).ok_or_else(|| {
                    SchemaError::UnknownChildType {
                        record_type: schema.type_name.clone(),
                        relationship: rel.name.clone(),
                        child_type: rel.child_type.clone(),
                    }
                })?;
                if !child.has_field(&rel.parent_link_field) {
                    return Err(SchemaError::UnknownParentLinkField {
                        record_type: schema.type_name.clone(),
                        relationship: rel.name.clone(),
                        child_type: rel.child_type.clone(),
                        parent_link_field: rel.parent_link_field.clone(),
                    });
                }
            }
        }

        Ok(Self { types })
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<RecordSchema>> {
        self.types.get(type_name).cloned()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.types.keys()
    }
}
