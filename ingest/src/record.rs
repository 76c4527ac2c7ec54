//! Type-erased record model.
//!
//! A [`Record`] is one input object: an immutable record-type name, an
//! ordered field map, and zero or more named child collections resolved
//! against the type's schema-declared relationships. Construction performs
//! no permission or store validation; it only separates scalar fields from
//! child collections.

use crate::protocol::ParentPayload;
use datastore::schema::RecordSchema;
use datastore::store::{RecordStore, Row};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordParseError {
    #[error("Child collection {relationship} must be an array")]
    ChildrenNotAnArray { relationship: String },

    #[error("Element {index} of child collection {relationship} is not an object")]
    ChildNotAnObject { relationship: String, index: usize },

    #[error("Child collection {relationship} nests another child collection; only one parent-child level is supported")]
    NestedChildCollection { relationship: String },
}

/// The children arriving under one relationship key of a parent payload.
#[derive(Clone, Debug)]
pub struct ChildCollection {
    pub relationship: String,
    pub child_type: String,
    pub parent_link_field: String,
    pub records: Vec<Record>,
}

#[derive(Clone, Debug)]
pub struct Record {
    type_name: String,
    fields: IndexMap<String, JsonValue>,
    children: Vec<ChildCollection>,
}

impl Record {
    pub fn new(
        type_name: impl Into<String>,
        fields: IndexMap<String, JsonValue>,
        children: Vec<ChildCollection>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
            children,
        }
    }

    /// Builds a record from a decoded parent payload.
    ///
    /// Keys naming a relationship declared on `schema` become child
    /// collections; every other key is a scalar field, payload order
    /// preserved. Children must be flat: a child payload carrying one of its
    /// own declared relationships is rejected, keeping the model to a single
    /// parent→child level.
    pub fn from_payload(
        store: &dyn RecordStore,
        schema: &RecordSchema,
        payload: ParentPayload,
    ) -> Result<Self, RecordParseError> {
        let mut fields = IndexMap::new();
        let mut children = Vec::new();

        for (key, value) in payload {
            let Some(rel) = schema.relationship(&key) else {
                fields.insert(key, value);
                continue;
            };

            let JsonValue::Array(elements) = value else {
                return Err(RecordParseError::ChildrenNotAnArray {
                    relationship: key,
                });
            };

            let child_schema = store.schema(&rel.child_type);
            let mut records = Vec::with_capacity(elements.len());
            for (index, element) in elements.into_iter().enumerate() {
                let JsonValue::Object(child_payload) = element else {
                    return Err(RecordParseError::ChildNotAnObject {
                        relationship: key,
                        index,
                    });
                };
                let mut child_fields = IndexMap::new();
                for (child_key, child_value) in child_payload {
                    let nested = child_schema
                        .as_deref()
                        .and_then(|s| s.relationship(&child_key))
                        .is_some();
                    if nested && child_value.is_array() {
                        return Err(RecordParseError::NestedChildCollection {
                            relationship: key,
                        });
                    }
                    child_fields.insert(child_key, child_value);
                }
                records.push(Record::new(rel.child_type.clone(), child_fields, vec![]));
            }

            children.push(ChildCollection {
                relationship: rel.name.clone(),
                child_type: rel.child_type.clone(),
                parent_link_field: rel.parent_link_field.clone(),
                records,
            });
        }

        Ok(Record::new(schema.type_name.clone(), fields, children))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: JsonValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn children(&self) -> &[ChildCollection] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [ChildCollection] {
        &mut self.children
    }

    /// Field values as a store row.
    pub fn to_row(&self) -> Row {
        self.fields.clone()
    }
}
