//! Record type shared by both partitions, the view and the remote.

use crate::{Fields, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field stamped by the remote when it durably accepts a record.
pub const SYNCED_AT_FIELD: &str = "syncedAt";

/// A record: a mandatory identity plus an opaque bag of named fields.
///
/// Serialized flat, so `{"id": "7", "name": "A"}` is a record with id `7`
/// and one field. The engine only ever inspects `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier (provisional or committed)
    pub id: RecordId,
    /// Field payload, excluding `id`
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Create a record. An `id` key inside `fields` is discarded.
    pub fn new(id: impl Into<RecordId>, mut fields: Fields) -> Self {
        fields.remove("id");
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a record from a JSON object carrying its own `id`.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Object(mut map) => match map.remove("id") {
                Some(Value::String(id)) if !id.is_empty() => Ok(Self::new(id, map)),
                Some(other) => Err(crate::Error::InvalidRecord(format!(
                    "id must be a non-empty string, got {other}"
                ))),
                None => Err(crate::Error::InvalidRecord("missing id".into())),
            },
            other => Err(crate::Error::InvalidRecord(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    /// Look up a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field value, returning the record for chaining.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if name != "id" {
            self.fields.insert(name, value.into());
        }
        self
    }

    /// Shallow merge: every field in `patch` overwrites the same field here,
    /// fields not named in `patch` are kept.
    pub fn merge_fields(&mut self, patch: &Fields) {
        for (name, value) in patch {
            if name != "id" {
                self.fields.insert(name.clone(), value.clone());
            }
        }
    }

    /// The record as one flat JSON object including `id`.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(map)
    }
}
