//! Record shapes shared by both stores.
//!
//! The local store keeps records as flat JSON objects:
//!
//! ```json
//! { "id": "5b0c…", "createdAt": "2024-01-01T08:00:00.000Z",
//!   "updatedAt": "2024-01-01T08:00:00.000Z", "date": "2024-01-01", "rating": 8 }
//! ```
//!
//! [`LocalRecord`] models that object with the system attributes lifted into
//! typed fields and every user field kept in [`LocalRecord::fields`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// User-defined field values keyed by field name.
pub type FieldMap = Map<String, JsonValue>;

/// Read access every stored record offers, whatever backend produced it.
pub trait StoredRecord: Clone {
    fn id(&self) -> &str;

    fn field(&self, name: &str) -> Option<&JsonValue>;

    /// Sort key used by list views: the `date` field, else the creation time.
    fn sort_key(&self) -> String;

    /// The record as one flat JSON object, ready to seed a form draft.
    fn to_flat_map(&self) -> FieldMap;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl LocalRecord {
    pub fn date(&self) -> Option<&str> {
        self.fields.get("date").and_then(JsonValue::as_str)
    }

    /// Overwrites every field present in `patch`; absent fields are kept.
    pub fn merge(&mut self, patch: FieldMap) {
        for (key, value) in patch {
            if is_local_system_key(&key) {
                continue;
            }
            self.fields.insert(key, value);
        }
    }
}

impl StoredRecord for LocalRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    fn sort_key(&self) -> String {
        match self.date() {
            Some(date) if !date.is_empty() => date.to_string(),
            _ => self.created_at.clone(),
        }
    }

    fn to_flat_map(&self) -> FieldMap {
        let mut map = self.fields.clone();
        map.insert("id".into(), JsonValue::String(self.id.clone()));
        map.insert("createdAt".into(), JsonValue::String(self.created_at.clone()));
        map.insert("updatedAt".into(), JsonValue::String(self.updated_at.clone()));
        map
    }
}

/// Input to [`LocalStore::upsert`](crate::local_db_state::LocalStore::upsert):
/// an optional identifier plus the field values to write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDraft {
    pub id: Option<String>,
    pub fields: FieldMap,
}

impl RecordDraft {
    pub fn new(fields: FieldMap) -> Self {
        Self { id: None, fields }
    }

    pub fn with_id(id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id: Some(id.into()),
            fields,
        }
    }

    /// Splits a flat value map: a non-empty string `id` becomes the draft id,
    /// timestamps are dropped, everything else is a field.
    pub fn from_flat(mut values: FieldMap) -> Self {
        let id = match values.remove("id") {
            Some(JsonValue::String(id)) if !id.is_empty() => Some(id),
            _ => None,
        };
        values.retain(|key, _| !is_local_system_key(key));
        Self { id, fields: values }
    }
}

fn is_local_system_key(key: &str) -> bool {
    matches!(key, "id" | "createdAt" | "updatedAt")
}
