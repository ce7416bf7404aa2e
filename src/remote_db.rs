//! Hosted record-table store.
//!
//! Rows live in one table shared by every collection:
//!
//! ```json
//! { "id": "…", "user_id": "…", "created_at": "…", "collection": "mood",
//!   "date": "2024-01-01", "data": { "date": "2024-01-01", "rating": 8 } }
//! ```
//!
//! `date` is written twice: the top-level column is what the backend
//! sorts on, the copy inside `data` keeps the field map complete. Callers get
//! rows back flattened as [`RemoteRecord`]s.
//!
//! Every operation takes the caller's [`Session`] explicitly. Without one,
//! reads come back empty and writes fail with
//! [`AppResponse::Unauthorized`].

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::app_response::{AppResponse, AppResult};
use crate::config::{RemoteConfig, DEFAULT_IMPORT_CHUNK};
use crate::local_db_model::{FieldMap, StoredRecord};

/// Keys owned by the table itself; never stored inside `data`.
const SYSTEM_KEYS: [&str; 7] = [
    "id",
    "user_id",
    "created_at",
    "updated_at",
    "collection",
    "createdAt",
    "updatedAt",
];

/// An authenticated user context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            email: None,
        }
    }
}

/// A row as the table returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub id: String,
    pub created_at: String,
    pub collection: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub data: Option<FieldMap>,
}

/// A row to insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRow {
    pub user_id: String,
    pub collection: String,
    pub date: Option<String>,
    pub data: FieldMap,
}

/// Full replacement of a row's field map and sort date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowPatch {
    pub date: Option<String>,
    pub data: FieldMap,
}

/// The hosted table. Implementations must scope rows to the session's user,
/// order listings by `date` desc then `created_at` desc, and generate `id`
/// and `created_at` on insert.
pub trait RecordTable {
    fn select(&self, session: &Session, collection: &str) -> AppResult<Vec<RemoteRow>>;

    /// Inserts all rows or none of them.
    fn insert(&self, session: &Session, rows: &[NewRow]) -> AppResult<Vec<RemoteRow>>;

    fn update(&self, session: &Session, id: &str, patch: &RowPatch) -> AppResult<RemoteRow>;

    /// Deleting an id that matches nothing is not an error.
    fn delete(&self, session: &Session, id: &str) -> AppResult<()>;
}

/// A row with its field map merged into the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    pub created_at: String,
    pub collection: String,
    /// User fields, always including `date` (possibly `null`).
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl RemoteRecord {
    /// Table columns take precedence over same-named keys inside `data`.
    pub fn flatten(row: RemoteRow) -> Self {
        let mut fields = row.data.unwrap_or_default();
        for key in SYSTEM_KEYS {
            fields.remove(key);
        }
        fields.insert(
            "date".to_string(),
            row.date.map(JsonValue::String).unwrap_or(JsonValue::Null),
        );
        Self {
            id: row.id,
            created_at: row.created_at,
            collection: row.collection,
            fields,
        }
    }

    pub fn date(&self) -> Option<&str> {
        self.fields.get("date").and_then(JsonValue::as_str)
    }
}

impl StoredRecord for RemoteRecord {
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
        map.insert("created_at".into(), JsonValue::String(self.created_at.clone()));
        map.insert("collection".into(), JsonValue::String(self.collection.clone()));
        map
    }
}

pub struct RemoteStore<T: RecordTable> {
    table: T,
    chunk_size: usize,
}

impl<T: RecordTable> RemoteStore<T> {
    pub fn new(table: T) -> Self {
        Self {
            table,
            chunk_size: DEFAULT_IMPORT_CHUNK,
        }
    }

    /// Store over `table` using the import chunk size from `config`.
    pub fn from_config(table: T, config: &RemoteConfig) -> Self {
        Self::new(table).with_chunk_size(config.import_chunk_size)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Empty without a session.
    pub fn list_records(
        &self,
        session: Option<&Session>,
        collection: &str,
    ) -> AppResult<Vec<RemoteRecord>> {
        let Some(session) = session else {
            debug!("No session; listing {collection} as empty");
            return Ok(Vec::new());
        };
        let rows = self.table.select(session, collection)?;
        Ok(rows.into_iter().map(RemoteRecord::flatten).collect())
    }

    pub fn add_record(
        &self,
        session: Option<&Session>,
        collection: &str,
        values: FieldMap,
    ) -> AppResult<RemoteRecord> {
        let session = session.ok_or_else(AppResponse::not_signed_in)?;
        let row = new_row(session, collection, values);

        let mut inserted = self.table.insert(session, std::slice::from_ref(&row))?;
        let stored = inserted.pop().ok_or_else(|| {
            AppResponse::DatabaseError("Insert returned no row".to_string())
        })?;
        Ok(RemoteRecord::flatten(stored))
    }

    /// Replaces the field map and sort date of row `id`. Ownership is left to
    /// the table's row policy.
    pub fn update_record(
        &self,
        session: Option<&Session>,
        id: &str,
        values: FieldMap,
    ) -> AppResult<RemoteRecord> {
        let session = session.ok_or_else(AppResponse::not_signed_in)?;
        let data = strip_system_keys(values);
        let patch = RowPatch {
            date: date_column(&data),
            data,
        };
        let row = self.table.update(session, id, &patch)?;
        Ok(RemoteRecord::flatten(row))
    }

    /// Unconditional delete by id; no existence or ownership check here.
    pub fn delete_record(&self, session: Option<&Session>, id: &str) -> AppResult<()> {
        let session = session.ok_or_else(AppResponse::not_signed_in)?;
        self.table.delete(session, id)
    }

    /// Pretty JSON array of the flattened listing for one collection.
    pub fn export_collection(&self, session: Option<&Session>, collection: &str) -> AppResult<String> {
        let records = self.list_records(session, collection)?;
        Ok(serde_json::to_string_pretty(&records)?)
    }

    /// Inserts every element of the JSON array `blob` as a new row of
    /// `collection`, in chunks. Chunks are committed one by one: when a chunk
    /// fails the earlier ones stay, and the error says how many rows landed.
    pub fn import_collection(
        &self,
        session: Option<&Session>,
        collection: &str,
        blob: &str,
    ) -> AppResult<usize> {
        let session = session.ok_or_else(AppResponse::not_signed_in)?;

        let parsed: JsonValue = serde_json::from_str(blob)?;
        let JsonValue::Array(items) = parsed else {
            return Err(AppResponse::ValidationError("Invalid file format".to_string()));
        };

        let mut rows = Vec::with_capacity(items.len());
        for (position, item) in items.into_iter().enumerate() {
            let JsonValue::Object(values) = item else {
                return Err(AppResponse::ValidationError(format!(
                    "Invalid file format: element {position} is not an object"
                )));
            };
            rows.push(new_row(session, collection, values));
        }

        let mut committed = 0;
        for chunk in rows.chunks(self.chunk_size) {
            if let Err(e) = self.table.insert(session, chunk) {
                warn!("Import into {collection} stopped after {committed} row(s): {e}");
                return Err(e.context(&format!(
                    "import stopped after {committed} of {} row(s)",
                    rows.len()
                )));
            }
            committed += chunk.len();
        }

        info!("Imported {committed} row(s) into {collection}");
        Ok(committed)
    }
}

fn new_row(session: &Session, collection: &str, values: FieldMap) -> NewRow {
    let data = strip_system_keys(values);
    NewRow {
        user_id: session.user_id.clone(),
        collection: collection.to_string(),
        date: date_column(&data),
        data,
    }
}

fn strip_system_keys(mut values: FieldMap) -> FieldMap {
    for key in SYSTEM_KEYS {
        values.remove(key);
    }
    values
}

/// Value for the sortable `date` column; empty or non-text dates are null.
/// An empty date is stored as null rather than `""`, so undated rows sort first.
fn date_column(values: &FieldMap) -> Option<String> {
    values
        .get("date")
        .and_then(JsonValue::as_str)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}
