//! LMDB-backed local store.
//!
//! Each collection is one key, `<namespace>:v<version>:<collection>`, whose
//! value is the JSON array of that collection's records. A second named
//! database keeps the set of keys written so far, so export and clear never
//! scan the key space.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::app_response::{AppResponse, AppResult};
use crate::clock::{iso_timestamp, next_timestamp, Clock, SystemClock};
use crate::config::StoreConfig;
use crate::local_db_model::{LocalRecord, RecordDraft};

const RECORDS_DB: &str = "records";
const INDEX_DB: &str = "collections";
const INDEX_KEY: &str = "keys";

pub struct LocalStore {
    env: Environment,
    records: Database,
    index: Database,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
}

impl LocalStore {
    /// Shorthand for a store at `name` with the default namespace and version.
    pub fn init(name: impl AsRef<Path>) -> AppResult<Self> {
        Self::open(StoreConfig::new(name.as_ref()))
    }

    pub fn open(config: StoreConfig) -> AppResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let dir = config.lmdb_dir();
        std::fs::create_dir_all(&dir)?;

        info!("Opening local store at {}", dir.display());

        let env = Environment::new()
            .set_max_dbs(2)
            .set_map_size(config.map_size_bytes())
            .open(&dir)?;
        let records = env.create_db(Some(RECORDS_DB), DatabaseFlags::empty())?;
        let index = env.create_db(Some(INDEX_DB), DatabaseFlags::empty())?;

        Ok(Self {
            env,
            records,
            index,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn key_for(&self, collection: &str) -> String {
        self.config.key_for(collection)
    }

    /// Records of `collection` in stored order. A missing key, a payload that
    /// is not JSON, or a payload that is not an array all read as empty.
    ///
    /// Object entries without a usable `id`, `createdAt` or `updatedAt` are
    /// repaired and the repair is written back, so their ids stay stable.
    /// Entries that are not objects are not records; they are skipped here
    /// but kept in storage.
    pub fn load(&self, collection: &str) -> AppResult<Vec<LocalRecord>> {
        let entries = self.load_entries(collection)?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Record(record) => Some(record),
                Entry::Raw(_) => None,
            })
            .collect())
    }

    /// Replaces the whole collection in a single write.
    pub fn save(&self, collection: &str, records: &[LocalRecord]) -> AppResult<()> {
        let json = serde_json::to_string(records)?;
        self.write_entries(vec![(self.key_for(collection), json)])
    }

    /// Merges into the record named by `draft.id`, or appends a new record
    /// with a fresh identifier when there is no id or it is unknown.
    pub fn upsert(&self, collection: &str, draft: RecordDraft) -> AppResult<LocalRecord> {
        let mut entries = self.load_entries(collection)?;

        let existing = match draft.id.as_deref() {
            Some(id) => entries
                .iter_mut()
                .filter_map(Entry::record_mut)
                .find(|r| r.id == id),
            None => None,
        };

        let saved = match existing {
            Some(existing) => {
                existing.merge(draft.fields);
                existing.updated_at =
                    next_timestamp(self.clock.as_ref(), Some(existing.updated_at.as_str()));
                debug!("Updated {} in {collection}", existing.id);
                existing.clone()
            }
            None => {
                let now = iso_timestamp(self.clock.now());
                let record = LocalRecord {
                    id: fresh_id(&entries),
                    created_at: now.clone(),
                    updated_at: now,
                    fields: draft.fields,
                };
                debug!("Created {} in {collection}", record.id);
                entries.push(Entry::Record(record.clone()));
                record
            }
        };

        self.save_entries(collection, &entries)?;
        Ok(saved)
    }

    /// Returns whether a record was removed. Unknown ids are not an error.
    pub fn remove(&self, collection: &str, id: &str) -> AppResult<bool> {
        let mut entries = self.load_entries(collection)?;
        let before = entries.len();
        entries.retain(|e| !matches!(e, Entry::Record(r) if r.id == id));

        if entries.len() == before {
            debug!("Nothing to remove for {id} in {collection}");
            return Ok(false);
        }

        self.save_entries(collection, &entries)?;
        Ok(true)
    }

    /// Storage keys under this store's namespace, from the index.
    pub fn collections(&self) -> AppResult<Vec<String>> {
        let txn = self.env.begin_ro_txn()?;
        let keys = read_index(&txn, self.index)?;
        let prefix = self.config.namespace_prefix();
        Ok(keys.into_iter().filter(|k| k.starts_with(&prefix)).collect())
    }

    /// Pretty JSON object mapping every namespaced key to its parsed value.
    pub fn export_all(&self) -> AppResult<String> {
        let txn = self.env.begin_ro_txn()?;
        let prefix = self.config.namespace_prefix();
        let mut out = Map::new();

        for key in read_index(&txn, self.index)? {
            if !key.starts_with(&prefix) {
                continue;
            }
            let value = match txn.get(self.records, &key) {
                Ok(bytes) => serde_json::from_slice(bytes).unwrap_or(JsonValue::Null),
                Err(lmdb::Error::NotFound) => JsonValue::Null,
                Err(e) => return Err(e.into()),
            };
            out.insert(key, value);
        }

        info!("Exported {} collection key(s)", out.len());
        Ok(serde_json::to_string_pretty(&JsonValue::Object(out))?)
    }

    /// Writes every namespaced key found in `blob` verbatim. Keys outside the
    /// namespace are ignored. Nothing is written unless `blob` is a JSON
    /// object. Returns how many keys were written.
    pub fn import_all(&self, blob: &str) -> AppResult<usize> {
        let parsed: JsonValue = serde_json::from_str(blob)?;
        let object = match parsed {
            JsonValue::Object(object) => object,
            _ => {
                return Err(AppResponse::ValidationError(
                    "Import file must contain a JSON object keyed by storage key".to_string(),
                ))
            }
        };

        let prefix = self.config.namespace_prefix();
        let mut entries = Vec::new();
        for (key, value) in object {
            if !key.starts_with(&prefix) {
                debug!("Skipping foreign key {key} during import");
                continue;
            }
            entries.push((key, serde_json::to_string(&value)?));
        }

        let count = entries.len();
        self.write_entries(entries)?;
        info!("Imported {count} collection key(s)");
        Ok(count)
    }

    /// Removes every key under this store's namespace.
    pub fn clear_all(&self) -> AppResult<usize> {
        let mut txn = self.env.begin_rw_txn()?;
        let mut keys = read_index(&txn, self.index)?;
        let prefix = self.config.namespace_prefix();

        let doomed: Vec<String> = keys.iter().filter(|k| k.starts_with(&prefix)).cloned().collect();
        for key in &doomed {
            match txn.del(self.records, key, None) {
                Ok(()) | Err(lmdb::Error::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
            keys.remove(key);
        }

        write_index(&mut txn, self.index, &keys)?;
        txn.commit()?;

        info!("Cleared {} collection key(s)", doomed.len());
        Ok(doomed.len())
    }

    /// Releases the environment. Dropping the store has the same effect.
    pub fn close(self) {
        info!("Closing local store at {}", self.config.lmdb_dir().display());
    }

    /// Deletes the store directory and reopens an empty store in its place.
    pub fn reset(self) -> AppResult<Self> {
        let config = self.config.clone();
        let clock = Arc::clone(&self.clock);
        drop(self);

        let dir = config.lmdb_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        info!("Reset local store at {}", dir.display());
        Self::open_with_clock(config, clock)
    }

    fn load_entries(&self, collection: &str) -> AppResult<Vec<Entry>> {
        let key = self.key_for(collection);
        let raw = match self.read_raw(&key)? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };

        let items = match serde_json::from_str::<JsonValue>(&raw) {
            Ok(JsonValue::Array(items)) => items,
            Ok(_) => {
                warn!("Ignoring non-array payload under {key}");
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!("Ignoring malformed payload under {key}: {e}");
                return Ok(Vec::new());
            }
        };

        let now = iso_timestamp(self.clock.now());
        let mut repaired = 0;
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let mut object = match item {
                JsonValue::Object(object) => object,
                other => {
                    warn!("Keeping non-record entry in {key} untouched");
                    entries.push(Entry::Raw(other));
                    continue;
                }
            };

            if repair_system_fields(&mut object, &now) {
                repaired += 1;
            }
            let value = JsonValue::Object(object);
            match serde_json::from_value::<LocalRecord>(value.clone()) {
                Ok(record) => entries.push(Entry::Record(record)),
                Err(e) => {
                    warn!("Keeping unreadable entry in {key} untouched: {e}");
                    entries.push(Entry::Raw(value));
                }
            }
        }

        if repaired > 0 {
            info!("Repaired system fields of {repaired} record(s) in {key}");
            self.save_entries(collection, &entries)?;
        }
        Ok(entries)
    }

    fn save_entries(&self, collection: &str, entries: &[Entry]) -> AppResult<()> {
        let json = serde_json::to_string(entries)?;
        self.write_entries(vec![(self.key_for(collection), json)])
    }

    fn read_raw(&self, key: &str) -> AppResult<Option<String>> {
        let txn = self.env.begin_ro_txn()?;
        let raw = match txn.get(self.records, &key) {
            Ok(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(raw)
    }

    fn write_entries(&self, entries: Vec<(String, String)>) -> AppResult<()> {
        let mut txn = self.env.begin_rw_txn()?;
        let mut keys = read_index(&txn, self.index)?;
        let before = keys.len();

        for (key, json) in &entries {
            txn.put(self.records, key, json, WriteFlags::empty())?;
            keys.insert(key.clone());
        }

        if keys.len() != before {
            write_index(&mut txn, self.index, &keys)?;
        }
        txn.commit()?;
        Ok(())
    }
}

fn read_index<T: Transaction>(txn: &T, index: Database) -> AppResult<BTreeSet<String>> {
    match txn.get(index, &INDEX_KEY) {
        Ok(bytes) => serde_json::from_slice(bytes).map_err(|e| {
            AppResponse::DatabaseError(format!("Collection index is unreadable: {e}"))
        }),
        Err(lmdb::Error::NotFound) => Ok(BTreeSet::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_index(
    txn: &mut lmdb::RwTransaction<'_>,
    index: Database,
    keys: &BTreeSet<String>,
) -> AppResult<()> {
    let json = serde_json::to_string(keys)?;
    txn.put(index, &INDEX_KEY, &json, WriteFlags::empty())?;
    Ok(())
}

/// One element of a stored collection array. Non-record values are carried
/// through writes unchanged.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Entry {
    Record(LocalRecord),
    Raw(JsonValue),
}

impl Entry {
    fn record_mut(&mut self) -> Option<&mut LocalRecord> {
        match self {
            Entry::Record(record) => Some(record),
            Entry::Raw(_) => None,
        }
    }
}

/// Gives an entry a string `id` and both timestamps. Numeric ids keep their
/// value as text; missing or empty ids get a fresh identifier. Returns
/// whether anything changed.
fn repair_system_fields(object: &mut Map<String, JsonValue>, now: &str) -> bool {
    let mut changed = false;

    let id = match object.get("id") {
        Some(JsonValue::String(id)) if !id.is_empty() => None,
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => Some(Uuid::new_v4().to_string()),
    };
    if let Some(id) = id {
        object.insert("id".to_string(), JsonValue::String(id));
        changed = true;
    }

    if !matches!(object.get("createdAt"), Some(JsonValue::String(_))) {
        object.insert("createdAt".to_string(), JsonValue::String(now.to_string()));
        changed = true;
    }
    if !matches!(object.get("updatedAt"), Some(JsonValue::String(_))) {
        let created = object.get("createdAt").cloned().unwrap_or(JsonValue::Null);
        object.insert("updatedAt".to_string(), created);
        changed = true;
    }
    changed
}

/// Random v4 identifier not already used in `existing`.
fn fresh_id(existing: &[Entry]) -> String {
    loop {
        let id = Uuid::new_v4().to_string();
        if !existing
            .iter()
            .any(|e| matches!(e, Entry::Record(r) if r.id == id))
        {
            return id;
        }
    }
}
