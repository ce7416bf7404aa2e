//! # Integration Test Suite for Wellbeing Core
//!
//! Exercises the stores end to end, the way an embedding app drives them.
//!
//! ## Test Categories
//!
//! ### 1. Local Store Tests
//! - Upsert create/merge, identifier uniqueness, timestamp ordering
//! - Soft failures on malformed payloads
//! - Export/import, clear, namespace isolation, reset
//!
//! ### 2. FFI Function Tests
//! - Every `extern "C"` function with success and error scenarios
//! - Null pointers, invalid UTF-8, malformed JSON
//!
//! ### 3. Remote Store Tests
//! - Session gating, owner scoping, ordering
//! - Chunked import with partial failure
//!
//! ### 4. Shell Tests
//! - Collection switching, save in create/edit mode, confirmations,
//!   import notices and reset, against both backends
//!
//! ### 5. Concurrency Tests
//! - Parallel readers over one local store
//!
//! Every test gets its own temporary directory, so tests never share a store.
//!
//! ```bash
//! cargo test test_ffi_      # FFI tests
//! cargo test test_remote_   # Remote store tests
//! cargo test test_shell_    # Shell tests
//! ```

#[cfg(test)]
pub mod tests {
    use std::cell::Cell;
    use std::ffi::{CStr, CString};
    use std::os::raw::c_char;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value as JsonValue};
    use tempfile::TempDir;

    use crate::app_response::{AppResponse, AppResult};
    use crate::app_shell::{AppShell, Notice};
    use crate::clock::{Clock, ManualClock};
    use crate::config::{RemoteConfig, StoreConfig};
    use crate::local_db_model::{FieldMap, LocalRecord, RecordDraft};
    use crate::local_db_state::LocalStore;
    use crate::memory_table::MemoryTable;
    use crate::record_list::ListAction;
    use crate::remote_db::{RemoteStore, Session};
    use crate::store::{RecordStore, RemoteWorkspace};

    fn fields(value: JsonValue) -> FieldMap {
        value.as_object().cloned().unwrap()
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()))
    }

    fn open_store(dir: &TempDir) -> LocalStore {
        LocalStore::open(StoreConfig::new(dir.path().join("wellbeing"))).unwrap()
    }

    fn open_store_with_clock(dir: &TempDir, clock: Arc<dyn Clock>) -> LocalStore {
        LocalStore::open_with_clock(StoreConfig::new(dir.path().join("wellbeing")), clock).unwrap()
    }

    /// Stores `value` verbatim under a collection key.
    fn write_value(store: &LocalStore, collection: &str, value: JsonValue) {
        let mut blob = FieldMap::new();
        blob.insert(store.key_for(collection), value);
        store.import_all(&JsonValue::Object(blob).to_string()).unwrap();
    }

    fn take_response(ptr: *const c_char) -> AppResponse {
        assert!(!ptr.is_null(), "Response pointer should not be null");
        let json = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        crate::free_response(ptr);
        serde_json::from_str(&json).unwrap()
    }

    fn remote_store(clock: Arc<dyn Clock>) -> RemoteStore<MemoryTable> {
        RemoteStore::new(MemoryTable::new(clock))
    }

    // ---------------------------------------------------------------
    // Local store
    // ---------------------------------------------------------------

    #[test]
    fn test_upsert_creates_then_merges() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let store = open_store_with_clock(&dir, clock.clone());

        let created = store
            .upsert("mood", RecordDraft::new(fields(json!({"date": "2024-03-01", "rating": 6, "tags": "calm"}))))
            .unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.created_at, "2024-03-01T09:00:00.000Z");
        assert_eq!(created.created_at, created.updated_at);

        clock.advance(Duration::minutes(5));
        let merged = store
            .upsert("mood", RecordDraft::with_id(created.id.clone(), fields(json!({"rating": 9}))))
            .unwrap();

        assert_eq!(merged.id, created.id);
        assert_eq!(merged.created_at, created.created_at);
        assert_eq!(merged.updated_at, "2024-03-01T09:05:00.000Z");
        assert_eq!(merged.fields["rating"], json!(9));
        assert_eq!(merged.fields["tags"], json!("calm"));

        let all = store.load("mood").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], merged);
    }

    #[test]
    fn test_updated_at_strictly_increases_with_frozen_clock() {
        let dir = TempDir::new().unwrap();
        let store = open_store_with_clock(&dir, manual_clock());

        let first = store.upsert("sleep", RecordDraft::new(fields(json!({"quality": 5})))).unwrap();
        let mut previous = first.updated_at.clone();
        for quality in 6..9 {
            let next = store
                .upsert("sleep", RecordDraft::with_id(first.id.clone(), fields(json!({"quality": quality}))))
                .unwrap();
            assert!(next.updated_at > previous, "{} should sort after {}", next.updated_at, previous);
            previous = next.updated_at;
        }
    }

    #[test]
    fn test_unknown_id_appends_new_record() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let saved = store
            .upsert("fluid", RecordDraft::with_id("not-there", fields(json!({"waterMl": 250}))))
            .unwrap();
        assert_ne!(saved.id, "not-there");
        assert_eq!(store.load("fluid").unwrap().len(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for i in 0..50 {
            store.upsert("food", RecordDraft::new(fields(json!({"calories": i})))).unwrap();
        }
        let mut ids: Vec<String> = store.load("food").unwrap().into_iter().map(|r| r.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_remove_unknown_id_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let kept = store.upsert("pain", RecordDraft::new(fields(json!({"level": 3})))).unwrap();

        assert!(!store.remove("pain", "missing").unwrap());
        assert!(!store.remove("journal", "missing").unwrap());
        assert_eq!(store.load("pain").unwrap(), vec![kept.clone()]);

        assert!(store.remove("pain", &kept.id).unwrap());
        assert!(store.load("pain").unwrap().is_empty());
    }

    #[test]
    fn test_non_array_payloads_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.load("mood").unwrap().is_empty());

        write_value(&store, "mood", json!({"not": "an array"}));
        assert!(store.load("mood").unwrap().is_empty());

        write_value(&store, "sleep", json!([7, {"id": "ok", "quality": 3}]));
        let sleep = store.load("sleep").unwrap();
        assert_eq!(sleep.len(), 1);
        assert_eq!(sleep[0].id, "ok");

        // a broken collection does not block new writes
        let saved = store.upsert("mood", RecordDraft::new(fields(json!({"rating": 4})))).unwrap();
        assert_eq!(store.load("mood").unwrap(), vec![saved]);
    }

    #[test]
    fn test_imported_entries_without_string_ids_survive_writes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let blob = json!({
            "wellbeing-tracker:v1:mood": [{"id": 5, "rating": 1}, {"rating": 2}, {"rating": 3}, "stray"]
        });
        store.import_all(&blob.to_string()).unwrap();

        let loaded = store.load("mood").unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].id, "5");
        assert!(!loaded[1].id.is_empty());
        assert_ne!(loaded[1].id, loaded[2].id);
        // repaired ids are persisted, so a second read agrees
        assert_eq!(store.load("mood").unwrap(), loaded);

        store.upsert("mood", RecordDraft::new(fields(json!({"rating": 4})))).unwrap();

        let exported: JsonValue = serde_json::from_str(&store.export_all().unwrap()).unwrap();
        let entries = exported["wellbeing-tracker:v1:mood"].as_array().unwrap();
        assert_eq!(entries.len(), 5);
        let ratings: Vec<&JsonValue> = entries.iter().filter_map(|e| e.get("rating")).collect();
        assert_eq!(ratings, vec![&json!(1), &json!(2), &json!(3), &json!(4)]);
        assert!(entries.contains(&json!("stray")));

        // removing one repaired entry leaves the others alone
        assert!(store.remove("mood", &loaded[1].id).unwrap());
        assert!(!store.remove("mood", "").unwrap());
        assert_eq!(store.load("mood").unwrap().len(), 3);
    }

    #[test]
    fn test_export_import_round_trip_into_empty_store() {
        let source_dir = TempDir::new().unwrap();
        let source = open_store(&source_dir);
        let mood = source
            .upsert("mood", RecordDraft::new(fields(json!({"date": "2024-01-01", "rating": 7}))))
            .unwrap();
        let stool = source
            .upsert("stool", RecordDraft::new(fields(json!({"bristol": 4, "blood": false}))))
            .unwrap();

        let exported = source.export_all().unwrap();
        let parsed: JsonValue = serde_json::from_str(&exported).unwrap();
        assert!(parsed.get("wellbeing-tracker:v1:mood").unwrap().is_array());

        let target_dir = TempDir::new().unwrap();
        let target = open_store(&target_dir);
        assert_eq!(target.import_all(&exported).unwrap(), 2);

        assert_eq!(target.load("mood").unwrap(), vec![mood]);
        assert_eq!(target.load("stool").unwrap(), vec![stool]);
        assert_eq!(
            target.collections().unwrap(),
            vec!["wellbeing-tracker:v1:mood", "wellbeing-tracker:v1:stool"]
        );
    }

    #[test]
    fn test_import_rejects_invalid_blobs_without_writing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(matches!(
            store.import_all("definitely not json"),
            Err(AppResponse::SerializationError(_))
        ));
        assert!(matches!(
            store.import_all("[1, 2, 3]"),
            Err(AppResponse::ValidationError(_))
        ));
        assert!(store.collections().unwrap().is_empty());
    }

    #[test]
    fn test_import_ignores_foreign_namespaces() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let blob = json!({
            "wellbeing-tracker:v1:mood": [{"id": "a", "createdAt": "t", "updatedAt": "t", "rating": 2}],
            "other-app:v1:mood": [{"id": "b"}],
            "theme": "dark"
        });
        assert_eq!(store.import_all(&blob.to_string()).unwrap(), 1);
        assert_eq!(store.collections().unwrap(), vec!["wellbeing-tracker:v1:mood"]);
        assert_eq!(store.load("mood").unwrap()[0].id, "a");
    }

    #[test]
    fn test_namespaces_share_an_environment_without_mixing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared");

        {
            let tracker = LocalStore::open(StoreConfig::new(&path)).unwrap();
            tracker.upsert("mood", RecordDraft::new(fields(json!({"rating": 1})))).unwrap();
        }

        let demo = LocalStore::open(StoreConfig::new(&path).with_namespace("demo")).unwrap();
        assert!(demo.load("mood").unwrap().is_empty());
        demo.upsert("mood", RecordDraft::new(fields(json!({"rating": 2})))).unwrap();

        assert_eq!(demo.collections().unwrap(), vec!["demo:v1:mood"]);
        assert_eq!(demo.clear_all().unwrap(), 1);
        drop(demo);

        let tracker = LocalStore::open(StoreConfig::new(&path)).unwrap();
        assert_eq!(tracker.load("mood").unwrap().len(), 1);
    }

    #[test]
    fn test_schema_version_changes_the_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions");

        {
            let v1 = LocalStore::open(StoreConfig::new(&path)).unwrap();
            v1.upsert("mood", RecordDraft::new(fields(json!({"rating": 5})))).unwrap();
        }

        let v2 = LocalStore::open(StoreConfig::new(&path).with_version(2)).unwrap();
        assert_eq!(v2.key_for("mood"), "wellbeing-tracker:v2:mood");
        assert!(v2.load("mood").unwrap().is_empty());
        // export covers the whole namespace, every version included
        let exported: JsonValue = serde_json::from_str(&v2.export_all().unwrap()).unwrap();
        assert!(exported.get("wellbeing-tracker:v1:mood").is_some());
    }

    #[test]
    fn test_clear_all_removes_every_collection() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for collection in ["mood", "sleep", "urine"] {
            store.upsert(collection, RecordDraft::new(FieldMap::new())).unwrap();
        }

        assert_eq!(store.clear_all().unwrap(), 3);
        assert!(store.collections().unwrap().is_empty());
        assert!(store.load("sleep").unwrap().is_empty());
        assert_eq!(store.export_all().unwrap(), "{}");
    }

    #[test]
    fn test_reset_and_reopen() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path().join("persisted"));

        let store = LocalStore::open(config.clone()).unwrap();
        let saved = store.upsert("journal", RecordDraft::new(fields(json!({"title": "Day one"})))).unwrap();
        store.close();

        let reopened = LocalStore::open(config).unwrap();
        assert_eq!(reopened.load("journal").unwrap(), vec![saved]);

        let fresh = reopened.reset().unwrap();
        assert!(fresh.load("journal").unwrap().is_empty());
        assert!(fresh.collections().unwrap().is_empty());
    }

    #[test]
    fn test_local_list_sorts_newest_first() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let store = open_store_with_clock(&dir, clock.clone());

        store.add("mood", fields(json!({"date": "2024-01-02", "rating": 2}))).unwrap();
        store.add("mood", fields(json!({"date": "2024-01-05", "rating": 5}))).unwrap();
        clock.advance(Duration::days(400));
        // no date: sorted by createdAt, which is later than any date above
        store.add("mood", fields(json!({"rating": 9}))).unwrap();

        let ratings: Vec<JsonValue> = store
            .list("mood")
            .unwrap()
            .iter()
            .map(|r| r.fields["rating"].clone())
            .collect();
        assert_eq!(ratings, vec![json!(9), json!(5), json!(2)]);
    }

    // ---------------------------------------------------------------
    // FFI
    // ---------------------------------------------------------------

    fn ffi_store(dir: &TempDir) -> *mut LocalStore {
        let path = dir.path().join("ffi_store");
        let name = CString::new(path.to_str().unwrap()).unwrap();
        let ptr = crate::create_store(name.as_ptr());
        assert!(!ptr.is_null(), "Store pointer should not be null");
        ptr
    }

    #[test]
    fn test_ffi_create_store_null_and_invalid_utf8() {
        assert!(crate::create_store(std::ptr::null()).is_null());

        let invalid_bytes = [0xFFu8, 0xFE, 0xFD, 0x00];
        assert!(crate::create_store(invalid_bytes.as_ptr() as *const c_char).is_null());
    }

    #[test]
    fn test_ffi_record_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = ffi_store(&dir);
        let collection = CString::new("mood").unwrap();

        let json = CString::new(r#"{"date":"2024-01-01","rating":8}"#).unwrap();
        let saved = match take_response(crate::upsert_record(store, collection.as_ptr(), json.as_ptr())) {
            AppResponse::Ok(payload) => serde_json::from_str::<JsonValue>(&payload).unwrap(),
            other => panic!("Unexpected response: {other:?}"),
        };
        let id = saved["id"].as_str().unwrap().to_string();
        assert_eq!(saved["rating"], json!(8));

        let patch = CString::new(json!({"id": id, "rating": 3}).to_string()).unwrap();
        let updated = take_response(crate::upsert_record(store, collection.as_ptr(), patch.as_ptr()));
        assert!(updated.message().contains("\"rating\":3"));

        let listed = take_response(crate::load_collection(store, collection.as_ptr()));
        let records: Vec<JsonValue> = serde_json::from_str(listed.message()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["date"], json!("2024-01-01"));

        let id_c = CString::new(id).unwrap();
        let removed = take_response(crate::remove_record(store, collection.as_ptr(), id_c.as_ptr()));
        assert_eq!(removed, AppResponse::Ok("Record deleted successfully".to_string()));

        let again = take_response(crate::remove_record(store, collection.as_ptr(), id_c.as_ptr()));
        assert!(!again.is_error());

        let closed = take_response(crate::close_store(store));
        assert!(!closed.is_error());
    }

    #[test]
    fn test_ffi_null_pointers_are_bad_requests() {
        let dir = TempDir::new().unwrap();
        let store = ffi_store(&dir);
        let collection = CString::new("mood").unwrap();
        let json = CString::new("{}").unwrap();

        let responses = vec![
            crate::load_collection(std::ptr::null_mut(), collection.as_ptr()),
            crate::load_collection(store, std::ptr::null()),
            crate::upsert_record(store, collection.as_ptr(), std::ptr::null()),
            crate::remove_record(store, collection.as_ptr(), std::ptr::null()),
            crate::export_all(std::ptr::null_mut()),
            crate::import_all(store, std::ptr::null()),
            crate::clear_all_records(std::ptr::null_mut()),
            crate::close_store(std::ptr::null_mut()),
            crate::upsert_record(std::ptr::null_mut(), collection.as_ptr(), json.as_ptr()),
        ];
        for ptr in responses {
            assert!(matches!(take_response(ptr), AppResponse::BadRequest(_)));
        }

        crate::free_response(std::ptr::null());
        take_response(crate::close_store(store));
    }

    #[test]
    fn test_ffi_upsert_invalid_json() {
        let dir = TempDir::new().unwrap();
        let store = ffi_store(&dir);
        let collection = CString::new("mood").unwrap();
        let invalid = CString::new(r#"{"invalid": json structure"#).unwrap();

        let response = take_response(crate::upsert_record(store, collection.as_ptr(), invalid.as_ptr()));
        assert!(matches!(response, AppResponse::SerializationError(_)));

        take_response(crate::close_store(store));
    }

    #[test]
    fn test_ffi_export_import_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = ffi_store(&dir);
        let collection = CString::new("sleep").unwrap();
        let json = CString::new(r#"{"quality":7}"#).unwrap();
        take_response(crate::upsert_record(store, collection.as_ptr(), json.as_ptr()));

        let exported = take_response(crate::export_all(store));
        let blob = CString::new(exported.message()).unwrap();

        let cleared = take_response(crate::clear_all_records(store));
        assert_eq!(cleared, AppResponse::Ok("Cleared 1 collection key(s)".to_string()));
        assert_eq!(take_response(crate::load_collection(store, collection.as_ptr())).message(), "[]");

        let imported = take_response(crate::import_all(store, blob.as_ptr()));
        assert_eq!(imported, AppResponse::Ok("Imported 1 collection key(s)".to_string()));
        let listed = take_response(crate::load_collection(store, collection.as_ptr()));
        assert!(listed.message().contains("\"quality\":7"));

        take_response(crate::close_store(store));
    }

    #[test]
    fn test_ffi_list_schemas() {
        let response = take_response(crate::list_schemas());
        let schemas: Vec<JsonValue> = serde_json::from_str(response.message()).unwrap();
        assert_eq!(schemas.len(), 12);
        assert_eq!(schemas[0]["collection"], json!("mood"));
        assert_eq!(schemas[0]["fields"][0]["kind"]["type"], json!("date"));
    }

    // ---------------------------------------------------------------
    // Remote store
    // ---------------------------------------------------------------

    #[test]
    fn test_remote_without_session() {
        let remote = remote_store(manual_clock());

        assert!(remote.list_records(None, "mood").unwrap().is_empty());
        assert_eq!(
            remote.add_record(None, "mood", fields(json!({"rating": 1}))),
            Err(AppResponse::not_signed_in())
        );
        assert!(matches!(
            remote.update_record(None, "x", FieldMap::new()),
            Err(AppResponse::Unauthorized(_))
        ));
        assert!(matches!(remote.delete_record(None, "x"), Err(AppResponse::Unauthorized(_))));

        let blob = r#"[{"date":"2024-01-01","rating":5}]"#;
        assert!(matches!(
            remote.import_collection(None, "mood", blob),
            Err(AppResponse::Unauthorized(_))
        ));
        assert_eq!(remote.table().insert_calls(), 0);
        assert_eq!(remote.table().row_count(), 0);
    }

    #[test]
    fn test_remote_add_update_delete() {
        let remote = remote_store(manual_clock());
        let session = Session::new("user-a", "token-a");

        let added = remote
            .add_record(Some(&session), "mood", fields(json!({"date": "2024-01-01", "rating": 6})))
            .unwrap();
        assert_eq!(added.collection, "mood");
        assert_eq!(added.date(), Some("2024-01-01"));
        assert_eq!(added.fields["rating"], json!(6));

        let updated = remote
            .update_record(Some(&session), &added.id, fields(json!({"date": "2024-01-02", "rating": 8})))
            .unwrap();
        assert_eq!(updated.id, added.id);
        assert_eq!(updated.date(), Some("2024-01-02"));
        assert_eq!(updated.fields["rating"], json!(8));

        remote.delete_record(Some(&session), &added.id).unwrap();
        assert!(remote.list_records(Some(&session), "mood").unwrap().is_empty());
        // deleting again is not an error
        remote.delete_record(Some(&session), &added.id).unwrap();
    }

    #[test]
    fn test_remote_rows_are_scoped_to_their_owner() {
        let remote = remote_store(manual_clock());
        let alice = Session::new("alice", "a");
        let bob = Session::new("bob", "b");

        let record = remote.add_record(Some(&alice), "pain", fields(json!({"level": 4}))).unwrap();
        assert!(remote.list_records(Some(&bob), "pain").unwrap().is_empty());
        assert!(matches!(
            remote.update_record(Some(&bob), &record.id, fields(json!({"level": 1}))),
            Err(AppResponse::NotFound(_))
        ));

        remote.delete_record(Some(&bob), &record.id).unwrap();
        assert_eq!(remote.list_records(Some(&alice), "pain").unwrap().len(), 1);
    }

    #[test]
    fn test_remote_listing_order() {
        let clock = manual_clock();
        let remote = remote_store(clock.clone());
        let session = Session::new("user", "t");

        for (date, tag) in [
            (json!("2024-01-01"), "old"),
            (json!("2024-02-01"), "new"),
            (json!(""), "undated"),
            (json!("2024-02-01"), "new-later"),
        ] {
            remote
                .add_record(Some(&session), "journal", fields(json!({"date": date, "title": tag})))
                .unwrap();
            clock.advance(Duration::seconds(1));
        }

        let titles: Vec<JsonValue> = remote
            .list_records(Some(&session), "journal")
            .unwrap()
            .iter()
            .map(|r| r.fields["title"].clone())
            .collect();
        assert_eq!(titles, vec![json!("undated"), json!("new-later"), json!("new"), json!("old")]);
    }

    #[test]
    fn test_remote_import_assigns_new_ids() {
        let remote = remote_store(manual_clock());
        let session = Session::new("user", "t");
        remote
            .add_record(Some(&session), "sleep", fields(json!({"date": "2024-01-01", "quality": 7})))
            .unwrap();

        let exported = remote.export_collection(Some(&session), "sleep").unwrap();
        assert_eq!(remote.import_collection(Some(&session), "sleep", &exported).unwrap(), 1);

        let records = remote.list_records(Some(&session), "sleep").unwrap();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
        assert_eq!(records[0].fields, records[1].fields);
    }

    #[test]
    fn test_remote_import_in_chunks_with_partial_failure() {
        let remote = remote_store(manual_clock()).with_chunk_size(2);
        let session = Session::new("user", "t");
        let blob = json!([
            {"rating": 1}, {"rating": 2}, {"rating": 3}, {"rating": 4}, {"rating": 5}
        ])
        .to_string();

        remote.table().fail_inserts_after(2);
        let err = remote.import_collection(Some(&session), "mood", &blob).unwrap_err();
        assert!(matches!(err, AppResponse::DatabaseError(_)));
        assert!(err.message().contains("after 4 of 5"), "{err}");

        // earlier chunks stay committed
        assert_eq!(remote.list_records(Some(&session), "mood").unwrap().len(), 4);
        assert_eq!(remote.table().insert_calls(), 3);
    }

    #[test]
    fn test_remote_import_chunk_size_comes_from_config() {
        let mut config = RemoteConfig::new("https://example.supabase.co", "anon");
        config.import_chunk_size = 2;
        let remote = RemoteStore::from_config(MemoryTable::new(manual_clock()), &config);
        let session = Session::new("user", "t");
        let blob = json!([{"rating": 1}, {"rating": 2}, {"rating": 3}, {"rating": 4}, {"rating": 5}]).to_string();

        assert_eq!(remote.import_collection(Some(&session), "mood", &blob).unwrap(), 5);
        assert_eq!(remote.table().insert_calls(), 3);

        let defaults = RemoteStore::from_config(
            MemoryTable::new(manual_clock()),
            &RemoteConfig::new("https://example.supabase.co", "anon"),
        );
        defaults.import_collection(Some(&session), "mood", &blob).unwrap();
        assert_eq!(defaults.table().insert_calls(), 1);
    }

    #[test]
    fn test_remote_import_rejects_bad_files() {
        let remote = remote_store(manual_clock());
        let session = Session::new("user", "t");

        assert_eq!(
            remote.import_collection(Some(&session), "mood", r#"{"rating": 1}"#),
            Err(AppResponse::ValidationError("Invalid file format".to_string()))
        );
        assert!(matches!(
            remote.import_collection(Some(&session), "mood", r#"[{"rating": 1}, 7]"#),
            Err(AppResponse::ValidationError(_))
        ));
        assert!(matches!(
            remote.import_collection(Some(&session), "mood", "nope"),
            Err(AppResponse::SerializationError(_))
        ));
        assert_eq!(remote.table().row_count(), 0);
    }

    // ---------------------------------------------------------------
    // Shell
    // ---------------------------------------------------------------

    #[test]
    fn test_shell_create_edit_and_delete_locally() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let store = open_store_with_clock(&dir, clock.clone());
        let mut shell = AppShell::new(store, clock.clone()).unwrap();

        assert_eq!(shell.active_schema().collection, "mood");
        assert_eq!(shell.form().value("date"), Some(&json!("2024-03-01")));

        shell.form_mut().set_input("rating", "7").unwrap();
        let created = shell.submit_form().unwrap();
        assert_eq!(shell.records().len(), 1);
        assert_eq!(created.fields["rating"], json!(7));

        shell.begin_edit(&created.id).unwrap();
        assert_eq!(shell.form().editing_id(), Some(created.id.as_str()));
        clock.advance(Duration::minutes(1));
        let updated = shell.save(fields(json!({"rating": 9}))).unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.fields["date"], json!("2024-03-01"));
        assert_eq!(shell.records().len(), 1);
        assert_eq!(shell.records()[0].fields["rating"], json!(9));
        assert!(!shell.form().is_editing());

        let row = shell.rows().remove(0);
        assert!(!shell.delete(&row.id, |_| false).unwrap());
        assert_eq!(shell.records().len(), 1);

        shell.handle(row.delete(), |_| true).unwrap();
        assert!(shell.records().is_empty());
        assert!(shell.store().load("mood").unwrap().is_empty());
    }

    #[test]
    fn test_shell_select_collection_resets_form() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let mut shell = AppShell::new(open_store_with_clock(&dir, clock.clone()), clock).unwrap();
        shell.save(fields(json!({"rating": 3}))).unwrap();
        let id = shell.records()[0].id.clone();
        shell.handle(ListAction::Edit(id), |_| true).unwrap();
        assert!(shell.form().is_editing());

        shell.select_collection("sleep").unwrap();
        assert_eq!(shell.active_schema().title, "Sleep");
        assert!(!shell.form().is_editing());
        assert!(shell.records().is_empty());

        assert!(matches!(shell.select_collection("steps"), Err(AppResponse::BadRequest(_))));
        assert!(matches!(shell.begin_edit("missing"), Err(AppResponse::NotFound(_))));
    }

    #[test]
    fn test_shell_rejects_invalid_form() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let mut shell = AppShell::new(open_store_with_clock(&dir, clock.clone()), clock).unwrap();

        shell.form_mut().set_input("date", "03/01/2024").unwrap();
        assert!(matches!(shell.submit_form(), Err(AppResponse::ValidationError(_))));
        assert!(shell.records().is_empty());
    }

    #[test]
    fn test_shell_remote_export_import_and_reset() {
        let clock = manual_clock();
        let workspace = RemoteWorkspace::new(remote_store(clock.clone()), Some(Session::new("user", "t")));
        let mut shell = AppShell::new(workspace, clock.clone()).unwrap();

        shell.save(fields(json!({"date": "2024-02-01", "rating": 4}))).unwrap();
        shell.save(fields(json!({"date": "2024-02-02", "rating": 5}))).unwrap();

        let artifact = shell.export().unwrap();
        assert_eq!(artifact.file_name, "wellbeing-mood.json");
        assert_eq!(artifact.mime, "application/json");

        let notice = shell.import(&artifact.contents);
        assert_eq!(notice, Notice::Success("Import complete (2 entries).".to_string()));
        assert_eq!(shell.records().len(), 4);

        let failed = shell.import("{}");
        assert!(!failed.is_success());
        assert!(failed.message().starts_with("Import failed: "));

        assert_eq!(shell.reset(|_| false).unwrap(), None);
        assert_eq!(shell.records().len(), 4);
        assert_eq!(shell.reset(|_| true).unwrap(), Some(4));
        assert!(shell.records().is_empty());
        assert_eq!(shell.store().remote().table().row_count(), 0);
    }

    /// Local store whose listing breaks once an import has been attempted.
    struct BrokenAfterImport {
        inner: LocalStore,
        broken: Cell<bool>,
    }

    impl RecordStore for BrokenAfterImport {
        type Record = LocalRecord;

        fn list(&self, collection: &str) -> AppResult<Vec<LocalRecord>> {
            if self.broken.get() {
                return Err(AppResponse::DatabaseError("store unavailable".to_string()));
            }
            self.inner.list(collection)
        }

        fn add(&self, collection: &str, values: FieldMap) -> AppResult<LocalRecord> {
            self.inner.add(collection, values)
        }

        fn update(&self, collection: &str, id: &str, values: FieldMap) -> AppResult<LocalRecord> {
            self.inner.update(collection, id, values)
        }

        fn delete(&self, collection: &str, id: &str) -> AppResult<()> {
            self.inner.delete(collection, id)
        }

        fn export(&self, collection: &str) -> AppResult<String> {
            self.inner.export(collection)
        }

        fn import(&self, collection: &str, blob: &str) -> AppResult<usize> {
            self.broken.set(true);
            self.inner.import(collection, blob)
        }

        fn export_file_name(&self, collection: &str) -> String {
            self.inner.export_file_name(collection)
        }
    }

    #[test]
    fn test_shell_import_failure_reports_reload_failure() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let store = BrokenAfterImport {
            inner: open_store_with_clock(&dir, clock.clone()),
            broken: Cell::new(false),
        };
        let mut shell = AppShell::new(store, clock).unwrap();

        let notice = shell.import("not json");
        assert!(!notice.is_success());
        assert!(notice.message().starts_with("Import failed: "));
        assert!(notice.message().ends_with("(reload failed: store unavailable)"), "{}", notice.message());
    }

    #[test]
    fn test_shell_signed_out_sees_nothing_and_cannot_save() {
        let clock = manual_clock();
        let workspace = RemoteWorkspace::new(remote_store(clock.clone()), None);
        let mut shell = AppShell::new(workspace, clock).unwrap();

        assert!(shell.records().is_empty());
        assert!(matches!(
            shell.save(fields(json!({"rating": 1}))),
            Err(AppResponse::Unauthorized(_))
        ));

        let notice = shell.import(r#"[{"rating": 1}]"#);
        assert_eq!(notice, Notice::Failure("Import failed: Not signed in".to_string()));
        assert_eq!(shell.store().remote().table().row_count(), 0);

        shell.store_mut().sign_in(Session::new("user", "t"));
        shell.save(fields(json!({"rating": 1}))).unwrap();
        assert_eq!(shell.records().len(), 1);
    }

    // ---------------------------------------------------------------
    // Concurrency
    // ---------------------------------------------------------------

    #[test]
    fn test_concurrent_reads() {
        use std::thread;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir));
        for i in 0..10 {
            store.upsert("metrics", RecordDraft::new(fields(json!({"steps": i * 1000})))).unwrap();
        }

        let mut handles = vec![];
        for thread_id in 0..5 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let records = store.load("metrics").unwrap();
                assert_eq!(records.len(), 10, "Thread {thread_id} saw a partial collection");
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
