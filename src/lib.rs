//! # Wellbeing Core
//!
//! Storage core for a personal health tracker. Records (mood, sleep, food,
//! lab results, ...) are declared by a static schema registry and persisted
//! either on-device in LMDB or in a hosted record table, with JSON
//! export/import for moving data between devices.
//!
//! ## Features
//!
//! - **Schema registry**: twelve collections with typed fields ([`schema`])
//! - **Local store**: one JSON array per collection under namespaced,
//!   versioned keys, with an explicit key index ([`local_db_state`])
//! - **Remote store**: per-user rows in a hosted table, explicit sessions,
//!   chunked import ([`remote_db`], [`rest_client`], [`memory_table`])
//! - **Headless UI state**: form drafts, list rows and the shell that wires
//!   them to a store ([`record_form`], [`record_list`], [`app_shell`])
//! - **C ABI** over the local store, answering with JSON [`AppResponse`]
//!   envelopes
//!
//! ## Quick Start
//!
//! ```no_run
//! use wellbeing_core::local_db_state::LocalStore;
//! use wellbeing_core::local_db_model::RecordDraft;
//! use serde_json::json;
//!
//! let store = LocalStore::init("wellbeing")?;
//! let fields = json!({"date": "2024-01-01", "rating": 8}).as_object().cloned().unwrap();
//! let saved = store.upsert("mood", RecordDraft::new(fields))?;
//! assert_eq!(store.load("mood")?.len(), 1);
//! # let _ = saved;
//! # Ok::<(), wellbeing_core::AppResponse>(())
//! ```
//!
//! ## FFI Functions
//!
//! - [`create_store`] - Open (or create) a local store
//! - [`load_collection`] - Records of one collection
//! - [`upsert_record`] - Create or merge a record
//! - [`remove_record`] - Delete a record by id
//! - [`export_all`] / [`import_all`] - Whole-store JSON transfer
//! - [`clear_all_records`] - Remove every namespaced key
//! - [`list_schemas`] - The schema registry as JSON
//! - [`close_store`] - Release the store
//! - [`free_response`] - Free a string returned by any of the above

pub mod app_response;
pub mod app_shell;
pub mod clock;
pub mod config;
pub mod local_db_model;
pub mod local_db_state;
pub mod memory_table;
pub mod record_form;
pub mod record_list;
pub mod remote_db;
pub mod rest_client;
pub mod schema;
pub mod store;
mod test;

pub use crate::app_response::{AppResponse, AppResult};

use crate::local_db_model::{FieldMap, RecordDraft};
use crate::local_db_state::LocalStore;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use log::{info, warn};

/// Opens the local store named `name` (data lives in `<name>.lmdb/`),
/// creating it when missing.
///
/// # Returns
///
/// A pointer to the [`LocalStore`], or null on failure. Release it with
/// [`close_store`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use wellbeing_core::create_store;
///
/// let name = CString::new("wellbeing").unwrap();
/// let store = create_store(name.as_ptr());
/// assert!(!store.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(name: *const c_char) -> *mut LocalStore {
    if name.is_null() {
        warn!("Null name pointer passed to create_store");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    match LocalStore::init(name_str) {
        Ok(store) => {
            info!("Local store ready: {name_str}");
            Box::into_raw(Box::new(store))
        }
        Err(e) => {
            warn!("Failed to open local store {name_str}: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Records of `collection` as a JSON array inside an `Ok` envelope.
/// Missing or unreadable collections come back as `[]`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn load_collection(state: *mut LocalStore, collection: *const c_char) -> *const c_char {
    let state = match store_ref(state, "load_collection") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(c) => c,
        Err(err) => return err,
    };

    let result = state
        .load(&collection)
        .and_then(|records| serde_json::to_string(&records).map_err(AppResponse::from));
    respond(result)
}

/// Creates or merges a record.
///
/// `json_ptr` is a flat JSON object of field values. A non-empty string `id`
/// that matches a stored record merges into it; otherwise a new record with
/// a generated id is appended. The stored record is returned.
///
/// ```json
/// { "id": "optional", "date": "2024-01-01", "rating": 8 }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn upsert_record(
    state: *mut LocalStore,
    collection: *const c_char,
    json_ptr: *const c_char,
) -> *const c_char {
    let state = match store_ref(state, "upsert_record") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(c) => c,
        Err(err) => return err,
    };
    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let values: FieldMap = match serde_json::from_str(&json_str) {
        Ok(values) => values,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    let result = state
        .upsert(&collection, RecordDraft::from_flat(values))
        .and_then(|record| serde_json::to_string(&record).map_err(AppResponse::from));
    respond(result)
}

/// Removes record `id` from `collection`. Unknown ids are not an error.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn remove_record(
    state: *mut LocalStore,
    collection: *const c_char,
    id: *const c_char,
) -> *const c_char {
    let state = match store_ref(state, "remove_record") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(c) => c,
        Err(err) => return err,
    };
    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let result = state.remove(&collection, &id_str).map(|removed| {
        if removed {
            "Record deleted successfully".to_string()
        } else {
            format!("No record with id {id_str}; nothing to delete")
        }
    });
    respond(result)
}

/// Every namespaced key and its parsed value, as pretty JSON.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn export_all(state: *mut LocalStore) -> *const c_char {
    let state = match store_ref(state, "export_all") {
        Ok(s) => s,
        Err(err) => return err,
    };
    respond(state.export_all())
}

/// Overwrites every namespaced key present in the JSON object `json_ptr`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn import_all(state: *mut LocalStore, json_ptr: *const c_char) -> *const c_char {
    let state = match store_ref(state, "import_all") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let result = state
        .import_all(&json_str)
        .map(|count| format!("Imported {count} collection key(s)"));
    respond(result)
}

/// Removes every key under the store's namespace.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_all_records(state: *mut LocalStore) -> *const c_char {
    let state = match store_ref(state, "clear_all_records") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let result = state
        .clear_all()
        .map(|count| format!("Cleared {count} collection key(s)"));
    respond(result)
}

/// The schema registry as a JSON array.
#[no_mangle]
pub extern "C" fn list_schemas() -> *const c_char {
    let result = serde_json::to_string(&schema::SCHEMAS[..]).map_err(AppResponse::from);
    respond(result)
}

/// Closes the store and frees `state`. The pointer must not be used again.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(state: *mut LocalStore) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let store = unsafe { *Box::from_raw(state) };
    store.close();
    response_to_c_string(&AppResponse::success("Store closed successfully"))
}

/// Frees a string returned by any function in this module.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

fn store_ref<'a>(state: *mut LocalStore, caller: &str) -> Result<&'a LocalStore, *const c_char> {
    match unsafe { state.as_ref() } {
        Some(s) => Ok(s),
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {caller}"));
            Err(response_to_c_string(&error))
        }
    }
}

fn respond(result: AppResult<String>) -> *const c_char {
    match result {
        Ok(payload) => response_to_c_string(&AppResponse::Ok(payload)),
        Err(e) => response_to_c_string(&e),
    }
}

/// Serializes `response` to JSON and hands ownership of the C string to the
/// caller. Returns null if either step fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Copies a C string into a `String`, or returns a ready-made `BadRequest`
/// response for null pointers and invalid UTF-8.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
