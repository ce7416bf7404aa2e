//! Application shell: which collection is active, what is being edited, and
//! the records currently on screen.
//!
//! The in-memory record list only changes after a store call has returned
//! successfully; nothing is applied speculatively.

use std::sync::Arc;

use log::{info, warn};

use crate::app_response::{AppResponse, AppResult};
use crate::clock::Clock;
use crate::local_db_model::{FieldMap, StoredRecord};
use crate::record_form::RecordForm;
use crate::record_list::{ListAction, ListRow, RecordList};
use crate::schema::{self, Schema, SCHEMAS};
use crate::store::RecordStore;

/// A downloadable export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime: &'static str,
    pub contents: String,
}

/// User-facing outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Failure(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Success(msg) | Notice::Failure(msg) => msg,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Notice::Success(_))
    }
}

pub struct AppShell<S: RecordStore> {
    store: S,
    clock: Arc<dyn Clock>,
    active: &'static Schema,
    records: Vec<S::Record>,
    form: RecordForm,
}

impl<S: RecordStore> AppShell<S> {
    /// Starts on the first registered collection and loads it.
    pub fn new(store: S, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let active = &SCHEMAS[0];
        let form = RecordForm::new(active, None, clock.today());
        let mut shell = Self {
            store,
            clock,
            active,
            records: Vec::new(),
            form,
        };
        shell.reload()?;
        Ok(shell)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn active_schema(&self) -> &'static Schema {
        self.active
    }

    pub fn records(&self) -> &[S::Record] {
        &self.records
    }

    pub fn form(&self) -> &RecordForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut RecordForm {
        &mut self.form
    }

    /// Rows for the active collection using its default columns.
    pub fn rows(&self) -> Vec<ListRow> {
        RecordList::for_schema(self.active).rows(&self.records)
    }

    /// Switches collection, drops any edit in progress and reloads.
    pub fn select_collection(&mut self, collection: &str) -> AppResult<()> {
        let schema = schema::schema(collection)
            .ok_or_else(|| AppResponse::BadRequest(format!("Unknown collection: {collection}")))?;
        self.active = schema;
        self.form.reset(schema, None, self.clock.today());
        self.records.clear();
        self.reload()
    }

    pub fn reload(&mut self) -> AppResult<()> {
        self.records = self.store.list(self.active.collection)?;
        Ok(())
    }

    /// Loads record `id` into the form.
    pub fn begin_edit(&mut self, id: &str) -> AppResult<()> {
        let record = self
            .records
            .iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| AppResponse::NotFound(format!("No loaded record with id: {id}")))?;
        let initial = record.to_flat_map();
        self.form.reset(self.active, Some(initial), self.clock.today());
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.form.cancel(self.clock.today());
    }

    /// Validates the form draft and saves it.
    pub fn submit_form(&mut self) -> AppResult<S::Record> {
        let values = self.form.submit()?;
        self.save(values)
    }

    /// Updates the record being edited (values merged over it) or adds a new
    /// one. The result replaces the old entry in place, or is prepended.
    pub fn save(&mut self, values: FieldMap) -> AppResult<S::Record> {
        let collection = self.active.collection;

        let saved = match self.form.editing_id().map(str::to_string) {
            Some(id) => {
                let mut merged = self
                    .records
                    .iter()
                    .find(|r| r.id() == id)
                    .map(|r| r.to_flat_map())
                    .unwrap_or_default();
                merged.extend(values);
                let updated = self.store.update(collection, &id, merged)?;
                match self.records.iter().position(|r| r.id() == updated.id()) {
                    Some(idx) => self.records[idx] = updated.clone(),
                    None => self.records.insert(0, updated.clone()),
                }
                updated
            }
            None => {
                let created = self.store.add(collection, values)?;
                self.records.insert(0, created.clone());
                created
            }
        };

        self.form.cancel(self.clock.today());
        Ok(saved)
    }

    /// Deletes `id` once `confirm` agrees. Returns `false` when declined.
    pub fn delete(&mut self, id: &str, confirm: impl FnOnce(&str) -> bool) -> AppResult<bool> {
        if !confirm("Delete this record?") {
            return Ok(false);
        }
        self.store.delete(self.active.collection, id)?;
        self.records.retain(|r| r.id() != id);
        if self.form.editing_id() == Some(id) {
            self.form.cancel(self.clock.today());
        }
        Ok(true)
    }

    /// Routes a row button press.
    pub fn handle(&mut self, action: ListAction, confirm: impl FnOnce(&str) -> bool) -> AppResult<()> {
        match action {
            ListAction::Edit(id) => self.begin_edit(&id),
            ListAction::Delete(id) => self.delete(&id, confirm).map(|_| ()),
        }
    }

    pub fn export(&self) -> AppResult<ExportArtifact> {
        let collection = self.active.collection;
        Ok(ExportArtifact {
            file_name: self.store.export_file_name(collection),
            mime: "application/json",
            contents: self.store.export(collection)?,
        })
    }

    /// Imports `contents` into the active collection and reloads it.
    pub fn import(&mut self, contents: &str) -> Notice {
        let collection = self.active.collection;
        let imported = match self.store.import(collection, contents) {
            Ok(count) => count,
            Err(e) => {
                warn!("Import into {collection} failed: {e}");
                let mut message = format!("Import failed: {}", e.message());
                // earlier chunks may have landed
                if let Err(reload) = self.reload() {
                    warn!("Reload of {collection} after failed import failed: {reload}");
                    message.push_str(&format!(" (reload failed: {})", reload.message()));
                }
                return Notice::Failure(message);
            }
        };

        match self.reload() {
            Ok(()) => Notice::Success(format!("Import complete ({imported} entries).")),
            Err(e) => Notice::Failure(format!("Import finished but reload failed: {}", e.message())),
        }
    }

    /// Deletes every loaded record of the active collection, one at a time,
    /// then reloads. Stops at the first failure; records already deleted stay
    /// deleted. Returns `None` when declined.
    pub fn reset(&mut self, confirm: impl FnOnce(&str) -> bool) -> AppResult<Option<usize>> {
        let collection = self.active.collection;
        if !confirm("This deletes every record in this collection. Continue?") {
            return Ok(None);
        }

        let ids: Vec<String> = self.records.iter().map(|r| r.id().to_string()).collect();
        let mut deleted = 0;
        for id in &ids {
            self.store.delete(collection, id)?;
            self.records.retain(|r| r.id() != id.as_str());
            deleted += 1;
        }

        info!("Reset {collection}: deleted {deleted} record(s)");
        self.form.cancel(self.clock.today());
        self.reload()?;
        Ok(Some(deleted))
    }
}
