//! One interface over both persistence backends, as used by the
//! [`AppShell`](crate::app_shell::AppShell).

use crate::app_response::AppResult;
use crate::local_db_model::{FieldMap, LocalRecord, RecordDraft, StoredRecord};
use crate::local_db_state::LocalStore;
use crate::remote_db::{RecordTable, RemoteRecord, RemoteStore, Session};

pub trait RecordStore {
    type Record: StoredRecord;

    /// Newest first.
    fn list(&self, collection: &str) -> AppResult<Vec<Self::Record>>;

    fn add(&self, collection: &str, values: FieldMap) -> AppResult<Self::Record>;

    fn update(&self, collection: &str, id: &str, values: FieldMap) -> AppResult<Self::Record>;

    fn delete(&self, collection: &str, id: &str) -> AppResult<()>;

    fn export(&self, collection: &str) -> AppResult<String>;

    /// Returns how many entries were written.
    fn import(&self, collection: &str, blob: &str) -> AppResult<usize>;

    fn export_file_name(&self, collection: &str) -> String;
}

impl RecordStore for LocalStore {
    type Record = LocalRecord;

    /// Sorted by `date` (falling back to `createdAt`), newest first.
    fn list(&self, collection: &str) -> AppResult<Vec<LocalRecord>> {
        let mut records = self.load(collection)?;
        records.sort_by_key(|r| std::cmp::Reverse(r.sort_key()));
        Ok(records)
    }

    fn add(&self, collection: &str, values: FieldMap) -> AppResult<LocalRecord> {
        let draft = RecordDraft::from_flat(values);
        self.upsert(collection, RecordDraft::new(draft.fields))
    }

    fn update(&self, collection: &str, id: &str, values: FieldMap) -> AppResult<LocalRecord> {
        let draft = RecordDraft::from_flat(values);
        self.upsert(collection, RecordDraft::with_id(id, draft.fields))
    }

    fn delete(&self, collection: &str, id: &str) -> AppResult<()> {
        self.remove(collection, id).map(|_| ())
    }

    /// The local export always covers every collection.
    fn export(&self, _collection: &str) -> AppResult<String> {
        self.export_all()
    }

    fn import(&self, _collection: &str, blob: &str) -> AppResult<usize> {
        self.import_all(blob)
    }

    fn export_file_name(&self, _collection: &str) -> String {
        "wellbeing-data.json".to_string()
    }
}

/// A [`RemoteStore`] bound to whoever is currently signed in.
pub struct RemoteWorkspace<T: RecordTable> {
    remote: RemoteStore<T>,
    session: Option<Session>,
}

impl<T: RecordTable> RemoteWorkspace<T> {
    pub fn new(remote: RemoteStore<T>, session: Option<Session>) -> Self {
        Self { remote, session }
    }

    pub fn sign_in(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn sign_out(&mut self) {
        self.session = None;
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn remote(&self) -> &RemoteStore<T> {
        &self.remote
    }
}

impl<T: RecordTable> RecordStore for RemoteWorkspace<T> {
    type Record = RemoteRecord;

    fn list(&self, collection: &str) -> AppResult<Vec<RemoteRecord>> {
        self.remote.list_records(self.session(), collection)
    }

    fn add(&self, collection: &str, values: FieldMap) -> AppResult<RemoteRecord> {
        self.remote.add_record(self.session(), collection, values)
    }

    fn update(&self, _collection: &str, id: &str, values: FieldMap) -> AppResult<RemoteRecord> {
        self.remote.update_record(self.session(), id, values)
    }

    fn delete(&self, _collection: &str, id: &str) -> AppResult<()> {
        self.remote.delete_record(self.session(), id)
    }

    fn export(&self, collection: &str) -> AppResult<String> {
        self.remote.export_collection(self.session(), collection)
    }

    fn import(&self, collection: &str, blob: &str) -> AppResult<usize> {
        self.remote.import_collection(self.session(), collection, blob)
    }

    fn export_file_name(&self, collection: &str) -> String {
        format!("wellbeing-{collection}.json")
    }
}
