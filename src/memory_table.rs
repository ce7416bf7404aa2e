//! In-process [`RecordTable`].
//!
//! Behaves like the hosted table under a per-user row policy: a session only
//! ever sees, updates or deletes its own rows. Ids are random UUIDs and
//! `created_at` strictly increases across inserts.

use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::app_response::{AppResponse, AppResult};
use crate::clock::{next_timestamp, Clock, SystemClock};
use crate::remote_db::{NewRow, RecordTable, RemoteRow, RowPatch, Session};

#[derive(Debug, Clone)]
struct OwnedRow {
    user_id: String,
    row: RemoteRow,
}

#[derive(Default)]
struct TableState {
    rows: Vec<OwnedRow>,
    last_created: Option<String>,
    insert_calls: usize,
    fail_inserts_after: Option<usize>,
}

pub struct MemoryTable {
    state: Mutex<TableState>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryTable {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            clock,
        }
    }

    /// Makes every insert call after the first `calls` fail, to exercise
    /// partial imports.
    pub fn fail_inserts_after(&self, calls: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_inserts_after = Some(calls);
        }
    }

    /// Rows across every user.
    pub fn row_count(&self) -> usize {
        self.lock().map(|state| state.rows.len()).unwrap_or(0)
    }

    pub fn insert_calls(&self) -> usize {
        self.lock().map(|state| state.insert_calls).unwrap_or(0)
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, TableState>> {
        self.state
            .lock()
            .map_err(|_| AppResponse::DatabaseError("Memory table lock poisoned".to_string()))
    }
}

impl RecordTable for MemoryTable {
    fn select(&self, session: &Session, collection: &str) -> AppResult<Vec<RemoteRow>> {
        let state = self.lock()?;
        let mut rows: Vec<RemoteRow> = state
            .rows
            .iter()
            .filter(|r| r.user_id == session.user_id && r.row.collection == collection)
            .map(|r| r.row.clone())
            .collect();

        // date DESC NULLS FIRST, then created_at DESC
        rows.sort_by(|a, b| {
            let by_date = match (&a.date, &b.date) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(x), Some(y)) => y.cmp(x),
            };
            by_date.then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(rows)
    }

    fn insert(&self, session: &Session, rows: &[NewRow]) -> AppResult<Vec<RemoteRow>> {
        let mut state = self.lock()?;
        state.insert_calls += 1;
        if let Some(limit) = state.fail_inserts_after {
            if state.insert_calls > limit {
                return Err(AppResponse::DatabaseError("insert rejected by backend".to_string()));
            }
        }

        if let Some(foreign) = rows.iter().find(|r| r.user_id != session.user_id) {
            return Err(AppResponse::Unauthorized(format!(
                "row owned by {} violates row-level policy",
                foreign.user_id
            )));
        }

        let mut inserted = Vec::with_capacity(rows.len());
        for new in rows {
            let created_at = next_timestamp(self.clock.as_ref(), state.last_created.as_deref());
            state.last_created = Some(created_at.clone());

            let row = RemoteRow {
                id: Uuid::new_v4().to_string(),
                created_at,
                collection: new.collection.clone(),
                date: new.date.clone(),
                data: Some(new.data.clone()),
            };
            inserted.push(row);
        }

        state.rows.extend(inserted.iter().map(|row| OwnedRow {
            user_id: session.user_id.clone(),
            row: row.clone(),
        }));
        Ok(inserted)
    }

    fn update(&self, session: &Session, id: &str, patch: &RowPatch) -> AppResult<RemoteRow> {
        let mut state = self.lock()?;
        let owned = state
            .rows
            .iter_mut()
            .find(|r| r.row.id == id && r.user_id == session.user_id)
            .ok_or_else(|| AppResponse::NotFound(format!("No row with id {id}")))?;

        owned.row.date = patch.date.clone();
        owned.row.data = Some(patch.data.clone());
        Ok(owned.row.clone())
    }

    fn delete(&self, session: &Session, id: &str) -> AppResult<()> {
        let mut state = self.lock()?;
        state
            .rows
            .retain(|r| !(r.row.id == id && r.user_id == session.user_id));
        Ok(())
    }
}
