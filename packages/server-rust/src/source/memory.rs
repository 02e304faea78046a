//! In-memory [`SourceStore`] for tests and local experiments.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexsync_core::{document_id, ChangedRow, DeletedRow, Row, TableSyncSpec};
use parking_lot::Mutex;

use super::{SourceError, SourceStore};

#[derive(Debug, Clone)]
struct StoredRow {
    fields: Row,
    modified_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

/// Tables held in memory, with a settable clock and injectable outages.
///
/// Rows are keyed by their primary-key value, so putting a row with an
/// existing key replaces it, like an `UPDATE`.
#[derive(Debug)]
pub struct MemorySource {
    clock: Mutex<DateTime<Utc>>,
    tables: Mutex<HashMap<String, BTreeMap<String, StoredRow>>>,
    unavailable: AtomicBool,
    unavailable_tables: Mutex<HashSet<String>>,
}

impl MemorySource {
    /// Creates an empty source whose clock reads `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            clock: Mutex::new(now),
            tables: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            unavailable_tables: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_time(&self, now: DateTime<Utc>) {
        *self.clock.lock() = now;
    }

    /// Inserts or replaces a live row, clearing any soft-delete marker.
    ///
    /// Returns `false` and stores nothing if `fields` has no usable
    /// primary-key value.
    pub fn put_row(&self, spec: &TableSyncSpec, fields: Row, modified_at: DateTime<Utc>) -> bool {
        let Some(key) = fields.get(&spec.primary_key).and_then(document_id) else {
            return false;
        };
        self.tables.lock().entry(spec.name.clone()).or_default().insert(
            key,
            StoredRow {
                fields,
                modified_at,
                deleted_at: None,
            },
        );
        true
    }

    /// Sets the soft-delete marker of an existing row. Returns `false` if no
    /// such row exists.
    pub fn soft_delete(&self, spec: &TableSyncSpec, id: &str, deleted_at: DateTime<Utc>) -> bool {
        let mut tables = self.tables.lock();
        match tables.get_mut(&spec.name).and_then(|rows| rows.get_mut(id)) {
            Some(row) => {
                row.deleted_at = Some(deleted_at);
                true
            }
            None => false,
        }
    }

    /// Makes every call fail as unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the change queries of a single table fail as unreachable.
    pub fn set_table_unavailable(&self, table: &str, unavailable: bool) {
        let mut tables = self.unavailable_tables.lock();
        if unavailable {
            tables.insert(table.to_string());
        } else {
            tables.remove(table);
        }
    }

    fn check(&self, table: Option<&str>) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("connection refused".to_string()));
        }
        if let Some(table) = table {
            if self.unavailable_tables.lock().contains(table) {
                return Err(SourceError::Unavailable(format!(
                    "connection refused while reading `{table}`"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn current_time(&self) -> Result<DateTime<Utc>, SourceError> {
        self.check(None)?;
        Ok(*self.clock.lock())
    }

    async fn query_changed(
        &self,
        spec: &TableSyncSpec,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChangedRow>, SourceError> {
        self.check(Some(&spec.name))?;

        let tables = self.tables.lock();
        let mut rows: Vec<ChangedRow> = tables
            .get(&spec.name)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|row| row.deleted_at.is_none() && row.modified_at > since)
            .map(|row| ChangedRow {
                modified_at: row.modified_at,
                fields: row.fields.clone(),
            })
            .collect();
        rows.sort_by_key(|row| row.modified_at);
        Ok(rows)
    }

    async fn query_deleted(
        &self,
        spec: &TableSyncSpec,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeletedRow>, SourceError> {
        self.check(Some(&spec.name))?;

        let tables = self.tables.lock();
        let mut rows: Vec<DeletedRow> = tables
            .get(&spec.name)
            .into_iter()
            .flat_map(|rows| rows.iter())
            .filter_map(|(id, row)| match row.deleted_at {
                Some(deleted_at) if deleted_at > since => Some(DeletedRow {
                    id: id.clone(),
                    deleted_at,
                }),
                _ => None,
            })
            .collect();
        rows.sort_by_key(|row| row.deleted_at);
        Ok(rows)
    }
}
