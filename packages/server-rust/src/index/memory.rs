//! In-memory [`IndexBackend`] for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use indexsync_core::{IndexDescriptor, Row};
use parking_lot::Mutex;

use super::{DeleteOutcome, IndexBackend, IndexCreate, IndexError};

#[derive(Debug, Default)]
struct IndexState {
    descriptor: Option<IndexDescriptor>,
    docs: BTreeMap<String, Row>,
}

/// Index backend holding documents in process memory.
///
/// Behaves like a search backend with auto-create enabled: writing to an
/// unknown index creates it without a descriptor. Outages and rejections can
/// be injected per backend, per index, or per document.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    indices: Mutex<HashMap<String, IndexState>>,
    unavailable: AtomicBool,
    writes_unavailable: Mutex<HashSet<String>>,
    rejected_docs: Mutex<HashSet<(String, String)>>,
    rejected_indices: Mutex<HashMap<String, String>>,
    ensure_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index out of band, as if another process had done it.
    pub fn create_index(&self, name: &str) {
        self.indices.lock().entry(name.to_string()).or_default();
    }

    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.indices.lock().contains_key(name)
    }

    /// Descriptor the index was created with, if it was created through
    /// [`IndexBackend::ensure_index`].
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<IndexDescriptor> {
        self.indices
            .lock()
            .get(name)
            .and_then(|state| state.descriptor.clone())
    }

    #[must_use]
    pub fn document(&self, index: &str, id: &str) -> Option<Row> {
        self.indices
            .lock()
            .get(index)
            .and_then(|state| state.docs.get(id).cloned())
    }

    #[must_use]
    pub fn document_count(&self, index: &str) -> usize {
        self.indices
            .lock()
            .get(index)
            .map_or(0, |state| state.docs.len())
    }

    #[must_use]
    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    /// Upsert and delete calls received, failed ones included.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Makes every call fail as unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes document writes to `index` fail as unreachable while index
    /// management keeps working.
    pub fn set_writes_unavailable(&self, index: &str, unavailable: bool) {
        let mut set = self.writes_unavailable.lock();
        if unavailable {
            set.insert(index.to_string());
        } else {
            set.remove(index);
        }
    }

    /// Rejects every write of one document, like a mapping conflict would.
    pub fn reject_document(&self, index: &str, id: &str) {
        self.rejected_docs
            .lock()
            .insert((index.to_string(), id.to_string()));
    }

    pub fn clear_rejections(&self) {
        self.rejected_docs.lock().clear();
        self.rejected_indices.lock().clear();
    }

    /// Rejects creation of `index` with `reason`.
    pub fn reject_index(&self, index: &str, reason: &str) {
        self.rejected_indices
            .lock()
            .insert(index.to_string(), reason.to_string());
    }

    fn check_available(&self) -> Result<(), IndexError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_write(&self, index: &str, id: &str) -> Result<(), IndexError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.writes_unavailable.lock().contains(index) {
            return Err(IndexError::Unavailable(format!(
                "connection reset while writing to `{index}`"
            )));
        }
        if self
            .rejected_docs
            .lock()
            .contains(&(index.to_string(), id.to_string()))
        {
            return Err(IndexError::Rejected {
                status: 400,
                reason: format!("mapper_parsing_exception for document `{id}`"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IndexBackend for MemoryIndex {
    async fn ensure_index(&self, descriptor: &IndexDescriptor) -> Result<IndexCreate, IndexError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if let Some(reason) = self.rejected_indices.lock().get(&descriptor.name) {
            return Err(IndexError::Rejected {
                status: 400,
                reason: reason.clone(),
            });
        }

        let mut indices = self.indices.lock();
        if indices.contains_key(&descriptor.name) {
            return Ok(IndexCreate::AlreadyExists);
        }
        indices.insert(
            descriptor.name.clone(),
            IndexState {
                descriptor: Some(descriptor.clone()),
                docs: BTreeMap::new(),
            },
        );
        Ok(IndexCreate::Created)
    }

    async fn upsert_document(&self, index: &str, id: &str, body: &Row) -> Result<(), IndexError> {
        self.check_write(index, id)?;
        self.indices
            .lock()
            .entry(index.to_string())
            .or_default()
            .docs
            .insert(id.to_string(), body.clone());
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<DeleteOutcome, IndexError> {
        self.check_write(index, id)?;
        let removed = self
            .indices
            .lock()
            .get_mut(index)
            .and_then(|state| state.docs.remove(id));
        Ok(match removed {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn body(name: &str) -> Row {
        match json!({ "name": name }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn upsert_twice_equals_upsert_once() {
        let index = MemoryIndex::new();
        index.upsert_document("player", "1", &body("a")).await.unwrap();
        let once = index.document("player", "1");

        index.upsert_document("player", "1", &body("a")).await.unwrap();
        assert_eq!(index.document("player", "1"), once);
        assert_eq!(index.document_count("player"), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_document() {
        let index = MemoryIndex::new();
        index.upsert_document("player", "1", &body("a")).await.unwrap();
        index.upsert_document("player", "1", &body("b")).await.unwrap();
        assert_eq!(index.document("player", "1"), Some(body("b")));
    }

    #[tokio::test]
    async fn delete_missing_document_is_not_found() {
        let index = MemoryIndex::new();
        index.upsert_document("club", "1", &body("a")).await.unwrap();

        assert_eq!(
            index.delete_document("club", "1").await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            index.delete_document("club", "1").await.unwrap(),
            DeleteOutcome::NotFound
        );
        assert_eq!(
            index.delete_document("missing", "1").await.unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn injected_faults_classify_correctly() {
        let index = MemoryIndex::new();
        index.reject_document("team", "9");
        let rejected = index.upsert_document("team", "9", &body("x")).await.unwrap_err();
        assert!(!rejected.is_connectivity());

        index.set_writes_unavailable("team", true);
        let outage = index.upsert_document("team", "1", &body("x")).await.unwrap_err();
        assert!(outage.is_connectivity());
        assert_eq!(index.write_calls(), 2);
    }
}
