//! Ensures target indices exist before any document is written.

use std::collections::HashSet;
use std::sync::Arc;

use indexsync_core::IndexDescriptor;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use super::{IndexBackend, IndexCreate, IndexError};

/// Creates indices with their descriptor and remembers which ones are
/// confirmed for the process lifetime.
///
/// A confirmed index skips the backend round-trip on later cycles. A table
/// failure calls [`forget`](IndexProvisioner::forget) so the next cycle checks
/// the index again.
pub struct IndexProvisioner {
    backend: Arc<dyn IndexBackend>,
    confirmed: Mutex<HashSet<String>>,
}

impl IndexProvisioner {
    #[must_use]
    pub fn new(backend: Arc<dyn IndexBackend>) -> Self {
        Self {
            backend,
            confirmed: Mutex::new(HashSet::new()),
        }
    }

    /// Makes sure the index described by `descriptor` exists.
    ///
    /// # Errors
    ///
    /// Any backend failure other than "already exists". The caller must not
    /// write to the index in that case.
    #[instrument(skip_all, fields(index = %descriptor.name))]
    pub async fn ensure(&self, descriptor: &IndexDescriptor) -> Result<IndexCreate, IndexError> {
        let known = self.confirmed.lock().contains(&descriptor.name);
        if known {
            return Ok(IndexCreate::AlreadyExists);
        }

        let outcome = self.backend.ensure_index(descriptor).await?;
        match outcome {
            IndexCreate::Created => info!("created index"),
            IndexCreate::AlreadyExists => debug!("index already exists"),
        }
        self.confirmed.lock().insert(descriptor.name.clone());
        Ok(outcome)
    }

    /// Drops the confirmation for `index`.
    pub fn forget(&self, index: &str) {
        self.confirmed.lock().remove(index);
    }

    #[must_use]
    pub fn is_confirmed(&self, index: &str) -> bool {
        self.confirmed.lock().contains(index)
    }
}
