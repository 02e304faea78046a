//! No-op [`CheckpointStore`] implementation.
//!
//! [`NullCheckpointStore`] discards every save and reports the epoch for every
//! table, so each cycle re-reads the whole source. Used for one-shot full
//! re-index runs.

use async_trait::async_trait;
use indexsync_core::{Watermarks, EPOCH};

use super::{CheckpointError, CheckpointStore};

/// Checkpoint store that never remembers anything.
pub struct NullCheckpointStore;

#[async_trait]
impl CheckpointStore for NullCheckpointStore {
    async fn load(&self, tables: &[String]) -> Result<Watermarks, CheckpointError> {
        Ok(tables.iter().map(|table| (table.clone(), EPOCH)).collect())
    }

    async fn save(&self, _marks: &Watermarks) -> Result<(), CheckpointError> {
        Ok(())
    }
}
