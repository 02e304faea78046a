//! Durable per-table watermark persistence.
//!
//! Defines [`CheckpointStore`], the only owner of persisted watermarks. The
//! sync engine loads every configured table's watermark at cycle start and
//! saves a table's advanced watermark once that table's writes are done.
//!
//! Implementations:
//! - [`MemoryCheckpointStore`]: process-local, for tests and ephemeral runs
//! - [`NullCheckpointStore`]: never persists, every cycle starts from epoch
//! - `RedbCheckpointStore` (feature `redb`): a single-file redb database

mod memory;
mod null;
#[cfg(feature = "redb")]
mod redb_store;

pub use memory::MemoryCheckpointStore;
pub use null::NullCheckpointStore;
#[cfg(feature = "redb")]
pub use redb_store::RedbCheckpointStore;

use async_trait::async_trait;
use indexsync_core::Watermarks;

/// Errors from loading or persisting watermarks.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The backing storage could not be read or written.
    #[error("checkpoint storage error: {0}")]
    Io(String),
    /// A persisted watermark could not be decoded.
    #[error("corrupt watermark for table `{table}`: {reason}")]
    Corrupt { table: String, reason: String },
}

impl CheckpointError {
    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::Io(err.to_string())
    }
}

/// Persists and retrieves per-table watermarks.
///
/// Used as `Arc<dyn CheckpointStore>`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns a watermark for every requested table.
    ///
    /// Tables without a persisted record map to the epoch; absence is never
    /// an error.
    async fn load(&self, tables: &[String]) -> Result<Watermarks, CheckpointError>;

    /// Durably overwrites the persisted watermark of every table in `marks`.
    ///
    /// Tables not present in `marks` are left untouched.
    async fn save(&self, marks: &Watermarks) -> Result<(), CheckpointError>;
}
