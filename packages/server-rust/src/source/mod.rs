//! Read-only access to the relational source of truth.
//!
//! The sync engine consumes the source only through [`SourceStore`]: the
//! source clock (for the cycle snapshot) and the two change queries.
//!
//! Implementations:
//! - [`MemorySource`]: in-process tables with fault injection, for tests
//! - `PgSourceStore` (feature `postgres`): PostgreSQL via `sqlx`

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemorySource;
#[cfg(feature = "postgres")]
pub use postgres::{PgSourceConfig, PgSourceStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexsync_core::{ChangedRow, DeletedRow, TableSyncSpec};

/// Errors from reading the source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source could not be reached.
    #[error("source unavailable: {0}")]
    Unavailable(String),
    /// The source answered but the query failed or returned unusable rows.
    #[error("source query failed: {0}")]
    Query(String),
}

/// Narrow read interface over the relational store.
///
/// Used as `Arc<dyn SourceStore>`.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Current time on the source's clock.
    ///
    /// The engine snapshots this before fetching so that watermarks and row
    /// timestamps are compared on one clock.
    async fn current_time(&self) -> Result<DateTime<Utc>, SourceError>;

    /// Rows whose modified column is strictly after `since` and whose
    /// soft-delete marker is unset, oldest first.
    async fn query_changed(
        &self,
        spec: &TableSyncSpec,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChangedRow>, SourceError>;

    /// Rows whose soft-delete marker is set strictly after `since`.
    async fn query_deleted(
        &self,
        spec: &TableSyncSpec,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeletedRow>, SourceError>;
}
