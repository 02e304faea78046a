//! Search-index access: index management and per-document writes.
//!
//! Defines [`IndexBackend`], the only way the sync engine touches the index,
//! and [`IndexProvisioner`], which makes sure an index exists with its
//! descriptor before anything is written to it.
//!
//! Implementations:
//! - [`OpenSearchClient`]: OpenSearch / Elasticsearch REST API via `reqwest`
//! - [`MemoryIndex`]: in-process indices with fault injection, for tests

mod memory;
mod opensearch;
mod provisioner;

pub use memory::MemoryIndex;
pub use opensearch::{OpenSearchClient, OpenSearchConfig};
pub use provisioner::IndexProvisioner;

use async_trait::async_trait;
use indexsync_core::{IndexDescriptor, Row};

/// Outcome of an index-create call. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreate {
    Created,
    AlreadyExists,
}

/// Outcome of a delete-by-id call. Both variants are success: in either case
/// the document is absent afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Errors from the index backend.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The backend could not be reached or is temporarily refusing work.
    #[error("index backend unavailable: {0}")]
    Unavailable(String),
    /// The backend understood the request and refused it.
    #[error("index backend rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },
}

impl IndexError {
    /// Connectivity-class failures abort the table; rejections only fail the
    /// single document.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Index-management and document-write interface.
///
/// Used as `Arc<dyn IndexBackend>`.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Creates the index with the descriptor's settings and mappings.
    /// An index that already exists is reported as
    /// [`IndexCreate::AlreadyExists`], not as an error.
    async fn ensure_index(&self, descriptor: &IndexDescriptor) -> Result<IndexCreate, IndexError>;

    /// Creates or replaces the document with id `id`.
    async fn upsert_document(&self, index: &str, id: &str, body: &Row) -> Result<(), IndexError>;

    /// Deletes the document with id `id`. A missing document is
    /// [`DeleteOutcome::NotFound`], not an error.
    async fn delete_document(&self, index: &str, id: &str) -> Result<DeleteOutcome, IndexError>;
}
