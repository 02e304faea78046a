//! `indexsync` core: table specs, watermarks, schema inference, and row
//! normalization for incremental relational-to-search-index propagation.
//!
//! Everything in this crate is pure; I/O lives in `indexsync-server`.

pub mod descriptor;
pub mod normalize;
pub mod schema;
pub mod table;
pub mod types;
pub mod watermark;

pub use descriptor::{AnalyzerConfig, IndexDescriptor};
pub use normalize::{normalize, NormalizeError};
pub use schema::{infer, infer_batch, FieldKind, FieldSchemaMap, ReservedFields};
pub use table::{TableSyncSpec, DEFAULT_GEO_FIELD, DEFAULT_NESTED_FIELD};
pub use types::{document_id, ChangedRow, DeletedRow, Document, Row};
pub use watermark::{decode_timestamp, encode_timestamp, Watermarks, EPOCH};
