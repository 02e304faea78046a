//! indexsync server: moves row changes from a relational store into a search
//! index, one watermark per table.

pub mod checkpoint;
pub mod engine;
pub mod index;
pub mod metrics;
pub mod network;
pub mod service;
pub mod source;

pub use checkpoint::{CheckpointError, CheckpointStore};
pub use engine::{CycleRejected, CycleReport, SyncEngine, TableResult, TableStage};
pub use index::{IndexBackend, IndexError, IndexProvisioner};
pub use service::SyncConfig;
pub use source::{SourceError, SourceStore};
