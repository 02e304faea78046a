//! Engine configuration and the background worker that triggers cycles.

pub mod config;
pub mod worker;

pub use config::SyncConfig;
pub use worker::{BackgroundRunnable, BackgroundWorker, SyncRunnable, SyncTask};
