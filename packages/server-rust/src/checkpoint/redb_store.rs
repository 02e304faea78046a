//! redb-backed [`CheckpointStore`].
//!
//! Watermarks live in a single table keyed by source table name. Values are
//! RFC 3339 text at microsecond precision so the file stays inspectable with
//! generic redb tooling.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use indexsync_core::{decode_timestamp, encode_timestamp, Watermarks, EPOCH};
use redb::{Database, TableDefinition};
use tracing::{debug, info, instrument};

use super::{CheckpointError, CheckpointStore};

// Key: source table name, Value: encoded watermark
const WATERMARKS: TableDefinition<&str, &str> = TableDefinition::new("watermarks");

/// Durable watermark store in a single redb file.
///
/// redb calls block, so every operation runs on the blocking thread pool.
/// A committed write transaction is durable, which is what `save` promises.
#[derive(Clone)]
pub struct RedbCheckpointStore {
    db: Arc<Database>,
}

impl RedbCheckpointStore {
    /// Opens or creates the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if the file cannot be created or the
    /// watermark table cannot be initialized.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(CheckpointError::io)?;
        }

        let db = Database::create(path).map_err(CheckpointError::io)?;

        let txn = db.begin_write().map_err(CheckpointError::io)?;
        txn.open_table(WATERMARKS).map_err(CheckpointError::io)?;
        txn.commit().map_err(CheckpointError::io)?;

        info!("opened checkpoint database");
        Ok(Self { db: Arc::new(db) })
    }

    fn load_blocking(db: &Database, tables: &[String]) -> Result<Watermarks, CheckpointError> {
        let txn = db.begin_read().map_err(CheckpointError::io)?;
        let table = txn.open_table(WATERMARKS).map_err(CheckpointError::io)?;

        let mut marks = Watermarks::new();
        for name in tables {
            let at = match table.get(name.as_str()).map_err(CheckpointError::io)? {
                Some(stored) => {
                    decode_timestamp(stored.value()).map_err(|err| CheckpointError::Corrupt {
                        table: name.clone(),
                        reason: err.to_string(),
                    })?
                }
                None => EPOCH,
            };
            marks.set(name.clone(), at);
        }
        Ok(marks)
    }

    fn save_blocking(db: &Database, marks: &Watermarks) -> Result<(), CheckpointError> {
        let txn = db.begin_write().map_err(CheckpointError::io)?;
        {
            let mut table = txn.open_table(WATERMARKS).map_err(CheckpointError::io)?;
            for (name, at) in marks.iter() {
                let encoded = encode_timestamp(at);
                table
                    .insert(name, encoded.as_str())
                    .map_err(CheckpointError::io)?;
            }
        }
        txn.commit().map_err(CheckpointError::io)?;
        debug!(tables = marks.len(), "persisted watermarks");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for RedbCheckpointStore {
    async fn load(&self, tables: &[String]) -> Result<Watermarks, CheckpointError> {
        let db = Arc::clone(&self.db);
        let tables = tables.to_vec();
        tokio::task::spawn_blocking(move || Self::load_blocking(&db, &tables))
            .await
            .map_err(CheckpointError::io)?
    }

    async fn save(&self, marks: &Watermarks) -> Result<(), CheckpointError> {
        let db = Arc::clone(&self.db);
        let marks = marks.clone();
        tokio::task::spawn_blocking(move || Self::save_blocking(&db, &marks))
            .await
            .map_err(CheckpointError::io)?
    }
}
