//! Incremental change-propagation engine.
//!
//! [`SyncEngine::run_sync_cycle`] is the single entry point the trigger calls.
//! Each configured table moves through its stages in strict order:
//!
//! 1. **Provisioning**: ensure the index exists with its descriptor
//! 2. **Fetching updates**: rows modified after the watermark, not deleted
//! 3. **Normalizing**: infer the batch schema once, normalize every row
//! 4. **Upserting**: create-or-replace each document by primary key
//! 5. **Fetching deletes**: rows soft-deleted after the *same* watermark
//! 6. **Deleting**: delete each by id, "not found" counts as done
//! 7. **Checkpointing**: persist the advanced watermark
//!
//! A connectivity failure at any stage aborts that table with its watermark
//! untouched; other tables carry on. Rows rejected individually are counted
//! and hold the watermark back so they are refetched next cycle.

mod report;

pub use report::{
    CycleRejected, CycleReport, TableFailure, TableReport, TableResult, TableStage, TableSummary,
};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use indexsync_core::{
    infer_batch, normalize, ChangedRow, DeletedRow, Document, IndexDescriptor, TableSyncSpec,
    Watermarks,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::index::{IndexBackend, IndexProvisioner};
use crate::metrics;
use crate::service::SyncConfig;
use crate::source::SourceStore;

/// A configured table and the descriptor of its index.
struct TableEntry {
    spec: TableSyncSpec,
    descriptor: IndexDescriptor,
}

/// Orchestrates sync cycles over a fixed set of tables.
///
/// Holds no watermark state of its own: watermarks are loaded from the
/// [`CheckpointStore`] at the start of every cycle and saved per table at the
/// end. At most one cycle runs at a time; an overlapping call is rejected
/// rather than queued.
pub struct SyncEngine {
    tables: Vec<TableEntry>,
    source: Arc<dyn SourceStore>,
    index: Arc<dyn IndexBackend>,
    provisioner: IndexProvisioner,
    checkpoints: Arc<dyn CheckpointStore>,
    config: SyncConfig,
    cycle_guard: Mutex<()>,
    last_report: ArcSwapOption<CycleReport>,
}

impl SyncEngine {
    /// Creates an engine for `tables`, deriving each index descriptor from
    /// `config.analyzer`. A table listed twice is kept once.
    #[must_use]
    pub fn new(
        tables: Vec<TableSyncSpec>,
        source: Arc<dyn SourceStore>,
        index: Arc<dyn IndexBackend>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: SyncConfig,
    ) -> Self {
        let mut seen = HashSet::new();
        let tables = tables
            .into_iter()
            .filter(|spec| {
                let first = seen.insert(spec.name.clone());
                if !first {
                    warn!(table = %spec.name, "table configured twice, ignoring duplicate");
                }
                first
            })
            .map(|spec| TableEntry {
                descriptor: IndexDescriptor::for_table(&spec, &config.analyzer),
                spec,
            })
            .collect();

        Self {
            tables,
            provisioner: IndexProvisioner::new(Arc::clone(&index)),
            source,
            index,
            checkpoints,
            config,
            cycle_guard: Mutex::new(()),
            last_report: ArcSwapOption::empty(),
        }
    }

    /// Replaces the derived descriptor of `table`. Unknown tables are ignored.
    #[must_use]
    pub fn with_descriptor(mut self, table: &str, descriptor: IndexDescriptor) -> Self {
        if let Some(entry) = self.tables.iter_mut().find(|e| e.spec.name == table) {
            entry.descriptor = descriptor;
        }
        self
    }

    /// Report of the most recently completed cycle.
    #[must_use]
    pub fn last_report(&self) -> Option<Arc<CycleReport>> {
        self.last_report.load_full()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.cycle_guard.try_lock().is_err()
    }

    /// Runs one sync cycle over every configured table.
    ///
    /// # Errors
    ///
    /// Returns [`CycleRejected::InProgress`] without doing anything if another
    /// cycle is still running. Table failures are not errors; they are
    /// reported per table in the returned [`CycleReport`].
    pub async fn run_sync_cycle(&self) -> Result<CycleReport, CycleRejected> {
        let Ok(_running) = self.cycle_guard.try_lock() else {
            warn!("previous sync cycle still running, skipping");
            metrics::record_skipped_cycle();
            return Err(CycleRejected::InProgress);
        };

        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let span = info_span!("sync_cycle", %cycle_id);

        let tables = self.sync_tables().instrument(span.clone()).await;

        let report = CycleReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            tables,
        };
        metrics::record_cycle(clock.elapsed());
        span.in_scope(|| {
            info!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                "sync cycle finished"
            );
        });

        self.last_report.store(Some(Arc::new(report.clone())));
        Ok(report)
    }

    async fn sync_tables(&self) -> Vec<TableReport> {
        let names: Vec<String> = self.tables.iter().map(|e| e.spec.name.clone()).collect();
        let watermarks = match self.checkpoints.load(&names).await {
            Ok(marks) => marks,
            Err(err) => {
                error!(error = %err, "failed to load watermarks, no table synced");
                return self
                    .tables
                    .iter()
                    .map(|entry| {
                        let result =
                            TableResult::Failure(TableFailure::new(TableStage::Loading, &err));
                        metrics::record_table(&entry.spec.name, &result);
                        TableReport {
                            table: entry.spec.name.clone(),
                            result,
                        }
                    })
                    .collect();
            }
        };

        // Built up front: a lazy `map` over borrowed entries makes the cycle
        // future fail the `Send` bound the worker needs.
        let pending: Vec<_> = self
            .tables
            .iter()
            .map(|entry| self.sync_table(entry, watermarks.get(&entry.spec.name)))
            .collect();

        stream::iter(pending)
            .buffered(self.config.max_concurrent_tables.max(1))
            .collect()
            .await
    }

    async fn sync_table(&self, entry: &TableEntry, watermark: DateTime<Utc>) -> TableReport {
        let span = info_span!("sync_table", table = %entry.spec.name);
        let result = match self.run_table(entry, watermark).instrument(span.clone()).await {
            Ok(summary) => {
                span.in_scope(|| {
                    info!(
                        updated = summary.updated,
                        deleted = summary.deleted,
                        failed_rows = summary.failed_rows,
                        watermark = %summary.watermark,
                        "table synced"
                    );
                });
                TableResult::Success(summary)
            }
            Err(failure) => {
                span.in_scope(|| {
                    warn!(
                        stage = %failure.stage,
                        cause = %failure.cause,
                        "table sync failed, watermark not advanced"
                    );
                });
                self.provisioner.forget(&entry.descriptor.name);
                TableResult::Failure(failure)
            }
        };

        metrics::record_table(&entry.spec.name, &result);
        TableReport {
            table: entry.spec.name.clone(),
            result,
        }
    }

    async fn run_table(
        &self,
        entry: &TableEntry,
        watermark: DateTime<Utc>,
    ) -> Result<TableSummary, TableFailure> {
        let TableEntry { spec, descriptor } = entry;
        let index = descriptor.name.as_str();

        debug!(stage = %TableStage::Provisioning);
        self.provisioner
            .ensure(descriptor)
            .await
            .map_err(|err| TableFailure::new(TableStage::Provisioning, err))?;

        debug!(stage = %TableStage::FetchingUpdates, %watermark);
        let snapshot = self
            .source
            .current_time()
            .await
            .map_err(|err| TableFailure::new(TableStage::FetchingUpdates, err))?;
        let mut progress = TableProgress::new(watermark, snapshot);
        let changed = self
            .source
            .query_changed(spec, watermark)
            .await
            .map_err(|err| TableFailure::new(TableStage::FetchingUpdates, err))?;

        debug!(stage = %TableStage::Normalizing, rows = changed.len());
        let documents = normalize_batch(spec, &changed, &mut progress);

        debug!(stage = %TableStage::Upserting, documents = documents.len());
        self.upsert_documents(index, documents, &mut progress).await?;

        debug!(stage = %TableStage::FetchingDeletes);
        let deleted = self
            .source
            .query_deleted(spec, watermark)
            .await
            .map_err(|err| TableFailure::new(TableStage::FetchingDeletes, err))?;

        debug!(stage = %TableStage::Deleting, rows = deleted.len());
        self.delete_documents(index, &deleted, &mut progress).await?;

        let target = progress.checkpoint_target();
        let held_back = progress.held_back();
        if !held_back.is_zero() {
            warn!(
                %target,
                snapshot = %progress.snapshot,
                held_back_secs = held_back.as_secs_f64(),
                failed_rows = progress.failed_rows,
                "watermark held back by rejected rows"
            );
        }
        metrics::record_held_back(&spec.name, held_back);
        debug!(stage = %TableStage::Checkpointing, %target);
        self.checkpoints
            .save(&Watermarks::single(spec.name.clone(), target))
            .await
            .map_err(|err| TableFailure::new(TableStage::Checkpointing, err))?;

        Ok(progress.into_summary(target))
    }

    async fn upsert_documents(
        &self,
        index: &str,
        documents: Vec<(DateTime<Utc>, Document)>,
        progress: &mut TableProgress,
    ) -> Result<(), TableFailure> {
        for (modified_at, doc) in documents {
            match self.index.upsert_document(index, &doc.id, &doc.body).await {
                Ok(()) => progress.updated += 1,
                Err(err) if err.is_connectivity() => {
                    return Err(TableFailure::new(TableStage::Upserting, err));
                }
                Err(err) => {
                    warn!(id = %doc.id, error = %err, "upsert rejected");
                    progress.row_failed(modified_at);
                }
            }
        }
        Ok(())
    }

    async fn delete_documents(
        &self,
        index: &str,
        rows: &[DeletedRow],
        progress: &mut TableProgress,
    ) -> Result<(), TableFailure> {
        for row in rows {
            match self.index.delete_document(index, &row.id).await {
                Ok(_) => progress.deleted += 1,
                Err(err) if err.is_connectivity() => {
                    return Err(TableFailure::new(TableStage::Deleting, err));
                }
                Err(err) => {
                    warn!(id = %row.id, error = %err, "delete rejected");
                    progress.row_failed(row.deleted_at);
                }
            }
        }
        Ok(())
    }
}

/// Infers the batch schema from its first row and normalizes every row.
/// Rows that cannot be normalized are counted as failed.
fn normalize_batch(
    spec: &TableSyncSpec,
    changed: &[ChangedRow],
    progress: &mut TableProgress,
) -> Vec<(DateTime<Utc>, Document)> {
    if changed.is_empty() {
        return Vec::new();
    }
    let schema = infer_batch(changed, &spec.reserved_fields());
    changed
        .iter()
        .filter_map(|row| match normalize(&row.fields, &spec.primary_key, &schema) {
            Ok(doc) => Some((row.modified_at, doc)),
            Err(err) => {
                warn!(error = %err, modified_at = %row.modified_at, "row skipped");
                progress.row_failed(row.modified_at);
                None
            }
        })
        .collect()
}

/// Counters and watermark bookkeeping for one table in one cycle.
#[derive(Debug)]
struct TableProgress {
    previous: DateTime<Utc>,
    snapshot: DateTime<Utc>,
    updated: u64,
    deleted: u64,
    failed_rows: u64,
    earliest_failure: Option<DateTime<Utc>>,
}

impl TableProgress {
    fn new(previous: DateTime<Utc>, snapshot: DateTime<Utc>) -> Self {
        Self {
            previous,
            snapshot,
            updated: 0,
            deleted: 0,
            failed_rows: 0,
            earliest_failure: None,
        }
    }

    fn row_failed(&mut self, at: DateTime<Utc>) {
        self.failed_rows += 1;
        self.earliest_failure = Some(self.earliest_failure.map_or(at, |earliest| earliest.min(at)));
    }

    /// The snapshot, held back to just before the earliest failed row, and
    /// never behind the watermark the cycle started from.
    fn checkpoint_target(&self) -> DateTime<Utc> {
        let target = match self.earliest_failure {
            Some(at) => self.snapshot.min(at - Duration::microseconds(1)),
            None => self.snapshot,
        };
        target.max(self.previous)
    }

    /// Distance between the snapshot and the checkpoint target.
    fn held_back(&self) -> std::time::Duration {
        (self.snapshot - self.checkpoint_target())
            .to_std()
            .unwrap_or_default()
    }

    fn into_summary(self, watermark: DateTime<Utc>) -> TableSummary {
        TableSummary {
            updated: self.updated,
            deleted: self.deleted,
            failed_rows: self.failed_rows,
            watermark,
        }
    }
}
