//! Background worker driving sync cycles.
//!
//! `BackgroundWorker<R>` feeds tasks from an mpsc channel to a
//! `BackgroundRunnable` and calls its tick hook on a fixed interval.
//! `SyncRunnable` is the runnable the binary uses: every tick and every
//! `SyncTask::RunNow` runs one cycle of the engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::{CycleRejected, SyncEngine};
use crate::network::{HealthState, ShutdownController};

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called on each tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker stops. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// SyncTask / SyncRunnable
// ---------------------------------------------------------------------------

/// On-demand requests for the sync worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTask {
    /// Run a cycle now instead of waiting for the next tick.
    RunNow,
}

/// Runs one sync cycle per tick or request.
///
/// Cycles are skipped once shutdown has been triggered. A running cycle holds
/// an in-flight guard so shutdown can wait for it to finish.
pub struct SyncRunnable {
    engine: Arc<SyncEngine>,
    shutdown: Arc<ShutdownController>,
}

impl SyncRunnable {
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>, shutdown: Arc<ShutdownController>) -> Self {
        Self { engine, shutdown }
    }

    async fn sync(&self) {
        if matches!(
            self.shutdown.health_state(),
            HealthState::Draining | HealthState::Stopped
        ) {
            debug!("shutdown in progress, not starting a sync cycle");
            return;
        }

        let _in_flight = self.shutdown.in_flight_guard();
        match self.engine.run_sync_cycle().await {
            Ok(report) if report.failed() > 0 => warn!(
                cycle_id = %report.cycle_id,
                failed = report.failed(),
                "sync cycle finished with failed tables"
            ),
            Ok(report) => debug!(cycle_id = %report.cycle_id, "sync cycle clean"),
            Err(CycleRejected::InProgress) => {}
        }
    }
}

#[async_trait]
impl BackgroundRunnable for SyncRunnable {
    type Task = SyncTask;

    async fn run(&mut self, task: SyncTask) {
        debug!(?task, "sync requested");
        self.sync().await;
    }

    async fn on_tick(&mut self) {
        self.sync().await;
    }

    async fn shutdown(&mut self) {
        info!("sync worker stopped");
    }
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The spawned task:
/// 1. Listens for tasks on the channel and calls `BackgroundRunnable::run()`
/// 2. Calls `BackgroundRunnable::on_tick()` at the configured interval
/// 3. Calls `BackgroundRunnable::shutdown()` when stopped
///
/// Tasks and ticks are handled one at a time. Ticks missed while a task runs
/// are skipped, not replayed.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Starts the worker with the given runnable and tick interval.
    ///
    /// The channel capacity is fixed at 16.
    pub fn start(mut runnable: R, tick_interval_ms: u64) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(16);
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut tick_interval =
                tokio::time::interval(Duration::from_millis(tick_interval_ms.max(1)));
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; consume it so on_tick
            // doesn't fire at startup.
            tick_interval.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break,
                        }
                    }
                    _ = tick_interval.tick() => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Submit a task to the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Stops the worker, waiting for the current task to complete.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::{TimeZone, Utc};
    use indexsync_core::TableSyncSpec;
    use serde_json::json;

    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::index::MemoryIndex;
    use crate::service::SyncConfig;
    use crate::source::MemorySource;

    struct CountingRunnable {
        run_count: Arc<AtomicU32>,
        tick_count: Arc<AtomicU32>,
        shutdown_called: Arc<AtomicU32>,
    }

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = SyncTask;

        async fn run(&mut self, _task: SyncTask) {
            self.run_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.tick_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.shutdown_called.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (CountingRunnable, Arc<AtomicU32>, Arc<AtomicU32>, Arc<AtomicU32>) {
        let run_count = Arc::new(AtomicU32::new(0));
        let tick_count = Arc::new(AtomicU32::new(0));
        let shutdown_called = Arc::new(AtomicU32::new(0));
        let runnable = CountingRunnable {
            run_count: run_count.clone(),
            tick_count: tick_count.clone(),
            shutdown_called: shutdown_called.clone(),
        };
        (runnable, run_count, tick_count, shutdown_called)
    }

    #[tokio::test]
    async fn start_submit_and_stop() {
        let (runnable, run_count, _, shutdown_called) = counting();
        let mut worker = BackgroundWorker::start(runnable, 60_000);

        worker.submit(SyncTask::RunNow).await.unwrap();
        worker.submit(SyncTask::RunNow).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(run_count.load(Ordering::SeqCst), 2);

        worker.stop().await;
        assert_eq!(shutdown_called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tick_fires_periodically() {
        let (runnable, _, tick_count, _) = counting();
        let mut worker = BackgroundWorker::start(runnable, 20);

        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.stop().await;

        assert!(tick_count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn submit_after_stop_returns_error() {
        let (runnable, _, _, _) = counting();
        let mut worker = BackgroundWorker::start(runnable, 60_000);
        worker.stop().await;

        assert!(worker.submit(SyncTask::RunNow).await.is_err());
    }

    fn engine() -> (Arc<SyncEngine>, Arc<MemoryIndex>) {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let spec = TableSyncSpec::new("player");
        let source = Arc::new(MemorySource::new(now));
        assert!(source.put_row(
            &spec,
            json!({"id": 1, "name": "Ana"}).as_object().cloned().unwrap(),
            now - chrono::Duration::seconds(5),
        ));
        let index = Arc::new(MemoryIndex::new());
        let engine = SyncEngine::new(
            vec![spec],
            source,
            index.clone(),
            Arc::new(MemoryCheckpointStore::new()),
            SyncConfig::default(),
        );
        (Arc::new(engine), index)
    }

    #[tokio::test]
    async fn run_now_triggers_a_cycle() {
        let (engine, index) = engine();
        let shutdown = Arc::new(ShutdownController::new());
        let mut worker =
            BackgroundWorker::start(SyncRunnable::new(engine.clone(), shutdown.clone()), 60_000);

        worker.submit(SyncTask::RunNow).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.stop().await;

        let report = engine.last_report().expect("a cycle ran");
        assert_eq!(report.succeeded(), 1);
        assert_eq!(index.document_count("player"), 1);
        assert_eq!(shutdown.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn no_cycle_after_shutdown_triggered() {
        let (engine, index) = engine();
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.trigger_shutdown();

        let mut runnable = SyncRunnable::new(engine.clone(), shutdown);
        runnable.run(SyncTask::RunNow).await;

        assert!(engine.last_report().is_none());
        assert_eq!(index.ensure_calls(), 0);
    }
}
