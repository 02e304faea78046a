//! Process lifecycle state shared by the sync worker and the status server.
//!
//! Health transitions are lock-free (`ArcSwap`). Running sync cycles hold an
//! [`InFlightGuard`] so shutdown can wait for them before the process exits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle state: `Starting -> Ready -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Dependencies are being connected; no cycle has been scheduled.
    Starting,
    /// The worker is scheduling cycles.
    Ready,
    /// Shutdown was requested; no new cycle starts, a running one finishes.
    Draining,
    /// No cycle is running and none will start.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Coordinates shutdown between the signal handler, the worker and the
/// status server.
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            in_flight: Arc::new(AtomicU64::new(0)),
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Receiver that flips to `true` once shutdown is triggered.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_receiver();
        // A closed channel can't happen while `self` is alive.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Moves to `Draining` and notifies every receiver, including ones that
    /// subscribe later.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
        self.shutdown_signal.send_replace(true);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Marks one unit of work as running until the guard is dropped.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits up to `timeout` for running work to finish.
    ///
    /// Moves to `Stopped` and returns `true` once nothing is in flight;
    /// returns `false` and stays `Draining` if the timeout expires first.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.in_flight.load(Ordering::Relaxed) == 0 {
                self.health_state.store(Arc::new(HealthState::Stopped));
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter on drop, unwinding included.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let controller = ShutdownController::new();
        assert_eq!(controller.health_state(), HealthState::Starting);

        controller.set_ready();
        assert_eq!(controller.health_state(), HealthState::Ready);

        controller.trigger_shutdown();
        assert_eq!(controller.health_state(), HealthState::Draining);
    }

    #[test]
    fn state_names() {
        assert_eq!(HealthState::Ready.as_str(), "ready");
        assert_eq!(
            serde_json::to_value(HealthState::Draining).unwrap(),
            serde_json::json!("draining")
        );
    }

    #[test]
    fn in_flight_guard_counts() {
        let controller = ShutdownController::new();
        let first = controller.in_flight_guard();
        let second = controller.in_flight_guard();
        assert_eq!(controller.in_flight_count(), 2);

        drop(first);
        assert_eq!(controller.in_flight_count(), 1);
        drop(second);
        assert_eq!(controller.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn wait_for_shutdown_resolves_after_trigger() {
        let controller = Arc::new(ShutdownController::new());
        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.wait_for_shutdown().await })
        };

        controller.trigger_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_shutdown_returns_if_already_triggered() {
        let controller = ShutdownController::new();
        controller.trigger_shutdown();
        tokio::time::timeout(Duration::from_secs(1), controller.wait_for_shutdown())
            .await
            .expect("already triggered");
    }

    #[test]
    fn receiver_created_after_trigger_sees_shutdown() {
        let controller = ShutdownController::new();
        controller.trigger_shutdown();
        assert!(*controller.shutdown_receiver().borrow());
    }

    #[tokio::test]
    async fn drain_waits_for_running_cycle() {
        let controller = ShutdownController::new();
        controller.set_ready();

        let guard = controller.in_flight_guard();
        controller.trigger_shutdown();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert!(controller.wait_for_drain(Duration::from_secs(2)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
        release.await.unwrap();
    }

    #[tokio::test]
    async fn drain_times_out_while_cycle_runs() {
        let controller = ShutdownController::new();
        let _guard = controller.in_flight_guard();
        controller.trigger_shutdown();

        assert!(!controller.wait_for_drain(Duration::from_millis(50)).await);
        assert_eq!(controller.health_state(), HealthState::Draining);
    }
}
