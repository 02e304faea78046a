//! In-memory [`CheckpointStore`].

use async_trait::async_trait;
use indexsync_core::Watermarks;
use parking_lot::Mutex;

use super::{CheckpointError, CheckpointStore};

/// Process-local watermark store.
///
/// Survives across cycles but not across restarts. Save failures can be
/// injected for tests.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    marks: Mutex<Watermarks>,
    fail_saves: Mutex<bool>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with `marks`.
    #[must_use]
    pub fn with_marks(marks: Watermarks) -> Self {
        Self {
            marks: Mutex::new(marks),
            fail_saves: Mutex::new(false),
        }
    }

    /// Current persisted state.
    #[must_use]
    pub fn snapshot(&self) -> Watermarks {
        self.marks.lock().clone()
    }

    /// Makes every subsequent `save` fail until reset.
    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, tables: &[String]) -> Result<Watermarks, CheckpointError> {
        let marks = self.marks.lock();
        Ok(tables
            .iter()
            .map(|table| (table.clone(), marks.get(table)))
            .collect())
    }

    async fn save(&self, marks: &Watermarks) -> Result<(), CheckpointError> {
        if *self.fail_saves.lock() {
            return Err(CheckpointError::Io("injected save failure".to_string()));
        }
        let mut stored = self.marks.lock();
        for (table, at) in marks.iter() {
            stored.set(table, at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use indexsync_core::EPOCH;

    use super::*;

    #[tokio::test]
    async fn load_returns_epoch_for_unknown_tables() {
        let store = MemoryCheckpointStore::new();
        let marks = store
            .load(&["player".to_string(), "club".to_string()])
            .await
            .unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks.get("player"), EPOCH);
        assert_eq!(marks.get("club"), EPOCH);
    }

    #[tokio::test]
    async fn save_overwrites_only_present_tables() {
        let t1 = Utc.timestamp_opt(1_000, 0).unwrap();
        let t2 = Utc.timestamp_opt(2_000, 0).unwrap();
        let mut seed = Watermarks::single("player", t1);
        seed.set("club", t1);
        let store = MemoryCheckpointStore::with_marks(seed);

        store.save(&Watermarks::single("club", t2)).await.unwrap();

        let marks = store.snapshot();
        assert_eq!(marks.get("player"), t1);
        assert_eq!(marks.get("club"), t2);
    }

    #[tokio::test]
    async fn injected_failure_leaves_state_untouched() {
        let store = MemoryCheckpointStore::new();
        store.set_fail_saves(true);
        let at = Utc.timestamp_opt(5, 0).unwrap();

        assert!(store.save(&Watermarks::single("team", at)).await.is_err());
        assert!(store.snapshot().is_empty());

        store.set_fail_saves(false);
        store.save(&Watermarks::single("team", at)).await.unwrap();
        assert_eq!(store.snapshot().get("team"), at);
    }
}
