//! Per-table and per-cycle outcome types returned to the trigger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Stage a table was in when its cycle failed.
///
/// Stages run in declaration order; `Loading` is the shared watermark load
/// that precedes every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStage {
    Loading,
    Provisioning,
    FetchingUpdates,
    Normalizing,
    Upserting,
    FetchingDeletes,
    Deleting,
    Checkpointing,
}

impl TableStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Provisioning => "provisioning",
            Self::FetchingUpdates => "fetching_updates",
            Self::Normalizing => "normalizing",
            Self::Upserting => "upserting",
            Self::FetchingDeletes => "fetching_deletes",
            Self::Deleting => "deleting",
            Self::Checkpointing => "checkpointing",
        }
    }
}

impl fmt::Display for TableStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts for a table whose cycle completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    /// Documents upserted.
    pub updated: u64,
    /// Documents deleted, including deletes of already-absent documents.
    pub deleted: u64,
    /// Rows that could not be normalized or were rejected by the index.
    /// They are refetched next cycle.
    pub failed_rows: u64,
    /// Watermark persisted at the end of the cycle.
    pub watermark: DateTime<Utc>,
}

/// Why a table's cycle was aborted. Its watermark was not advanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{stage} failed: {cause}")]
pub struct TableFailure {
    pub stage: TableStage,
    pub cause: String,
}

impl TableFailure {
    pub fn new(stage: TableStage, cause: impl fmt::Display) -> Self {
        Self {
            stage,
            cause: cause.to_string(),
        }
    }
}

/// Terminal state of one table for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableResult {
    Success(TableSummary),
    Failure(TableFailure),
}

impl TableResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn summary(&self) -> Option<&TableSummary> {
        match self {
            Self::Success(summary) => Some(summary),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&TableFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub result: TableResult,
}

/// Aggregate result of one `run_sync_cycle` call, tables in configuration
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<TableReport>,
}

impl CycleReport {
    /// Result for `table`, if it was part of the cycle.
    #[must_use]
    pub fn table(&self, table: &str) -> Option<&TableResult> {
        self.tables
            .iter()
            .find(|report| report.table == table)
            .map(|report| &report.result)
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.tables.iter().filter(|t| t.result.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.tables.len() - self.succeeded()
    }
}

/// A cycle that was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CycleRejected {
    /// Another cycle over the same tables is still running.
    #[error("a sync cycle is already in progress")]
    InProgress,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn report() -> CycleReport {
        let at = Utc.timestamp_opt(1_000, 0).unwrap();
        CycleReport {
            cycle_id: Uuid::nil(),
            started_at: at,
            finished_at: at,
            tables: vec![
                TableReport {
                    table: "player".to_string(),
                    result: TableResult::Success(TableSummary {
                        updated: 2,
                        deleted: 0,
                        failed_rows: 0,
                        watermark: at,
                    }),
                },
                TableReport {
                    table: "team".to_string(),
                    result: TableResult::Failure(TableFailure::new(
                        TableStage::Upserting,
                        "index backend unavailable: connection refused",
                    )),
                },
            ],
        }
    }

    #[test]
    fn counts_successes_and_failures() {
        let report = report();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.table("player").unwrap().is_success());
        assert_eq!(
            report.table("team").unwrap().failure().unwrap().stage,
            TableStage::Upserting
        );
        assert!(report.table("club").is_none());
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["tables"][0]["table"], "player");
        assert_eq!(json["tables"][0]["status"], "success");
        assert_eq!(json["tables"][0]["updated"], 2);
        assert_eq!(json["tables"][1]["status"], "failure");
        assert_eq!(json["tables"][1]["stage"], "upserting");
        assert_eq!(
            json["tables"][1]["cause"],
            json!("index backend unavailable: connection refused")
        );
    }

    #[test]
    fn failure_display_names_stage() {
        let failure = TableFailure::new(TableStage::Provisioning, "bad analyzer");
        assert_eq!(failure.to_string(), "provisioning failed: bad analyzer");
    }

    #[test]
    fn stages_are_ordered() {
        assert!(TableStage::Provisioning < TableStage::Upserting);
        assert!(TableStage::Deleting < TableStage::Checkpointing);
    }
}
