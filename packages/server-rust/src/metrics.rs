//! Metric names and recording helpers.
//!
//! Recording goes through the `metrics` facade; without an installed recorder
//! (tests, `--once` runs) every call is a no-op. The binary installs a
//! Prometheus recorder whose handle backs `GET /metrics`.

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::engine::TableResult;

pub const DOCUMENTS_UPSERTED: &str = "indexsync_documents_upserted_total";
pub const DOCUMENTS_DELETED: &str = "indexsync_documents_deleted_total";
pub const ROW_FAILURES: &str = "indexsync_row_failures_total";
pub const TABLE_FAILURES: &str = "indexsync_table_failures_total";
pub const CYCLES: &str = "indexsync_cycles_total";
pub const CYCLES_SKIPPED: &str = "indexsync_cycles_skipped_total";
pub const CYCLE_DURATION: &str = "indexsync_cycle_duration_seconds";
/// How far a table's saved watermark trails its cycle snapshot because of
/// rejected rows. Stays above zero while a row keeps failing.
pub const WATERMARK_HELD_BACK: &str = "indexsync_watermark_held_back_seconds";

/// Installs the global Prometheus recorder.
///
/// # Errors
///
/// Fails if a recorder is already installed.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

pub(crate) fn record_table(table: &str, result: &TableResult) {
    match result {
        TableResult::Success(summary) => {
            counter!(DOCUMENTS_UPSERTED, "table" => table.to_string()).increment(summary.updated);
            counter!(DOCUMENTS_DELETED, "table" => table.to_string()).increment(summary.deleted);
            if summary.failed_rows > 0 {
                counter!(ROW_FAILURES, "table" => table.to_string())
                    .increment(summary.failed_rows);
            }
        }
        TableResult::Failure(failure) => {
            counter!(
                TABLE_FAILURES,
                "table" => table.to_string(),
                "stage" => failure.stage.as_str()
            )
            .increment(1);
        }
    }
}

pub(crate) fn record_held_back(table: &str, held_back: Duration) {
    gauge!(WATERMARK_HELD_BACK, "table" => table.to_string()).set(held_back.as_secs_f64());
}

pub(crate) fn record_cycle(elapsed: Duration) {
    counter!(CYCLES).increment(1);
    histogram!(CYCLE_DURATION).record(elapsed.as_secs_f64());
}

pub(crate) fn record_skipped_cycle() {
    counter!(CYCLES_SKIPPED).increment(1);
}
