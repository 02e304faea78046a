use indexsync_core::AnalyzerConfig;

/// Sync-engine configuration.
///
/// Controls table parallelism, the periodic trigger interval, and the analyzer
/// every index is provisioned with.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tables synced concurrently within one cycle. Values below 1 are
    /// treated as 1.
    pub max_concurrent_tables: usize,
    /// Interval between trigger-driven cycles in milliseconds.
    pub cycle_interval_ms: u64,
    /// Analyzer and text fields applied to every index descriptor.
    pub analyzer: AnalyzerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tables: 4,
            cycle_interval_ms: 120_000,
            analyzer: AnalyzerConfig::default(),
        }
    }
}
