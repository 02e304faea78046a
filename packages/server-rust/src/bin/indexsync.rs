//! `indexsync` binary: PostgreSQL to OpenSearch change propagation.
//!
//! Runs a sync cycle at startup and then every `--interval-secs`, serving
//! health and metrics on the status port. `--once` runs a single cycle and
//! exits non-zero if any table failed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use indexsync_core::{AnalyzerConfig, TableSyncSpec, DEFAULT_GEO_FIELD, DEFAULT_NESTED_FIELD};
use indexsync_server::checkpoint::{CheckpointStore, NullCheckpointStore, RedbCheckpointStore};
use indexsync_server::index::{OpenSearchClient, OpenSearchConfig};
use indexsync_server::network::{NetworkConfig, ShutdownController, StatusServer};
use indexsync_server::service::{BackgroundWorker, SyncConfig, SyncRunnable, SyncTask};
use indexsync_server::source::{PgSourceConfig, PgSourceStore};
use indexsync_server::SyncEngine;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "indexsync",
    version,
    about = "Incrementally sync relational tables into a search index"
)]
struct Cli {
    /// PostgreSQL connection URL. Without it the `PGHOST`, `PGPORT`,
    /// `PGUSER`, `PGPASSWORD` and `PGDATABASE` variables are used.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// OpenSearch (or Elasticsearch) base URL.
    #[arg(long, env = "OPENSEARCH_NODE", default_value = "http://opensearch:9200")]
    opensearch_url: String,

    #[arg(long, env = "OPENSEARCH_USERNAME")]
    opensearch_user: Option<String>,

    #[arg(long, env = "OPENSEARCH_PASSWORD", hide_env_values = true)]
    opensearch_password: Option<String>,

    /// Comma-separated tables to sync, each with the column flags below.
    #[arg(
        long,
        env = "TABLES_TO_SYNC",
        value_delimiter = ',',
        default_value = "player,club,team"
    )]
    tables: Vec<String>,

    /// JSON file with an array of per-table settings. Overrides `--tables`.
    #[arg(long, env = "TABLE_CONFIG")]
    table_config: Option<PathBuf>,

    #[arg(long, default_value = "id")]
    primary_key: String,

    #[arg(long, default_value = "deleted_at")]
    soft_delete_field: String,

    #[arg(long, default_value = "updated_at")]
    modified_field: String,

    /// Column indexed as a geo point. Empty disables.
    #[arg(long, default_value = DEFAULT_GEO_FIELD)]
    geo_field: String,

    /// Column indexed as a structured object. Empty disables.
    #[arg(long, default_value = DEFAULT_NESTED_FIELD)]
    nested_field: String,

    /// Fields analyzed with the transliterating analyzer.
    #[arg(long, value_delimiter = ',', default_value = "name")]
    text_fields: Vec<String>,

    /// redb file holding per-table watermarks.
    #[arg(long, env = "CHECKPOINT_PATH", default_value = "./data/watermarks.redb")]
    checkpoint_path: PathBuf,

    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = 120)]
    interval_secs: u64,

    #[arg(long, default_value_t = 4)]
    max_concurrent_tables: usize,

    /// Timeout for each search-index request.
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    #[arg(long, env = "STATUS_HOST", default_value = "0.0.0.0")]
    status_host: String,

    #[arg(long, env = "STATUS_PORT", default_value_t = 9464)]
    status_port: u16,

    /// Run one cycle and exit.
    #[arg(long)]
    once: bool,

    /// Ignore stored watermarks and reindex every live row.
    #[arg(long, requires = "once")]
    full_resync: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Cli {
    fn table_specs(&self) -> anyhow::Result<Vec<TableSyncSpec>> {
        let specs = match &self.table_config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading table config {}", path.display()))?;
                serde_json::from_str::<Vec<TableSyncSpec>>(&text)
                    .with_context(|| format!("parsing table config {}", path.display()))?
            }
            None => self
                .tables
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(|name| TableSyncSpec {
                    primary_key: self.primary_key.clone(),
                    soft_delete_field: self.soft_delete_field.clone(),
                    modified_field: self.modified_field.clone(),
                    geo_field: non_empty(&self.geo_field),
                    nested_field: non_empty(&self.nested_field),
                    ..TableSyncSpec::new(name)
                })
                .collect(),
        };
        anyhow::ensure!(!specs.is_empty(), "no tables configured");
        Ok(specs)
    }

    fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            max_concurrent_tables: self.max_concurrent_tables,
            cycle_interval_ms: self.interval_secs.saturating_mul(1000),
            analyzer: AnalyzerConfig {
                text_fields: self
                    .text_fields
                    .iter()
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect(),
                ..AnalyzerConfig::default()
            },
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let tables = cli.table_specs()?;
    let config = cli.sync_config();
    let metrics = indexsync_server::metrics::install_prometheus()?;

    let source = Arc::new(
        PgSourceStore::connect(&PgSourceConfig::new(cli.database_url.clone()))
            .await
            .context("connecting to PostgreSQL")?,
    );
    let index = Arc::new(OpenSearchClient::new(&OpenSearchConfig {
        url: cli.opensearch_url.clone(),
        username: cli.opensearch_user.clone(),
        password: cli.opensearch_password.clone(),
        request_timeout: Duration::from_secs(cli.request_timeout_secs),
    })?);
    let checkpoints: Arc<dyn CheckpointStore> = if cli.full_resync {
        warn!("full resync: stored watermarks are ignored and not updated");
        Arc::new(NullCheckpointStore)
    } else {
        Arc::new(RedbCheckpointStore::open(&cli.checkpoint_path)?)
    };

    info!(
        tables = ?tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        interval_secs = cli.interval_secs,
        "starting indexsync"
    );
    let interval_ms = config.cycle_interval_ms;
    let engine = Arc::new(SyncEngine::new(
        tables,
        source.clone(),
        index,
        checkpoints,
        config,
    ));

    if cli.once {
        let report = engine.run_sync_cycle().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        source.close().await;
        anyhow::ensure!(report.failed() == 0, "{} table(s) failed", report.failed());
        return Ok(());
    }

    let shutdown = Arc::new(ShutdownController::new());
    let mut status = StatusServer::new(
        NetworkConfig {
            host: cli.status_host.clone(),
            port: cli.status_port,
            ..NetworkConfig::default()
        },
        Arc::clone(&engine),
        Arc::clone(&shutdown),
        Some(metrics),
    );
    status.start().await?;
    let server = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(status.serve(async move { shutdown.wait_for_shutdown().await }))
    };

    let mut worker = BackgroundWorker::start(
        SyncRunnable::new(Arc::clone(&engine), Arc::clone(&shutdown)),
        interval_ms,
    );
    shutdown.set_ready();
    worker.submit(SyncTask::RunNow).await?;

    shutdown_signal().await;
    info!("shutdown requested, waiting for the running cycle");
    shutdown.trigger_shutdown();
    worker.stop().await;
    if !shutdown.wait_for_drain(Duration::from_secs(30)).await {
        warn!("drain timed out with a cycle still running");
    }

    server.await??;
    source.close().await;
    Ok(())
}
