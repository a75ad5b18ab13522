//! Connect to the catalog database, apply pending migrations and report pool state.
//!
//! Configuration comes from the `CATALOG_DB_*` environment variables. Migrations
//! are applied regardless of `CATALOG_DB_MIGRATE`. When `CATALOG_METRICS_ADDR`
//! is set the process stays up after migrating and serves pool metrics on that
//! address until interrupted.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use catalog_infra::db::PoolStatsSource;
use catalog_infra::{ConnectionManager, PoolMetricsExporter};

const METRICS_ADDR_ENV: &str = "CATALOG_METRICS_ADDR";
const METRICS_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    catalog_observability::init();

    let metrics_addr = std::env::var(METRICS_ADDR_ENV)
        .ok()
        .map(|v| v.parse::<SocketAddr>())
        .transpose()
        .with_context(|| format!("parsing {METRICS_ADDR_ENV}"))?;

    let router = ConnectionManager::from_env()
        .context("loading database configuration")?
        .connect()
        .await
        .context("connecting to catalog database")?
        .force_migrations()
        .initialize()
        .await
        .context("migrating catalog database")?;

    for source in [router.collector(), router.reader_collector()] {
        let stats = source.stats();
        info!(
            db_name = source.db_name(),
            max_open = stats.max_open,
            open = stats.open,
            idle = stats.idle,
            dedicated_reader = router.has_dedicated_reader(),
            "pool ready"
        );
    }

    let Some(addr) = metrics_addr else {
        return Ok(());
    };

    catalog_observability::install_prometheus(addr)?;
    PoolMetricsExporter::describe();
    let exporter = PoolMetricsExporter::new()
        .with_source(router.collector())
        .with_source(router.reader_collector());

    let shutdown = CancellationToken::new();
    let exporter_task = tokio::spawn(exporter.run(METRICS_INTERVAL, shutdown.clone()));

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    shutdown.cancel();
    exporter_task.await.context("metrics exporter task")?;
    Ok(())
}
