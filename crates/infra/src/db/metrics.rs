//! Pool statistics export through the `metrics` facade.
//!
//! Metric names follow the `sql_stats_*` family scraped by existing dashboards,
//! labelled by `db_name`.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::stats::PoolStatsSource;

pub const MAX_OPEN: &str = "sql_stats_connections_max_open";
pub const OPEN: &str = "sql_stats_connections_open";
pub const IN_USE: &str = "sql_stats_connections_in_use";
pub const IDLE: &str = "sql_stats_connections_idle";
pub const WAITED_FOR: &str = "sql_stats_connections_waited_for";
pub const BLOCKED_SECONDS: &str = "sql_stats_connections_blocked_seconds";

/// Publishes the statistics of a set of pools whenever [`record`](Self::record) runs.
#[derive(Clone, Default)]
pub struct PoolMetricsExporter {
    sources: Vec<Arc<dyn PoolStatsSource>>,
}

impl core::fmt::Debug for PoolMetricsExporter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.db_name()).collect();
        f.debug_struct("PoolMetricsExporter").field("sources", &names).finish()
    }
}

impl PoolMetricsExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl PoolStatsSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn sources(&self) -> usize {
        self.sources.len()
    }

    /// Register metric descriptions with the installed recorder.
    pub fn describe() {
        describe_gauge!(MAX_OPEN, "Maximum number of open connections to the database");
        describe_gauge!(OPEN, "The number of established connections both in use and idle");
        describe_gauge!(IN_USE, "The number of connections currently in use");
        describe_gauge!(IDLE, "The number of idle connections");
        describe_counter!(WAITED_FOR, "The total number of connections waited for");
        describe_gauge!(BLOCKED_SECONDS, "The total time blocked waiting for a new connection");
    }

    /// Snapshot every source and publish its values.
    pub fn record(&self) {
        for source in &self.sources {
            let stats = source.stats();
            let db_name = source.db_name().to_string();

            gauge!(MAX_OPEN, "db_name" => db_name.clone()).set(f64::from(stats.max_open));
            gauge!(OPEN, "db_name" => db_name.clone()).set(f64::from(stats.open));
            gauge!(IN_USE, "db_name" => db_name.clone()).set(f64::from(stats.in_use));
            gauge!(IDLE, "db_name" => db_name.clone()).set(f64::from(stats.idle));
            counter!(WAITED_FOR, "db_name" => db_name.clone()).absolute(stats.wait_count);
            gauge!(BLOCKED_SECONDS, "db_name" => db_name).set(stats.wait_duration.as_secs_f64());
        }
    }

    /// Record on every `interval` tick until `shutdown` is cancelled.
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("pool metrics exporter stopped");
                    return;
                }
                _ = ticker.tick() => self.record(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PoolStats;
    use metrics_exporter_prometheus::PrometheusBuilder;

    struct FixedStats {
        name: &'static str,
        stats: PoolStats,
    }

    impl PoolStatsSource for FixedStats {
        fn db_name(&self) -> &str {
            self.name
        }

        fn stats(&self) -> PoolStats {
            self.stats
        }
    }

    fn fixed(name: &'static str, open: u32, idle: u32) -> FixedStats {
        FixedStats {
            name,
            stats: PoolStats {
                max_open: 10,
                open,
                in_use: open - idle,
                idle,
                wait_count: 4,
                wait_duration: Duration::from_millis(1500),
            },
        }
    }

    #[test]
    fn record_publishes_every_source() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let exporter = PoolMetricsExporter::new()
            .with_source(fixed("db", 3, 1))
            .with_source(fixed("reader_db", 5, 5));

        metrics::with_local_recorder(&recorder, || {
            PoolMetricsExporter::describe();
            exporter.record();
        });

        let rendered = handle.render();
        for name in [MAX_OPEN, OPEN, IN_USE, IDLE, WAITED_FOR, BLOCKED_SECONDS] {
            assert!(
                rendered.contains(&format!("{name}{{db_name=\"db\"}}")),
                "missing {name} for db in:\n{rendered}"
            );
            assert!(
                rendered.contains(&format!("{name}{{db_name=\"reader_db\"}}")),
                "missing {name} for reader_db in:\n{rendered}"
            );
        }
    }

    #[test]
    fn empty_exporter_records_nothing() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let exporter = PoolMetricsExporter::new();
        metrics::with_local_recorder(&recorder, || exporter.record());
        assert_eq!(exporter.sources(), 0);
        assert!(!handle.render().contains(OPEN));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            PoolMetricsExporter::new()
                .with_source(fixed("db", 1, 1))
                .run(Duration::from_secs(15), shutdown.clone()),
        );
        tokio::time::sleep(Duration::from_secs(40)).await;
        shutdown.cancel();
        task.await.unwrap();
    }
}
