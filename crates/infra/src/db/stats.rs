//! Connection pool statistics.
//!
//! Pool size and idle counts come straight from the sqlx pool. sqlx does not
//! track waits, so every target records acquisitions that found the pool
//! saturated (no idle connection and no room to open one).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::DbTarget;

/// Point-in-time statistics of one connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Configured maximum number of open connections.
    pub max_open: u32,
    /// Connections currently open (in use + idle).
    pub open: u32,
    pub in_use: u32,
    pub idle: u32,
    /// Total acquisitions that had to wait for a connection.
    pub wait_count: u64,
    /// Total time spent in those waits.
    pub wait_duration: Duration,
}

/// Passive source of pool statistics, polled by an exporter.
pub trait PoolStatsSource: Send + Sync {
    /// Label identifying the pool (`db`, `reader_db`).
    fn db_name(&self) -> &str;

    fn stats(&self) -> PoolStats;
}

impl<S> PoolStatsSource for Arc<S>
where
    S: PoolStatsSource + ?Sized,
{
    fn db_name(&self) -> &str {
        (**self).db_name()
    }

    fn stats(&self) -> PoolStats {
        (**self).stats()
    }
}

/// Wait counters shared by every handle to the same pool.
#[derive(Debug, Default)]
pub struct WaitStats {
    count: AtomicU64,
    nanos: AtomicU64,
}

impl WaitStats {
    pub fn record(&self, waited: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

/// Statistics source for one routing target of a `DatabaseRouter`.
#[derive(Debug, Clone)]
pub struct PoolStatsCollector {
    db_name: &'static str,
    target: DbTarget,
}

impl PoolStatsCollector {
    pub fn new(db_name: &'static str, target: DbTarget) -> Self {
        Self { db_name, target }
    }
}

impl PoolStatsSource for PoolStatsCollector {
    fn db_name(&self) -> &str {
        self.db_name
    }

    fn stats(&self) -> PoolStats {
        let pool = self.target.pool();
        let open = pool.size();
        let idle = u32::try_from(pool.num_idle()).unwrap_or(u32::MAX);
        let waits = self.target.wait_stats();
        PoolStats {
            max_open: pool.options().get_max_connections(),
            open,
            in_use: open.saturating_sub(idle),
            idle,
            wait_count: waits.count(),
            wait_duration: waits.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_stats_accumulate() {
        let waits = WaitStats::default();
        waits.record(Duration::from_millis(3));
        waits.record(Duration::from_millis(7));
        assert_eq!(waits.count(), 2);
        assert_eq!(waits.total(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn lazy_pool_reports_configured_maximum() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(7)
            .connect_lazy("postgres://catalog@localhost/catalog")
            .unwrap();
        let collector = PoolStatsCollector::new("db", DbTarget::new(pool));
        let stats = collector.stats();
        assert_eq!(collector.db_name(), "db");
        assert_eq!(stats.max_open, 7);
        assert_eq!(stats.open, 0);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.wait_count, 0);
    }
}
