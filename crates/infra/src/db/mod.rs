//! Database adapters: connection pools, routing, migrations and pool metrics.

pub mod connection;
pub mod metrics;
pub mod migrate;
pub mod stats;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

pub use connection::{Connected, ConnectionManager, DatabaseRouter, DbTarget, Target, ping};
pub use metrics::PoolMetricsExporter;
pub use migrate::{MigrationOutcome, MigrationSettings, apply_migrations};
pub use stats::{PoolStats, PoolStatsCollector, PoolStatsSource, WaitStats};

/// Fatal startup failures. The service must not come up after any of these.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid database configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to connect to {target} database at {endpoint}: {source}")]
    Connect {
        target: &'static str,
        endpoint: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to read migrations from {}: {source}", path.display())]
    MigrationSource {
        path: PathBuf,
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    #[error("schema migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}
