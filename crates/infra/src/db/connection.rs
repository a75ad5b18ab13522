//! Primary/reader connection pools and their startup sequence.
//!
//! Startup is split into two explicit phases so callers decide when the service
//! becomes ready:
//!
//! 1. [`ConnectionManager::connect`] opens and pings the primary pool and, when
//!    configured, the reader pool.
//! 2. [`Connected::initialize`] applies pending migrations (if enabled) and hands
//!    back the [`DatabaseRouter`] used by repositories.

use std::sync::Arc;
use std::time::Instant;

use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use tracing::{info, instrument};

use super::InitError;
use super::migrate::{MigrationOutcome, MigrationSettings, apply_migrations};
use super::stats::{PoolStatsCollector, WaitStats};
use crate::config::{DatabaseConfig, Endpoint};

/// Named routing targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Writable primary; migrations always run here.
    Primary,
    /// Read traffic; the primary unless a replica is configured.
    Reader,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Reader => "reader",
        }
    }
}

/// A connection pool plus the wait statistics recorded against it.
///
/// Clones share both the pool and the statistics.
#[derive(Debug, Clone)]
pub struct DbTarget {
    pool: PgPool,
    waits: Arc<WaitStats>,
}

impl DbTarget {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            waits: Arc::new(WaitStats::default()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn wait_stats(&self) -> &WaitStats {
        &self.waits
    }

    /// True if both handles point at the same pool.
    pub fn same_pool(&self, other: &DbTarget) -> bool {
        Arc::ptr_eq(&self.waits, &other.waits)
    }

    /// Acquire a connection, recording the wait if the pool was saturated.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, sqlx::Error> {
        let max = self.pool.options().get_max_connections();
        let saturated = self.pool.num_idle() == 0 && self.pool.size() >= max;
        let started = Instant::now();
        let conn = self.pool.acquire().await;
        if saturated {
            self.waits.record(started.elapsed());
        }
        conn
    }
}

/// Routing policy for catalog queries: a primary target and a reader target.
///
/// Without a replica the reader target is the primary target itself (same pool,
/// same statistics), not a second pool to the same server.
#[derive(Debug, Clone)]
pub struct DatabaseRouter {
    primary: DbTarget,
    reader: DbTarget,
}

impl DatabaseRouter {
    pub fn new(primary: DbTarget, reader: Option<DbTarget>) -> Self {
        let reader = reader.unwrap_or_else(|| primary.clone());
        Self { primary, reader }
    }

    /// Router over a single pool used for both targets.
    pub fn single(pool: PgPool) -> Self {
        Self::new(DbTarget::new(pool), None)
    }

    pub fn route(&self, target: Target) -> &DbTarget {
        match target {
            Target::Primary => &self.primary,
            Target::Reader => &self.reader,
        }
    }

    pub fn primary(&self) -> &DbTarget {
        &self.primary
    }

    pub fn reader(&self) -> &DbTarget {
        &self.reader
    }

    /// True if reads go to a separate replica pool.
    pub fn has_dedicated_reader(&self) -> bool {
        !self.primary.same_pool(&self.reader)
    }

    pub fn collector(&self) -> PoolStatsCollector {
        PoolStatsCollector::new("db", self.primary.clone())
    }

    pub fn reader_collector(&self) -> PoolStatsCollector {
        PoolStatsCollector::new("reader_db", self.reader.clone())
    }
}

/// Opens the catalog's connection pools from a [`DatabaseConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    config: DatabaseConfig,
}

impl ConnectionManager {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    /// Manager configured from the `CATALOG_DB_*` environment variables.
    pub fn from_env() -> Result<Self, InitError> {
        Ok(Self::new(DatabaseConfig::from_env()?))
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Open and ping the primary pool, then the reader pool if one is configured.
    pub async fn connect(&self) -> Result<Connected, InitError> {
        let primary = open_pool(&self.config, &self.config.endpoint, Target::Primary).await?;
        let reader = match &self.config.read_endpoint {
            Some(endpoint) => Some(open_pool(&self.config, endpoint, Target::Reader).await?),
            None => {
                info!("no reader endpoint configured; reads share the primary pool");
                None
            }
        };

        Ok(Connected {
            router: DatabaseRouter::new(DbTarget::new(primary), reader.map(DbTarget::new)),
            migrations: MigrationSettings::from_config(&self.config),
        })
    }

    /// Both startup phases: connect, then initialize.
    pub async fn start(&self) -> Result<DatabaseRouter, InitError> {
        self.connect().await?.initialize().await
    }
}

/// Pools are open and reachable; migrations have not run yet.
#[derive(Debug)]
pub struct Connected {
    router: DatabaseRouter,
    migrations: MigrationSettings,
}

impl Connected {
    pub fn migration_settings(&self) -> &MigrationSettings {
        &self.migrations
    }

    /// Run migrations in [`initialize`](Self::initialize) whatever the configuration says.
    pub fn force_migrations(mut self) -> Self {
        self.migrations.enabled = true;
        self
    }

    /// Apply pending migrations against the primary (when enabled) and return
    /// the ready router.
    pub async fn initialize(self) -> Result<DatabaseRouter, InitError> {
        if !self.migrations.enabled {
            info!("skipping schema migration");
            return Ok(self.router);
        }

        match apply_migrations(self.router.primary().pool(), &self.migrations.path).await? {
            MigrationOutcome::NoChange => info!("schema already up to date"),
            MigrationOutcome::Applied(count) => info!(count, "schema migration applied"),
        }
        Ok(self.router)
    }
}

#[instrument(
    skip(config, endpoint, target),
    fields(endpoint = %endpoint, database = %config.name, target = target.as_str()),
    err
)]
async fn open_pool(
    config: &DatabaseConfig,
    endpoint: &Endpoint,
    target: Target,
) -> Result<PgPool, InitError> {
    info!(
        "connecting to {}/{}?timeout={}s",
        endpoint,
        config.name,
        config.connect_timeout.as_secs()
    );

    let connect_failed = |source: sqlx::Error| InitError::Connect {
        target: target.as_str(),
        endpoint: endpoint.to_string(),
        source,
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .connect_with(config.connect_options(endpoint))
        .await
        .map_err(connect_failed)?;

    ping(&pool).await.map_err(connect_failed)?;

    info!("connected");
    Ok(pool)
}

/// Liveness check run right after a pool is opened.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}
