//! Schema migration step.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sqlx::PgPool;
use sqlx::migrate::{Migrate, Migrator};
use tracing::{info, instrument};

use super::InitError;
use crate::config::DatabaseConfig;

/// Whether and from where to apply migrations at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

impl MigrationSettings {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            enabled: config.migrate,
            path: config.migrations_path.clone(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing was pending.
    NoChange,
    /// This many migrations were applied.
    Applied(usize),
}

/// Apply every pending migration found in `path` against `pool`.
///
/// The migrator always runs, so a dirty (half-applied) migration or a checksum
/// mismatch with an applied migration fails here. Having nothing to apply is a
/// success (`NoChange`).
#[instrument(skip(pool, path), fields(path = %path.display()), err)]
pub async fn apply_migrations(pool: &PgPool, path: &Path) -> Result<MigrationOutcome, InitError> {
    info!("running database migration");

    let migrator = Migrator::new(path)
        .await
        .map_err(|source| InitError::MigrationSource {
            path: path.to_path_buf(),
            source,
        })?;

    let before = applied_versions(pool).await?;
    migrator.run(pool).await.map_err(InitError::Migrate)?;
    let after = applied_versions(pool).await?;

    match after.difference(&before).count() {
        0 => Ok(MigrationOutcome::NoChange),
        applied => Ok(MigrationOutcome::Applied(applied)),
    }
}

async fn applied_versions(pool: &PgPool) -> Result<HashSet<i64>, InitError> {
    let mut conn = pool.acquire().await.map_err(|e| InitError::Migrate(e.into()))?;
    conn.ensure_migrations_table().await.map_err(InitError::Migrate)?;
    Ok(conn
        .list_applied_migrations()
        .await
        .map_err(InitError::Migrate)?
        .into_iter()
        .map(|m| m.version)
        .collect())
}
