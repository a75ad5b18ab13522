//! Product catalog repositories.
//!
//! `CatalogRepository` is the read boundary used by callers. Two adapters exist:
//! a Postgres-backed repository reading through the [`DatabaseRouter`](crate::db::DatabaseRouter)
//! reader target, and an in-memory repository for tests and local development.
//!
//! Both adapters collapse low-level failures into `CatalogError` after logging
//! them with the operation name.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::{InMemoryCatalogRepository, TagRecord};
pub use postgres::PostgresCatalogRepository;
pub use r#trait::CatalogRepository;

use core::fmt::Display;

use catalog_core::CatalogError;
use tracing::{error, warn};

use crate::context::Interrupted;

fn connection_error(operation: &'static str, err: &dyn Display) -> CatalogError {
    error!(operation, error = %err, "catalog query failed");
    CatalogError::Connection
}

fn interrupted(operation: &'static str, reason: Interrupted) -> CatalogError {
    warn!(operation, reason = %reason, "catalog query interrupted");
    CatalogError::Connection
}

/// Decode each row, logging and dropping the ones that fail.
fn decode_lenient<R, T, E, F>(operation: &'static str, rows: Vec<R>, mut decode: F) -> Vec<T>
where
    F: FnMut(&R) -> Result<T, E>,
    E: Display,
{
    let total = rows.len();
    let decoded: Vec<T> = rows
        .iter()
        .filter_map(|row| match decode(row) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(operation, error = %err, "skipping row that failed to decode");
                None
            }
        })
        .collect();

    if decoded.len() < total {
        warn!(operation, skipped = total - decoded.len(), total, "partial result");
    }
    decoded
}
