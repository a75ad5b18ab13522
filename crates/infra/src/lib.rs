//! Infrastructure layer: configuration, Postgres pools and the catalog repositories.

pub mod catalog;
pub mod config;
pub mod context;
pub mod db;

pub use catalog::{CatalogRepository, InMemoryCatalogRepository, PostgresCatalogRepository};
pub use config::{ConfigError, DatabaseConfig};
pub use context::{Interrupted, RequestContext};
pub use db::{ConnectionManager, DatabaseRouter, InitError, PoolMetricsExporter};
