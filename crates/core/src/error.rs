//! Catalog error model.

use thiserror::Error;

/// Result type returned by catalog read operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Coarse error kinds surfaced across the data-access boundary.
///
/// Storage adapters log the underlying driver failure and collapse it into one
/// of these kinds, so callers never depend on driver-specific detail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CatalogError {
    /// A single-item lookup matched nothing.
    #[error("not found")]
    NotFound,

    /// Storage could not be reached or the statement failed to execute.
    ///
    /// Covers network and auth failures, query errors, timeouts and caller
    /// cancellation.
    #[error("database connection error")]
    Connection,
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection)
    }
}

/// An `order` value that does not name a sortable column.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid sort order '{0}': expected one of id, name, price, count with optional asc/desc")]
pub struct InvalidSortOrder(pub String);

/// A product identifier that failed validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid product id: {0}")]
pub struct InvalidProductId(pub String);
