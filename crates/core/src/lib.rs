//! `catalog-core`: product catalog domain types.
//!
//! This crate contains the catalog's read model and request types (no IO, no SQL).

pub mod entity;
pub mod error;
pub mod id;
pub mod product;
pub mod query;

pub use entity::Entity;
pub use error::{CatalogError, CatalogResult, InvalidProductId, InvalidSortOrder};
pub use id::ProductId;
pub use product::{Price, Product, Tag, TAG_SEPARATOR, split_tags};
pub use query::{ListProducts, PageRequest, PageWindow, SortColumn, SortDirection, SortOrder};
