//! Strongly-typed identifiers used across the catalog.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::InvalidProductId;

/// Identifier of a catalog product.
///
/// Product ids are opaque strings owned by the storage layer (typically UUID
/// text); this type only guarantees they are non-blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidProductId> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InvalidProductId("product id must not be blank".to_string()));
        }
        Ok(Self(id))
    }

    /// Wrap an id read back from storage without validation.
    pub fn from_storage(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProductId {
    type Err = InvalidProductId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
