use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::id::ProductId;

/// Separator used when storage aggregates a product's tag names into one field.
pub const TAG_SEPARATOR: char = ',';

/// Price in the smallest currency unit (e.g. cents).
///
/// Storage keeps prices as `NUMERIC(10,2)`; the repository reads them back
/// scaled to minor units so no floating point is involved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    pub fn from_minor_units(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for Price {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// A catalog product as read from storage, with its joined tag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub count: i32,
    pub image_url: String,
    pub tags: Vec<String>,
}

impl Product {
    /// True if the product carries any of `tags` (exact name match).
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.iter().any(|wanted| wanted == t))
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A named product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub display_name: String,
}

impl Entity for Tag {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.name
    }
}

/// Split an aggregated tag field into its ordered tag names.
///
/// An empty or missing aggregate yields no tags rather than a single empty name.
pub fn split_tags(aggregated: &str) -> Vec<String> {
    if aggregated.is_empty() {
        return Vec::new();
    }
    aggregated.split(TAG_SEPARATOR).map(str::to_string).collect()
}
