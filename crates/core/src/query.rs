//! Listing request types: tag filter, sort order allowlist and pagination window.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::InvalidSortOrder;

/// Columns a listing may be ordered by.
///
/// Caller-supplied order text is parsed into this enum; anything else is rejected
/// before a query is built, so storage never sees caller text as an identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    Id,
    Name,
    Price,
    Count,
}

impl SortColumn {
    pub const ALL: [SortColumn; 4] = [Self::Id, Self::Name, Self::Price, Self::Count];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Price => "price",
            Self::Count => "count",
        }
    }

    fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "id" | "product_id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "price" => Some(Self::Price),
            "count" | "inventory" => Some(Self::Count),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A validated listing order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOrder {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn asc(column: SortColumn) -> Self {
        Self {
            column,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: SortColumn) -> Self {
        Self {
            column,
            direction: SortDirection::Desc,
        }
    }

    /// Parse caller order text; empty (or blank) text means "no explicit order".
    ///
    /// Accepted forms: `price`, `price asc`, `price desc`, `-price`.
    pub fn parse(text: &str) -> Result<Option<Self>, InvalidSortOrder> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        text.parse().map(Some)
    }
}

impl FromStr for SortOrder {
    type Err = InvalidSortOrder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidSortOrder(s.to_string());
        let normalized = s.trim().to_ascii_lowercase();

        if let Some(rest) = normalized.strip_prefix('-') {
            let column = SortColumn::from_keyword(rest).ok_or_else(invalid)?;
            return Ok(Self::desc(column));
        }

        let mut parts = normalized.split_whitespace();
        let column = parts
            .next()
            .and_then(SortColumn::from_keyword)
            .ok_or_else(invalid)?;
        let direction = match parts.next() {
            None | Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            Some(_) => return Err(invalid()),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self { column, direction })
    }
}

impl core::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.direction {
            SortDirection::Asc => f.write_str(self.column.as_str()),
            SortDirection::Desc => write!(f, "{} desc", self.column.as_str()),
        }
    }
}

/// 1-indexed page request as supplied by callers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_num: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page_num: u32, page_size: u32) -> Self {
        Self {
            page_num,
            page_size,
        }
    }

    /// Offset/limit window for this page, or `None` when the page is defined-empty
    /// (`page_num == 0` or `page_size == 0`).
    pub fn window(&self) -> Option<PageWindow> {
        if self.page_num == 0 || self.page_size == 0 {
            return None;
        }
        let limit = u64::from(self.page_size);
        Some(PageWindow {
            offset: u64::from(self.page_num - 1) * limit,
            limit,
        })
    }

    /// Apply this page to a fully materialized, ordered result set.
    pub fn apply<T>(&self, mut items: Vec<T>) -> Vec<T> {
        let Some(window) = self.window() else {
            return Vec::new();
        };
        let range = window.range(items.len());
        items.truncate(range.end);
        items.drain(..range.start);
        items
    }
}

/// Offset/limit form of a non-empty page.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    /// Rows skipped before the window (0-based).
    pub offset: u64,
    /// Maximum rows in the window (never 0).
    pub limit: u64,
}

impl PageWindow {
    /// Index range this window selects from a result of length `len`.
    ///
    /// A start beyond `len` yields an empty range; the end is clamped to `len`.
    pub fn range(&self, len: usize) -> core::ops::Range<usize> {
        let len64 = len as u64;
        if self.offset >= len64 {
            return len..len;
        }
        let end = self.offset.saturating_add(self.limit).min(len64);
        self.offset as usize..end as usize
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.range(items.len())]
    }
}

/// Parameters of a product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListProducts {
    /// Tag names; a product qualifies if it carries any of them. Empty means all products.
    pub tags: Vec<String>,
    pub order: Option<SortOrder>,
    pub page: PageRequest,
}

impl ListProducts {
    pub fn new(tags: Vec<String>, order: Option<SortOrder>, page_num: u32, page_size: u32) -> Self {
        Self {
            tags,
            order,
            page: PageRequest::new(page_num, page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_order_is_none() {
        assert_eq!(SortOrder::parse("").unwrap(), None);
        assert_eq!(SortOrder::parse("  ").unwrap(), None);
    }

    #[test]
    fn parse_accepts_allowlisted_columns() {
        assert_eq!(
            SortOrder::parse("price").unwrap(),
            Some(SortOrder::asc(SortColumn::Price))
        );
        assert_eq!(
            SortOrder::parse("Name DESC").unwrap(),
            Some(SortOrder::desc(SortColumn::Name))
        );
        assert_eq!(
            SortOrder::parse("-inventory").unwrap(),
            Some(SortOrder::desc(SortColumn::Count))
        );
        assert_eq!(
            SortOrder::parse("product_id asc").unwrap(),
            Some(SortOrder::asc(SortColumn::Id))
        );
    }

    #[test]
    fn parse_rejects_identifier_injection() {
        for text in [
            "price; DROP TABLE product",
            "price desc, name",
            "(SELECT 1)",
            "price sideways",
            "product.price",
            "1",
        ] {
            let err = SortOrder::parse(text).unwrap_err();
            assert_eq!(err, InvalidSortOrder(text.to_string()));
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        for column in SortColumn::ALL {
            for order in [SortOrder::asc(column), SortOrder::desc(column)] {
                assert_eq!(order.to_string().parse::<SortOrder>().unwrap(), order);
            }
        }
    }

    #[test]
    fn zero_page_or_size_has_no_window() {
        assert_eq!(PageRequest::new(0, 10).window(), None);
        assert_eq!(PageRequest::new(3, 0).window(), None);
    }

    #[test]
    fn window_is_one_indexed() {
        assert_eq!(
            PageRequest::new(1, 10).window(),
            Some(PageWindow { offset: 0, limit: 10 })
        );
        assert_eq!(
            PageRequest::new(3, 25).window(),
            Some(PageWindow { offset: 50, limit: 25 })
        );
    }

    #[test]
    fn window_does_not_overflow() {
        let window = PageRequest::new(u32::MAX, u32::MAX).window().unwrap();
        assert_eq!(window.offset, u64::from(u32::MAX - 1) * u64::from(u32::MAX));
        assert!(window.slice(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn apply_clamps_end_and_empties_past_range() {
        let items: Vec<u32> = (1..=5).collect();
        assert_eq!(PageRequest::new(2, 2).apply(items.clone()), vec![3, 4]);
        assert_eq!(PageRequest::new(3, 2).apply(items.clone()), vec![5]);
        assert!(PageRequest::new(4, 2).apply(items.clone()).is_empty());
        assert!(PageRequest::new(0, 2).apply(items.clone()).is_empty());
        assert!(PageRequest::new(1, 0).apply(items).is_empty());
    }

    #[test]
    fn start_equal_to_len_is_empty() {
        let items = [1, 2, 3, 4];
        let window = PageRequest::new(3, 2).window().unwrap();
        assert!(window.slice(&items).is_empty());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: a page is exactly `[(p-1)*s, min(p*s, N))` of the full result.
            #[test]
            fn page_matches_slice_formula(
                len in 0usize..200,
                page_num in 0u32..50,
                page_size in 0u32..50,
            ) {
                let items: Vec<usize> = (0..len).collect();
                let page = PageRequest::new(page_num, page_size).apply(items.clone());

                if page_num == 0 || page_size == 0 {
                    prop_assert!(page.is_empty());
                } else {
                    let start = (page_num as usize - 1) * page_size as usize;
                    let end = (page_num as usize * page_size as usize).min(len);
                    let expected: Vec<usize> = if start >= len {
                        Vec::new()
                    } else {
                        items[start..end].to_vec()
                    };
                    prop_assert_eq!(page, expected);
                }
            }

            /// Property: consecutive pages partition the result without overlap.
            #[test]
            fn pages_partition_result(len in 0usize..120, page_size in 1u32..20) {
                let items: Vec<usize> = (0..len).collect();
                let mut rebuilt = Vec::new();
                let mut page_num = 1;
                loop {
                    let page = PageRequest::new(page_num, page_size).apply(items.clone());
                    if page.is_empty() {
                        break;
                    }
                    rebuilt.extend(page);
                    page_num += 1;
                }
                prop_assert_eq!(rebuilt, items);
            }
        }
    }
}
