//! SQL shapes for catalog reads.
//!
//! Every caller-supplied value (tag names, ids, limit, offset) is a positional
//! bind parameter. Sort columns come from the [`SortColumn`] allowlist and are
//! the only identifiers written into the statement text.

use sqlx::{Postgres, QueryBuilder};

use catalog_core::{PageWindow, SortColumn, SortOrder};

/// Product columns plus the comma-joined tag names of each product.
const PRODUCT_PROJECTION: &str = "SELECT product.product_id, product.name, product.description, \
     ROUND(product.price * 100)::BIGINT AS price_cents, product.count, product.image_url, \
     STRING_AGG(tag.name, ',' ORDER BY tag.tag_id) AS tag_names \
     FROM product \
     JOIN product_tag ON product.product_id = product_tag.product_id \
     JOIN tag ON product_tag.tag_id = tag.tag_id";

const GROUP_BY_PRODUCT: &str = " GROUP BY product.product_id";

pub const LIST_TAGS: &str = "SELECT name, display_name FROM tag ORDER BY tag_id";

fn sort_expression(column: SortColumn) -> &'static str {
    match column {
        SortColumn::Id => "product.product_id",
        SortColumn::Name => "product.name",
        SortColumn::Price => "product.price",
        SortColumn::Count => "product.count",
    }
}

/// `(<column> = $n OR <column> = $n+1 ...)`, one clause per tag.
fn push_any_tag<'a>(qb: &mut QueryBuilder<'a, Postgres>, column: &str, tags: &'a [String]) {
    qb.push("(");
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(column).push(" = ").push_bind(tag.as_str());
    }
    qb.push(")");
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, order: Option<SortOrder>) {
    let Some(order) = order else {
        qb.push(" ORDER BY product.product_id");
        return;
    };

    qb.push(" ORDER BY ")
        .push(sort_expression(order.column))
        .push(" ")
        .push(order.direction.as_sql());

    // Tie-break so pages are stable when the sort column has duplicates.
    if order.column != SortColumn::Id {
        qb.push(", product.product_id ASC");
    }
}

/// Listing query for one page of products carrying any of `tags`.
///
/// The tag filter is a membership subquery so the outer aggregation still sees
/// every tag of a qualifying product.
pub fn list_products<'a>(
    tags: &'a [String],
    order: Option<SortOrder>,
    window: PageWindow,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(PRODUCT_PROJECTION);

    if !tags.is_empty() {
        qb.push(
            " WHERE product.product_id IN (SELECT pt.product_id FROM product_tag AS pt \
             JOIN tag AS t ON pt.tag_id = t.tag_id WHERE ",
        );
        push_any_tag(&mut qb, "t.name", tags);
        qb.push(")");
    }

    qb.push(GROUP_BY_PRODUCT);
    push_order(&mut qb, order);

    qb.push(" LIMIT ")
        .push_bind(to_sql_int(window.limit))
        .push(" OFFSET ")
        .push_bind(to_sql_int(window.offset));
    qb
}

/// Counting query over the same OR filter as [`list_products`].
pub fn count_products(tags: &[String]) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT COUNT(DISTINCT product.product_id) AS total FROM product \
         JOIN product_tag ON product.product_id = product_tag.product_id \
         JOIN tag ON product_tag.tag_id = tag.tag_id",
    );

    if !tags.is_empty() {
        qb.push(" WHERE ");
        push_any_tag(&mut qb, "tag.name", tags);
    }
    qb
}

/// Single product by id.
pub fn get_product(id: &str) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(PRODUCT_PROJECTION);
    qb.push(" WHERE product.product_id = ").push_bind(id);
    qb.push(GROUP_BY_PRODUCT);
    qb
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
