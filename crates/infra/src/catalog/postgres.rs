//! Postgres-backed catalog repository.
//!
//! Reads go to the router's reader target, which is the primary pool when no
//! replica is configured. Connections are acquired through [`DbTarget::acquire`]
//! so saturated-pool waits show up in the pool statistics.
//!
//! ## Error Mapping
//!
//! | Failure | CatalogError |
//! |---------|--------------|
//! | `get` matched no row | `NotFound` |
//! | acquire, execute or decode error | `Connection` |
//! | cancellation or deadline | `Connection` |
//! | single undecodable row in `tags` | skipped, logged |

use std::sync::Arc;

use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::{Span, debug, instrument};

use catalog_core::{
    CatalogError, CatalogResult, ListProducts, Price, Product, ProductId, Tag, split_tags,
};

use super::r#trait::CatalogRepository;
use super::{connection_error, decode_lenient, interrupted, query};
use crate::context::RequestContext;
use crate::db::{DatabaseRouter, DbTarget, PoolStatsCollector};

/// Catalog repository over a [`DatabaseRouter`].
#[derive(Debug, Clone)]
pub struct PostgresCatalogRepository {
    router: Arc<DatabaseRouter>,
}

impl PostgresCatalogRepository {
    pub fn new(router: DatabaseRouter) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    pub fn from_shared(router: Arc<DatabaseRouter>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &DatabaseRouter {
        &self.router
    }

    /// Statistics source for the primary pool (`db`).
    pub fn collector(&self) -> PoolStatsCollector {
        self.router.collector()
    }

    /// Statistics source for the reader pool (`reader_db`).
    pub fn reader_collector(&self) -> PoolStatsCollector {
        self.router.reader_collector()
    }

    fn reads(&self) -> &DbTarget {
        self.router.reader()
    }
}

#[async_trait::async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    #[instrument(
        skip(self, ctx, request),
        fields(
            operation = "list",
            tags = request.tags.len(),
            order = ?request.order,
            page_num = request.page.page_num,
            page_size = request.page.page_size,
            product_count
        )
    )]
    async fn list(&self, ctx: &RequestContext, request: &ListProducts) -> CatalogResult<Vec<Product>> {
        let Some(window) = request.page.window() else {
            debug!("empty page requested");
            return Ok(Vec::new());
        };

        let target = self.reads();
        let rows = ctx
            .run(async {
                let mut conn = target.acquire().await?;
                query::list_products(&request.tags, request.order, window)
                    .build_query_as::<ProductRow>()
                    .fetch_all(&mut *conn)
                    .await
            })
            .await
            .map_err(|e| interrupted("list", e))?
            .map_err(|e| connection_error("list", &e))?;

        Span::current().record("product_count", rows.len());
        Ok(rows.into_iter().map(Product::from).collect())
    }

    #[instrument(skip(self, ctx, tags), fields(operation = "count", tags = tags.len()))]
    async fn count(&self, ctx: &RequestContext, tags: &[String]) -> CatalogResult<u64> {
        let target = self.reads();
        let total: i64 = ctx
            .run(async {
                let mut conn = target.acquire().await?;
                query::count_products(tags)
                    .build_query_scalar::<i64>()
                    .fetch_one(&mut *conn)
                    .await
            })
            .await
            .map_err(|e| interrupted("count", e))?
            .map_err(|e| connection_error("count", &e))?;

        Ok(u64::try_from(total).unwrap_or(0))
    }

    #[instrument(skip(self, ctx), fields(operation = "get", product_id = %id))]
    async fn get(&self, ctx: &RequestContext, id: &ProductId) -> CatalogResult<Product> {
        let target = self.reads();
        let row = ctx
            .run(async {
                let mut conn = target.acquire().await?;
                query::get_product(id.as_str())
                    .build_query_as::<ProductRow>()
                    .fetch_optional(&mut *conn)
                    .await
            })
            .await
            .map_err(|e| interrupted("get", e))?
            .map_err(|e| connection_error("get", &e))?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                debug!("product not found");
                Err(CatalogError::NotFound)
            }
        }
    }

    #[instrument(skip(self, ctx), fields(operation = "tags", tag_count))]
    async fn tags(&self, ctx: &RequestContext) -> CatalogResult<Vec<Tag>> {
        let target = self.reads();
        let rows = ctx
            .run(async {
                let mut conn = target.acquire().await?;
                sqlx::query(query::LIST_TAGS).fetch_all(&mut *conn).await
            })
            .await
            .map_err(|e| interrupted("tags", e))?
            .map_err(|e| connection_error("tags", &e))?;

        let tags = decode_lenient("tags", rows, TagRow::decode);
        Span::current().record("tag_count", tags.len());
        Ok(tags.into_iter().map(Tag::from).collect())
    }
}

/// Raw listing row (see `query::PRODUCT_PROJECTION`).
#[derive(Debug)]
struct ProductRow {
    product_id: String,
    name: String,
    description: String,
    price_cents: i64,
    count: i32,
    image_url: String,
    tag_names: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            product_id: row.try_get("product_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price_cents: row.try_get("price_cents")?,
            count: row.try_get("count")?,
            image_url: row.try_get("image_url")?,
            tag_names: row.try_get("tag_names")?,
        })
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId::from_storage(row.product_id),
            name: row.name,
            description: row.description,
            price: Price::from_minor_units(row.price_cents),
            count: row.count,
            image_url: row.image_url,
            tags: row.tag_names.as_deref().map(split_tags).unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
struct TagRow {
    name: String,
    display_name: String,
}

impl TagRow {
    fn decode(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(TagRow {
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
        })
    }
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            name: row.name,
            display_name: row.display_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn row(tag_names: Option<&str>) -> ProductRow {
        ProductRow {
            product_id: "p-2".to_string(),
            name: "Trail".to_string(),
            description: "Trail shoe".to_string(),
            price_cents: 12950,
            count: 4,
            image_url: "/img/trail.png".to_string(),
            tag_names: tag_names.map(str::to_string),
        }
    }

    #[test]
    fn product_row_splits_aggregated_tags() {
        let product = Product::from(row(Some("shoes,sale")));
        assert_eq!(product.id.as_str(), "p-2");
        assert_eq!(product.tags, vec!["shoes", "sale"]);
        assert_eq!(product.price.to_string(), "129.50");
    }

    #[test]
    fn missing_aggregate_means_no_tags() {
        assert!(Product::from(row(None)).tags.is_empty());
        assert!(Product::from(row(Some(""))).tags.is_empty());
    }

    fn unreachable_repository() -> PostgresCatalogRepository {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://catalog@127.0.0.1:1/catalog")
            .unwrap();
        PostgresCatalogRepository::new(DatabaseRouter::single(pool))
    }

    #[tokio::test]
    async fn zero_page_never_touches_storage() {
        let repo = unreachable_repository();
        let ctx = RequestContext::background();
        let request = ListProducts::new(vec![], None, 0, 10);
        assert_eq!(repo.list(&ctx, &request).await, Ok(vec![]));
        let request = ListProducts::new(vec![], None, 1, 0);
        assert_eq!(repo.list(&ctx, &request).await, Ok(vec![]));
    }

    #[tokio::test]
    async fn unreachable_storage_is_a_connection_error() {
        let repo = unreachable_repository();
        let ctx = RequestContext::background();
        let id = ProductId::new("p-1").unwrap();
        assert_eq!(repo.get(&ctx, &id).await, Err(CatalogError::Connection));
        assert_eq!(repo.count(&ctx, &[]).await, Err(CatalogError::Connection));
        assert_eq!(repo.tags(&ctx).await, Err(CatalogError::Connection));
    }

    #[tokio::test]
    async fn cancelled_context_is_a_connection_error() {
        let repo = unreachable_repository();
        let ctx = RequestContext::background();
        ctx.cancel();
        let request = ListProducts::new(vec!["shoes".to_string()], None, 1, 10);
        assert_eq!(repo.list(&ctx, &request).await, Err(CatalogError::Connection));
    }

    #[tokio::test]
    async fn collectors_report_both_targets() {
        use crate::db::PoolStatsSource;

        let repo = unreachable_repository();
        assert_eq!(repo.collector().db_name(), "db");
        assert_eq!(repo.reader_collector().db_name(), "reader_db");
        assert_eq!(repo.reader_collector().stats().max_open, 1);
    }
}
