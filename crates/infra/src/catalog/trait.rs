use std::sync::Arc;

use catalog_core::{CatalogResult, ListProducts, Product, ProductId, Tag};

use crate::context::RequestContext;

/// Read access to the product catalog.
///
/// Every operation runs under the caller's [`RequestContext`]: cancelling it or
/// letting its deadline pass aborts the in-flight query and the call fails with
/// `CatalogError::Connection`. Implementations never retry.
#[async_trait::async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Products carrying any of `request.tags` (all products when empty), ordered
    /// and paginated per the request.
    ///
    /// `page_num` and `page_size` are 1-indexed; either being 0 yields an empty page
    /// without touching storage, as does a page past the end.
    async fn list(&self, ctx: &RequestContext, request: &ListProducts) -> CatalogResult<Vec<Product>>;

    /// Number of distinct products carrying any of `tags`.
    async fn count(&self, ctx: &RequestContext, tags: &[String]) -> CatalogResult<u64>;

    /// A single product with its full tag set, or `CatalogError::NotFound`.
    async fn get(&self, ctx: &RequestContext, id: &ProductId) -> CatalogResult<Product>;

    /// Every tag in storage order. Rows that fail to decode are skipped.
    async fn tags(&self, ctx: &RequestContext) -> CatalogResult<Vec<Tag>>;
}

#[async_trait::async_trait]
impl<R> CatalogRepository for Arc<R>
where
    R: CatalogRepository + ?Sized,
{
    async fn list(&self, ctx: &RequestContext, request: &ListProducts) -> CatalogResult<Vec<Product>> {
        (**self).list(ctx, request).await
    }

    async fn count(&self, ctx: &RequestContext, tags: &[String]) -> CatalogResult<u64> {
        (**self).count(ctx, tags).await
    }

    async fn get(&self, ctx: &RequestContext, id: &ProductId) -> CatalogResult<Product> {
        (**self).get(ctx, id).await
    }

    async fn tags(&self, ctx: &RequestContext) -> CatalogResult<Vec<Tag>> {
        (**self).tags(ctx).await
    }
}
