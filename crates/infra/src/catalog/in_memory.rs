use std::cmp::Ordering as CmpOrdering;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use catalog_core::{
    CatalogError, CatalogResult, Entity, ListProducts, Product, ProductId, SortColumn,
    SortDirection, SortOrder, Tag,
};

use super::r#trait::CatalogRepository;
use super::{connection_error, decode_lenient, interrupted};
use crate::context::RequestContext;

/// A tag row as it would come back from storage, possibly with missing columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagRecord {
    pub name: Option<String>,
    pub display_name: Option<String>,
}

impl TagRecord {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            display_name: Some(display_name.into()),
        }
    }

    fn decode(&self) -> Result<Tag, String> {
        match (&self.name, &self.display_name) {
            (Some(name), Some(display_name)) => Ok(Tag {
                name: name.clone(),
                display_name: display_name.clone(),
            }),
            (None, _) => Err("tag row has no name".to_string()),
            (Some(name), None) => Err(format!("tag '{name}' has no display name")),
        }
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    products: Vec<Product>,
    tags: Vec<TagRecord>,
}

/// In-memory catalog repository.
///
/// Intended for tests/dev. Mirrors the Postgres adapter's observable behaviour:
/// untagged products are invisible, listings default to id order, and the
/// `unavailable` switch makes every call fail with `Connection`.
#[derive(Debug, Default)]
pub struct InMemoryCatalogRepository {
    state: RwLock<CatalogState>,
    latency: Option<Duration>,
    unavailable: AtomicBool,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(self, products: impl IntoIterator<Item = Product>) -> Self {
        {
            let mut state = self.write_state();
            for product in products {
                upsert_by_id(&mut state.products, product);
            }
        }
        self
    }

    pub fn with_tags(self, tags: impl IntoIterator<Item = TagRecord>) -> Self {
        self.write_state().tags.extend(tags);
        self
    }

    /// Delay every call by `latency`, to exercise deadlines and cancellation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a product, replacing any product with the same id.
    pub fn upsert_product(&self, product: Product) {
        upsert_by_id(&mut self.write_state().products, product);
    }

    /// Write guard over the state; a poisoned lock is taken over as is.
    fn write_state(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulated round trip: latency, availability, then `f` under the read lock.
    async fn read<T, F>(&self, operation: &'static str, ctx: &RequestContext, f: F) -> CatalogResult<T>
    where
        F: FnOnce(&CatalogState) -> T + Send,
        T: Send,
    {
        ctx.run(async {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(connection_error(operation, &"storage unavailable"));
            }
            let state = self
                .state
                .read()
                .map_err(|_| connection_error(operation, &"lock poisoned"))?;
            Ok(f(&state))
        })
        .await
        .map_err(|e| interrupted(operation, e))?
    }
}

fn upsert_by_id<E: Entity>(items: &mut Vec<E>, item: E) {
    match items.iter_mut().find(|existing| existing.id() == item.id()) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

/// Products visible to a listing: tagged, and carrying any of `tags` if given.
fn matching<'a>(products: &'a [Product], tags: &'a [String]) -> impl Iterator<Item = &'a Product> {
    products
        .iter()
        .filter(|p| !p.tags.is_empty())
        .filter(move |p| tags.is_empty() || p.has_any_tag(tags))
}

fn compare(a: &Product, b: &Product, order: Option<SortOrder>) -> CmpOrdering {
    let Some(order) = order else {
        return a.id.cmp(&b.id);
    };

    let by_column = match order.column {
        SortColumn::Id => a.id.cmp(&b.id),
        SortColumn::Name => a.name.cmp(&b.name),
        SortColumn::Price => a.price.cmp(&b.price),
        SortColumn::Count => a.count.cmp(&b.count),
    };
    let by_column = match order.direction {
        SortDirection::Asc => by_column,
        SortDirection::Desc => by_column.reverse(),
    };
    by_column.then_with(|| a.id.cmp(&b.id))
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list(&self, ctx: &RequestContext, request: &ListProducts) -> CatalogResult<Vec<Product>> {
        if request.page.window().is_none() {
            return Ok(Vec::new());
        }

        self.read("list", ctx, |state| {
            let mut selected: Vec<Product> = matching(&state.products, &request.tags).cloned().collect();
            selected.sort_by(|a, b| compare(a, b, request.order));
            request.page.apply(selected)
        })
        .await
    }

    async fn count(&self, ctx: &RequestContext, tags: &[String]) -> CatalogResult<u64> {
        self.read("count", ctx, |state| matching(&state.products, tags).count() as u64)
            .await
    }

    async fn get(&self, ctx: &RequestContext, id: &ProductId) -> CatalogResult<Product> {
        self.read("get", ctx, |state| {
            state
                .products
                .iter()
                .find(|p| &p.id == id && !p.tags.is_empty())
                .cloned()
        })
        .await?
        .ok_or(CatalogError::NotFound)
    }

    async fn tags(&self, ctx: &RequestContext) -> CatalogResult<Vec<Tag>> {
        self.read("tags", ctx, |state| {
            decode_lenient("tags", state.tags.clone(), TagRecord::decode)
        })
        .await
    }
}
