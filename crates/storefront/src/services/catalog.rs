//! Cached read access to the product catalog.
//!
//! Product pages, listings and the category list are cached for 60 seconds
//! using `moka`. Edits made through the admin dashboard become visible once
//! the entry expires; orders placed here drop the cache at once.
//!
//! Concurrent misses on one key share a single load. Keys carry a generation
//! number that [`CatalogService::invalidate_all`] bumps, so a load started
//! before an invalidation is never served after it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tracing::{debug, instrument};

use shopfront_core::catalog::Product;
use shopfront_core::{Page, PageRequest, ProductId};

use crate::db::products::ProductFilter;
use crate::db::{ProductRepository, RepositoryError};

/// How long catalog responses are cached.
pub const CATALOG_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ListingKey {
    generation: u64,
    filter: ProductFilter,
    page: PageRequest,
}

/// Catalog reads backed by the database with a short-lived cache.
#[derive(Clone)]
pub struct CatalogService {
    generation: Arc<AtomicU64>,
    products: Cache<(u64, ProductId), Option<Arc<Product>>>,
    listings: Cache<ListingKey, Arc<Page<Product>>>,
    categories: Cache<u64, Arc<Vec<String>>>,
}

impl Default for CatalogService {
    fn default() -> Self {
        Self::new(CATALOG_TTL)
    }
}

impl CatalogService {
    /// Create a catalog service whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            products: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(ttl)
                .build(),
            listings: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(ttl)
                .build(),
            categories: Cache::builder().max_capacity(4).time_to_live(ttl).build(),
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// A single product, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database query fails.
    #[instrument(skip(self, pool))]
    pub async fn product(
        &self,
        pool: &PgPool,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let product = self
            .product_with(id, || async move { ProductRepository::new(pool).get(id).await })
            .await?;
        Ok(product.map(|p| p.as_ref().clone()))
    }

    async fn product_with<F, Fut>(
        &self,
        id: ProductId,
        load: F,
    ) -> Result<Option<Arc<Product>>, RepositoryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Product>, RepositoryError>>,
    {
        self.products
            .try_get_with((self.generation(), id), async move {
                debug!(%id, "Loading product");
                Ok(load().await?.map(Arc::new))
            })
            .await
            .map_err(RepositoryError::Shared)
    }

    /// One page of products matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database query fails.
    #[instrument(skip(self, pool))]
    pub async fn products(
        &self,
        pool: &PgPool,
        filter: ProductFilter,
        page: PageRequest,
    ) -> Result<Arc<Page<Product>>, RepositoryError> {
        self.products_with(filter, page, |filter, page| async move {
            ProductRepository::new(pool).list(&filter, page).await
        })
        .await
    }

    async fn products_with<F, Fut>(
        &self,
        filter: ProductFilter,
        page: PageRequest,
        load: F,
    ) -> Result<Arc<Page<Product>>, RepositoryError>
    where
        F: FnOnce(ProductFilter, PageRequest) -> Fut,
        Fut: Future<Output = Result<Page<Product>, RepositoryError>>,
    {
        let key = ListingKey {
            generation: self.generation(),
            filter: filter.clone(),
            page,
        };
        self.listings
            .try_get_with(key, async move {
                debug!(?filter, ?page, "Loading product listing");
                Ok(Arc::new(load(filter, page).await?))
            })
            .await
            .map_err(RepositoryError::Shared)
    }

    /// Distinct category names, sorted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database query fails.
    #[instrument(skip(self, pool))]
    pub async fn categories(&self, pool: &PgPool) -> Result<Arc<Vec<String>>, RepositoryError> {
        self.categories_with(|| async move { ProductRepository::new(pool).categories().await })
            .await
    }

    async fn categories_with<F, Fut>(&self, load: F) -> Result<Arc<Vec<String>>, RepositoryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>, RepositoryError>>,
    {
        self.categories
            .try_get_with(self.generation(), async move {
                debug!("Loading categories");
                Ok(Arc::new(load().await?))
            })
            .await
            .map_err(RepositoryError::Shared)
    }

    /// Drop every cached entry, including any load still in flight.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.products.invalidate_all();
        self.listings.invalidate_all();
        self.categories.invalidate_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::future::Ready;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    type Listing = Ready<Result<Page<Product>, RepositoryError>>;

    fn listing(calls: &AtomicUsize) -> impl FnOnce(ProductFilter, PageRequest) -> Listing + '_ {
        move |_, page| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(Page::new(Vec::new(), page, 0)))
        }
    }

    fn mugs() -> ProductFilter {
        ProductFilter {
            category: Some("Mugs".to_owned()),
            search: None,
        }
    }

    fn second_page() -> PageRequest {
        shopfront_core::PageQuery {
            page: Some(2),
            per_page: None,
        }
        .into()
    }

    #[tokio::test]
    async fn test_repeated_listing_is_served_from_cache() {
        let catalog = CatalogService::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            catalog
                .products_with(mugs(), PageRequest::default(), listing(&calls))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_filter_and_page_are_separate_entries() {
        let catalog = CatalogService::default();
        let calls = AtomicUsize::new(0);

        catalog
            .products_with(ProductFilter::default(), PageRequest::default(), listing(&calls))
            .await
            .unwrap();
        catalog
            .products_with(mugs(), PageRequest::default(), listing(&calls))
            .await
            .unwrap();
        let page = catalog
            .products_with(mugs(), second_page(), listing(&calls))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(page.page, 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_reload() {
        let catalog = CatalogService::default();
        let calls = AtomicUsize::new(0);

        catalog
            .products_with(mugs(), PageRequest::default(), listing(&calls))
            .await
            .unwrap();
        catalog.invalidate_all();
        catalog
            .products_with(mugs(), PageRequest::default(), listing(&calls))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_overtaken_by_invalidation_is_not_served() {
        let catalog = CatalogService::default();
        let calls = AtomicUsize::new(0);

        let stale = catalog
            .categories_with(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                // An order is placed while this load is still running.
                catalog.invalidate_all();
                Ok(vec!["Old".to_owned()])
            })
            .await
            .unwrap();
        assert_eq!(*stale, vec!["Old".to_owned()]);

        let fresh = catalog
            .categories_with(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["New".to_owned()])
            })
            .await
            .unwrap();
        assert_eq!(*fresh, vec!["New".to_owned()]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let catalog = CatalogService::default();
        let calls = AtomicUsize::new(0);
        let load = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(None)
        };

        let (first, second) = tokio::join!(
            catalog.product_with(ProductId::new(5), load),
            catalog.product_with(ProductId::new(5), load),
        );
        assert!(first.unwrap().is_none());
        assert!(second.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let catalog = CatalogService::default();

        let failed = catalog
            .categories_with(|| async { Err(RepositoryError::NotFound) })
            .await;
        let Err(RepositoryError::Shared(err)) = failed else {
            panic!("expected a shared load error");
        };
        assert!(matches!(*err, RepositoryError::NotFound));

        let calls = AtomicUsize::new(0);
        catalog
            .categories_with(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
