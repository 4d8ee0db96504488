//! Short-lived cache of order list pages.
//!
//! Each `(status, page)` listing is kept for 60 seconds. Any status change
//! drops every entry, so the dashboard never shows an order in a status it
//! has already left. Entries are stored under a generation number that
//! invalidation bumps, which keeps a load racing an invalidation from
//! outliving it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use shopfront_core::order::Order;
use shopfront_core::{OrderStatus, Page, PageRequest};

use crate::db::RepositoryError;

/// How long an order listing is served from cache.
pub const ORDER_LIST_TTL: Duration = Duration::from_secs(60);

/// One cached listing.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct OrderListKey {
    pub status: Option<OrderStatus>,
    pub page: PageRequest,
}

/// Cache of order listings.
#[derive(Clone)]
pub struct OrderListCache {
    generation: Arc<AtomicU64>,
    cache: Cache<(u64, OrderListKey), Arc<Page<Order>>>,
}

impl Default for OrderListCache {
    fn default() -> Self {
        Self::new(ORDER_LIST_TTL)
    }
}

impl OrderListCache {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            cache: Cache::builder()
                .max_capacity(500)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// The cached listing for `key`, loading it on a miss.
    ///
    /// Concurrent misses on one key wait for a single load.
    ///
    /// # Errors
    ///
    /// Returns the loader's error; failures are not cached.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: OrderListKey,
        load: F,
    ) -> Result<Arc<Page<Order>>, RepositoryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Page<Order>, RepositoryError>>,
    {
        let generation = self.generation.load(Ordering::Acquire);
        self.cache
            .try_get_with((generation, key), async move {
                debug!(?key, "Loading order list");
                Ok(Arc::new(load().await?))
            })
            .await
            .map_err(RepositoryError::Shared)
    }

    /// Drop every cached listing, including any load still in flight.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn key(status: Option<OrderStatus>) -> OrderListKey {
        OrderListKey {
            status,
            page: PageRequest::default(),
        }
    }

    async fn load(
        cache: &OrderListCache,
        key: OrderListKey,
        calls: &AtomicUsize,
    ) -> Arc<Page<Order>> {
        cache
            .get_or_load(key, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Page::new(Vec::new(), key.page, 0))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_read_is_cached() {
        let cache = OrderListCache::default();
        let calls = AtomicUsize::new(0);

        load(&cache, key(None), &calls).await;
        load(&cache, key(None), &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        load(&cache, key(Some(OrderStatus::Pending)), &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_reload() {
        let cache = OrderListCache::default();
        let calls = AtomicUsize::new(0);

        load(&cache, key(None), &calls).await;
        cache.invalidate_all();
        load(&cache, key(None), &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_overtaken_by_invalidation_is_not_served() {
        let cache = OrderListCache::default();
        let calls = AtomicUsize::new(0);

        cache
            .get_or_load(key(None), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                // A status change lands while this page is loading.
                cache.invalidate_all();
                Ok(Page::new(Vec::new(), PageRequest::default(), 0))
            })
            .await
            .unwrap();

        load(&cache, key(None), &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let cache = OrderListCache::default();
        let calls = AtomicUsize::new(0);
        let slow = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Page::new(Vec::new(), PageRequest::default(), 0))
        };

        let (first, second) = tokio::join!(
            cache.get_or_load(key(None), slow),
            cache.get_or_load(key(None), slow),
        );
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = OrderListCache::default();
        let failed = cache
            .get_or_load(key(None), || async move { Err(RepositoryError::NotFound) })
            .await;
        assert!(failed.is_err());

        let calls = AtomicUsize::new(0);
        load(&cache, key(None), &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
