//! Organization id → block catalog cache.
//!
//! Entries live until they are explicitly invalidated. Concurrent misses for the same
//! organization are collapsed onto one fetch: callers queue on a per-key lock and
//! re-check the store once they hold it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::AppError;

/// Backing store for catalog entries.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get(&self, org_id: &str) -> Option<Value>;
    async fn put(&self, org_id: &str, catalog: Value);
    async fn remove(&self, org_id: &str);
    async fn clear(&self);
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    entries: DashMap<String, Value>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get(&self, org_id: &str) -> Option<Value> {
        self.entries.get(org_id).map(|entry| entry.value().clone())
    }

    async fn put(&self, org_id: &str, catalog: Value) {
        self.entries.insert(org_id.to_string(), catalog);
    }

    async fn remove(&self, org_id: &str) {
        self.entries.remove(org_id);
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}

#[derive(Clone)]
pub struct CatalogCache {
    store: Arc<dyn CatalogStore>,
    in_flight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl CatalogCache {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCatalogStore::new()))
    }

    pub async fn get(&self, org_id: &str) -> Option<Value> {
        self.store.get(org_id).await
    }

    pub async fn put(&self, org_id: &str, catalog: Value) {
        self.store.put(org_id, catalog).await;
    }

    pub async fn invalidate(&self, org_id: &str) {
        self.store.remove(org_id).await;
    }

    pub async fn clear(&self) {
        self.store.clear().await;
        self.in_flight.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Returns the cached catalog, or runs `fetch` once and stores its result.
    ///
    /// A failed fetch stores nothing and the error goes to the caller that ran it;
    /// callers that were waiting on the same key fetch again themselves.
    pub async fn get_or_fetch<F, Fut>(&self, org_id: &str, fetch: F) -> Result<CatalogLookup, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, AppError>>,
    {
        if let Some(catalog) = self.store.get(org_id).await {
            tracing::debug!(org = %org_id, "catalog cache hit");
            return Ok(CatalogLookup::Cached(catalog));
        }

        let lock = self
            .in_flight
            .entry(org_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let lookup = self.fetch_locked(org_id, &lock, fetch).await;

        // 待機者がいなければロックを破棄する
        drop(lock);
        self.in_flight
            .remove_if(org_id, |_, lock| Arc::strong_count(lock) == 1);
        lookup
    }

    async fn fetch_locked<F, Fut>(
        &self,
        org_id: &str,
        lock: &Mutex<()>,
        fetch: F,
    ) -> Result<CatalogLookup, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, AppError>>,
    {
        let _guard = lock.lock().await;

        // another request may have filled the entry while we waited
        if let Some(catalog) = self.store.get(org_id).await {
            tracing::debug!(org = %org_id, "catalog filled by concurrent fetch");
            return Ok(CatalogLookup::Cached(catalog));
        }

        tracing::info!(org = %org_id, "catalog cache miss, fetching blocks");
        let catalog = fetch().await?;
        self.store.put(org_id, catalog.clone()).await;
        Ok(CatalogLookup::Fetched(catalog))
    }
}

/// Outcome of [`CatalogCache::get_or_fetch`].
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogLookup {
    Cached(Value),
    /// This caller ran the fetch.
    Fetched(Value),
}

impl CatalogLookup {
    pub fn catalog(&self) -> &Value {
        match self {
            CatalogLookup::Cached(catalog) | CatalogLookup::Fetched(catalog) => catalog,
        }
    }

    pub fn into_catalog(self) -> Value {
        match self {
            CatalogLookup::Cached(catalog) | CatalogLookup::Fetched(catalog) => catalog,
        }
    }
}
