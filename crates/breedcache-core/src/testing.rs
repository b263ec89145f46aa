//! Test doubles: a scriptable remote catalog and a store that can fail on demand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::api::{ApiError, RemoteSource};
use crate::cache::CachedData;
use crate::models::{CatalogItem, TraitScores};
use crate::store::{LocalStore, SqliteStore, StoreError};

pub fn breed(id: &str) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        name: format!("Breed {}", id),
        images: vec![format!("https://cdn.example/{}.jpg", id)],
        description: String::new(),
        temperament: String::new(),
        origin: String::new(),
        life_span: String::new(),
        weight: String::new(),
        traits: TraitScores::default(),
        hypoallergenic: 0,
        wikipedia_url: None,
        is_favorite: false,
    }
}

/// `count` breeds with ids `{prefix}0`, `{prefix}1`, ...
pub fn breeds(prefix: &str, count: usize) -> Vec<CatalogItem> {
    (0..count).map(|i| breed(&format!("{}{}", prefix, i))).collect()
}

#[derive(Default)]
pub struct FakeRemote {
    pages: Mutex<HashMap<u32, Vec<CatalogItem>>>,
    searches: Mutex<HashMap<String, Vec<CatalogItem>>>,
    images: Mutex<HashMap<String, Vec<String>>>,
    /// Every call fails with this error while set
    failure: Mutex<Option<ApiError>>,
    /// Per-term search latency
    search_delays: Mutex<HashMap<String, Duration>>,
    /// Per-page latency
    page_delays: Mutex<HashMap<u32, Duration>>,
    pub page_calls: AtomicUsize,
    pub by_id_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_page(&self, page_index: u32, items: Vec<CatalogItem>) {
        self.pages.lock().unwrap().insert(page_index, items);
    }

    pub fn set_search(&self, term: &str, items: Vec<CatalogItem>) {
        self.searches.lock().unwrap().insert(term.to_string(), items);
    }

    pub fn set_images(&self, id: &str, urls: Vec<String>) {
        self.images.lock().unwrap().insert(id.to_string(), urls);
    }

    pub fn fail_with(&self, error: ApiError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn delay_search(&self, term: &str, delay: Duration) {
        self.search_delays.lock().unwrap().insert(term.to_string(), delay);
    }

    pub fn delay_page(&self, page_index: u32, delay: Duration) {
        self.page_delays.lock().unwrap().insert(page_index, delay);
    }

    fn check_failure(&self) -> Result<(), ApiError> {
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn all_items(&self) -> Vec<CatalogItem> {
        let pages = self.pages.lock().unwrap();
        let mut indexes: Vec<_> = pages.keys().copied().collect();
        indexes.sort_unstable();
        indexes
            .into_iter()
            .flat_map(|i| pages.get(&i).cloned().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_page(&self, _limit: u32, page_index: u32) -> Result<Vec<CatalogItem>, ApiError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.page_delays.lock().unwrap().get(&page_index).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure()?;
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&page_index)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_by_id(&self, id: &str) -> Result<CatalogItem, ApiError> {
        self.by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.all_items()
            .into_iter()
            .find(|item| item.id == id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn search(&self, term: &str, _page_index: u32) -> Result<Vec<CatalogItem>, ApiError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.search_delays.lock().unwrap().get(term).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure()?;
        Ok(self
            .searches
            .lock()
            .unwrap()
            .get(term)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_images(&self, id: &str) -> Result<Vec<String>, ApiError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.images.lock().unwrap().get(id).cloned().unwrap_or_default())
    }
}

/// In-memory SQLite store whose writes can be made to fail
pub struct FlakyStore {
    inner: SqliteStore,
    fail_writes: AtomicBool,
    pub favorite_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_writes: AtomicBool::new(false),
            favorite_writes: AtomicUsize::new(0),
        })
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("disk full".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LocalStore for FlakyStore {
    async fn read_all(&self) -> Result<Vec<CachedData<CatalogItem>>, StoreError> {
        self.inner.read_all().await
    }

    async fn read_favorites(&self) -> Result<Vec<CachedData<CatalogItem>>, StoreError> {
        self.inner.read_favorites().await
    }

    async fn read_by_id(&self, id: &str) -> Result<Option<CachedData<CatalogItem>>, StoreError> {
        self.inner.read_by_id(id).await
    }

    async fn search_by_name(&self, term: &str) -> Result<Vec<CachedData<CatalogItem>>, StoreError> {
        self.inner.search_by_name(term).await
    }

    async fn read_images(&self, id: &str) -> Result<Option<CachedData<Vec<String>>>, StoreError> {
        self.inner.read_images(id).await
    }

    async fn upsert_many(&self, items: &[CatalogItem]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert_many(items).await
    }

    async fn upsert_detached(&self, items: &[CatalogItem]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert_detached(items).await
    }

    async fn upsert_one(&self, item: &CatalogItem) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert_one(item).await
    }

    async fn replace_all(&self, items: &[CatalogItem]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.replace_all(items).await
    }

    async fn update_favorite(&self, id: &str, is_favorite: bool) -> Result<(), StoreError> {
        self.favorite_writes.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent toggles actually overlap
        tokio::task::yield_now().await;
        self.check()?;
        self.inner.update_favorite(id, is_favorite).await
    }

    async fn update_images(&self, id: &str, images: &[String]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update_images(id, images).await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete_all().await
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete_by_id(id).await
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.inner.changes()
    }
}
