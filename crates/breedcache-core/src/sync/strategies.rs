//! Per-query-key strategies for the sync engine.
//!
//! - `ListStrategy`: one page of the breed list, merged through `PaginationMerger`
//! - `ByIdStrategy`: a single breed
//! - `SearchStrategy`: breeds matching a name fragment
//! - `ImagesStrategy`: the gallery of one breed

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, info};

use crate::api::{ApiError, RemoteSource};
use crate::cache::CachedData;
use crate::models::CatalogItem;
use crate::store::{LocalStore, StoreError};

use super::classify::SyncError;
use super::engine::ResourceStrategy;
use super::pagination::{PageWindow, PagedItems, PaginationMerger};

/// Paging position shared by every list load. `None` until the first page
/// completes in this process; until then it is derived from the stored rows.
pub type SharedWindow = Arc<Mutex<Option<PageWindow>>>;

/// Search terms revalidated against the remote since startup
pub type ValidatedTerms = Arc<Mutex<HashSet<String>>>;

/// Oldest timestamp among `rows`, the freshness of the set as a whole
fn oldest<T>(rows: Vec<CachedData<T>>) -> Option<CachedData<Vec<T>>> {
    let cached_at = rows.iter().map(|row| row.cached_at).min()?;
    Some(CachedData::at(
        rows.into_iter().map(|row| row.data).collect(),
        cached_at,
    ))
}

// ===== List =====

pub struct ListStrategy {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn LocalStore>,
    window: SharedWindow,
    page_index: u32,
    page_size: u32,
    max_age: Duration,
}

impl ListStrategy {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn LocalStore>,
        window: SharedWindow,
        page_index: u32,
        page_size: u32,
        max_age: Duration,
    ) -> Self {
        Self {
            remote,
            store,
            window,
            page_index,
            page_size,
            max_age,
        }
    }

    fn current_window(&self, len: usize) -> PageWindow {
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        window.unwrap_or_else(|| PageWindow::restore(len, self.page_size))
    }
}

#[async_trait]
impl ResourceStrategy for ListStrategy {
    type Output = PagedItems;
    type Remote = Vec<CatalogItem>;

    async fn query_local(&self) -> Result<Option<CachedData<PagedItems>>, SyncError> {
        let rows = self.store.read_all().await?;
        let window = self.current_window(rows.len());
        Ok(oldest(rows).map(|cached| cached.map(|items| PagedItems { items, window })))
    }

    async fn fetch_remote(&self) -> Result<Vec<CatalogItem>, ApiError> {
        self.remote.fetch_page(self.page_size, self.page_index).await
    }

    async fn persist_remote(&self, fetched: Vec<CatalogItem>) -> Result<(), SyncError> {
        let existing: Vec<CatalogItem> = self
            .store
            .read_all()
            .await?
            .into_iter()
            .map(|row| row.data)
            .collect();

        if self.page_index > 0 {
            let expected = self.current_window(existing.len()).next_page();
            if self.page_index != expected {
                return Err(SyncError::OutOfOrder {
                    expected,
                    got: self.page_index,
                });
            }
        }

        let merged = PaginationMerger::new(self.page_size).merge(&existing, fetched, self.page_index);
        if self.page_index == 0 {
            self.store.replace_all(&merged.items).await?;
        } else {
            self.store.upsert_many(&merged.page).await?;
        }

        info!(
            page = self.page_index,
            total = merged.items.len(),
            net_new = merged.net_new,
            has_more = merged.window.has_more,
            "Merged list page"
        );
        *self.window.lock().unwrap_or_else(PoisonError::into_inner) = Some(merged.window);
        Ok(())
    }

    fn should_fetch(&self, cached: &CachedData<PagedItems>) -> bool {
        // Only the first page can be served from cache; "load more" always fetches
        self.page_index > 0 || cached.is_stale(self.max_age)
    }

    fn vacant(&self) -> Option<PagedItems> {
        Some(PagedItems {
            items: Vec::new(),
            window: self.current_window(0),
        })
    }
}

// ===== By id =====

pub struct ByIdStrategy {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn LocalStore>,
    id: String,
    max_age: Duration,
}

impl ByIdStrategy {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn LocalStore>,
        id: impl Into<String>,
        max_age: Duration,
    ) -> Self {
        Self {
            remote,
            store,
            id: id.into(),
            max_age,
        }
    }
}

#[async_trait]
impl ResourceStrategy for ByIdStrategy {
    type Output = CatalogItem;
    type Remote = CatalogItem;

    async fn query_local(&self) -> Result<Option<CachedData<CatalogItem>>, SyncError> {
        Ok(self.store.read_by_id(&self.id).await?)
    }

    async fn fetch_remote(&self) -> Result<CatalogItem, ApiError> {
        self.remote.fetch_by_id(&self.id).await
    }

    async fn persist_remote(&self, item: CatalogItem) -> Result<(), SyncError> {
        // Upsert keeps the stored favorite flag
        self.store.upsert_one(&item).await?;
        Ok(())
    }

    fn should_fetch(&self, cached: &CachedData<CatalogItem>) -> bool {
        cached.is_stale(self.max_age)
    }
}

// ===== Search =====

pub struct SearchStrategy {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn LocalStore>,
    term: String,
    validated: ValidatedTerms,
    max_age: Duration,
}

impl SearchStrategy {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn LocalStore>,
        term: impl Into<String>,
        validated: ValidatedTerms,
        max_age: Duration,
    ) -> Self {
        Self {
            remote,
            store,
            term: term.into(),
            validated,
            max_age,
        }
    }

    fn normalized(&self) -> String {
        self.term.trim().to_lowercase()
    }

    fn is_validated(&self) -> bool {
        self.validated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&self.normalized())
    }
}

#[async_trait]
impl ResourceStrategy for SearchStrategy {
    type Output = Vec<CatalogItem>;
    type Remote = Vec<CatalogItem>;

    async fn query_local(&self) -> Result<Option<CachedData<Vec<CatalogItem>>>, SyncError> {
        let rows = self.store.search_by_name(self.term.trim()).await?;
        Ok(oldest(rows))
    }

    async fn fetch_remote(&self) -> Result<Vec<CatalogItem>, ApiError> {
        self.remote.search(self.term.trim(), 0).await
    }

    async fn persist_remote(&self, results: Vec<CatalogItem>) -> Result<(), SyncError> {
        if !results.is_empty() {
            self.store.upsert_detached(&results).await?;
        }
        debug!(term = %self.term, count = results.len(), "Stored search results");
        self.validated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.normalized());
        Ok(())
    }

    fn should_fetch(&self, cached: &CachedData<Vec<CatalogItem>>) -> bool {
        !self.is_validated() || cached.is_stale(self.max_age)
    }

    fn vacant(&self) -> Option<Vec<CatalogItem>> {
        Some(Vec::new())
    }
}

// ===== Images =====

pub struct ImagesStrategy {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn LocalStore>,
    id: String,
    max_age: Duration,
    /// Gallery fetched before the breed row itself was cached
    detached: Mutex<Option<Vec<String>>>,
}

impl ImagesStrategy {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn LocalStore>,
        id: impl Into<String>,
        max_age: Duration,
    ) -> Self {
        Self {
            remote,
            store,
            id: id.into(),
            max_age,
            detached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ResourceStrategy for ImagesStrategy {
    type Output = Vec<String>;
    type Remote = Vec<String>;

    async fn query_local(&self) -> Result<Option<CachedData<Vec<String>>>, SyncError> {
        // A gallery held in memory came from this load; it beats whatever
        // primary image a concurrent by-id load may have stored since
        let detached = self.detached.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(images) = detached {
            return Ok(Some(CachedData::new(images)));
        }
        Ok(self.store.read_images(&self.id).await?)
    }

    async fn fetch_remote(&self) -> Result<Vec<String>, ApiError> {
        self.remote.fetch_images(&self.id).await
    }

    async fn persist_remote(&self, images: Vec<String>) -> Result<(), SyncError> {
        if images.is_empty() {
            // Nothing better than the primary image already stored
            return Ok(());
        }
        match self.store.update_images(&self.id, &images).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => {
                debug!(id = %self.id, "Breed row not cached yet, holding gallery in memory");
                *self.detached.lock().unwrap_or_else(PoisonError::into_inner) = Some(images);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn should_fetch(&self, cached: &CachedData<Vec<String>>) -> bool {
        cached.is_stale(self.max_age)
    }

    fn vacant(&self) -> Option<Vec<String>> {
        Some(Vec::new())
    }
}
