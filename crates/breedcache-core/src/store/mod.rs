//! Local persistent store for catalog rows.
//!
//! The store is the single source of truth. `LocalStore` is the seam the sync
//! engine writes through; `SqliteStore` is the on-device implementation.
//!
//! Reads are snapshots. Reactivity comes from `changes()`, a watch channel
//! bumped after every committed write; the `observe_*` helpers turn it into
//! streams that re-run their query on each bump.

pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::warn;

use crate::cache::CachedData;
use crate::models::CatalogItem;

pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no catalog row with id {0}")]
    NotFound(String),

    #[error("lock acquisition failed")]
    LockFailed,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Rows reached through list paging, in list order
    async fn read_all(&self) -> Result<Vec<CachedData<CatalogItem>>, StoreError>;

    /// Favorited rows, listed or not
    async fn read_favorites(&self) -> Result<Vec<CachedData<CatalogItem>>, StoreError>;

    async fn read_by_id(&self, id: &str) -> Result<Option<CachedData<CatalogItem>>, StoreError>;

    /// Rows whose name contains `term`, case-insensitively
    async fn search_by_name(&self, term: &str) -> Result<Vec<CachedData<CatalogItem>>, StoreError>;

    /// Gallery for a row; `cached_at` is the gallery fetch time
    async fn read_images(&self, id: &str) -> Result<Option<CachedData<Vec<String>>>, StoreError>;

    /// Merge-by-id of list rows: overwrites every column except `is_favorite`
    /// and list position; rows new to the list are appended
    async fn upsert_many(&self, items: &[CatalogItem]) -> Result<(), StoreError>;

    /// Merge-by-id that does not add rows to the list (search results)
    async fn upsert_detached(&self, items: &[CatalogItem]) -> Result<(), StoreError>;

    /// Single-row detached upsert (detail fetches)
    async fn upsert_one(&self, item: &CatalogItem) -> Result<(), StoreError>;

    /// Replace the list in one transaction. Non-favorite rows are deleted;
    /// favorites survive, keeping their flag whether or not they are in `items`.
    async fn replace_all(&self, items: &[CatalogItem]) -> Result<(), StoreError>;

    async fn update_favorite(&self, id: &str, is_favorite: bool) -> Result<(), StoreError>;

    async fn update_images(&self, id: &str, images: &[String]) -> Result<(), StoreError>;

    async fn delete_all(&self) -> Result<(), StoreError>;

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError>;

    /// Change counter, bumped after every committed write
    fn changes(&self) -> watch::Receiver<u64>;
}

/// Re-run `query` now and after every store write. Read failures are logged
/// and skipped; the stream only ends when the store is dropped.
fn observe<T, F, Fut>(store: Arc<dyn LocalStore>, query: F) -> BoxStream<'static, T>
where
    T: Send + 'static,
    F: Fn(Arc<dyn LocalStore>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<T, StoreError>> + Send + 'static,
{
    let changes = WatchStream::new(store.changes());
    changes
        .then(move |_| query(Arc::clone(&store)))
        .filter_map(|result| async move {
            match result {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(error = %e, "Store observation read failed");
                    None
                }
            }
        })
        .boxed()
}

pub fn observe_all(store: Arc<dyn LocalStore>) -> BoxStream<'static, Vec<CatalogItem>> {
    observe(store, |store| async move {
        let rows = store.read_all().await?;
        Ok(rows.into_iter().map(|row| row.data).collect())
    })
}

pub fn observe_by_id(
    store: Arc<dyn LocalStore>,
    id: impl Into<String>,
) -> BoxStream<'static, Option<CatalogItem>> {
    let id = Arc::new(id.into());
    observe(store, move |store| {
        let id = Arc::clone(&id);
        async move { Ok(store.read_by_id(&id).await?.map(|row| row.data)) }
    })
}

pub fn observe_search(
    store: Arc<dyn LocalStore>,
    term: impl Into<String>,
) -> BoxStream<'static, Vec<CatalogItem>> {
    let term = Arc::new(term.into());
    observe(store, move |store| {
        let term = Arc::clone(&term);
        async move {
            let rows = store.search_by_name(&term).await?;
            Ok(rows.into_iter().map(|row| row.data).collect())
        }
    })
}
