//! Catalog facade.
//!
//! `Catalog` wires the remote source, the local store and the sync engine
//! together and hands out one `ResourceState` stream per query. It is cheap to
//! share behind an `Arc`; every screen model holds the same instance so paging
//! state and favorite toggles are consistent across screens.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use futures::stream::BoxStream;
use tracing::info;

use crate::api::{ApiClient, RemoteSource};
use crate::config::Config;
use crate::models::CatalogItem;
use crate::resource::ResourceState;
use crate::store::{LocalStore, SqliteStore, StoreError};
use crate::sync::strategies::{
    ByIdStrategy, ImagesStrategy, ListStrategy, SearchStrategy, SharedWindow, ValidatedTerms,
};
use crate::sync::{OptimisticMutator, PageWindow, PagedItems, QueryKey, SyncEngine};

pub struct Catalog {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn LocalStore>,
    engine: Arc<SyncEngine>,
    mutator: Arc<OptimisticMutator>,
    window: SharedWindow,
    validated_searches: ValidatedTerms,
    page_size: u32,
    max_age: chrono::Duration,
}

impl Catalog {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn LocalStore>,
        page_size: u32,
        max_age: chrono::Duration,
    ) -> Self {
        Self {
            mutator: Arc::new(OptimisticMutator::new(Arc::clone(&store))),
            remote,
            store,
            engine: SyncEngine::new(),
            window: Arc::new(Mutex::new(None)),
            validated_searches: Arc::new(Mutex::new(HashSet::new())),
            page_size,
            max_age,
        }
    }

    /// Open the on-disk catalog and the Cat API client described by `config`
    pub fn open(config: &Config) -> Result<Self> {
        let db_path = config.database_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open catalog at {}", db_path.display()))?;
        let client = ApiClient::new(config).context("Failed to build API client")?;
        info!(path = %db_path.display(), "Catalog opened");

        Ok(Self::new(
            Arc::new(client),
            Arc::new(store),
            config.page_size,
            config.cache_max_age(),
        ))
    }

    /// One page of the breed list. Page 0 replaces the list, later pages
    /// append to it; the emitted value is always the whole list.
    pub fn breeds(&self, page_index: u32, force_refresh: bool) -> BoxStream<'static, ResourceState<PagedItems>> {
        let strategy = ListStrategy::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.store),
            Arc::clone(&self.window),
            page_index,
            self.page_size,
            self.max_age,
        );
        self.engine.load(QueryKey::ListPage(page_index), force_refresh, strategy)
    }

    pub fn breed(&self, id: &str, force_refresh: bool) -> BoxStream<'static, ResourceState<CatalogItem>> {
        let strategy = ByIdStrategy::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.store),
            id,
            self.max_age,
        );
        self.engine.load(QueryKey::ById(id.to_string()), force_refresh, strategy)
    }

    pub fn search(&self, term: &str, force_refresh: bool) -> BoxStream<'static, ResourceState<Vec<CatalogItem>>> {
        let strategy = SearchStrategy::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.store),
            term,
            Arc::clone(&self.validated_searches),
            self.max_age,
        );
        self.engine.load(QueryKey::Search(term.trim().to_lowercase()), force_refresh, strategy)
    }

    pub fn images(&self, id: &str, force_refresh: bool) -> BoxStream<'static, ResourceState<Vec<String>>> {
        let strategy = ImagesStrategy::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.store),
            id,
            self.max_age,
        );
        self.engine.load(QueryKey::Images(id.to_string()), force_refresh, strategy)
    }

    /// Paging position after the last completed list load in this process
    pub fn window(&self) -> Option<PageWindow> {
        *self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> Arc<dyn LocalStore> {
        Arc::clone(&self.store)
    }

    pub fn mutator(&self) -> &Arc<OptimisticMutator> {
        &self.mutator
    }

    /// Every favorited breed, including ones no longer on the list
    pub async fn favorites(&self) -> Result<Vec<CatalogItem>, StoreError> {
        let rows = self.store.read_favorites().await?;
        Ok(rows.into_iter().map(|row| row.data).collect())
    }
}
