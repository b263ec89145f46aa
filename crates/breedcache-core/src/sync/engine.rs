//! Cache-then-network read protocol.
//!
//! One generic [`SyncEngine::load`] drives every query key. What differs per
//! key (where to read, what to fetch, how to write) lives in a
//! [`ResourceStrategy`].
//!
//! Protocol for one load:
//! - read the local store
//! - cache hit that is fresh and not forced: `Success(cached)`, done
//! - otherwise `Loading(cached)`, fetch once, write, re-read, `Success(fresh)`
//! - any failure: `Error(message, cached)`
//!
//! Each load is tagged with a per-key generation. A load that has been
//! superseded by a newer load of the same key ends without a terminal state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::{debug, error, info, warn};

use crate::api::ApiError;
use crate::cache::CachedData;
use crate::resource::ResourceState;
use crate::store::StoreError;

use super::classify::{classify, SyncError};

/// One cacheable request shape
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    ListPage(u32),
    ById(String),
    Search(String),
    Images(String),
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::ListPage(page) => write!(f, "list page {}", page),
            QueryKey::ById(id) => write!(f, "breed {}", id),
            QueryKey::Search(term) => write!(f, "search: {}", term),
            QueryKey::Images(id) => write!(f, "images {}", id),
        }
    }
}

/// The four steps that vary per query key.
#[async_trait]
pub trait ResourceStrategy: Send + Sync + 'static {
    /// What observers receive
    type Output: Clone + Send + Sync + 'static;
    /// What the remote returns
    type Remote: Send + 'static;

    async fn query_local(&self) -> Result<Option<CachedData<Self::Output>>, SyncError>;

    async fn fetch_remote(&self) -> Result<Self::Remote, ApiError>;

    async fn persist_remote(&self, remote: Self::Remote) -> Result<(), SyncError>;

    /// Whether a cached value must be revalidated
    fn should_fetch(&self, cached: &CachedData<Self::Output>) -> bool;

    /// Value to report when the store holds nothing after a successful write.
    /// `None` makes that case an error.
    fn vacant(&self) -> Option<Self::Output> {
        None
    }
}

#[derive(Debug, Default)]
pub struct SyncEngine {
    generations: Mutex<HashMap<QueryKey, u64>>,
}

impl SyncEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start a new load for `key`, superseding any load in flight
    fn begin(&self, key: &QueryKey) -> u64 {
        let mut generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = generations.entry(key.clone()).or_insert(0);
        *generation += 1;
        *generation
    }

    pub fn is_current(&self, key: &QueryKey, generation: u64) -> bool {
        let generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        generations.get(key).copied() == Some(generation)
    }

    pub fn load<S: ResourceStrategy>(
        self: &Arc<Self>,
        key: QueryKey,
        force_refresh: bool,
        strategy: S,
    ) -> BoxStream<'static, ResourceState<S::Output>> {
        let engine = Arc::clone(self);
        let generation = engine.begin(&key);

        Box::pin(stream! {
            let cached = match strategy.query_local().await {
                Ok(cached) => cached,
                Err(e) => {
                    error!(key = %key, error = %e, "Local read failed, treating as empty");
                    None
                }
            };

            if let Some(hit) = &cached {
                if !force_refresh && !strategy.should_fetch(hit) {
                    debug!(key = %key, age = %hit.age_display(), "Cache hit");
                    yield ResourceState::Success(hit.data.clone());
                    return;
                }
            }

            let partial = cached.map(|c| c.data);
            yield ResourceState::Loading(partial.clone());

            info!(key = %key, force_refresh, generation, "Fetching from remote");
            let fetched = strategy.fetch_remote().await;

            if !engine.is_current(&key, generation) {
                debug!(key = %key, generation, "Superseded, dropping result");
                return;
            }

            let remote = match fetched {
                Ok(remote) => remote,
                Err(e) => {
                    let kind = classify(&SyncError::Transport(e));
                    warn!(key = %key, kind = ?kind, "Fetch failed");
                    yield ResourceState::error(kind.user_message(), partial);
                    return;
                }
            };

            if let Err(e) = strategy.persist_remote(remote).await {
                error!(key = %key, error = %e, "Failed to persist fetched data");
                yield ResourceState::error(classify(&e).user_message(), partial);
                return;
            }

            match strategy.query_local().await {
                Ok(Some(fresh)) => {
                    debug!(key = %key, "Emitting fresh value");
                    yield ResourceState::Success(fresh.data);
                }
                Ok(None) => match strategy.vacant() {
                    Some(empty) => {
                        yield ResourceState::Success(empty);
                    }
                    None => {
                        let e = SyncError::Persistence(StoreError::NotFound(key.to_string()));
                        error!(key = %key, "Row missing after write");
                        yield ResourceState::error(classify(&e).user_message(), partial);
                    }
                },
                Err(e) => {
                    error!(key = %key, error = %e, "Re-read after write failed");
                    yield ResourceState::error(classify(&e).user_message(), partial);
                }
            }
        })
    }
}
