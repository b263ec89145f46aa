//! Detail screen model for a single breed.
//!
//! The breed and its gallery load concurrently. Once the breed load settles
//! the model follows the stored row, so a favorite toggled on another screen
//! shows up here without a reload.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

use crate::catalog::Catalog;
use crate::models::CatalogItem;
use crate::resource::ResourceState;
use crate::store::observe_by_id;
use crate::sync::{MutationOutcome, QueryKey};

use super::notice::{Notice, NoticeGate};

pub struct BreedDetail {
    catalog: Arc<Catalog>,
    id: String,
    breed: watch::Sender<ResourceState<CatalogItem>>,
    images: watch::Sender<ResourceState<Vec<String>>>,
    notice: watch::Sender<Option<Notice>>,
    gate: Mutex<NoticeGate>,
    following: AtomicBool,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl BreedDetail {
    pub fn new(catalog: Arc<Catalog>, id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            id: id.into(),
            breed: watch::channel(ResourceState::default()).0,
            images: watch::channel(ResourceState::default()).0,
            notice: watch::channel(None).0,
            gate: Mutex::new(NoticeGate::default()),
            following: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn breed(&self) -> watch::Receiver<ResourceState<CatalogItem>> {
        self.breed.subscribe()
    }

    pub fn images(&self) -> watch::Receiver<ResourceState<Vec<String>>> {
        self.images.subscribe()
    }

    pub fn notice(&self) -> watch::Receiver<Option<Notice>> {
        self.notice.subscribe()
    }

    /// Load the breed and its gallery. The handle resolves when both settle.
    pub fn load(self: &Arc<Self>) -> JoinHandle<()> {
        self.spawn_load(false)
    }

    pub fn refresh(self: &Arc<Self>) -> JoinHandle<()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner).reset();
        self.notice.send_replace(None);
        self.spawn_load(true)
    }

    pub fn toggle_favorite(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let current = self.breed.borrow().data()?.is_favorite;
        let this = Arc::clone(self);
        Some(self.spawn(async move {
            let sink = |id: &str, value: bool| this.apply_favorite(id, value);
            let outcome = this
                .catalog
                .mutator()
                .toggle_favorite(&this.id, current, &sink)
                .await;
            if let MutationOutcome::RolledBack(kind) = outcome {
                this.notice.send_replace(Some(Notice::favorite_failed(&kind)));
            }
        }))
    }

    pub fn clear_error(&self) {
        self.notice.send_replace(None);
    }

    pub fn dispose(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
        self.following.store(false, Ordering::SeqCst);
    }

    fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle.abort_handle());
        handle
    }

    fn raise(&self, key: &QueryKey, message: &str, has_data: bool) {
        let admitted = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .admit(key, message);
        if admitted {
            self.notice.send_replace(Some(Notice::load_failed(message, has_data)));
        }
    }

    fn spawn_load(self: &Arc<Self>, force_refresh: bool) -> JoinHandle<()> {
        let this = Arc::clone(self);
        self.spawn(async move {
            let breed = async {
                let key = QueryKey::ById(this.id.clone());
                let mut states = this.catalog.breed(&this.id, force_refresh);
                while let Some(state) = states.next().await {
                    if let ResourceState::Error { message, partial } = &state {
                        this.raise(&key, message, partial.is_some());
                    }
                    this.breed.send_replace(state);
                }
            };
            let images = async {
                let key = QueryKey::Images(this.id.clone());
                let mut states = this.catalog.images(&this.id, force_refresh);
                while let Some(state) = states.next().await {
                    if let ResourceState::Error { message, partial } = &state {
                        // A breed without a gallery still has its primary image
                        let has_data = partial.as_ref().is_some_and(|urls| !urls.is_empty());
                        if !has_data {
                            this.raise(&key, message, false);
                        }
                    }
                    this.images.send_replace(state);
                }
            };
            futures::join!(breed, images);

            if this.breed.borrow().data().is_some() {
                this.follow();
            }
        })
    }

    /// Mirror store changes to this row into the breed state
    fn follow(self: &Arc<Self>) {
        if self.following.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(id = %self.id, "Following stored row");
        let weak = Arc::downgrade(self);
        let mut rows = observe_by_id(self.catalog.store(), self.id.clone());
        self.spawn(async move {
            while let Some(row) = rows.next().await {
                let Some(this) = weak.upgrade() else { break };
                let Some(item) = row else { continue };
                this.breed.send_if_modified(|state| match state {
                    ResourceState::Success(current) if *current != item => {
                        *current = item;
                        true
                    }
                    _ => false,
                });
            }
        });
    }

    fn apply_favorite(&self, id: &str, is_favorite: bool) {
        self.breed.send_if_modified(|state| match state.data_mut() {
            Some(item) if item.id == id && item.is_favorite != is_favorite => {
                item.is_favorite = is_favorite;
                true
            }
            _ => false,
        });
    }
}

impl Drop for BreedDetail {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::api::ApiError;
    use crate::screens::notice::NoticeKind;
    use crate::store::{LocalStore, SqliteStore};
    use crate::testing::{breed, FakeRemote, FlakyStore};

    fn catalog(remote: Arc<FakeRemote>, store: Arc<dyn LocalStore>) -> Arc<Catalog> {
        Arc::new(Catalog::new(remote, store, 10, chrono::Duration::minutes(60)))
    }

    #[tokio::test]
    async fn test_loads_breed_and_gallery() {
        let remote = FakeRemote::new();
        remote.set_page(0, vec![breed("abys")]);
        remote.set_images("abys", vec!["https://img/1.jpg".into(), "https://img/2.jpg".into()]);
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let detail = BreedDetail::new(catalog(remote.clone(), store), "abys");

        detail.load().await.unwrap();

        assert_eq!(detail.breed().borrow().data().map(|b| b.id.as_str()), Some("abys"));
        assert!(matches!(*detail.breed().borrow(), ResourceState::Success(_)));
        assert_eq!(detail.images().borrow().data().map(Vec::len), Some(2));
        assert_eq!(remote.by_id_calls.load(Ordering::SeqCst), 1);
        assert_eq!(remote.image_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_without_cache_is_full_screen() {
        let remote = FakeRemote::new();
        remote.fail_with(ApiError::Timeout);
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let detail = BreedDetail::new(catalog(remote, store), "1");

        detail.load().await.unwrap();

        assert_eq!(
            *detail.breed().borrow(),
            ResourceState::error(
                "Connection timed out. Please check your internet connection.",
                None
            )
        );
        let notice = detail.notice().borrow().clone().unwrap();
        assert_eq!(notice.kind, NoticeKind::FullScreenRetry);
    }

    #[tokio::test]
    async fn test_follows_favorite_changes_from_elsewhere() {
        let remote = FakeRemote::new();
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert_one(&breed("abys")).await.unwrap();
        let detail = BreedDetail::new(catalog(remote, Arc::clone(&store)), "abys");

        detail.load().await.unwrap();
        let mut rx = detail.breed();
        rx.borrow_and_update();

        store.update_favorite("abys", true).await.unwrap();
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.data().is_some_and(|b| b.is_favorite)),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert!(matches!(state, ResourceState::Success(_)));
    }

    #[tokio::test]
    async fn test_toggle_favorite_and_rollback() {
        let remote = FakeRemote::new();
        let store = FlakyStore::new();
        store.upsert_one(&breed("abys")).await.unwrap();
        let detail = BreedDetail::new(catalog(remote, store.clone()), "abys");
        detail.load().await.unwrap();

        detail.toggle_favorite().unwrap().await.unwrap();
        assert!(detail.breed().borrow().data().unwrap().is_favorite);

        store.fail_writes(true);
        detail.toggle_favorite().unwrap().await.unwrap();
        assert!(detail.breed().borrow().data().unwrap().is_favorite);
        let notice = detail.notice().borrow().clone().unwrap();
        assert_eq!(notice.kind, NoticeKind::Brief);

        detail.clear_error();
        assert!(detail.notice().borrow().is_none());
    }

    #[tokio::test]
    async fn test_toggle_before_load_is_ignored() {
        let remote = FakeRemote::new();
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let detail = BreedDetail::new(catalog(remote, store), "abys");
        assert!(detail.toggle_favorite().is_none());
    }
}
