//! Home screen model: paged breed list, debounced search, favorites filter.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::models::CatalogItem;
use crate::prefs::{PreferenceStore, PrefsError};
use crate::resource::ResourceState;
use crate::sync::{CommittedQuery, MutationOutcome, PagedItems, QueryKey, SearchDispatcher};

use super::notice::{Notice, NoticeGate};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SearchState {
    #[default]
    Inactive,
    Active {
        term: String,
        generation: u64,
        results: ResourceState<Vec<CatalogItem>>,
    },
}

impl SearchState {
    pub fn is_active(&self) -> bool {
        matches!(self, SearchState::Active { .. })
    }

    pub fn term(&self) -> Option<&str> {
        match self {
            SearchState::Active { term, .. } => Some(term),
            SearchState::Inactive => None,
        }
    }

    pub fn results(&self) -> Option<&ResourceState<Vec<CatalogItem>>> {
        match self {
            SearchState::Active { results, .. } => Some(results),
            SearchState::Inactive => None,
        }
    }
}

pub struct CatalogBrowser {
    catalog: Arc<Catalog>,
    prefs: Arc<dyn PreferenceStore>,
    list: watch::Sender<ResourceState<PagedItems>>,
    search: watch::Sender<SearchState>,
    notice: watch::Sender<Option<Notice>>,
    favorites_only: watch::Sender<bool>,
    gate: Mutex<NoticeGate>,
    dispatcher: SearchDispatcher,
    committed: Mutex<Option<mpsc::UnboundedReceiver<CommittedQuery>>>,
    loading_more: AtomicBool,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl CatalogBrowser {
    /// Must be called inside a tokio runtime; the search debounce task starts here.
    pub fn new(catalog: Arc<Catalog>, prefs: Arc<dyn PreferenceStore>, debounce: Duration) -> Arc<Self> {
        let (dispatcher, committed) = SearchDispatcher::spawn(debounce);
        Arc::new(Self {
            catalog,
            prefs,
            list: watch::channel(ResourceState::default()).0,
            search: watch::channel(SearchState::Inactive).0,
            notice: watch::channel(None).0,
            favorites_only: watch::channel(false).0,
            gate: Mutex::new(NoticeGate::default()),
            dispatcher,
            committed: Mutex::new(Some(committed)),
            loading_more: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    // ===== Observers =====

    pub fn list(&self) -> watch::Receiver<ResourceState<PagedItems>> {
        self.list.subscribe()
    }

    pub fn search(&self) -> watch::Receiver<SearchState> {
        self.search.subscribe()
    }

    pub fn notice(&self) -> watch::Receiver<Option<Notice>> {
        self.notice.subscribe()
    }

    pub fn favorites_only(&self) -> watch::Receiver<bool> {
        self.favorites_only.subscribe()
    }

    pub fn theme(&self) -> watch::Receiver<bool> {
        self.prefs.theme_flag()
    }

    /// Raw search input as typed
    pub fn query(&self) -> String {
        self.dispatcher.query()
    }

    /// Items to render: search results while searching, otherwise the list,
    /// narrowed to favorites when the filter is on
    pub fn visible_items(&self) -> Vec<CatalogItem> {
        let favorites_only = *self.favorites_only.borrow();
        let items = match &*self.search.borrow() {
            SearchState::Active { results, .. } => results.data().cloned().unwrap_or_default(),
            SearchState::Inactive => self
                .list
                .borrow()
                .data()
                .map(|page| page.items.clone())
                .unwrap_or_default(),
        };
        if favorites_only {
            items.into_iter().filter(|item| item.is_favorite).collect()
        } else {
            items
        }
    }

    // ===== Actions =====

    /// Begin listening for committed search terms and load the first page
    /// unless fresh data is already on screen.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.listen();
        if matches!(*self.list.borrow(), ResourceState::Success(_)) {
            debug!("List already loaded, skipping initial load");
            return None;
        }
        Some(self.spawn_list_load(0, false))
    }

    /// Begin acting on committed search terms without touching the list.
    /// Later calls are no-ops.
    pub fn listen(self: &Arc<Self>) {
        let committed = self
            .committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut committed) = committed {
            let weak = Arc::downgrade(self);
            self.spawn(async move {
                while let Some(query) = committed.recv().await {
                    let Some(this) = weak.upgrade() else { break };
                    this.on_committed(query);
                }
            });
        }
    }

    /// Explicit refresh: forget suppressed errors and revalidate what is shown
    pub fn refresh(self: &Arc<Self>) -> JoinHandle<()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner).reset();
        self.notice.send_replace(None);

        let search = self.search.borrow().clone();
        match search {
            SearchState::Active {
                term, generation, ..
            } => self.spawn_search(term, generation, true),
            SearchState::Inactive => {
                info!("Refreshing breed list");
                self.spawn_list_load(0, true)
            }
        }
    }

    /// Fetch the next page. Skipped while searching, while a load is in
    /// flight, or once the last page has been reached.
    pub fn load_more(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.search.borrow().is_active() {
            return None;
        }
        let next = {
            let list = self.list.borrow();
            if list.is_loading() {
                return None;
            }
            let page = list.data()?;
            if !page.window.has_more {
                debug!(page = page.window.page_index, "No more pages");
                return None;
            }
            page.window.next_page()
        };
        if self.loading_more.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.spawn_list_load(next, false))
    }

    /// Optimistically flip the favorite flag of a visible item
    pub fn toggle_favorite(self: &Arc<Self>, id: &str) -> Option<JoinHandle<()>> {
        let current = self.favorite_of(id)?;
        let this = Arc::clone(self);
        let id = id.to_string();
        Some(self.spawn(async move {
            let sink = |id: &str, value: bool| this.apply_favorite(id, value);
            let outcome = this
                .catalog
                .mutator()
                .toggle_favorite(&id, current, &sink)
                .await;
            if let MutationOutcome::RolledBack(kind) = outcome {
                this.notice.send_replace(Some(Notice::favorite_failed(&kind)));
            }
        }))
    }

    pub fn set_search_term(&self, raw: impl Into<String>) {
        self.dispatcher.set_query(raw);
    }

    pub fn clear_error(&self) {
        self.notice.send_replace(None);
    }

    /// Flip the favorites-only filter. Also leaves search mode.
    pub fn toggle_favorites_filter(&self) {
        self.favorites_only.send_modify(|on| *on = !*on);
        self.dispatcher.clear();
        self.search.send_replace(SearchState::Inactive);
    }

    pub async fn set_dark_theme(&self, dark: bool) -> Result<(), PrefsError> {
        self.prefs.set_dark_theme(dark).await
    }

    /// Abort everything this screen started. Cached rows are untouched.
    pub fn dispose(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        debug!(count = tasks.len(), "Disposing catalog browser");
        for task in tasks {
            task.abort();
        }
        self.dispatcher.shutdown();
        self.loading_more.store(false, Ordering::SeqCst);
    }

    // ===== Internals =====

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

    fn raise(&self, key: &QueryKey, notice: Notice) {
        let admitted = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .admit(key, &notice.message);
        if admitted {
            self.notice.send_replace(Some(notice));
        } else {
            debug!(key = %key, "Suppressing repeated error notice");
        }
    }

    fn spawn_list_load(self: &Arc<Self>, page_index: u32, force_refresh: bool) -> JoinHandle<()> {
        let this = Arc::clone(self);
        self.spawn(async move {
            let key = QueryKey::ListPage(page_index);
            let mut states = this.catalog.breeds(page_index, force_refresh);
            while let Some(state) = states.next().await {
                if let ResourceState::Error { message, partial } = &state {
                    let notice = if page_index == 0 {
                        let has_data = partial.as_ref().is_some_and(|page| !page.is_empty());
                        Notice::load_failed(message.clone(), has_data)
                    } else {
                        Notice::load_more_failed()
                    };
                    this.raise(&key, notice);
                }
                this.list.send_replace(state);
            }
            if page_index > 0 {
                this.loading_more.store(false, Ordering::SeqCst);
            }
        })
    }

    fn spawn_search(self: &Arc<Self>, term: String, generation: u64, force_refresh: bool) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let tracker = self.dispatcher.tracker();
        self.spawn(async move {
            let key = QueryKey::Search(term.to_lowercase());
            let mut states = this.catalog.search(&term, force_refresh);
            while let Some(state) = states.next().await {
                if !tracker.is_current(generation) {
                    debug!(term = %term, generation, "Dropping superseded search results");
                    return;
                }
                if let ResourceState::Error { message, partial } = &state {
                    let has_data = partial.as_ref().is_some_and(|items| !items.is_empty());
                    this.raise(&key, Notice::load_failed(message.clone(), has_data));
                }
                // Re-checked under the channel lock so a newer term cannot be overwritten
                this.search.send_if_modified(|current| {
                    if !tracker.is_current(generation) {
                        return false;
                    }
                    *current = SearchState::Active {
                        term: term.clone(),
                        generation,
                        results: state,
                    };
                    true
                });
            }
        })
    }

    fn on_committed(self: &Arc<Self>, query: CommittedQuery) {
        match query.term {
            None => {
                debug!("Search cleared, back to the list");
                self.search.send_replace(SearchState::Inactive);
                let empty = self.list.borrow().data().map_or(true, |page| page.is_empty());
                if empty {
                    self.spawn_list_load(0, false);
                }
            }
            Some(term) => {
                self.search.send_replace(SearchState::Active {
                    term: term.clone(),
                    generation: query.generation,
                    results: ResourceState::Loading(None),
                });
                self.spawn_search(term, query.generation, false);
            }
        }
    }

    /// Current favorite flag of `id` as displayed
    fn favorite_of(&self, id: &str) -> Option<bool> {
        let find = |items: &[CatalogItem]| items.iter().find(|item| item.id == id).map(|item| item.is_favorite);
        if let Some(value) = self.list.borrow().data().and_then(|page| find(page.items.as_slice())) {
            return Some(value);
        }
        self.search
            .borrow()
            .results()
            .and_then(|results| results.data())
            .and_then(|items| find(items.as_slice()))
    }

    fn apply_favorite(&self, id: &str, is_favorite: bool) {
        let set = |items: &mut [CatalogItem]| {
            let mut changed = false;
            for item in items.iter_mut().filter(|item| item.id == id) {
                changed |= item.is_favorite != is_favorite;
                item.is_favorite = is_favorite;
            }
            changed
        };
        self.list.send_if_modified(|state| {
            state.data_mut().is_some_and(|page| set(page.items.as_mut_slice()))
        });
        self.search.send_if_modified(|state| match state {
            SearchState::Active { results, .. } => {
                results.data_mut().is_some_and(|items| set(items.as_mut_slice()))
            }
            SearchState::Inactive => false,
        });
    }
}

impl Drop for CatalogBrowser {
    fn drop(&mut self) {
        self.dispose();
    }
}
