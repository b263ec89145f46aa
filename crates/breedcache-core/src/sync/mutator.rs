//! Optimistic favorite toggling.
//!
//! The new value is pushed to the caller's view before any I/O happens; the
//! store write follows. If the write fails the view is reverted, but only by
//! the most recent toggle on that id, and always to the last value the store
//! confirmed. An id is tracked only while a toggle on it is in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::store::LocalStore;

use super::classify::{classify, ErrorKind, SyncError};

/// Receives optimistic and rolled-back favorite values for display
pub trait FavoriteSink: Send + Sync {
    fn apply(&self, id: &str, is_favorite: bool);
}

impl<F> FavoriteSink for F
where
    F: Fn(&str, bool) + Send + Sync,
{
    fn apply(&self, id: &str, is_favorite: bool) {
        self(id, is_favorite)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Confirmed,
    /// The write failed and the view was reverted
    RolledBack(ErrorKind),
    /// The write failed but a newer toggle on the same id owns the view
    Superseded,
}

struct Pending {
    /// Serializes store writes per id
    write_lock: Arc<tokio::sync::Mutex<()>>,
    /// Sequence number of the latest toggle issued for the id
    latest: u64,
    /// Toggles issued but not yet settled
    in_flight: usize,
    /// Durable value: what the first in-flight toggle started from, then
    /// whatever each successful write stored
    confirmed: bool,
}

pub struct OptimisticMutator {
    store: Arc<dyn LocalStore>,
    pending: Mutex<HashMap<String, Pending>>,
}

impl OptimisticMutator {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn issue(&self, id: &str, current: bool) -> (u64, Arc<tokio::sync::Mutex<()>>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = pending.entry(id.to_string()).or_insert_with(|| Pending {
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            latest: 0,
            in_flight: 0,
            confirmed: current,
        });
        entry.latest += 1;
        entry.in_flight += 1;
        (entry.latest, Arc::clone(&entry.write_lock))
    }

    /// Record the end of toggle `seq`. Returns the value to roll the view
    /// back to when this toggle failed and is still the latest one.
    fn settle(&self, id: &str, seq: u64, stored: Option<bool>) -> Option<bool> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = pending.get_mut(id)?;
        if let Some(value) = stored {
            entry.confirmed = value;
        }
        entry.in_flight = entry.in_flight.saturating_sub(1);
        let rollback = (stored.is_none() && entry.latest == seq).then_some(entry.confirmed);
        if entry.in_flight == 0 {
            pending.remove(id);
        }
        rollback
    }

    /// Flip `id` from `current` to `!current`: view first, then the store.
    pub async fn toggle_favorite(
        &self,
        id: &str,
        current: bool,
        sink: &dyn FavoriteSink,
    ) -> MutationOutcome {
        let target = !current;
        let (seq, write_lock) = self.issue(id, current);
        sink.apply(id, target);

        let result = {
            let _guard = write_lock.lock().await;
            self.store.update_favorite(id, target).await
        };

        match result {
            Ok(()) => {
                self.settle(id, seq, Some(target));
                debug!(id, is_favorite = target, "Favorite saved");
                MutationOutcome::Confirmed
            }
            Err(e) => {
                let kind = classify(&SyncError::Persistence(e));
                match self.settle(id, seq, None) {
                    Some(confirmed) => {
                        warn!(id, kind = ?kind, is_favorite = confirmed, "Favorite update failed, rolling back");
                        sink.apply(id, confirmed);
                        MutationOutcome::RolledBack(kind)
                    }
                    None => {
                        debug!(id, "Favorite update failed, newer toggle pending");
                        MutationOutcome::Superseded
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::store::SqliteStore;
    use crate::testing::{breed, FlakyStore};

    /// View model stand-in: last value pushed per id
    #[derive(Default)]
    struct View(Mutex<HashMap<String, bool>>);

    impl FavoriteSink for View {
        fn apply(&self, id: &str, is_favorite: bool) {
            self.0.lock().unwrap().insert(id.to_string(), is_favorite);
        }
    }

    impl View {
        fn get(&self, id: &str) -> Option<bool> {
            self.0.lock().unwrap().get(id).copied()
        }
    }

    async fn stored_favorite(store: &dyn LocalStore, id: &str) -> bool {
        store.read_by_id(id).await.unwrap().unwrap().data.is_favorite
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_original() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert_one(&breed("abys")).await.unwrap();
        let mutator = OptimisticMutator::new(store.clone());
        let view = View::default();

        let first = mutator.toggle_favorite("abys", false, &view).await;
        assert_eq!(first, MutationOutcome::Confirmed);
        assert_eq!(view.get("abys"), Some(true));
        assert!(stored_favorite(store.as_ref(), "abys").await);

        let second = mutator.toggle_favorite("abys", true, &view).await;
        assert_eq!(second, MutationOutcome::Confirmed);
        assert_eq!(view.get("abys"), Some(false));
        assert!(!stored_favorite(store.as_ref(), "abys").await);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let store = FlakyStore::new();
        store.upsert_one(&breed("abys")).await.unwrap();
        store.fail_writes(true);
        let mutator = OptimisticMutator::new(store.clone());

        let pushed = Mutex::new(Vec::new());
        let sink = |id: &str, value: bool| pushed.lock().unwrap().push((id.to_string(), value));

        let outcome = mutator.toggle_favorite("abys", false, &sink).await;
        assert!(matches!(outcome, MutationOutcome::RolledBack(ErrorKind::Unknown(_))));
        assert_eq!(
            *pushed.lock().unwrap(),
            vec![("abys".to_string(), true), ("abys".to_string(), false)]
        );
        assert!(!stored_favorite(store.as_ref(), "abys").await);
    }

    #[tokio::test]
    async fn test_unknown_id_rolls_back() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mutator = OptimisticMutator::new(store);
        let view = View::default();

        let outcome = mutator.toggle_favorite("ghost", false, &view).await;
        assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
        assert_eq!(view.get("ghost"), Some(false));
    }

    #[tokio::test]
    async fn test_only_latest_toggle_rolls_back() {
        let store = FlakyStore::new();
        store.upsert_one(&breed("abys")).await.unwrap();
        store.fail_writes(true);
        let mutator = OptimisticMutator::new(store.clone());
        let view = View::default();

        // Both toggles are issued before either write settles
        let (first, second) = tokio::join!(
            mutator.toggle_favorite("abys", false, &view),
            mutator.toggle_favorite("abys", true, &view),
        );

        assert_eq!(first, MutationOutcome::Superseded);
        assert!(matches!(second, MutationOutcome::RolledBack(_)));
        // Back to the durable value, not the first toggle's unsaved one
        assert_eq!(view.get("abys"), Some(false));
        assert!(!stored_favorite(store.as_ref(), "abys").await);
        assert_eq!(store.favorite_writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_settled_ids_are_forgotten() {
        let store = FlakyStore::new();
        store.upsert_one(&breed("abys")).await.unwrap();
        let mutator = OptimisticMutator::new(store.clone());
        let view = View::default();

        mutator.toggle_favorite("abys", false, &view).await;
        store.fail_writes(true);
        tokio::join!(
            mutator.toggle_favorite("abys", true, &view),
            mutator.toggle_favorite("abys", false, &view),
        );
        mutator.toggle_favorite("ghost", false, &view).await;

        assert!(mutator.pending.lock().unwrap().is_empty());
    }
}
