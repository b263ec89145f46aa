//! Debounced search input.
//!
//! Raw keystrokes go in through [`SearchDispatcher::set_query`]; a background
//! task forwards a term only once the input has been quiet for the debounce
//! window. Each committed term carries a generation; consumers drop results
//! whose generation is no longer current instead of cancelling the request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// A term that survived the debounce window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedQuery {
    /// `None` for a blank query: leave search mode
    pub term: Option<String>,
    pub generation: u64,
}

pub struct SearchDispatcher {
    raw: watch::Sender<String>,
    generation: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl SearchDispatcher {
    /// Spawn the debounce task. Must be called inside a tokio runtime.
    pub fn spawn(window: Duration) -> (Self, mpsc::UnboundedReceiver<CommittedQuery>) {
        let (raw, rx) = watch::channel(String::new());
        let (tx, committed) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(debounce(rx, tx, Arc::clone(&generation), window));
        (
            Self {
                raw,
                generation,
                task,
            },
            committed,
        )
    }

    pub fn set_query(&self, raw: impl Into<String>) {
        self.raw.send_replace(raw.into());
    }

    /// Latest raw input, committed or not
    pub fn query(&self) -> String {
        self.raw.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Leave search mode immediately: blank the input and invalidate any
    /// result still in flight without waiting for the debounce window.
    pub fn clear(&self) {
        self.raw.send_replace(String::new());
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Stop the debounce task; no further terms are committed
    pub fn shutdown(&self) {
        self.task.abort();
    }

    /// Shared handle for checking currency from spawned tasks
    pub fn tracker(&self) -> GenerationTracker {
        GenerationTracker(Arc::clone(&self.generation))
    }
}

impl Drop for SearchDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Clone)]
pub struct GenerationTracker(Arc<AtomicU64>);

impl GenerationTracker {
    pub fn is_current(&self, generation: u64) -> bool {
        self.0.load(Ordering::SeqCst) == generation
    }
}

fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

async fn debounce(
    mut rx: watch::Receiver<String>,
    tx: mpsc::UnboundedSender<CommittedQuery>,
    counter: Arc<AtomicU64>,
    window: Duration,
) {
    // Search mode starts inactive, so an initial blank is not a change
    let mut last: Option<String> = None;
    let mut last_generation = 0;

    loop {
        if rx.changed().await.is_err() {
            return;
        }

        // Restart the window on every keystroke until the input settles
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = tokio::time::sleep(window) => break,
            }
        }

        let term = normalize(&rx.borrow_and_update());
        // A `clear()` since the last commit invalidated it, so even the
        // same term has to be committed again
        if term == last && counter.load(Ordering::SeqCst) == last_generation {
            continue;
        }
        last = term.clone();

        let generation = counter.fetch_add(1, Ordering::SeqCst) + 1;
        last_generation = generation;
        debug!(term = ?term, generation, "Search term committed");
        if tx.send(CommittedQuery { term, generation }).is_err() {
            return;
        }
    }
}
