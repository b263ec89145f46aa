//! Synchronization between the remote catalog and the local store.
//!
//! - `engine`: cache-then-network loads, one generic protocol for every query key
//! - `strategies`: what list, by-id, search and image loads read, fetch and write
//! - `pagination`: page merging and the paging window
//! - `mutator`: optimistic favorite toggles with rollback
//! - `search`: debounced search terms with generation tagging
//! - `classify`: failure taxonomy and user-facing copy

pub mod classify;
pub mod engine;
pub mod mutator;
pub mod pagination;
pub mod search;
pub mod strategies;

pub use classify::{classify, ErrorKind, SyncError};
pub use engine::{QueryKey, ResourceStrategy, SyncEngine};
pub use mutator::{FavoriteSink, MutationOutcome, OptimisticMutator};
pub use pagination::{PageMerge, PageWindow, PagedItems, PaginationMerger};
pub use search::{CommittedQuery, GenerationTracker, SearchDispatcher};
