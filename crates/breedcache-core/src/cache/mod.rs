//! Cache freshness tracking.
//!
//! Every value read from the local store is wrapped in `CachedData`, which
//! records when the data was last fetched from the remote catalog. The sync
//! engine uses it to decide whether a network fetch is needed; the CLI uses
//! `age_display()` for its status line.

pub mod cached;

pub use cached::CachedData;
