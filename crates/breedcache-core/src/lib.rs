//! breedcache core library.
//!
//! An offline-first catalog of cat breeds backed by The Cat API. The local
//! SQLite store is the source of truth; the sync engine serves cached rows
//! first and refreshes them from the network when they are stale.
//!
//! - `api`: remote catalog client
//! - `store`: local persistent store and change observation
//! - `sync`: cache-then-network engine, paging, favorites, search debounce
//! - `screens`: observable screen models for list and detail views
//! - `prefs`: persisted theme preference
//! - `config`: application configuration

pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod models;
pub mod prefs;
pub mod resource;
pub mod screens;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use cache::CachedData;
pub use catalog::Catalog;
pub use config::Config;
pub use models::CatalogItem;
pub use prefs::{JsonPreferences, PreferenceStore, PrefsError};
pub use resource::ResourceState;
