//! Remote catalog module for The Cat API.
//!
//! `RemoteSource` is the seam the sync engine talks to; `ApiClient` is the
//! reqwest-backed implementation. Every call is an idempotent read and fails
//! with a typed `ApiError`.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::CatalogItem;

pub use client::ApiClient;
pub use error::ApiError;

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// One page of the breed list
    async fn fetch_page(&self, limit: u32, page_index: u32) -> Result<Vec<CatalogItem>, ApiError>;

    async fn fetch_by_id(&self, id: &str) -> Result<CatalogItem, ApiError>;

    /// Breeds whose name matches `term`
    async fn search(&self, term: &str, page_index: u32) -> Result<Vec<CatalogItem>, ApiError>;

    /// Gallery image URLs for a breed
    async fn fetch_images(&self, id: &str) -> Result<Vec<String>, ApiError>;
}
