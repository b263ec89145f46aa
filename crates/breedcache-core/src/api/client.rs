//! API client for communicating with The Cat API.
//!
//! This module provides the `ApiClient` struct for fetching breed pages,
//! single breeds, search results and breed image galleries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{BreedResponse, CatalogItem, ImageResponse};

use super::{ApiError, RemoteSource};

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the Cat API key
const API_KEY_HEADER: &str = "x-api-key";

/// Number of gallery images requested per breed.
/// 10 fills a detail carousel without a second round trip.
const GALLERY_IMAGE_LIMIT: u32 = 10;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for The Cat API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    /// Create a new API client from the loaded configuration
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.api_key {
            let value = header::HeaderValue::from_str(key)
                .map_err(|e| ApiError::Other(format!("Invalid API key header: {}", e)))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Endpoint URL from path segments. Each segment is percent-encoded, so
    /// an id can never add path components, a query or a fragment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::Other(format!("Invalid API base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Other(format!("API base URL cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str], query: &[(&str, String)]) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url.clone())
                .headers(self.headers()?)
                .query(query)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    // Decode from text so a malformed payload is reported as
                    // InvalidResponse rather than a transport failure
                    let text = response.text().await?;
                    debug!(url = %url, bytes = text.len(), "Response received");
                    return Ok(serde_json::from_str(&text)?);
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

#[async_trait]
impl RemoteSource for ApiClient {
    async fn fetch_page(&self, limit: u32, page_index: u32) -> Result<Vec<CatalogItem>, ApiError> {
        let breeds: Vec<BreedResponse> = self
            .get(
                &["v1", "breeds"],
                &[("limit", limit.to_string()), ("page", page_index.to_string())],
            )
            .await?;
        debug!(page = page_index, count = breeds.len(), "Breed page fetched");
        Ok(breeds.iter().map(BreedResponse::to_item).collect())
    }

    async fn fetch_by_id(&self, id: &str) -> Result<CatalogItem, ApiError> {
        let breed: BreedResponse = self.get(&["v1", "breeds", id], &[]).await?;
        Ok(breed.to_item())
    }

    /// The backend does not paginate search; `page_index` is accepted for
    /// interface symmetry and ignored.
    async fn search(&self, term: &str, _page_index: u32) -> Result<Vec<CatalogItem>, ApiError> {
        let breeds: Vec<BreedResponse> = self
            .get(
                &["v1", "breeds", "search"],
                &[("q", term.to_string()), ("attach_image", "1".to_string())],
            )
            .await?;
        debug!(term = term, count = breeds.len(), "Search results fetched");
        Ok(breeds.iter().map(BreedResponse::to_item).collect())
    }

    async fn fetch_images(&self, id: &str) -> Result<Vec<String>, ApiError> {
        let images: Vec<ImageResponse> = self
            .get(
                &["v1", "images", "search"],
                &[
                    ("limit", GALLERY_IMAGE_LIMIT.to_string()),
                    ("page", "0".to_string()),
                    ("order", "RANDOM".to_string()),
                    ("breed_ids", id.to_string()),
                ],
            )
            .await?;
        Ok(images.into_iter().map(|img| img.url).collect())
    }
}
