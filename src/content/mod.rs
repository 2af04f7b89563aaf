//! Content provider boundary.
//!
//! The feed core only sees [`ContentProvider`]; [`WikipediaClient`] is the
//! production implementation over the Wikipedia REST and Action APIs.

mod item;
mod wikipedia;

use async_trait::async_trait;
use thiserror::Error;

pub use item::Item;
pub use wikipedia::WikipediaClient;

/// Why a fetch produced no item. Never retried by the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// Source of candidate items.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// One random item, normalized.
    async fn fetch_random_item(&self) -> Result<Item, FetchError>;

    /// Candidate identifiers matching `query`, best match first.
    async fn fetch_by_query(&self, query: &str) -> Result<Vec<String>, FetchError>;
}
