use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{ContentProvider, FetchError, Item};
use crate::util::{strip_control_chars, validate_base_url, BaseUrlError};

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Search results requested per query.
const SEARCH_LIMIT: &str = "10";

// ============================================================================
// Wire Types
// ============================================================================

/// Subset of the REST `page/summary` payload the feed uses.
#[derive(Debug, Deserialize)]
struct SummaryResponse {
    title: Option<String>,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    extract_html: Option<String>,
    #[serde(default)]
    thumbnail: Option<Thumbnail>,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    source: String,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrls>,
}

#[derive(Debug, Deserialize)]
struct PageUrls {
    page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: SearchQuery,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the Wikipedia REST and Action APIs.
#[derive(Clone)]
pub struct WikipediaClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

/// Redirect policy: at most 3 hops, loops rejected.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

impl WikipediaClient {
    /// Build a client for `base_url` (e.g. `https://en.wikipedia.org`).
    ///
    /// Plain HTTP is refused unless the host is localhost.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = validate_base_url(base_url).map_err(|e| match e {
            BaseUrlError::Insecure => FetchError::InsecureBaseUrl,
            other => FetchError::Malformed(other.to_string()),
        })?;

        let http = reqwest::Client::builder()
            .redirect(create_redirect_policy())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .user_agent(concat!("wikiscroll/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| FetchError::Malformed(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Malformed("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Link to the full article when the payload carries none.
    fn fallback_page_url(&self, title: &str) -> String {
        let wiki_title = title.replace(' ', "_");
        self.endpoint(&["wiki", &wiki_title])
            .map(String::from)
            .unwrap_or_else(|_| format!("{}/wiki/{}", self.base_url, wiki_title))
    }

    /// GET `url` and return the body as text, bounded in time and size.
    async fn get_text(&self, url: Url) -> Result<String, FetchError> {
        let request = async move {
            let response = self
                .http
                .get(url)
                .header("Accept", "application/json")
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            read_limited_text(response, MAX_RESPONSE_SIZE).await
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout.as_secs()))?
    }

    async fn fetch_summary(&self, url: Url) -> Result<Item, FetchError> {
        let body = self.get_text(url).await?;
        let summary: SummaryResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))?;
        self.normalize(summary)
    }

    /// Map a summary payload onto an `Item`. A missing title is malformed.
    fn normalize(&self, summary: SummaryResponse) -> Result<Item, FetchError> {
        let title = summary
            .title
            .map(|t| strip_control_chars(t.trim()).into_owned())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FetchError::Malformed("summary has no title".into()))?;

        let canonical_url = summary
            .content_urls
            .and_then(|urls| urls.desktop)
            .and_then(|desktop| desktop.page)
            .unwrap_or_else(|| self.fallback_page_url(&title));

        Ok(Item {
            id: title.clone(),
            summary_text: summary
                .extract
                .map(|s| strip_control_chars(&s).into_owned())
                .unwrap_or_default(),
            summary_html: summary.extract_html,
            thumbnail_url: summary.thumbnail.map(|t| t.source),
            canonical_url,
            relevance_score: None,
            title,
        })
    }
}

#[async_trait]
impl ContentProvider for WikipediaClient {
    async fn fetch_random_item(&self) -> Result<Item, FetchError> {
        let url = self.endpoint(&["api", "rest_v1", "page", "random", "summary"])?;
        let item = self.fetch_summary(url).await?;
        tracing::debug!(title = %item.title, "Fetched random article");
        Ok(item)
    }

    async fn fetch_by_query(&self, query: &str) -> Result<Vec<String>, FetchError> {
        let mut url = self.endpoint(&["w", "api.php"])?;
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("list", "search")
            .append_pair("format", "json")
            .append_pair("srlimit", SEARCH_LIMIT)
            .append_pair("srsearch", query);

        let body = self.get_text(url).await?;
        let response: SearchResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))?;

        let titles: Vec<String> = response
            .query
            .search
            .into_iter()
            .map(|hit| strip_control_chars(&hit.title).into_owned())
            .collect();
        tracing::debug!(query = %query, hits = titles.len(), "Search completed");
        Ok(titles)
    }
}

/// Read a response body as UTF-8, failing once it exceeds `limit` bytes.
async fn read_limited_text(response: reqwest::Response, limit: usize) -> Result<String, FetchError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| FetchError::InvalidUtf8)
}
