//! Scripted content provider for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::content::{ContentProvider, FetchError, Item};

/// Serves queued items first, then either generated `Article N` items or
/// failures.
pub(crate) struct ScriptedProvider {
    queued: Mutex<VecDeque<Item>>,
    generate: bool,
    generated: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedProvider {
    /// Never runs dry.
    pub fn endless() -> Self {
        Self::build(Vec::new(), true)
    }

    /// Serves `items` in order, then fails every call.
    pub fn with_items(items: Vec<Item>) -> Self {
        Self::build(items, false)
    }

    /// Fails every call.
    pub fn failing() -> Self {
        Self::build(Vec::new(), false)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Random-item fetches issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn build(items: Vec<Item>, generate: bool) -> Self {
        Self {
            queued: Mutex::new(items.into()),
            generate,
            generated: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ContentProvider for ScriptedProvider {
    async fn fetch_random_item(&self) -> Result<Item, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(item) = self.queued.lock().await.pop_front() {
            return Ok(item);
        }
        if self.generate {
            let n = self.generated.fetch_add(1, Ordering::SeqCst);
            let title = format!("Article {}", n);
            return Ok(Item::new(title.clone(), title));
        }
        Err(FetchError::HttpStatus(503))
    }

    async fn fetch_by_query(&self, _query: &str) -> Result<Vec<String>, FetchError> {
        Ok(Vec::new())
    }
}
