use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::content::{ContentProvider, Item};

/// A pre-fetched item waiting to be shown. Handed out at most once.
#[derive(Debug, Clone)]
pub struct BufferedEntry {
    pub item: Item,
    pub fetched_at: DateTime<Utc>,
}

struct BufferState {
    provider: Arc<dyn ContentProvider>,
    queue: Mutex<VecDeque<BufferedEntry>>,
    refilling: AtomicBool,
    capacity: usize,
}

/// FIFO of ready items that hides provider latency from the feed.
///
/// Cloning is cheap and every clone shares the same queue, so a refill
/// can run on a background task while the feed keeps consuming.
#[derive(Clone)]
pub struct PrefetchBuffer {
    state: Arc<BufferState>,
}

/// Clears the in-flight flag when a refill pass ends, including when its
/// task is aborted.
struct RefillGuard<'a>(&'a AtomicBool);

impl Drop for RefillGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PrefetchBuffer {
    pub fn new(provider: Arc<dyn ContentProvider>, capacity: usize) -> Self {
        Self {
            state: Arc::new(BufferState {
                provider,
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                refilling: AtomicBool::new(false),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    pub async fn len(&self) -> usize {
        self.state.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn is_refilling(&self) -> bool {
        self.state.refilling.load(Ordering::Acquire)
    }

    /// Fetch sequentially until the queue holds `capacity` entries.
    ///
    /// Stops at the first failure without touching what is already queued.
    /// Only one pass runs at a time: a call made while another pass is in
    /// flight returns 0 immediately. Returns the number of entries added.
    pub async fn enqueue_up_to_capacity(&self) -> usize {
        if self
            .state
            .refilling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("Refill already in flight, skipping");
            return 0;
        }
        let _guard = RefillGuard(&self.state.refilling);

        let mut added = 0;
        while self.len().await < self.state.capacity {
            match self.state.provider.fetch_random_item().await {
                Ok(item) => {
                    let mut queue = self.state.queue.lock().await;
                    if queue.len() >= self.state.capacity {
                        break;
                    }
                    tracing::debug!(
                        title = %item.title,
                        buffered = queue.len() + 1,
                        capacity = self.state.capacity,
                        "Preloaded item"
                    );
                    queue.push_back(BufferedEntry {
                        item,
                        fetched_at: Utc::now(),
                    });
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, added = added, "Prefetch failed, stopping refill");
                    break;
                }
            }
        }
        added
    }

    /// Start a refill pass on a background task.
    ///
    /// Returns `None` when a pass is already running.
    pub fn spawn_refill(&self) -> Option<JoinHandle<usize>> {
        if self.is_refilling() {
            return None;
        }
        let buffer = self.clone();
        Some(tokio::spawn(async move { buffer.enqueue_up_to_capacity().await }))
    }

    /// Pop the oldest entry.
    ///
    /// Falling below half capacity kicks off a background refill. An empty
    /// buffer returns `None` and the caller fetches directly.
    pub async fn take_next(&self) -> Option<BufferedEntry> {
        let (entry, remaining) = {
            let mut queue = self.state.queue.lock().await;
            let entry = queue.pop_front()?;
            (entry, queue.len())
        };

        if remaining < self.state.capacity / 2 {
            tracing::debug!(remaining = remaining, "Buffer below half, refilling");
            self.spawn_refill();
        }
        Some(entry)
    }
}
