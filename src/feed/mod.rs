//! Feed engine: everything between the content provider and the renderer.
//!
//! - [`buffer`] keeps a FIFO of pre-fetched items so the next swipe is instant
//! - [`recycler`] bounds how many entries each viewport window keeps alive
//! - [`preferences`] learns topic weights from likes, skips and dwell time
//! - [`recommend`] gathers and ranks candidates for the personalized stream
//! - [`orchestrator`] wires them together behind [`Feed`]
//!
//! # Example
//!
//! ```ignore
//! let (mut feed, mut rx) = Feed::new(provider, db, config.feed_settings());
//! feed.start(Mode::Discover).await;
//! while let Some(instruction) = rx.recv().await {
//!     renderer.apply(instruction);
//! }
//! ```

mod buffer;
mod debounce;
mod orchestrator;
mod preferences;
mod recommend;
mod recycler;

#[cfg(test)]
mod test_support;

pub use buffer::{BufferedEntry, PrefetchBuffer};
pub use debounce::Debounce;
pub use orchestrator::{
    Feed, FeedSettings, ForYouOutcome, Mode, RenderInstruction, Tile,
    MIN_TOPICS_FOR_RECOMMENDATIONS,
};
pub use preferences::{
    extract_topics, PreferenceModel, Signal, DECAY_RATE, LEARNING_RATE, MAX_TOPICS,
};
pub use recommend::{
    cached_candidates, fetch_fresh, merge_ranked, FreshBatch, CACHED_SCORE_THRESHOLD, MAX_CACHED,
};
pub use recycler::{Bounds, EntryId, ViewportSnapshot, ViewportWindow, VisibleEntry};
