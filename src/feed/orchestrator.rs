use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::buffer::PrefetchBuffer;
use super::debounce::Debounce;
use super::preferences::{PreferenceModel, Signal};
use super::recommend::{cached_candidates, fetch_fresh, merge_ranked};
use super::recycler::{EntryId, ViewportSnapshot, ViewportWindow, VisibleEntry};
use crate::config::Config;
use crate::content::{ContentProvider, Item};
use crate::storage::{Database, HistoryEntry, InteractionRecord};

/// Distinct topics needed before recommendations are attempted.
pub const MIN_TOPICS_FOR_RECOMMENDATIONS: usize = 3;

/// Topics logged when a personalized load starts.
const TOP_TOPICS_LOGGED: usize = 5;

// ============================================================================
// Types
// ============================================================================

/// Runtime knobs, usually derived from [`Config::feed_settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    pub buffer_size: usize,
    pub max_visible: usize,
    pub recycle_buffer_count: usize,
    pub scroll_debounce: Duration,
    pub pacing: Duration,
    pub for_you_fetch_count: usize,
    pub for_you_initial_batch: usize,
    pub for_you_more_batch: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Config::default().feed_settings()
    }
}

/// Which stream the viewer is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Unfiltered random items.
    Discover,
    /// Items ranked against the preference model.
    ForYou,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Mode::Discover => "discover",
            Mode::ForYou => "for-you",
        })
    }
}

/// What the renderer should draw for an entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Tile {
    Article(Item),
    /// Stand-in for an item that could not be loaded.
    Error { message: String },
    /// Too few topics learned to personalize yet.
    Onboarding { topics_known: usize },
    /// Personalization found nothing; offers a retry.
    NoRecommendations,
    /// Trailing "load more" affordance. `retry` after a failed attempt.
    LoadMore { retry: bool },
}

impl Tile {
    pub fn item(&self) -> Option<&Item> {
        match self {
            Tile::Article(item) => Some(item),
            _ => None,
        }
    }
}

/// Instruction for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderInstruction {
    Materialize { mode: Mode, entry: EntryId, tile: Tile },
    Evict { mode: Mode, entry: EntryId },
}

/// Result of the last personalized load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForYouOutcome {
    Onboarding,
    NoRecommendations,
    Recommendations(usize),
}

/// The item currently being timed for dwell.
#[derive(Debug, Clone)]
struct ActiveView {
    entry: EntryId,
    item: Item,
    started: Instant,
}

// ============================================================================
// Feed
// ============================================================================

/// Drives both streams: consumes the prefetch buffer, records signals into
/// the preference model and store, and tells the renderer what to
/// materialize or evict.
///
/// Every entry point is infallible from the caller's side. Fetch failures
/// become placeholder tiles; storage failures are logged.
pub struct Feed {
    provider: Arc<dyn ContentProvider>,
    db: Database,
    settings: FeedSettings,
    buffer: PrefetchBuffer,
    model: PreferenceModel,
    discover: ViewportWindow<Tile>,
    for_you: ViewportWindow<Tile>,
    mode: Mode,
    next_entry: EntryId,
    active: Option<ActiveView>,
    /// View suspended by backgrounding or a mode switch.
    paused: Option<(EntryId, Item)>,
    load_more: Option<EntryId>,
    for_you_outcome: Option<ForYouOutcome>,
    scroll: Debounce,
    scroll_mode: Mode,
    tx: mpsc::UnboundedSender<RenderInstruction>,
}

impl Feed {
    /// Build a feed and the channel its render instructions arrive on.
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        db: Database,
        settings: FeedSettings,
    ) -> (Self, mpsc::UnboundedReceiver<RenderInstruction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = Self {
            buffer: PrefetchBuffer::new(provider.clone(), settings.buffer_size),
            provider,
            db,
            discover: ViewportWindow::new(settings.max_visible, settings.recycle_buffer_count),
            for_you: ViewportWindow::new(settings.max_visible, settings.recycle_buffer_count),
            scroll: Debounce::new(settings.scroll_debounce),
            settings,
            model: PreferenceModel::new(),
            mode: Mode::Discover,
            next_entry: 0,
            active: None,
            paused: None,
            load_more: None,
            for_you_outcome: None,
            scroll_mode: Mode::Discover,
            tx,
        };
        (feed, rx)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn model(&self) -> &PreferenceModel {
        &self.model
    }

    pub fn buffer(&self) -> &PrefetchBuffer {
        &self.buffer
    }

    pub fn window(&self, mode: Mode) -> &ViewportWindow<Tile> {
        match mode {
            Mode::Discover => &self.discover,
            Mode::ForYou => &self.for_you,
        }
    }

    /// The item whose dwell is being timed, if any.
    pub fn active_item(&self) -> Option<&Item> {
        self.active.as_ref().map(|v| &v.item)
    }

    pub fn for_you_outcome(&self) -> Option<ForYouOutcome> {
        self.for_you_outcome
    }

    /// Highest-weighted topics, ties broken by name.
    pub fn top_topics(&self, n: usize) -> Vec<(String, f64)> {
        self.model.top_topics(n)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Load preferences, run the daily decay, and show the first content
    /// of `mode`.
    pub async fn start(&mut self, mode: Mode) {
        match PreferenceModel::load(&self.db).await {
            Ok(model) => self.model = model,
            Err(e) => tracing::warn!(error = %e, "Failed to load preferences, starting fresh"),
        }
        if self.model.apply_decay(Utc::now()) {
            self.persist_model().await;
        }

        self.mode = mode;
        tracing::info!(mode = %mode, topics = self.model.topic_count(), "Feed started");
        match mode {
            Mode::Discover => {
                self.deliver_discover().await;
            }
            Mode::ForYou => {
                self.load_for_you().await;
            }
        }
    }

    /// Tear down a mode's window and load it again.
    pub async fn reset(&mut self, mode: Mode) {
        match mode {
            Mode::Discover => {
                self.finish_view(None).await;
                self.paused = None;
            }
            Mode::ForYou => {
                self.load_more = None;
                self.for_you_outcome = None;
            }
        }

        let evicted = self.window_mut(mode).clear();
        tracing::info!(mode = %mode, evicted = evicted.len(), "Reset window");
        self.emit_evictions(mode, evicted);

        match mode {
            Mode::Discover => {
                self.deliver_discover().await;
            }
            Mode::ForYou => {
                self.load_for_you().await;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Show the next item: initial load, scroll to bottom, or swipe.
    ///
    /// In the personalized stream this loads more recommendations instead.
    /// Returns the delivered item, or `None` when a placeholder was shown.
    pub async fn on_need_next(&mut self) -> Option<Item> {
        match self.mode {
            Mode::Discover => {
                self.finish_view(None).await;
                self.deliver_discover().await
            }
            Mode::ForYou => {
                self.on_load_more().await;
                None
            }
        }
    }

    /// Switch streams. The window being left keeps its entries; an empty
    /// window being entered is loaded.
    pub async fn on_mode_switch(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        tracing::info!(from = %self.mode, to = %mode, "Switching mode");

        if self.mode == Mode::Discover {
            if let Some(view) = self.finish_view(None).await {
                self.paused = Some(view);
            }
        }
        self.mode = mode;

        match mode {
            Mode::Discover if self.discover.is_empty() => {
                self.paused = None;
                self.deliver_discover().await;
            }
            Mode::Discover => self.resume_view(),
            Mode::ForYou if self.for_you.is_empty() => {
                self.load_for_you().await;
            }
            Mode::ForYou => {}
        }
    }

    /// App backgrounded (`hidden`) or foregrounded.
    pub async fn on_visibility_changed(&mut self, hidden: bool) {
        if hidden {
            if let Some(view) = self.finish_view(None).await {
                self.paused = Some(view);
            }
        } else if self.mode == Mode::Discover {
            self.resume_view();
        }
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    /// The renderer measured `seconds` of dwell on `item_id`.
    ///
    /// For the item being timed in Discover, more than 30 seconds counts
    /// as a departure and advances the feed; shorter reports are ignored
    /// while timing continues. For any other item the report is recorded
    /// as a completed view.
    pub async fn on_dwell_elapsed(&mut self, item_id: &str, seconds: f64) {
        let is_active = self.active.as_ref().is_some_and(|v| v.item.id == item_id);
        if is_active {
            if seconds > Signal::HIGH_DWELL_SECS && self.mode == Mode::Discover {
                self.finish_view(Some(seconds)).await;
                self.deliver_discover().await;
            }
            return;
        }

        match self.lookup_item(item_id).await {
            Some(item) => self.record_dwell(&item, seconds).await,
            None => tracing::debug!(item_id = %item_id, "Dwell reported for unknown item, ignoring"),
        }
    }

    /// Explicit like. Unknown ids are logged but not learned from.
    pub async fn on_like(&mut self, item_id: &str) {
        let item = self.lookup_item(item_id).await;
        let now = Utc::now();

        match &item {
            Some(item) => {
                tracing::info!(title = %item.title, "Liked item");
                if self.model.record(item, Signal::Like, now) {
                    self.persist_model().await;
                }
            }
            None => tracing::debug!(item_id = %item_id, "Like for unknown item, no preference update"),
        }

        let record = InteractionRecord {
            id: item_id.to_string(),
            item,
            timestamp: now,
        };
        if let Err(e) = self.db.append_liked(record).await {
            tracing::warn!(item_id = %item_id, error = %e, "Failed to record like");
        }
    }

    /// Explicit skip (swipe away). Learns a zero signal, then advances
    /// the Discover feed.
    pub async fn on_skip(&mut self, item_id: &str) {
        let item = self.lookup_item(item_id).await;
        let now = Utc::now();

        match &item {
            Some(item) => {
                tracing::info!(title = %item.title, "Skipped item");
                if self.model.record(item, Signal::Skip, now) {
                    self.persist_model().await;
                }
            }
            None => tracing::debug!(item_id = %item_id, "Skip for unknown item, no preference update"),
        }

        let record = InteractionRecord {
            id: item_id.to_string(),
            item,
            timestamp: now,
        };
        if let Err(e) = self.db.append_skipped(record).await {
            tracing::warn!(item_id = %item_id, error = %e, "Failed to record skip");
        }

        // The skip stands in for the dwell signal of the skipped item.
        if self.active.as_ref().is_some_and(|v| v.item.id == item_id) {
            if let Some(view) = self.active.take() {
                let dwell = view.started.elapsed().as_secs_f64();
                if let Err(e) = self.db.record_dwell(&view.item.id, dwell).await {
                    tracing::warn!(title = %view.item.title, error = %e, "Failed to record dwell");
                }
            }
        }

        if self.mode == Mode::Discover {
            self.on_need_next().await;
        }
    }

    /// Swipe up to the next item. In Discover the item being left earns a
    /// basic-interest signal before its dwell is recorded.
    pub async fn on_advance(&mut self) -> Option<Item> {
        if self.mode == Mode::Discover {
            if let Some(item) = self.active.as_ref().map(|v| v.item.clone()) {
                tracing::debug!(title = %item.title, "Advanced past item");
                if self.model.record(&item, Signal::Advance, Utc::now()) {
                    self.persist_model().await;
                }
            }
        }
        self.on_need_next().await
    }

    // ------------------------------------------------------------------------
    // Personalized stream
    // ------------------------------------------------------------------------

    /// Append another batch of fresh recommendations after the existing ones.
    ///
    /// Returns how many were added. Does nothing unless recommendations are
    /// currently shown.
    pub async fn on_load_more(&mut self) -> usize {
        if !matches!(self.for_you_outcome, Some(ForYouOutcome::Recommendations(_))) {
            tracing::debug!("No recommendations shown, ignoring load more");
            return 0;
        }

        if let Some(entry) = self.load_more.take() {
            if self.for_you.remove(entry).is_some() {
                self.emit(RenderInstruction::Evict {
                    mode: Mode::ForYou,
                    entry,
                });
            }
        }

        let fresh = fetch_fresh(
            self.provider.as_ref(),
            &self.db,
            &self.model,
            self.settings.for_you_fetch_count,
            self.settings.pacing,
        )
        .await;
        let failed = fresh.error.is_some();
        let picks = merge_ranked(fresh.items, Vec::new(), self.settings.for_you_more_batch);

        if picks.is_empty() {
            tracing::warn!(failed = failed, recorded = fresh.recorded, "Load more found nothing");
            self.place_load_more(true);
            return 0;
        }

        let added = picks.len();
        self.materialize_batch(Mode::ForYou, picks.into_iter().map(Tile::Article));
        self.place_load_more(false);
        tracing::info!(added = added, "Loaded more recommendations");
        added
    }

    async fn load_for_you(&mut self) -> ForYouOutcome {
        let outcome = self.gather_for_you().await;
        self.for_you_outcome = Some(outcome);
        outcome
    }

    async fn gather_for_you(&mut self) -> ForYouOutcome {
        let topics_known = self.model.topic_count();
        if topics_known < MIN_TOPICS_FOR_RECOMMENDATIONS {
            tracing::info!(topics = topics_known, "Too few topics, showing onboarding");
            self.materialize(Mode::ForYou, Tile::Onboarding { topics_known });
            return ForYouOutcome::Onboarding;
        }

        let top: Vec<String> = self
            .model
            .top_topics(TOP_TOPICS_LOGGED)
            .into_iter()
            .map(|(topic, _)| topic)
            .collect();
        tracing::info!(topics = ?top, "Loading recommendations");

        let history = match self.db.load_history().await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load history, skipping cached candidates");
                Vec::new()
            }
        };
        let cached = cached_candidates(&history, &self.model, Utc::now());

        let fresh = fetch_fresh(
            self.provider.as_ref(),
            &self.db,
            &self.model,
            self.settings.for_you_fetch_count,
            self.settings.pacing,
        )
        .await;
        if let Some(e) = &fresh.error {
            tracing::warn!(
                error = %e,
                discarded = fresh.recorded,
                cached = cached.len(),
                "Recommendation batch failed, showing cached candidates only"
            );
        }

        let picks = merge_ranked(fresh.items, cached, self.settings.for_you_initial_batch);
        if picks.is_empty() {
            self.materialize(Mode::ForYou, Tile::NoRecommendations);
            return ForYouOutcome::NoRecommendations;
        }

        let shown = picks.len();
        self.materialize_batch(Mode::ForYou, picks.into_iter().map(Tile::Article));
        self.place_load_more(false);
        ForYouOutcome::Recommendations(shown)
    }

    fn place_load_more(&mut self, retry: bool) {
        let entries = self.materialize_batch(Mode::ForYou, [Tile::LoadMore { retry }]);
        self.load_more = entries.first().copied();
    }

    // ------------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------------

    /// New layout for a window; evicts right away.
    pub fn on_layout(&mut self, mode: Mode, snapshot: &ViewportSnapshot) -> usize {
        self.window_mut(mode).apply_snapshot(snapshot);
        self.evict_window(mode)
    }

    /// Scroll movement; eviction waits for the debounce to elapse.
    pub fn on_scroll(&mut self, mode: Mode, snapshot: &ViewportSnapshot) {
        self.window_mut(mode).apply_snapshot(snapshot);
        self.scroll_mode = mode;
        self.scroll.restart();
    }

    /// Periodic tick. Runs the debounced eviction once scrolling has been
    /// quiet long enough; returns how many entries were evicted.
    pub fn tick(&mut self) -> usize {
        if self.scroll.fire() {
            self.evict_window(self.scroll_mode)
        } else {
            0
        }
    }

    /// Scrolling stopped; evict the active window immediately.
    pub fn on_scroll_settled(&mut self) -> usize {
        self.scroll.cancel();
        self.evict_window(self.mode)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn window_mut(&mut self, mode: Mode) -> &mut ViewportWindow<Tile> {
        match mode {
            Mode::Discover => &mut self.discover,
            Mode::ForYou => &mut self.for_you,
        }
    }

    /// Take the next buffered item, or fetch one directly when the buffer
    /// is dry, and show it in the Discover window.
    async fn deliver_discover(&mut self) -> Option<Item> {
        let fetched = match self.buffer.take_next().await {
            Some(entry) => {
                tracing::debug!(title = %entry.item.title, "Serving buffered item");
                Ok(entry.item)
            }
            None => {
                let result = self.provider.fetch_random_item().await;
                self.buffer.spawn_refill();
                result
            }
        };

        match fetched {
            Ok(item) => {
                let entry = HistoryEntry::new(item.clone(), Utc::now());
                if let Err(e) = self.db.append_history(entry).await {
                    tracing::warn!(title = %item.title, error = %e, "Failed to record history");
                }
                let entry = self.materialize(Mode::Discover, Tile::Article(item.clone()));
                if self.mode == Mode::Discover {
                    self.begin_view(entry, item.clone());
                }
                Some(item)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load item, showing placeholder");
                self.materialize(
                    Mode::Discover,
                    Tile::Error {
                        message: e.to_string(),
                    },
                );
                None
            }
        }
    }

    fn begin_view(&mut self, entry: EntryId, item: Item) {
        self.paused = None;
        self.active = Some(ActiveView {
            entry,
            item,
            started: Instant::now(),
        });
    }

    fn resume_view(&mut self) {
        if let Some((entry, item)) = self.paused.take() {
            if self.discover.get(entry).is_some() {
                tracing::debug!(title = %item.title, "Resuming dwell tracking");
                self.begin_view(entry, item);
            }
        }
    }

    /// Stop timing the active item and record its dwell. `reported`
    /// overrides the measured time.
    async fn finish_view(&mut self, reported: Option<f64>) -> Option<(EntryId, Item)> {
        let view = self.active.take()?;
        let dwell = reported.unwrap_or_else(|| view.started.elapsed().as_secs_f64());
        tracing::debug!(title = %view.item.title, dwell_seconds = dwell, "Item departed");
        self.record_dwell(&view.item, dwell).await;
        Some((view.entry, view.item))
    }

    async fn record_dwell(&mut self, item: &Item, dwell: f64) {
        if let Err(e) = self.db.record_dwell(&item.id, dwell).await {
            tracing::warn!(title = %item.title, error = %e, "Failed to record dwell");
        }
        if self.model.record(item, Signal::Dwell(dwell), Utc::now()) {
            self.persist_model().await;
        }
    }

    /// Resolve an id: the active item, then both windows, then history.
    async fn lookup_item(&self, item_id: &str) -> Option<Item> {
        if let Some(view) = self.active.as_ref().filter(|v| v.item.id == item_id) {
            return Some(view.item.clone());
        }

        let in_window = self
            .discover
            .entries()
            .iter()
            .chain(self.for_you.entries())
            .filter_map(|e| e.payload.item())
            .find(|item| item.id == item_id);
        if let Some(item) = in_window {
            let mut item = item.clone();
            item.relevance_score = None;
            return Some(item);
        }

        match self.db.find_in_history(item_id).await {
            Ok(entry) => entry.map(|e| e.item),
            Err(e) => {
                tracing::warn!(item_id = %item_id, error = %e, "History lookup failed");
                None
            }
        }
    }

    async fn persist_model(&self) {
        if let Err(e) = self.model.save(&self.db).await {
            tracing::warn!(error = %e, "Failed to save preferences");
        }
    }

    fn allocate_entry(&mut self) -> EntryId {
        let id = self.next_entry;
        self.next_entry += 1;
        id
    }

    /// Show one tile and run an eviction pass on its window.
    fn materialize(&mut self, mode: Mode, tile: Tile) -> EntryId {
        let entry = self.allocate_entry();
        self.emit(RenderInstruction::Materialize {
            mode,
            entry,
            tile: tile.clone(),
        });
        let evicted = self.window_mut(mode).add(VisibleEntry::new(entry, tile));
        self.emit_evictions(mode, evicted);
        entry
    }

    /// Show several tiles at once. Eviction waits for the next layout,
    /// since none of them has geometry yet.
    fn materialize_batch(
        &mut self,
        mode: Mode,
        tiles: impl IntoIterator<Item = Tile>,
    ) -> Vec<EntryId> {
        let mut added = Vec::new();
        for tile in tiles {
            let entry = self.allocate_entry();
            self.emit(RenderInstruction::Materialize {
                mode,
                entry,
                tile: tile.clone(),
            });
            added.push(VisibleEntry::new(entry, tile));
        }
        let ids = added.iter().map(|e| e.id).collect();
        self.window_mut(mode).extend(added);
        ids
    }

    fn evict_window(&mut self, mode: Mode) -> usize {
        let evicted = self.window_mut(mode).evict();
        let count = evicted.len();
        self.emit_evictions(mode, evicted);
        count
    }

    fn emit_evictions(&mut self, mode: Mode, evicted: Vec<VisibleEntry<Tile>>) {
        for entry in evicted {
            if self.load_more == Some(entry.id) {
                self.load_more = None;
            }
            self.emit(RenderInstruction::Evict {
                mode,
                entry: entry.id,
            });
        }
    }

    fn emit(&self, instruction: RenderInstruction) {
        if self.tx.send(instruction).is_err() {
            tracing::trace!("Renderer gone, dropping instruction");
        }
    }
}
