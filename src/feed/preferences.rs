//! Topic preference model.
//!
//! Topics are keywords pulled from an item's title and summary. Each
//! interaction nudges the weight of the item's topics toward the signal's
//! value with an exponential moving average; weights decay while idle.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::content::Item;
use crate::storage::{Database, TopicWeight};

/// EMA learning rate.
pub const LEARNING_RATE: f64 = 0.3;

/// Fraction of weight lost per idle day.
pub const DECAY_RATE: f64 = 0.05;

/// Topics extracted per item.
pub const MAX_TOPICS: usize = 5;

const STOP_WORDS: [&str; 10] = [
    "this", "that", "with", "from", "about", "what", "when", "where", "which", "how",
];

// Tokens must be strictly longer than these (in bytes; tokens are ASCII).
const MIN_TITLE_TOKEN_LEN: usize = 3;
const MIN_BODY_TOKEN_LEN: usize = 4;

const SECONDS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// Signals
// ============================================================================

/// An interaction the viewer had with an item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Like,
    Skip,
    /// Swiped past toward the next item without liking or skipping.
    Advance,
    /// Seconds the item stayed on screen.
    Dwell(f64),
}

impl Signal {
    pub const LIKE_WEIGHT: f64 = 1.0;
    pub const HIGH_DWELL_WEIGHT: f64 = 0.75;
    pub const MODERATE_DWELL_WEIGHT: f64 = 0.25;
    pub const BASIC_INTEREST_WEIGHT: f64 = 0.25;
    pub const SKIP_WEIGHT: f64 = 0.0;

    /// Dwell above this many seconds signals strong interest.
    pub const HIGH_DWELL_SECS: f64 = 30.0;
    /// Dwell at or below this many seconds carries no signal.
    pub const MODERATE_DWELL_SECS: f64 = 5.0;

    /// Target value for the EMA, or `None` when the interaction says nothing.
    pub fn weight(self) -> Option<f64> {
        match self {
            Signal::Like => Some(Self::LIKE_WEIGHT),
            Signal::Skip => Some(Self::SKIP_WEIGHT),
            Signal::Advance => Some(Self::BASIC_INTEREST_WEIGHT),
            Signal::Dwell(secs) if secs > Self::HIGH_DWELL_SECS => Some(Self::HIGH_DWELL_WEIGHT),
            Signal::Dwell(secs) if secs > Self::MODERATE_DWELL_SECS => {
                Some(Self::MODERATE_DWELL_WEIGHT)
            }
            Signal::Dwell(_) => None,
        }
    }

    fn dwell_seconds(self) -> f64 {
        match self {
            Signal::Dwell(secs) => secs.max(0.0),
            Signal::Like | Signal::Skip | Signal::Advance => 0.0,
        }
    }
}

// ============================================================================
// Topic Extraction
// ============================================================================

/// The item's most frequent keywords, most frequent first.
///
/// Title and summary are lower-cased and split on anything that is not an
/// ASCII letter, digit or underscore, so accented letters act as
/// separators. Title tokens longer than 3 chars and summary tokens longer
/// than 4 count, minus stop words. Ties keep the
/// order of first appearance.
pub fn extract_topics(item: &Item) -> Vec<String> {
    if item.title.trim().is_empty() {
        return Vec::new();
    }

    let title = item.title.to_lowercase();
    let body = item.summary_text.to_lowercase();
    let tokens = tokenize(&title, MIN_TITLE_TOKEN_LEN).chain(tokenize(&body, MIN_BODY_TOKEN_LEN));

    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        match index.get(token) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(token, counts.len());
                counts.push((token, 1));
            }
        }
    }

    // Stable sort keeps first-appearance order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(MAX_TOPICS)
        .map(|(token, _)| token.to_string())
        .collect()
}

fn tokenize(text: &str, min_len: usize) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(move |t| t.len() > min_len && !STOP_WORDS.contains(t))
}

// ============================================================================
// Preference Model
// ============================================================================

/// Learned topic weights plus the time decay last ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceModel {
    topics: HashMap<String, TopicWeight>,
    last_decay: Option<DateTime<Utc>>,
}

impl PreferenceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load weights and the decay timestamp. Missing or corrupt → empty.
    pub async fn load(db: &Database) -> Result<Self> {
        Ok(Self {
            topics: db.load_topic_weights().await?,
            last_decay: db.load_last_decay().await?,
        })
    }

    /// Write the whole model back.
    pub async fn save(&self, db: &Database) -> Result<()> {
        db.save_topic_weights(&self.topics).await?;
        if let Some(at) = self.last_decay {
            db.save_last_decay(at).await?;
        }
        Ok(())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn topic(&self, token: &str) -> Option<&TopicWeight> {
        self.topics.get(token)
    }

    /// Current weight of `token`, 0 when never observed.
    pub fn weight_of(&self, token: &str) -> f64 {
        self.topics.get(token).map_or(0.0, |t| t.weight)
    }

    pub fn last_decay(&self) -> Option<DateTime<Utc>> {
        self.last_decay
    }

    /// Move each of the item's topics toward `signal_weight`.
    ///
    /// Unseen topics start at weight 0. Each distinct topic is updated once.
    /// Returns the topics touched.
    pub fn update(
        &mut self,
        item: &Item,
        signal_weight: f64,
        dwell_seconds: f64,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let signal_weight = signal_weight.clamp(0.0, 1.0);
        let topics = extract_topics(item);
        for token in &topics {
            let entry = self
                .topics
                .entry(token.clone())
                .or_insert_with(|| TopicWeight::new(now));
            entry.weight = entry.weight * (1.0 - LEARNING_RATE) + signal_weight * LEARNING_RATE;
            entry.observation_count += 1;
            entry.total_dwell_seconds += dwell_seconds.max(0.0);
            entry.last_updated = now;
        }

        tracing::debug!(
            title = %item.title,
            signal = signal_weight,
            topics = ?topics,
            "Updated topic preferences"
        );
        topics
    }

    /// Apply an interaction. Returns `false` when it carries no signal.
    pub fn record(&mut self, item: &Item, signal: Signal, now: DateTime<Utc>) -> bool {
        match signal.weight() {
            Some(weight) => {
                self.update(item, weight, signal.dwell_seconds(), now);
                true
            }
            None => false,
        }
    }

    /// Decay topics idle for more than a day by `(1 - DECAY_RATE)^days`.
    ///
    /// Runs at most once per 24 hours; returns whether it ran.
    pub fn apply_decay(&mut self, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_decay {
            if now - last <= Duration::hours(24) {
                tracing::trace!(last_decay = %last, "Decay already applied within the last day");
                return false;
            }
        }

        let mut decayed = 0;
        for topic in self.topics.values_mut() {
            let idle_days = (now - topic.last_updated).num_milliseconds() as f64
                / 1000.0
                / SECONDS_PER_DAY;
            if idle_days > 1.0 {
                topic.weight *= (1.0 - DECAY_RATE).powf(idle_days);
                topic.last_updated = now;
                decayed += 1;
            }
        }
        self.last_decay = Some(now);

        tracing::info!(decayed = decayed, topics = self.topics.len(), "Applied topic decay");
        true
    }

    /// Mean weight of the item's topics that the model knows; 0 if none.
    pub fn score(&self, item: &Item) -> f64 {
        let weights: Vec<f64> = extract_topics(item)
            .iter()
            .filter_map(|token| self.topics.get(token).map(|t| t.weight))
            .collect();
        if weights.is_empty() {
            return 0.0;
        }
        weights.iter().sum::<f64>() / weights.len() as f64
    }

    /// Highest-weighted topics, ties broken by name.
    pub fn top_topics(&self, n: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .topics
            .iter()
            .map(|(token, t)| (token.clone(), t.weight))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(n);
        ranked
    }
}
