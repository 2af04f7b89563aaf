//! Candidate gathering for the personalized stream.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use super::preferences::PreferenceModel;
use crate::content::{ContentProvider, FetchError, Item};
use crate::storage::{Database, HistoryEntry};

/// History items must score strictly above this to be re-surfaced.
pub const CACHED_SCORE_THRESHOLD: f64 = 0.4;

/// History items offered per personalized load.
pub const MAX_CACHED: usize = 5;

/// Items seen this recently are not re-surfaced.
const RECENTLY_SEEN_HOURS: i64 = 24;

/// Previously seen items worth showing again, best first.
///
/// Anything whose id was seen within the last 24 hours is skipped, as are
/// items scoring 0.4 or less. At most [`MAX_CACHED`] are returned, each
/// carrying its score.
pub fn cached_candidates(
    history: &[HistoryEntry],
    model: &PreferenceModel,
    now: DateTime<Utc>,
) -> Vec<Item> {
    let cutoff = now - Duration::hours(RECENTLY_SEEN_HOURS);
    let recent: HashSet<&str> = history
        .iter()
        .filter(|e| e.timestamp > cutoff)
        .map(|e| e.item.id.as_str())
        .collect();

    let mut seen = HashSet::new();
    let mut scored: Vec<Item> = history
        .iter()
        .filter(|e| !recent.contains(e.item.id.as_str()))
        .filter(|e| seen.insert(e.item.id.as_str()))
        .filter_map(|e| {
            let score = model.score(&e.item);
            (score > CACHED_SCORE_THRESHOLD).then(|| e.item.clone().with_relevance(score))
        })
        .collect();

    sort_by_relevance(&mut scored);
    scored.truncate(MAX_CACHED);
    scored
}

/// Outcome of a sequential fetch-and-score pass.
#[derive(Debug, Default)]
pub struct FreshBatch {
    /// Scored items, best first. Empty when the pass failed.
    pub items: Vec<Item>,
    /// Items appended to history, including those of a failed pass.
    pub recorded: usize,
    /// The failure that aborted the pass, if any.
    pub error: Option<FetchError>,
}

/// Fetch up to `count` random items one at a time, `pacing` apart.
///
/// Each item is scored and appended to history before the next request.
/// The first failure aborts the whole batch: nothing is offered, though
/// the items already fetched stay in history.
pub async fn fetch_fresh(
    provider: &dyn ContentProvider,
    db: &Database,
    model: &PreferenceModel,
    count: usize,
    pacing: std::time::Duration,
) -> FreshBatch {
    let mut batch = FreshBatch::default();

    for i in 0..count {
        let item = match provider.fetch_random_item().await {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    discarded = batch.items.len(),
                    "Personalized fetch failed, abandoning batch"
                );
                batch.items.clear();
                batch.error = Some(e);
                return batch;
            }
        };

        let score = model.score(&item);
        if let Err(e) = db.append_history(HistoryEntry::new(item.clone(), Utc::now())).await {
            tracing::warn!(title = %item.title, error = %e, "Failed to record history");
        }
        tracing::debug!(title = %item.title, score = score, "Scored candidate");
        batch.recorded += 1;
        batch.items.push(item.with_relevance(score));

        if i + 1 < count && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
    }

    sort_by_relevance(&mut batch.items);
    batch
}

/// Combine fresh and cached candidates, best first, one per id, at most `cap`.
pub fn merge_ranked(fresh: Vec<Item>, cached: Vec<Item>, cap: usize) -> Vec<Item> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Item> = fresh
        .into_iter()
        .chain(cached)
        .filter(|item| seen.insert(item.id.clone()))
        .collect();
    sort_by_relevance(&mut merged);
    merged.truncate(cap);
    merged
}

/// Stable: equal scores keep their current order.
fn sort_by_relevance(items: &mut [Item]) {
    items.sort_by(|a, b| {
        let sa = a.relevance_score.unwrap_or(0.0);
        let sb = b.relevance_score.unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::test_support::ScriptedProvider;
    use pretty_assertions::assert_eq;

    fn article(title: &str) -> Item {
        Item::new(title, title)
    }

    /// Model where "quantum" is strong and "cooking" is weak.
    fn trained_model() -> PreferenceModel {
        let mut model = PreferenceModel::new();
        let now = Utc::now();
        for _ in 0..4 {
            model.update(&article("Quantum"), 1.0, 0.0, now);
        }
        model.update(&article("Cooking"), 0.25, 0.0, now);
        model
    }

    fn seen(title: &str, hours_ago: i64) -> HistoryEntry {
        HistoryEntry::new(article(title), Utc::now() - Duration::hours(hours_ago))
    }

    #[test]
    fn test_cached_skips_recent_and_low_scores() {
        let model = trained_model();
        let history = vec![
            seen("Quantum", 48),
            seen("Cooking", 48),
            seen("Quantum Again", 2),
            seen("Unrelated Topic", 48),
        ];

        let cached = cached_candidates(&history, &model, Utc::now());
        let ids: Vec<&str> = cached.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["Quantum"]);
        assert!(cached[0].relevance_score.unwrap() > CACHED_SCORE_THRESHOLD);
    }

    #[test]
    fn test_cached_excludes_titles_seen_recently_even_if_old_copy_exists() {
        let model = trained_model();
        let history = vec![seen("Quantum", 72), seen("Quantum", 1)];
        assert!(cached_candidates(&history, &model, Utc::now()).is_empty());
    }

    #[test]
    fn test_cached_capped_and_deduplicated() {
        let model = trained_model();
        let mut history: Vec<HistoryEntry> = (0..8)
            .map(|i| seen(&format!("Quantum {}", i), 30))
            .collect();
        history.push(seen("Quantum 0", 40));

        let cached = cached_candidates(&history, &model, Utc::now());
        assert_eq!(cached.len(), MAX_CACHED);
        let ids: HashSet<&str> = cached.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids.len(), MAX_CACHED);
    }

    #[test]
    fn test_merge_sorts_dedups_and_caps() {
        let fresh = vec![
            article("A").with_relevance(0.2),
            article("B").with_relevance(0.9),
        ];
        let cached = vec![
            article("C").with_relevance(0.5),
            article("B").with_relevance(0.45),
        ];

        let merged = merge_ranked(fresh, cached, 2);
        let ids: Vec<&str> = merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert_eq!(merged[0].relevance_score, Some(0.9));
    }

    #[tokio::test]
    async fn test_fresh_batch_paced_and_recorded() {
        let db = Database::open(":memory:").await.unwrap();
        let provider = ScriptedProvider::endless();
        let model = trained_model();

        let started = tokio::time::Instant::now();
        let batch = fetch_fresh(&provider, &db, &model, 4, std::time::Duration::from_millis(20)).await;

        assert_eq!(batch.items.len(), 4);
        assert!(batch.error.is_none());
        assert!(batch.items.iter().all(|i| i.relevance_score.is_some()));
        // Three gaps between four requests.
        assert!(started.elapsed() >= std::time::Duration::from_millis(60));

        let history = db.load_history().await.unwrap();
        assert_eq!(history.len(), 4);
        // History keeps the unscored snapshot.
        assert!(history.iter().all(|e| e.item.relevance_score.is_none()));
    }

    #[tokio::test]
    async fn test_failed_batch_offers_nothing_but_keeps_history() {
        let db = Database::open(":memory:").await.unwrap();
        let provider = ScriptedProvider::with_items(vec![article("Quantum"), article("Other")]);
        let model = trained_model();

        let batch = fetch_fresh(&provider, &db, &model, 10, std::time::Duration::ZERO).await;

        assert_eq!(provider.calls(), 3);
        assert!(matches!(batch.error, Some(FetchError::HttpStatus(503))));
        assert!(batch.items.is_empty());
        assert_eq!(batch.recorded, 2);

        let history = db.load_history().await.unwrap();
        let ids: Vec<&str> = history.iter().map(|e| e.item.id.as_str()).collect();
        assert_eq!(ids, vec!["Quantum", "Other"]);
    }
}
