//! End-to-end feed sessions: the orchestrator driving a real store and
//! either the HTTP client against a mock server or a scripted provider.
//!
//! Each test creates its own in-memory SQLite database for isolation.

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wikiscroll::content::{ContentProvider, FetchError, Item, WikipediaClient};
use wikiscroll::feed::{
    FeedSettings, Feed, ForYouOutcome, Mode, PreferenceModel, RenderInstruction, Signal, Tile,
};
use wikiscroll::storage::Database;

/// Hands out a fixed list of titles, then fails.
struct ListProvider {
    titles: Mutex<VecDeque<String>>,
}

impl ListProvider {
    fn new(titles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            titles: Mutex::new(titles.iter().map(|t| t.to_string()).collect()),
        })
    }
}

#[async_trait]
impl ContentProvider for ListProvider {
    async fn fetch_random_item(&self) -> Result<Item, FetchError> {
        match self.titles.lock().await.pop_front() {
            Some(title) => Ok(Item::new(title.clone(), title)),
            None => Err(FetchError::HttpStatus(503)),
        }
    }

    async fn fetch_by_query(&self, _query: &str) -> Result<Vec<String>, FetchError> {
        Ok(Vec::new())
    }
}

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn settings() -> FeedSettings {
    FeedSettings {
        pacing: Duration::ZERO,
        ..FeedSettings::default()
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<RenderInstruction>) -> Vec<Tile> {
    let mut tiles = Vec::new();
    while let Ok(instruction) = rx.try_recv() {
        if let RenderInstruction::Materialize { tile, .. } = instruction {
            tiles.push(tile);
        }
    }
    tiles
}

async fn summary_server(status: u16, body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rest_v1/page/random/summary"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn client_for(server: &MockServer) -> Arc<WikipediaClient> {
    Arc::new(WikipediaClient::new(&server.uri(), Duration::from_secs(5)).unwrap())
}

// ============================================================================
// Over HTTP
// ============================================================================

#[tokio::test]
async fn test_discover_over_http_learns_from_like() {
    let server = summary_server(
        200,
        serde_json::json!({
            "title": "Quantum Mechanics",
            "extract": "Quantum mechanics describes nature at small scales."
        }),
    )
    .await;
    let db = test_db().await;
    let (mut feed, mut rx) = Feed::new(client_for(&server), db.clone(), settings());

    feed.start(Mode::Discover).await;
    let tiles = drain(&mut rx);
    assert_eq!(tiles.len(), 1);
    assert_eq!(tiles[0].item().unwrap().title, "Quantum Mechanics");

    feed.on_like("Quantum Mechanics").await;
    assert!((feed.model().weight_of("quantum") - 0.3).abs() < 1e-9);
    assert!((feed.model().weight_of("mechanics") - 0.3).abs() < 1e-9);

    let liked = db.load_liked().await.unwrap();
    assert_eq!(liked.len(), 1);
    assert_eq!(liked[0].id, "Quantum Mechanics");
    assert_eq!(db.load_history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_provider_down_shows_placeholders_and_keeps_history() {
    let server = summary_server(503, serde_json::json!({})).await;
    let db = test_db().await;
    let (mut feed, mut rx) = Feed::new(client_for(&server), db.clone(), settings());

    feed.start(Mode::Discover).await;
    feed.on_need_next().await;
    feed.on_need_next().await;

    let tiles = drain(&mut rx);
    assert_eq!(tiles.len(), 3);
    for tile in &tiles {
        match tile {
            Tile::Error { message } => assert!(message.contains("503")),
            other => panic!("expected error tile, got {:?}", other),
        }
    }
    assert!(db.load_history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_onboarding_makes_no_requests() {
    let server = summary_server(200, serde_json::json!({ "title": "Anything" })).await;
    let db = test_db().await;
    let mut model = PreferenceModel::new();
    model.record(&Item::new("x", "Quantum Physics"), Signal::Like, Utc::now());
    model.save(&db).await.unwrap();

    let (mut feed, mut rx) = Feed::new(client_for(&server), db, settings());
    feed.start(Mode::ForYou).await;

    assert_eq!(feed.for_you_outcome(), Some(ForYouOutcome::Onboarding));
    assert_eq!(drain(&mut rx), vec![Tile::Onboarding { topics_known: 2 }]);
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ============================================================================
// Learning carried across sessions
// ============================================================================

#[tokio::test]
async fn test_discover_signals_shape_next_session_ranking() {
    let db = test_db().await;

    // First session: read two quantum articles, skip a cooking one.
    let provider = ListProvider::new(&[
        "Quantum Entanglement",
        "Quantum Computing Theory",
        "Cooking Pasta",
    ]);
    let (mut feed, _rx) = Feed::new(provider, db.clone(), settings());
    feed.start(Mode::Discover).await;
    feed.on_dwell_elapsed("Quantum Entanglement", 45.0).await;
    feed.on_dwell_elapsed("Quantum Computing Theory", 40.0).await;
    assert_eq!(feed.active_item().map(|i| i.id.as_str()), Some("Cooking Pasta"));
    feed.on_skip("Cooking Pasta").await;

    let top = feed.top_topics(1);
    assert_eq!(top[0].0, "quantum");
    assert_eq!(db.load_skipped().await.unwrap().len(), 1);
    drop(feed);

    // Second session starts straight in the personalized stream.
    let provider = ListProvider::new(&["Garden Tools", "Quantum Field Theory", "Pasta Recipes"]);
    let batch_of_three = FeedSettings {
        for_you_fetch_count: 3,
        ..settings()
    };
    let (mut feed, mut rx) = Feed::new(provider, db.clone(), batch_of_three);
    feed.start(Mode::ForYou).await;

    assert_eq!(feed.for_you_outcome(), Some(ForYouOutcome::Recommendations(3)));
    let tiles = drain(&mut rx);
    let titles: Vec<&str> = tiles
        .iter()
        .filter_map(|t| t.item().map(|i| i.title.as_str()))
        .collect();
    assert_eq!(titles, vec!["Quantum Field Theory", "Garden Tools", "Pasta Recipes"]);
    assert!(tiles[0].item().unwrap().relevance_score.unwrap() > 0.0);
    assert_eq!(tiles.last(), Some(&Tile::LoadMore { retry: false }));

    // Nothing left to fetch: the affordance turns into a retry.
    assert_eq!(feed.on_load_more().await, 0);
    assert_eq!(drain(&mut rx), vec![Tile::LoadMore { retry: true }]);
}

#[tokio::test]
async fn test_reset_personalized_stream_refetches() {
    let db = test_db().await;
    let mut model = PreferenceModel::new();
    model.record(&Item::new("x", "Quantum Physics Theory"), Signal::Like, Utc::now());
    model.save(&db).await.unwrap();

    let provider = ListProvider::new(&["Quantum Optics", "Quantum Gravity"]);
    let batch_of_two = FeedSettings {
        for_you_fetch_count: 2,
        ..settings()
    };
    let (mut feed, mut rx) = Feed::new(provider, db, batch_of_two);
    feed.start(Mode::ForYou).await;
    assert_eq!(feed.for_you_outcome(), Some(ForYouOutcome::Recommendations(2)));
    drain(&mut rx);

    // Provider is exhausted and both items were seen moments ago.
    feed.reset(Mode::ForYou).await;
    assert_eq!(feed.for_you_outcome(), Some(ForYouOutcome::NoRecommendations));
    assert_eq!(drain(&mut rx), vec![Tile::NoRecommendations]);
    assert_eq!(feed.window(Mode::ForYou).len(), 1);
}
