use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::Item;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database
    #[error("Another instance of wikiscroll appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map lock-related SQLite failures to `InstanceLocked`.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

// ============================================================================
// Record Keys
// ============================================================================

/// Keys of the logical records kept in `kv_store`.
pub mod keys {
    pub const HISTORY: &str = "history";
    pub const LIKED: &str = "liked";
    pub const SKIPPED: &str = "skipped";
    pub const TOPIC_WEIGHTS: &str = "topic_weights";
    pub const LAST_DECAY: &str = "last_decay";
}

/// Most recent history entries retained; older ones fall off the front.
pub const HISTORY_CAP: usize = 50;

// ============================================================================
// Records
// ============================================================================

/// An item snapshot recorded when it was delivered to the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub item: Item,
    /// Delivery time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Seconds the item stayed on screen, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_seconds: Option<f64>,
}

impl HistoryEntry {
    pub fn new(item: Item, timestamp: DateTime<Utc>) -> Self {
        Self {
            item,
            timestamp,
            dwell_seconds: None,
        }
    }
}

/// One entry of the liked or skipped log.
///
/// `item` is absent when the signal arrived for an id with no known snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Learned interest in one topic token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicWeight {
    pub weight: f64,
    pub observation_count: u64,
    pub total_dwell_seconds: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl TopicWeight {
    /// A freshly observed topic starts with zero weight.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            weight: 0.0,
            observation_count: 0,
            total_dwell_seconds: 0.0,
            last_updated: now,
        }
    }
}
