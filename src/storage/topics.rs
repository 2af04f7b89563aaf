use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{keys, TopicWeight};

impl Database {
    // ========================================================================
    // Topic Weight Operations
    // ========================================================================

    /// Load the topic-weight map. Missing or corrupt → empty.
    pub async fn load_topic_weights(&self) -> Result<HashMap<String, TopicWeight>> {
        Ok(self.get_json(keys::TOPIC_WEIGHTS).await?.unwrap_or_default())
    }

    /// Replace the whole topic-weight map.
    pub async fn save_topic_weights(&self, weights: &HashMap<String, TopicWeight>) -> Result<()> {
        self.set_json(keys::TOPIC_WEIGHTS, weights).await
    }

    /// When decay last ran, stored as epoch milliseconds.
    pub async fn load_last_decay(&self) -> Result<Option<DateTime<Utc>>> {
        let millis: Option<i64> = self.get_json(keys::LAST_DECAY).await?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }

    pub async fn save_last_decay(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_json(keys::LAST_DECAY, &at.timestamp_millis()).await
    }
}
