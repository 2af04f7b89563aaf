use anyhow::Result;

use super::schema::Database;
use super::types::{keys, HistoryEntry, InteractionRecord, HISTORY_CAP};

impl Database {
    // ========================================================================
    // History Operations
    // ========================================================================

    /// Load the delivery history, oldest first. Missing or corrupt → empty.
    pub async fn load_history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.get_json(keys::HISTORY).await?.unwrap_or_default())
    }

    /// Append an entry, dropping the oldest ones beyond `HISTORY_CAP`.
    pub async fn append_history(&self, entry: HistoryEntry) -> Result<()> {
        let mut history = self.load_history().await?;
        history.push(entry);
        if history.len() > HISTORY_CAP {
            let overflow = history.len() - HISTORY_CAP;
            history.drain(..overflow);
        }
        self.set_json(keys::HISTORY, &history).await
    }

    /// Store the dwell time on the most recent history entry for `item_id`.
    ///
    /// Returns `false` when no entry with that id is retained.
    pub async fn record_dwell(&self, item_id: &str, dwell_seconds: f64) -> Result<bool> {
        let mut history = self.load_history().await?;
        let Some(entry) = history.iter_mut().rev().find(|e| e.item.id == item_id) else {
            return Ok(false);
        };
        entry.dwell_seconds = Some(dwell_seconds.max(0.0));
        self.set_json(keys::HISTORY, &history).await?;
        Ok(true)
    }

    /// Most recent history entry for `item_id`, if retained.
    pub async fn find_in_history(&self, item_id: &str) -> Result<Option<HistoryEntry>> {
        let history = self.load_history().await?;
        Ok(history.into_iter().rev().find(|e| e.item.id == item_id))
    }

    // ========================================================================
    // Liked / Skipped Logs
    // ========================================================================

    pub async fn append_liked(&self, record: InteractionRecord) -> Result<()> {
        self.append_interaction(keys::LIKED, record).await
    }

    pub async fn append_skipped(&self, record: InteractionRecord) -> Result<()> {
        self.append_interaction(keys::SKIPPED, record).await
    }

    pub async fn load_liked(&self) -> Result<Vec<InteractionRecord>> {
        Ok(self.get_json(keys::LIKED).await?.unwrap_or_default())
    }

    pub async fn load_skipped(&self) -> Result<Vec<InteractionRecord>> {
        Ok(self.get_json(keys::SKIPPED).await?.unwrap_or_default())
    }

    async fn append_interaction(&self, key: &str, record: InteractionRecord) -> Result<()> {
        let mut log: Vec<InteractionRecord> = self.get_json(key).await?.unwrap_or_default();
        log.push(record);
        self.set_json(key, &log).await
    }
}
