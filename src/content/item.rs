use serde::{Deserialize, Serialize};

/// One displayable content unit, as normalized from the provider.
///
/// `id` is the article title for Wikipedia content; it keys history and
/// the liked/skipped logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub canonical_url: String,
    /// Set only on ranked candidates shown in the personalized stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl Item {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary_text: String::new(),
            summary_html: None,
            thumbnail_url: None,
            canonical_url: String::new(),
            relevance_score: None,
        }
    }

    pub fn with_summary(mut self, text: impl Into<String>) -> Self {
        self.summary_text = text.into();
        self
    }

    /// Copy of this item carrying a relevance score.
    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    /// Relevance as a whole percentage, for "NN% Match" badges.
    pub fn match_percent(&self) -> Option<u32> {
        self.relevance_score
            .map(|score| (score.clamp(0.0, 1.0) * 100.0).round() as u32)
    }
}
