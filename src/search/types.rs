//! Search options, query vectors and result records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RetrievalError, RetrievalResult};
use crate::vector::{ChunkId, Embedding};

/// Metadata filters: key to expected value, compared case-insensitively.
pub type Filters = BTreeMap<String, String>;

/// Which lanes a search runs and how they are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Hybrid-scored chunks only
    #[default]
    Text,
    /// MaxSim-scored pages only
    Vision,
    /// Reciprocal rank fusion over vector, lexical and page lanes
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Text => "text",
            SearchMode::Vision => "vision",
            SearchMode::Hybrid => "hybrid",
        }
    }

    /// Whether chunk indexes are searched in this mode.
    #[must_use]
    pub fn uses_text(&self) -> bool {
        matches!(self, SearchMode::Text | SearchMode::Hybrid)
    }

    /// Whether page indexes are searched in this mode.
    #[must_use]
    pub fn uses_vision(&self) -> bool {
        matches!(self, SearchMode::Vision | SearchMode::Hybrid)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(SearchMode::Text),
            "vision" => Ok(SearchMode::Vision),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(RetrievalError::InvalidOptions {
                reason: format!("unknown search mode '{other}', expected text, vision or hybrid"),
            }),
        }
    }
}

/// Default number of results returned.
pub const DEFAULT_TOP_K: usize = 10;
/// Default recency weight.
pub const DEFAULT_RECENCY_WEIGHT: f64 = 0.15;
/// Default recency half-life in days.
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 90.0;
/// Default number of ANN clusters probed.
pub const DEFAULT_NPROBE: usize = 8;

/// Options for one search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    /// Minimum score a fused result needs; compared with `>=`.
    pub threshold: f64,
    pub mode: SearchMode,
    /// 0 disables the recency boost.
    pub recency_weight: f64,
    pub half_life_days: f64,
    pub filters: Filters,
    /// Restrict vector scoring to ANN candidates when an ANN index exists.
    pub use_ann: bool,
    pub nprobe: usize,
    /// "Now" for recency, in epoch milliseconds; `None` reads the clock.
    pub now_ms: Option<i64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            threshold: 0.0,
            mode: SearchMode::Text,
            recency_weight: DEFAULT_RECENCY_WEIGHT,
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            filters: Filters::new(),
            use_ann: false,
            nprobe: DEFAULT_NPROBE,
            now_ms: None,
        }
    }
}

impl SearchOptions {
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_recency(mut self, weight: f64, half_life_days: f64) -> Self {
        self.recency_weight = weight;
        self.half_life_days = half_life_days;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_ann(mut self, nprobe: usize) -> Self {
        self.use_ann = true;
        self.nprobe = nprobe;
        self
    }

    #[must_use]
    pub fn with_now_ms(mut self, now_ms: i64) -> Self {
        self.now_ms = Some(now_ms);
        self
    }

    /// Rejects values the scoring formulas are undefined for.
    pub fn validate(&self) -> RetrievalResult<()> {
        let invalid = |reason: String| Err(RetrievalError::InvalidOptions { reason });

        if !self.threshold.is_finite() {
            return invalid(format!("threshold must be finite, got {}", self.threshold));
        }
        if !(0.0..=1.0).contains(&self.recency_weight) {
            return invalid(format!(
                "recency_weight must be within [0, 1], got {}",
                self.recency_weight
            ));
        }
        if !(self.half_life_days.is_finite() && self.half_life_days > 0.0) {
            return invalid(format!(
                "half_life_days must be positive, got {}",
                self.half_life_days
            ));
        }
        Ok(())
    }
}

/// Query embeddings, optionally per model id.
///
/// An entry without a model id serves every store that has no exact match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryVectors {
    text: Vec<(Option<String>, Embedding)>,
    vision: Vec<(Option<String>, Vec<Embedding>)>,
}

impl QueryVectors {
    /// One text embedding for every text index.
    #[must_use]
    pub fn text(embedding: Embedding) -> Self {
        Self::default().with_text(embedding)
    }

    /// One multi-vector query for every page index.
    #[must_use]
    pub fn vision(vectors: Vec<Embedding>) -> Self {
        Self::default().with_vision(vectors)
    }

    #[must_use]
    pub fn with_text(mut self, embedding: Embedding) -> Self {
        self.text.push((None, embedding));
        self
    }

    #[must_use]
    pub fn with_vision(mut self, vectors: Vec<Embedding>) -> Self {
        self.vision.push((None, vectors));
        self
    }

    #[must_use]
    pub fn with_text_for(mut self, model: impl Into<String>, embedding: Embedding) -> Self {
        self.text.push((Some(model.into()), embedding));
        self
    }

    #[must_use]
    pub fn with_vision_for(mut self, model: impl Into<String>, vectors: Vec<Embedding>) -> Self {
        self.vision.push((Some(model.into()), vectors));
        self
    }

    /// The text embedding for a store embedded with `model`.
    #[must_use]
    pub fn text_for(&self, model: Option<&str>) -> Option<&[f32]> {
        pick(&self.text, model).map(Vec::as_slice)
    }

    /// The multi-vector query for a store embedded with `model`.
    #[must_use]
    pub fn vision_for(&self, model: Option<&str>) -> Option<&[Embedding]> {
        pick(&self.vision, model).map(Vec::as_slice)
    }
}

fn pick<'a, T>(entries: &'a [(Option<String>, T)], model: Option<&str>) -> Option<&'a T> {
    model
        .and_then(|m| {
            entries
                .iter()
                .find(|(key, _)| key.as_deref() == Some(m))
        })
        .or_else(|| entries.iter().find(|(key, _)| key.is_none()))
        .map(|(_, value)| value)
}

/// Result type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Text,
    Vision,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Score the result was ranked by
    pub score: f64,
    /// Cosine similarity (text) or MaxSim score (vision)
    pub vec_score: f64,
    /// Normalized lexical score, 0 for vision results
    pub fts_score: f64,
    /// Fused score, present only in hybrid mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,
    pub index_name: String,
    pub file_path: String,
    /// Chunk position within its document (text only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_context: Option<String>,
    /// Snippet of the chunk content
    pub content: String,
    pub result_type: ResultType,
    /// Page number (vision only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<ChunkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_timestamp: Option<i64>,
}

/// Identity of a result across indexes, used for dedup and fusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResultKey {
    Text { file_path: String, position: u32 },
    Vision { file_path: String, page_number: u32 },
}

impl SearchResult {
    #[must_use]
    pub fn key(&self) -> ResultKey {
        match self.result_type {
            ResultType::Text => ResultKey::Text {
                file_path: self.file_path.clone(),
                position: self.position.unwrap_or(0),
            },
            ResultType::Vision => ResultKey::Vision {
                file_path: self.file_path.clone(),
                page_number: self.page_number.unwrap_or(0),
            },
        }
    }
}

/// Results plus non-fatal problems encountered while producing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
