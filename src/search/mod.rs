//! Query-time scoring and fusion.
//!
//! [`hybrid`] scores chunks of one index, [`maxsim`] scores pages of one
//! index, [`fusion`] merges lanes across indexes and [`engine`] ties them to
//! named indexes and embedding adapters.

pub mod engine;
pub mod filter;
pub mod fusion;
pub mod hybrid;
pub mod maxsim;
pub mod recency;
pub mod types;

pub use engine::SearchEngine;
pub use filter::{matches_filters, parse_metadata};
pub use fusion::{RRF_K, fuse_hybrid, fuse_text, fuse_vision, rrf, rrf_contribution};
pub use hybrid::{SNIPPET_CHARS, search_index};
pub use maxsim::{PageResult, max_sim_score, search_vision_index};
pub use recency::{apply_recency, recency_boost};
pub use types::{
    Filters, QueryVectors, ResultKey, ResultType, SearchMode, SearchOptions, SearchResponse,
    SearchResult,
};
