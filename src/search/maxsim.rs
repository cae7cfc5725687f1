//! Late-interaction (MaxSim) page scoring.

use rayon::prelude::*;

use crate::error::{RetrievalError, RetrievalResult, StoreError};
use crate::search::types::{ResultType, SearchResult};
use crate::store::VectorStore;
use crate::vector::{Embedding, PageId, cosine_with_norms, norm};

/// A page scored against a multi-vector query.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub page_id: PageId,
    pub file_path: String,
    pub page_number: u32,
    pub score: f64,
}

impl PageResult {
    /// Converts into a vision [`SearchResult`] attributed to `index_name`.
    pub fn into_search_result(self, index_name: &str) -> SearchResult {
        SearchResult {
            score: self.score,
            vec_score: self.score,
            fts_score: 0.0,
            rrf_score: None,
            index_name: index_name.to_string(),
            file_path: self.file_path,
            position: None,
            section_context: None,
            content: String::new(),
            result_type: ResultType::Vision,
            page_number: Some(self.page_number),
            chunk_id: None,
            content_timestamp: None,
        }
    }
}

/// Sum over query vectors of the best cosine against any page vector.
///
/// Each query token contributes independently, so repeating the query
/// tokens scales the score linearly. An empty page scores 0.
pub fn max_sim_score(query_vectors: &[Embedding], page_vectors: &[Embedding]) -> f64 {
    if page_vectors.is_empty() {
        return 0.0;
    }
    let page_norms: Vec<f32> = page_vectors.iter().map(|p| norm(p)).collect();

    query_vectors
        .iter()
        .map(|q| {
            let q_norm = norm(q);
            page_vectors
                .iter()
                .zip(&page_norms)
                .map(|(p, &p_norm)| cosine_with_norms(q, q_norm, p, p_norm) as f64)
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .sum()
}

/// Scores every page of `store` and returns the best `top_k`.
///
/// Pages without patch vectors are skipped. Equal scores keep page order.
pub fn search_vision_index(
    store: &dyn VectorStore,
    query_vectors: &[Embedding],
    top_k: usize,
) -> RetrievalResult<Vec<PageResult>> {
    let dimension = store.page_dimension().ok_or_else(|| StoreError::MissingLane {
        index: store.name().to_string(),
        lane: "vision",
    })?;
    if let Some(bad) = query_vectors.iter().find(|q| q.len() != dimension.get()) {
        return Err(RetrievalError::QueryDimensionMismatch {
            index: store.name().to_string(),
            expected: dimension.get(),
            actual: bad.len(),
        });
    }
    if top_k == 0 || query_vectors.is_empty() {
        return Ok(Vec::new());
    }

    let pages = store.pages()?;
    let mut results: Vec<PageResult> = pages
        .par_iter()
        .filter(|page| !page.patches.is_empty())
        .map(|page| PageResult {
            page_id: page.id,
            file_path: page.file_path.clone(),
            page_number: page.page_number,
            score: max_sim_score(query_vectors, &page.patches),
        })
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(top_k);
    Ok(results)
}
