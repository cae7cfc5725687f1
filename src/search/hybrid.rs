//! Hybrid lexical-vector scoring over one index.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::ann::probe;
use crate::error::{RetrievalError, RetrievalResult, StoreError};
use crate::search::filter::{matches_filters, parse_metadata};
use crate::search::recency::{apply_recency, recency_boost};
use crate::search::types::{ResultType, SearchOptions, SearchResult};
use crate::store::{ChunkRow, LEXICAL_CANDIDATE_LIMIT, VectorStore, get_utc_timestamp_ms};
use crate::vector::{ChunkId, cosine_with_norms, norm};

/// Weight of the cosine similarity in the hybrid score.
pub const VECTOR_WEIGHT: f64 = 0.6;
/// Weight of the normalized lexical score in the hybrid score.
pub const LEXICAL_WEIGHT: f64 = 0.4;
/// Characters of chunk content returned as a snippet.
pub const SNIPPET_CHARS: usize = 1000;

/// Minimum batch of rows fetched per round trip when filters are active.
const FILTER_FETCH_BATCH: usize = 64;

#[derive(Debug, Clone, Copy)]
struct Scored {
    id: ChunkId,
    vec_score: f64,
    fts_score: f64,
    score: f64,
}

/// Scores chunks of `store` against a query and returns the best `top_k`.
///
/// Every candidate gets `0.6 * cosine + 0.4 * bm25 / max_bm25`, blended with
/// the recency boost. Lexical query syntax errors fall back to vector-only
/// scoring. With `opts.use_ann` and a built ANN index, only chunks in the
/// probed clusters, chunks added after the build and lexical hits are
/// scored; otherwise every chunk is.
///
/// # Errors
/// - [`RetrievalError::QueryDimensionMismatch`] when `query_embedding` does
///   not match the index dimension
/// - [`StoreError::MissingLane`] when the index stores no chunk embeddings
pub fn search_index(
    store: &dyn VectorStore,
    query_embedding: &[f32],
    query_text: &str,
    top_k: usize,
    opts: &SearchOptions,
) -> RetrievalResult<Vec<SearchResult>> {
    let dimension = store.text_dimension().ok_or_else(|| StoreError::MissingLane {
        index: store.name().to_string(),
        lane: "text",
    })?;
    if query_embedding.len() != dimension.get() {
        return Err(RetrievalError::QueryDimensionMismatch {
            index: store.name().to_string(),
            expected: dimension.get(),
            actual: query_embedding.len(),
        });
    }
    if top_k == 0 {
        return Ok(Vec::new());
    }

    let lexical = lexical_scores(store, query_text)?;
    let vectors = store.chunk_vectors()?;
    let candidates = ann_restriction(store, query_embedding, opts, &lexical)?;

    let now_ms = opts.now_ms.unwrap_or_else(get_utc_timestamp_ms);
    let query_norm = norm(query_embedding);

    let mut scored: Vec<Scored> = vectors
        .par_iter()
        .filter(|v| candidates.as_ref().is_none_or(|set| set.contains(&v.id)))
        .map(|v| {
            let vec_score =
                cosine_with_norms(query_embedding, query_norm, &v.embedding, norm(&v.embedding))
                    as f64;
            let fts_score = lexical.get(&v.id).copied().unwrap_or(0.0);
            let hybrid = VECTOR_WEIGHT * vec_score + LEXICAL_WEIGHT * fts_score;
            let boost = recency_boost(v.content_timestamp, now_ms, opts.half_life_days);
            Scored {
                id: v.id,
                vec_score,
                fts_score,
                score: apply_recency(hybrid, boost, opts.recency_weight),
            }
        })
        .collect();

    // Stable: equal scores keep insertion order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!(
        "index '{}': scored {} of {} chunks ({} lexical hits)",
        store.name(),
        scored.len(),
        vectors.len(),
        lexical.len()
    );

    collect_results(store, &scored, top_k, opts)
}

/// Normalized lexical scores keyed by chunk.
///
/// Scores are divided by the best score of this query, so they lie in
/// `(0, 1]`. A malformed query yields no scores.
fn lexical_scores(
    store: &dyn VectorStore,
    query_text: &str,
) -> RetrievalResult<HashMap<ChunkId, f64>> {
    let tokens: Vec<String> = query_text.split_whitespace().map(str::to_string).collect();
    if tokens.is_empty() {
        return Ok(HashMap::new());
    }

    let hits = match store.lexical_search(&tokens, LEXICAL_CANDIDATE_LIMIT) {
        Ok(hits) => hits,
        Err(e @ StoreError::LexicalQuery { .. }) => {
            warn!("index '{}': {e}; using vector scores only", store.name());
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    let max_score = hits.iter().map(|h| h.score as f64).fold(0.0, f64::max);
    if max_score <= 0.0 {
        return Ok(HashMap::new());
    }
    Ok(hits
        .into_iter()
        .map(|h| (h.id, h.score as f64 / max_score))
        .collect())
}

/// Chunk ids to score when ANN pruning applies, `None` for a full scan.
fn ann_restriction(
    store: &dyn VectorStore,
    query: &[f32],
    opts: &SearchOptions,
    lexical: &HashMap<ChunkId, f64>,
) -> RetrievalResult<Option<HashSet<ChunkId>>> {
    if !opts.use_ann {
        return Ok(None);
    }
    let Some(state) = store.ann_state() else {
        debug!("index '{}' has no ANN index, scanning all chunks", store.name());
        return Ok(None);
    };

    let mut candidates = probe(&state, query, opts.nprobe)?;
    let vectors = store.chunk_vectors()?;
    candidates.extend(
        vectors
            .iter()
            .map(|v| v.id)
            .filter(|id| !state.is_assigned(*id)),
    );
    candidates.extend(lexical.keys().copied());
    Ok(Some(candidates))
}

/// Fetches detail rows in score order until `top_k` rows pass the filters.
fn collect_results(
    store: &dyn VectorStore,
    scored: &[Scored],
    top_k: usize,
    opts: &SearchOptions,
) -> RetrievalResult<Vec<SearchResult>> {
    let filtering = !opts.filters.is_empty();
    let batch = if filtering {
        (top_k * 4).max(FILTER_FETCH_BATCH)
    } else {
        top_k
    };

    let mut results = Vec::with_capacity(top_k.min(scored.len()));
    for window in scored.chunks(batch) {
        let ids: Vec<ChunkId> = window.iter().map(|s| s.id).collect();
        let mut rows: HashMap<ChunkId, ChunkRow> = store
            .fetch_chunks(&ids)?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();

        for s in window {
            let Some(row) = rows.remove(&s.id) else {
                continue;
            };
            if filtering
                && !matches_filters(parse_metadata(row.metadata.as_deref()).as_ref(), &opts.filters)
            {
                continue;
            }
            results.push(to_result(store.name(), s, row));
            if results.len() == top_k {
                return Ok(results);
            }
        }
    }
    Ok(results)
}

fn to_result(index_name: &str, scored: &Scored, row: ChunkRow) -> SearchResult {
    SearchResult {
        score: scored.score,
        vec_score: scored.vec_score,
        fts_score: scored.fts_score,
        rrf_score: None,
        index_name: index_name.to_string(),
        file_path: row.file_path,
        position: Some(row.position),
        section_context: row.section,
        content: snippet(&row.content),
        result_type: ResultType::Text,
        page_number: None,
        chunk_id: Some(row.id),
        content_timestamp: row.content_timestamp,
    }
}

/// First [`SNIPPET_CHARS`] characters of `content`.
pub fn snippet(content: &str) -> String {
    match content.char_indices().nth(SNIPPET_CHARS) {
        Some((end, _)) => content[..end].to_string(),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::{AnnBuildOptions, build_ann_index};
    use crate::search::recency::MS_PER_DAY;
    use crate::store::{IndexSpec, IndexStore, NewChunk};

    const NOW: i64 = 1_750_000_000_000;

    fn chunk(path: &str, position: u32, content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            file_path: path.to_string(),
            position,
            content: content.to_string(),
            section: None,
            content_timestamp: None,
            metadata: None,
            embedding,
        }
    }

    fn opts() -> SearchOptions {
        SearchOptions::default().with_recency(0.0, 90.0).with_now_ms(NOW)
    }

    fn sample_store() -> IndexStore {
        let store = IndexStore::in_memory("docs", IndexSpec::text(3)).unwrap();
        store
            .add_chunks(vec![
                chunk("a.md", 0, "rust ownership rules", vec![1.0, 0.0, 0.0]),
                chunk("a.md", 1, "borrow checker errors", vec![0.8, 0.6, 0.0]),
                chunk("b.md", 0, "gardening in spring", vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_vector_ranking_without_lexical_hits() {
        let store = sample_store();
        let results = search_index(&store, &[1.0, 0.0, 0.0], "", 10, &opts()).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].file_path, "a.md");
        assert_eq!(results[0].position, Some(0));
        assert!((results[0].vec_score - 1.0).abs() < 1e-6);
        assert!((results[0].score - 0.6).abs() < 1e-6);
        assert_eq!(results[0].fts_score, 0.0);
        assert_eq!(results[2].file_path, "b.md");
    }

    #[test]
    fn test_lexical_score_is_normalized_and_blended() {
        let store = sample_store();
        let results = search_index(&store, &[0.0, 0.0, 1.0], "gardening", 10, &opts()).unwrap();

        let top = &results[0];
        assert_eq!(top.file_path, "b.md");
        assert!((top.fts_score - 1.0).abs() < 1e-9);
        assert!((top.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_syntax_error_falls_back_to_vectors() {
        let store = sample_store();
        let results = search_index(&store, &[1.0, 0.0, 0.0], "(", 2, &opts()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.fts_score == 0.0));
    }

    #[test]
    fn test_rejects_wrong_query_dimension() {
        let store = sample_store();
        let err = search_index(&store, &[1.0, 0.0], "rust", 5, &opts()).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::QueryDimensionMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_recency_boost_reorders_equal_matches() {
        let store = IndexStore::in_memory("news", IndexSpec::text(2)).unwrap();
        let mut old = chunk("old.md", 0, "report", vec![1.0, 0.0]);
        old.content_timestamp = Some(NOW - (365.0 * MS_PER_DAY) as i64);
        let mut fresh = chunk("new.md", 0, "report", vec![1.0, 0.0]);
        fresh.content_timestamp = Some(NOW - MS_PER_DAY as i64);
        store.add_chunks(vec![old, fresh]).unwrap();

        let flat = search_index(&store, &[1.0, 0.0], "", 2, &opts()).unwrap();
        assert_eq!(flat[0].file_path, "old.md");
        assert_eq!(flat[0].score, flat[1].score);

        let boosted = opts().with_recency(0.5, 90.0);
        let results = search_index(&store, &[1.0, 0.0], "", 2, &boosted).unwrap();
        assert_eq!(results[0].file_path, "new.md");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_filters_exclude_non_matching_rows() {
        let store = IndexStore::in_memory("tickets", IndexSpec::text(2)).unwrap();
        let mut open = chunk("t1.md", 0, "login bug", vec![0.9, 0.1]);
        open.metadata = Some(serde_json::json!({"status": "Open"}));
        let mut closed = chunk("t2.md", 0, "login bug", vec![1.0, 0.0]);
        closed.metadata = Some(serde_json::json!({"status": "Closed"}));
        let bare = chunk("t3.md", 0, "login bug", vec![1.0, 0.0]);
        store.add_chunks(vec![open, closed, bare]).unwrap();

        let filtered = opts().with_filter("status", "open");
        let results = search_index(&store, &[1.0, 0.0], "", 10, &filtered).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_path, "t1.md");
    }

    #[test]
    fn test_ann_scores_probed_and_unassigned_chunks() {
        let store = IndexStore::in_memory("ann", IndexSpec::text(2)).unwrap();
        let mut chunks = Vec::new();
        for i in 0..8 {
            chunks.push(chunk("x.md", i, "east", vec![1.0, 0.01 * i as f32]));
            chunks.push(chunk("y.md", i, "north", vec![0.01 * i as f32, 1.0]));
        }
        store.add_chunks(chunks).unwrap();
        build_ann_index(&store, &AnnBuildOptions::default().with_min_chunks(4)).unwrap();
        store
            .add_chunks(vec![chunk("late.md", 0, "fresh", vec![0.0, 1.0])])
            .unwrap();

        let pruned = opts().with_ann(1);
        let results = search_index(&store, &[1.0, 0.0], "", 100, &pruned).unwrap();
        let full = search_index(&store, &[1.0, 0.0], "", 100, &opts()).unwrap();

        assert!(results.len() < full.len());
        assert!(results.iter().any(|r| r.file_path == "late.md"));
        assert_eq!(results[0].file_path, "x.md");
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let long = "é".repeat(SNIPPET_CHARS + 5);
        assert_eq!(snippet(&long).chars().count(), SNIPPET_CHARS);
        assert_eq!(snippet("short"), "short");
    }
}
