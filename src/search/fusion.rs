//! Merging per-index results into one ranked list.
//!
//! Text and vision modes sort by their native score. Hybrid mode ranks three
//! lanes independently (vector similarity, lexical score, MaxSim) and fuses
//! them with reciprocal rank fusion.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::search::types::{ResultKey, SearchResult};

/// RRF damping constant.
pub const RRF_K: f64 = 60.0;

/// Contribution of an item at 0-based `rank` within one lane.
#[inline]
pub fn rrf_contribution(rank: usize) -> f64 {
    1.0 / (RRF_K + rank as f64 + 1.0)
}

/// Reciprocal rank fusion over ranked lanes.
///
/// Returns each distinct item with its summed contribution, best first.
/// Items with equal scores keep the order in which they were first seen.
pub fn rrf<K>(lanes: &[Vec<K>]) -> Vec<(K, f64)>
where
    K: Eq + Hash + Clone,
{
    let mut order: Vec<K> = Vec::new();
    let mut scores: HashMap<K, f64> = HashMap::new();

    for lane in lanes {
        for (rank, item) in lane.iter().enumerate() {
            match scores.get_mut(item) {
                Some(score) => *score += rrf_contribution(rank),
                None => {
                    scores.insert(item.clone(), rrf_contribution(rank));
                    order.push(item.clone());
                }
            }
        }
    }

    let mut fused: Vec<(K, f64)> = order
        .into_iter()
        .map(|item| {
            let score = scores.get(&item).copied().unwrap_or(0.0);
            (item, score)
        })
        .collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1));
    fused
}

/// Text mode: best score first, one result per `(file, position)`.
pub fn fuse_text(results: Vec<SearchResult>, threshold: f64, top_k: usize) -> Vec<SearchResult> {
    finish(dedup(sorted_by(results, |r| r.score)), threshold, top_k)
}

/// Vision mode: best MaxSim first, one result per `(file, page)`.
pub fn fuse_vision(results: Vec<SearchResult>, threshold: f64, top_k: usize) -> Vec<SearchResult> {
    finish(dedup(sorted_by(results, |r| r.score)), threshold, top_k)
}

/// Hybrid mode: RRF over the vector, lexical and page lanes.
///
/// The lexical lane only holds text results with a positive lexical score.
/// Each fused result takes its fields from the first lane it appears in and
/// carries the fused value as both `score` and `rrf_score`.
pub fn fuse_hybrid(
    text: Vec<SearchResult>,
    vision: Vec<SearchResult>,
    threshold: f64,
    top_k: usize,
) -> Vec<SearchResult> {
    let vector_lane = dedup(sorted_by(text.clone(), |r| r.vec_score));
    let lexical_lane = dedup(sorted_by(
        text.into_iter().filter(|r| r.fts_score > 0.0).collect(),
        |r| r.fts_score,
    ));
    let page_lane = dedup(sorted_by(vision, |r| r.vec_score));

    let mut records: HashMap<ResultKey, SearchResult> = HashMap::new();
    let mut lanes: Vec<Vec<ResultKey>> = Vec::with_capacity(3);
    for lane in [vector_lane, lexical_lane, page_lane] {
        let keys = lane.iter().map(SearchResult::key).collect();
        for result in lane {
            records.entry(result.key()).or_insert(result);
        }
        lanes.push(keys);
    }

    let fused = rrf(&lanes)
        .into_iter()
        .filter_map(|(key, score)| {
            records.remove(&key).map(|mut result| {
                result.score = score;
                result.rrf_score = Some(score);
                result
            })
        })
        .collect();
    finish(fused, threshold, top_k)
}

/// Stable descending sort by `score_of`.
fn sorted_by(
    mut results: Vec<SearchResult>,
    score_of: impl Fn(&SearchResult) -> f64,
) -> Vec<SearchResult> {
    results.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));
    results
}

/// Keeps the first occurrence of every result key.
fn dedup(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.key()))
        .collect()
}

fn finish(results: Vec<SearchResult>, threshold: f64, top_k: usize) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| r.score >= threshold)
        .take(top_k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::types::ResultType;

    fn text(
        index: &str,
        path: &str,
        position: u32,
        vec: f64,
        fts: f64,
        score: f64,
    ) -> SearchResult {
        SearchResult {
            score,
            vec_score: vec,
            fts_score: fts,
            rrf_score: None,
            index_name: index.to_string(),
            file_path: path.to_string(),
            position: Some(position),
            section_context: None,
            content: String::new(),
            result_type: ResultType::Text,
            page_number: None,
            chunk_id: None,
            content_timestamp: None,
        }
    }

    fn page(path: &str, number: u32, score: f64) -> SearchResult {
        SearchResult {
            score,
            vec_score: score,
            fts_score: 0.0,
            rrf_score: None,
            index_name: "pages".to_string(),
            file_path: path.to_string(),
            position: None,
            section_context: None,
            content: String::new(),
            result_type: ResultType::Vision,
            page_number: Some(number),
            chunk_id: None,
            content_timestamp: None,
        }
    }

    #[test]
    fn test_rrf_exact_constant() {
        let lanes = vec![
            vec!["x", "a", "b"],
            vec!["c", "d", "x"],
            vec!["e", "f", "g", "h", "x"],
        ];
        let fused = rrf(&lanes);
        let x = fused.iter().find(|(k, _)| *k == "x").unwrap().1;
        let expected = 1.0 / 61.0 + 1.0 / 63.0 + 1.0 / 65.0;
        assert!((x - expected).abs() < 1e-12);
        assert_eq!(fused[0].0, "x");
    }

    #[test]
    fn test_rrf_ties_keep_first_seen_order() {
        let lanes = vec![vec!["a", "b"], vec!["b", "a"]];
        let fused = rrf(&lanes);
        assert_eq!(fused[0].1, fused[1].1);
        assert_eq!(fused[0].0, "a");
        assert_eq!(fused[1].0, "b");
    }

    #[test]
    fn test_text_dedup_keeps_highest() {
        let results = vec![
            text("one", "a.md", 0, 0.5, 0.0, 0.3),
            text("two", "a.md", 0, 0.9, 0.0, 0.54),
            text("one", "b.md", 0, 0.4, 0.0, 0.24),
        ];
        let fused = fuse_text(results, 0.0, 10);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].index_name, "two");
        assert_eq!(fused[1].file_path, "b.md");
    }

    #[test]
    fn test_threshold_is_inclusive_and_top_k_truncates() {
        let results = vec![
            text("i", "a.md", 0, 0.5, 0.0, 0.5),
            text("i", "b.md", 0, 0.4, 0.0, 0.4),
            text("i", "c.md", 0, 0.3, 0.0, 0.3),
        ];
        let fused = fuse_text(results.clone(), 0.4, 10);
        assert_eq!(fused.len(), 2);
        assert_eq!(fuse_text(results, 0.0, 1).len(), 1);
    }

    #[test]
    fn test_vision_sorted_by_maxsim() {
        let fused = fuse_vision(vec![page("d.pdf", 1, 1.2), page("d.pdf", 2, 2.5)], 0.0, 10);
        assert_eq!(fused[0].page_number, Some(2));
        assert!(fused[0].rrf_score.is_none());
    }

    #[test]
    fn test_hybrid_lanes_and_rrf_fields() {
        let text_results = vec![
            // best vector match, no lexical hit
            text("i", "a.md", 0, 0.9, 0.0, 0.54),
            // weaker vector, only lexical hit
            text("i", "b.md", 0, 0.5, 1.0, 0.7),
        ];
        let vision_results = vec![page("d.pdf", 3, 2.0)];
        let fused = fuse_hybrid(text_results, vision_results, 0.0, 10);

        assert_eq!(fused.len(), 3);
        // b.md: rank 1 in vector lane + rank 0 in lexical lane
        assert_eq!(fused[0].file_path, "b.md");
        let expected = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((fused[0].score - expected).abs() < 1e-12);
        assert_eq!(fused[0].rrf_score, Some(fused[0].score));
        assert!(fused.iter().all(|r| r.rrf_score.is_some()));

        // a.md and the page tie at 1/61; vector lane comes first
        assert_eq!(fused[1].file_path, "a.md");
        assert_eq!(fused[2].page_number, Some(3));
        assert_eq!(fused[2].fts_score, 0.0);
    }
}
