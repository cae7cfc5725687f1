//! End-to-end searches across several indexes.

use std::path::Path;
use std::sync::Arc;

use quarry::adapter::{Adapter, AdapterRegistry, TextAdapter};
use quarry::search::{RRF_K, ResultType, SearchMode};
use quarry::store::{IndexSpec, VectorStore};
use quarry::{
    Embedding, QueryVectors, RetrievalResult, SearchEngine, SearchOptions, SearchResponse,
};
use serde_json::json;

use crate::common::{MS_PER_DAY, NOW_MS, axis, chunk, page, temp_catalog, text_store, vision_store};

const DIM: usize = 4;

fn options() -> SearchOptions {
    SearchOptions::default()
        .with_now_ms(NOW_MS)
        .with_recency(0.0, 90.0)
}

fn run(
    query: &str,
    vectors: &QueryVectors,
    stores: &[Arc<dyn VectorStore>],
    opts: &SearchOptions,
) -> SearchResponse {
    SearchEngine::search_with_vectors(query, vectors, stores, opts).unwrap()
}

/// Embeds text onto the axis named by its first word.
struct KeywordAdapter;

impl TextAdapter for KeywordAdapter {
    fn model_id(&self) -> &str {
        "keyword"
    }

    fn embedding_dim(&self) -> usize {
        DIM
    }

    fn embed_query(&self, text: &str) -> RetrievalResult<Embedding> {
        let index = match text.split_whitespace().next() {
            Some("rust") => 0,
            Some("python") => 1,
            Some("go") => 2,
            _ => 3,
        };
        Ok(axis(index, DIM))
    }

    fn embed_documents(&self, texts: &[&str]) -> RetrievalResult<Vec<Embedding>> {
        texts.iter().map(|t| self.embed_query(t)).collect()
    }
}

#[test]
fn test_engine_skips_missing_index_with_warning() {
    let (catalog, _temp) = temp_catalog();
    let store = catalog.create("docs", IndexSpec::text(DIM)).unwrap();
    store
        .add_chunks(vec![
            chunk("rust.md", 0, "rust ownership and borrowing", axis(0, DIM)),
            chunk("python.md", 0, "python decorators", axis(1, DIM)),
        ])
        .unwrap();

    let mut adapters = AdapterRegistry::new();
    adapters
        .register(Adapter::Text(Arc::new(KeywordAdapter)))
        .unwrap();
    let engine = SearchEngine::new(&catalog, &adapters);

    let response = engine
        .search("rust ownership", &["docs", "nope"], &options())
        .unwrap();

    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].contains("nope"));
    assert_eq!(response.results[0].file_path, "rust.md");
    assert_eq!(response.results[0].index_name, "docs");
    assert_eq!(response.results[0].result_type, ResultType::Text);
}

#[test]
fn test_malformed_lexical_query_falls_back_to_vectors() {
    let (store, _) = text_store(
        "docs",
        DIM,
        vec![
            chunk("a.md", 0, "first (draft", axis(0, DIM)),
            chunk("b.md", 0, "second draft)", axis(1, DIM)),
        ],
    );

    let response = run("(", &QueryVectors::text(axis(1, DIM)), &[store], &options());

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].file_path, "b.md");
    assert!(response.results.iter().all(|r| r.fts_score == 0.0));
    assert!((response.results[0].score - 0.6).abs() < 1e-6);
}

#[test]
fn test_lexical_match_lifts_score() {
    let (store, _) = text_store(
        "docs",
        DIM,
        vec![
            chunk("a.md", 0, "tokio runtime internals", axis(0, DIM)),
            chunk("b.md", 0, "thread pools", axis(0, DIM)),
        ],
    );

    let response = run("tokio", &QueryVectors::text(axis(0, DIM)), &[store], &options());

    assert_eq!(response.results[0].file_path, "a.md");
    assert!((response.results[0].fts_score - 1.0).abs() < 1e-9);
    assert!((response.results[0].score - 1.0).abs() < 1e-6);
    assert!((response.results[1].score - 0.6).abs() < 1e-6);
}

#[test]
fn test_same_chunk_in_two_indexes_is_returned_once() {
    let shared = || chunk("shared.md", 3, "shared content", axis(0, DIM));
    let (first, _) = text_store("first", DIM, vec![shared()]);
    let (second, _) = text_store(
        "second",
        DIM,
        vec![shared(), chunk("other.md", 0, "other", axis(2, DIM))],
    );

    let response = run(
        "",
        &QueryVectors::text(axis(0, DIM)),
        &[first, second],
        &options(),
    );

    let shared_hits = response
        .results
        .iter()
        .filter(|r| r.file_path == "shared.md")
        .count();
    assert_eq!(shared_hits, 1);
    assert_eq!(response.results[0].index_name, "first");
}

#[test]
fn test_dimension_mismatch_skips_only_that_index() {
    let (small, _) = text_store("small", DIM, vec![chunk("s.md", 0, "s", axis(0, DIM))]);
    let (large, _) = text_store("large", 8, vec![chunk("l.md", 0, "l", axis(0, 8))]);

    let response = run(
        "",
        &QueryVectors::text(axis(0, 8)),
        &[small, large],
        &options(),
    );

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].index_name, "large");
    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].contains("small"));
}

#[test]
fn test_repeated_searches_are_identical() {
    let chunks = (0..40)
        .map(|i| {
            // Many exact ties: only four distinct vectors.
            chunk(&format!("f{i}.md"), i, "same words everywhere", axis(i as usize % 4, DIM))
        })
        .collect();
    let (store, _) = text_store("docs", DIM, chunks);
    let stores = [store];
    let vectors = QueryVectors::text(vec![1.0, 1.0, 0.0, 0.0]);
    let opts = options().with_top_k(15).with_mode(SearchMode::Hybrid);

    let first = run("same words", &vectors, &stores, &opts);
    for _ in 0..5 {
        assert_eq!(run("same words", &vectors, &stores, &opts).results, first.results);
    }
}

#[test]
fn test_recency_prefers_newer_content_on_ties() {
    let mut old = chunk("old.md", 0, "release notes", axis(0, DIM));
    old.content_timestamp = Some(NOW_MS - 365 * MS_PER_DAY);
    let mut new = chunk("new.md", 0, "release notes", axis(0, DIM));
    new.content_timestamp = Some(NOW_MS - MS_PER_DAY);
    let (store, _) = text_store("docs", DIM, vec![old, new]);
    let stores = [store];
    let vectors = QueryVectors::text(axis(0, DIM));

    let flat = run("", &vectors, &stores, &options());
    assert_eq!(flat.results[0].file_path, "old.md");
    assert_eq!(flat.results[0].score, flat.results[1].score);

    let boosted = run("", &vectors, &stores, &options().with_recency(0.5, 90.0));
    assert_eq!(boosted.results[0].file_path, "new.md");
    assert!(boosted.results[0].score > boosted.results[1].score);
}

#[test]
fn test_metadata_filters_are_case_insensitive() {
    let mut tagged = chunk("tagged.md", 0, "tagged", axis(1, DIM));
    tagged.metadata = Some(json!({"team": "Search", "tier": 2}));
    let mut other = chunk("other.md", 0, "other", axis(0, DIM));
    other.metadata = Some(json!({"team": "infra"}));
    let untagged = chunk("untagged.md", 0, "untagged", axis(0, DIM));
    let (store, _) = text_store("docs", DIM, vec![tagged, other, untagged]);
    let stores = [store];
    let vectors = QueryVectors::text(axis(0, DIM));

    let response = run("", &vectors, &stores, &options().with_filter("team", "search"));
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].file_path, "tagged.md");

    let response = run(
        "",
        &vectors,
        &stores,
        &options().with_filter("team", "SEARCH").with_filter("tier", "2"),
    );
    assert_eq!(response.results.len(), 1);

    let response = run("", &vectors, &stores, &options().with_filter("team", "docs"));
    assert!(response.results.is_empty());
}

#[test]
fn test_threshold_is_inclusive() {
    let (store, _) = text_store(
        "docs",
        DIM,
        vec![
            chunk("exact.md", 0, "exact", axis(0, DIM)),
            chunk("half.md", 0, "half", vec![1.0, 1.0, 0.0, 0.0]),
        ],
    );

    let response = run(
        "",
        &QueryVectors::text(axis(0, DIM)),
        &[store],
        &options().with_threshold(0.6),
    );

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].file_path, "exact.md");
}

#[test]
fn test_vision_mode_ranks_pages_by_maxsim() {
    let store = vision_store(
        "slides",
        DIM,
        vec![
            page("deck.pdf", 1, vec![axis(2, DIM), axis(3, DIM)]),
            page("deck.pdf", 2, vec![axis(0, DIM), axis(1, DIM)]),
            page("deck.pdf", 3, vec![axis(0, DIM)]),
        ],
    );
    let query = QueryVectors::vision(vec![axis(0, DIM), axis(1, DIM)]);

    let response = run(
        "",
        &query,
        &[store],
        &options().with_mode(SearchMode::Vision),
    );

    let pages: Vec<Option<u32>> = response.results.iter().map(|r| r.page_number).collect();
    assert_eq!(pages, vec![Some(2), Some(3), Some(1)]);
    assert!((response.results[0].score - 2.0).abs() < 1e-6);
    assert!((response.results[1].score - 1.0).abs() < 1e-6);
    assert!(response.results.iter().all(|r| r.result_type == ResultType::Vision));
}

#[test]
fn test_hybrid_mode_fuses_text_and_pages() {
    let (text, _) = text_store(
        "notes",
        DIM,
        vec![
            chunk("guide.md", 0, "kernel scheduling guide", axis(0, DIM)),
            chunk("misc.md", 0, "unrelated", vec![0.5, 0.5, 0.0, 0.0]),
        ],
    );
    let pages = vision_store(
        "slides",
        DIM,
        vec![page("talk.pdf", 1, vec![axis(0, DIM)])],
    );
    let query = QueryVectors::text(axis(0, DIM)).with_vision(vec![axis(0, DIM)]);

    let response = run(
        "kernel",
        &query,
        &[text, pages],
        &options().with_mode(SearchMode::Hybrid),
    );

    assert_eq!(response.results.len(), 3);
    assert!(response.results.iter().all(|r| r.rrf_score == Some(r.score)));

    // First in both the vector and the lexical lane.
    let top = &response.results[0];
    assert_eq!(top.file_path, "guide.md");
    let expected = 2.0 / (RRF_K + 1.0);
    assert!((top.score - expected).abs() < 1e-12);

    // First and only entry of the page lane.
    let slide = response
        .results
        .iter()
        .find(|r| r.result_type == ResultType::Vision)
        .unwrap();
    assert!((slide.score - 1.0 / (RRF_K + 1.0)).abs() < 1e-12);
}

#[test]
fn test_import_file_then_search() {
    let (catalog, temp) = temp_catalog();
    let path = temp.path().join("records.jsonl");
    let lines = [
        json!({"kind": "chunk", "file_path": "a.md", "position": 0, "content": "alpha", "embedding": [1.0, 0.0, 0.0, 0.0]}),
        json!({"kind": "chunk", "file_path": "b.md", "position": 0, "content": "beta", "embedding": [0.0, 1.0, 0.0, 0.0]}),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n");
    std::fs::write(&path, lines).unwrap();

    let reader = std::io::BufReader::new(std::fs::File::open(&path).unwrap());
    let batch = quarry::store::ImportBatch::read(reader, Path::new(&path)).unwrap();
    let spec = batch.infer_spec(None, None).unwrap();
    let store = catalog.create("imported", spec).unwrap();
    batch.apply(&store).unwrap();

    let stores: Vec<Arc<dyn VectorStore>> = vec![catalog.open("imported").unwrap()];
    let response = run("beta", &QueryVectors::text(axis(1, DIM)), &stores, &options());
    assert_eq!(response.results[0].file_path, "b.md");
    assert_eq!(response.results[0].content, "beta");
}
