//! ANN build and candidate selection over a persisted index.
//!
//! 150 chunks in three tight clusters of 50 along distinct axes.

use std::collections::HashSet;

use quarry::ann::{AnnBuildOptions, ann_candidates, cluster_count, has_ann_index};
use quarry::store::IndexSpec;
use quarry::{ChunkId, IndexCatalog, QueryVectors, SearchEngine, SearchOptions, VectorStore};

use crate::common::{axis, clustered_chunks, temp_catalog};

const DIM: usize = 16;
const PER_CLUSTER: usize = 50;

fn build_fixture(catalog: &IndexCatalog) -> Vec<Vec<ChunkId>> {
    let store = catalog.create("corpus", IndexSpec::text(DIM)).unwrap();
    let ids = store
        .add_chunks(clustered_chunks(3, PER_CLUSTER, DIM, 11))
        .unwrap();
    ids.chunks(PER_CLUSTER).map(<[ChunkId]>::to_vec).collect()
}

fn overlap(a: &HashSet<ChunkId>, b: &HashSet<ChunkId>) -> usize {
    a.intersection(b).count()
}

#[test]
fn test_build_respects_min_chunks() {
    let (catalog, _temp) = temp_catalog();
    build_fixture(&catalog);

    let skipped = catalog
        .build_ann("corpus", &AnnBuildOptions::default().with_min_chunks(10_000))
        .unwrap();
    assert!(!skipped.built);
    assert_eq!(skipped.num_chunks, 150);
    assert!(skipped.reason.is_some());
    assert!(catalog.ann_status("corpus").unwrap().is_none());

    let built = catalog
        .build_ann("corpus", &AnnBuildOptions::default().with_min_chunks(10))
        .unwrap();
    assert!(built.built);
    assert_eq!(built.num_chunks, 150);
    assert_eq!(built.num_clusters, cluster_count(150));

    let status = catalog.ann_status("corpus").unwrap().unwrap();
    assert_eq!(status.num_chunks, 150);
    assert_eq!(status.dimension, DIM);
}

/// Number of centroids whose largest component lies on `axis`.
fn centroids_on_axis(store: &dyn VectorStore, axis: usize) -> usize {
    let state = store.ann_state().unwrap();
    state
        .centroids()
        .iter()
        .filter(|c| {
            c.iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                == Some(axis)
        })
        .count()
}

#[test]
fn test_small_nprobe_separates_clusters() {
    let (catalog, _temp) = temp_catalog();
    let clusters = build_fixture(&catalog);
    catalog
        .build_ann("corpus", &AnnBuildOptions::default().with_min_chunks(10))
        .unwrap();
    let store = catalog.open("corpus").unwrap();

    // ceil(sqrt(150)) = 13 centroids over three natural groups, so one
    // probe returns a share of cluster 0 rather than all 50 of its chunks.
    let near_zero = ann_candidates(store.as_ref(), &axis(0, DIM), 1).unwrap();
    let near_one = ann_candidates(store.as_ref(), &axis(1, DIM), 1).unwrap();

    let cluster_zero: HashSet<ChunkId> = clusters[0].iter().copied().collect();
    assert!((1..=PER_CLUSTER).contains(&near_zero.len()));
    assert!(near_zero.is_subset(&cluster_zero));
    assert_eq!(overlap(&near_zero, &near_one), 0);
}

#[test]
fn test_probing_covering_centroids_returns_whole_cluster() {
    let (catalog, _temp) = temp_catalog();
    let clusters = build_fixture(&catalog);
    catalog
        .build_ann("corpus", &AnnBuildOptions::default().with_min_chunks(10))
        .unwrap();
    let store = catalog.open("corpus").unwrap();

    let covering = centroids_on_axis(store.as_ref(), 0);
    assert!((1..cluster_count(150)).contains(&covering));

    let candidates = ann_candidates(store.as_ref(), &axis(0, DIM), covering).unwrap();
    let cluster_zero: HashSet<ChunkId> = clusters[0].iter().copied().collect();
    assert_eq!(candidates.len(), PER_CLUSTER);
    assert_eq!(candidates, cluster_zero);
}

#[test]
fn test_candidates_grow_with_nprobe() {
    let (catalog, _temp) = temp_catalog();
    build_fixture(&catalog);
    let report = catalog
        .build_ann("corpus", &AnnBuildOptions::default().with_min_chunks(10))
        .unwrap();
    let store = catalog.open("corpus").unwrap();
    let query = axis(2, DIM);

    let mut previous: HashSet<ChunkId> = HashSet::new();
    for nprobe in 1..=report.num_clusters {
        let candidates = ann_candidates(store.as_ref(), &query, nprobe).unwrap();
        assert!(candidates.is_superset(&previous), "nprobe {nprobe}");
        previous = candidates;
    }
    assert_eq!(previous.len(), 150);

    let everything = ann_candidates(store.as_ref(), &query, report.num_clusters + 5).unwrap();
    assert_eq!(everything.len(), 150);
}

#[test]
fn test_ann_index_survives_reopen() {
    let (catalog, temp) = temp_catalog();
    build_fixture(&catalog);
    catalog
        .build_ann("corpus", &AnnBuildOptions::default().with_min_chunks(10))
        .unwrap();
    let query = axis(1, DIM);
    let before = ann_candidates(catalog.open("corpus").unwrap().as_ref(), &query, 2).unwrap();
    drop(catalog);

    let reopened = IndexCatalog::new(temp.path().join("indexes"));
    let store = reopened.open("corpus").unwrap();
    assert!(has_ann_index(store.as_ref()));
    let after = ann_candidates(store.as_ref(), &query, 2).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_ann_search_matches_brute_force_top_result() {
    let (catalog, _temp) = temp_catalog();
    build_fixture(&catalog);
    catalog
        .build_ann("corpus", &AnnBuildOptions::default().with_min_chunks(10))
        .unwrap();
    let store = catalog.open("corpus").unwrap();
    let stores: Vec<std::sync::Arc<dyn VectorStore>> = vec![store];
    let vectors = QueryVectors::text(axis(0, DIM));

    let exact = SearchEngine::search_with_vectors(
        "",
        &vectors,
        &stores,
        &SearchOptions::default().with_top_k(5).with_now_ms(0),
    )
    .unwrap();
    let pruned = SearchEngine::search_with_vectors(
        "",
        &vectors,
        &stores,
        &SearchOptions::default()
            .with_top_k(5)
            .with_now_ms(0)
            .with_ann(1),
    )
    .unwrap();

    assert_eq!(exact.results.len(), 5);
    assert!(pruned.results.iter().all(|r| r.file_path == "cluster-0.md"));
    assert_eq!(exact.results[0].file_path, "cluster-0.md");
}
