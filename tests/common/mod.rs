#![allow(dead_code)]

use std::sync::Arc;

use quarry::store::{IndexSpec, IndexStore, NewChunk, NewPage, VectorStore};
use quarry::{ChunkId, IndexCatalog};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// Fixed clock for recency-sensitive tests: 2024-01-01T00:00:00Z.
pub const NOW_MS: i64 = 1_704_067_200_000;
pub const MS_PER_DAY: i64 = 86_400_000;

/// Unit vector along `axis` with small seeded noise on every component.
pub fn near_axis(axis: usize, dim: usize, jitter: f32, rng: &mut StdRng) -> Vec<f32> {
    (0..dim)
        .map(|i| {
            let base = if i == axis { 1.0 } else { 0.0 };
            base + rng.random_range(-jitter..=jitter)
        })
        .collect()
}

/// Plain axis vector, usable as a query.
pub fn axis(axis: usize, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

pub fn chunk(file_path: &str, position: u32, content: &str, embedding: Vec<f32>) -> NewChunk {
    NewChunk {
        file_path: file_path.to_string(),
        position,
        content: content.to_string(),
        section: None,
        content_timestamp: None,
        metadata: None,
        embedding,
    }
}

/// `clusters` tight groups of `per_cluster` chunks, group `c` near axis `c`.
pub fn clustered_chunks(
    clusters: usize,
    per_cluster: usize,
    dim: usize,
    seed: u64,
) -> Vec<NewChunk> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..clusters)
        .flat_map(|c| (0..per_cluster).map(move |i| (c, i)))
        .map(|(c, i)| {
            chunk(
                &format!("cluster-{c}.md"),
                i as u32,
                &format!("cluster {c} item {i}"),
                near_axis(c, dim, 0.02, &mut rng),
            )
        })
        .collect()
}

/// Catalog rooted in a fresh temporary directory.
pub fn temp_catalog() -> (IndexCatalog, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let catalog = IndexCatalog::new(temp_dir.path().join("indexes"));
    (catalog, temp_dir)
}

/// In-memory text index holding `chunks`, returned with the assigned ids.
pub fn text_store(
    name: &str,
    dim: usize,
    chunks: Vec<NewChunk>,
) -> (Arc<dyn VectorStore>, Vec<ChunkId>) {
    let store = IndexStore::in_memory(name, IndexSpec::text(dim)).expect("Failed to create store");
    let ids = store.add_chunks(chunks).expect("Failed to add chunks");
    (Arc::new(store), ids)
}

/// In-memory vision index holding `pages`.
pub fn vision_store(name: &str, dim: usize, pages: Vec<NewPage>) -> Arc<dyn VectorStore> {
    let store =
        IndexStore::in_memory(name, IndexSpec::vision(dim)).expect("Failed to create store");
    store.add_pages(pages).expect("Failed to add pages");
    Arc::new(store)
}

pub fn page(file_path: &str, page_number: u32, patches: Vec<Vec<f32>>) -> NewPage {
    NewPage {
        file_path: file_path.to_string(),
        page_number,
        patches,
    }
}
