//! Multi-index search entry point.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapter::AdapterRegistry;
use crate::error::RetrievalResult;
use crate::search::fusion::{fuse_hybrid, fuse_text, fuse_vision};
use crate::search::hybrid::search_index;
use crate::search::maxsim::search_vision_index;
use crate::search::types::{QueryVectors, SearchMode, SearchOptions, SearchResponse, SearchResult};
use crate::store::{IndexCatalog, VectorStore, get_utc_timestamp_ms};
use crate::vector::Embedding;

/// Minimum per-index candidate count fed to hybrid fusion.
const HYBRID_MIN_CANDIDATES: usize = 30;

/// Runs searches over named indexes with query vectors from registered adapters.
pub struct SearchEngine<'a> {
    catalog: &'a IndexCatalog,
    adapters: &'a AdapterRegistry,
}

impl<'a> SearchEngine<'a> {
    pub fn new(catalog: &'a IndexCatalog, adapters: &'a AdapterRegistry) -> Self {
        Self { catalog, adapters }
    }

    /// Searches `index_names` for `query_text`.
    ///
    /// Indexes that are missing or fail to open are reported in
    /// [`SearchResponse::warnings`] and the remaining indexes are searched.
    /// The query is embedded once per model id in use.
    pub fn search<S: AsRef<str>>(
        &self,
        query_text: &str,
        index_names: &[S],
        opts: &SearchOptions,
    ) -> RetrievalResult<SearchResponse> {
        opts.validate()?;

        let (opened, failures) = self.catalog.open_many(index_names);
        let mut warnings: Vec<String> = failures
            .into_iter()
            .map(|(name, e)| format!("skipped index '{name}': {e}"))
            .collect();

        let mut stores: Vec<Arc<dyn VectorStore>> = Vec::with_capacity(opened.len());
        for store in opened {
            if self.has_adapter(store.as_ref(), opts.mode) {
                stores.push(store);
            } else {
                skip(
                    &mut warnings,
                    format!(
                        "skipped index '{}': no registered adapter for its embedding model",
                        store.name()
                    ),
                );
            }
        }
        let vectors = self.embed_query(query_text, &stores, opts.mode)?;

        let mut response = Self::search_with_vectors(query_text, &vectors, &stores, opts)?;
        warnings.append(&mut response.warnings);
        response.warnings = warnings;
        Ok(response)
    }

    /// Whether some lane of `store` searched in `mode` has an adapter.
    fn has_adapter(&self, store: &dyn VectorStore, mode: SearchMode) -> bool {
        let text = mode.uses_text()
            && store.text_dimension().is_some()
            && self.adapters.text(store.text_model()).is_some();
        let vision = mode.uses_vision()
            && store.page_dimension().is_some()
            && self.adapters.vision(store.vision_model()).is_some();
        text || vision
    }

    /// Embeds `query_text` with the adapter of every model the stores use.
    fn embed_query(
        &self,
        query_text: &str,
        stores: &[Arc<dyn VectorStore>],
        mode: SearchMode,
    ) -> RetrievalResult<QueryVectors> {
        let mut vectors = QueryVectors::default();
        let mut text_cache: HashMap<String, Embedding> = HashMap::new();
        let mut vision_cache: HashMap<String, Vec<Embedding>> = HashMap::new();

        for store in stores {
            if mode.uses_text() && store.text_dimension().is_some() {
                let model = store.text_model();
                if let Some(adapter) = self.adapters.text(model) {
                    let id = adapter.model_id().to_string();
                    if !text_cache.contains_key(&id) {
                        let embedding = adapter.embed_query(query_text)?;
                        vectors = match model {
                            Some(m) => vectors.with_text_for(m, embedding.clone()),
                            None => vectors.with_text(embedding.clone()),
                        };
                        text_cache.insert(id, embedding);
                    } else if model.is_none() && vectors.text_for(None).is_none() {
                        vectors = vectors.with_text(text_cache[&id].clone());
                    }
                }
            }

            if mode.uses_vision() && store.page_dimension().is_some() {
                let model = store.vision_model();
                if let Some(adapter) = self.adapters.vision(model) {
                    let id = adapter.model_id().to_string();
                    if !vision_cache.contains_key(&id) {
                        let query = adapter.embed_query(query_text)?;
                        vectors = match model {
                            Some(m) => vectors.with_vision_for(m, query.clone()),
                            None => vectors.with_vision(query.clone()),
                        };
                        vision_cache.insert(id, query);
                    } else if model.is_none() && vectors.vision_for(None).is_none() {
                        vectors = vectors.with_vision(vision_cache[&id].clone());
                    }
                }
            }
        }
        Ok(vectors)
    }

    /// Searches `stores` with precomputed query vectors.
    ///
    /// A store without a matching query vector, or whose dimension differs
    /// from it, is skipped with a warning. Results are fused per
    /// `opts.mode`; an empty corpus yields an empty response.
    pub fn search_with_vectors(
        query_text: &str,
        vectors: &QueryVectors,
        stores: &[Arc<dyn VectorStore>],
        opts: &SearchOptions,
    ) -> RetrievalResult<SearchResponse> {
        opts.validate()?;

        let mut warnings = Vec::new();
        if opts.top_k == 0 {
            return Ok(SearchResponse { results: Vec::new(), warnings });
        }

        // One clock reading for every index in this call.
        let opts = SearchOptions {
            now_ms: Some(opts.now_ms.unwrap_or_else(get_utc_timestamp_ms)),
            ..opts.clone()
        };
        let per_index = match opts.mode {
            SearchMode::Hybrid => (opts.top_k * 3).max(HYBRID_MIN_CANDIDATES),
            SearchMode::Text | SearchMode::Vision => opts.top_k,
        };

        let text_results = if opts.mode.uses_text() {
            text_lane(query_text, vectors, stores, per_index, &opts, &mut warnings)
        } else {
            Vec::new()
        };
        let vision_results = if opts.mode.uses_vision() {
            vision_lane(vectors, stores, per_index, &mut warnings)
        } else {
            Vec::new()
        };

        let results = match opts.mode {
            SearchMode::Text => fuse_text(text_results, opts.threshold, opts.top_k),
            SearchMode::Vision => fuse_vision(vision_results, opts.threshold, opts.top_k),
            SearchMode::Hybrid => {
                fuse_hybrid(text_results, vision_results, opts.threshold, opts.top_k)
            }
        };
        debug!(
            "{} search over {} indexes returned {} results",
            opts.mode,
            stores.len(),
            results.len()
        );
        Ok(SearchResponse { results, warnings })
    }
}

fn skip(warnings: &mut Vec<String>, message: String) {
    warn!("{message}");
    warnings.push(message);
}

fn text_lane(
    query_text: &str,
    vectors: &QueryVectors,
    stores: &[Arc<dyn VectorStore>],
    per_index: usize,
    opts: &SearchOptions,
    warnings: &mut Vec<String>,
) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for store in stores {
        let Some(dimension) = store.text_dimension() else {
            debug!("index '{}' has no text lane", store.name());
            continue;
        };
        let Some(query) = vectors.text_for(store.text_model()) else {
            skip(
                warnings,
                format!("skipped index '{}': no text query vector for its model", store.name()),
            );
            continue;
        };
        if query.len() != dimension.get() {
            skip(
                warnings,
                format!(
                    "skipped index '{}': query has {} dimensions, index stores {}",
                    store.name(),
                    query.len(),
                    dimension.get()
                ),
            );
            continue;
        }
        match search_index(store.as_ref(), query, query_text, per_index, opts) {
            Ok(mut found) => results.append(&mut found),
            Err(e) => skip(warnings, format!("skipped index '{}': {e}", store.name())),
        }
    }
    results
}

fn vision_lane(
    vectors: &QueryVectors,
    stores: &[Arc<dyn VectorStore>],
    per_index: usize,
    warnings: &mut Vec<String>,
) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for store in stores {
        let Some(dimension) = store.page_dimension() else {
            debug!("index '{}' has no vision lane", store.name());
            continue;
        };
        let Some(query) = vectors.vision_for(store.vision_model()) else {
            skip(
                warnings,
                format!("skipped index '{}': no vision query vectors for its model", store.name()),
            );
            continue;
        };
        if let Some(bad) = query.iter().find(|q| q.len() != dimension.get()) {
            skip(
                warnings,
                format!(
                    "skipped index '{}': query vectors have {} dimensions, index stores {}",
                    store.name(),
                    bad.len(),
                    dimension.get()
                ),
            );
            continue;
        }
        match search_vision_index(store.as_ref(), query, per_index) {
            Ok(pages) => results.extend(
                pages
                    .into_iter()
                    .map(|page| page.into_search_result(store.name())),
            ),
            Err(e) => skip(warnings, format!("skipped index '{}': {e}", store.name())),
        }
    }
    results
}
