//! Named indexes under one root directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::ann::{AnnBuildOptions, AnnBuildReport, AnnStatus, build_ann_index};
use crate::error::{ErrorContext, RetrievalResult, StoreError, StoreResult};
use crate::store::index::{IndexSpec, IndexStore, validate_name};
use crate::store::metadata::IndexMetadata;
use crate::store::VectorStore;

/// Resolves index names to stores living in `<root>/<name>/`.
///
/// Opened stores are cached, so every caller shares one in-memory snapshot
/// (and one ANN state) per index.
#[derive(Debug)]
pub struct IndexCatalog {
    root: PathBuf,
    open: DashMap<String, Arc<IndexStore>>,
}

impl IndexCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: DashMap::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory an index with `name` lives in.
    #[must_use]
    pub fn index_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Opens an index, reusing a cached store when one is loaded.
    pub fn open(&self, name: &str) -> StoreResult<Arc<IndexStore>> {
        if let Some(store) = self.open.get(name) {
            return Ok(Arc::clone(store.value()));
        }
        validate_name(name)?;

        let dir = self.index_dir(name);
        if !IndexMetadata::exists(&dir) {
            return Err(StoreError::NotFound {
                name: name.to_string(),
                path: dir,
            });
        }

        let store = Arc::new(IndexStore::open(&dir)?);
        debug!("cached index '{name}'");
        Ok(Arc::clone(
            self.open.entry(name.to_string()).or_insert(store).value(),
        ))
    }

    /// Opens every named index that can be opened.
    ///
    /// Indexes that are missing or fail to open are returned alongside the
    /// error instead of failing the whole call.
    pub fn open_many<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> (Vec<Arc<IndexStore>>, Vec<(String, StoreError)>) {
        let mut stores = Vec::with_capacity(names.len());
        let mut failures = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.open(name) {
                Ok(store) => stores.push(store),
                Err(e) => {
                    warn!("skipping index '{name}': {e}");
                    failures.push((name.to_string(), e));
                }
            }
        }
        (stores, failures)
    }

    /// Creates a new on-disk index.
    pub fn create(&self, name: &str, spec: IndexSpec) -> StoreResult<Arc<IndexStore>> {
        let store = Arc::new(IndexStore::create(self.index_dir(name), name, spec)?);
        self.open.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Opens `name`, creating it with `spec` if it does not exist yet.
    pub fn open_or_create(&self, name: &str, spec: IndexSpec) -> StoreResult<Arc<IndexStore>> {
        match self.open(name) {
            Err(StoreError::NotFound { .. }) => self.create(name, spec),
            other => other,
        }
    }

    /// Registers an already constructed store, e.g. an in-memory one.
    pub fn insert(&self, store: IndexStore) -> Arc<IndexStore> {
        let store = Arc::new(store);
        self.open
            .insert(store.name().to_string(), Arc::clone(&store));
        store
    }

    /// Names of all indexes on disk, sorted.
    pub fn list(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        if self.root.exists() {
            for entry in std::fs::read_dir(&self.root).with_path(&self.root)? {
                let entry = entry.with_path(&self.root)?;
                let path = entry.path();
                if path.is_dir() && IndexMetadata::exists(&path) {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        for entry in &self.open {
            if !names.contains(entry.key()) {
                names.push(entry.key().clone());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Builds the ANN index for `name`.
    pub fn build_ann(
        &self,
        name: &str,
        options: &AnnBuildOptions,
    ) -> RetrievalResult<AnnBuildReport> {
        let store = self.open(name)?;
        build_ann_index(store.as_ref(), options)
    }

    /// Status of the ANN index for `name`, `None` when none has been built.
    pub fn ann_status(&self, name: &str) -> RetrievalResult<Option<AnnStatus>> {
        let store = self.open(name)?;
        Ok(store.ann_state().map(|state| state.status()))
    }
}
