//! The shipped [`VectorStore`]: one index directory, or an in-memory twin.
//!
//! # Directory Layout
//!
//! ```text
//! <root>/<name>/
//!   index.json       IndexMetadata
//!   chunks.jsonl     one ChunkRow per line
//!   embeddings.vec   chunk embeddings (see vector::EmbeddingFile)
//!   pages.jsonl      one page row per line
//!   patches.bin      u32 page id, u32 byte length, LE f32 blob
//!   lexical/         tantivy index
//!   ann.bin          ANN snapshot, if built
//! ```
//!
//! Everything except the tantivy index is loaded into memory on open.
//! Writes append to the files and then publish new in-memory snapshots, so
//! searches never observe a half-applied batch.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ann::AnnState;
use crate::error::{ErrorContext, StoreError, StoreResult};
use crate::store::lexical::LexicalIndex;
use crate::store::metadata::IndexMetadata;
use crate::store::{
    ChunkRow, LexicalHit, NewChunk, NewPage, Page, StoredVector, VectorStore, calculate_hash,
};
use crate::vector::{
    ChunkId, EmbeddingFile, PageId, VectorDimension, VectorError, decode_multi, encode_multi,
};

const CHUNKS_FILE: &str = "chunks.jsonl";
const EMBEDDINGS_FILE: &str = "embeddings.vec";
const PAGES_FILE: &str = "pages.jsonl";
const PATCHES_FILE: &str = "patches.bin";
const LEXICAL_DIR: &str = "lexical";
const ANN_FILE: &str = "ann.bin";

/// Lanes and models an index is created with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub text_dimension: Option<usize>,
    pub page_dimension: Option<usize>,
    pub text_model: Option<String>,
    pub vision_model: Option<String>,
}

impl IndexSpec {
    /// A text-only index with chunk embeddings of `dimension`.
    #[must_use]
    pub fn text(dimension: usize) -> Self {
        Self {
            text_dimension: Some(dimension),
            ..Self::default()
        }
    }

    /// A vision-only index with patch vectors of `dimension`.
    #[must_use]
    pub fn vision(dimension: usize) -> Self {
        Self {
            page_dimension: Some(dimension),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_page_dimension(mut self, dimension: usize) -> Self {
        self.page_dimension = Some(dimension);
        self
    }

    #[must_use]
    pub fn with_text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = Some(model.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PageRow {
    id: PageId,
    file_path: String,
    page_number: u32,
}

#[derive(Debug)]
struct ChunkTable {
    rows: Vec<ChunkRow>,
    positions: HashMap<ChunkId, usize>,
    vectors: Arc<[StoredVector]>,
}

impl ChunkTable {
    fn new(rows: Vec<ChunkRow>, vectors: Vec<StoredVector>) -> Self {
        let positions = rows.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
        Self {
            rows,
            positions,
            vectors: vectors.into(),
        }
    }
}

/// A named index of chunks and pages.
#[derive(Debug)]
pub struct IndexStore {
    name: String,
    dir: Option<PathBuf>,
    spec: IndexSpec,
    text_dimension: Option<VectorDimension>,
    page_dimension: Option<VectorDimension>,
    metadata: RwLock<IndexMetadata>,
    chunks: RwLock<ChunkTable>,
    pages: RwLock<Arc<[Page]>>,
    embeddings: Mutex<Option<EmbeddingFile>>,
    lexical: LexicalIndex,
    ann: RwLock<Option<Arc<AnnState>>>,
    build_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

fn dimensions(
    spec: &IndexSpec,
) -> StoreResult<(Option<VectorDimension>, Option<VectorDimension>)> {
    if spec.text_dimension.is_none() && spec.page_dimension.is_none() {
        return Err(VectorError::InvalidDimension {
            dimension: 0,
            reason: "An index needs a text or a page dimension",
        }
        .into());
    }
    let text = spec.text_dimension.map(VectorDimension::new).transpose()?;
    let page = spec.page_dimension.map(VectorDimension::new).transpose()?;
    Ok((text, page))
}

fn metadata_for(name: &str, spec: &IndexSpec) -> IndexMetadata {
    let mut metadata = IndexMetadata::new(name);
    metadata.text_dimension = spec.text_dimension;
    metadata.page_dimension = spec.page_dimension;
    metadata.text_model = spec.text_model.clone();
    metadata.vision_model = spec.vision_model.clone();
    metadata
}

/// Index names become directory names.
pub(crate) fn validate_name(name: &str) -> StoreResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is reserved")
    } else if name.contains(['/', '\\']) {
        Some("name contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

impl IndexStore {
    fn assemble(
        name: String,
        dir: Option<PathBuf>,
        spec: IndexSpec,
        metadata: IndexMetadata,
        lexical: LexicalIndex,
    ) -> StoreResult<Self> {
        let (text_dimension, page_dimension) = dimensions(&spec)?;
        Ok(Self {
            name,
            dir,
            spec,
            text_dimension,
            page_dimension,
            metadata: RwLock::new(metadata),
            chunks: RwLock::new(ChunkTable::new(Vec::new(), Vec::new())),
            pages: RwLock::new(Arc::from(Vec::new())),
            embeddings: Mutex::new(None),
            lexical,
            ann: RwLock::new(None),
            build_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        })
    }

    /// Creates an index that is never written to disk.
    pub fn in_memory(name: impl Into<String>, spec: IndexSpec) -> StoreResult<Self> {
        let name = name.into();
        let metadata = metadata_for(&name, &spec);
        Self::assemble(name, None, spec, metadata, LexicalIndex::in_memory()?)
    }

    /// Creates a new on-disk index at `dir`.
    pub fn create(dir: impl AsRef<Path>, name: &str, spec: IndexSpec) -> StoreResult<Self> {
        validate_name(name)?;
        let dir = dir.as_ref().to_path_buf();
        if IndexMetadata::exists(&dir) {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
                path: dir,
            });
        }
        let (text_dimension, _) = dimensions(&spec)?;

        std::fs::create_dir_all(&dir).with_path(&dir)?;
        let metadata = metadata_for(name, &spec);
        metadata.save(&dir)?;

        let embeddings = text_dimension
            .map(|d| EmbeddingFile::create(dir.join(EMBEDDINGS_FILE), d))
            .transpose()?;
        let lexical = LexicalIndex::open_or_create(&dir.join(LEXICAL_DIR))?;

        let store = Self::assemble(name.to_string(), Some(dir.clone()), spec, metadata, lexical)?;
        *store.embeddings.lock() = embeddings;
        info!("created index '{name}' at {}", dir.display());
        Ok(store)
    }

    /// Opens an existing on-disk index.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !IndexMetadata::exists(&dir) {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(StoreError::NotFound { name, path: dir });
        }

        let metadata = IndexMetadata::load(&dir)?;
        let spec = IndexSpec {
            text_dimension: metadata.text_dimension,
            page_dimension: metadata.page_dimension,
            text_model: metadata.text_model.clone(),
            vision_model: metadata.vision_model.clone(),
        };
        let lexical = LexicalIndex::open_or_create(&dir.join(LEXICAL_DIR))?;
        let store = Self::assemble(
            metadata.name.clone(),
            Some(dir.clone()),
            spec,
            metadata,
            lexical,
        )?;

        store.load_chunks(&dir)?;
        store.load_pages(&dir)?;
        store.load_ann(&dir)?;

        debug!(
            "opened index '{}': {} chunks, {} pages",
            store.name,
            store.chunk_count(),
            store.page_count()
        );
        Ok(store)
    }

    fn load_chunks(&self, dir: &Path) -> StoreResult<()> {
        let Some(dimension) = self.text_dimension else {
            return Ok(());
        };

        let rows: Vec<ChunkRow> = read_jsonl(&dir.join(CHUNKS_FILE))?;
        let file = EmbeddingFile::open_or_create(dir.join(EMBEDDINGS_FILE), dimension)?;
        let mut embeddings: HashMap<ChunkId, Vec<f32>> =
            file.read_all_vectors()?.into_iter().collect();

        let mut vectors = Vec::with_capacity(rows.len());
        for (line, row) in rows.iter().enumerate() {
            let embedding = embeddings.remove(&row.id).ok_or_else(|| StoreError::Corrupt {
                path: dir.join(CHUNKS_FILE),
                line: line + 1,
                reason: format!("chunk {} has no stored embedding", row.id),
            })?;
            vectors.push(StoredVector {
                id: row.id,
                content_timestamp: row.content_timestamp,
                embedding,
            });
        }

        if self.lexical.num_docs() == 0 && !rows.is_empty() {
            info!(
                "lexical index for '{}' is empty, reindexing {} chunks",
                self.name,
                rows.len()
            );
            self.lexical.add(&rows)?;
        }

        *self.chunks.write() = ChunkTable::new(rows, vectors);
        *self.embeddings.lock() = Some(file);
        Ok(())
    }

    fn load_pages(&self, dir: &Path) -> StoreResult<()> {
        let Some(dimension) = self.page_dimension else {
            return Ok(());
        };

        let rows: Vec<PageRow> = read_jsonl(&dir.join(PAGES_FILE))?;
        let patches_path = dir.join(PATCHES_FILE);
        let bytes = match std::fs::read(&patches_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::io(&patches_path, e)),
        };

        let corrupt = |reason: String| StoreError::CorruptFile {
            path: patches_path.clone(),
            reason,
        };
        let mut patches = HashMap::with_capacity(rows.len());
        let mut offset = 0;
        while offset < bytes.len() {
            if offset + 8 > bytes.len() {
                return Err(corrupt(format!("truncated record header at byte {offset}")));
            }
            let id = u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]);
            let len = u32::from_le_bytes([
                bytes[offset + 4],
                bytes[offset + 5],
                bytes[offset + 6],
                bytes[offset + 7],
            ]) as usize;
            let start = offset + 8;
            let end = start + len;
            if end > bytes.len() {
                return Err(corrupt(format!("truncated patch blob for page {id}")));
            }
            let id =
                PageId::new(id).ok_or_else(|| corrupt("record with zero page id".to_string()))?;
            patches.insert(id, decode_multi(&bytes[start..end], dimension.get())?);
            offset = end;
        }

        let pages: Vec<Page> = rows
            .into_iter()
            .map(|row| Page {
                patches: patches.remove(&row.id).unwrap_or_default(),
                id: row.id,
                file_path: row.file_path,
                page_number: row.page_number,
            })
            .collect();

        *self.pages.write() = pages.into();
        Ok(())
    }

    fn load_ann(&self, dir: &Path) -> StoreResult<()> {
        let path = dir.join(ANN_FILE);
        if !path.exists() {
            return Ok(());
        }

        let state = AnnState::load(&path)?;
        if Some(state.dimension()) != self.text_dimension.map(|d| d.get()) {
            return Err(StoreError::CorruptFile {
                path,
                reason: format!(
                    "ANN dimension {} does not match index dimension {:?}",
                    state.dimension(),
                    self.spec.text_dimension
                ),
            });
        }
        *self.ann.write() = Some(Arc::new(state));
        Ok(())
    }

    /// Appends chunks, assigning ids sequentially after the last one.
    pub fn add_chunks(&self, chunks: Vec<NewChunk>) -> StoreResult<Vec<ChunkId>> {
        let dimension = self.text_dimension.ok_or_else(|| StoreError::MissingLane {
            index: self.name.clone(),
            lane: "text",
        })?;
        for chunk in &chunks {
            dimension.validate_vector(&chunk.embedding)?;
        }
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let _write = self.write_lock.lock();
        let first_id = self.chunks.read().rows.len() as u32 + 1;

        let mut rows = Vec::with_capacity(chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len());
        for (offset, chunk) in chunks.into_iter().enumerate() {
            let id = ChunkId::new_unchecked(first_id + offset as u32);
            rows.push(ChunkRow {
                id,
                content_hash: calculate_hash(&chunk.content),
                file_path: chunk.file_path,
                position: chunk.position,
                content: chunk.content,
                section: chunk.section,
                content_timestamp: chunk.content_timestamp,
                metadata: chunk.metadata.map(|m| m.to_string()),
            });
            vectors.push(StoredVector {
                id,
                content_timestamp: chunk.content_timestamp,
                embedding: chunk.embedding,
            });
        }

        if let Some(dir) = &self.dir {
            append_jsonl(&dir.join(CHUNKS_FILE), &rows)?;
            let mut embeddings = self.embeddings.lock();
            if let Some(file) = embeddings.as_mut() {
                let batch: Vec<(ChunkId, &[f32])> = vectors
                    .iter()
                    .map(|v| (v.id, v.embedding.as_slice()))
                    .collect();
                file.write_batch(&batch)?;
            }
        }
        self.lexical.add(&rows)?;

        let ids: Vec<ChunkId> = rows.iter().map(|r| r.id).collect();
        {
            let mut table = self.chunks.write();
            let mut all_vectors = table.vectors.to_vec();
            all_vectors.extend(vectors);
            for row in rows {
                let at = table.rows.len();
                table.positions.insert(row.id, at);
                table.rows.push(row);
            }
            table.vectors = all_vectors.into();
        }

        self.touch_metadata()?;
        debug!("added {} chunks to '{}'", ids.len(), self.name);
        Ok(ids)
    }

    /// Appends rendered pages, assigning ids sequentially after the last one.
    pub fn add_pages(&self, pages: Vec<NewPage>) -> StoreResult<Vec<PageId>> {
        let dimension = self.page_dimension.ok_or_else(|| StoreError::MissingLane {
            index: self.name.clone(),
            lane: "vision",
        })?;
        for page in &pages {
            for patch in &page.patches {
                dimension.validate_vector(patch)?;
            }
        }
        if pages.is_empty() {
            return Ok(Vec::new());
        }

        let _write = self.write_lock.lock();
        let first_id = self.pages.read().len() as u32 + 1;
        let new_pages: Vec<Page> = pages
            .into_iter()
            .enumerate()
            .map(|(offset, page)| Page {
                id: PageId::new_unchecked(first_id + offset as u32),
                file_path: page.file_path,
                page_number: page.page_number,
                patches: page.patches,
            })
            .collect();

        if let Some(dir) = &self.dir {
            let rows: Vec<PageRow> = new_pages
                .iter()
                .map(|p| PageRow {
                    id: p.id,
                    file_path: p.file_path.clone(),
                    page_number: p.page_number,
                })
                .collect();
            append_jsonl(&dir.join(PAGES_FILE), &rows)?;

            let path = dir.join(PATCHES_FILE);
            let mut buffer = Vec::new();
            for page in &new_pages {
                let blob = encode_multi(&page.patches);
                buffer.extend_from_slice(&page.id.get().to_le_bytes());
                buffer.extend_from_slice(&(blob.len() as u32).to_le_bytes());
                buffer.extend_from_slice(&blob);
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_path(&path)?;
            file.write_all(&buffer).with_path(&path)?;
        }

        let ids = new_pages.iter().map(|p| p.id).collect();
        {
            let mut current = self.pages.write();
            let mut all = current.to_vec();
            all.extend(new_pages);
            *current = all.into();
        }

        self.touch_metadata()?;
        Ok(ids)
    }

    fn touch_metadata(&self) -> StoreResult<()> {
        let chunk_count = self.chunk_count();
        let page_count = self.page_count();
        let mut metadata = self.metadata.write();
        metadata.update(chunk_count, page_count);
        if let Some(dir) = &self.dir {
            metadata.save(dir)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }

    /// Snapshot of the index metadata.
    #[must_use]
    pub fn metadata(&self) -> IndexMetadata {
        self.metadata.read().clone()
    }

    #[must_use]
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Directory backing this index, `None` for in-memory stores.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

impl VectorStore for IndexStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn text_dimension(&self) -> Option<VectorDimension> {
        self.text_dimension
    }

    fn page_dimension(&self) -> Option<VectorDimension> {
        self.page_dimension
    }

    fn text_model(&self) -> Option<&str> {
        self.spec.text_model.as_deref()
    }

    fn vision_model(&self) -> Option<&str> {
        self.spec.vision_model.as_deref()
    }

    fn chunk_count(&self) -> usize {
        self.chunks.read().rows.len()
    }

    fn chunk_vectors(&self) -> StoreResult<Arc<[StoredVector]>> {
        Ok(Arc::clone(&self.chunks.read().vectors))
    }

    fn pages(&self) -> StoreResult<Arc<[Page]>> {
        Ok(Arc::clone(&self.pages.read()))
    }

    fn lexical_search(&self, tokens: &[String], limit: usize) -> StoreResult<Vec<LexicalHit>> {
        self.lexical.search(tokens, limit)
    }

    fn fetch_chunks(&self, ids: &[ChunkId]) -> StoreResult<Vec<ChunkRow>> {
        let table = self.chunks.read();
        Ok(ids
            .iter()
            .filter_map(|id| table.positions.get(id).map(|&i| table.rows[i].clone()))
            .collect())
    }

    fn ann_state(&self) -> Option<Arc<AnnState>> {
        self.ann.read().clone()
    }

    fn save_ann_state(&self, state: AnnState) -> StoreResult<()> {
        if let Some(dimension) = self.text_dimension {
            if state.num_clusters() > 0 && state.dimension() != dimension.get() {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension.get(),
                    actual: state.dimension(),
                }
                .into());
            }
        }

        if let Some(dir) = &self.dir {
            state.save(&dir.join(ANN_FILE))?;
        }
        *self.ann.write() = Some(Arc::new(state));
        Ok(())
    }

    fn ann_build_lock(&self) -> &Mutex<()> {
        &self.build_lock
    }
}

fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> StoreResult<Vec<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} is missing, treating as empty", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut items = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_path(path)?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: i + 1,
            reason: e.to_string(),
        })?;
        items.push(item);
    }
    Ok(items)
}

fn append_jsonl<T: Serialize>(path: &Path, items: &[T]) -> StoreResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_path(path)?;
    let mut writer = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut writer, item).map_err(|e| StoreError::io(path, e.into()))?;
        writer.write_all(b"\n").with_path(path)?;
    }
    writer.flush().with_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(path: &str, position: u32, content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            file_path: path.to_string(),
            position,
            content: content.to_string(),
            section: None,
            content_timestamp: Some(1_700_000_000_000),
            metadata: Some(serde_json::json!({"status": "open"})),
            embedding,
        }
    }

    #[test]
    fn test_add_and_fetch_chunks() {
        let store = IndexStore::in_memory("mem", IndexSpec::text(2)).unwrap();
        let ids = store
            .add_chunks(vec![
                chunk("a.md", 0, "alpha", vec![1.0, 0.0]),
                chunk("a.md", 1, "beta", vec![0.0, 1.0]),
            ])
            .unwrap();

        assert_eq!(ids.iter().map(|i| i.get()).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.chunk_count(), 2);

        let rows = store.fetch_chunks(&[ids[1], ChunkId::new(99).unwrap(), ids[0]]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].content, "beta");
        assert_eq!(rows[1].content, "alpha");
        assert_eq!(rows[0].content_hash, calculate_hash("beta"));
        assert_eq!(rows[0].metadata.as_deref(), Some(r#"{"status":"open"}"#));

        let more = store.add_chunks(vec![chunk("b.md", 0, "gamma", vec![0.5, 0.5])]).unwrap();
        assert_eq!(more[0].get(), 3);
        assert_eq!(store.chunk_vectors().unwrap().len(), 3);
    }

    #[test]
    fn test_positions_follow_appended_batches() {
        let store = IndexStore::in_memory("mem", IndexSpec::text(2)).unwrap();
        let first = store
            .add_chunks(vec![
                chunk("a.md", 0, "one", vec![1.0, 0.0]),
                chunk("a.md", 1, "two", vec![0.0, 1.0]),
            ])
            .unwrap();
        let second = store
            .add_chunks(vec![
                chunk("b.md", 0, "three", vec![0.6, 0.8]),
                chunk("b.md", 1, "four", vec![0.8, 0.6]),
            ])
            .unwrap();

        let wanted = [second[1], first[0], second[0], first[1]];
        let rows = store.fetch_chunks(&wanted).unwrap();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["four", "one", "three", "two"]);
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), wanted.to_vec());
    }

    #[test]
    fn test_rejects_wrong_dimension_and_missing_lane() {
        let store = IndexStore::in_memory("mem", IndexSpec::text(2)).unwrap();
        assert!(store.add_chunks(vec![chunk("a.md", 0, "x", vec![1.0])]).is_err());
        assert_eq!(store.chunk_count(), 0);

        let page = NewPage {
            file_path: "a.pdf".to_string(),
            page_number: 1,
            patches: vec![vec![1.0]],
        };
        assert!(matches!(
            store.add_pages(vec![page]),
            Err(StoreError::MissingLane { lane: "vision", .. })
        ));
    }

    #[test]
    fn test_spec_without_lanes_is_rejected() {
        assert!(IndexStore::in_memory("mem", IndexSpec::default()).is_err());
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("docs-2024").is_ok());
    }

    #[test]
    fn test_on_disk_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("notes");
        let spec = IndexSpec::text(2).with_page_dimension(3).with_text_model("m");

        {
            let store = IndexStore::create(&dir, "notes", spec.clone()).unwrap();
            store
                .add_chunks(vec![
                    chunk("a.md", 0, "persistent alpha", vec![1.0, 0.0]),
                    chunk("a.md", 1, "persistent beta", vec![0.0, 1.0]),
                ])
                .unwrap();
            store
                .add_pages(vec![NewPage {
                    file_path: "a.pdf".to_string(),
                    page_number: 4,
                    patches: vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
                }])
                .unwrap();
        }

        let store = IndexStore::open(&dir).unwrap();
        assert_eq!(store.name(), "notes");
        assert_eq!(store.spec(), &spec);
        assert_eq!(store.chunk_count(), 2);
        assert_eq!(store.text_model(), Some("m"));
        assert_eq!(store.metadata().chunk_count, 2);

        let vectors = store.chunk_vectors().unwrap();
        assert_eq!(vectors[1].embedding, vec![0.0, 1.0]);

        let pages = store.pages().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 4);
        assert_eq!(pages[0].patches.len(), 2);

        let hits = store.lexical_search(&["beta".to_string()], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.get(), 2);
    }

    #[test]
    fn test_create_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("dup");
        IndexStore::create(&dir, "dup", IndexSpec::text(2)).unwrap();
        assert!(matches!(
            IndexStore::create(&dir, "dup", IndexSpec::text(2)),
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_open_missing_index() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            IndexStore::open(temp_dir.path().join("nope")),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_corrupt_chunk_line_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("bad");
        {
            let store = IndexStore::create(&dir, "bad", IndexSpec::text(2)).unwrap();
            store.add_chunks(vec![chunk("a.md", 0, "x", vec![1.0, 0.0])]).unwrap();
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.join(CHUNKS_FILE))
            .unwrap();
        writeln!(file, "{{ not json").unwrap();

        match IndexStore::open(&dir) {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected corrupt error, got {other:?}"),
        }
    }

    #[test]
    fn test_lexical_index_rebuilt_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("relex");
        {
            let store = IndexStore::create(&dir, "relex", IndexSpec::text(2)).unwrap();
            store.add_chunks(vec![chunk("a.md", 0, "recoverable", vec![1.0, 0.0])]).unwrap();
        }
        std::fs::remove_dir_all(dir.join(LEXICAL_DIR)).unwrap();

        let store = IndexStore::open(&dir).unwrap();
        let hits = store.lexical_search(&["recoverable".to_string()], 10).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
