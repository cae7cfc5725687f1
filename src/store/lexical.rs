//! Tantivy-backed lexical index over chunk text.
//!
//! Each chunk becomes one document with its id, content and optional
//! section label. Queries are whitespace tokens OR-ed together and ranked by
//! BM25.

use std::path::Path;

use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{FAST, Field, INDEXED, STORED, Schema, TEXT, Value};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tracing::debug;

use crate::error::{ErrorContext, StoreError, StoreResult};
use crate::store::{ChunkRow, LexicalHit};
use crate::vector::ChunkId;

/// Maximum number of lexical candidates retrieved per query.
pub const LEXICAL_CANDIDATE_LIMIT: usize = 200;

/// Heap budget for the tantivy writer.
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, Clone, Copy)]
struct LexicalFields {
    chunk_id: Field,
    content: Field,
    section: Field,
}

/// Full-text index for one store.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    fields: LexicalFields,
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("num_docs", &self.num_docs())
            .finish()
    }
}

impl LexicalIndex {
    fn schema() -> (Schema, LexicalFields) {
        let mut builder = Schema::builder();
        let chunk_id = builder.add_u64_field("chunk_id", INDEXED | STORED | FAST);
        let content = builder.add_text_field("content", TEXT);
        let section = builder.add_text_field("section", TEXT);
        (
            builder.build(),
            LexicalFields {
                chunk_id,
                content,
                section,
            },
        )
    }

    /// Creates a lexical index that lives only in memory.
    pub fn in_memory() -> StoreResult<Self> {
        let (schema, fields) = Self::schema();
        Self::from_index(Index::create_in_ram(schema), fields)
    }

    /// Opens the lexical index in `dir`, creating it if absent.
    pub fn open_or_create(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir).with_path(dir)?;
        let (schema, fields) = Self::schema();
        let directory = MmapDirectory::open(dir).map_err(tantivy::TantivyError::from)?;
        let index = Index::open_or_create(directory, schema)?;
        Self::from_index(index, fields)
    }

    fn from_index(index: Index, fields: LexicalFields) -> StoreResult<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(None),
            fields,
        })
    }

    /// Indexes `rows` and commits, making them visible to searches.
    pub fn add(&self, rows: &[ChunkRow]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut guard = self.writer.lock();
        let writer = match guard.take() {
            Some(writer) => writer,
            None => self.index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?,
        };
        let writer = guard.insert(writer);

        for row in rows {
            let mut doc = TantivyDocument::default();
            doc.add_u64(self.fields.chunk_id, u64::from(row.id.get()));
            doc.add_text(self.fields.content, &row.content);
            if let Some(section) = &row.section {
                doc.add_text(self.fields.section, section);
            }
            writer.add_document(doc)?;
        }

        writer.commit()?;
        self.reader.reload()?;
        debug!("lexical index committed {} documents", rows.len());
        Ok(())
    }

    /// Runs an OR query over `tokens`, returning at most `limit` hits by
    /// descending BM25 score.
    ///
    /// Tokens are passed to the query parser as-is; syntax it rejects is
    /// reported as [`StoreError::LexicalQuery`].
    pub fn search(&self, tokens: &[String], limit: usize) -> StoreResult<Vec<LexicalHit>> {
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query_text = tokens.join(" OR ");
        let parser =
            QueryParser::for_index(&self.index, vec![self.fields.content, self.fields.section]);
        let query = parser
            .parse_query(&query_text)
            .map_err(|e| StoreError::LexicalQuery {
                query: query_text.clone(),
                reason: e.to_string(),
            })?;

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&*query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let id = doc
                .get_first(self.fields.chunk_id)
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok())
                .and_then(ChunkId::new);
            if let Some(id) = id {
                hits.push(LexicalHit { id, score });
            }
        }
        Ok(hits)
    }

    /// Number of searchable documents.
    #[must_use]
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}
