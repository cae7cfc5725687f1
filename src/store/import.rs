//! Loading pre-embedded records from JSON lines.
//!
//! Each line is one record tagged by `kind`:
//!
//! ```text
//! {"kind":"chunk","file_path":"a.md","position":0,"content":"...","embedding":[...]}
//! {"kind":"page","file_path":"deck.pdf","page_number":1,"patches":[[...],[...]]}
//! ```

use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::store::index::{IndexSpec, IndexStore};
use crate::store::{NewChunk, NewPage};

/// Records appended per store call.
const IMPORT_BATCH: usize = 1024;

/// One line of an import file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImportRecord {
    Chunk(NewChunk),
    Page(NewPage),
}

/// Parsed contents of an import file.
#[derive(Debug, Default)]
pub struct ImportBatch {
    pub chunks: Vec<NewChunk>,
    pub pages: Vec<NewPage>,
}

/// Counts of records added by [`ImportBatch::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub chunks: usize,
    pub pages: usize,
}

impl ImportBatch {
    /// Parses JSON lines; blank lines are skipped.
    ///
    /// # Errors
    /// [`StoreError::Corrupt`] with the 1-based line number of the first
    /// record that does not parse.
    pub fn read(reader: impl BufRead, path: &Path) -> StoreResult<Self> {
        let mut batch = Self::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| StoreError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ImportRecord =
                serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                    path: path.to_path_buf(),
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            match record {
                ImportRecord::Chunk(chunk) => batch.chunks.push(chunk),
                ImportRecord::Page(page) => batch.pages.push(page),
            }
        }
        Ok(batch)
    }

    /// Index spec matching the records: dimensions from the first chunk and
    /// the first page patch, unless given explicitly.
    ///
    /// Returns `None` when no lane dimension can be determined.
    pub fn infer_spec(
        &self,
        text_dim: Option<usize>,
        page_dim: Option<usize>,
    ) -> Option<IndexSpec> {
        let text_dimension = text_dim.or_else(|| self.chunks.first().map(|c| c.embedding.len()));
        let page_dimension = page_dim.or_else(|| {
            self.pages
                .iter()
                .flat_map(|p| p.patches.first())
                .map(Vec::len)
                .next()
        });
        if text_dimension.is_none() && page_dimension.is_none() {
            return None;
        }
        Some(IndexSpec {
            text_dimension,
            page_dimension,
            text_model: None,
            vision_model: None,
        })
    }

    /// Appends every record to `store` in batches.
    pub fn apply(self, store: &IndexStore) -> StoreResult<ImportSummary> {
        let summary = ImportSummary {
            chunks: self.chunks.len(),
            pages: self.pages.len(),
        };

        let mut chunks = self.chunks.into_iter().peekable();
        while chunks.peek().is_some() {
            store.add_chunks(chunks.by_ref().take(IMPORT_BATCH).collect())?;
        }
        let mut pages = self.pages.into_iter().peekable();
        while pages.peek().is_some() {
            store.add_pages(pages.by_ref().take(IMPORT_BATCH).collect())?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VectorStore;

    const SAMPLE: &str = r#"{"kind":"chunk","file_path":"a.md","position":0,"content":"alpha","embedding":[1.0,0.0],"metadata":{"team":"core"}}

{"kind":"page","file_path":"deck.pdf","page_number":1,"patches":[[0.0,1.0,0.0]]}
{"kind":"chunk","file_path":"a.md","position":1,"content":"beta","content_timestamp":1700000000000,"embedding":[0.0,1.0]}
"#;

    #[test]
    fn test_read_and_apply() {
        let batch = ImportBatch::read(SAMPLE.as_bytes(), Path::new("sample.jsonl")).unwrap();
        assert_eq!(batch.chunks.len(), 2);
        assert_eq!(batch.pages.len(), 1);
        assert_eq!(batch.chunks[1].content_timestamp, Some(1_700_000_000_000));

        let spec = batch.infer_spec(None, None).unwrap();
        assert_eq!(spec.text_dimension, Some(2));
        assert_eq!(spec.page_dimension, Some(3));

        let store = IndexStore::in_memory("imported", spec).unwrap();
        let summary = batch.apply(&store).unwrap();
        assert_eq!(summary, ImportSummary { chunks: 2, pages: 1 });
        assert_eq!(store.chunk_count(), 2);
        assert_eq!(store.pages().unwrap().len(), 1);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let input = "{\"kind\":\"chunk\",\"file_path\":\"a\",\"position\":0,\"content\":\"x\",\"embedding\":[1.0]}\n{\"kind\":\"bogus\"}\n";
        let err = ImportBatch::read(input.as_bytes(), Path::new("bad.jsonl")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 2, .. }));
    }

    #[test]
    fn test_infer_spec_needs_a_lane() {
        assert!(ImportBatch::default().infer_spec(None, None).is_none());
        let spec = ImportBatch::default().infer_spec(Some(8), None).unwrap();
        assert_eq!(spec.text_dimension, Some(8));
    }
}
