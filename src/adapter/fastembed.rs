//! Local text embeddings via fastembed.

use std::path::PathBuf;
use std::sync::Mutex;

use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::adapter::TextAdapter;
use crate::error::{RetrievalError, RetrievalResult};
use crate::vector::Embedding;

/// Model names accepted by [`parse_text_model`].
pub const SUPPORTED_TEXT_MODELS: &[&str] = &[
    "AllMiniLML6V2",
    "AllMiniLML12V2",
    "BGESmallENV15",
    "BGEBaseENV15",
    "BGELargeENV15",
    "NomicEmbedTextV15",
    "MultilingualE5Small",
    "MultilingualE5Base",
];

/// Maps a configured model name to a fastembed model.
pub fn parse_text_model(name: &str) -> Option<EmbeddingModel> {
    let model = match name {
        "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
        "AllMiniLML12V2" => EmbeddingModel::AllMiniLML12V2,
        "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
        "BGEBaseENV15" => EmbeddingModel::BGEBaseENV15,
        "BGELargeENV15" => EmbeddingModel::BGELargeENV15,
        "NomicEmbedTextV15" => EmbeddingModel::NomicEmbedTextV15,
        "MultilingualE5Small" => EmbeddingModel::MultilingualE5Small,
        "MultilingualE5Base" => EmbeddingModel::MultilingualE5Base,
        _ => return None,
    };
    Some(model)
}

/// Text adapter backed by a local ONNX model.
///
/// The model is downloaded into `cache_dir` on first use. Inference needs
/// exclusive access, so calls are serialized behind a mutex.
pub struct FastEmbedTextAdapter {
    model: Mutex<TextEmbedding>,
    model_id: String,
    dimension: usize,
}

impl FastEmbedTextAdapter {
    /// Loads the model named `name`.
    ///
    /// # Errors
    /// Returns [`RetrievalError::Adapter`] for an unknown model name or when
    /// the model fails to download or initialize.
    pub fn new(
        name: &str,
        cache_dir: Option<PathBuf>,
        show_progress: bool,
    ) -> RetrievalResult<Self> {
        let fail = |reason: String| RetrievalError::Adapter {
            model_id: name.to_string(),
            reason,
        };
        let model = parse_text_model(name).ok_or_else(|| {
            fail(format!(
                "unknown model, expected one of: {}",
                SUPPORTED_TEXT_MODELS.join(", ")
            ))
        })?;

        let mut options = InitOptions::new(model).with_show_download_progress(show_progress);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        let mut embedding = TextEmbedding::try_new(options).map_err(|e| {
            fail(format!(
                "failed to initialize model: {e}. Ensure you have internet connection for first-time model download"
            ))
        })?;

        let probe = embedding
            .embed(vec!["dimension probe"], None)
            .map_err(|e| fail(format!("failed to generate probe embedding: {e}")))?;
        let dimension = probe.first().map(Vec::len).unwrap_or(0);
        info!("loaded embedding model {name} ({dimension}d)");

        Ok(Self {
            model: Mutex::new(embedding),
            model_id: name.to_string(),
            dimension,
        })
    }
}

impl TextAdapter for FastEmbedTextAdapter {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embedding_dim(&self) -> usize {
        self.dimension
    }

    fn embed_query(&self, text: &str) -> RetrievalResult<Embedding> {
        self.embed_documents(&[text])?
            .pop()
            .ok_or_else(|| RetrievalError::Adapter {
                model_id: self.model_id.clone(),
                reason: "model returned no embedding".to_string(),
            })
    }

    fn embed_documents(&self, texts: &[&str]) -> RetrievalResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let fail = |reason: String| RetrievalError::Adapter {
            model_id: self.model_id.clone(),
            reason,
        };

        let embeddings = self
            .model
            .lock()
            .map_err(|_| fail("embedding model lock is poisoned".to_string()))?
            .embed(texts.to_vec(), None)
            .map_err(|e| fail(format!("failed to generate embeddings: {e}")))?;

        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(fail(format!(
                "model produced {} dimensions, expected {}",
                bad.len(),
                self.dimension
            )));
        }
        Ok(embeddings)
    }
}
