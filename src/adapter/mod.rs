//! Embedding adapters and their registry.
//!
//! Adapters turn query text into vectors. They are registered once per
//! session in an [`AdapterRegistry`], which validates their output shape at
//! registration so the search path never has to.

mod fastembed;

pub use self::fastembed::{FastEmbedTextAdapter, SUPPORTED_TEXT_MODELS, parse_text_model};

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{RetrievalError, RetrievalResult};
use crate::vector::Embedding;

/// Query text used to validate an adapter's output at registration.
const PROBE_TEXT: &str = "probe";

/// Produces single-vector embeddings for text.
pub trait TextAdapter: Send + Sync {
    /// Identifier recorded in indexes embedded with this adapter.
    fn model_id(&self) -> &str;

    fn embedding_dim(&self) -> usize;

    fn embed_query(&self, text: &str) -> RetrievalResult<Embedding>;

    fn embed_documents(&self, texts: &[&str]) -> RetrievalResult<Vec<Embedding>>;
}

/// Produces multi-vector embeddings for queries and page images.
pub trait VisionAdapter: Send + Sync {
    fn model_id(&self) -> &str;

    /// Dimension of each token or patch vector.
    fn embedding_dim(&self) -> usize;

    /// One vector per query token.
    fn embed_query(&self, text: &str) -> RetrievalResult<Vec<Embedding>>;

    /// One patch-vector set per image.
    fn embed_images(&self, images: &[&Path]) -> RetrievalResult<Vec<Vec<Embedding>>>;
}

/// A registered adapter of either kind.
#[derive(Clone)]
pub enum Adapter {
    Text(Arc<dyn TextAdapter>),
    Vision(Arc<dyn VisionAdapter>),
}

impl Adapter {
    pub fn model_id(&self) -> &str {
        match self {
            Adapter::Text(a) => a.model_id(),
            Adapter::Vision(a) => a.model_id(),
        }
    }

    pub fn embedding_dim(&self) -> usize {
        match self {
            Adapter::Text(a) => a.embedding_dim(),
            Adapter::Vision(a) => a.embedding_dim(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Adapter::Text(_) => "text",
            Adapter::Vision(_) => "vision",
        }
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("kind", &self.kind())
            .field("model_id", &self.model_id())
            .field("embedding_dim", &self.embedding_dim())
            .finish()
    }
}

/// Adapters available to a search session, keyed by model id.
///
/// The first adapter of each kind is the default for indexes that record
/// no model id.
#[derive(Debug, Default, Clone)]
pub struct AdapterRegistry {
    text: Vec<Arc<dyn TextAdapter>>,
    vision: Vec<Arc<dyn VisionAdapter>>,
}

impl std::fmt::Debug for dyn TextAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TextAdapter({})", self.model_id())
    }
}

impl std::fmt::Debug for dyn VisionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VisionAdapter({})", self.model_id())
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers an adapter.
    ///
    /// # Errors
    /// - [`RetrievalError::Adapter`] for an empty model id, a zero dimension,
    ///   a failing probe or a probe of the wrong shape
    /// - [`RetrievalError::DuplicateAdapter`] if the model id is taken
    pub fn register(&mut self, adapter: Adapter) -> RetrievalResult<()> {
        let model_id = adapter.model_id().to_string();
        let invalid = |reason: String| RetrievalError::Adapter {
            model_id: model_id.clone(),
            reason,
        };

        if model_id.trim().is_empty() {
            return Err(invalid("model id is empty".to_string()));
        }
        if self.contains(&model_id) {
            return Err(RetrievalError::DuplicateAdapter { model_id });
        }
        let dim = adapter.embedding_dim();
        if dim == 0 {
            return Err(invalid("embedding dimension is 0".to_string()));
        }

        match &adapter {
            Adapter::Text(a) => {
                let probe = a.embed_query(PROBE_TEXT)?;
                if probe.len() != dim {
                    return Err(invalid(format!(
                        "probe embedding has {} dimensions, adapter declares {dim}",
                        probe.len()
                    )));
                }
            }
            Adapter::Vision(a) => {
                let probe = a.embed_query(PROBE_TEXT)?;
                if probe.is_empty() {
                    return Err(invalid("probe query produced no vectors".to_string()));
                }
                if let Some(bad) = probe.iter().find(|v| v.len() != dim) {
                    return Err(invalid(format!(
                        "probe vector has {} dimensions, adapter declares {dim}",
                        bad.len()
                    )));
                }
            }
        }

        debug!("registered {} adapter '{model_id}' ({dim}d)", adapter.kind());
        match adapter {
            Adapter::Text(a) => self.text.push(a),
            Adapter::Vision(a) => self.vision.push(a),
        }
        Ok(())
    }

    /// Whether an adapter with `model_id` is registered.
    pub fn contains(&self, model_id: &str) -> bool {
        self.text.iter().any(|a| a.model_id() == model_id)
            || self.vision.iter().any(|a| a.model_id() == model_id)
    }

    /// The text adapter for `model`, or the default one when `model` is `None`.
    pub fn text(&self, model: Option<&str>) -> Option<&Arc<dyn TextAdapter>> {
        match model {
            Some(id) => self.text.iter().find(|a| a.model_id() == id),
            None => self.text.first(),
        }
    }

    /// The vision adapter for `model`, or the default one when `model` is `None`.
    pub fn vision(&self, model: Option<&str>) -> Option<&Arc<dyn VisionAdapter>> {
        match model {
            Some(id) => self.vision.iter().find(|a| a.model_id() == id),
            None => self.vision.first(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.vision.is_empty()
    }

    /// Registered model ids, text adapters first.
    pub fn model_ids(&self) -> Vec<&str> {
        self.text
            .iter()
            .map(|a| a.model_id())
            .chain(self.vision.iter().map(|a| a.model_id()))
            .collect()
    }
}
