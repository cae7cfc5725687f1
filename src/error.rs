//! Error types for the retrieval engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::ann::AnnStateError;
use crate::vector::{ClusteringError, VectorError, VectorStorageError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by an index store while reading or writing its files.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Index '{name}' not found at '{path}'")]
    NotFound { name: String, path: PathBuf },

    #[error("Index '{name}' already exists at '{path}'")]
    AlreadyExists { name: String, path: PathBuf },

    #[error("Invalid index name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt record in '{path}' at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Corrupt file '{path}': {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    #[error("Index metadata error in '{path}': {reason}")]
    Metadata { path: PathBuf, reason: String },

    #[error("Lexical index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("Invalid lexical query '{query}': {reason}")]
    LexicalQuery { query: String, reason: String },

    #[error("Index '{index}' has no {lane} embeddings")]
    MissingLane { index: String, lane: &'static str },

    #[error("Embedding storage error: {0}")]
    VectorStorage(#[from] VectorStorageError),

    #[error("{0}")]
    Vector(#[from] VectorError),

    #[error("Invalid ANN snapshot: {0}")]
    AnnState(#[from] AnnStateError),
}

impl StoreError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the on-disk data cannot be trusted.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. }
                | Self::CorruptFile { .. }
                | Self::Metadata { .. }
                | Self::VectorStorage(VectorStorageError::InvalidFormat { .. })
                | Self::Vector(VectorError::InvalidBlob { .. })
                | Self::Vector(VectorError::VersionMismatch { .. })
        )
    }
}

/// Main error type for retrieval operations
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Store errors
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Coarse quantizer errors
    #[error("ANN clustering failed: {0}")]
    Clustering(#[from] ClusteringError),

    #[error("{0}")]
    Vector(#[from] VectorError),

    /// Probing requires a built ANN index
    #[error("Index '{index}' has no ANN index. Check has_ann_index before probing")]
    AnnIndexMissing { index: String },

    #[error(
        "Query embedding for index '{index}' has dimension {actual}, index stores dimension {expected}"
    )]
    QueryDimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    /// Adapter errors
    #[error("Embedding adapter '{model_id}' failed: {reason}")]
    Adapter { model_id: String, reason: String },

    #[error("No embedding adapter registered for '{model_id}'")]
    AdapterNotFound { model_id: String },

    #[error("Embedding adapter '{model_id}' is already registered")]
    DuplicateAdapter { model_id: String },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error("Invalid search options: {reason}")]
    InvalidOptions { reason: String },

    /// General errors for cases where we need to preserve existing behavior
    #[error("{0}")]
    General(String),
}

impl RetrievalError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Store(store) => match store {
                StoreError::NotFound { .. } => "INDEX_NOT_FOUND",
                StoreError::AlreadyExists { .. } => "INDEX_EXISTS",
                StoreError::InvalidName { .. } => "INVALID_INDEX_NAME",
                StoreError::Io { .. } => "IO_ERROR",
                StoreError::Tantivy(_) => "TANTIVY_ERROR",
                StoreError::LexicalQuery { .. } => "LEXICAL_QUERY_ERROR",
                StoreError::MissingLane { .. } => "MISSING_LANE",
                e if e.is_corruption() => "INDEX_CORRUPTED",
                _ => "STORE_ERROR",
            },
            Self::Clustering(_) => "CLUSTERING_ERROR",
            Self::Vector(VectorError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::AnnIndexMissing { .. } => "ANN_INDEX_MISSING",
            Self::QueryDimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::Adapter { .. } => "ADAPTER_ERROR",
            Self::AdapterNotFound { .. } => "ADAPTER_NOT_FOUND",
            Self::DuplicateAdapter { .. } => "DUPLICATE_ADAPTER",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::InvalidOptions { .. } => "INVALID_OPTIONS",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Store(StoreError::NotFound { .. }) => vec![
                "Run 'quarry info <index>' to check the index name",
                "Create the index with 'quarry import <index> <file.jsonl>'",
            ],
            Self::Store(e) if e.is_corruption() => vec![
                "Re-import the index from its source records",
                "Check for disk errors or filesystem corruption",
            ],
            Self::Store(StoreError::Tantivy(_)) => vec![
                "Delete the index's lexical/ directory and re-import",
                "Check disk space and permissions in the index directory",
            ],
            Self::AnnIndexMissing { .. } => vec![
                "Run 'quarry ann build <index>' first",
                "Search without --ann to use brute-force scoring",
            ],
            Self::QueryDimensionMismatch { .. }
            | Self::Vector(VectorError::DimensionMismatch { .. }) => vec![
                "Use the same embedding model that built the index",
                "Check 'quarry info <index>' for the stored dimension",
            ],
            Self::AdapterNotFound { .. } => vec![
                "Register an adapter for the index's model",
                "Pass a pre-computed vector with --query-vector",
            ],
            Self::ConfigError { .. } => vec![
                "Run 'quarry config' to see the effective settings",
                "Run 'quarry init --force' to regenerate the settings file",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for retrieval operations
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Helper trait for attaching a path to I/O errors
pub trait ErrorContext<T> {
    /// Add context with a path
    fn with_path(self, path: &std::path::Path) -> Result<T, StoreError>;
}

impl<T> ErrorContext<T> for Result<T, std::io::Error> {
    fn with_path(self, path: &std::path::Path) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        let err = RetrievalError::AnnIndexMissing {
            index: "docs".to_string(),
        };
        assert_eq!(err.status_code(), "ANN_INDEX_MISSING");
        assert!(!err.recovery_suggestions().is_empty());

        let err: RetrievalError = StoreError::Corrupt {
            path: PathBuf::from("chunks.jsonl"),
            line: 3,
            reason: "bad json".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), "INDEX_CORRUPTED");
    }

    #[test]
    fn test_with_path_context() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let err = result.with_path(std::path::Path::new("/tmp/x")).unwrap_err();
        assert!(err.to_string().contains("/tmp/x"));
    }
}
