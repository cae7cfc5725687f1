//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed
//! - `1`: General error - unspecified failure
//! - `3`: Search completed but returned no results
//! - `5`: File I/O error
//! - `6`: Configuration or option error
//! - `7`: Index corruption detected

use crate::error::{RetrievalError, StoreError};

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Command ran but found nothing (code 3)
    NoResults = 3,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Index corruption detected (code 7)
    IndexCorrupted = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// `Success` when a search returned results, `NoResults` otherwise.
    pub fn from_result_count(count: usize) -> Self {
        if count > 0 {
            ExitCode::Success
        } else {
            ExitCode::NoResults
        }
    }

    /// Convert a `RetrievalError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &RetrievalError) -> Self {
        match error {
            RetrievalError::Store(store) => Self::from_store_error(store),
            RetrievalError::ConfigError { .. } | RetrievalError::InvalidOptions { .. } => {
                ExitCode::ConfigError
            }
            RetrievalError::Vector(crate::vector::VectorError::Storage(_)) => ExitCode::IoError,
            _ => ExitCode::GeneralError,
        }
    }

    /// Exit code for a store error surfaced directly.
    pub fn from_store_error(error: &StoreError) -> Self {
        if error.is_corruption() {
            return ExitCode::IndexCorrupted;
        }
        match error {
            StoreError::Io { .. } => ExitCode::IoError,
            StoreError::InvalidName { .. } => ExitCode::ConfigError,
            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::NoResults => "No results",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::IndexCorrupted => "Index corrupted",
        }
    }
}
