//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed (an empty result list is a success)
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - critical failure that should halt automation
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::KbError;
use crate::semantic::SearchError;
use crate::storage::StoreError;
use crate::vector::VectorError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Record not found (code 3)
    NotFound = 3,

    /// Query rejected before searching (code 4)
    InvalidQuery = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Store corruption detected (code 7)
    StoreCorrupted = 7,

    /// Semantic search is disabled or the model failed to load (code 8)
    Unavailable = 8,

    /// The embedding model failed or timed out (code 9)
    EncoderError = 9,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Convert a `KbError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &KbError) -> Self {
        match error {
            KbError::Store(StoreError::RecordNotFound { .. }) => ExitCode::NotFound,

            // Corruption of the store itself is blocking
            KbError::Store(StoreError::InvalidFormat { .. })
            | KbError::Store(StoreError::UnsupportedVersion { .. }) => ExitCode::StoreCorrupted,
            KbError::Store(StoreError::ModelDimensionMismatch { .. }) => ExitCode::BlockingError,
            KbError::Store(StoreError::Io { .. }) => ExitCode::IoError,

            KbError::Search(SearchError::Unavailable { .. }) => ExitCode::Unavailable,
            KbError::Search(SearchError::Encoding(_))
            | KbError::Vector(VectorError::EmbeddingFailed(_))
            | KbError::Vector(VectorError::Timeout { .. }) => ExitCode::EncoderError,
            KbError::Search(_) => ExitCode::InvalidQuery,

            KbError::Config { .. } => ExitCode::ConfigError,

            // Everything else is a general error
            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    ///
    /// Blocking errors should halt automation pipelines.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError | ExitCode::StoreCorrupted)
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
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::InvalidQuery => "Invalid query",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::StoreCorrupted => "Store corrupted",
            ExitCode::Unavailable => "Semantic search unavailable",
            ExitCode::EncoderError => "Embedding model error",
        }
    }
}
