//! Error types for the knowledge-base search engine
//!
//! Each layer owns a thiserror enum ([`VectorError`], [`StoreError`],
//! [`SearchError`]); [`KbError`] gathers them for callers that cross layers
//! and adds stable status codes and recovery suggestions.

use thiserror::Error;

use crate::semantic::SearchError;
use crate::storage::StoreError;
use crate::vector::VectorError;

/// Main error type for the library boundary
#[derive(Error, Debug)]
pub enum KbError {
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Search(#[from] SearchError),

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// General errors for cases where no structured variant fits
    #[error("{0}")]
    General(String),
}

impl KbError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(VectorError::CorruptEmbedding { .. }) => "CORRUPT_EMBEDDING",
            Self::Vector(VectorError::Timeout { .. }) => "ENCODER_TIMEOUT",
            Self::Vector(_) => "ENCODING_ERROR",
            Self::Store(StoreError::RecordNotFound { .. }) => "RECORD_NOT_FOUND",
            Self::Store(StoreError::DuplicateRecord { .. }) => "DUPLICATE_RECORD",
            Self::Store(StoreError::Vector(VectorError::CorruptEmbedding { .. })) => {
                "CORRUPT_EMBEDDING"
            }
            Self::Store(StoreError::InvalidFormat { .. }) => "STORE_CORRUPTED",
            Self::Store(StoreError::ModelDimensionMismatch { .. }) => "MODEL_MISMATCH",
            Self::Store(StoreError::UnsupportedVersion { .. }) => "UNSUPPORTED_VERSION",
            Self::Store(_) => "STORAGE_ERROR",
            Self::Search(SearchError::Unavailable { .. }) => "SEARCH_UNAVAILABLE",
            Self::Search(SearchError::Encoding(VectorError::Timeout { .. })) => "ENCODER_TIMEOUT",
            Self::Search(SearchError::Encoding(_)) => "ENCODING_ERROR",
            Self::Search(_) => "INVALID_QUERY",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Vector(VectorError::CorruptEmbedding { .. })
            | Self::Store(StoreError::Vector(VectorError::CorruptEmbedding { .. })) => vec![
                "Run 'kbsearch backfill' to regenerate unreadable embeddings",
            ],
            Self::Vector(VectorError::Timeout { .. })
            | Self::Search(SearchError::Encoding(VectorError::Timeout { .. })) => vec![
                "Try again, the model may still have been loading",
                "Raise semantic_search.encode_timeout_ms if the machine is slow",
            ],
            Self::Store(StoreError::RecordNotFound { .. }) => vec![
                "Run 'kbsearch list' to see existing record ids",
            ],
            Self::Store(StoreError::InvalidFormat { .. }) => vec![
                "Restore the store directory from a backup",
                "Check for disk errors or filesystem corruption",
            ],
            Self::Store(StoreError::ModelDimensionMismatch { .. }) => vec![
                "Run 'kbsearch backfill --rebuild' to regenerate all embeddings",
                "Or switch semantic_search.model back to the model the store was built with",
            ],
            Self::Search(SearchError::Unavailable { .. }) => vec![
                "Set semantic_search.enabled = true in .kbsearch/settings.toml",
                "Check that the embedding model can be downloaded",
            ],
            Self::Config { .. } => vec![
                "Run 'kbsearch init --force' to regenerate the configuration",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for library operations
pub type KbResult<T> = Result<T, KbError>;
