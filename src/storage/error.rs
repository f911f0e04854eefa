use crate::types::RecordId;
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record '{id}' not found. It may have been deleted or never created.")]
    RecordNotFound { id: RecordId },

    #[error("Record '{id}' already exists")]
    DuplicateRecord { id: RecordId },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid storage format in '{path}': {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    #[error(
        "Store dimension mismatch: store holds {stored}-dimensional vectors, model produces {model}\nSuggestion: Run 'kbsearch backfill --rebuild' after changing the embedding model"
    )]
    ModelDimensionMismatch { stored: usize, model: usize },

    #[error(
        "Store format version {found} is newer than supported version {supported}\nSuggestion: Update kbsearch to read this store"
    )]
    UnsupportedVersion { found: u32, supported: u32 },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
