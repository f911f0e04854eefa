//! Metadata tracking for persisted stores.
//!
//! Records which model produced the stored embeddings and how many there
//! were, so a reopened store can be checked against the running model.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::storage::{StoreError, StoreResult};

pub const METADATA_FILE: &str = "metadata.json";

/// Current UTC time as unix seconds.
pub fn get_utc_timestamp() -> u64 {
    Utc::now().timestamp() as u64
}

/// Metadata for a persisted store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Version of the on-disk format
    pub version: u32,

    /// Model that produced the embeddings, if any were generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Dimension of stored embeddings, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    pub record_count: usize,

    pub embedding_count: usize,

    /// Unix timestamp when created
    pub created_at: u64,

    /// Unix timestamp when last updated
    pub updated_at: u64,
}

impl Default for StoreMetadata {
    fn default() -> Self {
        let now = get_utc_timestamp();
        Self {
            version: Self::CURRENT_VERSION,
            model_name: None,
            dimension: None,
            record_count: 0,
            embedding_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl StoreMetadata {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh counts and bump the update timestamp.
    pub fn update_counts(&mut self, record_count: usize, embedding_count: usize) {
        self.record_count = record_count;
        self.embedding_count = embedding_count;
        self.updated_at = get_utc_timestamp();
    }

    pub fn save(&self, dir: &Path) -> StoreResult<()> {
        let path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize metadata: {e}")))?;
        fs::write(&path, json).map_err(|e| StoreError::io(&path, e))
    }

    pub fn load(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(METADATA_FILE);
        let json = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        let metadata: Self = serde_json::from_str(&json)
            .map_err(|e| StoreError::invalid_format(&path, format!("unreadable metadata: {e}")))?;

        if metadata.version > Self::CURRENT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: metadata.version,
                supported: Self::CURRENT_VERSION,
            });
        }

        Ok(metadata)
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(METADATA_FILE).exists()
    }
}
