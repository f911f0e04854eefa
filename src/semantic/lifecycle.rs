//! Keeps embeddings in step with record create, edit and delete.
//!
//! Embedding on write is best effort: when the model is disabled, fails or
//! times out, the record is still stored and left for the next backfill.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SemanticSearchConfig;
use crate::semantic::BoundedEncoder;
use crate::storage::{EmbeddingStore, PutOutcome, StoreError, StoreResult};
use crate::types::{ContentHash, Payload, Record, RecordId};
use crate::vector::EmbeddingCapability;

/// Embedding state of a record after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    /// The record has an embedding for its current text.
    Current,
    /// The record waits for backfill.
    Pending,
}

/// Record writes that also maintain the record's embedding.
#[derive(Debug, Clone)]
pub struct RecordLifecycle {
    store: Arc<EmbeddingStore>,
    encoder: Option<BoundedEncoder>,
}

impl RecordLifecycle {
    pub fn new(
        store: Arc<EmbeddingStore>,
        capability: &EmbeddingCapability,
        config: &SemanticSearchConfig,
    ) -> Self {
        let encoder = capability
            .generator()
            .map(|generator| BoundedEncoder::new(Arc::clone(generator), config.encode_timeout()));
        Self { store, encoder }
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    /// Store a new record and try to embed it.
    pub async fn record_created(&self, record: Record) -> StoreResult<EmbeddingStatus> {
        let id = record.id.clone();
        let source = ContentHash::of(&record.text);
        let text = record.text.clone();
        self.store.insert_record(record)?;
        Ok(self.try_embed(&id, &text, &source).await)
    }

    /// Replace a record's text; the old embedding is dropped before the new
    /// one is computed.
    pub async fn record_text_updated(
        &self,
        id: &RecordId,
        text: impl Into<String>,
    ) -> StoreResult<EmbeddingStatus> {
        let text = text.into();
        self.store.update_text(id, text.clone())?;
        if self.store.get(id).ok().flatten().is_some() {
            // Text was unchanged and the embedding is still valid
            return Ok(EmbeddingStatus::Current);
        }
        let source = ContentHash::of(&text);
        Ok(self.try_embed(id, &text, &source).await)
    }

    pub fn record_payload_updated(&self, id: &RecordId, payload: Payload) -> StoreResult<()> {
        self.store.update_payload(id, payload)
    }

    /// Remove a record and its embedding.
    pub fn record_deleted(&self, id: &RecordId) -> StoreResult<Record> {
        self.store
            .remove_record(id)
            .ok_or_else(|| StoreError::RecordNotFound { id: id.clone() })
    }

    async fn try_embed(&self, id: &RecordId, text: &str, source: &ContentHash) -> EmbeddingStatus {
        let Some(encoder) = &self.encoder else {
            debug!(%id, "embedding model disabled, record left for backfill");
            return EmbeddingStatus::Pending;
        };

        let vector = match encoder.embed(text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(%id, error = %e, "failed to embed record, left for backfill");
                return EmbeddingStatus::Pending;
            }
        };

        match self.store.put_if_current(id, &vector, source) {
            Ok(PutOutcome::Attached) => EmbeddingStatus::Current,
            Ok(PutOutcome::Stale) => EmbeddingStatus::Pending,
            Err(e) => {
                warn!(%id, error = %e, "failed to store embedding");
                EmbeddingStatus::Pending
            }
        }
    }
}
