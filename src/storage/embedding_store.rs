//! Record-keyed embedding store.
//!
//! Each record carries at most one embedding, stored as the raw codec bytes
//! together with the hash of the text it was computed from. Text edits drop
//! the embedding under the same map entry lock, so a reader can never pair a
//! record's current text with a vector computed from an older one.
//!
//! All writes for one id go through that id's `DashMap` shard lock. Reads of
//! different ids and writes to different shards run concurrently. Nothing in
//! here ever calls the embedding model.

use std::sync::OnceLock;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use crate::storage::{StoreError, StoreResult};
use crate::types::{Candidate, ContentHash, Payload, PendingEmbedding, Record, RecordId};
use crate::vector::{BYTES_PER_F32, VectorDimension, codec};

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The vector is now the record's embedding.
    Attached,
    /// The record's text changed since the vector was computed; nothing was
    /// written.
    Stale,
}

/// Candidates decoded from the store plus the ids that failed to decode.
#[derive(Debug, Default)]
pub struct CandidateScan {
    pub candidates: Vec<Candidate>,
    pub corrupt: Vec<RecordId>,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredEmbedding {
    pub(crate) bytes: Vec<u8>,
    pub(crate) source: ContentHash,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    text: String,
    text_hash: ContentHash,
    payload: Payload,
    embedding: Option<StoredEmbedding>,
}

impl StoredRecord {
    fn new(text: String, payload: Payload) -> Self {
        Self {
            text_hash: ContentHash::of(&text),
            text,
            payload,
            embedding: None,
        }
    }

    /// The embedding, if it was computed from the current text.
    fn current_embedding(&self) -> Option<&StoredEmbedding> {
        self.embedding
            .as_ref()
            .filter(|embedding| embedding.source == self.text_hash)
    }

    fn to_record(&self, id: &RecordId) -> Record {
        Record {
            id: id.clone(),
            text: self.text.clone(),
            payload: self.payload.clone(),
        }
    }
}

/// In-memory store of records and their embeddings.
///
/// The vector dimension is fixed either at construction or by the first
/// embedding written; every later vector must match it.
#[derive(Debug, Default)]
pub struct EmbeddingStore {
    entries: DashMap<RecordId, StoredRecord>,
    dimension: OnceLock<VectorDimension>,
}

impl EmbeddingStore {
    /// Create an empty store whose dimension is set by the first embedding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store pinned to `dimension`.
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        let store = Self::new();
        let _ = store.dimension.set(dimension);
        store
    }

    /// The dimension embeddings must have, if already known.
    pub fn dimension(&self) -> Option<VectorDimension> {
        self.dimension.get().copied()
    }

    /// Pin the store to the model's dimension.
    ///
    /// Fails when the store already holds vectors of another dimension.
    pub fn bind_dimension(&self, dimension: VectorDimension) -> StoreResult<()> {
        let bound = *self.dimension.get_or_init(|| dimension);
        if bound != dimension {
            return Err(StoreError::ModelDimensionMismatch {
                stored: bound.get(),
                model: dimension.get(),
            });
        }
        Ok(())
    }

    // ---- Record boundary, driven by the owner of the records ----

    /// Add a new record without an embedding.
    pub fn insert_record(&self, record: Record) -> StoreResult<()> {
        match self.entries.entry(record.id) {
            Entry::Occupied(entry) => Err(StoreError::DuplicateRecord {
                id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                debug!(id = %entry.key(), "record inserted");
                entry.insert(StoredRecord::new(record.text, record.payload));
                Ok(())
            }
        }
    }

    /// Replace a record's text.
    ///
    /// Returns `true` when an embedding was dropped because the text changed.
    /// Setting identical text keeps the embedding.
    pub fn update_text(&self, id: &RecordId, text: impl Into<String>) -> StoreResult<bool> {
        let text = text.into();
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordNotFound { id: id.clone() })?;

        let text_hash = ContentHash::of(&text);
        if text_hash == entry.text_hash {
            return Ok(false);
        }

        entry.text = text;
        entry.text_hash = text_hash;
        let dropped = entry.embedding.take().is_some();
        debug!(%id, dropped, "record text updated");
        Ok(dropped)
    }

    /// Replace a record's payload; the embedding is unaffected.
    pub fn update_payload(&self, id: &RecordId, payload: Payload) -> StoreResult<()> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordNotFound { id: id.clone() })?;
        entry.payload = payload;
        Ok(())
    }

    /// Remove a record together with its embedding.
    pub fn remove_record(&self, id: &RecordId) -> Option<Record> {
        self.entries
            .remove(id)
            .map(|(id, stored)| stored.to_record(&id))
    }

    pub fn record(&self, id: &RecordId) -> Option<Record> {
        self.entries.get(id).map(|entry| entry.to_record(id))
    }

    /// All records, ordered by id.
    pub fn records(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .entries
            .iter()
            .map(|entry| entry.value().to_record(entry.key()))
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of records whose embedding matches their current text.
    pub fn embedding_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.current_embedding().is_some())
            .count()
    }

    /// Remove every record.
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        warn!(count, "store cleared");
    }

    // ---- Embedding operations ----

    /// Attach or replace the embedding for `id`, bound to its current text.
    pub fn put(&self, id: &RecordId, vector: &[f32]) -> StoreResult<()> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordNotFound { id: id.clone() })?;
        // Only a write that can land may pin the dimension
        self.check_dimension(vector)?;
        let bytes = codec::encode(vector);
        let source = entry.text_hash.clone();
        entry.embedding = Some(StoredEmbedding { bytes, source });
        Ok(())
    }

    /// Attach `vector` only if the record still has the text it was
    /// computed from.
    pub fn put_if_current(
        &self,
        id: &RecordId,
        vector: &[f32],
        source: &ContentHash,
    ) -> StoreResult<PutOutcome> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordNotFound { id: id.clone() })?;
        if entry.text_hash != *source {
            debug!(%id, "discarding embedding computed from outdated text");
            return Ok(PutOutcome::Stale);
        }
        self.check_dimension(vector)?;
        let bytes = codec::encode(vector);
        entry.embedding = Some(StoredEmbedding {
            bytes,
            source: source.clone(),
        });
        Ok(PutOutcome::Attached)
    }

    /// The current embedding for `id`.
    ///
    /// `Ok(None)` covers unknown records and records without a current
    /// embedding; undecodable bytes surface as a corrupt-embedding error.
    pub fn get(&self, id: &RecordId) -> StoreResult<Option<Vec<f32>>> {
        let Some(entry) = self.entries.get(id) else {
            return Ok(None);
        };
        match entry.current_embedding() {
            Some(embedding) => Ok(Some(self.decode(&embedding.bytes)?)),
            None => Ok(None),
        }
    }

    /// Drop the embedding for `id`. Returns whether one was present.
    pub fn invalidate(&self, id: &RecordId) -> StoreResult<bool> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordNotFound { id: id.clone() })?;
        Ok(entry.embedding.take().is_some())
    }

    /// Drop every embedding, e.g. before regenerating with another model.
    pub fn clear_embeddings(&self) -> usize {
        let mut dropped = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.embedding.take().is_some() {
                dropped += 1;
            }
        }
        dropped
    }

    /// Records with a current, decodable embedding, ordered by id.
    pub fn all_with_embeddings(&self) -> Vec<Candidate> {
        self.scan_candidates().candidates
    }

    /// Like [`Self::all_with_embeddings`] but also reports corrupt entries.
    ///
    /// Corrupt embeddings are excluded and logged; they show up again in
    /// [`Self::all_missing_embeddings`] so the next backfill replaces them.
    pub fn scan_candidates(&self) -> CandidateScan {
        let mut scan = CandidateScan::default();

        for entry in self.entries.iter() {
            let Some(embedding) = entry.current_embedding() else {
                continue;
            };
            match self.decode(&embedding.bytes) {
                Ok(vector) => scan.candidates.push(Candidate {
                    id: entry.key().clone(),
                    text: entry.text.clone(),
                    vector,
                    payload: entry.payload.clone(),
                }),
                Err(e) => {
                    warn!(id = %entry.key(), error = %e, "skipping corrupt embedding");
                    scan.corrupt.push(entry.key().clone());
                }
            }
        }

        scan.candidates.sort_by(|a, b| a.id.cmp(&b.id));
        scan.corrupt.sort();
        scan
    }

    /// Records lacking a usable embedding for their current text, ordered
    /// by id.
    pub fn all_missing_embeddings(&self) -> Vec<PendingEmbedding> {
        let mut pending: Vec<PendingEmbedding> = self
            .entries
            .iter()
            .filter(|entry| {
                entry
                    .current_embedding()
                    .is_none_or(|embedding| !self.blob_is_decodable(&embedding.bytes))
            })
            .map(|entry| PendingEmbedding {
                id: entry.key().clone(),
                text: entry.text.clone(),
                source: entry.text_hash.clone(),
            })
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending
    }

    // ---- Persistence support ----

    /// Every record with its raw embedding, ordered by id.
    pub(crate) fn export_entries(&self) -> Vec<(Record, Option<StoredEmbedding>)> {
        let mut entries: Vec<(Record, Option<StoredEmbedding>)> = self
            .entries
            .iter()
            .map(|entry| (entry.to_record(entry.key()), entry.embedding.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        entries
    }

    /// Insert a record with a raw embedding exactly as persisted.
    ///
    /// The bytes are not decoded here, so a damaged blob only affects its
    /// own record when it is read.
    pub(crate) fn restore_entry(&self, record: Record, embedding: Option<StoredEmbedding>) {
        let mut stored = StoredRecord::new(record.text, record.payload);
        stored.embedding = embedding;
        self.entries.insert(record.id, stored);
    }

    fn check_dimension(&self, vector: &[f32]) -> StoreResult<VectorDimension> {
        let candidate = VectorDimension::new(vector.len())?;
        let dimension = *self.dimension.get_or_init(|| candidate);
        dimension.validate_vector(vector)?;
        Ok(dimension)
    }

    fn decode(&self, bytes: &[u8]) -> StoreResult<Vec<f32>> {
        let vector = match self.dimension() {
            Some(dimension) => codec::decode_with_dimension(bytes, dimension)?,
            None => codec::decode(bytes)?,
        };
        Ok(vector)
    }

    fn blob_is_decodable(&self, bytes: &[u8]) -> bool {
        match self.dimension() {
            Some(dimension) => bytes.len() == dimension.byte_len(),
            None => !bytes.is_empty() && bytes.len() % BYTES_PER_F32 == 0,
        }
    }
}
