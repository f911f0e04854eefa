//! Storage layer for records and their embeddings.
//!
//! [`EmbeddingStore`] is the in-memory, concurrently accessible store;
//! [`StorePersistence`] saves it to and loads it from a directory.

mod embedding_store;
mod error;
mod metadata;
mod persistence;

pub use embedding_store::{CandidateScan, EmbeddingStore, PutOutcome};
pub use error::{StoreError, StoreResult};
pub use metadata::{StoreMetadata, get_utc_timestamp};
pub use persistence::{EMBEDDINGS_FILE, RECORDS_FILE, StorePersistence};
