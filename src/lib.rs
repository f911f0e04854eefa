/// The main library module for kbsearch
pub mod config;
pub mod display;
pub mod error;
pub mod io;
pub mod logging;
pub mod semantic;
pub mod storage;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use config::{SemanticSearchConfig, Settings};
pub use error::{KbError, KbResult};
pub use semantic::{
    BackfillCoordinator, BackfillReport, BoundedEncoder, RecordLifecycle, SearchError,
    SearchService,
};
pub use storage::{EmbeddingStore, PutOutcome, StoreError, StorePersistence};
pub use types::{Candidate, ContentHash, Payload, PendingEmbedding, Record, RecordId, SearchResult};
pub use vector::{EmbeddingCapability, EmbeddingGenerator, Score, VectorDimension, VectorError};
