//! Semantic retrieval services built on the embedding store.
//!
//! [`SearchService`] answers queries, [`BackfillCoordinator`] fills in
//! missing embeddings in bulk and [`RecordLifecycle`] keeps embeddings in
//! step with record writes. All model calls go through [`BoundedEncoder`].

mod backfill;
mod encode;
mod lifecycle;
mod search;

pub use backfill::{BackfillCoordinator, BackfillReport, BatchProgress};
pub use encode::BoundedEncoder;
pub use lifecycle::{EmbeddingStatus, RecordLifecycle};
pub use search::{SearchError, SearchService};

/// Similarity threshold recommendations on the `[0, 1]` score scale
pub mod thresholds {
    /// Default threshold for semantic search
    pub const DEFAULT: f32 = 0.3;
}
