//! Vector primitives for semantic retrieval.
//!
//! This module holds everything that operates on raw embedding vectors:
//! the storage codec, the similarity ranker and the boundary to the
//! embedding model. None of it keeps state beyond the model handle.

pub mod codec;
mod embedding;
mod similarity;
mod types;

// Re-export core types for public API
#[cfg(test)]
pub(crate) use embedding::MockEmbeddingGenerator;
pub use embedding::{
    EmbeddingCapability, EmbeddingGenerator, FastEmbedGenerator, model_to_string,
    parse_embedding_model,
};
pub use similarity::{cosine_similarity, ranked_search, similarity_score};
pub use types::{BYTES_PER_F32, Score, VectorDimension, VectorError};
