//! Type-safe wrappers and core types for vector operations.
//!
//! Newtypes here keep dimensions and scores from being passed around as bare
//! primitives. Both validate on construction so downstream code can rely on
//! their invariants.

use thiserror::Error;

/// Number of bytes per serialized `f32` element.
pub const BYTES_PER_F32: usize = 4;

/// Type-safe wrapper for vector dimensions.
///
/// A store is created for exactly one dimension; every vector written to it
/// is validated against this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Size in bytes of one encoded vector of this dimension.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.0 * BYTES_PER_F32
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for similarity scores.
///
/// Scores are normalized to the range [0.0, 1.0] where:
/// - 1.0 indicates the same direction
/// - 0.5 indicates orthogonal vectors
/// - 0.0 indicates opposite direction, or an undefined similarity
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Score(f32);

impl Score {
    /// Creates a new `Score` with validation.
    ///
    /// Returns an error if the score is not in the range [0.0, 1.0] or is NaN.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score must be in range [0.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Maps a cosine similarity from [-1, 1] onto the unit score scale.
    ///
    /// Non-finite input maps to zero; rounding overshoot is clamped.
    #[must_use]
    pub fn from_cosine(cosine: f32) -> Self {
        if !cosine.is_finite() {
            return Self::zero();
        }
        Self(((cosine + 1.0) / 2.0).clamp(0.0, 1.0))
    }

    /// Creates a score of 0.0.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Creates a score of 1.0.
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Construction rejects NaN, so total_cmp agrees with numeric order.
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid score value: {value}\nReason: {reason}")]
    InvalidScore { value: f32, reason: &'static str },

    #[error(
        "Corrupt embedding ({byte_len} bytes): {reason}\nSuggestion: Run 'kbsearch backfill' to regenerate missing embeddings"
    )]
    CorruptEmbedding {
        byte_len: usize,
        reason: &'static str,
    },

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error(
        "Embedding generation timed out after {timeout_ms}ms\nSuggestion: Raise semantic_search.encode_timeout_ms or retry later"
    )]
    Timeout { timeout_ms: u64 },

    #[error(
        "Embedding batch arity mismatch: sent {expected} texts, received {actual} vectors\nSuggestion: The embedding model returned a partial batch; retry the backfill"
    )]
    BatchArity { expected: usize, actual: usize },
}
