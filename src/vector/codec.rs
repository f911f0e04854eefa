//! Flat byte encoding for embedding vectors.
//!
//! Layout: `D` consecutive `f32` values in little-endian order, `D * 4` bytes,
//! no header. The dimension is implied by the buffer length, so the only
//! structural check available on decode is alignment.

use crate::vector::types::{BYTES_PER_F32, VectorDimension, VectorError};

/// Encodes a vector into its storage representation.
#[must_use]
pub fn encode(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * BYTES_PER_F32);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decodes a stored buffer back into a vector.
///
/// Rejects empty and misaligned buffers instead of truncating them.
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>, VectorError> {
    if bytes.is_empty() {
        return Err(VectorError::CorruptEmbedding {
            byte_len: 0,
            reason: "buffer is empty",
        });
    }
    if bytes.len() % BYTES_PER_F32 != 0 {
        return Err(VectorError::CorruptEmbedding {
            byte_len: bytes.len(),
            reason: "length is not a multiple of 4",
        });
    }

    Ok(bytes
        .chunks_exact(BYTES_PER_F32)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Decodes a buffer that must hold exactly `dimension` elements.
pub fn decode_with_dimension(
    bytes: &[u8],
    dimension: VectorDimension,
) -> Result<Vec<f32>, VectorError> {
    let vector = decode(bytes)?;
    if vector.len() != dimension.get() {
        return Err(VectorError::CorruptEmbedding {
            byte_len: bytes.len(),
            reason: "element count does not match the store dimension",
        });
    }
    Ok(vector)
}
