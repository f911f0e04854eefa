//! Cosine-similarity ranking over a flat candidate set.
//!
//! Brute force: every candidate is scored against the query, so a call costs
//! O(N·D). That is comfortable for a few thousand records; larger corpora
//! would need an approximate index in front of this.

use rayon::prelude::*;

use crate::types::{Candidate, SearchResult};
use crate::vector::Score;

/// Candidate count above which scoring is spread across the rayon pool.
const PARALLEL_CUTOFF: usize = 2048;

/// Calculate cosine similarity between two vectors.
///
/// Returns `None` when the similarity is undefined: empty or mismatched
/// lengths, a zero-magnitude side, or a non-finite result.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return None;
    }

    let similarity = dot_product / (magnitude_a * magnitude_b);
    similarity.is_finite().then_some(similarity)
}

/// Scores one candidate vector against the query on the unit scale.
///
/// Undefined similarities score 0.0, so a degenerate candidate can only
/// appear in results when the threshold is 0.
#[must_use]
pub fn similarity_score(query: &[f32], candidate: &[f32]) -> Score {
    cosine_similarity(query, candidate).map_or(Score::zero(), Score::from_cosine)
}

/// Ranks candidates against a query vector.
///
/// Keeps candidates scoring at least `threshold`, orders them by descending
/// score with ties broken by ascending record id, and returns at most
/// `top_k` of them.
pub fn ranked_search(
    query: &[f32],
    candidates: &[Candidate],
    top_k: usize,
    threshold: Score,
) -> Vec<SearchResult> {
    if top_k == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let score_one = |(index, candidate): (usize, &Candidate)| {
        (index, similarity_score(query, &candidate.vector))
    };

    let mut scored: Vec<(usize, Score)> = if candidates.len() > PARALLEL_CUTOFF {
        candidates
            .par_iter()
            .enumerate()
            .map(score_one)
            .filter(|(_, score)| *score >= threshold)
            .collect()
    } else {
        candidates
            .iter()
            .enumerate()
            .map(score_one)
            .filter(|(_, score)| *score >= threshold)
            .collect()
    };

    scored.sort_by(|(a_index, a_score), (b_index, b_score)| {
        b_score
            .cmp(a_score)
            .then_with(|| candidates[*a_index].id.cmp(&candidates[*b_index].id))
    });
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(index, score)| {
            let candidate = &candidates[index];
            SearchResult {
                id: candidate.id.clone(),
                text: candidate.text.clone(),
                payload: candidate.payload.clone(),
                score,
            }
        })
        .collect()
}
