//! Query-time semantic search over the embedding store.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::SemanticSearchConfig;
use crate::semantic::BoundedEncoder;
use crate::storage::EmbeddingStore;
use crate::types::SearchResult;
use crate::vector::{EmbeddingCapability, Score, VectorError, ranked_search};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(
        "Semantic search is unavailable: {reason}\nSuggestion: Set semantic_search.enabled = true in .kbsearch/settings.toml and make sure the model can be downloaded"
    )]
    Unavailable { reason: String },

    #[error("Search query is empty\nSuggestion: Provide a few words describing what you are looking for")]
    EmptyQuery,

    #[error(
        "Search query is {length} characters long, the limit is {max}\nSuggestion: Shorten the query or raise semantic_search.max_query_length"
    )]
    QueryTooLong { length: usize, max: usize },

    #[error("Invalid threshold {value}: must be a number between 0.0 and 1.0")]
    InvalidThreshold { value: f32 },

    #[error("Failed to embed query: {0}")]
    Encoding(#[from] VectorError),
}

/// Answers free-text queries with the best matching records.
#[derive(Debug, Clone)]
pub struct SearchService {
    store: Arc<EmbeddingStore>,
    encoder: Result<BoundedEncoder, String>,
    config: SemanticSearchConfig,
}

impl SearchService {
    pub fn new(
        store: Arc<EmbeddingStore>,
        capability: &EmbeddingCapability,
        config: SemanticSearchConfig,
    ) -> Self {
        let encoder = match capability {
            EmbeddingCapability::Available(generator) => Ok(BoundedEncoder::new(
                Arc::clone(generator),
                config.encode_timeout(),
            )),
            EmbeddingCapability::Disabled { reason } => Err(reason.clone()),
        };
        Self {
            store,
            encoder,
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.encoder.is_ok()
    }

    /// Rank stored records against `query`.
    ///
    /// `top_k` and `threshold` override the configured defaults when given.
    /// An empty store yields an empty list.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let encoder = self
            .encoder
            .as_ref()
            .map_err(|reason| SearchError::Unavailable {
                reason: reason.clone(),
            })?;

        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let length = query.chars().count();
        if length > self.config.max_query_length {
            return Err(SearchError::QueryTooLong {
                length,
                max: self.config.max_query_length,
            });
        }

        let top_k = top_k.unwrap_or(self.config.top_k);
        let raw_threshold = threshold.unwrap_or(self.config.threshold);
        let threshold = Score::new(raw_threshold).map_err(|_| SearchError::InvalidThreshold {
            value: raw_threshold,
        })?;

        let query_vector = encoder.embed(query).await?;
        let scan = self.store.scan_candidates();
        if scan.candidates.is_empty() {
            debug!("no records with embeddings to search");
            return Ok(Vec::new());
        }

        let results = ranked_search(&query_vector, &scan.candidates, top_k, threshold);
        debug!(
            candidates = scan.candidates.len(),
            corrupt = scan.corrupt.len(),
            results = results.len(),
            top_k,
            %threshold,
            "semantic search finished"
        );
        Ok(results)
    }
}
