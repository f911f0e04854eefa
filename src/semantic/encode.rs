//! Time-bounded calls into the embedding model.
//!
//! Model calls are CPU-heavy and synchronous, so they run on tokio's blocking
//! pool. The caller stops waiting after the configured timeout; the blocking
//! task itself cannot be cancelled and finishes in the background with its
//! result discarded.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::vector::{EmbeddingGenerator, VectorError};

/// An [`EmbeddingGenerator`] plus the timeout applied to each call.
#[derive(Clone)]
pub struct BoundedEncoder {
    generator: Arc<dyn EmbeddingGenerator>,
    timeout: Duration,
}

impl std::fmt::Debug for BoundedEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedEncoder")
            .field("model", &self.generator.model_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BoundedEncoder {
    pub fn new(generator: Arc<dyn EmbeddingGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn generator(&self) -> &Arc<dyn EmbeddingGenerator> {
        &self.generator
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let generator = Arc::clone(&self.generator);
        let text = text.to_string();
        self.run(move || generator.embed(&text)).await
    }

    /// Embed a batch; the result has one vector per input, in order.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, VectorError> {
        let expected = texts.len();
        let generator = Arc::clone(&self.generator);
        let embeddings = self
            .run(move || {
                let borrowed: Vec<&str> = texts.iter().map(String::as_str).collect();
                generator.embed_batch(&borrowed)
            })
            .await?;

        if embeddings.len() != expected {
            return Err(VectorError::BatchArity {
                expected,
                actual: embeddings.len(),
            });
        }
        Ok(embeddings)
    }

    async fn run<T, F>(&self, call: F) -> Result<T, VectorError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, VectorError> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(call);
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(VectorError::EmbeddingFailed(format!(
                "embedding task aborted: {join_error}"
            ))),
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(timeout_ms, "embedding call timed out");
                Err(VectorError::Timeout { timeout_ms })
            }
        }
    }
}
