//! Boundary to the embedding model.
//!
//! The retrieval core never looks inside the model: it calls an
//! [`EmbeddingGenerator`] for single queries and for batches, and treats any
//! failure as attributable to the whole call. Whether a generator exists at
//! all is decided once at startup and carried as an [`EmbeddingCapability`].

use std::path::Path;
use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::SemanticSearchConfig;
use crate::vector::{VectorDimension, VectorError};

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe; calls may block for a long time and
/// are always made off the async executor.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate the embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let mut embeddings = self.embed_batch(&[text])?;
        match embeddings.len() {
            1 => Ok(embeddings.remove(0)),
            actual => Err(VectorError::BatchArity {
                expected: 1,
                actual,
            }),
        }
    }

    /// Generate embeddings for multiple texts.
    ///
    /// Returns one embedding per input text, in input order, or an error for
    /// the batch as a whole.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Name of the underlying model, recorded in store metadata.
    fn model_name(&self) -> &str;
}

/// Parses a configured model name into a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "ParaphraseMLMiniLML12V2" => Ok(EmbeddingModel::ParaphraseMLMiniLML12V2),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        other => Err(VectorError::EmbeddingFailed(format!(
            "Unknown embedding model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, \
             ParaphraseMLMiniLML12V2, MultilingualE5Small, BGESmallENV15, BGEBaseENV15"
        ))),
    }
}

/// Stable name for a fastembed model, the inverse of [`parse_embedding_model`].
#[must_use]
pub fn model_to_string(model: &EmbeddingModel) -> String {
    format!("{model:?}")
}

/// fastembed-backed generator.
///
/// The model needs `&mut` access to embed, so calls are serialized through a
/// mutex. The dimension is probed once at construction.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: VectorDimension,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("model", &"<TextEmbedding>")
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Load `model`, downloading it into `cache_dir` on first use.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new(
        model: EmbeddingModel,
        cache_dir: &Path,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let model_name = model_to_string(&model);
        info!(model = %model_name, cache_dir = %cache_dir.display(), "loading embedding model");

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        // Get dimensions by generating a probe embedding
        let probe = text_model
            .embed(vec!["probe"], None)
            .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;
        let dimension = probe
            .into_iter()
            .next()
            .map(|embedding| embedding.len())
            .unwrap_or(0);
        let dimension = VectorDimension::new(dimension)?;

        info!(model = %model_name, %dimension, "embedding model ready");

        Ok(Self {
            model: Mutex::new(text_model),
            model_name,
            dimension,
        })
    }

    /// Build a generator from the semantic search settings.
    pub fn from_settings(config: &SemanticSearchConfig) -> Result<Self, VectorError> {
        let model = parse_embedding_model(&config.model)?;
        Self::new(model, &config.model_cache_dir, config.show_download_progress)
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        if embeddings.len() != texts.len() {
            return Err(VectorError::BatchArity {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }
        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Whether semantic features can run in this process.
///
/// Built once at startup and handed to every component that needs the
/// model, instead of each call site re-checking configuration flags.
#[derive(Clone)]
pub enum EmbeddingCapability {
    Available(Arc<dyn EmbeddingGenerator>),
    Disabled { reason: String },
}

impl std::fmt::Debug for EmbeddingCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(generator) => f
                .debug_struct("Available")
                .field("model", &generator.model_name())
                .field("dimension", &generator.dimension())
                .finish(),
            Self::Disabled { reason } => {
                f.debug_struct("Disabled").field("reason", reason).finish()
            }
        }
    }
}

impl EmbeddingCapability {
    pub fn available(generator: Arc<dyn EmbeddingGenerator>) -> Self {
        Self::Available(generator)
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::Disabled {
            reason: reason.into(),
        }
    }

    /// Resolve the capability from settings, loading the model if enabled.
    ///
    /// A model that fails to load disables the capability rather than
    /// aborting startup; record CRUD keeps working without embeddings.
    pub fn from_settings(config: &SemanticSearchConfig) -> Self {
        if !config.enabled {
            return Self::disabled("semantic search is disabled in configuration");
        }

        match FastEmbedGenerator::from_settings(config) {
            Ok(generator) => Self::Available(Arc::new(generator)),
            Err(e) => {
                warn!(error = %e, "embedding model unavailable, semantic search disabled");
                Self::disabled(format!("embedding model failed to load: {e}"))
            }
        }
    }

    pub fn generator(&self) -> Option<&Arc<dyn EmbeddingGenerator>> {
        match self {
            Self::Available(generator) => Some(generator),
            Self::Disabled { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Human-readable reason when disabled.
    pub fn disabled_reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Disabled { reason } => Some(reason),
        }
    }
}

/// Deterministic bag-of-words generator for unit tests.
///
/// Each vocabulary word owns one dimension; a text's vector counts the
/// vocabulary words it contains. Texts containing `fail_marker` make the
/// whole batch fail.
#[cfg(test)]
pub(crate) struct MockEmbeddingGenerator {
    vocabulary: Vec<String>,
    dimension: VectorDimension,
    fail_marker: Option<String>,
    pub(crate) calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    pub(crate) fn with_vocabulary(words: &[&str]) -> Self {
        Self {
            vocabulary: words.iter().map(|w| w.to_string()).collect(),
            dimension: VectorDimension::new(words.len()).unwrap(),
            fail_marker: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            if let Some(index) = self.vocabulary.iter().position(|w| *w == token) {
                vector[index] += 1.0;
            }
        }
        vector
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(VectorError::EmbeddingFailed(format!(
                    "mock failure on '{marker}'"
                )));
            }
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-bag-of-words"
    }
}
