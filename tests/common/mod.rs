//! Deterministic embedding generators shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kbsearch::{
    EmbeddingCapability, EmbeddingGenerator, EmbeddingStore, Record, RecordId, VectorDimension,
    VectorError,
};

/// Bag-of-words generator: each vocabulary word owns one dimension.
///
/// Texts containing the fail marker make the whole batch fail, the way a
/// model provider error would.
pub struct VocabularyGenerator {
    vocabulary: Vec<String>,
    fail_marker: Option<String>,
    delay: Option<Duration>,
    pub batches: AtomicUsize,
}

impl VocabularyGenerator {
    pub fn new(words: &[&str]) -> Self {
        Self {
            vocabulary: words.iter().map(|w| w.to_string()).collect(),
            fail_marker: None,
            delay: None,
            batches: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Block every call for `delay` before answering.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
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

impl EmbeddingGenerator for VocabularyGenerator {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(VectorError::EmbeddingFailed(format!(
                    "provider rejected batch containing '{marker}'"
                )));
            }
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(self.vocabulary.len()).expect("non-empty vocabulary")
    }

    fn model_name(&self) -> &str {
        "test-vocabulary"
    }
}

pub const KB_VOCABULARY: &[&str] = &[
    "python",
    "install",
    "setup",
    "guide",
    "configure",
    "git",
    "remote",
    "package",
    "manager",
];

pub const KB_CORPUS: &[(&str, &str)] = &[
    ("A", "install python guide"),
    ("B", "configure git remote"),
    ("C", "python package manager"),
];

pub fn capability(generator: VocabularyGenerator) -> (EmbeddingCapability, Arc<VocabularyGenerator>) {
    let generator = Arc::new(generator);
    (
        EmbeddingCapability::available(generator.clone()),
        generator,
    )
}

/// Store holding `records` without any embeddings.
pub fn store_with(records: &[(&str, &str)]) -> Arc<EmbeddingStore> {
    let store = EmbeddingStore::new();
    for (id, text) in records {
        store
            .insert_record(Record::new(*id, *text))
            .expect("unique test ids");
    }
    Arc::new(store)
}

/// Store holding `records`, each embedded by `generator`.
pub fn embedded_store(
    records: &[(&str, &str)],
    generator: &VocabularyGenerator,
) -> Arc<EmbeddingStore> {
    let store = store_with(records);
    for (id, text) in records {
        store
            .put(&RecordId::new(*id), &generator.vectorize(text))
            .expect("embedding fits store");
    }
    store
}
