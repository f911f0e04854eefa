//! Checks the real embedding model against the knowledge-base scenario.

use std::sync::Arc;

use anyhow::Result;
use kbsearch::vector::FastEmbedGenerator;
use kbsearch::{EmbeddingCapability, EmbeddingGenerator, SearchService, SemanticSearchConfig};

use crate::common::{KB_CORPUS, store_with};

/// Get a unique cache directory for each test to avoid conflicts
fn test_cache_dir(test_name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "kbsearch_test_fastembed_{}_{}",
        test_name,
        std::process::id()
    ))
}

#[tokio::test]
#[ignore = "Downloads the embedding model - run with --ignored"]
async fn test_default_model_prefers_python_records() -> Result<()> {
    let mut config = SemanticSearchConfig::default();
    config.model_cache_dir = test_cache_dir("default_model");
    let generator = Arc::new(FastEmbedGenerator::from_settings(&config)?);

    let store = store_with(KB_CORPUS);
    for (id, text) in KB_CORPUS {
        store.put(&(*id).into(), &generator.embed(text)?)?;
    }

    let capability = EmbeddingCapability::available(generator);
    let service = SearchService::new(store, &capability, config);
    let results = service.search("python setup", Some(2), Some(0.3)).await?;

    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    println!("python setup -> {ids:?}");
    assert!(ids.len() <= 2);
    assert!(!ids.contains(&"B"), "git record ranked among python records");
    Ok(())
}
