//! Record writes keeping embeddings in step with the text.

use std::sync::Arc;
use std::time::Duration;

use kbsearch::semantic::EmbeddingStatus;
use kbsearch::{
    EmbeddingCapability, EmbeddingStore, Record, RecordId, RecordLifecycle, SearchService,
    SemanticSearchConfig, StoreError,
};

use crate::common::{KB_VOCABULARY, VocabularyGenerator, capability};

fn lifecycle_with(capability: &EmbeddingCapability, config: &SemanticSearchConfig) -> RecordLifecycle {
    RecordLifecycle::new(Arc::new(EmbeddingStore::new()), capability, config)
}

#[tokio::test]
async fn test_edit_moves_record_between_queries() {
    let (capability, _) = capability(VocabularyGenerator::new(KB_VOCABULARY));
    let config = SemanticSearchConfig::default();
    let lifecycle = lifecycle_with(&capability, &config);
    let search = SearchService::new(Arc::clone(lifecycle.store()), &capability, config.clone());
    let id = RecordId::new("q1");

    let status = lifecycle
        .record_created(Record::new("q1", "configure git remote"))
        .await
        .unwrap();
    assert_eq!(status, EmbeddingStatus::Current);
    lifecycle
        .record_created(Record::new("q2", "install python guide"))
        .await
        .unwrap();

    let top = search.search("git", Some(1), None).await.unwrap();
    assert_eq!(top[0].id, id);

    lifecycle
        .record_text_updated(&id, "python package manager")
        .await
        .unwrap();
    let top = search.search("git", Some(1), Some(0.6)).await.unwrap();
    assert!(top.is_empty());
    let top = search.search("package", Some(1), None).await.unwrap();
    assert_eq!(top[0].id, id);
    assert_eq!(top[0].text, "python package manager");
}

#[tokio::test]
async fn test_timed_out_edit_leaves_record_pending() {
    let (capability, generator) =
        capability(VocabularyGenerator::new(KB_VOCABULARY).slow(Duration::from_millis(200)));
    let config = SemanticSearchConfig {
        encode_timeout_ms: 10,
        ..SemanticSearchConfig::default()
    };
    let lifecycle = lifecycle_with(&capability, &config);
    let id = RecordId::new("q1");

    let status = lifecycle
        .record_created(Record::new("q1", "python"))
        .await
        .unwrap();
    assert_eq!(status, EmbeddingStatus::Pending);
    assert!(generator.batches.load(std::sync::atomic::Ordering::SeqCst) >= 1);

    // The record itself was stored and waits for backfill
    assert_eq!(lifecycle.store().record(&id).unwrap().text, "python");
    assert_eq!(lifecycle.store().all_missing_embeddings()[0].id, id);
}

#[tokio::test]
async fn test_delete_removes_record_from_results() {
    let (capability, _) = capability(VocabularyGenerator::new(KB_VOCABULARY));
    let config = SemanticSearchConfig::default();
    let lifecycle = lifecycle_with(&capability, &config);
    let search = SearchService::new(Arc::clone(lifecycle.store()), &capability, config.clone());

    lifecycle
        .record_created(Record::new("q1", "python"))
        .await
        .unwrap();
    lifecycle.record_deleted(&RecordId::new("q1")).unwrap();

    assert!(search.search("python", None, None).await.unwrap().is_empty());
    assert!(matches!(
        lifecycle.record_deleted(&RecordId::new("q1")),
        Err(StoreError::RecordNotFound { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_create_is_rejected() {
    let lifecycle = lifecycle_with(
        &EmbeddingCapability::disabled("off"),
        &SemanticSearchConfig::default(),
    );
    lifecycle
        .record_created(Record::new("q1", "first"))
        .await
        .unwrap();

    let err = lifecycle
        .record_created(Record::new("q1", "second"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateRecord { .. }));
    assert_eq!(
        lifecycle.store().record(&RecordId::new("q1")).unwrap().text,
        "first"
    );
}
