//! End-to-end ranking behaviour over a small knowledge base.

use std::sync::Arc;

use kbsearch::{EmbeddingCapability, SearchError, SearchService, SemanticSearchConfig};

use crate::common::{KB_CORPUS, KB_VOCABULARY, VocabularyGenerator, capability, embedded_store};

fn kb_service() -> SearchService {
    let generator = VocabularyGenerator::new(KB_VOCABULARY);
    let store = embedded_store(KB_CORPUS, &generator);
    let (capability, _) = capability(generator);
    SearchService::new(store, &capability, SemanticSearchConfig::default())
}

#[tokio::test]
async fn test_python_query_ranks_python_records_first() {
    let service = kb_service();

    let results = service
        .search("python setup", Some(2), Some(0.3))
        .await
        .unwrap();

    // A and C share one word with the query and tie; ids break the tie
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "C"]);
    assert_eq!(results[0].score, results[1].score);
    assert!((results[0].score.get() - 0.704).abs() < 0.001);
}

#[tokio::test]
async fn test_threshold_drops_unrelated_record() {
    let service = kb_service();

    // B shares no word with the query: cosine 0 maps to 0.5
    let loose = service.search("python setup", Some(3), Some(0.3)).await.unwrap();
    assert_eq!(loose.len(), 3);
    assert_eq!(loose[2].id.as_str(), "B");
    assert!((loose[2].score.get() - 0.5).abs() < f32::EPSILON);

    let strict = service.search("python setup", Some(3), Some(0.6)).await.unwrap();
    let ids: Vec<&str> = strict.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "C"]);
}

#[tokio::test]
async fn test_results_carry_record_text_and_payload() {
    let generator = VocabularyGenerator::new(KB_VOCABULARY);
    let store = embedded_store(KB_CORPUS, &generator);
    let mut payload = kbsearch::Payload::new();
    payload.insert("answer".to_string(), "Use git remote add".into());
    store
        .update_payload(&kbsearch::RecordId::new("B"), payload)
        .unwrap();
    let (capability, _) = capability(generator);
    let service = SearchService::new(store, &capability, SemanticSearchConfig::default());

    let results = service.search("git remote", Some(1), None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "configure git remote");
    assert_eq!(results[0].payload["answer"], "Use git remote add");
}

#[tokio::test]
async fn test_empty_corpus_returns_empty_list() {
    let generator = VocabularyGenerator::new(KB_VOCABULARY);
    let store = embedded_store(&[], &generator);
    let (capability, _) = capability(generator);
    let service = SearchService::new(store, &capability, SemanticSearchConfig::default());

    let results = service.search("python setup", None, None).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_records_without_embeddings_are_not_searched() {
    let generator = VocabularyGenerator::new(KB_VOCABULARY);
    let store = embedded_store(KB_CORPUS, &generator);
    store
        .insert_record(kbsearch::Record::new("D", "python setup"))
        .unwrap();
    store.invalidate(&kbsearch::RecordId::new("A")).unwrap();
    let (capability, _) = capability(generator);
    let service = SearchService::new(Arc::clone(&store), &capability, SemanticSearchConfig::default());

    let results = service.search("python setup", None, None).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["C", "B"]);
    assert_eq!(store.all_missing_embeddings().len(), 2);
}

#[tokio::test]
async fn test_query_limits_come_from_config() {
    let generator = VocabularyGenerator::new(KB_VOCABULARY);
    let store = embedded_store(KB_CORPUS, &generator);
    let (capability, _) = capability(generator);
    let config = SemanticSearchConfig {
        top_k: 1,
        max_query_length: 10,
        ..SemanticSearchConfig::default()
    };
    let service = SearchService::new(store, &capability, config);

    assert_eq!(service.search("python", None, None).await.unwrap().len(), 1);
    assert!(matches!(
        service.search("python setup guide", None, None).await,
        Err(SearchError::QueryTooLong { length: 18, max: 10 })
    ));
}

#[tokio::test]
async fn test_disabled_model_reports_unavailable() {
    let generator = VocabularyGenerator::new(KB_VOCABULARY);
    let store = embedded_store(KB_CORPUS, &generator);
    let service = SearchService::new(
        store,
        &EmbeddingCapability::disabled("semantic search is disabled in configuration"),
        SemanticSearchConfig::default(),
    );

    let err = service.search("python", None, None).await.unwrap_err();
    assert!(matches!(err, SearchError::Unavailable { .. }));
    assert!(err.to_string().contains("disabled"));
}
