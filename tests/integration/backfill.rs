//! Backfill runs against a provider that fails part of the time.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use kbsearch::{BackfillCoordinator, BoundedEncoder, RecordId, SearchService, SemanticSearchConfig};

use crate::common::{KB_CORPUS, KB_VOCABULARY, VocabularyGenerator, capability, store_with};

const FIVE_RECORDS: &[(&str, &str)] = &[
    ("r1", "python install"),
    ("r2", "git remote"),
    ("r3", "python unavailable-provider"),
    ("r4", "package manager"),
    ("r5", "configure setup"),
];

fn coordinator(
    store: &Arc<kbsearch::EmbeddingStore>,
    generator: VocabularyGenerator,
) -> (BackfillCoordinator, Arc<VocabularyGenerator>) {
    let generator = Arc::new(generator);
    let encoder = BoundedEncoder::new(generator.clone(), Duration::from_secs(5));
    (BackfillCoordinator::new(Arc::clone(store), encoder), generator)
}

#[tokio::test]
async fn test_failed_middle_batch_does_not_stop_the_run() {
    let store = store_with(FIVE_RECORDS);
    let (coordinator, generator) = coordinator(
        &store,
        VocabularyGenerator::new(KB_VOCABULARY).failing_on("unavailable-provider"),
    );

    let report = coordinator.run_backfill(2).await;

    // Batches are [r1 r2] [r3 r4] [r5]; only the middle one fails
    assert_eq!(generator.batches.load(Ordering::SeqCst), 3);
    assert_eq!(report.total_missing, 5);
    assert_eq!(report.generated, 3);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.failed_ids, vec![RecordId::new("r3"), RecordId::new("r4")]);
    assert!(!report.is_complete());

    for id in ["r1", "r2", "r5"] {
        assert!(store.get(&RecordId::new(id)).unwrap().is_some(), "{id} embedded");
    }
    for id in ["r3", "r4"] {
        assert!(store.get(&RecordId::new(id)).unwrap().is_none(), "{id} pending");
    }
}

#[tokio::test]
async fn test_rerun_converges_once_provider_recovers() {
    let store = store_with(FIVE_RECORDS);
    let (failing, _) = coordinator(
        &store,
        VocabularyGenerator::new(KB_VOCABULARY).failing_on("unavailable-provider"),
    );
    failing.run_backfill(2).await;

    let (healthy, _) = coordinator(&store, VocabularyGenerator::new(KB_VOCABULARY));
    let report = healthy.run_backfill(2).await;

    assert_eq!(report.total_missing, 2);
    assert_eq!(report.generated, 2);
    assert!(report.is_complete());
    assert!(store.all_missing_embeddings().is_empty());
    assert_eq!(store.embedding_count(), 5);
}

#[tokio::test]
async fn test_timed_out_batch_counts_as_failed() {
    let store = store_with(&[("slow", "python")]);
    let generator = Arc::new(VocabularyGenerator::new(KB_VOCABULARY).slow(Duration::from_millis(300)));
    let encoder = BoundedEncoder::new(generator, Duration::from_millis(20));
    let coordinator = BackfillCoordinator::new(Arc::clone(&store), encoder);

    let report = coordinator.run_backfill(10).await;

    assert_eq!(report.generated, 0);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.failed_ids, vec![RecordId::new("slow")]);
    assert_eq!(store.all_missing_embeddings().len(), 1);
}

#[tokio::test]
async fn test_backfilled_records_become_searchable() {
    let store = store_with(KB_CORPUS);
    let (coordinator, _) = coordinator(&store, VocabularyGenerator::new(KB_VOCABULARY));

    let (capability, _) = capability(VocabularyGenerator::new(KB_VOCABULARY));
    let service = SearchService::new(Arc::clone(&store), &capability, SemanticSearchConfig::default());
    assert!(service.search("python setup", None, None).await.unwrap().is_empty());

    let mut seen = Vec::new();
    let report = coordinator
        .run_with_progress(2, |progress| seen.push((progress.batch, progress.processed)))
        .await;
    assert_eq!(report.generated, 3);
    assert_eq!(seen, vec![(1, 2), (2, 3)]);

    let results = service.search("python setup", Some(2), None).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "C"]);
}
