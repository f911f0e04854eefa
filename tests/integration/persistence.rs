//! Store directories written by one process and read by the next.

use std::fs;
use std::sync::Arc;

use kbsearch::storage::{EMBEDDINGS_FILE, RECORDS_FILE};
use kbsearch::vector::codec;
use kbsearch::{
    ContentHash, EmbeddingStore, Record, RecordId, SearchService, SemanticSearchConfig,
    StoreError, StorePersistence, VectorError,
};
use tempfile::TempDir;

use crate::common::{KB_CORPUS, KB_VOCABULARY, VocabularyGenerator, capability, embedded_store};

#[test]
fn test_decode_rejects_three_byte_buffer() {
    let err = codec::decode(&[0x01, 0x02, 0x03]).unwrap_err();
    assert!(matches!(err, VectorError::CorruptEmbedding { byte_len: 3, .. }));
}

#[tokio::test]
async fn test_saved_store_answers_the_same_queries() {
    let temp = TempDir::new().unwrap();
    let persistence = StorePersistence::new(temp.path().join("store"));
    let generator = VocabularyGenerator::new(KB_VOCABULARY);
    let store = embedded_store(KB_CORPUS, &generator);
    store
        .insert_record(Record::new("D", "unembedded").with_field("answer", "later"))
        .unwrap();

    let metadata = persistence.save(&store, Some("test-vocabulary")).unwrap();
    assert_eq!(metadata.record_count, 4);
    assert_eq!(metadata.embedding_count, 3);
    assert_eq!(metadata.dimension, Some(KB_VOCABULARY.len()));

    let (loaded, metadata) = persistence.load().unwrap();
    assert_eq!(metadata.model_name.as_deref(), Some("test-vocabulary"));
    assert_eq!(loaded.records(), store.records());
    assert_eq!(loaded.all_missing_embeddings().len(), 1);

    let (capability, _) = capability(generator);
    let service = SearchService::new(Arc::new(loaded), &capability, SemanticSearchConfig::default());
    let ids: Vec<String> = service
        .search("python setup", Some(2), None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(ids, vec!["A", "C"]);
}

#[test]
fn test_missing_directory_loads_empty() {
    let temp = TempDir::new().unwrap();
    let persistence = StorePersistence::new(temp.path().join("nothing-here"));
    assert!(!persistence.exists());

    let (store, metadata) = persistence.load_or_default().unwrap();
    assert_eq!(store.record_count(), 0);
    assert!(metadata.model_name.is_none());
}

#[test]
fn test_save_without_model_keeps_previous_name() {
    let temp = TempDir::new().unwrap();
    let persistence = StorePersistence::new(temp.path());
    let store = EmbeddingStore::new();
    store.insert_record(Record::new("a", "python")).unwrap();

    persistence.save(&store, Some("first-model")).unwrap();
    store.remove_record(&RecordId::new("a"));
    let metadata = persistence.save(&store, None).unwrap();

    assert_eq!(metadata.model_name.as_deref(), Some("first-model"));
    assert_eq!(metadata.record_count, 0);
}

fn chunk(bytes: &[u8]) -> Vec<u8> {
    let mut out = (bytes.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(bytes);
    out
}

/// Write a store whose only embedding blob is three bytes long.
fn write_damaged_store(dir: &std::path::Path) {
    let record = Record::new("A", "install python guide");
    fs::write(
        dir.join(RECORDS_FILE),
        serde_json::to_vec(&vec![&record]).unwrap(),
    )
    .unwrap();

    let mut file = b"KBEV".to_vec();
    for value in [1u32, 0, 1] {
        file.extend_from_slice(&value.to_le_bytes());
    }
    file.extend(chunk(b"A"));
    file.extend(chunk(ContentHash::of(&record.text).as_str().as_bytes()));
    file.extend(chunk(&[0xde, 0xad, 0xbe]));
    fs::write(dir.join(EMBEDDINGS_FILE), file).unwrap();
}

#[test]
fn test_corrupt_blob_is_isolated_and_requeued() {
    let temp = TempDir::new().unwrap();
    write_damaged_store(temp.path());

    let (store, _) = StorePersistence::new(temp.path()).load().unwrap();
    let id = RecordId::new("A");

    assert!(matches!(
        store.get(&id),
        Err(StoreError::Vector(VectorError::CorruptEmbedding { byte_len: 3, .. }))
    ));
    let scan = store.scan_candidates();
    assert!(scan.candidates.is_empty());
    assert_eq!(scan.corrupt, vec![id.clone()]);

    let pending = store.all_missing_embeddings();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
}

#[test]
fn test_truncated_embedding_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    write_damaged_store(temp.path());
    let path = temp.path().join(EMBEDDINGS_FILE);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

    assert!(matches!(
        StorePersistence::new(temp.path()).load(),
        Err(StoreError::InvalidFormat { .. })
    ));
}
