//! On-disk layout of a store directory.
//!
//! ```text
//! <store_path>/
//!   metadata.json    StoreMetadata
//!   records.json     records (id, text, payload)
//!   embeddings.vec   binary embedding file
//! ```
//!
//! # Embedding file format
//!
//! - Header (16 bytes): magic `KBEV`, version, dimension (0 if unknown),
//!   entry count, all u32 little-endian
//! - Entries: `id_len u32 | id | hash_len u32 | hash | blob_len u32 | blob`
//!
//! Blobs are copied verbatim from the store and decoded lazily, so one
//! damaged blob only affects its own record. Every file is written to a
//! temporary sibling and renamed into place.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::storage::embedding_store::StoredEmbedding;
use crate::storage::{EmbeddingStore, StoreError, StoreMetadata, StoreResult};
use crate::types::{ContentHash, Record};
use crate::vector::VectorDimension;

pub const RECORDS_FILE: &str = "records.json";
pub const EMBEDDINGS_FILE: &str = "embeddings.vec";

const STORAGE_VERSION: u32 = 1;
const HEADER_SIZE: usize = 16;
const MAGIC_BYTES: &[u8; 4] = b"KBEV";

/// Saves and loads an [`EmbeddingStore`] under one directory.
#[derive(Debug, Clone)]
pub struct StorePersistence {
    base_path: PathBuf,
}

impl StorePersistence {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Whether a store has been saved here before.
    pub fn exists(&self) -> bool {
        self.base_path.join(RECORDS_FILE).exists()
    }

    /// Write the store and return the metadata that was saved.
    ///
    /// `model_name` records which model produced the embeddings; `None`
    /// keeps whatever the previous save recorded.
    #[must_use = "Save errors should be handled to ensure data is persisted"]
    pub fn save(
        &self,
        store: &EmbeddingStore,
        model_name: Option<&str>,
    ) -> StoreResult<StoreMetadata> {
        fs::create_dir_all(&self.base_path).map_err(|e| StoreError::io(&self.base_path, e))?;

        let entries = store.export_entries();
        let records: Vec<&Record> = entries.iter().map(|(record, _)| record).collect();
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize records: {e}")))?;
        self.write_atomic(RECORDS_FILE, |writer| writer.write_all(&json))?;

        let embeddings: Vec<(&Record, &StoredEmbedding)> = entries
            .iter()
            .filter_map(|(record, embedding)| embedding.as_ref().map(|e| (record, e)))
            .collect();
        let dimension = store.dimension().map(|d| d.get()).unwrap_or(0);
        self.write_atomic(EMBEDDINGS_FILE, |writer| {
            write_embeddings(writer, dimension, &embeddings)
        })?;

        let mut metadata = if StoreMetadata::exists(&self.base_path) {
            StoreMetadata::load(&self.base_path)?
        } else {
            StoreMetadata::new()
        };
        if let Some(name) = model_name {
            metadata.model_name = Some(name.to_string());
        }
        metadata.dimension = store.dimension().map(|d| d.get());
        metadata.update_counts(store.record_count(), store.embedding_count());
        metadata.save(&self.base_path)?;

        info!(
            path = %self.base_path.display(),
            records = metadata.record_count,
            embeddings = metadata.embedding_count,
            "store saved"
        );
        Ok(metadata)
    }

    /// Load a previously saved store.
    pub fn load(&self) -> StoreResult<(EmbeddingStore, StoreMetadata)> {
        let metadata = if StoreMetadata::exists(&self.base_path) {
            StoreMetadata::load(&self.base_path)?
        } else {
            StoreMetadata::new()
        };

        let records_path = self.base_path.join(RECORDS_FILE);
        let json = fs::read(&records_path).map_err(|e| StoreError::io(&records_path, e))?;
        let records: Vec<Record> = serde_json::from_slice(&json).map_err(|e| {
            StoreError::invalid_format(&records_path, format!("unreadable records: {e}"))
        })?;

        let embeddings_path = self.base_path.join(EMBEDDINGS_FILE);
        let (dimension, embeddings) = if embeddings_path.exists() {
            read_embeddings(&embeddings_path)?
        } else {
            (None, Vec::new())
        };

        let store = match dimension {
            Some(dimension) => EmbeddingStore::with_dimension(dimension),
            None => EmbeddingStore::new(),
        };

        let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let mut attached = std::collections::HashMap::new();
        for (id, embedding) in embeddings {
            if known.contains(id.as_str()) {
                attached.insert(id, embedding);
            } else {
                warn!(%id, "dropping embedding for unknown record");
            }
        }

        for record in records {
            let embedding = attached.remove(record.id.as_str());
            store.restore_entry(record, embedding);
        }

        debug!(
            path = %self.base_path.display(),
            records = store.record_count(),
            embeddings = store.embedding_count(),
            "store loaded"
        );
        Ok((store, metadata))
    }

    /// Load the store if one exists, otherwise start empty.
    pub fn load_or_default(&self) -> StoreResult<(EmbeddingStore, StoreMetadata)> {
        if self.exists() {
            self.load()
        } else {
            Ok((EmbeddingStore::new(), StoreMetadata::new()))
        }
    }

    fn write_atomic<F>(&self, file_name: &str, write: F) -> StoreResult<()>
    where
        F: FnOnce(&mut BufWriter<&mut File>) -> std::io::Result<()>,
    {
        let path = self.base_path.join(file_name);
        let mut temp =
            NamedTempFile::new_in(&self.base_path).map_err(|e| StoreError::io(&path, e))?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            write(&mut writer).map_err(|e| StoreError::io(&path, e))?;
            writer.flush().map_err(|e| StoreError::io(&path, e))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(&path, e))?;
        temp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;
        Ok(())
    }
}

fn write_embeddings<W: Write>(
    writer: &mut W,
    dimension: usize,
    entries: &[(&Record, &StoredEmbedding)],
) -> std::io::Result<()> {
    writer.write_all(MAGIC_BYTES)?;
    writer.write_all(&STORAGE_VERSION.to_le_bytes())?;
    writer.write_all(&(dimension as u32).to_le_bytes())?;
    writer.write_all(&(entries.len() as u32).to_le_bytes())?;

    for (record, embedding) in entries {
        write_chunk(writer, record.id.as_str().as_bytes())?;
        write_chunk(writer, embedding.source.as_str().as_bytes())?;
        write_chunk(writer, &embedding.bytes)?;
    }
    Ok(())
}

fn write_chunk<W: Write>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(bytes)
}

type EmbeddingEntries = Vec<(String, StoredEmbedding)>;

fn read_embeddings(path: &Path) -> StoreResult<(Option<VectorDimension>, EmbeddingEntries)> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let len = file.metadata().map_err(|e| StoreError::io(path, e))?.len();
    if len < HEADER_SIZE as u64 {
        return Err(StoreError::invalid_format(
            path,
            "file too small to contain header",
        ));
    }

    // SAFETY: the file is only ever replaced by rename, never modified in place
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| StoreError::io(path, e))?;
    let mut reader = ByteReader::new(&mmap);

    let truncated = || StoreError::invalid_format(path, "unexpected end of file");

    if reader.take(4).ok_or_else(truncated)? != MAGIC_BYTES {
        return Err(StoreError::invalid_format(path, "invalid magic bytes"));
    }
    let version = reader.read_u32().ok_or_else(truncated)?;
    if version > STORAGE_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: version,
            supported: STORAGE_VERSION,
        });
    }
    let dimension = match reader.read_u32().ok_or_else(truncated)? {
        0 => None,
        value => Some(VectorDimension::new(value as usize)?),
    };
    let count = reader.read_u32().ok_or_else(truncated)? as usize;
    // Each entry carries at least three length prefixes
    if count > reader.remaining() / (3 * 4) {
        return Err(StoreError::invalid_format(
            path,
            format!(
                "header announces {count} entries but only {} bytes follow",
                reader.remaining()
            ),
        ));
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let id = reader.read_string(path)?.ok_or_else(truncated)?;
        let source = reader.read_string(path)?.ok_or_else(truncated)?;
        let bytes = reader.read_chunk().ok_or_else(truncated)?.to_vec();
        entries.push((
            id,
            StoredEmbedding {
                bytes,
                source: ContentHash::from_hex(source),
            },
        ));
    }

    Ok((dimension, entries))
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        let slice = self.bytes.get(self.offset..end)?;
        self.offset = end;
        Some(slice)
    }

    fn read_u32(&mut self) -> Option<u32> {
        let raw: [u8; 4] = self.take(4)?.try_into().ok()?;
        Some(u32::from_le_bytes(raw))
    }

    fn read_chunk(&mut self) -> Option<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    fn read_string(&mut self, path: &Path) -> StoreResult<Option<String>> {
        match self.read_chunk() {
            Some(raw) => String::from_utf8(raw.to_vec())
                .map(Some)
                .map_err(|_| StoreError::invalid_format(path, "entry key is not valid UTF-8")),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;
    use tempfile::TempDir;

    fn sample_store() -> EmbeddingStore {
        let store = EmbeddingStore::new();
        store
            .insert_record(Record::new("q1", "install python guide").with_field("answer", "pip"))
            .unwrap();
        store
            .insert_record(Record::new("q2", "configure git remote"))
            .unwrap();
        store.put(&RecordId::new("q1"), &[0.25, -0.5, 1.0]).unwrap();
        store
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = StorePersistence::new(temp_dir.path());

        let metadata = persistence.save(&sample_store(), Some("mock")).unwrap();
        assert_eq!(metadata.record_count, 2);
        assert_eq!(metadata.embedding_count, 1);
        assert_eq!(metadata.dimension, Some(3));

        let (loaded, metadata) = persistence.load().unwrap();
        assert_eq!(metadata.model_name.as_deref(), Some("mock"));
        assert_eq!(loaded.record_count(), 2);
        assert_eq!(
            loaded.get(&RecordId::new("q1")).unwrap(),
            Some(vec![0.25, -0.5, 1.0])
        );
        assert_eq!(loaded.get(&RecordId::new("q2")).unwrap(), None);
        assert_eq!(
            loaded.record(&RecordId::new("q1")).unwrap().payload["answer"],
            "pip"
        );
        assert_eq!(loaded.dimension().unwrap().get(), 3);
    }

    #[test]
    fn test_save_keeps_previous_model_name() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = StorePersistence::new(temp_dir.path());

        persistence.save(&sample_store(), Some("mock")).unwrap();
        let metadata = persistence.save(&sample_store(), None).unwrap();
        assert_eq!(metadata.model_name.as_deref(), Some("mock"));
    }

    #[test]
    fn test_load_or_default_on_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = StorePersistence::new(temp_dir.path().join("missing"));
        assert!(!persistence.exists());

        let (store, metadata) = persistence.load_or_default().unwrap();
        assert_eq!(store.record_count(), 0);
        assert_eq!(metadata.record_count, 0);
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = StorePersistence::new(temp_dir.path());
        persistence.save(&sample_store(), None).unwrap();

        let path = temp_dir.path().join(EMBEDDINGS_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0..4].copy_from_slice(b"NOPE");
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            persistence.load(),
            Err(StoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = StorePersistence::new(temp_dir.path());
        persistence.save(&sample_store(), None).unwrap();

        let path = temp_dir.path().join(EMBEDDINGS_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        assert!(matches!(
            persistence.load(),
            Err(StoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_oversized_entry_count_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = StorePersistence::new(temp_dir.path());
        persistence.save(&sample_store(), None).unwrap();

        let mut header = MAGIC_BYTES.to_vec();
        header.extend_from_slice(&STORAGE_VERSION.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(header.len(), HEADER_SIZE);
        fs::write(temp_dir.path().join(EMBEDDINGS_FILE), header).unwrap();

        match persistence.load() {
            Err(StoreError::InvalidFormat { reason, .. }) => {
                assert!(reason.contains("entries"), "unexpected reason: {reason}")
            }
            other => panic!("Expected InvalidFormat, got {other:?}"),
        }
    }
}
