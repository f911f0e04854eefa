use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::vector::Score;

/// Arbitrary record fields carried through search untouched.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Stable identifier of a knowledge-base record.
///
/// Ids are assigned by whoever owns the record (typically a UUID string) and
/// never change. Ordering is plain byte-wise string order, which is also the
/// tie-break order for equal search scores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// SHA-256 of the text an embedding was computed from, hex encoded.
///
/// An embedding is only trusted while its hash equals the hash of the
/// record's current text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let result = hasher.finalize();
        Self(format!("{result:x}"))
    }

    /// Wrap an already computed hex digest, e.g. one read back from disk.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A question/answer record as seen by the retrieval core.
///
/// Only `text` is embedded; `payload` (answer, author, timestamps...) is
/// opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub text: String,
    #[serde(default)]
    pub payload: Payload,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            payload: Payload::new(),
        }
    }

    /// Adds one payload field, replacing any previous value under `key`.
    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

/// A record with a decoded embedding, eligible for ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: RecordId,
    pub text: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// A record lacking a current embedding, as handed to backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEmbedding {
    pub id: RecordId,
    pub text: String,
    /// Hash of `text` at snapshot time; the vector is only attached if the
    /// record still carries this text when the batch completes.
    pub source: ContentHash,
}

/// One ranked hit returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: RecordId,
    pub text: String,
    pub payload: Payload,
    pub score: Score,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic_hex() {
        let a = ContentHash::of("install python guide");
        let b = ContentHash::of("install python guide");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn content_hash_tracks_text_changes() {
        assert_ne!(
            ContentHash::of("configure git remote"),
            ContentHash::of("configure git remotes")
        );
    }

    #[test]
    fn record_id_orders_bytewise() {
        let mut ids = vec![RecordId::new("b"), RecordId::new("B"), RecordId::new("a")];
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(RecordId::as_str).collect();
        assert_eq!(ordered, vec!["B", "a", "b"]);
    }

    #[test]
    fn record_builder_collects_payload() {
        let record = Record::new("q1", "What is Python?")
            .with_field("answer", "A programming language")
            .with_field("created_by", 12345);

        assert_eq!(record.id.as_str(), "q1");
        assert_eq!(record.payload["answer"], "A programming language");
        assert_eq!(record.payload["created_by"], 12345);
    }
}
