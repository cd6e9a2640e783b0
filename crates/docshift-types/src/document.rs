//! Document records, scan batches, and transform outcomes.

use serde::{Deserialize, Serialize};

use crate::state::TransformFailureKind;

/// Opaque continuation token for a paginated scan.
///
/// Produced and interpreted only by the cluster client; the engine
/// persists it verbatim so an interrupted scan resumes from the last
/// confirmed batch instead of the beginning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorToken(String);

impl CursorToken {
    /// Create a new cursor token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CursorToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single stored document as read from (or written to) the cluster.
///
/// Transient during migration: read from source, possibly rewritten by
/// a transform, written to target, then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Cluster document id.
    pub id: String,
    /// Registered document type (selects the transform).
    pub doc_type: String,
    /// Schema version tag the payload was written at.
    pub schema_version: u32,
    /// Raw attributes payload.
    pub attributes: serde_json::Value,
    /// Sequence number for optimistic writes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq_no: Option<u64>,
    /// Primary term for optimistic writes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_term: Option<u64>,
}

/// One page of an outdated-documents scan.
///
/// `continuation` is `None` once the scan is exhausted; an empty
/// `documents` with a token still present means "call again".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentBatch {
    pub documents: Vec<DocumentRecord>,
    pub continuation: Option<CursorToken>,
}

impl DocumentBatch {
    /// An exhausted scan: no documents, no continuation.
    #[must_use]
    pub fn exhausted() -> Self {
        Self {
            documents: Vec::new(),
            continuation: None,
        }
    }
}

/// Classified failure of a single document transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformFailure {
    /// Id of the offending document, for diagnostics.
    pub doc_id: String,
    pub kind: TransformFailureKind,
    pub message: String,
}

impl std::fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] doc '{}': {}", self.kind, self.doc_id, self.message)
    }
}

/// Outcome of applying a registered transform to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The document in current shape, ready for bulk indexing.
    Transformed(DocumentRecord),
    /// The document could not be transformed; recorded and skipped.
    Failed(TransformFailure),
}

/// Failure of one item inside an otherwise accepted bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    pub doc_id: String,
    pub error: crate::error::ClusterError,
}

/// Result of a bulk write: per-item failures do not fail the call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkResponse {
    pub indexed: u64,
    pub failures: Vec<BulkItemFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_round_trips_through_json() {
        let doc = DocumentRecord {
            id: "a:1".into(),
            doc_type: "a".into(),
            schema_version: 1,
            attributes: json!({"title": "hello"}),
            seq_no: Some(7),
            primary_term: Some(1),
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn seq_metadata_is_omitted_when_absent() {
        let doc = DocumentRecord {
            id: "a:1".into(),
            doc_type: "a".into(),
            schema_version: 1,
            attributes: json!({}),
            seq_no: None,
            primary_term: None,
        };
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("seq_no"));
    }

    #[test]
    fn exhausted_batch_has_no_continuation() {
        let batch = DocumentBatch::exhausted();
        assert!(batch.documents.is_empty());
        assert!(batch.continuation.is_none());
    }
}
