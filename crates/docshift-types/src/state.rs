//! Migration run state: phases, resume context, lease, and log entries.
//!
//! [`MigrationState`] is the single mutable record driving a run. It is
//! serializable and persisted to the cluster after every committed
//! transition so a crashed run can resume from where it left off and a
//! second instance can detect a run that already finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::CursorToken;
use crate::ids::{ControllerId, IndexFamily, IndexName};
use crate::index::Mappings;

/// State machine phases, in nominal order of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Init,
    WaitForYellowSource,
    SetSourceWriteBlock,
    CreateReindexTemp,
    ReindexSourceToTemp,
    SetTempWriteBlock,
    CloneTempToTarget,
    UpdateTargetMappings,
    OutdatedDocumentsSearch,
    OutdatedDocumentsTransform,
    TransformedDocumentsBulkIndex,
    MarkVersionIndexReady,
    Done,
    Fatal,
}

impl MigrationPhase {
    /// Whether the run stops in this phase.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Fatal)
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::WaitForYellowSource => "wait_for_yellow_source",
            Self::SetSourceWriteBlock => "set_source_write_block",
            Self::CreateReindexTemp => "create_reindex_temp",
            Self::ReindexSourceToTemp => "reindex_source_to_temp",
            Self::SetTempWriteBlock => "set_temp_write_block",
            Self::CloneTempToTarget => "clone_temp_to_target",
            Self::UpdateTargetMappings => "update_target_mappings",
            Self::OutdatedDocumentsSearch => "outdated_documents_search",
            Self::OutdatedDocumentsTransform => "outdated_documents_transform",
            Self::TransformedDocumentsBulkIndex => "transformed_documents_bulk_index",
            Self::MarkVersionIndexReady => "mark_version_index_ready",
            Self::Done => "done",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Classification of a per-document transform failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformFailureKind {
    /// No transform registered for the (type, version) pair.
    UnknownType,
    /// Payload could not be interpreted by the transform.
    CorruptPayload,
    /// The transform function itself failed.
    TransformError,
    /// The document could not be written after per-document retries.
    WriteConflict,
}

impl std::fmt::Display for TransformFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnknownType => "unknown_type",
            Self::CorruptPayload => "corrupt_payload",
            Self::TransformError => "transform_error",
            Self::WriteConflict => "write_conflict",
        };
        f.write_str(s)
    }
}

/// A document recorded and skipped rather than migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub doc_id: String,
    pub kind: TransformFailureKind,
    pub reason: String,
}

/// Controller ownership record, stored with the migration state.
///
/// Acquired and renewed with compare-and-set; a second instance seeing
/// an unexpired lease from another controller defers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    pub controller: ControllerId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaseInfo {
    /// Whether this lease has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Append-only record of one state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationLogEntry {
    pub timestamp: DateTime<Utc>,
    /// Phase the transition left.
    pub phase: MigrationPhase,
    /// Outcome summary, human readable.
    pub detail: String,
}

/// The sole mutable object driving one index-family migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    pub family: IndexFamily,
    pub phase: MigrationPhase,
    pub source_index: Option<IndexName>,
    pub temp_index: IndexName,
    pub target_index: IndexName,
    pub target_mappings: Mappings,
    /// Continuation token of the next unprocessed scan batch. Advanced
    /// only after the corresponding batch is fully written to target.
    pub cursor: Option<CursorToken>,
    /// Source document count at the time the write block was applied.
    pub source_doc_count: u64,
    /// Documents confirmed copied by the cluster-side reindex.
    pub docs_copied: u64,
    pub docs_scanned: u64,
    pub docs_transformed: u64,
    pub docs_indexed: u64,
    /// Skip log: documents recorded and dropped. Never rewritten.
    pub skipped: Vec<SkippedDocument>,
    /// Transition log. Monotonic, append-only.
    pub log: Vec<MigrationLogEntry>,
    /// Cause of a fatal halt, when `phase` is [`MigrationPhase::Fatal`].
    pub fatal_cause: Option<String>,
    /// Last phase completed before a fatal halt.
    pub last_completed_phase: Option<MigrationPhase>,
    pub lease: Option<LeaseInfo>,
}

impl MigrationState {
    /// Fresh state for a new run of `family` toward `target_mappings`.
    #[must_use]
    pub fn new(family: IndexFamily, target_mappings: Mappings) -> Self {
        let version = target_mappings.version;
        Self {
            temp_index: family.reindex_temp_index(version),
            target_index: family.versioned_index(version),
            family,
            phase: MigrationPhase::Init,
            source_index: None,
            target_mappings,
            cursor: None,
            source_doc_count: 0,
            docs_copied: 0,
            docs_scanned: 0,
            docs_transformed: 0,
            docs_indexed: 0,
            skipped: Vec::new(),
            log: Vec::new(),
            fatal_cause: None,
            last_completed_phase: None,
            lease: None,
        }
    }

    /// Append a transition log entry. Entries are never rewritten.
    pub fn log_transition(&mut self, phase: MigrationPhase, detail: impl Into<String>) {
        self.log.push(MigrationLogEntry {
            timestamp: Utc::now(),
            phase,
            detail: detail.into(),
        });
    }
}

/// Migration state as stored in the cluster's control document,
/// together with the sequence number used for compare-and-set updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub state: MigrationState,
    pub seq_no: u64,
}
