//! Migration run result types.

use docshift_types::{
    IndexName, MigrationLogEntry, MigrationPhase, MigrationState, SkippedDocument,
};

/// Aggregate document counts for a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationCounts {
    /// Documents in the source when the write block was applied.
    pub source_documents: u64,
    /// Documents confirmed copied by the raw reindex.
    pub documents_copied: u64,
    pub documents_scanned: u64,
    pub documents_transformed: u64,
    pub documents_indexed: u64,
    pub documents_skipped: u64,
}

/// Result of a completed (or halted) migration run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub family: String,
    pub final_phase: MigrationPhase,
    pub source_index: Option<IndexName>,
    pub target_index: IndexName,
    pub counts: MigrationCounts,
    pub duration_secs: f64,
    /// Cluster call retries issued over the whole run.
    pub retry_count: u32,
    /// Documents recorded and dropped rather than migrated.
    pub skipped: Vec<SkippedDocument>,
    /// Per-transition log, in order.
    pub log: Vec<MigrationLogEntry>,
}

impl MigrationReport {
    /// Build a report from final run state.
    #[must_use]
    pub fn from_state(state: &MigrationState, duration_secs: f64, retry_count: u32) -> Self {
        Self {
            family: state.family.as_str().to_string(),
            final_phase: state.phase,
            source_index: state.source_index.clone(),
            target_index: state.target_index.clone(),
            counts: MigrationCounts {
                source_documents: state.source_doc_count,
                documents_copied: state.docs_copied,
                documents_scanned: state.docs_scanned,
                documents_transformed: state.docs_transformed,
                documents_indexed: state.docs_indexed,
                documents_skipped: state.skipped.len() as u64,
            },
            duration_secs,
            retry_count,
            skipped: state.skipped.clone(),
            log: state.log.clone(),
        }
    }
}
