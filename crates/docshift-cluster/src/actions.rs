//! Storage action executor trait.
//!
//! One method per cluster side effect. Every call resolves to either a
//! success value or a classified [`ClusterError`]; no outcome is ever
//! swallowed. The state machine suspends on each call and never issues
//! two operations for the same run concurrently.

use std::time::Duration;

use async_trait::async_trait;
use docshift_types::{
    AliasAction, BulkResponse, ClusterError, ControlRecord, CursorToken, DocumentBatch,
    DocumentRecord, HealthStatus, IndexDescriptor, IndexFamily, IndexName, Mappings,
    MigrationState, OutdatedQuery,
};

/// Low-level cluster operations used by the migration state machine.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn ClusterActions>`.
#[async_trait]
pub trait ClusterActions: Send + Sync {
    /// Fetch the descriptor of an index, or `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on any other failure.
    async fn fetch_index(&self, name: &IndexName) -> Result<Option<IndexDescriptor>, ClusterError>;

    /// Resolve an alias to the index it points at, or `Ok(None)` if unbound.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure.
    async fn resolve_alias(&self, alias: &str) -> Result<Option<IndexName>, ClusterError>;

    /// Create an index with the given mappings.
    ///
    /// Returns `true` if the index was created, `false` if it already
    /// existed (idempotent re-run).
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure.
    async fn create_index(
        &self,
        name: &IndexName,
        mappings: &Mappings,
    ) -> Result<bool, ClusterError>;

    /// Clone `source` into `target` without copying data.
    ///
    /// Returns `true` if the clone was performed, `false` if the target
    /// already existed (idempotent re-run). Requires `source` to be
    /// write-blocked.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure.
    async fn clone_index(
        &self,
        source: &IndexName,
        target: &IndexName,
    ) -> Result<bool, ClusterError>;

    /// Set or clear the write block on an index. The index stays readable.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure.
    async fn set_write_block(&self, name: &IndexName, blocked: bool) -> Result<(), ClusterError>;

    /// Replace the mappings of an existing index.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError`] with a `mapping_conflict` category when
    /// the cluster rejects the new mappings.
    async fn put_mappings(&self, name: &IndexName, mappings: &Mappings)
        -> Result<(), ClusterError>;

    /// Apply a set of alias changes in one atomic cluster call.
    ///
    /// At no observable instant does an alias covered by `actions`
    /// resolve to neither its old nor its new index.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure; partial application must
    /// not occur.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), ClusterError>;

    /// Wait until the index reaches at least `at_least` health.
    ///
    /// # Errors
    ///
    /// Returns a retryable [`ClusterError`] if the timeout elapses first.
    async fn wait_for_health(
        &self,
        name: &IndexName,
        at_least: HealthStatus,
        timeout: Duration,
    ) -> Result<HealthStatus, ClusterError>;

    /// Cluster-side copy of every document from `source` into `dest`.
    ///
    /// Returns the number of documents copied.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure.
    async fn reindex(&self, source: &IndexName, dest: &IndexName) -> Result<u64, ClusterError>;

    /// Count the documents in an index.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure.
    async fn count_documents(&self, name: &IndexName) -> Result<u64, ClusterError>;

    /// Open a server-side cursor over documents matching `query`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure.
    async fn open_cursor(
        &self,
        name: &IndexName,
        query: &OutdatedQuery,
        batch_size: u32,
    ) -> Result<CursorToken, ClusterError>;

    /// Fetch the next page of a cursor scan.
    ///
    /// An empty page with no continuation signals exhaustion.
    ///
    /// # Errors
    ///
    /// Returns a `not_found` [`ClusterError`] if the cursor expired.
    async fn next_page(&self, cursor: &CursorToken) -> Result<DocumentBatch, ClusterError>;

    /// Release a cursor. Best effort; an expired cursor is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure.
    async fn close_cursor(&self, cursor: &CursorToken) -> Result<(), ClusterError>;

    /// Bulk-write documents into an index, overwriting by id.
    ///
    /// Per-item failures are reported in the response, not as a call
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] only when the request as a whole fails.
    async fn bulk_index(
        &self,
        name: &IndexName,
        documents: &[DocumentRecord],
    ) -> Result<BulkResponse, ClusterError>;

    /// Read the migration control record for a family, or `Ok(None)` if
    /// no run has ever persisted state.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on failure.
    async fn read_control(
        &self,
        family: &IndexFamily,
    ) -> Result<Option<ControlRecord>, ClusterError>;

    /// Compare-and-set the migration control record.
    ///
    /// `expected_seq` of `None` means insert-if-absent. Returns the new
    /// sequence number when applied, or `Ok(None)` when the record
    /// changed underneath us (another controller owns the run).
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] on storage failure.
    async fn cas_control(
        &self,
        family: &IndexFamily,
        state: &MigrationState,
        expected_seq: Option<u64>,
    ) -> Result<Option<u64>, ClusterError>;
}
