//! Deterministic in-memory implementation of [`ClusterActions`].
//!
//! Models indices, aliases, write blocks, documents, cursors, and
//! control documents behind a single mutex, with scripted fault
//! injection so engine tests can exercise retry and failure paths
//! without a live cluster.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use docshift_types::{
    AliasAction, BulkItemFailure, BulkResponse, ClusterError, ControlRecord, CursorToken,
    DocumentBatch, DocumentRecord, HealthStatus, IndexDescriptor, IndexFamily, IndexName,
    Mappings, MigrationState, OutdatedQuery,
};

use crate::actions::ClusterActions;

#[derive(Debug, Clone)]
struct IndexRec {
    mappings: Mappings,
    write_blocked: bool,
    docs: BTreeMap<String, DocumentRecord>,
}

#[derive(Debug, Clone)]
struct CursorRec {
    /// Snapshot of matching ids at open time, in scan order.
    ids: Vec<String>,
    index: String,
    batch: usize,
}

#[derive(Default)]
struct Inner {
    indices: BTreeMap<String, IndexRec>,
    /// alias -> index name.
    aliases: BTreeMap<String, String>,
    cursors: BTreeMap<u64, CursorRec>,
    next_cursor: u64,
    control: BTreeMap<String, (MigrationState, u64)>,
    next_seq: u64,
    health: BTreeMap<String, HealthStatus>,
    /// Scripted per-operation failures, consumed front to back.
    faults: BTreeMap<String, VecDeque<ClusterError>>,
    /// One-shot failures keyed by absolute operation call index.
    fail_at_call: BTreeMap<u64, ClusterError>,
    /// Scripted per-document bulk item failures.
    doc_faults: BTreeMap<String, VecDeque<ClusterError>>,
    /// Next reindex copies only this many documents (one-shot).
    short_reindex: Option<u64>,
    call_count: u64,
    ops: Vec<String>,
}

/// In-memory cluster for tests.
#[derive(Default)]
pub struct InMemoryCluster {
    inner: Mutex<Inner>,
}

impl InMemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and surface any scripted fault for `op`.
    fn gate(inner: &mut Inner, op: &str) -> Result<(), ClusterError> {
        inner.call_count += 1;
        inner.ops.push(op.to_string());
        let at_call = inner.fail_at_call.remove(&inner.call_count);
        if let Some(err) = at_call {
            return Err(err);
        }
        if let Some(queue) = inner.faults.get_mut(op) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        Ok(())
    }

    // -- test scripting -----------------------------------------------------

    /// Fail the next `times` calls of `op` with clones of `err`.
    pub fn fail_times(&self, op: &str, times: u32, err: ClusterError) {
        let mut inner = self.lock();
        let queue = inner.faults.entry(op.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    /// Fail the nth operation call (1-based, across all operations).
    pub fn fail_at_call(&self, nth: u64, err: ClusterError) {
        self.lock().fail_at_call.insert(nth, err);
    }

    /// Fail the next `times` bulk writes of a specific document.
    pub fn fail_doc_write(&self, doc_id: &str, times: u32, err: ClusterError) {
        let mut inner = self.lock();
        let queue = inner.doc_faults.entry(doc_id.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    /// Make the next reindex copy only `count` documents.
    pub fn short_copy_next_reindex(&self, count: u64) {
        self.lock().short_reindex = Some(count);
    }

    /// Override the reported health of an index (default green).
    pub fn set_health(&self, index: &str, status: HealthStatus) {
        self.lock().health.insert(index.to_string(), status);
    }

    // -- test seeding and inspection ----------------------------------------

    /// Create an index directly, bypassing fault gates.
    pub fn seed_index(&self, name: &str, mappings: Mappings) {
        self.lock().indices.insert(
            name.to_string(),
            IndexRec {
                mappings,
                write_blocked: false,
                docs: BTreeMap::new(),
            },
        );
    }

    /// Bind an alias directly.
    pub fn seed_alias(&self, alias: &str, index: &str) {
        self.lock()
            .aliases
            .insert(alias.to_string(), index.to_string());
    }

    /// Insert a document directly.
    ///
    /// # Panics
    ///
    /// Panics if the index was not seeded first.
    pub fn seed_document(&self, index: &str, doc: DocumentRecord) {
        let mut inner = self.lock();
        let rec = inner
            .indices
            .get_mut(index)
            .unwrap_or_else(|| panic!("seed_document: index '{index}' not seeded"));
        rec.docs.insert(doc.id.clone(), doc);
    }

    /// All documents in an index, in id order.
    #[must_use]
    pub fn documents(&self, index: &str) -> Vec<DocumentRecord> {
        self.lock()
            .indices
            .get(index)
            .map(|rec| rec.docs.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn index_exists(&self, index: &str) -> bool {
        self.lock().indices.contains_key(index)
    }

    #[must_use]
    pub fn is_write_blocked(&self, index: &str) -> bool {
        self.lock()
            .indices
            .get(index)
            .is_some_and(|rec| rec.write_blocked)
    }

    /// Index an alias currently resolves to.
    #[must_use]
    pub fn alias_target(&self, alias: &str) -> Option<String> {
        self.lock().aliases.get(alias).cloned()
    }

    /// Persisted migration state for a family, if any.
    #[must_use]
    pub fn control_state(&self, family: &str) -> Option<MigrationState> {
        self.lock()
            .control
            .get(family)
            .map(|(state, _)| state.clone())
    }

    /// Every operation issued so far, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.lock().ops.clone()
    }

    /// How many times `op` was issued (including faulted calls).
    #[must_use]
    pub fn op_count(&self, op: &str) -> usize {
        self.lock().ops.iter().filter(|o| o.as_str() == op).count()
    }
}

#[async_trait]
impl ClusterActions for InMemoryCluster {
    async fn fetch_index(&self, name: &IndexName) -> Result<Option<IndexDescriptor>, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "fetch_index")?;
        let Some(rec) = inner.indices.get(name.as_str()) else {
            return Ok(None);
        };
        let aliases = inner
            .aliases
            .iter()
            .filter(|(_, index)| index.as_str() == name.as_str())
            .map(|(alias, _)| alias.clone())
            .collect();
        Ok(Some(IndexDescriptor {
            name: name.clone(),
            aliases,
            write_blocked: rec.write_blocked,
            mappings: rec.mappings.clone(),
        }))
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<IndexName>, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "resolve_alias")?;
        Ok(inner.aliases.get(alias).cloned().map(IndexName::new))
    }

    async fn create_index(
        &self,
        name: &IndexName,
        mappings: &Mappings,
    ) -> Result<bool, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "create_index")?;
        if inner.indices.contains_key(name.as_str()) {
            return Ok(false);
        }
        inner.indices.insert(
            name.as_str().to_string(),
            IndexRec {
                mappings: mappings.clone(),
                write_blocked: false,
                docs: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    async fn clone_index(
        &self,
        source: &IndexName,
        target: &IndexName,
    ) -> Result<bool, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "clone_index")?;
        if inner.indices.contains_key(target.as_str()) {
            return Ok(false);
        }
        let src = inner
            .indices
            .get(source.as_str())
            .ok_or_else(|| ClusterError::not_found(format!("no such index '{source}'")))?
            .clone();
        if !src.write_blocked {
            return Err(ClusterError::bad_request(format!(
                "clone source '{source}' must be write-blocked"
            )));
        }
        // Clone inherits data, mappings, and the write block.
        inner.indices.insert(target.as_str().to_string(), src);
        Ok(true)
    }

    async fn set_write_block(&self, name: &IndexName, blocked: bool) -> Result<(), ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "set_write_block")?;
        let rec = inner
            .indices
            .get_mut(name.as_str())
            .ok_or_else(|| ClusterError::not_found(format!("no such index '{name}'")))?;
        rec.write_blocked = blocked;
        Ok(())
    }

    async fn put_mappings(
        &self,
        name: &IndexName,
        mappings: &Mappings,
    ) -> Result<(), ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "put_mappings")?;
        let rec = inner
            .indices
            .get_mut(name.as_str())
            .ok_or_else(|| ClusterError::not_found(format!("no such index '{name}'")))?;
        rec.mappings = mappings.clone();
        Ok(())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "update_aliases")?;
        // Applied under one lock: atomic from any observer's view.
        for action in actions {
            match action {
                AliasAction::Remove { index, alias } => {
                    if inner.aliases.get(alias) == Some(&index.as_str().to_string()) {
                        inner.aliases.remove(alias);
                    }
                }
                AliasAction::Add { index, alias } => {
                    inner
                        .aliases
                        .insert(alias.clone(), index.as_str().to_string());
                }
            }
        }
        Ok(())
    }

    async fn wait_for_health(
        &self,
        name: &IndexName,
        at_least: HealthStatus,
        _timeout: Duration,
    ) -> Result<HealthStatus, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "wait_for_health")?;
        let status = inner
            .health
            .get(name.as_str())
            .copied()
            .unwrap_or(HealthStatus::Green);
        if status < at_least {
            return Err(ClusterError::not_ready(format!(
                "index '{name}' health {status}, waiting for {at_least}"
            )));
        }
        Ok(status)
    }

    async fn reindex(&self, source: &IndexName, dest: &IndexName) -> Result<u64, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "reindex")?;
        let limit = inner.short_reindex.take();
        let src_docs: Vec<DocumentRecord> = inner
            .indices
            .get(source.as_str())
            .ok_or_else(|| ClusterError::not_found(format!("no such index '{source}'")))?
            .docs
            .values()
            .cloned()
            .collect();
        let take = limit.map_or(src_docs.len(), |n| {
            usize::try_from(n).unwrap_or(src_docs.len())
        });
        let dst = inner
            .indices
            .get_mut(dest.as_str())
            .ok_or_else(|| ClusterError::not_found(format!("no such index '{dest}'")))?;
        let mut copied = 0u64;
        for doc in src_docs.into_iter().take(take) {
            dst.docs.insert(doc.id.clone(), doc);
            copied += 1;
        }
        Ok(copied)
    }

    async fn count_documents(&self, name: &IndexName) -> Result<u64, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "count_documents")?;
        let rec = inner
            .indices
            .get(name.as_str())
            .ok_or_else(|| ClusterError::not_found(format!("no such index '{name}'")))?;
        Ok(rec.docs.len() as u64)
    }

    async fn open_cursor(
        &self,
        name: &IndexName,
        query: &OutdatedQuery,
        batch_size: u32,
    ) -> Result<CursorToken, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "open_cursor")?;
        let rec = inner
            .indices
            .get(name.as_str())
            .ok_or_else(|| ClusterError::not_found(format!("no such index '{name}'")))?;
        let ids: Vec<String> = rec
            .docs
            .values()
            .filter(|doc| query.matches(&doc.doc_type, doc.schema_version))
            .map(|doc| doc.id.clone())
            .collect();
        inner.next_cursor += 1;
        let cursor_id = inner.next_cursor;
        inner.cursors.insert(
            cursor_id,
            CursorRec {
                ids,
                index: name.as_str().to_string(),
                batch: usize::try_from(batch_size).unwrap_or(usize::MAX).max(1),
            },
        );
        Ok(CursorToken::new(format!("mem-{cursor_id}@0")))
    }

    async fn next_page(&self, cursor: &CursorToken) -> Result<DocumentBatch, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "next_page")?;
        let (cursor_id, pos) = parse_token(cursor)?;
        let rec = inner
            .cursors
            .get(&cursor_id)
            .ok_or_else(|| ClusterError::not_found(format!("unknown cursor '{cursor}'")))?
            .clone();
        let index = inner
            .indices
            .get(&rec.index)
            .ok_or_else(|| ClusterError::not_found(format!("no such index '{}'", rec.index)))?;
        let page_ids: Vec<&String> = rec.ids.iter().skip(pos).take(rec.batch).collect();
        let documents: Vec<DocumentRecord> = page_ids
            .iter()
            .filter_map(|id| index.docs.get(*id).cloned())
            .collect();
        let next_pos = pos + page_ids.len();
        let continuation = if next_pos < rec.ids.len() {
            Some(CursorToken::new(format!("mem-{cursor_id}@{next_pos}")))
        } else {
            None
        };
        Ok(DocumentBatch {
            documents,
            continuation,
        })
    }

    async fn close_cursor(&self, cursor: &CursorToken) -> Result<(), ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "close_cursor")?;
        let (cursor_id, _) = parse_token(cursor)?;
        inner.cursors.remove(&cursor_id);
        Ok(())
    }

    async fn bulk_index(
        &self,
        name: &IndexName,
        documents: &[DocumentRecord],
    ) -> Result<BulkResponse, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "bulk_index")?;
        if !inner.indices.contains_key(name.as_str()) {
            return Err(ClusterError::not_found(format!("no such index '{name}'")));
        }
        if inner
            .indices
            .get(name.as_str())
            .is_some_and(|rec| rec.write_blocked)
        {
            return Err(ClusterError::bad_request(format!(
                "index '{name}' is write-blocked"
            )));
        }
        let mut response = BulkResponse::default();
        for doc in documents {
            let fault = inner
                .doc_faults
                .get_mut(&doc.id)
                .and_then(VecDeque::pop_front);
            if let Some(error) = fault {
                response.failures.push(BulkItemFailure {
                    doc_id: doc.id.clone(),
                    error,
                });
                continue;
            }
            inner.next_seq += 1;
            let seq = inner.next_seq;
            let rec = inner
                .indices
                .get_mut(name.as_str())
                .ok_or_else(|| ClusterError::internal("index vanished mid-bulk"))?;
            let mut stored = doc.clone();
            stored.seq_no = Some(seq);
            stored.primary_term = Some(1);
            rec.docs.insert(stored.id.clone(), stored);
            response.indexed += 1;
        }
        Ok(response)
    }

    async fn read_control(
        &self,
        family: &IndexFamily,
    ) -> Result<Option<ControlRecord>, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "read_control")?;
        Ok(inner
            .control
            .get(family.as_str())
            .map(|(state, seq_no)| ControlRecord {
                state: state.clone(),
                seq_no: *seq_no,
            }))
    }

    async fn cas_control(
        &self,
        family: &IndexFamily,
        state: &MigrationState,
        expected_seq: Option<u64>,
    ) -> Result<Option<u64>, ClusterError> {
        let mut inner = self.lock();
        Self::gate(&mut inner, "cas_control")?;
        let current_seq = inner.control.get(family.as_str()).map(|(_, seq)| *seq);
        if current_seq != expected_seq {
            return Ok(None);
        }
        inner.next_seq += 1;
        let new_seq = inner.next_seq;
        inner
            .control
            .insert(family.as_str().to_string(), (state.clone(), new_seq));
        Ok(Some(new_seq))
    }
}

fn parse_token(cursor: &CursorToken) -> Result<(u64, usize), ClusterError> {
    let rest = cursor
        .as_str()
        .strip_prefix("mem-")
        .ok_or_else(|| ClusterError::bad_request(format!("malformed cursor '{cursor}'")))?;
    let (id, pos) = rest
        .split_once('@')
        .ok_or_else(|| ClusterError::bad_request(format!("malformed cursor '{cursor}'")))?;
    let id = id
        .parse::<u64>()
        .map_err(|_| ClusterError::bad_request(format!("malformed cursor '{cursor}'")))?;
    let pos = pos
        .parse::<usize>()
        .map_err(|_| ClusterError::bad_request(format!("malformed cursor '{cursor}'")))?;
    Ok((id, pos))
}
