//! Migration orchestrator: drives the phase machine, persists state,
//! and turns the final state into a report.
//!
//! One control loop per run. Every cluster side effect goes through the
//! retry policy; every committed transition is persisted to the control
//! document with compare-and-set before the next phase executes, so a
//! crashed run resumes from its last committed phase and a concurrent
//! controller is detected the moment it takes over the record.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use docshift_cluster::ClusterActions;
use docshift_types::{
    AliasAction, ControllerId, CursorToken, DocumentRecord, ErrorCategory, HealthStatus,
    IndexFamily, IndexName, LeaseInfo, MigrationPhase, MigrationState, TransformOutcome,
};

use crate::config::{validate_migration, MigrationConfig};
use crate::errors::MigrationError;
use crate::registry::TransformerRegistry;
use crate::report::MigrationReport;
use crate::retry::Retrier;
use crate::scanner::OutdatedScanner;
use crate::skiplog::{check_skip_ceiling, record_skip, record_write_skip};

/// Outcome of attaching to (or creating) the control record.
enum Attach {
    /// The migration already completed; nothing to do.
    AlreadyDone(MigrationState),
    /// We own the run.
    Owned(RunCtx),
}

/// Mutable context owned by one run of the control loop.
struct RunCtx {
    state: MigrationState,
    /// Control document sequence expected by the next compare-and-set.
    control_seq: u64,
    scanner: Option<OutdatedScanner>,
    /// Documents of the batch currently in flight, not yet written.
    pending: Vec<DocumentRecord>,
    /// Continuation the cursor advances to once the batch is written.
    pending_continuation: Option<CursorToken>,
    transformed: Vec<DocumentRecord>,
    /// Whether a scanned batch is mid-flight through transform and write.
    batch_in_flight: bool,
}

/// Drives one index family's migration to the configured mapping version.
pub struct Migrator {
    client: Arc<dyn ClusterActions>,
    registry: TransformerRegistry,
    config: MigrationConfig,
    controller: ControllerId,
    retrier: Retrier,
}

impl Migrator {
    /// Create a migrator for the configured family.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Infrastructure`] if the configuration
    /// fails validation.
    pub fn new(
        client: Arc<dyn ClusterActions>,
        registry: TransformerRegistry,
        config: MigrationConfig,
        controller: ControllerId,
    ) -> Result<Self, MigrationError> {
        validate_migration(&config)?;
        let retrier = Retrier::new(config.retry.to_policy());
        Ok(Self {
            client,
            registry,
            config,
            controller,
            retrier,
        })
    }

    fn family(&self) -> IndexFamily {
        IndexFamily::new(self.config.family.clone())
    }

    fn make_lease(&self) -> LeaseInfo {
        let now = Utc::now();
        LeaseInfo {
            controller: self.controller.clone(),
            acquired_at: now,
            expires_at: now + self.config.lease_ttl(),
        }
    }

    /// Whether the family's migration to `version` has completed.
    ///
    /// Queryable by the surrounding application before it starts serving
    /// traffic against the versioned index.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Cluster`] if the control document
    /// cannot be read.
    pub async fn is_complete(
        client: &Arc<dyn ClusterActions>,
        family: &IndexFamily,
        version: u32,
    ) -> Result<bool, MigrationError> {
        let record = client.read_control(family).await?;
        Ok(record.is_some_and(|r| {
            r.state.phase == MigrationPhase::Done && r.state.target_mappings.version >= version
        }))
    }

    /// Run the migration to completion.
    ///
    /// Re-entrant: a fresh process attaches to the persisted control
    /// record and resumes from the last committed phase. A run that
    /// already finished returns its report without touching the cluster
    /// further.
    ///
    /// # Errors
    ///
    /// [`MigrationError::Deferred`] if another controller holds a live
    /// lease; [`MigrationError::Halted`] if the run ends in the fatal
    /// phase. Both leave the control document consistent.
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let started = Instant::now();
        let family = self.family();
        tracing::info!(
            family = %family,
            target_version = self.config.mappings.version,
            controller = %self.controller,
            "Starting migration run"
        );

        let mut ctx = match self.attach(&family).await? {
            Attach::AlreadyDone(state) => {
                tracing::info!(family = %family, "Migration already complete");
                return Ok(MigrationReport::from_state(
                    &state,
                    started.elapsed().as_secs_f64(),
                    self.retrier.total_retries(),
                ));
            }
            Attach::Owned(ctx) => ctx,
        };

        while !ctx.state.phase.is_terminal() {
            let phase = ctx.state.phase;
            match self.step(&mut ctx).await {
                Ok(next) => {
                    tracing::info!(
                        family = %family,
                        from = %phase,
                        to = %next,
                        "Phase complete"
                    );
                    ctx.state.last_completed_phase = Some(phase);
                    ctx.state.log_transition(phase, format!("advanced to {next}"));
                    ctx.state.phase = next;
                    self.persist(&family, &mut ctx).await?;
                }
                Err(MigrationError::Deferred { holder }) => {
                    tracing::warn!(family = %family, holder = %holder, "Deferring to lease holder");
                    return Err(MigrationError::Deferred { holder });
                }
                Err(err) => {
                    return Err(self.halt(&family, &mut ctx, phase, err).await);
                }
            }
        }

        // Completion releases the lease so later controllers see a
        // finished, unowned record.
        ctx.state.lease = None;
        self.persist(&family, &mut ctx).await?;
        tracing::info!(
            family = %family,
            target = %ctx.state.target_index,
            indexed = ctx.state.docs_indexed,
            skipped = ctx.state.skipped.len(),
            "Migration complete"
        );
        Ok(MigrationReport::from_state(
            &ctx.state,
            started.elapsed().as_secs_f64(),
            self.retrier.total_retries(),
        ))
    }

    // -- control record -----------------------------------------------------

    /// Read or create the control record and take ownership of the run.
    async fn attach(&self, family: &IndexFamily) -> Result<Attach, MigrationError> {
        let client = Arc::clone(&self.client);
        let fam = family.clone();
        let record = self
            .retrier
            .run("read_control", || {
                let client = Arc::clone(&client);
                let fam = fam.clone();
                async move { client.read_control(&fam).await }
            })
            .await?;

        let (mut state, expected_seq) = match record {
            None => (
                MigrationState::new(family.clone(), self.config.mappings.clone()),
                None,
            ),
            Some(record) => {
                let state = record.state;
                if state.phase == MigrationPhase::Done
                    && state.target_mappings.version >= self.config.mappings.version
                {
                    return Ok(Attach::AlreadyDone(state));
                }
                if let Some(lease) = &state.lease {
                    if lease.controller != self.controller && !lease.is_expired(Utc::now()) {
                        return Err(MigrationError::Deferred {
                            holder: lease.controller.clone(),
                        });
                    }
                }
                let state = self.adopt(state);
                (state, Some(record.seq_no))
            }
        };

        state.lease = Some(self.make_lease());
        let client = Arc::clone(&self.client);
        let fam = family.clone();
        let snapshot = state.clone();
        let new_seq = self
            .retrier
            .run("cas_control", || {
                let client = Arc::clone(&client);
                let fam = fam.clone();
                let snapshot = snapshot.clone();
                async move { client.cas_control(&fam, &snapshot, expected_seq).await }
            })
            .await?;
        let Some(control_seq) = new_seq else {
            // Lost the race for the record; report whoever holds it now.
            let holder = self
                .client
                .read_control(family)
                .await?
                .and_then(|r| r.state.lease.map(|l| l.controller))
                .unwrap_or_else(|| ControllerId::new("unknown"));
            return Err(MigrationError::Deferred { holder });
        };

        let scanner = if Self::resume_scanner(&state) {
            self.build_scanner(&state)
        } else {
            None
        };
        Ok(Attach::Owned(RunCtx {
            scanner,
            state,
            control_seq,
            pending: Vec::new(),
            pending_continuation: None,
            transformed: Vec::new(),
            batch_in_flight: false,
        }))
    }

    /// Rework a persisted state so this run can continue it.
    fn adopt(&self, mut state: MigrationState) -> MigrationState {
        if state.target_mappings.version != self.config.mappings.version {
            // A newer mapping version restarts the machine; counters and
            // the skip log belong to the previous version's run.
            let mut fresh = MigrationState::new(state.family.clone(), self.config.mappings.clone());
            fresh.log = state.log;
            fresh.log_transition(
                MigrationPhase::Init,
                format!(
                    "restarting for mapping version {} (previous run targeted {})",
                    self.config.mappings.version, state.target_mappings.version
                ),
            );
            return fresh;
        }
        if state.phase == MigrationPhase::Fatal {
            // Operator restart after a fatal halt: re-enter from the top
            // and let idempotent re-entry skip completed work.
            state.log_transition(
                MigrationPhase::Fatal,
                "restarting after fatal halt".to_string(),
            );
            state.phase = MigrationPhase::Init;
            state.fatal_cause = None;
        }
        state
    }

    fn resume_scanner(state: &MigrationState) -> bool {
        matches!(
            state.phase,
            MigrationPhase::OutdatedDocumentsSearch
                | MigrationPhase::OutdatedDocumentsTransform
                | MigrationPhase::TransformedDocumentsBulkIndex
        )
    }

    fn build_scanner(&self, state: &MigrationState) -> Option<OutdatedScanner> {
        let source = state.source_index.clone()?;
        Some(OutdatedScanner::new(
            Arc::clone(&self.client),
            source,
            self.registry.outdated_query(),
            self.config.batch_size,
            state.cursor.clone(),
        ))
    }

    /// Persist the current state with compare-and-set, renewing the lease.
    async fn persist(&self, family: &IndexFamily, ctx: &mut RunCtx) -> Result<(), MigrationError> {
        if ctx.state.lease.is_some() {
            ctx.state.lease = Some(self.make_lease());
        }
        let client = Arc::clone(&self.client);
        let fam = family.clone();
        let snapshot = ctx.state.clone();
        let expected = ctx.control_seq;
        let new_seq = self
            .retrier
            .run("cas_control", || {
                let client = Arc::clone(&client);
                let fam = fam.clone();
                let snapshot = snapshot.clone();
                async move { client.cas_control(&fam, &snapshot, Some(expected)).await }
            })
            .await?;
        match new_seq {
            Some(seq) => {
                ctx.control_seq = seq;
                Ok(())
            }
            None => {
                let holder = self
                    .client
                    .read_control(family)
                    .await?
                    .and_then(|r| r.state.lease.map(|l| l.controller))
                    .unwrap_or_else(|| ControllerId::new("unknown"));
                Err(MigrationError::Deferred { holder })
            }
        }
    }

    /// Stamp the fatal phase, release the lease, and persist best-effort.
    async fn halt(
        &self,
        family: &IndexFamily,
        ctx: &mut RunCtx,
        failed_in: MigrationPhase,
        err: MigrationError,
    ) -> MigrationError {
        let cause = err.to_string();
        tracing::error!(
            family = %family,
            phase = %failed_in,
            cause = %cause,
            "Migration halted"
        );
        ctx.state
            .log_transition(failed_in, format!("fatal: {cause}"));
        ctx.state.phase = MigrationPhase::Fatal;
        ctx.state.fatal_cause = Some(cause.clone());
        ctx.state.lease = None;
        if let Err(persist_err) = self.persist(family, ctx).await {
            tracing::error!(
                family = %family,
                error = %persist_err,
                "Could not persist fatal state"
            );
        }
        MigrationError::Halted {
            cause,
            last_completed: ctx.state.last_completed_phase,
        }
    }

    // -- phase handlers -----------------------------------------------------

    /// Execute the handler for the current phase and return the next one.
    async fn step(&self, ctx: &mut RunCtx) -> Result<MigrationPhase, MigrationError> {
        match ctx.state.phase {
            MigrationPhase::Init => self.phase_init(ctx).await,
            MigrationPhase::WaitForYellowSource => self.phase_wait_for_yellow(ctx).await,
            MigrationPhase::SetSourceWriteBlock => self.phase_block_source(ctx).await,
            MigrationPhase::CreateReindexTemp => self.phase_create_temp(ctx).await,
            MigrationPhase::ReindexSourceToTemp => self.phase_reindex(ctx).await,
            MigrationPhase::SetTempWriteBlock => self.phase_block_temp(ctx).await,
            MigrationPhase::CloneTempToTarget => self.phase_clone(ctx).await,
            MigrationPhase::UpdateTargetMappings => self.phase_update_mappings(ctx).await,
            MigrationPhase::OutdatedDocumentsSearch => self.phase_search(ctx).await,
            MigrationPhase::OutdatedDocumentsTransform => self.phase_transform(ctx),
            MigrationPhase::TransformedDocumentsBulkIndex => self.phase_bulk_index(ctx).await,
            MigrationPhase::MarkVersionIndexReady => self.phase_cutover(ctx).await,
            MigrationPhase::Done | MigrationPhase::Fatal => Err(MigrationError::Infrastructure(
                anyhow::anyhow!("step called in terminal phase {}", ctx.state.phase),
            )),
        }
    }

    /// Resolve the family alias and decide where the run starts.
    async fn phase_init(&self, ctx: &mut RunCtx) -> Result<MigrationPhase, MigrationError> {
        let client = Arc::clone(&self.client);
        let alias = self.config.family.clone();
        let current = self
            .retrier
            .run("resolve_alias", || {
                let client = Arc::clone(&client);
                let alias = alias.clone();
                async move { client.resolve_alias(&alias).await }
            })
            .await?;

        match current {
            Some(index) if index == ctx.state.target_index => {
                tracing::info!(index = %index, "Alias already points at the target index");
                Ok(MigrationPhase::Done)
            }
            Some(index) => {
                ctx.state.source_index = Some(index);
                Ok(MigrationPhase::WaitForYellowSource)
            }
            None => {
                // Fresh family: no source to migrate. Create the target
                // and go straight to the alias cutover.
                let client = Arc::clone(&self.client);
                let target = ctx.state.target_index.clone();
                let mappings = self.config.mappings.clone();
                self.retrier
                    .run("create_index", || {
                        let client = Arc::clone(&client);
                        let target = target.clone();
                        let mappings = mappings.clone();
                        async move { client.create_index(&target, &mappings).await }
                    })
                    .await?;
                Ok(MigrationPhase::MarkVersionIndexReady)
            }
        }
    }

    async fn phase_wait_for_yellow(&self, ctx: &RunCtx) -> Result<MigrationPhase, MigrationError> {
        let source = self.require_source(ctx)?;
        let client = Arc::clone(&self.client);
        let timeout = self.config.health_timeout();
        let status = self
            .retrier
            .run("wait_for_health", || {
                let client = Arc::clone(&client);
                let source = source.clone();
                async move {
                    client
                        .wait_for_health(&source, HealthStatus::Yellow, timeout)
                        .await
                }
            })
            .await?;
        tracing::info!(index = %source, status = %status, "Source index healthy");
        Ok(MigrationPhase::SetSourceWriteBlock)
    }

    /// Block writes on the source and record its frozen document count.
    async fn phase_block_source(&self, ctx: &mut RunCtx) -> Result<MigrationPhase, MigrationError> {
        let source = self.require_source(ctx)?;
        let client = Arc::clone(&self.client);
        let src = source.clone();
        self.retrier
            .run("set_write_block", || {
                let client = Arc::clone(&client);
                let src = src.clone();
                async move { client.set_write_block(&src, true).await }
            })
            .await?;
        let client = Arc::clone(&self.client);
        let src = source.clone();
        let count = self
            .retrier
            .run("count_documents", || {
                let client = Arc::clone(&client);
                let src = src.clone();
                async move { client.count_documents(&src).await }
            })
            .await?;
        ctx.state.source_doc_count = count;
        tracing::info!(index = %source, documents = count, "Source write-blocked");
        Ok(MigrationPhase::CreateReindexTemp)
    }

    /// Create the temp index with the source's current mappings.
    async fn phase_create_temp(&self, ctx: &RunCtx) -> Result<MigrationPhase, MigrationError> {
        let source = self.require_source(ctx)?;
        let client = Arc::clone(&self.client);
        let src = source.clone();
        let descriptor = self
            .retrier
            .run("fetch_index", || {
                let client = Arc::clone(&client);
                let src = src.clone();
                async move { client.fetch_index(&src).await }
            })
            .await?
            .ok_or_else(|| {
                MigrationError::Infrastructure(anyhow::anyhow!(
                    "source index '{source}' vanished after write block"
                ))
            })?;

        let client = Arc::clone(&self.client);
        let temp = ctx.state.temp_index.clone();
        let mappings = descriptor.mappings;
        let created = self
            .retrier
            .run("create_index", || {
                let client = Arc::clone(&client);
                let temp = temp.clone();
                let mappings = mappings.clone();
                async move { client.create_index(&temp, &mappings).await }
            })
            .await?;
        if !created {
            tracing::info!(index = %ctx.state.temp_index, "Temp index already exists, continuing");
        }
        Ok(MigrationPhase::ReindexSourceToTemp)
    }

    /// Cluster-side copy source to temp, verified against the frozen count.
    async fn phase_reindex(&self, ctx: &mut RunCtx) -> Result<MigrationPhase, MigrationError> {
        let source = self.require_source(ctx)?;
        let temp = ctx.state.temp_index.clone();

        // The temp write block is applied only after a verified copy, so
        // an already-blocked temp marks the copy as done on a re-run.
        let client = Arc::clone(&self.client);
        let tmp = temp.clone();
        let existing = self
            .retrier
            .run("fetch_index", || {
                let client = Arc::clone(&client);
                let tmp = tmp.clone();
                async move { client.fetch_index(&tmp).await }
            })
            .await?;
        if existing.is_some_and(|d| d.write_blocked) {
            tracing::info!(index = %temp, "Temp already write-blocked, copy previously verified");
            ctx.state.docs_copied = ctx.state.source_doc_count;
            return Ok(MigrationPhase::SetTempWriteBlock);
        }

        let client = Arc::clone(&self.client);
        let expected = ctx.state.source_doc_count;
        let copied = self
            .retrier
            .run("reindex", || {
                let client = Arc::clone(&client);
                let source = source.clone();
                let temp = temp.clone();
                async move {
                    client.reindex(&source, &temp).await?;
                    let count = client.count_documents(&temp).await?;
                    if count < expected {
                        return Err(docshift_types::ClusterError::not_ready(format!(
                            "temp count {count} below source count {expected}, copy incomplete"
                        )));
                    }
                    Ok(count)
                }
            })
            .await?;
        ctx.state.docs_copied = copied;
        tracing::info!(source = %source, temp = %ctx.state.temp_index, copied, "Raw copy verified");
        Ok(MigrationPhase::SetTempWriteBlock)
    }

    async fn phase_block_temp(&self, ctx: &RunCtx) -> Result<MigrationPhase, MigrationError> {
        let client = Arc::clone(&self.client);
        let temp = ctx.state.temp_index.clone();
        self.retrier
            .run("set_write_block", || {
                let client = Arc::clone(&client);
                let temp = temp.clone();
                async move { client.set_write_block(&temp, true).await }
            })
            .await?;
        Ok(MigrationPhase::CloneTempToTarget)
    }

    async fn phase_clone(&self, ctx: &RunCtx) -> Result<MigrationPhase, MigrationError> {
        let client = Arc::clone(&self.client);
        let temp = ctx.state.temp_index.clone();
        let target = ctx.state.target_index.clone();
        let cloned = self
            .retrier
            .run("clone_index", || {
                let client = Arc::clone(&client);
                let temp = temp.clone();
                let target = target.clone();
                async move { client.clone_index(&temp, &target).await }
            })
            .await?;
        if !cloned {
            tracing::info!(index = %ctx.state.target_index, "Target already exists, continuing");
        }
        Ok(MigrationPhase::UpdateTargetMappings)
    }

    /// Apply the target mappings and lift the inherited write block.
    async fn phase_update_mappings(&self, ctx: &RunCtx) -> Result<MigrationPhase, MigrationError> {
        let client = Arc::clone(&self.client);
        let target = ctx.state.target_index.clone();
        let mappings = self.config.mappings.clone();
        self.retrier
            .run("put_mappings", || {
                let client = Arc::clone(&client);
                let target = target.clone();
                let mappings = mappings.clone();
                async move { client.put_mappings(&target, &mappings).await }
            })
            .await?;

        let client = Arc::clone(&self.client);
        let target = ctx.state.target_index.clone();
        self.retrier
            .run("set_write_block", || {
                let client = Arc::clone(&client);
                let target = target.clone();
                async move { client.set_write_block(&target, false).await }
            })
            .await?;
        Ok(MigrationPhase::OutdatedDocumentsSearch)
    }

    /// Pull the next batch of outdated documents, or move to cutover.
    async fn phase_search(&self, ctx: &mut RunCtx) -> Result<MigrationPhase, MigrationError> {
        if ctx.scanner.is_none() {
            ctx.scanner = self.build_scanner(&ctx.state);
        }
        let Some(scanner) = ctx.scanner.as_mut() else {
            return Ok(MigrationPhase::MarkVersionIndexReady);
        };
        match scanner.next_batch(&self.retrier).await? {
            Some(batch) => {
                ctx.state.docs_scanned += batch.documents.len() as u64;
                ctx.pending = batch.documents;
                ctx.pending_continuation = batch.continuation;
                ctx.batch_in_flight = true;
                Ok(MigrationPhase::OutdatedDocumentsTransform)
            }
            None => {
                ctx.scanner = None;
                Ok(MigrationPhase::MarkVersionIndexReady)
            }
        }
    }

    /// Transform the pending batch; per-document failures become skips.
    fn phase_transform(&self, ctx: &mut RunCtx) -> Result<MigrationPhase, MigrationError> {
        if ctx.pending.is_empty() {
            // Restarted mid-batch: the batch was never written, re-scan
            // from the persisted cursor.
            return Ok(MigrationPhase::OutdatedDocumentsSearch);
        }
        ctx.transformed.clear();
        for doc in std::mem::take(&mut ctx.pending) {
            match self.registry.transform(&doc) {
                TransformOutcome::Transformed(out) => {
                    ctx.state.docs_transformed += 1;
                    ctx.transformed.push(out);
                }
                TransformOutcome::Failed(failure) => {
                    record_skip(&mut ctx.state, &failure);
                }
            }
        }
        check_skip_ceiling(
            &ctx.state,
            self.config.max_skip_fraction,
            self.config.min_skip_sample,
        )?;
        Ok(MigrationPhase::TransformedDocumentsBulkIndex)
    }

    /// Bulk-write the transformed batch, then commit the cursor advance.
    async fn phase_bulk_index(&self, ctx: &mut RunCtx) -> Result<MigrationPhase, MigrationError> {
        if !ctx.batch_in_flight {
            // Restarted mid-batch: nothing was carried over, re-scan
            // from the persisted cursor.
            return Ok(MigrationPhase::OutdatedDocumentsSearch);
        }
        if !ctx.transformed.is_empty() {
            let client = Arc::clone(&self.client);
            let target = ctx.state.target_index.clone();
            let docs = std::mem::take(&mut ctx.transformed);
            let response = self
                .retrier
                .run("bulk_index", || {
                    let client = Arc::clone(&client);
                    let target = target.clone();
                    let docs = docs.clone();
                    async move { client.bulk_index(&target, &docs).await }
                })
                .await?;
            ctx.state.docs_indexed += response.indexed;

            for failure in response.failures {
                let Some(doc) = docs.iter().find(|d| d.id == failure.doc_id) else {
                    continue;
                };
                match self.write_single(&target, doc).await {
                    Ok(()) => ctx.state.docs_indexed += 1,
                    Err(err) => {
                        let conflict = err
                            .as_cluster_error()
                            .is_some_and(|e| e.category == ErrorCategory::VersionConflict);
                        if conflict {
                            // A newer writer already owns this document.
                            record_write_skip(
                                &mut ctx.state,
                                &failure.doc_id,
                                "version conflict persisted through retries",
                            );
                        } else {
                            return Err(err);
                        }
                    }
                }
            }
            check_skip_ceiling(
                &ctx.state,
                self.config.max_skip_fraction,
                self.config.min_skip_sample,
            )?;
        }

        // The batch is durably in the target; only now may the cursor
        // move past it.
        ctx.state.cursor = ctx.pending_continuation.take();
        ctx.batch_in_flight = false;
        Ok(MigrationPhase::OutdatedDocumentsSearch)
    }

    /// Retry one failed bulk item on its own.
    async fn write_single(
        &self,
        target: &IndexName,
        doc: &DocumentRecord,
    ) -> Result<(), MigrationError> {
        let client = Arc::clone(&self.client);
        let target = target.clone();
        let doc = doc.clone();
        self.retrier
            .run("bulk_index_single", || {
                let client = Arc::clone(&client);
                let target = target.clone();
                let doc = doc.clone();
                async move {
                    let response = client.bulk_index(&target, std::slice::from_ref(&doc)).await?;
                    match response.failures.into_iter().next() {
                        Some(item) => Err(item.error),
                        None => Ok(()),
                    }
                }
            })
            .await
    }

    /// Atomically swap the family alias onto the target index.
    async fn phase_cutover(&self, ctx: &RunCtx) -> Result<MigrationPhase, MigrationError> {
        let alias = self.config.family.clone();
        let mut actions = Vec::new();
        if let Some(source) = &ctx.state.source_index {
            actions.push(AliasAction::Remove {
                index: source.clone(),
                alias: alias.clone(),
            });
        }
        actions.push(AliasAction::Add {
            index: ctx.state.target_index.clone(),
            alias: alias.clone(),
        });

        let client = Arc::clone(&self.client);
        self.retrier
            .run("update_aliases", || {
                let client = Arc::clone(&client);
                let actions = actions.clone();
                async move { client.update_aliases(&actions).await }
            })
            .await?;
        tracing::info!(alias, target = %ctx.state.target_index, "Alias cut over");
        Ok(MigrationPhase::Done)
    }

    fn require_source(&self, ctx: &RunCtx) -> Result<IndexName, MigrationError> {
        ctx.state.source_index.clone().ok_or_else(|| {
            MigrationError::Infrastructure(anyhow::anyhow!(
                "phase {} requires a source index but none was resolved",
                ctx.state.phase
            ))
        })
    }
}
