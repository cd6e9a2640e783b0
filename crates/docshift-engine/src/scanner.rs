//! Cursor-driven scan over outdated documents.
//!
//! Wraps the open/next/close cursor calls so the orchestrator only sees
//! batches. The scanner keeps the last cursor token so a resumed run can
//! pick up from a persisted position, and reopens the scan once if the
//! server still reports the cursor missing after retries.

use std::sync::Arc;

use docshift_cluster::ClusterActions;
use docshift_types::{CursorToken, DocumentBatch, ErrorCategory, IndexName, OutdatedQuery};

use crate::errors::MigrationError;
use crate::retry::Retrier;

/// Pages through every document in `index` matching `query`.
pub struct OutdatedScanner {
    client: Arc<dyn ClusterActions>,
    index: IndexName,
    query: OutdatedQuery,
    batch_size: u32,
    cursor: Option<CursorToken>,
    reopened: bool,
    exhausted: bool,
}

impl OutdatedScanner {
    #[must_use]
    pub fn new(
        client: Arc<dyn ClusterActions>,
        index: IndexName,
        query: OutdatedQuery,
        batch_size: u32,
        resume_from: Option<CursorToken>,
    ) -> Self {
        Self {
            client,
            index,
            query,
            batch_size,
            cursor: resume_from,
            reopened: false,
            exhausted: false,
        }
    }

    /// The token identifying the current scan position, for persistence.
    #[must_use]
    pub fn cursor(&self) -> Option<&CursorToken> {
        self.cursor.as_ref()
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next batch, or `Ok(None)` once the scan is exhausted.
    ///
    /// An expired cursor triggers one re-open from the start; correctness
    /// survives the restart because the caller writes documents
    /// idempotently by id.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Cluster`] when the cursor calls fail
    /// past the retry policy.
    pub async fn next_batch(
        &mut self,
        retrier: &Retrier,
    ) -> Result<Option<DocumentBatch>, MigrationError> {
        if self.exhausted {
            return Ok(None);
        }
        if self.cursor.is_none() {
            self.open(retrier).await?;
        }
        loop {
            // Clones keep the retried closure free of &mut self.
            let Some(token) = self.cursor.clone() else {
                return Ok(None);
            };
            let client = Arc::clone(&self.client);
            let page = retrier
                .run("next_page", || {
                    let client = Arc::clone(&client);
                    let token = token.clone();
                    async move { client.next_page(&token).await }
                })
                .await;
            match page {
                Ok(batch) => {
                    if batch.documents.is_empty() && batch.continuation.is_none() {
                        self.finish(retrier, &token).await;
                        return Ok(None);
                    }
                    // No continuation means this is the final page.
                    match batch.continuation.clone() {
                        Some(next) => self.cursor = Some(next),
                        None => self.finish(retrier, &token).await,
                    }
                    return Ok(Some(batch));
                }
                Err(err) if is_cursor_gone(&err) && !self.reopened => {
                    tracing::warn!(index = %self.index, "Cursor expired, reopening scan");
                    self.reopened = true;
                    self.open(retrier).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn open(&mut self, retrier: &Retrier) -> Result<(), MigrationError> {
        let client = Arc::clone(&self.client);
        let index = self.index.clone();
        let query = self.query.clone();
        let batch_size = self.batch_size;
        let token = retrier
            .run("open_cursor", || {
                let client = Arc::clone(&client);
                let index = index.clone();
                let query = query.clone();
                async move { client.open_cursor(&index, &query, batch_size).await }
            })
            .await?;
        self.cursor = Some(token);
        Ok(())
    }

    async fn finish(&mut self, retrier: &Retrier, token: &CursorToken) {
        self.exhausted = true;
        self.cursor = None;
        let client = Arc::clone(&self.client);
        let token = token.clone();
        // Best effort release; an expired cursor is already gone.
        let closed = retrier
            .run("close_cursor", || {
                let client = Arc::clone(&client);
                let token = token.clone();
                async move { client.close_cursor(&token).await }
            })
            .await;
        if let Err(err) = closed {
            tracing::debug!(error = %err, "Ignoring cursor close failure");
        }
    }
}

fn is_cursor_gone(err: &MigrationError) -> bool {
    err.as_cluster_error()
        .is_some_and(|e| e.category == ErrorCategory::NotFound)
}
