//! Document transformer registry.
//!
//! Maps a `(doc_type, schema_version)` pair to the pure function that
//! rewrites the document body for the current version. Transformers are
//! infallible from the orchestrator's point of view: any failure, a
//! panic included, becomes a [`TransformOutcome::Failed`] record.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;

use docshift_types::{
    DocumentRecord, OutdatedQuery, TransformFailure, TransformFailureKind, TransformOutcome,
};

/// Pure body rewrite for one `(doc_type, source_version)` step.
pub type TransformFn = fn(Value) -> Result<Value, String>;

/// Registry of known document types and their transformation steps.
#[derive(Default)]
pub struct TransformerRegistry {
    /// doc_type -> current schema version.
    current: BTreeMap<String, u32>,
    /// (doc_type, source_version) -> transform.
    steps: BTreeMap<(String, u32), TransformFn>,
}

impl TransformerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a document type and the schema version this build writes.
    pub fn register_type(&mut self, doc_type: impl Into<String>, current_version: u32) {
        self.current.insert(doc_type.into(), current_version);
    }

    /// Register the transform applied to documents of `doc_type` still at
    /// `source_version`.
    pub fn register(&mut self, doc_type: impl Into<String>, source_version: u32, f: TransformFn) {
        self.steps.insert((doc_type.into(), source_version), f);
    }

    /// Current schema version for a registered type.
    #[must_use]
    pub fn current_version(&self, doc_type: &str) -> Option<u32> {
        self.current.get(doc_type).copied()
    }

    /// Query matching every document whose `schema_version` is behind the
    /// registered current version for its type.
    #[must_use]
    pub fn outdated_query(&self) -> OutdatedQuery {
        OutdatedQuery {
            current_versions: self.current.clone(),
        }
    }

    /// Transform one outdated document up to the current version.
    ///
    /// Steps are chained: a v1 document with transforms registered for
    /// v1 and v2 passes through both. Missing types, missing steps,
    /// non-object payloads, transform errors and transform panics all
    /// map to a [`TransformOutcome::Failed`] with the matching kind.
    #[must_use]
    pub fn transform(&self, record: &DocumentRecord) -> TransformOutcome {
        let Some(&target) = self.current.get(&record.doc_type) else {
            return failed(
                record,
                TransformFailureKind::UnknownType,
                format!("no transformer registered for type '{}'", record.doc_type),
            );
        };
        if !record.attributes.is_object() {
            return failed(
                record,
                TransformFailureKind::CorruptPayload,
                "document body is not a JSON object".to_string(),
            );
        }
        if record.schema_version >= target {
            let mut out = record.clone();
            out.schema_version = target;
            return TransformOutcome::Transformed(out);
        }

        let mut body = record.attributes.clone();
        let mut version = record.schema_version;
        while version < target {
            let Some(step) = self.steps.get(&(record.doc_type.clone(), version)) else {
                return failed(
                    record,
                    TransformFailureKind::UnknownType,
                    format!(
                        "no transform step for type '{}' at version {version}",
                        record.doc_type
                    ),
                );
            };
            let stepped = catch_unwind(AssertUnwindSafe(|| step(body.clone())));
            match stepped {
                Ok(Ok(next)) if next.is_object() => body = next,
                Ok(Ok(_)) => {
                    return failed(
                        record,
                        TransformFailureKind::TransformError,
                        format!("transform for version {version} produced a non-object body"),
                    );
                }
                Ok(Err(msg)) => {
                    return failed(record, TransformFailureKind::TransformError, msg);
                }
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(ToString::to_string)
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "transform panicked".to_string());
                    return failed(record, TransformFailureKind::TransformError, msg);
                }
            }
            version += 1;
        }

        let mut out = record.clone();
        out.attributes = body;
        out.schema_version = target;
        TransformOutcome::Transformed(out)
    }
}

fn failed(record: &DocumentRecord, kind: TransformFailureKind, message: String) -> TransformOutcome {
    TransformOutcome::Failed(TransformFailure {
        doc_id: record.id.clone(),
        kind,
        message,
    })
}
