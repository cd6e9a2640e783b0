//! Shared data model for the docshift index migration engine.
//!
//! Pure data types only: no I/O, no cluster client, no policy. Kept in
//! a separate crate so both the cluster client and the engine can share
//! them without circular dependencies.

#![warn(clippy::pedantic)]

pub mod document;
pub mod error;
pub mod ids;
pub mod index;
pub mod state;

pub use document::{
    BulkItemFailure, BulkResponse, CursorToken, DocumentBatch, DocumentRecord, TransformFailure,
    TransformOutcome,
};
pub use error::{ClusterError, ErrorCategory};
pub use ids::{ControllerId, IndexFamily, IndexName};
pub use index::{AliasAction, HealthStatus, IndexDescriptor, Mappings, OutdatedQuery};
pub use state::{
    ControlRecord, LeaseInfo, MigrationLogEntry, MigrationPhase, MigrationState, SkippedDocument,
    TransformFailureKind,
};
