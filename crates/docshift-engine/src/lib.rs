//! Schema migration engine for versioned document index families.
//!
//! Sequences index creation, write blocking, cluster-side copy, clone,
//! mapping update, targeted document transformation, and an atomic
//! alias cutover, with retry policy, skip accounting, and idempotent
//! resume from a persisted control document.

#![warn(clippy::pedantic)]

pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod retry;
pub mod scanner;
pub mod skiplog;

pub use config::{parse_migration, parse_migration_str, validate_migration, MigrationConfig};
pub use errors::MigrationError;
pub use orchestrator::Migrator;
pub use registry::{TransformFn, TransformerRegistry};
pub use report::{MigrationCounts, MigrationReport};
pub use retry::{Retrier, RetryPolicy};
pub use scanner::OutdatedScanner;
