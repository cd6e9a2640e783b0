//! Migration configuration: YAML schema, parsing, and validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_migration, parse_migration_str};
pub use types::{MigrationConfig, RetrySettings};
pub use validator::validate_migration;
