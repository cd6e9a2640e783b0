//! Index metadata: descriptors, mappings, alias operations, health.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::IndexName;

/// Mapping definition for an index, tagged with its schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mappings {
    /// Monotonically increasing mapping version for the index family.
    pub version: u32,
    /// Field definitions, in the cluster's native mapping format.
    pub properties: serde_json::Value,
}

impl Mappings {
    /// Empty mappings at a given version, for indices created before
    /// any fields are known.
    #[must_use]
    pub fn empty(version: u32) -> Self {
        Self {
            version,
            properties: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Metadata snapshot of one concrete index.
///
/// Created and destroyed only through the cluster client; the state
/// machine never mutates a descriptor directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: IndexName,
    /// Aliases currently bound to this index.
    pub aliases: Vec<String>,
    /// Whether the index rejects writes.
    pub write_blocked: bool,
    pub mappings: Mappings,
}

/// One step of an atomic multi-alias update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    Add { index: IndexName, alias: String },
    Remove { index: IndexName, alias: String },
}

/// Cluster or index health, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Red,
    Yellow,
    Green,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
        };
        f.write_str(s)
    }
}

/// Selection predicate for the outdated-documents scan: documents whose
/// stored schema version is older than the registered current version
/// for their type. Types absent from the map never match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutdatedQuery {
    pub current_versions: BTreeMap<String, u32>,
}

impl OutdatedQuery {
    /// Whether a (type, version) pair is outdated under this query.
    #[must_use]
    pub fn matches(&self, doc_type: &str, schema_version: u32) -> bool {
        self.current_versions
            .get(doc_type)
            .is_some_and(|current| schema_version < *current)
    }
}
