//! Newtype identifiers used across the migration engine.

use serde::{Deserialize, Serialize};

/// Logical name of a migrated index family (also the application-facing
/// alias, e.g. `"documents"` pointing at `"documents_v3"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexFamily(String);

impl IndexFamily {
    /// Create a new index family name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Concrete index name for a given mapping version of this family.
    #[must_use]
    pub fn versioned_index(&self, version: u32) -> IndexName {
        IndexName::new(format!("{}_v{version}", self.0))
    }

    /// Name of the temporary index used during the raw copy phase.
    #[must_use]
    pub fn reindex_temp_index(&self, version: u32) -> IndexName {
        IndexName::new(format!("{}_v{version}_reindex", self.0))
    }
}

impl std::fmt::Display for IndexFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for IndexFamily {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Concrete (version-stamped) index name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexName(String);

impl IndexName {
    /// Create a new index name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IndexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for IndexName {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Identity of a migration controller instance, recorded in the lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerId(String);

impl ControllerId {
    /// Create a new controller identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ControllerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for ControllerId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioned_index_names_are_stamped() {
        let family = IndexFamily::new("documents");
        assert_eq!(family.versioned_index(3).as_str(), "documents_v3");
        assert_eq!(family.reindex_temp_index(3).as_str(), "documents_v3_reindex");
    }

    #[test]
    fn newtypes_serialize_transparently() {
        let name = IndexName::new("documents_v2");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"documents_v2\"");
        let back: IndexName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }
}
