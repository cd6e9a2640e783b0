//! Storage action executor for the docshift migration engine.
//!
//! Provides the [`ClusterActions`] trait, one operation per cluster
//! side effect, plus an HTTP implementation ([`HttpCluster`]) and a
//! deterministic in-memory implementation ([`InMemoryCluster`]) for
//! engine tests.

#![warn(clippy::pedantic)]

pub mod actions;
pub mod http;
pub mod memory;

pub use actions::ClusterActions;
pub use http::{ClusterSettings, HttpCluster};
pub use memory::InMemoryCluster;
