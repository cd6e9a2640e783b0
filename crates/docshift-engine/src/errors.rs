//! Engine error model.
//!
//! `Cluster` wraps a classified [`ClusterError`] surfaced after the
//! retry policy gave up (or refused to retry). `Deferred` means another
//! controller holds the run's lease. `Halted` is the terminal FATAL
//! outcome of a run, carrying the cause and the last completed phase so
//! an operator can decide how to intervene.

use docshift_types::{ClusterError, ControllerId, MigrationPhase};

#[derive(Debug)]
pub enum MigrationError {
    /// Classified cluster failure, not recoverable by the retry policy.
    Cluster(ClusterError),
    /// Another controller owns the migration lease; this instance defers.
    Deferred { holder: ControllerId },
    /// Too many documents were skipped relative to the configured ceiling.
    SkipCeilingExceeded { skipped: u64, scanned: u64 },
    /// The run halted in the FATAL phase.
    Halted {
        cause: String,
        last_completed: Option<MigrationPhase>,
    },
    /// Host-side error (config, serialization, invariant violation).
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cluster(e) => write!(f, "{e}"),
            Self::Deferred { holder } => {
                write!(f, "migration lease held by controller '{holder}'")
            }
            Self::SkipCeilingExceeded { skipped, scanned } => write!(
                f,
                "document skip ceiling exceeded: {skipped} of {scanned} scanned documents skipped"
            ),
            Self::Halted {
                cause,
                last_completed,
            } => match last_completed {
                Some(phase) => write!(f, "migration halted after '{phase}': {cause}"),
                None => write!(f, "migration halted: {cause}"),
            },
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<anyhow::Error> for MigrationError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<ClusterError> for MigrationError {
    fn from(e: ClusterError) -> Self {
        Self::Cluster(e)
    }
}

impl MigrationError {
    /// Returns `true` for a cluster error the retry policy classified
    /// as recoverable (surfaced only once attempts were exhausted).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cluster(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns the classified cluster error, if this is one.
    #[must_use]
    pub fn as_cluster_error(&self) -> Option<&ClusterError> {
        match self {
            Self::Cluster(e) => Some(e),
            _ => None,
        }
    }
}
