//! Skip accounting for per-document failures.
//!
//! Documents that cannot be transformed or written are recorded in the
//! run state and dropped from the migration, up to a configured fraction
//! of the documents scanned. Crossing the ceiling halts the run instead
//! of silently shedding data.

use docshift_types::{MigrationState, SkippedDocument, TransformFailure, TransformFailureKind};

use crate::errors::MigrationError;

/// Append a per-document failure to the run's skip log.
pub fn record_skip(state: &mut MigrationState, failure: &TransformFailure) {
    tracing::warn!(
        doc_id = %failure.doc_id,
        kind = %failure.kind,
        reason = %failure.message,
        "Skipping document"
    );
    state.skipped.push(SkippedDocument {
        doc_id: failure.doc_id.clone(),
        kind: failure.kind,
        reason: failure.message.clone(),
    });
}

/// Append a write failure for a document the bulk path gave up on.
pub fn record_write_skip(state: &mut MigrationState, doc_id: &str, reason: &str) {
    record_skip(
        state,
        &TransformFailure {
            doc_id: doc_id.to_string(),
            kind: TransformFailureKind::WriteConflict,
            message: reason.to_string(),
        },
    );
}

/// Halt the run if skips exceed the allowed fraction of scanned documents.
///
/// The check is deferred until `min_sample` documents have been scanned
/// so a single bad document at the start of a large scan does not halt
/// it.
///
/// # Errors
///
/// Returns [`MigrationError::SkipCeilingExceeded`] past the ceiling.
pub fn check_skip_ceiling(
    state: &MigrationState,
    max_skip_fraction: f64,
    min_sample: u64,
) -> Result<(), MigrationError> {
    let skipped = state.skipped.len() as u64;
    if skipped == 0 || state.docs_scanned < min_sample {
        return Ok(());
    }
    #[allow(clippy::cast_precision_loss)]
    let fraction = skipped as f64 / state.docs_scanned as f64;
    if fraction > max_skip_fraction {
        return Err(MigrationError::SkipCeilingExceeded {
            skipped,
            scanned: state.docs_scanned,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docshift_types::{IndexFamily, Mappings};

    fn state_with(scanned: u64, skipped: u64) -> MigrationState {
        let mut s = MigrationState::new(IndexFamily::new("docs"), Mappings::empty(2));
        s.docs_scanned = scanned;
        for i in 0..skipped {
            s.skipped.push(SkippedDocument {
                doc_id: format!("d{i}"),
                kind: TransformFailureKind::CorruptPayload,
                reason: "bad".into(),
            });
        }
        s
    }

    #[test]
    fn samples_below_the_floor_never_trip_the_ceiling() {
        let s = state_with(5, 5);
        assert!(check_skip_ceiling(&s, 0.10, 10).is_ok());
    }

    #[test]
    fn lowering_the_floor_checks_small_corpora() {
        let s = state_with(5, 5);
        assert!(check_skip_ceiling(&s, 0.10, 1).is_err());
    }

    #[test]
    fn under_the_ceiling_is_fine() {
        let s = state_with(100, 10);
        assert!(check_skip_ceiling(&s, 0.10, 10).is_ok());
    }

    #[test]
    fn over_the_ceiling_halts() {
        let s = state_with(100, 11);
        let err = check_skip_ceiling(&s, 0.10, 10).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::SkipCeilingExceeded {
                skipped: 11,
                scanned: 100
            }
        ));
    }

    #[test]
    fn record_skip_appends_to_the_state() {
        let mut s = state_with(0, 0);
        record_write_skip(&mut s, "d9", "version conflict after retries");
        assert_eq!(s.skipped.len(), 1);
        assert_eq!(s.skipped[0].kind, TransformFailureKind::WriteConflict);
        assert_eq!(s.skipped[0].doc_id, "d9");
    }
}
