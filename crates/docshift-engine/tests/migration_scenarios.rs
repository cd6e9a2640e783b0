//! End-to-end migration runs against the in-memory cluster.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use docshift_cluster::{ClusterActions, InMemoryCluster};
use docshift_engine::{MigrationConfig, MigrationError, Migrator, TransformerRegistry};
use docshift_types::{
    ClusterError, ControllerId, DocumentRecord, IndexFamily, LeaseInfo, Mappings, MigrationPhase,
    MigrationState, TransformFailureKind,
};

fn doc(id: &str, doc_type: &str, version: u32, attributes: serde_json::Value) -> DocumentRecord {
    DocumentRecord {
        id: id.to_string(),
        doc_type: doc_type.to_string(),
        schema_version: version,
        attributes,
        seq_no: None,
        primary_term: None,
    }
}

fn add_migrated(mut body: serde_json::Value) -> Result<serde_json::Value, String> {
    body["migrated"] = json!(true);
    Ok(body)
}

fn registry() -> TransformerRegistry {
    let mut r = TransformerRegistry::new();
    r.register_type("a", 2);
    r.register("a", 1, add_migrated);
    r
}

fn config() -> MigrationConfig {
    let mut config = MigrationConfig::new(
        "docs",
        Mappings {
            version: 2,
            properties: json!({"migrated": {"type": "boolean"}}),
        },
    );
    config.retry.max_attempts = 6;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config
}

/// Cluster with `docs` aliased to `docs_v1` holding `count` v1 docs.
fn seeded_cluster(count: usize) -> Arc<InMemoryCluster> {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.seed_index("docs_v1", Mappings::empty(1));
    cluster.seed_alias("docs", "docs_v1");
    for i in 0..count {
        cluster.seed_document("docs_v1", doc(&format!("a:{i}"), "a", 1, json!({"n": i})));
    }
    cluster
}

fn migrator(cluster: &Arc<InMemoryCluster>) -> Migrator {
    migrator_as(cluster, "node-1")
}

fn migrator_as(cluster: &Arc<InMemoryCluster>, controller: &str) -> Migrator {
    let client: Arc<dyn ClusterActions> = cluster.clone();
    Migrator::new(client, registry(), config(), ControllerId::new(controller)).unwrap()
}

#[tokio::test]
async fn three_documents_migrate_and_gain_the_flag() {
    let cluster = seeded_cluster(3);
    let report = migrator(&cluster).run().await.unwrap();

    assert_eq!(report.final_phase, MigrationPhase::Done);
    assert_eq!(report.counts.source_documents, 3);
    assert_eq!(report.counts.documents_copied, 3);
    assert_eq!(report.counts.documents_transformed, 3);
    assert_eq!(report.counts.documents_indexed, 3);
    assert_eq!(report.counts.documents_skipped, 0);

    let target = cluster.documents("docs_v2");
    assert_eq!(target.len(), 3);
    for doc in &target {
        assert_eq!(doc.schema_version, 2);
        assert_eq!(doc.attributes["migrated"], json!(true));
    }
    assert_eq!(cluster.alias_target("docs").as_deref(), Some("docs_v2"));
    assert!(!report.log.is_empty());
}

#[tokio::test]
async fn corrupt_document_is_skipped_and_named_in_the_log() {
    let cluster = seeded_cluster(2);
    cluster.seed_document("docs_v1", doc("a:bad", "a", 1, json!("not an object")));

    let report = migrator(&cluster).run().await.unwrap();
    assert_eq!(report.final_phase, MigrationPhase::Done);
    assert_eq!(report.counts.documents_skipped, 1);
    assert_eq!(report.skipped[0].doc_id, "a:bad");
    assert_eq!(report.skipped[0].kind, TransformFailureKind::CorruptPayload);

    // No data loss: every source document is either transformed in the
    // target or named in the skip log.
    let target_ids: Vec<String> = cluster
        .documents("docs_v2")
        .into_iter()
        .filter(|d| d.schema_version == 2)
        .map(|d| d.id)
        .collect();
    for source_doc in cluster.documents("docs_v1") {
        let migrated = target_ids.contains(&source_doc.id);
        let skipped = report.skipped.iter().any(|s| s.doc_id == source_doc.id);
        assert!(migrated || skipped, "document '{}' lost", source_doc.id);
    }
}

#[tokio::test]
async fn skip_ceiling_breach_halts_before_cutover() {
    // 5 corrupt out of 20 scanned is far past the default 0.10 ceiling.
    let cluster = seeded_cluster(15);
    for i in 0..5 {
        cluster.seed_document("docs_v1", doc(&format!("a:bad{i}"), "a", 1, json!(i)));
    }

    let err = migrator(&cluster).run().await.unwrap_err();
    match err {
        MigrationError::Halted { cause, .. } => {
            assert!(cause.contains("skip ceiling"), "unexpected cause: {cause}");
        }
        other => panic!("expected halt, got {other}"),
    }
    let persisted = cluster.control_state("docs").unwrap();
    assert_eq!(persisted.phase, MigrationPhase::Fatal);
    // The run never reached the alias swap.
    assert_eq!(cluster.alias_target("docs").as_deref(), Some("docs_v1"));
}

#[tokio::test]
async fn health_check_retries_until_the_cluster_recovers() {
    let cluster = seeded_cluster(1);
    cluster.fail_times(
        "wait_for_health",
        5,
        ClusterError::not_ready("status red"),
    );

    let report = migrator(&cluster).run().await.unwrap();
    assert_eq!(report.final_phase, MigrationPhase::Done);
    assert_eq!(cluster.op_count("wait_for_health"), 6);
    assert!(report.retry_count >= 5);
}

#[tokio::test]
async fn fatal_auth_at_cutover_halts_then_a_restart_finishes() {
    let cluster = seeded_cluster(2);
    cluster.fail_times("update_aliases", 1, ClusterError::auth("forbidden"));

    let err = migrator(&cluster).run().await.unwrap_err();
    match err {
        MigrationError::Halted {
            cause,
            last_completed,
        } => {
            assert!(cause.contains("forbidden"));
            assert_eq!(
                last_completed,
                Some(MigrationPhase::OutdatedDocumentsSearch)
            );
        }
        other => panic!("expected halt, got {other}"),
    }
    let persisted = cluster.control_state("docs").unwrap();
    assert_eq!(persisted.phase, MigrationPhase::Fatal);
    assert!(persisted.fatal_cause.is_some());
    assert!(persisted.lease.is_none());
    // Alias untouched by the failed swap.
    assert_eq!(cluster.alias_target("docs").as_deref(), Some("docs_v1"));

    let report = migrator(&cluster).run().await.unwrap();
    assert_eq!(report.final_phase, MigrationPhase::Done);
    assert_eq!(cluster.alias_target("docs").as_deref(), Some("docs_v2"));
}

#[tokio::test]
async fn incomplete_copy_is_retried_until_counts_match() {
    let cluster = seeded_cluster(3);
    cluster.short_copy_next_reindex(1);

    let report = migrator(&cluster).run().await.unwrap();
    assert_eq!(report.final_phase, MigrationPhase::Done);
    // First copy came up short against the frozen source count.
    assert_eq!(cluster.op_count("reindex"), 2);
    assert_eq!(report.counts.documents_copied, 3);
}

#[tokio::test]
async fn alias_cutover_is_one_atomic_call() {
    let cluster = seeded_cluster(2);
    migrator(&cluster).run().await.unwrap();
    assert_eq!(cluster.op_count("update_aliases"), 1);
}

#[tokio::test]
async fn live_foreign_lease_defers_this_controller() {
    let cluster = seeded_cluster(1);
    let family = IndexFamily::new("docs");
    let mut state = MigrationState::new(family.clone(), Mappings::empty(2));
    let now = Utc::now();
    state.lease = Some(LeaseInfo {
        controller: ControllerId::new("node-2"),
        acquired_at: now,
        expires_at: now + ChronoDuration::seconds(60),
    });
    cluster
        .cas_control(&family, &state, None)
        .await
        .unwrap()
        .unwrap();

    let err = migrator(&cluster).run().await.unwrap_err();
    match err {
        MigrationError::Deferred { holder } => assert_eq!(holder.as_str(), "node-2"),
        other => panic!("expected deferral, got {other}"),
    }
    // The deferring controller made no cluster changes.
    assert!(!cluster.index_exists("docs_v2"));
}

#[tokio::test]
async fn expired_foreign_lease_is_reclaimed() {
    let cluster = seeded_cluster(1);
    let family = IndexFamily::new("docs");
    let mut state = MigrationState::new(family.clone(), Mappings::empty(2));
    let now = Utc::now();
    state.lease = Some(LeaseInfo {
        controller: ControllerId::new("node-2"),
        acquired_at: now - ChronoDuration::seconds(120),
        expires_at: now - ChronoDuration::seconds(60),
    });
    cluster
        .cas_control(&family, &state, None)
        .await
        .unwrap()
        .unwrap();

    let report = migrator(&cluster).run().await.unwrap();
    assert_eq!(report.final_phase, MigrationPhase::Done);
}

#[tokio::test]
async fn completed_run_short_circuits_a_second_controller() {
    let cluster = seeded_cluster(2);
    migrator(&cluster).run().await.unwrap();
    let swaps_after_first = cluster.op_count("update_aliases");

    let report = migrator_as(&cluster, "node-2").run().await.unwrap();
    assert_eq!(report.final_phase, MigrationPhase::Done);
    assert_eq!(cluster.op_count("update_aliases"), swaps_after_first);

    let client: Arc<dyn ClusterActions> = cluster.clone();
    assert!(Migrator::is_complete(&client, &IndexFamily::new("docs"), 2)
        .await
        .unwrap());
}

#[tokio::test]
async fn persistent_write_conflict_skips_the_document() {
    let cluster = seeded_cluster(3);
    // Outlives the initial bulk attempt plus every per-document retry.
    cluster.fail_doc_write("a:0", 10, ClusterError::version_conflict("newer writer"));

    let report = migrator(&cluster).run().await.unwrap();
    assert_eq!(report.final_phase, MigrationPhase::Done);
    assert_eq!(report.counts.documents_skipped, 1);
    assert_eq!(report.skipped[0].doc_id, "a:0");
    assert_eq!(report.skipped[0].kind, TransformFailureKind::WriteConflict);
    assert_eq!(report.counts.documents_indexed, 2);
}

#[tokio::test]
async fn fresh_family_bootstraps_target_and_alias() {
    let cluster = Arc::new(InMemoryCluster::new());
    let report = migrator(&cluster).run().await.unwrap();

    assert_eq!(report.final_phase, MigrationPhase::Done);
    assert!(cluster.index_exists("docs_v2"));
    assert_eq!(cluster.alias_target("docs").as_deref(), Some("docs_v2"));
    assert_eq!(report.counts.source_documents, 0);
}

#[tokio::test]
async fn transient_faults_on_every_step_still_reach_done() {
    let cluster = seeded_cluster(2);
    for op in [
        "resolve_alias",
        "set_write_block",
        "count_documents",
        "create_index",
        "reindex",
        "clone_index",
        "put_mappings",
        "open_cursor",
        "bulk_index",
        "update_aliases",
        "cas_control",
    ] {
        cluster.fail_times(op, 1, ClusterError::network("reset"));
    }

    let report = migrator(&cluster).run().await.unwrap();
    assert_eq!(report.final_phase, MigrationPhase::Done);
    assert_eq!(cluster.alias_target("docs").as_deref(), Some("docs_v2"));
}
