//! Crash-resume property: a run interrupted at any cluster call must,
//! after a restart, converge to the same target corpus as an
//! uninterrupted run.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use docshift_cluster::{ClusterActions, InMemoryCluster};
use docshift_engine::{MigrationConfig, Migrator, TransformerRegistry};
use docshift_types::{ClusterError, ControllerId, DocumentRecord, Mappings, MigrationPhase};

const DOC_COUNT: usize = 5;

fn doc(id: &str, n: usize) -> DocumentRecord {
    DocumentRecord {
        id: id.to_string(),
        doc_type: "a".to_string(),
        schema_version: 1,
        attributes: json!({"n": n}),
        seq_no: None,
        primary_term: None,
    }
}

fn registry() -> TransformerRegistry {
    let mut r = TransformerRegistry::new();
    r.register_type("a", 2);
    r.register("a", 1, |mut body| {
        body["migrated"] = json!(true);
        Ok(body)
    });
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
    // One attempt per call so the injected fault surfaces immediately.
    config.retry.max_attempts = 1;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 1;
    config
}

fn seeded_cluster() -> Arc<InMemoryCluster> {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.seed_index("docs_v1", Mappings::empty(1));
    cluster.seed_alias("docs", "docs_v1");
    for i in 0..DOC_COUNT {
        cluster.seed_document("docs_v1", doc(&format!("a:{i}"), i));
    }
    cluster
}

fn migrator(cluster: &Arc<InMemoryCluster>) -> Migrator {
    let client: Arc<dyn ClusterActions> = cluster.clone();
    Migrator::new(client, registry(), config(), ControllerId::new("node-1")).unwrap()
}

/// Target corpus shape, ignoring write metadata.
fn corpus(cluster: &InMemoryCluster) -> Vec<(String, u32, serde_json::Value)> {
    cluster
        .documents("docs_v2")
        .into_iter()
        .map(|d| (d.id, d.schema_version, d.attributes))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn interrupted_run_resumes_to_the_uninterrupted_corpus(fail_at in 1u64..60) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let control = seeded_cluster();
            migrator(&control).run().await.unwrap();
            let expected = corpus(&control);

            let cluster = seeded_cluster();
            cluster.fail_at_call(fail_at, ClusterError::network("injected crash"));
            let first = migrator(&cluster).run().await;

            if first.is_err() {
                // A fresh process attaches and resumes.
                let report = migrator(&cluster).run().await.unwrap();
                prop_assert_eq!(report.final_phase, MigrationPhase::Done);
            }

            prop_assert_eq!(corpus(&cluster), expected);
            let alias = cluster.alias_target("docs");
            prop_assert_eq!(alias.as_deref(), Some("docs_v2"));
            Ok(())
        })?;
    }
}
