//! End-to-end pipeline tests: staged files on disk, a live in-process
//! rule store, and the full orchestrator.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use rulegate_core::{
    ChangeKind, ChangedArtifact, GateConfig, HealthProbe, Orchestrator, SourcingVerifier,
    ValidationLevel, ValidationStatus,
};
use rulegate_store::{
    CollectionKind, QueryFilter, Rule, RuleOrigin, RuleStore, SourcingAggregate, UpsertOutcome,
    Workflow,
};

fn write_file(dir: &Path, name: &str, content: &str) -> ChangedArtifact {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    ChangedArtifact::new(path, ChangeKind::Modified)
}

fn sourced_store() -> Arc<RuleStore> {
    let store = Arc::new(RuleStore::new());
    store
        .upsert(
            CollectionKind::EditorialRules,
            Rule::new("style-sentence-case", "headlines use sentence case", "style"),
        )
        .unwrap();
    store
        .upsert(
            CollectionKind::SchedulingRules,
            Rule::new("sched-weekday", "publish on weekdays before noon", "schedule"),
        )
        .unwrap();
    store
}

#[tokio::test]
async fn literal_rule_list_on_disk_blocks_with_line_number() {
    let dir = TempDir::new().unwrap();
    let clean = write_file(dir.path(), "src/publish.py", "def publish(doc):\n    return doc\n");
    let dirty = write_file(
        dir.path(),
        "src/style.py",
        "import re\n\nforbidden_phrases = [\"synergy\", \"leverage\"]\n",
    );

    let gate = Orchestrator::for_store(GateConfig::default(), sourced_store()).unwrap();
    let report = gate
        .run(vec![clean, dirty], None, ValidationLevel::Strict)
        .await;

    assert_eq!(report.status, ValidationStatus::Fail);
    assert_eq!(report.exit_code(), 1);
    let v = report
        .violations
        .iter()
        .find(|v| v.artifact.ends_with("style.py"))
        .expect("violation anchored to the offending artifact");
    assert_eq!(v.line, Some(3));
    assert!(!v.remediation.is_empty());
}

#[tokio::test]
async fn clean_changeset_with_sourced_store_passes() {
    let dir = TempDir::new().unwrap();
    let artifact = write_file(
        dir.path(),
        "src/publish.py",
        "def publish(doc):\n    return send(doc)\n",
    );

    let gate = Orchestrator::for_store(GateConfig::default(), sourced_store()).unwrap();
    let report = gate.run(vec![artifact], None, ValidationLevel::Strict).await;

    assert_eq!(report.status, ValidationStatus::Pass);
    assert_eq!(report.exit_code(), 0);
    assert!(!report.budget_exceeded);
    assert_eq!(report.stage_timings_ms.len(), 4);
    assert_eq!(report.digest().unwrap().len(), 64);
}

#[tokio::test]
async fn excluded_test_paths_never_enter_the_pipeline() {
    // The literal lives under tests/, which the default deny-list drops.
    let fixture = ChangedArtifact::new("tests/fixture_rules.py", ChangeKind::Modified)
        .with_content("forbidden_phrases = [\"synergy\"]\n");

    let gate = Orchestrator::for_store(GateConfig::default(), sourced_store()).unwrap();
    let report = gate.run(vec![fixture], None, ValidationLevel::Standard).await;

    assert_eq!(report.status, ValidationStatus::Pass);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("excluded by the deny-list")));
}

struct DeadProbe;

#[async_trait]
impl HealthProbe for DeadProbe {
    async fn ping(&self) -> Result<bool, String> {
        Err("connection refused".to_string())
    }
}

struct FixedAggregate(SourcingAggregate);

#[async_trait]
impl rulegate_core::SourcingAggregator for FixedAggregate {
    async fn aggregate(&self) -> Result<SourcingAggregate, String> {
        Ok(self.0)
    }
}

fn gate_with_dead_store() -> Orchestrator {
    let verifier = SourcingVerifier::new(
        Arc::new(DeadProbe),
        Arc::new(FixedAggregate(SourcingAggregate {
            total_active: 0,
            store_sourced: 0,
            fraction: 1.0,
        })),
    );
    Orchestrator::new(GateConfig::default(), verifier).unwrap()
}

#[tokio::test]
async fn hotfix_commit_passes_strict_with_dead_store() {
    let gate = gate_with_dead_store();
    let entries = vec![
        ChangedArtifact::new("src/checkout.py", ChangeKind::Modified)
            .with_content("def checkout(cart):\n    return pay(cart)\n"),
    ];

    let blocked = gate
        .run(entries.clone(), Some("fix checkout"), ValidationLevel::Strict)
        .await;
    assert_eq!(blocked.status, ValidationStatus::Fail);

    let bypassed = gate
        .run(entries, Some("HOTFIX: checkout down"), ValidationLevel::Strict)
        .await;
    assert_eq!(bypassed.status, ValidationStatus::Pass);
    assert!(bypassed.bypass_applied);
    assert!(!bypassed.warnings.is_empty());
}

#[tokio::test]
async fn dead_store_only_warns_below_strict() {
    let gate = gate_with_dead_store();
    let entries = vec![ChangedArtifact::new("src/ok.py", ChangeKind::Modified)
        .with_content("x = 1\n")];
    // Standard never reaches the external stages at all.
    let report = gate.run(entries, None, ValidationLevel::Standard).await;
    assert_eq!(report.status, ValidationStatus::Pass);
    assert!(!report.stage_timings_ms.contains_key("health_check"));
}

#[tokio::test]
async fn report_serializes_to_json() {
    let gate = Orchestrator::for_store(GateConfig::default(), sourced_store()).unwrap();
    let report = gate
        .run(
            vec![ChangedArtifact::new("src/ok.py", ChangeKind::Modified).with_content("x = 1\n")],
            None,
            ValidationLevel::Standard,
        )
        .await;

    let json = serde_json::to_string_pretty(&report).unwrap();
    assert!(json.contains("\"status\": \"pass\""));
    assert!(json.contains("\"level\": \"standard\""));
    assert!(json.contains("pattern_scan"));
}

#[tokio::test]
async fn store_queries_feed_the_gate_domain() {
    // The store and the gate agree on what a sourced rule is: ingest an
    // external rule, watch the gate block, re-ingest as store-sourced,
    // watch it pass.
    let store = Arc::new(RuleStore::new());
    store
        .upsert(
            CollectionKind::EditorialRules,
            Rule::new("imported", "no passive voice", "style").with_origin(RuleOrigin::External),
        )
        .unwrap();

    let gate = Orchestrator::for_store(GateConfig::default(), Arc::clone(&store)).unwrap();
    let entries = vec![ChangedArtifact::new("src/ok.py", ChangeKind::Modified)
        .with_content("x = 1\n")];

    let blocked = gate
        .run(entries.clone(), None, ValidationLevel::Strict)
        .await;
    assert_eq!(blocked.status, ValidationStatus::Fail);

    let outcome = store
        .upsert(
            CollectionKind::EditorialRules,
            Rule::new("imported", "no passive voice", "style").with_origin(RuleOrigin::Store),
        )
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Superseded);

    let passed = gate.run(entries, None, ValidationLevel::Strict).await;
    assert_eq!(passed.status, ValidationStatus::Pass);

    // And the migrated rule is retrievable the way application code asks.
    let hits = store
        .query(
            CollectionKind::EditorialRules,
            "passive voice",
            &QueryFilter::all_rules(),
            Workflow::Both,
            10,
        )
        .unwrap();
    assert_eq!(hits[0].rule.id, "imported");
    assert_eq!(hits[0].rule.version, 2);
}
