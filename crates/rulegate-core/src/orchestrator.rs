//! Validation orchestrator: runs the stages in strict order and renders
//! one report per run.
//!
//! Stage order never varies: pattern_scan, context_analysis, health_check,
//! sourcing_check. The level decides which suffix of that order executes
//! and whether external-check failures block. Any blocking violation ends
//! the run immediately; warnings accumulate across stages. Every stage
//! checks the remaining wall-clock budget before starting; an exhausted
//! budget skips the rest and marks the report, never a silent pass.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use rulegate_store::RuleStore;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::changeset::{ChangeSet, ChangedArtifact};
use crate::config::GateConfig;
use crate::context::ContextAnalyzer;
use crate::error::Result;
use crate::monitor::PerformanceMonitor;
use crate::obs::{
    emit_budget_exceeded, emit_bypass_applied, emit_gate_verdict, emit_run_started,
    emit_stage_finished, RunSpan,
};
use crate::scanner::{PatternScanner, ScanOutcome};
use crate::sourcing::SourcingVerifier;
use crate::violation::{
    Severity, Stage, ValidationLevel, ValidationReport, ValidationStatus, Violation,
};

/// Keywords that mark a commit as an emergency.
pub const BYPASS_KEYWORDS: &[&str] = &["HOTFIX", "EMERGENCY", "URGENT", "OUTAGE"];

/// Emergency-bypass classification of a commit message.
///
/// An active bypass downgrades the external blocking stages to warnings
/// for one run. It never suppresses pattern-scan blocks, and it is always
/// recorded on the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyBypass {
    None,
    Active { keyword: String },
}

impl EmergencyBypass {
    /// Classify a commit message. Pure: keyword token match only, no
    /// state, no heuristics over intent.
    pub fn classify(message: &str) -> Self {
        for token in message.split(|c: char| !c.is_ascii_alphanumeric()) {
            let upper = token.to_ascii_uppercase();
            if BYPASS_KEYWORDS.contains(&upper.as_str()) {
                return Self::Active { keyword: upper };
            }
        }
        Self::None
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// The pipeline. Built once from a validated config, reusable across runs.
pub struct Orchestrator {
    config: GateConfig,
    scanner: PatternScanner,
    analyzer: ContextAnalyzer,
    breaker: CircuitBreaker,
    verifier: SourcingVerifier,
    monitor: Arc<PerformanceMonitor>,
}

impl Orchestrator {
    /// Build the pipeline. Fails on an invalid config; the gate refuses
    /// to run with ambiguous settings.
    pub fn new(config: GateConfig, verifier: SourcingVerifier) -> Result<Self> {
        config.validate()?;
        let scanner = PatternScanner::new(&config.forbidden_patterns, config.scan.clone())?;
        let analyzer = ContextAnalyzer::new(config.collection_len_threshold, config.scan.clone())?;
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.failure_threshold,
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            call_timeout: Duration::from_millis(config.probe_timeout_ms),
        });
        let monitor = Arc::new(PerformanceMonitor::default());
        Ok(Self {
            config,
            scanner,
            analyzer,
            breaker,
            verifier: verifier.with_monitor(Arc::clone(&monitor)),
            monitor,
        })
    }

    /// Build the pipeline wired to one in-process rule store.
    pub fn for_store(config: GateConfig, store: Arc<RuleStore>) -> Result<Self> {
        let verifier = SourcingVerifier::for_store(store);
        Self::new(config, verifier)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Validate a change-set that enumerated successfully.
    pub async fn run(
        &self,
        entries: Vec<ChangedArtifact>,
        commit_message: Option<&str>,
        level: ValidationLevel,
    ) -> ValidationReport {
        self.run_enumerated(Ok(entries), commit_message, level).await
    }

    /// Validate, handling a failed change-set enumeration. Fail-closed:
    /// an enumeration failure blocks unless `fail_open` is set.
    pub async fn run_enumerated(
        &self,
        enumeration: std::result::Result<Vec<ChangedArtifact>, String>,
        commit_message: Option<&str>,
        level: ValidationLevel,
    ) -> ValidationReport {
        let run_id = Uuid::new_v4();
        let run_id_str = run_id.to_string();
        let _span = RunSpan::enter(&run_id_str);
        let started = Instant::now();
        let budget = Duration::from_secs(self.config.max_execution_time_secs);

        let bypass = commit_message
            .map(EmergencyBypass::classify)
            .unwrap_or(EmergencyBypass::None);
        if let EmergencyBypass::Active { keyword } = &bypass {
            emit_bypass_applied(&run_id_str, keyword);
        }

        let mut report = ValidationReport {
            run_id,
            status: ValidationStatus::Pass,
            level,
            violations: Vec::new(),
            warnings: Vec::new(),
            stage_timings_ms: BTreeMap::new(),
            budget_exceeded: false,
            bypass_applied: bypass.is_active(),
            completed_at: Utc::now(),
        };

        let entries = match enumeration {
            Ok(entries) => entries,
            Err(reason) => {
                return self.finish_unenumerated(report, reason, &run_id_str, started);
            }
        };
        let changeset = match ChangeSet::from_entries(entries, &self.config.excluded_paths) {
            Ok(cs) => cs,
            Err(e) => {
                return self.finish_unenumerated(report, e.to_string(), &run_id_str, started);
            }
        };

        emit_run_started(&run_id_str, level, changeset.len());
        if changeset.excluded_count() > 0 {
            report.warnings.push(format!(
                "{} artifact(s) excluded by the deny-list",
                changeset.excluded_count()
            ));
        }
        for path in changeset.missing_paths() {
            report.warnings.push(format!(
                "staged path {} not found on disk; it was not scanned",
                path.display()
            ));
        }

        // External-check findings block only at Strict/Paranoid, and an
        // active bypass downgrades them for this run.
        let external_blocking = level.external_checks_block() && !bypass.is_active();

        for stage in level.stages() {
            if started.elapsed() >= budget {
                report.budget_exceeded = true;
                report.warnings.push(format!(
                    "wall-clock budget exhausted before {stage}; remaining stages skipped"
                ));
                emit_budget_exceeded(&run_id_str, *stage);
                break;
            }

            let stage_started = Instant::now();
            let outcome = match stage {
                Stage::PatternScan => self.scanner.scan(&changeset).await,
                Stage::ContextAnalysis => {
                    let mut outcome = self.analyzer.analyze(&changeset).await;
                    if level == ValidationLevel::Paranoid {
                        let deep = self.analyzer.deep_marker_scan(&changeset).await;
                        merge(&mut outcome, deep);
                    }
                    outcome
                }
                Stage::HealthCheck | Stage::SourcingCheck => {
                    if self.config.skip_service_checks {
                        report
                            .warnings
                            .push(format!("{stage} skipped (skip_service_checks)"));
                        continue;
                    }
                    match stage {
                        Stage::HealthCheck => {
                            self.verifier
                                .check_health(&self.breaker, external_blocking)
                                .await
                        }
                        _ => {
                            self.verifier
                                .check_sourcing(&self.breaker, external_blocking)
                                .await
                        }
                    }
                }
            };

            let elapsed_ms = stage_started.elapsed().as_millis() as u64;
            report
                .stage_timings_ms
                .insert(stage.name().to_string(), elapsed_ms);
            emit_stage_finished(&run_id_str, *stage, elapsed_ms, outcome.violations.len());

            let blocked = outcome.violations.iter().any(Violation::is_blocking);
            report.violations.extend(outcome.violations);
            report.warnings.extend(outcome.warnings);

            if blocked {
                report.status = ValidationStatus::Fail;
                warn!(stage = %stage, "blocking violation, run failed");
                break;
            }
        }

        report.completed_at = Utc::now();
        self.monitor.flush();
        emit_gate_verdict(
            &run_id_str,
            report.status == ValidationStatus::Pass,
            report.blocking_count(),
            started.elapsed().as_millis() as u64,
        );
        report
    }

    fn finish_unenumerated(
        &self,
        mut report: ValidationReport,
        reason: String,
        run_id: &str,
        started: Instant,
    ) -> ValidationReport {
        if self.config.fail_open {
            report.warnings.push(format!(
                "change-set enumeration failed, allowed by fail_open: {reason}"
            ));
            info!(reason = %reason, "enumeration failed, fail_open allows the commit");
        } else {
            report.status = ValidationStatus::Fail;
            report.violations.push(Violation {
                artifact: "change-set".to_string(),
                stage: Stage::PatternScan,
                rule_id: "changeset-enumeration".to_string(),
                line: None,
                message: format!("could not enumerate the staged change-set: {reason}"),
                remediation: "verify the staged paths exist and are readable, or set \
                              fail_open to accept this risk explicitly"
                    .to_string(),
                severity: Severity::Block,
            });
        }
        report.completed_at = Utc::now();
        emit_gate_verdict(
            run_id,
            report.status == ValidationStatus::Pass,
            report.blocking_count(),
            started.elapsed().as_millis() as u64,
        );
        report
    }
}

fn merge(into: &mut ScanOutcome, mut from: ScanOutcome) {
    into.violations.append(&mut from.violations);
    into.warnings.append(&mut from.warnings);
}
