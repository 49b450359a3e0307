//! Health and sourcing checks against the rule-store dependency.
//!
//! Both checks go through the circuit breaker, so a dead store costs one
//! bounded call, not a hang. The stages report through the same violation
//! model as the scanners; whether a dependency failure blocks or warns is
//! the caller's decision (level and bypass live in the orchestrator).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use rulegate_store::{CollectionKind, RuleStore, SourcingAggregate};

use crate::breaker::CircuitBreaker;
use crate::monitor::{PerformanceMonitor, QueryKind, QueryObservation};
use crate::scanner::ScanOutcome;
use crate::violation::{Severity, Stage, Violation};

/// Artifact name violations from these stages anchor to.
const STORE_ARTIFACT: &str = "rule-store";

/// Liveness probe for the rule-store dependency.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Ok(true) healthy, Ok(false) reachable but degraded, Err unreachable.
    async fn ping(&self) -> std::result::Result<bool, String>;
}

/// Source of the sourcing aggregate the verifier judges.
#[async_trait]
pub trait SourcingAggregator: Send + Sync {
    async fn aggregate(&self) -> std::result::Result<SourcingAggregate, String>;
}

/// In-process adapter: probes the store with a cheap collection read.
pub struct StoreHealthProbe {
    store: Arc<RuleStore>,
}

impl StoreHealthProbe {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthProbe for StoreHealthProbe {
    async fn ping(&self) -> std::result::Result<bool, String> {
        for kind in CollectionKind::ALL {
            self.store.len(kind).map_err(|e| e.to_string())?;
        }
        Ok(true)
    }
}

/// In-process adapter over [`RuleStore::sourcing_aggregate_all`].
pub struct StoreSourcingAggregator {
    store: Arc<RuleStore>,
}

impl StoreSourcingAggregator {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SourcingAggregator for StoreSourcingAggregator {
    async fn aggregate(&self) -> std::result::Result<SourcingAggregate, String> {
        Ok(self.store.sourcing_aggregate_all())
    }
}

/// Runs the health-check and sourcing-check stages.
pub struct SourcingVerifier {
    probe: Arc<dyn HealthProbe>,
    aggregator: Arc<dyn SourcingAggregator>,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl SourcingVerifier {
    pub fn new(probe: Arc<dyn HealthProbe>, aggregator: Arc<dyn SourcingAggregator>) -> Self {
        Self {
            probe,
            aggregator,
            monitor: None,
        }
    }

    /// Report aggregate-query latency to a performance monitor.
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Wire both checks to one in-process store.
    pub fn for_store(store: Arc<RuleStore>) -> Self {
        Self::new(
            Arc::new(StoreHealthProbe::new(Arc::clone(&store))),
            Arc::new(StoreSourcingAggregator::new(store)),
        )
    }

    /// Health-check stage. `blocking` decides whether a failed or
    /// unreachable dependency blocks the commit or only warns.
    pub async fn check_health(&self, breaker: &CircuitBreaker, blocking: bool) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let result = breaker
            .call(Stage::HealthCheck, self.probe.ping())
            .await;

        match result {
            Ok(true) => {
                debug!("rule store healthy");
            }
            Ok(false) => self.report(
                &mut outcome,
                Stage::HealthCheck,
                blocking,
                "store-degraded",
                "rule store responded but reports itself degraded".to_string(),
                "investigate rule-store health before committing rule-dependent changes",
            ),
            Err(e) => self.report(
                &mut outcome,
                Stage::HealthCheck,
                blocking,
                "store-unreachable",
                format!("rule store health probe failed: {e}"),
                "check rule-store availability; retry once the dependency recovers",
            ),
        }
        outcome
    }

    /// Sourcing-check stage: every active rule must trace back to the
    /// store. An unsourced population blocks when `blocking`, warns
    /// otherwise (emergency bypass downgrades it like any external finding).
    pub async fn check_sourcing(&self, breaker: &CircuitBreaker, blocking: bool) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let started = Instant::now();
        let result = breaker
            .call(Stage::SourcingCheck, self.aggregator.aggregate())
            .await;

        if let (Some(monitor), Ok(agg)) = (&self.monitor, &result) {
            monitor.observe(QueryObservation {
                kind: QueryKind::Sourcing,
                latency: started.elapsed(),
                result_count: agg.total_active,
                filter_fields: Vec::new(),
            });
        }

        match result {
            Ok(agg) if agg.fully_sourced() => {
                debug!(total = agg.total_active, "all active rules store-sourced");
            }
            Ok(agg) => {
                let unsourced = agg.total_active - agg.store_sourced;
                self.report(
                    &mut outcome,
                    Stage::SourcingCheck,
                    blocking,
                    "unsourced-rules",
                    format!(
                        "{unsourced} of {} active rules do not trace to the rule store \
                         (sourced fraction {:.2})",
                        agg.total_active, agg.fraction
                    ),
                    "re-ingest the unsourced rules through the authoring tooling so their \
                     origin is the store",
                );
            }
            Err(e) => self.report(
                &mut outcome,
                Stage::SourcingCheck,
                blocking,
                "sourcing-unavailable",
                format!("sourcing aggregate unavailable: {e}"),
                "check rule-store availability; retry once the dependency recovers",
            ),
        }
        outcome
    }

    fn report(
        &self,
        outcome: &mut ScanOutcome,
        stage: Stage,
        blocking: bool,
        rule_id: &str,
        message: String,
        remediation: &str,
    ) {
        if blocking {
            outcome.violations.push(Violation {
                artifact: STORE_ARTIFACT.to_string(),
                stage,
                rule_id: rule_id.to_string(),
                line: None,
                message,
                remediation: remediation.to_string(),
                severity: Severity::Block,
            });
        } else {
            outcome.warnings.push(format!("{stage}: {message}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rulegate_store::{Rule, RuleOrigin};

    use crate::breaker::BreakerConfig;

    struct FixedProbe(std::result::Result<bool, String>);

    #[async_trait]
    impl HealthProbe for FixedProbe {
        async fn ping(&self) -> std::result::Result<bool, String> {
            self.0.clone()
        }
    }

    struct FixedAggregate(SourcingAggregate);

    #[async_trait]
    impl SourcingAggregator for FixedAggregate {
        async fn aggregate(&self) -> std::result::Result<SourcingAggregate, String> {
            Ok(self.0)
        }
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_millis(200),
        })
    }

    fn verifier(probe: FixedProbe, agg: FixedAggregate) -> SourcingVerifier {
        SourcingVerifier::new(Arc::new(probe), Arc::new(agg))
    }

    fn sourced(total: usize, sourced: usize) -> SourcingAggregate {
        SourcingAggregate {
            total_active: total,
            store_sourced: sourced,
            fraction: if total == 0 {
                1.0
            } else {
                sourced as f32 / total as f32
            },
        }
    }

    #[tokio::test]
    async fn test_healthy_sourced_store_is_clean() {
        let v = verifier(FixedProbe(Ok(true)), FixedAggregate(sourced(3, 3)));
        let b = breaker();
        assert!(v.check_health(&b, true).await.is_clean());
        assert!(v.check_sourcing(&b, true).await.is_clean());
    }

    #[tokio::test]
    async fn test_unreachable_store_blocks_when_blocking() {
        let v = verifier(
            FixedProbe(Err("connection refused".to_string())),
            FixedAggregate(sourced(0, 0)),
        );
        let outcome = v.check_health(&breaker(), true).await;
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule_id, "store-unreachable");
        assert_eq!(outcome.violations[0].severity, Severity::Block);
    }

    #[tokio::test]
    async fn test_unreachable_store_warns_when_not_blocking() {
        let v = verifier(
            FixedProbe(Err("connection refused".to_string())),
            FixedAggregate(sourced(0, 0)),
        );
        let outcome = v.check_health(&breaker(), false).await;
        assert!(outcome.is_clean());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("health_check"));
    }

    #[tokio::test]
    async fn test_degraded_store_is_distinct_from_unreachable() {
        let v = verifier(FixedProbe(Ok(false)), FixedAggregate(sourced(0, 0)));
        let outcome = v.check_health(&breaker(), true).await;
        assert_eq!(outcome.violations[0].rule_id, "store-degraded");
    }

    #[tokio::test]
    async fn test_unsourced_rules_block_when_blocking() {
        let v = verifier(FixedProbe(Ok(true)), FixedAggregate(sourced(4, 2)));
        let outcome = v.check_sourcing(&breaker(), true).await;
        assert_eq!(outcome.violations.len(), 1);
        let violation = &outcome.violations[0];
        assert_eq!(violation.rule_id, "unsourced-rules");
        assert_eq!(violation.severity, Severity::Block);
        assert!(violation.message.contains("2 of 4"));
    }

    #[tokio::test]
    async fn test_unsourced_rules_downgrade_when_bypassed() {
        let v = verifier(FixedProbe(Ok(true)), FixedAggregate(sourced(4, 2)));
        let outcome = v.check_sourcing(&breaker(), false).await;
        assert!(outcome.is_clean());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("sourcing_check"));
    }

    #[tokio::test]
    async fn test_store_adapters_round_trip() {
        let store = Arc::new(RuleStore::new());
        store
            .upsert(
                CollectionKind::EditorialRules,
                Rule::new("r1", "short sentences", "style"),
            )
            .unwrap();
        store
            .upsert(
                CollectionKind::EditorialRules,
                Rule::new("r2", "injected", "style").with_origin(RuleOrigin::External),
            )
            .unwrap();

        let v = SourcingVerifier::for_store(store);
        let b = breaker();
        assert!(v.check_health(&b, true).await.is_clean());
        let outcome = v.check_sourcing(&b, true).await;
        assert_eq!(outcome.violations.len(), 1);
        assert!(outcome.violations[0].message.contains("1 of 2"));
    }
}
