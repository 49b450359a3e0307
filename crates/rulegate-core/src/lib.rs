//! Rulegate Core Library
//!
//! Commit-time validation pipeline that keeps hand-coded business rules
//! from re-entering a codebase once they have been migrated to the
//! centralized rule store. Re-exports the pipeline components for
//! programmatic access.

pub mod breaker;
pub mod changeset;
pub mod config;
pub mod context;
pub mod error;
pub mod monitor;
pub mod obs;
pub mod orchestrator;
pub mod scanner;
pub mod sourcing;
pub mod telemetry;
pub mod violation;

pub use breaker::{BreakerConfig, BreakerStatus, CircuitBreaker};
pub use changeset::{is_scannable, ChangeKind, ChangeSet, ChangedArtifact};
pub use config::{GateConfig, PatternSpec, ScanLimits, LEVEL_ENV_VAR};
pub use context::ContextAnalyzer;
pub use error::{GateError, Result};
pub use monitor::{
    MonitorThresholds, PerformanceMonitor, QueryKind, QueryObservation, Recommendation,
};
pub use orchestrator::{EmergencyBypass, Orchestrator, BYPASS_KEYWORDS};
pub use scanner::{CompiledPattern, PatternScanner, ScanOutcome};
pub use sourcing::{
    HealthProbe, SourcingAggregator, SourcingVerifier, StoreHealthProbe, StoreSourcingAggregator,
};
pub use violation::{
    Severity, Stage, ValidationLevel, ValidationReport, ValidationStatus, Violation,
};

pub use obs::{
    emit_budget_exceeded, emit_bypass_applied, emit_gate_verdict, emit_run_started,
    emit_stage_finished, RunSpan,
};
pub use telemetry::{init_tracing, LOG_ENV_VAR};

/// Rulegate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
