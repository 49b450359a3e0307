//! Structured observability hooks for validation-run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: run start, stage finish,
//!   bypass application, final verdict
//!
//! Events are emitted at `info!` level and filtered via `RUST_LOG`.

use tracing::info;

use crate::violation::{Stage, ValidationLevel};

/// RAII guard that enters a run-scoped tracing span for the duration of
/// a validation run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("b2f1…");
/// // All tracing calls are now associated with run_id = "b2f1…"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("rulegate.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: validation run started.
pub fn emit_run_started(run_id: &str, level: ValidationLevel, artifacts: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        level = %level,
        artifacts = artifacts,
    );
}

/// Emit event: one pipeline stage finished.
pub fn emit_stage_finished(run_id: &str, stage: Stage, duration_ms: u64, violations: usize) {
    info!(
        event = "stage.finished",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
        violations = violations,
    );
}

/// Emit event: an emergency bypass downgraded external blocking stages.
pub fn emit_bypass_applied(run_id: &str, keyword: &str) {
    info!(event = "run.bypass_applied", run_id = %run_id, keyword = %keyword);
}

/// Emit event: final gate verdict.
pub fn emit_gate_verdict(run_id: &str, passed: bool, blocking: usize, duration_ms: u64) {
    info!(
        event = "gate.verdict",
        run_id = %run_id,
        passed = passed,
        blocking_violations = blocking,
        duration_ms = duration_ms,
    );
}

/// Emit event: the wall-clock budget expired before all stages ran
/// (warning level).
pub fn emit_budget_exceeded(run_id: &str, skipped_stage: Stage) {
    tracing::warn!(event = "run.budget_exceeded", run_id = %run_id, skipped = %skipped_stage);
}
