//! Violations, stages, levels, and the validation report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Pipeline stages, in their strict execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PatternScan,
    ContextAnalysis,
    HealthCheck,
    SourcingCheck,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PatternScan => "pattern_scan",
            Self::ContextAnalysis => "context_analysis",
            Self::HealthCheck => "health_check",
            Self::SourcingCheck => "sourcing_check",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Whether a violation blocks the commit or only warns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Block,
    Warn,
}

/// A single finding. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Artifact path the finding is anchored to.
    pub artifact: String,
    /// Stage that produced it.
    pub stage: Stage,
    /// Pattern or rule identifier.
    pub rule_id: String,
    /// 1-based line number of the first match, when line-anchored.
    pub line: Option<usize>,
    /// What was found.
    pub message: String,
    /// What the author should do about it. Always present.
    pub remediation: String,
    pub severity: Severity,
}

impl Violation {
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Block
    }
}

/// Which stages execute and whether external-check failures block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// Pattern scan only.
    Minimal,
    /// Pattern scan + context analysis.
    Standard,
    /// All stages; external-check failures block.
    Strict,
    /// Strict plus the deep marker pass over every text artifact.
    Paranoid,
}

impl ValidationLevel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Strict => "strict",
            Self::Paranoid => "paranoid",
        }
    }

    /// Stages this level runs, in order.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Self::Minimal => &[Stage::PatternScan],
            Self::Standard => &[Stage::PatternScan, Stage::ContextAnalysis],
            Self::Strict | Self::Paranoid => &[
                Stage::PatternScan,
                Stage::ContextAnalysis,
                Stage::HealthCheck,
                Stage::SourcingCheck,
            ],
        }
    }

    /// Whether external-dependency failures block at this level.
    pub fn external_checks_block(&self) -> bool {
        matches!(self, Self::Strict | Self::Paranoid)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "minimal" => Some(Self::Minimal),
            "standard" => Some(Self::Standard),
            "strict" => Some(Self::Strict),
            "paranoid" => Some(Self::Paranoid),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Final pass/fail decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

/// The structured report rendered at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub status: ValidationStatus,
    pub level: ValidationLevel,
    pub violations: Vec<Violation>,
    pub warnings: Vec<String>,
    /// Milliseconds spent per executed stage, keyed by stage name.
    pub stage_timings_ms: BTreeMap<String, u64>,
    /// Set when the wall-clock budget expired before all stages ran.
    pub budget_exceeded: bool,
    /// Whether an emergency bypass downgraded external blocking stages.
    pub bypass_applied: bool,
    pub completed_at: DateTime<Utc>,
}

impl ValidationReport {
    /// Exit status for the hook: 0 allowed, 1 blocked.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            ValidationStatus::Pass => 0,
            ValidationStatus::Fail => 1,
        }
    }

    pub fn blocking_count(&self) -> usize {
        self.violations.iter().filter(|v| v.is_blocking()).count()
    }

    /// Content digest of the serialized report, for audit trails.
    pub fn digest(&self) -> crate::error::Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}
