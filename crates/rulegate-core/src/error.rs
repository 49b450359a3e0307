//! Error taxonomy for the validation pipeline.
//!
//! Per-artifact scan failures never surface here: they are downgraded to
//! warnings on the artifact's result so one bad file cannot abort a run.
//! Everything in this enum is pipeline-level.

use crate::violation::Stage;

/// Pipeline-level errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Invalid or ambiguous settings. Fatal: the pipeline refuses to run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The staged change-set could not be enumerated. Fail-closed by default.
    #[error("could not enumerate change-set: {0}")]
    ChangeSetEnumeration(String),

    /// The circuit breaker is open or the dependency rejected the call.
    #[error("dependency unavailable during {stage}: {reason}")]
    DependencyUnavailable { stage: Stage, reason: String },

    /// A guarded call exceeded its hard timeout.
    #[error("guarded call in {stage} timed out after {timeout_ms}ms")]
    GuardedCallTimeout { stage: Stage, timeout_ms: u64 },

    #[error("rule store error: {0}")]
    Store(#[from] rulegate_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, GateError>;

impl GateError {
    /// Remediation hint surfaced alongside the error. User-visible failures
    /// always carry one; a bare error string is never the whole message.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::Configuration(_) => {
                "fix the gate configuration file and re-run; the gate refuses to run with ambiguous settings"
            }
            Self::ChangeSetEnumeration(_) => {
                "verify the staged paths exist and are readable, or set fail_open to accept this risk explicitly"
            }
            Self::DependencyUnavailable { .. } => {
                "check rule-store availability; retry once the dependency recovers or run at a non-strict level"
            }
            Self::GuardedCallTimeout { .. } => {
                "the rule-store dependency is slow; raise the probe timeout or investigate store latency"
            }
            Self::Store(_) => "correct the query filter or rule payload and retry",
            Self::Serialization(_) => "the report or config payload is malformed; regenerate it",
            Self::Io(_) => "check filesystem permissions for the listed path",
        }
    }
}
