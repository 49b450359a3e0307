//! Rule model: typed, versioned entries in the semantic rule store.
//!
//! Rule ids are immutable identity within a collection. Content updates
//! create a new version superseding the old one; history is never mutated
//! in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which validation workflow a rule participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    /// Exhaustive automated validation (wide retrieval).
    Comprehensive,
    /// Checkpoint-driven human-assisted validation (narrow retrieval).
    Selective,
    /// Participates in both workflows.
    Both,
}

impl Workflow {
    /// Whether a rule with this workflow participates in the given query shape.
    pub fn matches(&self, requested: Workflow) -> bool {
        matches!(
            (self, requested),
            (Workflow::Both, _)
                | (Workflow::Comprehensive, Workflow::Comprehensive)
                | (Workflow::Selective, Workflow::Selective)
        )
    }
}

/// Authoring-workflow phase that narrows which rule types are retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    PreWriting,
    MidWriting,
    PostWriting,
}

impl Checkpoint {
    /// Rule types in focus at this checkpoint.
    pub fn focus_rule_types(&self) -> &'static [&'static str] {
        match self {
            Checkpoint::PreWriting => &["structure", "audience", "format"],
            Checkpoint::MidWriting => &["style", "flow", "engagement"],
            Checkpoint::PostWriting => &["quality", "optimization", "polish"],
        }
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreWriting => write!(f, "pre_writing"),
            Self::MidWriting => write!(f, "mid_writing"),
            Self::PostWriting => write!(f, "post_writing"),
        }
    }
}

/// Where a rule's content originated.
///
/// Rules created through the migration/authoring tooling carry `Store`;
/// anything injected out-of-band is `External` and counts against the
/// sourcing aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    Store,
    External,
}

/// The universal platform wildcard; a rule targeting `all` applies everywhere.
pub const PLATFORM_ALL: &str = "all";

/// A single versioned rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique id within its collection. Immutable identity.
    pub id: String,
    /// The rule text queried against in embedding space.
    pub text: String,
    /// Rule type (e.g. style, format, structure, quality).
    pub rule_type: String,
    /// Target platform, or [`PLATFORM_ALL`] for the universal wildcard.
    pub platform: String,
    /// Validation workflow(s) this rule participates in.
    pub workflow: Workflow,
    /// Declared priority; higher wins ties in ranking.
    pub priority: u32,
    /// Optional authoring checkpoint this rule is pinned to.
    pub checkpoint: Option<Checkpoint>,
    /// Per-rule similarity gate in [0, 1]; results below it are dropped.
    pub confidence_threshold: f32,
    /// What a consumer should do when the rule matches.
    pub action: String,
    /// Source-of-origin marker used by the sourcing aggregate.
    pub origin: RuleOrigin,
    /// Monotonic version, starting at 1. Updates supersede, never mutate.
    pub version: u32,
    /// When this version was ingested.
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Create a first-version rule with sane defaults.
    pub fn new(id: impl Into<String>, text: impl Into<String>, rule_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            rule_type: rule_type.into(),
            platform: PLATFORM_ALL.to_string(),
            workflow: Workflow::Both,
            priority: 0,
            checkpoint: None,
            confidence_threshold: 0.0,
            action: "flag".to_string(),
            origin: RuleOrigin::Store,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_origin(mut self, origin: RuleOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Validate structural invariants before ingestion.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.id.trim().is_empty() {
            return Err(crate::error::StoreError::InvalidRule(
                "rule id must not be empty".to_string(),
            ));
        }
        if self.text.trim().is_empty() {
            return Err(crate::error::StoreError::InvalidRule(format!(
                "rule '{}' has empty text",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(crate::error::StoreError::InvalidRule(format!(
                "rule '{}' confidence_threshold {} outside [0, 1]",
                self.id, self.confidence_threshold
            )));
        }
        Ok(())
    }

    /// Whether this rule applies to the given platform (exact or wildcard).
    pub fn applies_to_platform(&self, platform: &str) -> bool {
        self.platform == platform || self.platform == PLATFORM_ALL
    }
}

/// A rule paired with its similarity score from a ranked query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRule {
    pub rule: Rule,
    /// Cosine similarity against the query text, in [-1, 1].
    pub score: f32,
}
