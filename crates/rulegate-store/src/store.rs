//! Multi-collection rule store with ranked semantic queries.
//!
//! Collections are read-mostly: queries take a read lock and never block
//! each other; ingestion (upsert) is the only writer. Cross-collection
//! joins are not supported — callers issue one query per collection and
//! merge results themselves.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collection::{Collection, CollectionKind, UpsertOutcome};
use crate::embed::{embed, similarity};
use crate::error::{Result, StoreError};
use crate::filter::QueryFilter;
use crate::rule::{Checkpoint, Rule, RuleOrigin, ScoredRule, Workflow};

/// Default result width for the comprehensive query shape.
pub const COMPREHENSIVE_TOP_K: usize = 50;

/// Default result width for the selective query shape.
pub const SELECTIVE_TOP_K: usize = 10;

/// Sourcing aggregate over the active rule population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourcingAggregate {
    /// Active (latest-version) rules counted.
    pub total_active: usize,
    /// Active rules whose origin is the store itself.
    pub store_sourced: usize,
    /// `store_sourced / total_active`; 1.0 for an empty population.
    /// Display value only: f32 division rounds at large populations.
    pub fraction: f32,
}

impl SourcingAggregate {
    /// Whether every active rule traces to the store. Exact count
    /// comparison; `fraction` is not consulted.
    pub fn fully_sourced(&self) -> bool {
        self.store_sourced == self.total_active
    }
}

/// The in-process rule store.
pub struct RuleStore {
    collections: HashMap<CollectionKind, RwLock<Collection>>,
}

impl RuleStore {
    /// Create a store with all canonical collections, empty.
    pub fn new() -> Self {
        let mut collections = HashMap::new();
        for kind in CollectionKind::ALL {
            collections.insert(kind, RwLock::new(Collection::new(kind)));
        }
        Self { collections }
    }

    fn collection(&self, kind: CollectionKind) -> Result<&RwLock<Collection>> {
        self.collections
            .get(&kind)
            .ok_or_else(|| StoreError::UnknownCollection(kind.name().to_string()))
    }

    /// Ingest a rule into a collection. Replay-safe: re-ingesting an
    /// identical rule is a no-op.
    pub fn upsert(&self, kind: CollectionKind, rule: Rule) -> Result<UpsertOutcome> {
        let lock = self.collection(kind)?;
        let mut guard = lock.write().expect("collection lock poisoned");
        guard.upsert(rule)
    }

    /// Latest version of a rule id, if present.
    pub fn get(&self, kind: CollectionKind, id: &str) -> Result<Option<Rule>> {
        let lock = self.collection(kind)?;
        let guard = lock.read().expect("collection lock poisoned");
        Ok(guard.get(id).cloned())
    }

    /// Number of distinct rule ids in a collection.
    pub fn len(&self, kind: CollectionKind) -> Result<usize> {
        let lock = self.collection(kind)?;
        Ok(lock.read().expect("collection lock poisoned").len())
    }

    /// Ranked nearest-neighbor query over one collection.
    ///
    /// Only rules satisfying `filter` (validated against the collection
    /// schema first) and participating in `workflow` are ranked. Each rule
    /// is gated by its own `confidence_threshold`; ties break by higher
    /// priority, then more recent version. Pure read, idempotent.
    pub fn query(
        &self,
        kind: CollectionKind,
        text: &str,
        filter: &QueryFilter,
        workflow: Workflow,
        top_k: usize,
    ) -> Result<Vec<ScoredRule>> {
        let lock = self.collection(kind)?;
        let guard = lock.read().expect("collection lock poisoned");
        filter.validate(guard.schema(), kind.name())?;

        let query_vec = embed(text);
        let mut scored: Vec<ScoredRule> = guard
            .active_rules()
            .filter(|(rule, _)| rule.workflow.matches(workflow))
            .filter(|(rule, _)| filter.matches(rule))
            .map(|(rule, vec)| ScoredRule {
                rule: rule.clone(),
                score: similarity(&query_vec, vec),
            })
            .filter(|s| s.score >= s.rule.confidence_threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.rule.priority.cmp(&a.rule.priority))
                .then_with(|| b.rule.version.cmp(&a.rule.version))
        });
        scored.truncate(top_k);

        debug!(
            collection = %kind,
            results = scored.len(),
            top_k = top_k,
            "rule query executed"
        );
        Ok(scored)
    }

    /// Comprehensive query shape: wide result set, full caller filter,
    /// comprehensive-workflow rules.
    pub fn query_comprehensive(
        &self,
        kind: CollectionKind,
        text: &str,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredRule>> {
        self.query(kind, text, filter, Workflow::Comprehensive, COMPREHENSIVE_TOP_K)
    }

    /// Selective query shape: narrow result set, filter restricted to the
    /// checkpoint's focus rule types, selective-workflow rules.
    pub fn query_selective(
        &self,
        kind: CollectionKind,
        text: &str,
        checkpoint: Checkpoint,
        extra: Option<QueryFilter>,
    ) -> Result<Vec<ScoredRule>> {
        let focus = checkpoint
            .focus_rule_types()
            .iter()
            .map(|t| (*t).to_string())
            .collect();
        let mut filters = vec![QueryFilter::is_in("rule_type", focus)];
        if let Some(f) = extra {
            filters.push(f);
        }
        self.query(
            kind,
            text,
            &QueryFilter::and(filters),
            Workflow::Selective,
            SELECTIVE_TOP_K,
        )
    }

    /// Sourcing aggregate for one collection.
    pub fn sourcing_aggregate(&self, kind: CollectionKind) -> Result<SourcingAggregate> {
        let lock = self.collection(kind)?;
        let guard = lock.read().expect("collection lock poisoned");
        let mut total = 0usize;
        let mut sourced = 0usize;
        for (rule, _) in guard.active_rules() {
            total += 1;
            if rule.origin == RuleOrigin::Store {
                sourced += 1;
            }
        }
        Ok(aggregate_of(total, sourced))
    }

    /// Sourcing aggregate across every collection — the single fact the
    /// sourcing verifier depends on.
    pub fn sourcing_aggregate_all(&self) -> SourcingAggregate {
        let mut total = 0usize;
        let mut sourced = 0usize;
        for kind in CollectionKind::ALL {
            if let Ok(agg) = self.sourcing_aggregate(kind) {
                total += agg.total_active;
                sourced += agg.store_sourced;
            }
        }
        aggregate_of(total, sourced)
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

fn aggregate_of(total: usize, sourced: usize) -> SourcingAggregate {
    let fraction = if total == 0 {
        1.0
    } else {
        sourced as f32 / total as f32
    };
    SourcingAggregate {
        total_active: total,
        store_sourced: sourced,
        fraction,
    }
}
