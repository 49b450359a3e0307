//! Rulegate Rule Store
//!
//! Multi-collection semantic store for migrated publishing rules: typed
//! rules with append-only versioning, validated metadata filters, ranked
//! nearest-neighbor retrieval, and the sourcing aggregate the commit gate
//! verifies against.

pub mod collection;
pub mod embed;
pub mod error;
pub mod filter;
pub mod rule;
pub mod store;

pub use collection::{Collection, CollectionKind, UpsertOutcome};
pub use embed::{embed, similarity, EMBEDDING_DIM};
pub use error::{Result, StoreError};
pub use filter::{FieldKind, FieldPredicate, FieldSchema, QueryFilter};
pub use rule::{Checkpoint, Rule, RuleOrigin, ScoredRule, Workflow, PLATFORM_ALL};
pub use store::{RuleStore, SourcingAggregate, COMPREHENSIVE_TOP_K, SELECTIVE_TOP_K};
