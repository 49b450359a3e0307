//! Named rule partitions sharing one schema and one embedding space.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embed::{embed, EMBEDDING_DIM};
use crate::error::Result;
use crate::filter::FieldSchema;
use crate::rule::Rule;

/// The canonical collections of the rule store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    EditorialRules,
    PlatformRules,
    Topics,
    SchedulingRules,
    UserPreferences,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 5] = [
        CollectionKind::EditorialRules,
        CollectionKind::PlatformRules,
        CollectionKind::Topics,
        CollectionKind::SchedulingRules,
        CollectionKind::UserPreferences,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::EditorialRules => "editorial_rules",
            Self::PlatformRules => "platform_rules",
            Self::Topics => "topics",
            Self::SchedulingRules => "scheduling_rules",
            Self::UserPreferences => "user_preferences",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of an upsert, distinguishing replay no-ops from real updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// New rule id.
    Inserted,
    /// Existing id, changed content: a new version supersedes the old one.
    Superseded,
    /// Existing id, identical content: migration replay, nothing written.
    Unchanged,
}

/// One collection: full version history per rule id plus embeddings for the
/// active (latest) versions.
#[derive(Debug)]
pub struct Collection {
    kind: CollectionKind,
    schema: FieldSchema,
    versions: HashMap<String, Vec<Rule>>,
    active_embeddings: HashMap<String, Vec<f32>>,
}

impl Collection {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            schema: FieldSchema::standard(),
            versions: HashMap::new(),
            active_embeddings: HashMap::new(),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Number of distinct rule ids.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Insert or supersede a rule. Rule ids are unique; re-ingesting an
    /// identical rule is a no-op so migration replays stay safe.
    pub fn upsert(&mut self, mut rule: Rule) -> Result<UpsertOutcome> {
        rule.validate()?;

        let outcome = match self.versions.get_mut(&rule.id) {
            None => {
                rule.version = 1;
                self.active_embeddings
                    .insert(rule.id.clone(), embed(&rule.text));
                self.versions.insert(rule.id.clone(), vec![rule]);
                UpsertOutcome::Inserted
            }
            Some(history) => {
                let active = history.last().expect("history is never empty");
                if same_content(active, &rule) {
                    return Ok(UpsertOutcome::Unchanged);
                }
                rule.version = active.version + 1;
                self.active_embeddings
                    .insert(rule.id.clone(), embed(&rule.text));
                history.push(rule);
                UpsertOutcome::Superseded
            }
        };

        debug!(collection = %self.kind, outcome = ?outcome, "rule upserted");
        Ok(outcome)
    }

    /// Latest version of a rule id.
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.versions.get(id).and_then(|h| h.last())
    }

    /// Full version history of a rule id, oldest first.
    pub fn history(&self, id: &str) -> Option<&[Rule]> {
        self.versions.get(id).map(|h| h.as_slice())
    }

    /// Iterate active rules with their embeddings.
    pub fn active_rules(&self) -> impl Iterator<Item = (&Rule, &[f32])> {
        self.versions.values().filter_map(move |h| {
            let rule = h.last()?;
            let vec: &[f32] = self
                .active_embeddings
                .get(&rule.id)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            Some((rule, vec))
        })
    }

    /// Embedding dimensionality of this collection's space.
    pub fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }
}

fn same_content(a: &Rule, b: &Rule) -> bool {
    a.text == b.text
        && a.rule_type == b.rule_type
        && a.platform == b.platform
        && a.workflow == b.workflow
        && a.priority == b.priority
        && a.checkpoint == b.checkpoint
        && a.confidence_threshold == b.confidence_threshold
        && a.action == b.action
        && a.origin == b.origin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut c = Collection::new(CollectionKind::EditorialRules);
        let outcome = c.upsert(Rule::new("r1", "no exclamation marks", "style")).unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(c.get("r1").unwrap().version, 1);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_reingest_identical_is_noop() {
        let mut c = Collection::new(CollectionKind::EditorialRules);
        c.upsert(Rule::new("r1", "no exclamation marks", "style")).unwrap();
        let outcome = c.upsert(Rule::new("r1", "no exclamation marks", "style")).unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(c.history("r1").unwrap().len(), 1);
    }

    #[test]
    fn test_changed_content_supersedes() {
        let mut c = Collection::new(CollectionKind::EditorialRules);
        c.upsert(Rule::new("r1", "no exclamation marks", "style")).unwrap();
        let outcome = c
            .upsert(Rule::new("r1", "at most one exclamation mark", "style"))
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Superseded);

        let history = c.history("r1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[1].version, 2);
        // Active rule is the new version; the old one is superseded, not gone.
        assert_eq!(c.get("r1").unwrap().text, "at most one exclamation mark");
    }

    #[test]
    fn test_active_rules_yields_latest_only() {
        let mut c = Collection::new(CollectionKind::PlatformRules);
        c.upsert(Rule::new("r1", "alpha", "format")).unwrap();
        c.upsert(Rule::new("r1", "beta", "format")).unwrap();
        c.upsert(Rule::new("r2", "gamma", "format")).unwrap();

        let active: Vec<_> = c.active_rules().map(|(r, _)| r.id.clone()).collect();
        assert_eq!(active.len(), 2);
        let r1 = c.get("r1").unwrap();
        assert_eq!(r1.text, "beta");
    }

    #[test]
    fn test_collection_kind_names() {
        assert_eq!(CollectionKind::EditorialRules.name(), "editorial_rules");
        assert_eq!(
            CollectionKind::from_name("scheduling_rules"),
            Some(CollectionKind::SchedulingRules)
        );
        assert_eq!(CollectionKind::from_name("nope"), None);
    }
}
