//! Typed query filters over rule metadata.
//!
//! Filters are a tagged predicate tree (AND / OR / field predicate) so that
//! unknown fields and type mismatches are caught by [`QueryFilter::validate`]
//! before the store is consulted, instead of silently matching nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, StoreError};
use crate::rule::Rule;

/// Value type a filterable field carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Numeric,
}

/// Known filterable fields of one collection.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    fields: HashMap<String, FieldKind>,
}

impl FieldSchema {
    /// The standard rule schema shared by all canonical collections.
    pub fn standard() -> Self {
        let mut fields = HashMap::new();
        fields.insert("rule_type".to_string(), FieldKind::Text);
        fields.insert("platform".to_string(), FieldKind::Text);
        fields.insert("workflow".to_string(), FieldKind::Text);
        fields.insert("checkpoint".to_string(), FieldKind::Text);
        fields.insert("action".to_string(), FieldKind::Text);
        fields.insert("text".to_string(), FieldKind::Text);
        fields.insert("priority".to_string(), FieldKind::Numeric);
        Self { fields }
    }

    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        self.fields.get(field).copied()
    }
}

/// A single predicate over one metadata field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldPredicate {
    /// Field equals the value. On `platform`, the universal wildcard on the
    /// rule side also matches.
    Eq { field: String, value: String },
    /// Field is one of the values (set membership).
    In { field: String, values: Vec<String> },
    /// Numeric field within `[min, max]`; open bounds allowed.
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Text field contains the needle (case-insensitive).
    Contains { field: String, needle: String },
}

impl FieldPredicate {
    fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. }
            | Self::In { field, .. }
            | Self::Range { field, .. }
            | Self::Contains { field, .. } => field,
        }
    }

    fn required_kind(&self) -> FieldKind {
        match self {
            Self::Range { .. } => FieldKind::Numeric,
            _ => FieldKind::Text,
        }
    }
}

/// Predicate tree evaluated against rule metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryFilter {
    /// Conjunction: all children must match. Empty matches everything.
    All { filters: Vec<QueryFilter> },
    /// Disjunction: at least one child must match.
    Any { filters: Vec<QueryFilter> },
    /// Leaf field predicate.
    Field(FieldPredicate),
}

impl QueryFilter {
    /// Filter that matches every rule.
    pub fn all_rules() -> Self {
        Self::All {
            filters: Vec::new(),
        }
    }

    /// Convenience leaf: `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Field(FieldPredicate::Eq {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Convenience leaf: `field IN values`.
    pub fn is_in(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::Field(FieldPredicate::In {
            field: field.into(),
            values,
        })
    }

    /// Conjunction builder.
    pub fn and(filters: Vec<QueryFilter>) -> Self {
        Self::All { filters }
    }

    /// Validate every referenced field against the collection schema.
    ///
    /// Fails with [`StoreError::UnknownField`] or [`StoreError::TypeMismatch`]
    /// before any rule is examined.
    pub fn validate(&self, schema: &FieldSchema, collection: &str) -> Result<()> {
        match self {
            Self::All { filters } | Self::Any { filters } => {
                for f in filters {
                    f.validate(schema, collection)?;
                }
                Ok(())
            }
            Self::Field(pred) => {
                let field = pred.field();
                let kind = schema.kind_of(field).ok_or_else(|| StoreError::UnknownField {
                    field: field.to_string(),
                    collection: collection.to_string(),
                })?;
                if kind != pred.required_kind() {
                    return Err(StoreError::TypeMismatch {
                        field: field.to_string(),
                        expected: match pred.required_kind() {
                            FieldKind::Numeric => "numeric".to_string(),
                            FieldKind::Text => "text".to_string(),
                        },
                    });
                }
                Ok(())
            }
        }
    }

    /// Evaluate the tree against a rule. Call [`QueryFilter::validate`] first;
    /// evaluation assumes every field is known.
    pub fn matches(&self, rule: &Rule) -> bool {
        match self {
            Self::All { filters } => filters.iter().all(|f| f.matches(rule)),
            Self::Any { filters } => !filters.is_empty() && filters.iter().any(|f| f.matches(rule)),
            Self::Field(pred) => match pred {
                FieldPredicate::Eq { field, value } => {
                    if field == "platform" {
                        rule.applies_to_platform(value)
                    } else {
                        text_field(rule, field).map(|v| v == *value).unwrap_or(false)
                    }
                }
                FieldPredicate::In { field, values } => {
                    if field == "platform" {
                        values.iter().any(|v| rule.applies_to_platform(v))
                    } else {
                        text_field(rule, field)
                            .map(|v| values.contains(&v))
                            .unwrap_or(false)
                    }
                }
                FieldPredicate::Range { field, min, max } => {
                    numeric_field(rule, field)
                        .map(|v| min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m))
                        .unwrap_or(false)
                }
                FieldPredicate::Contains { field, needle } => text_field(rule, field)
                    .map(|v| v.to_lowercase().contains(&needle.to_lowercase()))
                    .unwrap_or(false),
            },
        }
    }
}

fn text_field(rule: &Rule, field: &str) -> Option<String> {
    match field {
        "rule_type" => Some(rule.rule_type.clone()),
        "platform" => Some(rule.platform.clone()),
        "workflow" => Some(
            match rule.workflow {
                crate::rule::Workflow::Comprehensive => "comprehensive",
                crate::rule::Workflow::Selective => "selective",
                crate::rule::Workflow::Both => "both",
            }
            .to_string(),
        ),
        "checkpoint" => rule.checkpoint.map(|c| c.to_string()),
        "action" => Some(rule.action.clone()),
        "text" => Some(rule.text.clone()),
        _ => None,
    }
}

fn numeric_field(rule: &Rule, field: &str) -> Option<f64> {
    match field {
        "priority" => Some(rule.priority as f64),
        _ => None,
    }
}
