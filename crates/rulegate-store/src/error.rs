//! Error taxonomy for the rule store.

/// Errors produced by rule store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("filter references unknown field '{field}' in collection '{collection}'")]
    UnknownField { field: String, collection: String },

    #[error("filter type mismatch on field '{field}': expected {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for rule store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
