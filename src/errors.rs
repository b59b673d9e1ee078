//! Structured error types for the recommendation core
//!
//! Provides machine-readable error codes for embedding applications and keeps
//! storage failures loud: a swallowed write would silently break the
//! tags-cache consistency invariant.

use std::fmt;

/// Recommendation core error types with proper categorization
#[derive(Debug)]
pub enum RecoError {
    /// Vote weight outside {+1, -1}; rejected before any mutation
    InvalidVoteWeight(i8),

    /// Tag name canonicalized to the empty string
    EmptyTag,

    /// Tag label containing the reserved key-separator byte
    InvalidTag(String),

    /// Entity reference whose type or id contains the reserved
    /// key-separator byte
    InvalidEntityRef(String),

    /// Storage engine failure while persisting or reading a profile/vote
    Storage(String),

    /// A stored record could not be decoded
    Serialization(String),

    /// Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl RecoError {
    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidVoteWeight(_) => "INVALID_VOTE_WEIGHT",
            Self::EmptyTag => "EMPTY_TAG",
            Self::InvalidTag(_) => "INVALID_TAG",
            Self::InvalidEntityRef(_) => "INVALID_ENTITY_REF",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidVoteWeight(w) => {
                format!("Invalid vote weight {w}: must be +1 or -1")
            }
            Self::EmptyTag => "Tag name is empty after normalization".to_string(),
            Self::InvalidTag(tag) => {
                format!("Invalid tag {tag:?}: contains a reserved separator byte")
            }
            Self::InvalidEntityRef(entity) => {
                format!("Invalid entity reference {entity:?}: contains a reserved separator byte")
            }
            Self::Storage(msg) => format!("Storage error: {msg}"),
            Self::Serialization(msg) => format!("Serialization error: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }
}

impl fmt::Display for RecoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for RecoError {}

impl From<anyhow::Error> for RecoError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<rocksdb::Error> for RecoError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<bincode::Error> for RecoError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Type alias for Results using RecoError
pub type Result<T> = std::result::Result<T, RecoError>;
