//! Type definitions for the recommendation core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::{KEY_SEP, PRUNE_EPSILON};
use crate::errors::{RecoError, Result};

/// Stable (type, id) identity of a participating domain entity
///
/// Opaque to the core beyond identity and equality; the hosting application
/// decides what types and ids mean.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Reject references whose components contain the reserved separator
    ///
    /// Compound storage keys join components with that byte; a reference
    /// carrying it would alias another entity's prefix under the vote and
    /// tag-index scans. Checked at every engine entry point.
    pub fn validate(&self) -> Result<()> {
        if self.entity_type.bytes().any(|b| b == KEY_SEP)
            || self.entity_id.bytes().any(|b| b == KEY_SEP)
        {
            return Err(RecoError::InvalidEntityRef(self.to_string()));
        }
        Ok(())
    }

    /// Compound storage key: `type \x1f id`
    pub fn storage_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.entity_type.len() + self.entity_id.len() + 1);
        key.extend_from_slice(self.entity_type.as_bytes());
        key.push(KEY_SEP);
        key.extend_from_slice(self.entity_id.as_bytes());
        key
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// Capability trait mixed into arbitrary domain types
///
/// Implementing this is the only coupling a domain type needs to participate
/// in tagging, voting and recommendation; there is no shared base type.
pub trait Recommendable {
    fn entity_ref(&self) -> EntityRef;
}

impl Recommendable for EntityRef {
    fn entity_ref(&self) -> EntityRef {
        self.clone()
    }
}

/// Sparse weighted tag profile, one per entity, created lazily on first access
///
/// `tags_cache` is the combined view: explicit static contribution plus the
/// dynamic contribution derived from incoming votes. It is maintained
/// incrementally by the cache transitions and can always be rebuilt from
/// scratch via recalculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagProfile {
    pub owner: EntityRef,

    /// Caller-assigned tag weights, independent of votes
    pub static_tags: HashMap<String, f64>,

    /// static contribution + vote-derived contribution, per canonical tag
    pub tags_cache: HashMap<String, f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TagProfile {
    pub fn new(owner: EntityRef) -> Self {
        let now = Utc::now();
        Self {
            owner,
            static_tags: HashMap::new(),
            tags_cache: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add `change` to the cached weight of `tag`, creating the entry if absent
    pub fn cache_change(&mut self, tag: &str, change: f64) {
        *self.tags_cache.entry(tag.to_string()).or_insert(0.0) += change;
    }

    /// Drop zero-weight entries from both maps
    ///
    /// Invariant: no entry in either map is zero after a save.
    pub fn remove_zero_tags(&mut self) {
        self.static_tags.retain(|_, w| w.abs() >= PRUNE_EPSILON);
        self.tags_cache.retain(|_, w| w.abs() >= PRUNE_EPSILON);
    }

    /// Derived view: the portion of `tags_cache` attributable to votes
    ///
    /// `tags_cache − static_tags` per key, zero results dropped. Never stored.
    pub fn dynamic_tags(&self) -> HashMap<String, f64> {
        let mut result = self.tags_cache.clone();
        for (tag, weight) in &self.static_tags {
            *result.entry(tag.clone()).or_insert(0.0) -= weight;
        }
        result.retain(|_, w| w.abs() >= PRUNE_EPSILON);
        result
    }
}

/// Directed weighted vote: at most one per ordered (voter, votable) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub voter: EntityRef,
    pub votable: EntityRef,

    /// +1 or -1; validated at the ledger boundary
    pub weight: i8,

    pub cast_at: DateTime<Utc>,
}

impl Vote {
    /// Ledger key: `votable_key \x1f voter_key`
    ///
    /// Votable-first so every vote on a votable sits under one prefix, which
    /// recalculation and popularity scans rely on.
    pub fn storage_key(votable: &EntityRef, voter: &EntityRef) -> Vec<u8> {
        let mut key = votable.storage_key();
        key.push(KEY_SEP);
        key.extend_from_slice(&voter.storage_key());
        key
    }
}

/// One `{name, weight}` entry of a profile's combined tag view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub name: String,
    pub weight: f64,
}

/// A candidate with its ranking score attached when requested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub entity: EntityRef,

    /// Present only when the query asked for scores
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Options for similarity-ranked recommendation queries
#[derive(Debug, Clone, Copy)]
pub struct RecommendOptions {
    /// Drop the subject from the candidate set when it is a member
    pub exclude_self: bool,

    /// Attach the numeric score to each result
    pub include_score: bool,

    /// Sort descending by score (ties broken ascending by entity identity)
    pub order: bool,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            exclude_self: true,
            include_score: false,
            order: true,
        }
    }
}

/// Options for popularity-ranked queries
#[derive(Debug, Clone, Copy)]
pub struct PopularityOptions {
    pub include_score: bool,
    pub order: bool,
}

impl Default for PopularityOptions {
    fn default() -> Self {
        Self {
            include_score: false,
            order: true,
        }
    }
}
