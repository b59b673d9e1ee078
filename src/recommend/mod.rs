//! Recommendation core engine
//!
//! Maintains one sparse weighted tag profile per entity, combining explicit
//! ("static") tags with tags inferred from a directed weighted voting
//! relation, and serves two ranked queries over those profiles:
//! - similarity to a subject entity ("recommend")
//! - raw vote weight ("popularity")
//!
//! Writes are serialized per target profile; profiles of different entities
//! never block each other. Reads go straight to storage.

pub mod cache;
pub mod ledger;
pub mod scoring;
pub mod storage;
pub mod types;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::constants::{KEY_SEP, PRUNE_EPSILON, VOTE_DOWN, VOTE_UP};
use crate::errors::{RecoError, Result};
use crate::tags::normalize;

pub use ledger::CastOutcome;
use ledger::VoteLedger;
use storage::ProfileStorage;
pub use types::{
    EntityRef, PopularityOptions, RecommendOptions, Recommendable, ScoredEntity, TagEntry,
    TagProfile, Vote,
};

/// Configuration for the recommendation core
#[derive(Debug, Clone)]
pub struct RecommenderConfig {
    /// Base directory for profile/vote storage
    pub storage_path: PathBuf,

    /// fsync the WAL on every commit (durable but slower)
    pub sync_writes: bool,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./recommendation_store"),
            sync_writes: false,
        }
    }
}

/// Main recommendation engine
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct RecommenderSystem {
    storage: Arc<ProfileStorage>,

    /// Per-profile write locks, keyed by the entity's storage key.
    /// Every mutation is a read-modify-write over the target profile and must
    /// hold its lock; two concurrent casts on one votable must both land.
    entity_locks: DashMap<Vec<u8>, Arc<Mutex<()>>>,
}

impl RecommenderSystem {
    pub fn new(config: RecommenderConfig) -> Result<Self> {
        let storage = Arc::new(ProfileStorage::open(
            &config.storage_path,
            config.sync_writes,
        )?);
        Ok(Self {
            storage,
            entity_locks: DashMap::new(),
        })
    }

    fn entity_lock(&self, entity: &EntityRef) -> Arc<Mutex<()>> {
        self.entity_locks
            .entry(entity.storage_key())
            .or_default()
            .clone()
    }

    fn load_or_new(&self, entity: &EntityRef) -> Result<TagProfile> {
        Ok(self
            .storage
            .get_profile(entity)?
            .unwrap_or_else(|| TagProfile::new(entity.clone())))
    }

    // ========================================================================
    // TAG PROFILE STORE
    // ========================================================================

    /// The entity's profile; a fresh empty one when none is stored yet.
    /// Never fails on absence — profiles are persisted on first mutation.
    pub fn profile(&self, entity: &EntityRef) -> Result<TagProfile> {
        entity.validate()?;
        self.load_or_new(entity)
    }

    /// Run one locked read-modify-write against the entity's profile
    ///
    /// An edit that leaves both maps unchanged is not persisted and does not
    /// bump `updated_at`.
    fn edit_profile<F>(&self, entity: &EntityRef, edit: F) -> Result<TagProfile>
    where
        F: FnOnce(&mut TagProfile) -> Result<()>,
    {
        entity.validate()?;
        let lock = self.entity_lock(entity);
        let _guard = lock.lock();

        let mut profile = self.load_or_new(entity)?;
        let old_static = profile.static_tags.clone();
        let old_cache = profile.tags_cache.clone();
        let old_cache_tags: BTreeSet<String> = profile.tags_cache.keys().cloned().collect();

        edit(&mut profile)?;

        profile.remove_zero_tags();
        if profile.static_tags == old_static && profile.tags_cache == old_cache {
            return Ok(profile);
        }
        profile.updated_at = Utc::now();
        self.storage.save_profile(&profile, &old_cache_tags)?;
        Ok(profile)
    }

    /// Assign an explicit weight to a canonical tag; weight 0 removes it
    pub fn set_tag_weight(&self, entity: &EntityRef, tag: &str, weight: f64) -> Result<()> {
        let tag = canonical_tag(tag)?;
        self.edit_profile(entity, |profile| {
            apply_static_tag(profile, tag, weight);
            Ok(())
        })?;
        Ok(())
    }

    /// Tag with default weight 1; pre-existing explicit weights are kept
    pub fn tag_with(&self, entity: &EntityRef, tag_names: &[&str]) -> Result<()> {
        let mut canonical = Vec::with_capacity(tag_names.len());
        for raw in tag_names {
            canonical.push(canonical_tag(raw)?);
        }
        self.edit_profile(entity, |profile| {
            for tag in canonical {
                if !profile.static_tags.contains_key(&tag) {
                    apply_static_tag(profile, tag, 1.0);
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Tag with explicit per-tag weights
    pub fn tag_with_weights(&self, entity: &EntityRef, weights: &[(&str, f64)]) -> Result<()> {
        let mut canonical = Vec::with_capacity(weights.len());
        for (raw, weight) in weights {
            canonical.push((canonical_tag(raw)?, *weight));
        }
        self.edit_profile(entity, |profile| {
            for (tag, weight) in canonical {
                apply_static_tag(profile, tag, weight);
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Remove an explicit tag: equivalent to assigning weight 0
    pub fn remove_tag(&self, entity: &EntityRef, tag: &str) -> Result<()> {
        self.set_tag_weight(entity, tag, 0.0)
    }

    /// The combined tag view `{name, weight}`, sorted by name
    pub fn tags(&self, entity: &EntityRef) -> Result<Vec<TagEntry>> {
        entity.validate()?;
        let profile = self.load_or_new(entity)?;
        Ok(sorted_entries(&profile.tags_cache))
    }

    /// Explicit tag weights only
    pub fn static_tags(&self, entity: &EntityRef) -> Result<HashMap<String, f64>> {
        entity.validate()?;
        Ok(self.load_or_new(entity)?.static_tags)
    }

    /// Vote-derived tag weights only (derived view, never stored)
    pub fn dynamic_tags(&self, entity: &EntityRef) -> Result<HashMap<String, f64>> {
        entity.validate()?;
        Ok(self.load_or_new(entity)?.dynamic_tags())
    }

    /// Distinct canonical tag keys across all profiles of a type
    pub fn all_tags(&self, entity_type: &str) -> Result<BTreeSet<String>> {
        check_entity_type(entity_type)?;
        self.storage.all_tags(entity_type)
    }

    /// Entities of `entity_type` whose cache holds *all* given tags with
    /// nonzero weight; an empty tag list matches nothing
    pub fn tagged_with(&self, entity_type: &str, tag_names: &[&str]) -> Result<Vec<EntityRef>> {
        check_entity_type(entity_type)?;
        let mut tags = Vec::with_capacity(tag_names.len());
        for raw in tag_names {
            tags.push(canonical_tag(raw)?);
        }
        let Some((first, rest)) = tags.split_first() else {
            return Ok(Vec::new());
        };

        let mut matched: BTreeSet<EntityRef> = self
            .storage
            .entities_with_tag(entity_type, first)?
            .into_iter()
            .map(|(entity, _)| entity)
            .collect();
        for tag in rest {
            if matched.is_empty() {
                break;
            }
            let with_tag: BTreeSet<EntityRef> = self
                .storage
                .entities_with_tag(entity_type, tag)?
                .into_iter()
                .map(|(entity, _)| entity)
                .collect();
            matched = matched.intersection(&with_tag).cloned().collect();
        }
        Ok(matched.into_iter().collect())
    }

    // ========================================================================
    // VOTE LEDGER
    // ========================================================================

    /// Cast a vote of weight +1 or −1; repeated identical casts are no-ops,
    /// an opposite cast flips the existing vote in place
    pub fn cast(&self, voter: &EntityRef, votable: &EntityRef, weight: i8) -> Result<CastOutcome> {
        if weight != VOTE_UP && weight != VOTE_DOWN {
            return Err(RecoError::InvalidVoteWeight(weight));
        }
        voter.validate()?;
        votable.validate()?;
        let lock = self.entity_lock(votable);
        let _guard = lock.lock();
        VoteLedger::new(self.storage.as_ref()).cast(voter, votable, weight)
    }

    pub fn vote_up(&self, voter: &EntityRef, votable: &EntityRef) -> Result<CastOutcome> {
        self.cast(voter, votable, VOTE_UP)
    }

    pub fn vote_down(&self, voter: &EntityRef, votable: &EntityRef) -> Result<CastOutcome> {
        self.cast(voter, votable, VOTE_DOWN)
    }

    /// Retract a vote; `Ok(false)` when no vote exists
    pub fn retract(&self, voter: &EntityRef, votable: &EntityRef) -> Result<bool> {
        voter.validate()?;
        votable.validate()?;
        let lock = self.entity_lock(votable);
        let _guard = lock.lock();
        VoteLedger::new(self.storage.as_ref()).retract(voter, votable)
    }

    // ========================================================================
    // CACHE MAINTAINER
    // ========================================================================

    /// Rebuild the entity's `tags_cache` from static tags plus the full vote
    /// ledger; returns the fresh combined view. Repair/verification path.
    pub fn recalculate(&self, entity: &EntityRef) -> Result<Vec<TagEntry>> {
        let profile = self.edit_profile(entity, |profile| {
            cache::recalculate(self.storage.as_ref(), profile)
        })?;
        debug!("recalculated tags for {}", entity);
        Ok(sorted_entries(&profile.tags_cache))
    }

    // ========================================================================
    // RECOMMENDER
    // ========================================================================

    /// Rank the supplied candidates by tag-vector similarity to `subject`
    ///
    /// Scoring walks the tag index so only candidates sharing at least one
    /// tag with the subject cost a lookup; the rest score 0 and still appear.
    pub fn recommend(
        &self,
        candidates: &[EntityRef],
        subject: &EntityRef,
        options: RecommendOptions,
    ) -> Result<Vec<ScoredEntity>> {
        subject.validate()?;
        for candidate in candidates {
            candidate.validate()?;
        }
        let subject_vector = self
            .storage
            .get_profile(subject)?
            .map(|p| p.tags_cache)
            .unwrap_or_default();

        let pool: Vec<&EntityRef> = candidates
            .iter()
            .filter(|c| !options.exclude_self || *c != subject)
            .collect();
        let entity_types: BTreeSet<String> =
            pool.iter().map(|c| c.entity_type.clone()).collect();

        let overlap = scoring::overlap_scores(&self.storage, &subject_vector, &entity_types)?;
        let scored: Vec<(EntityRef, f64)> = pool
            .into_iter()
            .map(|c| (c.clone(), overlap.get(c).copied().unwrap_or(0.0)))
            .collect();

        Ok(scoring::rank(scored, options.order, options.include_score))
    }

    /// Similarity score for one candidate; equals the score `recommend`
    /// would attach given a one-element candidate set
    pub fn recommendation_score_for(
        &self,
        subject: &EntityRef,
        candidate: &EntityRef,
    ) -> Result<f64> {
        subject.validate()?;
        candidate.validate()?;
        let subject_profile = self.load_or_new(subject)?;
        let candidate_profile = self.load_or_new(candidate)?;
        Ok(scoring::score(
            &subject_profile.tags_cache,
            &candidate_profile.tags_cache,
        ))
    }

    // ========================================================================
    // POPULARITY RANKER
    // ========================================================================

    /// Sum of vote weights targeting `entity`; 0 when unvoted
    pub fn popularity(&self, entity: &EntityRef) -> Result<i64> {
        entity.validate()?;
        self.storage.popularity(entity)
    }

    /// Rank the supplied candidates by raw vote weight
    pub fn by_popularity(
        &self,
        candidates: &[EntityRef],
        options: PopularityOptions,
    ) -> Result<Vec<ScoredEntity>> {
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            candidate.validate()?;
            let popularity = self.storage.popularity(candidate)? as f64;
            scored.push((candidate.clone(), popularity));
        }
        Ok(scoring::rank(scored, options.order, options.include_score))
    }
}

/// Canonicalize a raw tag label and reject keys that would corrupt compound
/// index keys under prefix iteration
fn canonical_tag(raw: &str) -> Result<String> {
    let tag = normalize(raw).ok_or(RecoError::EmptyTag)?;
    if tag.bytes().any(|b| b == KEY_SEP) {
        return Err(RecoError::InvalidTag(raw.to_string()));
    }
    Ok(tag)
}

fn check_entity_type(entity_type: &str) -> Result<()> {
    if entity_type.bytes().any(|b| b == KEY_SEP) {
        return Err(RecoError::InvalidEntityRef(entity_type.to_string()));
    }
    Ok(())
}

/// Set one explicit tag weight and mirror the exact delta into the cache
///
/// The cache delta is `weight − old` so repeated assignments are stable and
/// assigning 0 exactly cancels the static contribution.
fn apply_static_tag(profile: &mut TagProfile, tag: String, weight: f64) {
    let old = profile.static_tags.get(&tag).copied().unwrap_or(0.0);
    profile.cache_change(&tag, weight - old);
    if weight.abs() < PRUNE_EPSILON {
        profile.static_tags.remove(&tag);
    } else {
        profile.static_tags.insert(tag, weight);
    }
}

fn sorted_entries(map: &HashMap<String, f64>) -> Vec<TagEntry> {
    let mut entries: Vec<TagEntry> = map
        .iter()
        .map(|(name, weight)| TagEntry {
            name: name.clone(),
            weight: *weight,
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}
