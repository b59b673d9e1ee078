//! Vote ledger: at most one directed vote per (voter, votable) pair
//!
//! Every ledger mutation triggers exactly one compensating cache transition
//! on the votable's profile, and both land in a single `WriteBatch` so a
//! crash can never commit one without the other. Callers hold the votable's
//! profile lock for the duration of a cast/retract.

use chrono::Utc;
use rocksdb::WriteBatch;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::errors::{RecoError, Result};
use crate::recommend::cache;
use crate::recommend::storage::ProfileStorage;
use crate::recommend::types::{EntityRef, TagProfile, Vote};

/// What a cast actually did, mainly for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    /// No vote existed; one was created
    Created,
    /// A vote with the opposite weight existed; it was flipped in place
    Flipped,
    /// A vote with the same weight existed; nothing changed
    Unchanged,
}

pub struct VoteLedger<'a> {
    storage: &'a ProfileStorage,
}

impl<'a> VoteLedger<'a> {
    pub fn new(storage: &'a ProfileStorage) -> Self {
        Self { storage }
    }

    /// Cast or re-cast a vote; idempotent for a repeated identical cast
    pub fn cast(&self, voter: &EntityRef, votable: &EntityRef, weight: i8) -> Result<CastOutcome> {
        if weight != 1 && weight != -1 {
            return Err(RecoError::InvalidVoteWeight(weight));
        }

        let voter_vector = self.voter_vector(voter)?;
        let mut profile = self.load_or_new(votable)?;
        let old_cache_tags: BTreeSet<String> = profile.tags_cache.keys().cloned().collect();

        let existing = self.storage.get_vote(votable, voter)?;
        let outcome = match existing {
            None => {
                cache::increment(&mut profile, &voter_vector, weight);
                CastOutcome::Created
            }
            Some(ref vote) if vote.weight == weight => {
                debug!("idempotent cast by {} on {}", voter, votable);
                return Ok(CastOutcome::Unchanged);
            }
            Some(_) => {
                cache::invert(&mut profile, &voter_vector, weight);
                CastOutcome::Flipped
            }
        };

        let vote = Vote {
            voter: voter.clone(),
            votable: votable.clone(),
            weight,
            cast_at: existing.map(|v| v.cast_at).unwrap_or_else(Utc::now),
        };

        profile.remove_zero_tags();
        profile.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.storage.stage_vote(&mut batch, &vote)?;
        self.storage
            .stage_profile(&mut batch, &profile, &old_cache_tags)?;
        self.storage.write(batch)?;

        debug!(
            "vote {:+} by {} on {} ({:?})",
            weight, voter, votable, outcome
        );
        Ok(outcome)
    }

    /// Retract an existing vote; `Ok(false)` when none exists (no-op, no error)
    pub fn retract(&self, voter: &EntityRef, votable: &EntityRef) -> Result<bool> {
        let Some(vote) = self.storage.get_vote(votable, voter)? else {
            return Ok(false);
        };

        let voter_vector = self.voter_vector(voter)?;
        let mut profile = self.load_or_new(votable)?;
        let old_cache_tags: BTreeSet<String> = profile.tags_cache.keys().cloned().collect();

        cache::decrement(&mut profile, &voter_vector, vote.weight);
        profile.remove_zero_tags();
        profile.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.storage.stage_vote_delete(&mut batch, votable, voter)?;
        self.storage
            .stage_profile(&mut batch, &profile, &old_cache_tags)?;
        self.storage.write(batch)?;

        debug!("vote by {} on {} retracted", voter, votable);
        Ok(true)
    }

    /// The voter's current combined tag vector; empty when no profile exists
    fn voter_vector(&self, voter: &EntityRef) -> Result<HashMap<String, f64>> {
        Ok(self
            .storage
            .get_profile(voter)?
            .map(|p| p.tags_cache)
            .unwrap_or_default())
    }

    fn load_or_new(&self, entity: &EntityRef) -> Result<TagProfile> {
        Ok(self
            .storage
            .get_profile(entity)?
            .unwrap_or_else(|| TagProfile::new(entity.clone())))
    }
}
