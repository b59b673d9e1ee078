//! Cache maintainer: the single source of truth for `tags_cache` consistency
//!
//! Three exact transitions keep a votable's cache in step with the vote
//! ledger, where `voter_vector` is the voter's current `tags_cache` at the
//! moment of the transition:
//!
//! - [`increment`]: a vote of weight `w` is newly cast
//! - [`decrement`]: a vote of weight `w` is retracted; exactly cancels the
//!   matching increment
//! - [`invert`]: an existing vote flips to `new_weight`; collapses
//!   retract-then-recast into one pass
//!
//! [`recalculate`] is the repair path: rebuild the cache from `static_tags`
//! plus every incoming vote. Starting from an empty profile, the incremental
//! transitions over a vote history always agree with a recalculation over the
//! same history.
//!
//! Tag edits never touch votes; vote transitions never touch `static_tags`.

use std::collections::HashMap;

use crate::errors::Result;
use crate::recommend::storage::ProfileStorage;
use crate::recommend::types::TagProfile;

/// Apply a newly cast vote of weight `weight`
pub fn increment(profile: &mut TagProfile, voter_vector: &HashMap<String, f64>, weight: i8) {
    for (tag, v) in voter_vector {
        profile.cache_change(tag, weight as f64 * v);
    }
}

/// Undo a retracted vote of weight `weight`
pub fn decrement(profile: &mut TagProfile, voter_vector: &HashMap<String, f64>, weight: i8) {
    for (tag, v) in voter_vector {
        profile.cache_change(tag, -(weight as f64) * v);
    }
}

/// Apply a vote flip to `new_weight` in one pass
///
/// Equivalent to decrement(old) then increment(new) given new = −old:
/// the per-tag delta is `2 * new_weight * v`.
pub fn invert(profile: &mut TagProfile, voter_vector: &HashMap<String, f64>, new_weight: i8) {
    for (tag, v) in voter_vector {
        profile.cache_change(tag, 2.0 * new_weight as f64 * v);
    }
}

/// Rebuild `tags_cache` from scratch: static tags merged by addition with the
/// vote-derived dynamic weights
///
/// Used for repair and verification; idempotent against a quiesced ledger.
/// Does not persist — the caller saves under its own profile lock.
pub fn recalculate(storage: &ProfileStorage, profile: &mut TagProfile) -> Result<()> {
    let mut dynamic: HashMap<String, f64> = HashMap::new();
    for vote in storage.votes_for(&profile.owner)? {
        if let Some(voter_profile) = storage.get_profile(&vote.voter)? {
            for (tag, v) in &voter_profile.tags_cache {
                *dynamic.entry(tag.clone()).or_insert(0.0) += vote.weight as f64 * v;
            }
        }
    }

    let mut cache = profile.static_tags.clone();
    for (tag, weight) in dynamic {
        *cache.entry(tag).or_insert(0.0) += weight;
    }
    profile.tags_cache = cache;
    profile.remove_zero_tags();
    Ok(())
}
