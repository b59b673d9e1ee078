//! Similarity scoring over sparse tag vectors, plus ranking helpers
//!
//! The similarity score between a subject and a candidate is the dot product
//! of their `tags_cache` vectors over shared tags; disjoint tag sets score 0.
//! For larger candidate sets the tag index supplies, per subject tag, every
//! entity holding that tag — so scoring visits only candidates with at least
//! one shared tag instead of the full cross product.

use ordered_float::OrderedFloat;
use std::collections::{BTreeSet, HashMap};

use crate::errors::Result;
use crate::recommend::storage::ProfileStorage;
use crate::recommend::types::{EntityRef, ScoredEntity};

/// Dot product over the tags present in both vectors
pub fn score(subject: &HashMap<String, f64>, candidate: &HashMap<String, f64>) -> f64 {
    // iterate the sparser side
    let (small, large) = if subject.len() <= candidate.len() {
        (subject, candidate)
    } else {
        (candidate, subject)
    };
    small
        .iter()
        .filter_map(|(tag, w)| large.get(tag).map(|other| w * other))
        .sum()
}

/// Accumulate `Σ candidate_weight · subject_weight` per entity via the tag
/// index, restricted to the given entity types
///
/// Entities absent from the result share no tag with the subject and score 0.
pub fn overlap_scores(
    storage: &ProfileStorage,
    subject_vector: &HashMap<String, f64>,
    entity_types: &BTreeSet<String>,
) -> Result<HashMap<EntityRef, f64>> {
    let mut scores: HashMap<EntityRef, f64> = HashMap::new();
    for entity_type in entity_types {
        for (tag, subject_weight) in subject_vector {
            for (entity, candidate_weight) in storage.entities_with_tag(entity_type, tag)? {
                *scores.entry(entity).or_insert(0.0) += candidate_weight * subject_weight;
            }
        }
    }
    Ok(scores)
}

/// Order candidates descending by score, ties broken ascending by entity
/// identity, and attach scores when requested
pub fn rank(
    mut scored: Vec<(EntityRef, f64)>,
    order: bool,
    include_score: bool,
) -> Vec<ScoredEntity> {
    if order {
        scored.sort_by(|a, b| {
            OrderedFloat(b.1)
                .cmp(&OrderedFloat(a.1))
                .then_with(|| a.0.cmp(&b.0))
        });
    }
    scored
        .into_iter()
        .map(|(entity, s)| ScoredEntity {
            entity,
            score: include_score.then_some(s),
        })
        .collect()
}
