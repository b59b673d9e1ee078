//! Cache Consistency Tests
//!
//! Encodes the correctness law of the cache maintainer: for any profile
//! reachable by a finite sequence of tag edits and vote casts/retractions
//! starting from empty, a full recalculation produces the same `tags_cache`
//! as the incremental transition path.
//!
//! Run with: cargo test --test consistency_tests

use std::collections::HashMap;
use tempfile::TempDir;

use recommendable::{EntityRef, RecommenderConfig, RecommenderSystem, TagEntry};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn setup() -> (RecommenderSystem, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = RecommenderConfig {
        storage_path: temp_dir.path().to_path_buf(),
        sync_writes: false,
    };
    let system = RecommenderSystem::new(config).expect("Failed to create recommender system");
    (system, temp_dir)
}

fn user(id: &str) -> EntityRef {
    EntityRef::new("User", id)
}

fn article(id: &str) -> EntityRef {
    EntityRef::new("Article", id)
}

fn as_map(entries: Vec<TagEntry>) -> HashMap<String, f64> {
    entries.into_iter().map(|t| (t.name, t.weight)).collect()
}

fn assert_maps_agree(incremental: &HashMap<String, f64>, recalculated: &HashMap<String, f64>) {
    assert_eq!(
        incremental.len(),
        recalculated.len(),
        "key sets diverged: {incremental:?} vs {recalculated:?}"
    );
    for (tag, weight) in incremental {
        let other = recalculated
            .get(tag)
            .unwrap_or_else(|| panic!("tag {tag} missing after recalculation"));
        assert!(
            (weight - other).abs() < 1e-9,
            "weight diverged for {tag}: {weight} vs {other}"
        );
    }
}

// ============================================================================
// RECALCULATE AGREEMENT
// ============================================================================

#[test]
fn test_recalculate_agrees_after_mixed_history() {
    let (system, _dir) = setup();
    let b = article("b");

    // voters get their vectors before casting; the incremental path snapshots
    // the voter vector at cast time, so a quiesced history must agree
    system
        .tag_with_weights(&user("1"), &[("rust", 2.0), ("db", 1.0)])
        .expect("tag");
    system
        .tag_with_weights(&user("2"), &[("rust", 1.0), ("web", 4.0)])
        .expect("tag");
    system.tag_with_weights(&user("3"), &[("golf", 3.0)]).expect("tag");

    system.tag_with_weights(&b, &[("news", 2.0)]).expect("tag votable");
    system.vote_up(&user("1"), &b).expect("vote");
    system.vote_down(&user("2"), &b).expect("vote");
    system.vote_up(&user("3"), &b).expect("vote");
    system.vote_up(&user("2"), &b).expect("flip");
    system.retract(&user("3"), &b).expect("retract");
    system.set_tag_weight(&b, "news", 5.0).expect("edit");
    system.remove_tag(&b, "news").expect("remove");

    let incremental = as_map(system.tags(&b).expect("tags"));
    let recalculated = as_map(system.recalculate(&b).expect("recalculate"));
    assert_maps_agree(&incremental, &recalculated);

    // spot-check the expected combined vector:
    // user1 up {rust:2, db:1} + user2 up {rust:1, web:4}
    assert_eq!(incremental.get("rust"), Some(&3.0));
    assert_eq!(incremental.get("db"), Some(&1.0));
    assert_eq!(incremental.get("web"), Some(&4.0));
    assert!(!incremental.contains_key("golf"));
    assert!(!incremental.contains_key("news"));
}

#[test]
fn test_recalculate_agrees_across_vote_chain() {
    let (system, _dir) = setup();
    let a = user("a");
    let b = article("b");
    let c = article("c");

    system.tag_with_weights(&a, &[("rust", 2.0)]).expect("tag");
    system.vote_up(&a, &b).expect("a votes b");
    // b's vector now includes a's contribution; b votes onward with it
    system.vote_up(&b, &c).expect("b votes c");

    let incremental = as_map(system.tags(&c).expect("tags"));
    let recalculated = as_map(system.recalculate(&c).expect("recalculate"));
    assert_maps_agree(&incremental, &recalculated);
    assert_eq!(recalculated.get("rust"), Some(&2.0));
}

#[test]
fn test_recalculate_is_idempotent() {
    let (system, _dir) = setup();
    let b = article("b");
    system.tag_with_weights(&user("1"), &[("rust", 2.0)]).expect("tag");
    system.tag_with_weights(&b, &[("news", 1.0)]).expect("tag");
    system.vote_up(&user("1"), &b).expect("vote");

    let first = as_map(system.recalculate(&b).expect("first"));
    let second = as_map(system.recalculate(&b).expect("second"));
    assert_maps_agree(&first, &second);
}

#[test]
fn test_recalculate_repairs_empty_profile() {
    let (system, _dir) = setup();
    let b = article("b");
    system.tag_with_weights(&user("1"), &[("rust", 2.0)]).expect("tag");
    system.vote_up(&user("1"), &b).expect("vote");

    // recalculation from the ledger alone reproduces the incremental cache
    let recalculated = as_map(system.recalculate(&b).expect("recalculate"));
    assert_eq!(recalculated.get("rust"), Some(&2.0));
    assert_eq!(recalculated.len(), 1);
}

#[test]
fn test_full_cancellation_leaves_no_residue() {
    let (system, _dir) = setup();
    let b = article("b");
    system
        .tag_with_weights(&user("1"), &[("rust", 0.1), ("db", 2.7)])
        .expect("tag");

    system.vote_up(&user("1"), &b).expect("up");
    system.vote_down(&user("1"), &b).expect("flip");
    system.vote_up(&user("1"), &b).expect("flip back");
    system.retract(&user("1"), &b).expect("retract");

    // every transition cancelled; near-zero float residue must be pruned
    assert!(system.profile(&b).expect("profile").tags_cache.is_empty());
    assert!(system.tags(&b).expect("tags").is_empty());
}

#[test]
fn test_dynamic_view_tracks_votes_only() {
    let (system, _dir) = setup();
    let b = article("b");
    system.tag_with_weights(&user("1"), &[("rust", 2.0)]).expect("tag");
    system
        .tag_with_weights(&b, &[("rust", 1.0), ("news", 1.0)])
        .expect("tag");
    system.vote_up(&user("1"), &b).expect("vote");

    let dynamic = system.dynamic_tags(&b).expect("dynamic");
    assert_eq!(dynamic.get("rust"), Some(&2.0));
    assert!(!dynamic.contains_key("news"));

    let static_tags = system.static_tags(&b).expect("static");
    assert_eq!(static_tags.get("rust"), Some(&1.0));
}
