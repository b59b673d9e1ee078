//! Tag Profile Store Tests
//!
//! Covers lazy profile creation, static tag assignment, cache mirroring,
//! zero-weight pruning, canonicalization and the tag queries.
//!
//! Run with: cargo test --test tag_profile_tests

use tempfile::TempDir;

use recommendable::{EntityRef, RecommenderConfig, RecommenderSystem};

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

fn article(id: &str) -> EntityRef {
    EntityRef::new("Article", id)
}

// ============================================================================
// PROFILE LIFECYCLE
// ============================================================================

#[test]
fn test_profile_auto_created_on_first_access() {
    let (system, _dir) = setup();
    let profile = system.profile(&article("1")).expect("profile");
    assert!(profile.static_tags.is_empty());
    assert!(profile.tags_cache.is_empty());
}

#[test]
fn test_missing_profile_is_never_an_error() {
    let (system, _dir) = setup();
    assert!(system.tags(&article("missing")).expect("tags").is_empty());
    assert!(system
        .static_tags(&article("missing"))
        .expect("static")
        .is_empty());
    assert!(system
        .dynamic_tags(&article("missing"))
        .expect("dynamic")
        .is_empty());
}

// ============================================================================
// STATIC TAGS AND CACHE MIRRORING
// ============================================================================

#[test]
fn test_tag_with_defaults_to_weight_one() {
    let (system, _dir) = setup();
    let e = article("1");
    system.tag_with(&e, &["rust", "databases"]).expect("tag");

    let profile = system.profile(&e).expect("profile");
    assert_eq!(profile.static_tags.get("rust"), Some(&1.0));
    assert_eq!(profile.tags_cache.get("databases"), Some(&1.0));
}

#[test]
fn test_tag_with_keeps_existing_explicit_weight() {
    let (system, _dir) = setup();
    let e = article("1");
    system.tag_with_weights(&e, &[("rust", 5.0)]).expect("tag");
    system.tag_with(&e, &["rust"]).expect("retag");

    let profile = system.profile(&e).expect("profile");
    assert_eq!(profile.static_tags.get("rust"), Some(&5.0));
    assert_eq!(profile.tags_cache.get("rust"), Some(&5.0));
}

#[test]
fn test_reassignment_applies_exact_delta() {
    let (system, _dir) = setup();
    let e = article("1");
    system.set_tag_weight(&e, "rust", 5.0).expect("set");
    system.set_tag_weight(&e, "rust", 2.0).expect("reset");

    let profile = system.profile(&e).expect("profile");
    assert_eq!(profile.static_tags.get("rust"), Some(&2.0));
    assert_eq!(profile.tags_cache.get("rust"), Some(&2.0));
}

#[test]
fn test_prune_law() {
    let (system, _dir) = setup();
    let e = article("1");
    system.set_tag_weight(&e, "x", 5.0).expect("set");
    system.set_tag_weight(&e, "x", 0.0).expect("zero");

    let profile = system.profile(&e).expect("profile");
    assert!(!profile.static_tags.contains_key("x"));
    assert!(!profile.tags_cache.contains_key("x"));
}

#[test]
fn test_remove_tag_is_zero_assignment() {
    let (system, _dir) = setup();
    let e = article("1");
    system.tag_with(&e, &["rust"]).expect("tag");
    system.remove_tag(&e, "rust").expect("remove");

    assert!(system.tags(&e).expect("tags").is_empty());
}

#[test]
fn test_canonicalization_merges_equivalent_labels() {
    let (system, _dir) = setup();
    let e = article("1");
    system.set_tag_weight(&e, "  Rust ", 2.0).expect("set");
    system.set_tag_weight(&e, "rust", 3.0).expect("overwrite");

    let profile = system.profile(&e).expect("profile");
    assert_eq!(profile.static_tags.len(), 1);
    assert_eq!(profile.static_tags.get("rust"), Some(&3.0));
}

#[test]
fn test_empty_tag_rejected_before_mutation() {
    let (system, _dir) = setup();
    let e = article("1");
    let err = system.tag_with(&e, &["rust", "   "]).unwrap_err();
    assert_eq!(err.code(), "EMPTY_TAG");

    // the batch is all-or-nothing
    assert!(system.tags(&e).expect("tags").is_empty());
}

#[test]
fn test_tag_with_separator_byte_rejected() {
    let (system, _dir) = setup();
    let e = article("1");
    let err = system.set_tag_weight(&e, "a\x1fb", 1.0).unwrap_err();
    assert_eq!(err.code(), "INVALID_TAG");

    assert!(system.tags(&e).expect("tags").is_empty());
    assert!(system.all_tags("Article").expect("all_tags").is_empty());
}

#[test]
fn test_entity_ref_with_separator_byte_rejected() {
    let (system, _dir) = setup();
    // would alias the ("Article", "b") key prefix in every compound key
    let malformed = EntityRef::new("Article", "b\x1fX");

    let err = system.tag_with(&malformed, &["rust"]).unwrap_err();
    assert_eq!(err.code(), "INVALID_ENTITY_REF");
    assert!(system.profile(&malformed).is_err());
    assert!(system.all_tags("Article").expect("all_tags").is_empty());
}

#[test]
fn test_noop_edit_does_not_rewrite_profile() {
    let (system, _dir) = setup();
    let e = article("1");
    system.tag_with(&e, &["rust"]).expect("tag");
    let before = system.profile(&e).expect("profile");

    // every tag already has an explicit weight, so nothing changes
    system.tag_with(&e, &["rust"]).expect("retag");

    let after = system.profile(&e).expect("profile");
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(after.static_tags, before.static_tags);
}

#[test]
fn test_tags_sorted_by_name() {
    let (system, _dir) = setup();
    let e = article("1");
    system.tag_with(&e, &["zebra", "alpha", "mango"]).expect("tag");

    let names: Vec<String> = system
        .tags(&e)
        .expect("tags")
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["alpha", "mango", "zebra"]);
}

// ============================================================================
// TAG QUERIES
// ============================================================================

#[test]
fn test_all_tags_distinct_per_type() {
    let (system, _dir) = setup();
    system.tag_with(&article("1"), &["rust", "db"]).expect("tag");
    system.tag_with(&article("2"), &["rust", "web"]).expect("tag");
    system
        .tag_with(&EntityRef::new("User", "1"), &["golf"])
        .expect("tag");

    let tags = system.all_tags("Article").expect("all_tags");
    assert_eq!(
        tags.into_iter().collect::<Vec<_>>(),
        vec!["db", "rust", "web"]
    );
    assert!(system.all_tags("User").expect("all_tags").contains("golf"));
}

#[test]
fn test_tagged_with_requires_all_tags() {
    let (system, _dir) = setup();
    system.tag_with(&article("1"), &["rust", "db"]).expect("tag");
    system.tag_with(&article("2"), &["rust"]).expect("tag");
    system.tag_with(&article("3"), &["db"]).expect("tag");

    let matched = system.tagged_with("Article", &["rust", "db"]).expect("query");
    assert_eq!(matched, vec![article("1")]);
}

#[test]
fn test_tagged_with_excludes_pruned_tags() {
    let (system, _dir) = setup();
    let e = article("1");
    system.tag_with(&e, &["rust"]).expect("tag");
    system.remove_tag(&e, "rust").expect("remove");

    assert!(system.tagged_with("Article", &["rust"]).expect("query").is_empty());
}

#[test]
fn test_tagged_with_empty_input_matches_nothing() {
    let (system, _dir) = setup();
    system.tag_with(&article("1"), &["rust"]).expect("tag");
    assert!(system.tagged_with("Article", &[]).expect("query").is_empty());
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[test]
fn test_profiles_survive_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = RecommenderConfig {
        storage_path: temp_dir.path().to_path_buf(),
        sync_writes: true,
    };

    {
        let system = RecommenderSystem::new(config.clone()).expect("open");
        system
            .tag_with_weights(&article("1"), &[("rust", 4.0)])
            .expect("tag");
    }

    let system = RecommenderSystem::new(config).expect("reopen");
    let profile = system.profile(&article("1")).expect("profile");
    assert_eq!(profile.tags_cache.get("rust"), Some(&4.0));
    assert!(system.all_tags("Article").expect("all_tags").contains("rust"));
}
