//! Recommendable Library
//!
//! Tag-profile recommendation core for heterogeneous domain entities.
//!
//! # Key Features
//! - Sparse weighted tag profile per entity (explicit + vote-derived tags)
//! - Incrementally maintained tags cache with exact-cancellation vote transitions
//! - Similarity ranking over sparse tag vectors ("recommend")
//! - Raw vote-weight ranking ("popularity")
//! - RocksDB embedded storage (no external database)
//!
//! The hosting application, HTTP layer, authentication and UI are external
//! collaborators; any domain type participates by exposing a stable
//! (type, id) identity via the [`Recommendable`](recommend::Recommendable) trait.

pub mod constants;
pub mod errors;
pub mod recommend;
pub mod tags;

// Re-export dependencies to ensure tests/benchmarks use the same version
pub use chrono;
pub use parking_lot;

pub use errors::{RecoError, Result};
pub use recommend::{
    EntityRef, PopularityOptions, RecommendOptions, Recommendable, RecommenderConfig,
    RecommenderSystem, ScoredEntity, TagEntry, TagProfile, Vote,
};
