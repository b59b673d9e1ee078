//! Documented constants for the recommendation core
//!
//! This module contains all tunable parameters with justification for their
//! values. Centralizing constants prevents magic numbers and makes tuning
//! easier.

// =============================================================================
// TAG CACHE MAINTENANCE
// =============================================================================

/// Threshold below which a tag weight counts as zero and is pruned
///
/// The reference behavior prunes only exact zeros, which works for integer
/// weights but lets near-zero float residues accumulate across long vote
/// histories (increment/decrement pairs do not always cancel bit-exactly once
/// other additions reorder the sum). Pruning at 1e-9 matches the integer
/// behavior observed in practice while preventing that drift.
///
/// Justification:
/// - Static tag weights are caller-assigned small integers, far above 1e-9
/// - Dynamic weights are sums of products of such integers; a residue below
///   1e-9 can only be cancellation noise, never signal
pub const PRUNE_EPSILON: f64 = 1e-9;

// =============================================================================
// VOTES
// =============================================================================

/// Weight of an up-vote
pub const VOTE_UP: i8 = 1;

/// Weight of a down-vote
pub const VOTE_DOWN: i8 = -1;

// =============================================================================
// STORAGE KEYS
// =============================================================================

/// Separator joining (entity_type, entity_id) and compound index keys
///
/// ASCII unit separator: cannot appear in well-formed type names or ids, so
/// compound keys never collide with each other under prefix iteration.
pub const KEY_SEP: u8 = 0x1f;
