//! Tag canonicalization
//!
//! Every component goes through [`normalize`] before touching a tag map, so
//! the same logical tag never forks into two keys ("Rust" vs " rust ").

/// Normalize a raw tag label to its canonical key: trim + case-fold.
///
/// Returns `None` when the label is empty after trimming; callers reject
/// those before any mutation.
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}
