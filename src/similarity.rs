//! Name similarity scoring.
//!
//! Scores are normalized Levenshtein similarity over the trimmed, lowercased
//! inputs: `1 - distance / max(len_a, len_b)` counted in characters, with two
//! empty strings scoring 1.0.

/// Returns a similarity score in `[0.0, 1.0]`; 1.0 means equal after trim and lowercase.
///
/// # Examples
///
/// ```
/// use lorekeeper::similarity::similarity;
///
/// assert_eq!(similarity("Elena", "elena "), 1.0);
/// assert!(similarity("Katherine", "Kathryn") > 0.6);
/// assert!(similarity("Elena", "Dorian") < 0.5);
/// ```
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a == b {
        return 1.0;
    }
    strsim::normalized_levenshtein(&a, &b).clamp(0.0, 1.0)
}

/// Exact-match key: trimmed and lowercased.
#[must_use]
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
