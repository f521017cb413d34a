//! Bag-of-words similarity between normalized texts.

use std::collections::HashSet;

/// Jaccard overlap of the lowercased whitespace-separated word sets.
///
/// Order and frequency are ignored. Two empty texts are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 1.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    intersection as f64 / union as f64
}
