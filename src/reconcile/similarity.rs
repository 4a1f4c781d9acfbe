use std::collections::HashSet;

/// Minimum similarity for a proposed item to reuse an existing task
pub const MATCH_THRESHOLD: f64 = 0.7;

/// Lower-cased, whitespace-split token set of a title
pub fn tokenize(title: &str) -> HashSet<String> {
    title
        .split_whitespace()
        .map(|token| token.to_lowercase())
        .collect()
}

/// Jaccard similarity of two titles' token sets: |A ∩ B| / |A ∪ B|
///
/// Two empty titles share nothing and score 0.0.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let left = tokenize(a);
    let right = tokenize(b);

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();

    intersection as f64 / union as f64
}

pub fn is_match(similarity: f64) -> bool {
    similarity >= MATCH_THRESHOLD
}
