use std::collections::HashSet;

use crate::ocr::Detection;

/// Case-insensitive similarity of two recognized strings.
///
/// Containment scores a flat 0.8; otherwise the score is the Jaccard ratio of
/// the two distinct-character sets.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.8;
    }

    let set_a = a.chars().collect::<HashSet<_>>();
    let set_b = b.chars().collect::<HashSet<_>>();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f32 / union as f32
}

/// Joins ordered detections into one string with single-space separation.
pub fn consolidate(detections: &[Detection]) -> String {
    detections
        .iter()
        .flat_map(|detection| detection.text.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}
