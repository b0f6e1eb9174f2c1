use tracing::debug;

use crate::ocr::Detection;

use super::geom::iou;
use super::text::text_similarity;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
pub const DEFAULT_TEXT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Drops detections below the confidence threshold or with blank text.
pub(super) fn filter_detections(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|detection| detection.confidence >= threshold)
        .filter(|detection| !detection.text.trim().is_empty())
        .collect()
}

/// Greedy cross-pass duplicate suppression.
///
/// Detections are visited by descending confidence (stable for ties) and one
/// is dropped when some already kept detection overlaps it by more than
/// `iou_threshold` and reads more similar than `text_threshold`.
pub fn dedupe(
    detections: Vec<Detection>,
    iou_threshold: f32,
    text_threshold: f32,
) -> Vec<Detection> {
    let mut sorted = detections;
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let total = sorted.len();
    let mut kept: Vec<Detection> = Vec::with_capacity(total);

    'outer: for detection in sorted {
        for existing in &kept {
            if iou(&detection.bbox, &existing.bbox) > iou_threshold
                && text_similarity(&detection.text, &existing.text) > text_threshold
            {
                continue 'outer;
            }
        }
        kept.push(detection);
    }

    debug!("dedupe: kept {} of {} detections", kept.len(), total);
    kept
}
