pub mod engine;

use serde::{Deserialize, Serialize};

pub use engine::{
    CommandDetector, DEFAULT_CONFIDENCE_THRESHOLD, DetectParams, DetectionSource, DetectorConfig,
    EnhanceOptions, ImageInput, LineGrouping, Pipeline, PipelineOptions, ScratchFile, consolidate,
    dedupe, enhance, iou, reconstruct, text_similarity,
};

pub type Point = [f32; 2];

/// Four corner points as emitted by the detector. Index 0 and index 2 are
/// treated as opposite corners.
pub type Quad = [Point; 4];

/// Which image variant a detection came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantTag(String);

impl VariantTag {
    pub const ORIGINAL: &'static str = "original";
    pub const ENHANCED: &'static str = "enhanced";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn original() -> Self {
        Self::new(Self::ORIGINAL)
    }

    pub fn enhanced() -> Self {
        Self::new(Self::ENHANCED)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VariantTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `(box, text, confidence)` triple returned by a detection source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDetection(pub Quad, pub String, pub f32);

/// A recognized text fragment tagged with the variant that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub text: String,
    pub confidence: f32,
    pub bbox: Quad,
    pub source: VariantTag,
}

impl Detection {
    pub fn new(text: impl Into<String>, confidence: f32, bbox: Quad, source: VariantTag) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            text: text.into(),
            confidence,
            bbox,
            source,
        }
    }

    pub(crate) fn from_raw(raw: RawDetection, source: &VariantTag) -> Self {
        let RawDetection(bbox, text, confidence) = raw;
        Self::new(text, confidence, bbox, source.clone())
    }
}

/// Serialized form of a detection in the final reading order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedResult {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Quad,
    pub method: VariantTag,
}

impl From<Detection> for DetailedResult {
    fn from(detection: Detection) -> Self {
        Self {
            text: detection.text,
            confidence: detection.confidence,
            bounding_box: detection.bbox,
            method: detection.source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrReport {
    pub full_text: String,
    pub detailed_results: Vec<DetailedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("{0}")]
    Input(String),
    #[error("{0}")]
    Processing(String),
}

impl OcrError {
    pub fn input(message: impl Into<String>) -> Self {
        OcrError::Input(message.into())
    }

    pub fn is_input(&self) -> bool {
        matches!(self, OcrError::Input(_))
    }
}

impl From<anyhow::Error> for OcrError {
    fn from(err: anyhow::Error) -> Self {
        OcrError::Processing(format!("{:#}", err))
    }
}

/// Structured outcome handed to callers; failures never escape as panics or
/// unhandled errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OcrOutcome {
    Success(OcrReport),
    Error { message: String },
}

impl OcrOutcome {
    pub fn with_processing_time(mut self, elapsed: std::time::Duration) -> Self {
        if let OcrOutcome::Success(report) = &mut self {
            report.processing_time = Some(round_seconds(elapsed));
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OcrOutcome::Success(_))
    }
}

impl From<Result<OcrReport, OcrError>> for OcrOutcome {
    fn from(result: Result<OcrReport, OcrError>) -> Self {
        match result {
            Ok(report) => OcrOutcome::Success(report),
            Err(err) => OcrOutcome::Error {
                message: err.to_string(),
            },
        }
    }
}

pub(crate) fn round_seconds(elapsed: std::time::Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn detection_clamps_confidence() {
        let quad = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert_eq!(Detection::new("a", 1.4, quad, VariantTag::original()).confidence, 1.0);
        assert_eq!(Detection::new("a", -0.2, quad, VariantTag::original()).confidence, 0.0);
    }

    #[test]
    fn raw_detection_parses_engine_triples() {
        let raw: Vec<RawDetection> =
            serde_json::from_str(r#"[[[[10,10],[100,10],[100,30],[10,30]],"INVOICE",0.95]]"#)
                .expect("parse");
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].1, "INVOICE");
        assert_eq!(raw[0].0[2], [100.0, 30.0]);
    }

    #[test]
    fn outcome_serializes_status_tag() {
        let outcome = OcrOutcome::from(Err::<OcrReport, _>(OcrError::Processing(
            "boom".to_string(),
        )));
        let value = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "boom");

        let outcome = OcrOutcome::Success(OcrReport {
            full_text: String::new(),
            detailed_results: Vec::new(),
            processing_time: None,
        })
        .with_processing_time(Duration::from_millis(1234));
        let value = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(value["status"], "success");
        assert_eq!(value["processing_time"], 1.23);
        assert_eq!(value["detailed_results"], serde_json::json!([]));
    }
}
