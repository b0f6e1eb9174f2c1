use anyhow::Result;
use ocr_consolidate::ocr::{
    DetectParams, Detection, DetectionSource, ImageInput, OcrOutcome, OcrReport, Pipeline,
    PipelineOptions, Quad, RawDetection, VariantTag,
};
use ocr_consolidate::settings::Settings;
use std::path::{Path, PathBuf};

const INVOICE_BOX: Quad = [[10.0, 10.0], [100.0, 10.0], [100.0, 30.0], [10.0, 30.0]];
const TOTAL_BOX: Quad = [[10.0, 50.0], [80.0, 50.0], [80.0, 70.0], [10.0, 70.0]];

/// Answers differently for the caller's own image and for anything else,
/// which is the enhanced variant the pipeline writes.
struct ScriptedSource {
    original: PathBuf,
    on_original: Vec<RawDetection>,
    on_enhanced: Vec<RawDetection>,
}

impl DetectionSource for ScriptedSource {
    fn detect(&self, image: &Path, _params: &DetectParams) -> Result<Vec<RawDetection>> {
        if image == self.original {
            Ok(self.on_original.clone())
        } else {
            Ok(self.on_enhanced.clone())
        }
    }
}

fn raw(bbox: Quad, text: &str, confidence: f32) -> RawDetection {
    RawDetection(bbox, text.to_string(), confidence)
}

fn write_scan(dir: &Path) -> PathBuf {
    let path = dir.join("scan.png");
    image::RgbImage::from_pixel(120, 80, image::Rgb([245, 245, 245]))
        .save(&path)
        .expect("save");
    path
}

fn square(x: f32, y: f32) -> Quad {
    [[x, y], [x + 9.0, y], [x + 9.0, y + 9.0], [x, y + 9.0]]
}

fn listing(report: &OcrReport) -> String {
    report
        .detailed_results
        .iter()
        .map(|result| format!("{} {:.2} {}", result.method, result.confidence, result.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn duplicate_across_passes_keeps_the_confident_original() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scan = write_scan(dir.path());
    let source = ScriptedSource {
        original: scan.clone(),
        on_original: vec![raw(INVOICE_BOX, "INVOICE", 0.95), raw(TOTAL_BOX, "TOTAL", 0.9)],
        on_enhanced: vec![raw(INVOICE_BOX, "INVOICE", 0.88)],
    };
    let pipeline = Pipeline::new(&source).with_scratch_dir(dir.path().join("scratch"));

    let report = pipeline
        .run(&ImageInput::Path(scan), None)
        .expect("report");
    insta::assert_snapshot!(report.full_text, @"INVOICE TOTAL");
    insta::assert_snapshot!(listing(&report), @r"
    original 0.95 INVOICE
    original 0.90 TOTAL
    ");
    assert_eq!(report.detailed_results[0].bounding_box, INVOICE_BOX);
}

#[test]
fn nothing_detected_is_an_empty_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scan = write_scan(dir.path());
    let source = ScriptedSource {
        original: scan.clone(),
        on_original: Vec::new(),
        on_enhanced: Vec::new(),
    };
    let outcome = Pipeline::new(&source).extract_text(&ImageInput::Path(scan), None);
    match outcome {
        OcrOutcome::Success(report) => {
            assert_eq!(report.full_text, "");
            assert!(report.detailed_results.is_empty());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn bytes_input_reads_like_a_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scan = write_scan(dir.path());
    let bytes = std::fs::read(&scan).expect("read");
    let source = ScriptedSource {
        original: PathBuf::from("never-matches"),
        on_original: Vec::new(),
        on_enhanced: vec![raw(TOTAL_BOX, "TOTAL", 0.7)],
    };
    let report = Pipeline::new(&source)
        .with_scratch_dir(dir.path().join("scratch"))
        .run(&ImageInput::Bytes(bytes), None)
        .expect("report");
    insta::assert_snapshot!(listing(&report), @"original 0.70 TOTAL");
}

#[test]
fn every_result_meets_the_threshold_and_is_not_blank() {
    let source = ScriptedSource {
        original: PathBuf::new(),
        on_original: Vec::new(),
        on_enhanced: Vec::new(),
    };
    let pipeline = Pipeline::new(&source);
    let detections = vec![
        Detection::new("kept", 0.6, INVOICE_BOX, VariantTag::original()),
        Detection::new("edge", 0.4, TOTAL_BOX, VariantTag::original()),
        Detection::new("low", 0.39, square(0.0, 90.0), VariantTag::enhanced()),
        Detection::new("   ", 0.99, square(50.0, 90.0), VariantTag::enhanced()),
    ];
    for threshold in [0.0_f32, 0.4, 0.5, 1.0] {
        let report = pipeline.consolidate_detections(detections.clone(), threshold);
        for result in &report.detailed_results {
            assert!(result.confidence >= threshold);
            assert!(!result.text.trim().is_empty());
        }
    }
    let report = pipeline.consolidate_detections(detections, 0.4);
    insta::assert_snapshot!(report.full_text, @"kept edge");
}

#[test]
fn anchored_grouping_is_selectable() {
    let source = ScriptedSource {
        original: PathBuf::new(),
        on_original: Vec::new(),
        on_enhanced: Vec::new(),
    };
    let row = |x: f32, y: f32| -> Quad {
        [[x, y], [x + 10.0, y], [x + 10.0, y + 4.0], [x, y + 4.0]]
    };
    let detections = vec![
        Detection::new("x", 0.9, row(0.0, 0.0), VariantTag::original()),
        Detection::new("y", 0.9, row(40.0, 8.0), VariantTag::original()),
        Detection::new("z", 0.9, row(20.0, 16.0), VariantTag::original()),
    ];
    let greedy = Pipeline::new(&source).consolidate_detections(detections.clone(), 0.2);
    assert_eq!(greedy.full_text, "x z y");

    let options = PipelineOptions {
        line_grouping: ocr_consolidate::LineGrouping::Anchored,
        ..PipelineOptions::default()
    };
    let anchored = Pipeline::new(&source)
        .with_options(options)
        .consolidate_detections(detections, 0.2);
    assert_eq!(anchored.full_text, "x y z");
}

#[test]
fn one_shot_run_reports_processing_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scan = write_scan(dir.path());
    let source = ScriptedSource {
        original: scan.clone(),
        on_original: vec![raw(TOTAL_BOX, "TOTAL", 0.9)],
        on_enhanced: Vec::new(),
    };
    let outcome =
        ocr_consolidate::run_with_source(&Settings::default(), &source, &ImageInput::Path(scan));
    let value = serde_json::to_value(&outcome).expect("json");
    assert_eq!(value["status"], "success");
    assert_eq!(value["full_text"], "TOTAL");
    assert!(value["processing_time"].as_f64().is_some());
}

#[test]
fn missing_file_is_an_error_outcome() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = ScriptedSource {
        original: PathBuf::new(),
        on_original: Vec::new(),
        on_enhanced: Vec::new(),
    };
    let outcome = ocr_consolidate::run_with_source(
        &Settings::default(),
        &source,
        &ImageInput::Path(dir.path().join("absent.png")),
    );
    let value = serde_json::to_value(&outcome).expect("json");
    assert_eq!(value["status"], "error");
    assert!(value["message"].as_str().expect("message").contains("absent.png"));
    assert!(value.get("processing_time").is_none());
}
