mod denoise;
mod detector;
mod geom;
mod layout;
mod merge;
mod preprocess;
mod scratch;
mod text;

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::ocr::{Detection, OcrError, OcrOutcome, OcrReport, VariantTag};

pub use detector::{CommandDetector, DetectParams, DetectionSource, DetectorConfig};
pub use geom::iou;
pub use layout::{DEFAULT_LINE_THRESHOLD, LineGrouping, reconstruct};
pub use merge::{DEFAULT_IOU_THRESHOLD, DEFAULT_TEXT_SIMILARITY_THRESHOLD, dedupe};
pub use preprocess::{EnhanceOptions, enhance};
pub use scratch::ScratchFile;
pub use text::{consolidate, text_similarity};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.2;

/// The image a request asks to read.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub text_similarity_threshold: f32,
    pub line_threshold: f32,
    pub line_grouping: LineGrouping,
    pub parallel_passes: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            text_similarity_threshold: DEFAULT_TEXT_SIMILARITY_THRESHOLD,
            line_threshold: DEFAULT_LINE_THRESHOLD,
            line_grouping: LineGrouping::default(),
            parallel_passes: false,
        }
    }
}

/// Multi-pass read of one image: the original and an enhanced variant go
/// through the detection source, and the combined detections are
/// de-duplicated, put into reading order and joined into text.
pub struct Pipeline<'a> {
    source: &'a dyn DetectionSource,
    options: PipelineOptions,
    enhance: EnhanceOptions,
    params: DetectParams,
    scratch_dir: Option<PathBuf>,
}

impl<'a> Pipeline<'a> {
    pub fn new(source: &'a dyn DetectionSource) -> Self {
        Self {
            source,
            options: PipelineOptions::default(),
            enhance: EnhanceOptions::default(),
            params: DetectParams::default(),
            scratch_dir: None,
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_enhance(mut self, enhance: EnhanceOptions) -> Self {
        self.enhance = enhance;
        self
    }

    pub fn with_params(mut self, params: DetectParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Runs the pipeline and folds any failure into an error outcome.
    pub fn extract_text(
        &self,
        input: &ImageInput,
        confidence_threshold: Option<f32>,
    ) -> OcrOutcome {
        OcrOutcome::from(self.run(input, confidence_threshold))
    }

    pub fn run(
        &self,
        input: &ImageInput,
        confidence_threshold: Option<f32>,
    ) -> Result<OcrReport, OcrError> {
        let threshold = confidence_threshold.unwrap_or(self.options.confidence_threshold);
        if !threshold.is_finite() {
            return Err(OcrError::input("confidence_threshold must be a number"));
        }

        let upload = match input {
            ImageInput::Path(_) => None,
            ImageInput::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(OcrError::input("No image selected"));
                }
                let suffix = infer::get(bytes)
                    .map(|kind| format!(".{}", kind.extension()))
                    .unwrap_or_default();
                Some(ScratchFile::from_bytes(
                    bytes,
                    "ocr-input-",
                    &suffix,
                    self.scratch_dir.as_deref(),
                )?)
            }
        };
        let original_path = match (input, &upload) {
            (ImageInput::Path(path), _) => path.as_path(),
            (_, Some(scratch)) => scratch.path(),
            (ImageInput::Bytes(_), None) => {
                return Err(OcrError::Processing("image input was not stored".to_string()));
            }
        };

        let image = load_image(original_path)?;
        let enhanced = enhance(&image, &self.enhance);
        let enhanced_file =
            ScratchFile::from_image(&enhanced, "ocr-enhanced-", self.scratch_dir.as_deref())?;

        let variants = vec![
            (VariantTag::original(), original_path),
            (VariantTag::enhanced(), enhanced_file.path()),
        ];
        let detections = self.detect_variants(&variants)?;
        Ok(self.consolidate_detections(detections, threshold))
    }

    /// Filter, de-duplicate, order and join already detected fragments.
    pub fn consolidate_detections(
        &self,
        detections: Vec<Detection>,
        threshold: f32,
    ) -> OcrReport {
        let total = detections.len();
        let filtered = merge::filter_detections(detections, threshold);
        debug!(
            "confidence filter: kept {} of {} (threshold={})",
            filtered.len(),
            total,
            threshold
        );
        let unique = dedupe(
            filtered,
            self.options.iou_threshold,
            self.options.text_similarity_threshold,
        );
        let ordered = reconstruct(
            unique,
            self.options.line_threshold,
            self.options.line_grouping,
        );
        let full_text = consolidate(&ordered);
        info!(
            "consolidated {} detection(s) into {} chars",
            ordered.len(),
            full_text.chars().count()
        );
        OcrReport {
            full_text,
            detailed_results: ordered.into_iter().map(Into::into).collect(),
            processing_time: None,
        }
    }

    fn detect_variants(&self, variants: &[(VariantTag, &Path)]) -> Result<Vec<Detection>> {
        let passes: Vec<Result<Vec<Detection>>> = if self.options.parallel_passes {
            std::thread::scope(|scope| {
                let handles = variants
                    .iter()
                    .map(|(tag, path)| scope.spawn(move || self.detect_variant(tag, path)))
                    .collect::<Vec<_>>();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|_| Err(anyhow!("detection pass panicked")))
                    })
                    .collect()
            })
        } else {
            variants
                .iter()
                .map(|(tag, path)| self.detect_variant(tag, path))
                .collect()
        };

        let mut detections = Vec::new();
        for pass in passes {
            detections.extend(pass?);
        }
        Ok(detections)
    }

    fn detect_variant(&self, tag: &VariantTag, path: &Path) -> Result<Vec<Detection>> {
        let raw = self
            .source
            .detect(path, &self.params)
            .with_context(|| format!("detection failed on {} image", tag))?;
        info!("pass {}: {} raw detection(s)", tag, raw.len());
        Ok(raw
            .into_iter()
            .map(|raw| Detection::from_raw(raw, tag))
            .collect())
    }
}

fn load_image(path: &Path) -> Result<image::DynamicImage> {
    image::ImageReader::open(path)
        .with_context(|| format!("failed to open image: {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read image: {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode image: {}", path.display()))
}
