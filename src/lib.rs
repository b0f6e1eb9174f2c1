use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

pub mod logging;
pub mod ocr;
pub mod server;
pub mod settings;

pub use ocr::{
    CommandDetector, DetectionSource, ImageInput, LineGrouping, OcrError, OcrOutcome, OcrReport,
    Pipeline,
};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub image: Option<PathBuf>,
    pub settings_path: Option<String>,
    pub confidence_threshold: Option<f32>,
    pub line_grouping: Option<LineGrouping>,
    pub languages: Vec<String>,
    pub parallel_passes: bool,
}

/// Reads one image (from `config.image`, or `stdin` bytes when no path is
/// given) and returns the pipeline outcome. Errors are reserved for setup
/// failures; OCR failures come back as [`OcrOutcome::Error`].
pub fn run(config: Config, stdin: Option<Vec<u8>>) -> Result<OcrOutcome> {
    let settings = load_settings(&config)?;
    let input = match (config.image, stdin) {
        (Some(path), _) => ImageInput::Path(path),
        (None, Some(bytes)) => ImageInput::Bytes(bytes),
        (None, None) => return Err(anyhow!("no image given (use --image or pipe one to stdin)")),
    };
    let detector = CommandDetector::initialize(settings.detector.clone())?;
    Ok(run_with_source(&settings, &detector, &input))
}

/// Loads layered settings and applies the command line overrides on top.
pub fn load_settings(config: &Config) -> Result<settings::Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(threshold) = config.confidence_threshold {
        settings.pipeline.confidence_threshold = threshold;
    }
    if let Some(grouping) = config.line_grouping {
        settings.pipeline.line_grouping = grouping;
    }
    if !config.languages.is_empty() {
        settings.detector.languages = config.languages.clone();
    }
    if config.parallel_passes {
        settings.pipeline.parallel_passes = true;
    }
    debug!(
        "pipeline: threshold={} grouping={} parallel={}",
        settings.pipeline.confidence_threshold,
        settings.pipeline.line_grouping.as_str(),
        settings.pipeline.parallel_passes
    );
    Ok(settings)
}

pub fn run_with_source(
    settings: &settings::Settings,
    source: &dyn DetectionSource,
    input: &ImageInput,
) -> OcrOutcome {
    let pipeline = Pipeline::new(source)
        .with_options(settings.pipeline.clone())
        .with_enhance(settings.enhance.clone())
        .with_params(settings.detect_params.clone());
    let start = Instant::now();
    pipeline
        .extract_text(input, None)
        .with_processing_time(start.elapsed())
}
