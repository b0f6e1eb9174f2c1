use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ocr::{DetectParams, DetectorConfig, EnhanceOptions, LineGrouping, PipelineOptions};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub pipeline: PipelineOptions,
    pub enhance: EnhanceOptions,
    pub detector: DetectorConfig,
    pub detect_params: DetectParams,
    pub server_addr: String,
    pub upload_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline: PipelineOptions::default(),
            enhance: EnhanceOptions::default(),
            detector: DetectorConfig::default(),
            detect_params: DetectParams::default(),
            server_addr: "0.0.0.0:5000".to_string(),
            upload_dir: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    pipeline: Option<PipelineSettings>,
    enhance: Option<EnhanceSettings>,
    detector: Option<DetectorSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSettings {
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    text_similarity_threshold: Option<f32>,
    line_threshold: Option<f32>,
    line_grouping: Option<LineGrouping>,
    parallel_passes: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct EnhanceSettings {
    adaptive_block_size: Option<u32>,
    adaptive_offset: Option<i32>,
    denoise_strength: Option<f32>,
    denoise_template: Option<u32>,
    denoise_search: Option<u32>,
    upscale: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectorSettings {
    program: Option<String>,
    args: Option<Vec<String>>,
    languages: Option<Vec<String>>,
    decoder: Option<String>,
    beam_width: Option<u32>,
    width_ths: Option<f32>,
    min_size: Option<u32>,
    link_threshold: Option<f32>,
    add_margin: Option<f32>,
    rotation_info: Option<Vec<u32>>,
    contrast_ths: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    upload_dir: Option<String>,
}

/// Loads built-in defaults, then `settings.toml` / `settings.local.toml`
/// from the working directory and the home settings directory, then
/// `extra_path`. Later files win key by key.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge(parse_settings(DEFAULT_SETTINGS_TOML, Path::new("<built-in>"))?);
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge(parse_settings(&content, &path)?);
        }
    }

    Ok(settings)
}

fn parse_settings(content: &str, path: &Path) -> Result<SettingsFile> {
    toml::from_str(content).with_context(|| format!("failed to parse settings: {}", path.display()))
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(pipeline) = incoming.pipeline {
            self.merge_pipeline(pipeline);
        }
        if let Some(enhance) = incoming.enhance {
            self.merge_enhance(enhance);
        }
        if let Some(detector) = incoming.detector {
            self.merge_detector(detector);
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = server.addr {
                if !addr.trim().is_empty() {
                    self.server_addr = addr;
                }
            }
            if let Some(dir) = server.upload_dir {
                if !dir.trim().is_empty() {
                    self.upload_dir = Some(dir);
                }
            }
        }
    }

    fn merge_pipeline(&mut self, pipeline: PipelineSettings) {
        let target = &mut self.pipeline;
        if let Some(value) = pipeline.confidence_threshold {
            if (0.0..=1.0).contains(&value) {
                target.confidence_threshold = value;
            }
        }
        if let Some(value) = pipeline.iou_threshold {
            if (0.0..=1.0).contains(&value) {
                target.iou_threshold = value;
            }
        }
        if let Some(value) = pipeline.text_similarity_threshold {
            if (0.0..=1.0).contains(&value) {
                target.text_similarity_threshold = value;
            }
        }
        if let Some(value) = pipeline.line_threshold {
            if value > 0.0 {
                target.line_threshold = value;
            }
        }
        if let Some(grouping) = pipeline.line_grouping {
            target.line_grouping = grouping;
        }
        if let Some(parallel) = pipeline.parallel_passes {
            target.parallel_passes = parallel;
        }
    }

    fn merge_enhance(&mut self, enhance: EnhanceSettings) {
        let target = &mut self.enhance;
        if let Some(value) = enhance.adaptive_block_size {
            if value >= 3 {
                target.adaptive_block_size = value;
            }
        }
        if let Some(value) = enhance.adaptive_offset {
            target.adaptive_offset = value;
        }
        if let Some(value) = enhance.denoise_strength {
            if value >= 0.0 {
                target.denoise_strength = value;
            }
        }
        if let Some(value) = enhance.denoise_template {
            if value > 0 {
                target.denoise_template = value;
            }
        }
        if let Some(value) = enhance.denoise_search {
            if value > 0 {
                target.denoise_search = value;
            }
        }
        if let Some(value) = enhance.upscale {
            if value > 0 {
                target.upscale = value;
            }
        }
    }

    fn merge_detector(&mut self, detector: DetectorSettings) {
        if let Some(program) = detector.program {
            if !program.trim().is_empty() {
                self.detector.program = program;
            }
        }
        if let Some(args) = detector.args {
            self.detector.args = args;
        }
        if let Some(languages) = detector.languages {
            if !languages.is_empty() {
                self.detector.languages = languages;
            }
        }

        let params = &mut self.detect_params;
        if let Some(decoder) = detector.decoder {
            if !decoder.trim().is_empty() {
                params.decoder = decoder;
            }
        }
        if let Some(value) = detector.beam_width {
            if value > 0 {
                params.beam_width = value;
            }
        }
        if let Some(value) = detector.width_ths {
            params.width_ths = value;
        }
        if let Some(value) = detector.min_size {
            params.min_size = value;
        }
        if let Some(value) = detector.link_threshold {
            params.link_threshold = value;
        }
        if let Some(value) = detector.add_margin {
            params.add_margin = value;
        }
        if let Some(value) = detector.rotation_info {
            params.rotation_info = value;
        }
        if let Some(value) = detector.contrast_ths {
            params.contrast_ths = value;
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".ocr-consolidate"))
        }
    })
}
