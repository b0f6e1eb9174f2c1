use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;
use tracing::debug;

use crate::ocr::RawDetection;

/// Anything that turns an image on disk into raw text detections.
///
/// Implementations are shared across in-flight requests, so `detect` takes
/// `&self` and must be callable concurrently.
pub trait DetectionSource: Send + Sync {
    fn detect(&self, image: &Path, params: &DetectParams) -> Result<Vec<RawDetection>>;
}

/// Decoding parameters forwarded verbatim to the detection engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectParams {
    pub decoder: String,
    pub beam_width: u32,
    pub width_ths: f32,
    pub min_size: u32,
    pub link_threshold: f32,
    pub add_margin: f32,
    pub rotation_info: Vec<u32>,
    pub contrast_ths: f32,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            decoder: "beamsearch".to_string(),
            beam_width: 10,
            width_ths: 0.7,
            min_size: 10,
            link_threshold: 0.5,
            add_margin: 0.1,
            rotation_info: vec![90, 180, 270],
            contrast_ths: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub languages: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["scripts/easyocr_detect.py".to_string()],
            languages: vec!["en".to_string()],
        }
    }
}

/// Detection engine living in a long-running external process.
///
/// [`CommandDetector::initialize`] starts `<program> <args..> --languages
/// <a+b>` once. Each [`detect`](DetectionSource::detect) call writes one JSON
/// line `{"image": .., "params": ..}` to the worker's stdin and reads one
/// line back: either a JSON array of `[box, text, confidence]` triples or
/// `{"error": ".."}`. Calls are serialized on the worker.
#[derive(Debug)]
pub struct CommandDetector {
    program: String,
    worker: Mutex<Worker>,
}

#[derive(Debug)]
struct Worker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

#[derive(Serialize)]
struct WorkerRequest<'a> {
    image: &'a Path,
    params: &'a DetectParams,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkerReply {
    Detections(Vec<RawDetection>),
    Failure { error: String },
}

impl CommandDetector {
    pub fn initialize(config: DetectorConfig) -> Result<Self> {
        let program = config.program.trim().to_string();
        if program.is_empty() {
            return Err(anyhow!("detector program is empty"));
        }
        let languages = normalize_languages(&config.languages)?;
        let mut child = Command::new(&program)
            .args(&config.args)
            .arg("--languages")
            .arg(&languages)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to run detector '{}' (is it installed?)", program))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(anyhow!("detector '{}' has no stdio pipes", program));
        };
        debug!(
            "detector started: {} (pid={}, languages={})",
            program,
            child.id(),
            languages
        );
        Ok(Self {
            program,
            worker: Mutex::new(Worker {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            }),
        })
    }
}

impl DetectionSource for CommandDetector {
    fn detect(&self, image: &Path, params: &DetectParams) -> Result<Vec<RawDetection>> {
        let mut line = serde_json::to_string(&WorkerRequest { image, params })
            .with_context(|| "failed to encode detector request")?;
        line.push('\n');

        let mut guard = self
            .worker
            .lock()
            .map_err(|_| anyhow!("detector worker lock poisoned"))?;
        let worker = &mut *guard;
        let sent = worker
            .stdin
            .write_all(line.as_bytes())
            .and_then(|_| worker.stdin.flush());
        if sent.is_err() {
            return Err(worker.exited(&self.program));
        }

        let mut reply = String::new();
        let read = worker
            .stdout
            .read_line(&mut reply)
            .with_context(|| "failed to read detector reply")?;
        if read == 0 {
            return Err(worker.exited(&self.program));
        }
        parse_reply(&reply)
    }
}

impl Worker {
    fn exited(&mut self, program: &str) -> anyhow::Error {
        match self.child.try_wait() {
            Ok(Some(status)) => anyhow!("detector failed: '{}' exited ({})", program, status),
            _ => anyhow!("detector failed: '{}' closed its pipes", program),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

pub(super) fn parse_reply(line: &str) -> Result<Vec<RawDetection>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let reply: WorkerReply =
        serde_json::from_str(trimmed).with_context(|| "failed to parse detector output")?;
    match reply {
        WorkerReply::Detections(detections) => Ok(detections),
        WorkerReply::Failure { error } => Err(anyhow!("detector failed: {}", error)),
    }
}

fn normalize_languages(requested: &[String]) -> Result<String> {
    let mut chosen: Vec<String> = Vec::new();
    for raw in requested.iter().flat_map(|value| value.split(['+', ',', ' '])) {
        let lang = raw.trim();
        if lang.is_empty() || chosen.iter().any(|value| value == lang) {
            continue;
        }
        chosen.push(lang.to_string());
    }
    if chosen.is_empty() {
        return Err(anyhow!("detector languages is empty"));
    }
    Ok(chosen.join("+"))
}
