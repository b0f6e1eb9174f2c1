use axum::extract::Multipart;
use axum::http::StatusCode;
use std::time::Instant;
use tracing::{info, warn};

use crate::ocr::{ImageInput, OcrError, OcrOutcome, Pipeline, ScratchFile};

use super::models::{OcrResponse, UploadForm, UploadedImage};
use super::state::ServerState;
use super::util::{parse_flag, resolve_upload_dir, upload_suffix};

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<OcrError> for ServerError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::Input(message) => ServerError::bad_request(message),
            OcrError::Processing(message) => ServerError::internal(message),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::internal(format!("{:#}", err))
    }
}

pub(crate) async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, ServerError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::bad_request(format!("invalid multipart body: {}", err)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    ServerError::bad_request(format!("failed to read image: {}", err))
                })?;
                form.image = Some(UploadedImage {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            "confidence_threshold" => {
                let value = field.text().await.map_err(|err| {
                    ServerError::bad_request(format!("failed to read field: {}", err))
                })?;
                form.confidence_threshold = Some(value);
            }
            "save_debug_images" => {
                let value = field.text().await.map_err(|err| {
                    ServerError::bad_request(format!("failed to read field: {}", err))
                })?;
                form.save_debug_images = parse_flag(&value);
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Validates an upload, stores it under the upload directory and runs the
/// pipeline on it. Blocking; call from `spawn_blocking`.
pub(crate) fn ocr_request(
    state: &ServerState,
    form: UploadForm,
    allow_debug_images: bool,
) -> Result<OcrResponse, ServerError> {
    let Some(image) = form.image else {
        return Err(ServerError::bad_request("No image provided"));
    };
    if image.file_name.trim().is_empty() || image.bytes.is_empty() {
        return Err(ServerError::bad_request("No image selected"));
    }
    let threshold = parse_threshold(form.confidence_threshold.as_deref())?;
    let keep_upload = allow_debug_images && form.save_debug_images;

    let settings = &state.settings;
    let upload_dir = resolve_upload_dir(settings);
    let upload = ScratchFile::from_bytes(
        &image.bytes,
        "ocr-upload-",
        &upload_suffix(&image.file_name),
        Some(&upload_dir),
    )?;
    info!(
        "ocr request: {} ({} bytes)",
        image.file_name,
        image.bytes.len()
    );

    let pipeline = Pipeline::new(state.source.as_ref())
        .with_options(settings.pipeline.clone())
        .with_enhance(settings.enhance.clone())
        .with_params(settings.detect_params.clone())
        .with_scratch_dir(&upload_dir);

    let start = Instant::now();
    let result = pipeline.run(&ImageInput::Path(upload.path().to_path_buf()), threshold);
    let elapsed = start.elapsed();

    let debug_image = if keep_upload {
        match upload.keep() {
            Ok(path) => Some(path.to_string_lossy().to_string()),
            Err(err) => {
                warn!("failed to keep debug image: {:#}", err);
                None
            }
        }
    } else {
        drop(upload);
        None
    };

    let report = result?;
    Ok(OcrResponse {
        outcome: OcrOutcome::Success(report).with_processing_time(elapsed),
        debug_image,
    })
}

fn parse_threshold(raw: Option<&str>) -> Result<Option<f32>, ServerError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(ServerError::bad_request(format!(
            "invalid confidence_threshold: {}",
            trimmed
        ))),
    }
}
