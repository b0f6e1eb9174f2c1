use serde::Serialize;

use crate::ocr::OcrOutcome;

#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub(crate) image: Option<UploadedImage>,
    pub(crate) confidence_threshold: Option<String>,
    pub(crate) save_debug_images: bool,
}

#[derive(Debug)]
pub(crate) struct UploadedImage {
    pub(crate) file_name: String,
    pub(crate) bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OcrResponse {
    #[serde(flatten)]
    pub(crate) outcome: OcrOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) debug_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) status: &'static str,
    pub(crate) message: String,
}

impl ErrorResponse {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}
