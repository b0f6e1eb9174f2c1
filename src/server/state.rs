use std::sync::Arc;

use crate::ocr::DetectionSource;
use crate::settings;

/// Shared by every request; the detection source is built once at startup.
#[derive(Clone)]
pub struct ServerState {
    pub(crate) settings: settings::Settings,
    pub(crate) source: Arc<dyn DetectionSource>,
}

impl ServerState {
    pub fn new(settings: settings::Settings, source: Arc<dyn DetectionSource>) -> Self {
        Self { settings, source }
    }
}
