use std::path::PathBuf;

use crate::settings;

pub(crate) fn resolve_upload_dir(settings: &settings::Settings) -> PathBuf {
    if let Some(dir) = settings.upload_dir.as_deref() {
        return PathBuf::from(dir);
    }
    std::env::temp_dir().join("ocr-consolidate")
}

/// Extension of the client file name, reduced to ASCII alphanumerics so it
/// can be used as a temp file suffix.
pub(crate) fn upload_suffix(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    let Some((_, ext)) = base.rsplit_once('.') else {
        return String::new();
    };
    let ext = ext
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase();
    if ext.is_empty() {
        String::new()
    } else {
        format!(".{}", ext)
    }
}

pub(crate) fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
