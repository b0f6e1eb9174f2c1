use anyhow::{Context, Result};
use image::GrayImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::warn;

/// Temporary file that is removed when dropped, on success and error paths
/// alike. A failed removal is logged and otherwise ignored.
#[derive(Debug)]
pub struct ScratchFile {
    path: Option<TempPath>,
}

impl ScratchFile {
    pub fn from_bytes(
        bytes: &[u8],
        prefix: &str,
        suffix: &str,
        dir: Option<&Path>,
    ) -> Result<Self> {
        let mut file = builder(prefix, suffix, dir)?;
        file.write_all(bytes)
            .with_context(|| "failed to write temp image")?;
        file.flush().ok();
        Ok(Self {
            path: Some(file.into_temp_path()),
        })
    }

    pub(super) fn from_image(
        image: &GrayImage,
        prefix: &str,
        dir: Option<&Path>,
    ) -> Result<Self> {
        let mut file = builder(prefix, ".png", dir)?;
        image
            .write_to(&mut file, image::ImageFormat::Png)
            .with_context(|| "failed to write enhanced image")?;
        file.flush().ok();
        Ok(Self {
            path: Some(file.into_temp_path()),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    /// Keeps the file on disk and returns its path.
    pub fn keep(mut self) -> Result<PathBuf> {
        match self.path.take() {
            Some(path) => path.keep().with_context(|| "failed to persist temp file"),
            None => Ok(PathBuf::new()),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.to_path_buf();
            if let Err(err) = path.close() {
                warn!("failed to remove temp file {}: {}", shown.display(), err);
            }
        }
    }
}

fn builder(prefix: &str, suffix: &str, dir: Option<&Path>) -> Result<tempfile::NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create tmp dir: {}", dir.display()))?;
            builder
                .tempfile_in(dir)
                .with_context(|| "failed to create temp file")
        }
        None => builder.tempfile().with_context(|| "failed to create temp file"),
    }
}
