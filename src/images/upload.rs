//! Upload validation and raw upload persistence

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AdvisorError, Result};

/// Image formats handled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
    /// Only ever produced by the model, never accepted as an upload
    Webp,
}

impl ImageKind {
    pub fn from_mime(mime: &str) -> Option<ImageKind> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            "image/webp" => Some(ImageKind::Webp),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<ImageKind> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "webp" => Some(ImageKind::Webp),
            _ => None,
        }
    }

    /// Detect from a file name's extension
    pub fn from_path(path: &Path) -> Option<ImageKind> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(ImageKind::from_extension)
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Webp => "webp",
        }
    }

    fn is_uploadable(&self) -> bool {
        matches!(self, ImageKind::Jpeg | ImageKind::Png)
    }
}

/// Validate an upload before any network call
///
/// The MIME type decides when it names a supported format; a missing or
/// generic MIME type falls back to the file extension.
pub fn validate_upload(
    len: usize,
    content_type: Option<&str>,
    filename: Option<&str>,
    max_bytes: usize,
) -> Result<ImageKind> {
    if len == 0 {
        return Err(AdvisorError::Validation("uploaded file is empty".to_string()));
    }
    if len > max_bytes {
        return Err(AdvisorError::Validation(format!(
            "file size exceeds {}MB limit",
            max_bytes / (1024 * 1024)
        )));
    }

    let generic = |mime: &str| {
        let mime = mime.trim();
        mime.is_empty() || mime.eq_ignore_ascii_case("application/octet-stream")
    };

    let kind = match content_type {
        Some(mime) if !generic(mime) => ImageKind::from_mime(mime),
        _ => filename.and_then(|name| ImageKind::from_path(Path::new(name))),
    };

    match kind {
        Some(kind) if kind.is_uploadable() => Ok(kind),
        _ => Err(AdvisorError::Validation(
            "only JPG, JPEG, and PNG files are allowed".to_string(),
        )),
    }
}

/// Raw upload directory
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist an upload under a unique `upload-{millis}-{random}` name
    pub async fn save(&self, data: &[u8], kind: ImageKind) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;

        let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
        let name = format!(
            "upload-{}-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            suffix,
            kind.extension()
        );
        let path = self.root.join(name);
        tokio::fs::write(&path, data).await?;

        debug!("Stored upload at {:?} ({} bytes)", path, data.len());
        Ok(path)
    }

    /// Best-effort removal after a failed request
    pub async fn discard(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed upload {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Error cleaning up upload {:?}: {}", path, e),
        }
    }
}
