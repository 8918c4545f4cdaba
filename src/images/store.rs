//! Result image storage
//!
//! Generated images are plain files under the results root, named after the
//! session stamp:
//! - `improved-{stamp}.{ext}` for the session's final image
//! - `improved-{stamp}-step-{n}.{ext}` for incremental step `n` (1-based)
//!
//! Writes are append-only and names are unique per session, so concurrent
//! requests never touch each other's files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::upload::ImageKind;
use crate::backend::ImagePayload;
use crate::error::Result;

/// URL prefix under which result files are served
pub const RESULTS_URL_PREFIX: &str = "/results/";

/// Monotonic millisecond timestamp identifying one session
///
/// Never repeats within a process, even for sessions started in the same
/// millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionStamp(i64);

impl SessionStamp {
    pub fn now() -> Self {
        static LAST: AtomicI64 = AtomicI64::new(0);

        let now = chrono::Utc::now().timestamp_millis();
        let mut last = LAST.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Self(next),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SessionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a stored result image
///
/// Holds only the file name; serializes as its `/results/...` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    file: String,
}

impl ImageRef {
    /// Build from a file name, URL or path; only the base name is kept
    pub fn from_url(s: &str) -> Self {
        Self {
            file: base_name(s).to_string(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file
    }

    /// Fetchable URL relative to the server root
    pub fn url(&self) -> String {
        format!("{}{}", RESULTS_URL_PREFIX, self.file)
    }

    /// Location on disk under `root`
    pub fn path_in(&self, root: &Path) -> PathBuf {
        root.join(&self.file)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.url())
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ImageRef::from_url(&s))
    }
}

fn base_name(s: &str) -> &str {
    let without_query = s.split(['?', '#']).next().unwrap_or("");
    without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_query)
}

/// Normalize any returned image path to a `/results/{file}` URL
///
/// Accepts bare file names, absolute disk paths and URLs that already carry
/// the prefix; query strings (cache busters) are dropped.
pub fn normalize_result_url(s: &str) -> String {
    ImageRef::from_url(s).url()
}

/// File name for a session image
pub fn result_file_name(stamp: SessionStamp, step: Option<usize>, kind: ImageKind) -> String {
    match step {
        Some(n) => format!("improved-{}-step-{}.{}", stamp, n, kind.extension()),
        None => format!("improved-{}.{}", stamp, kind.extension()),
    }
}

/// Result image directory
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a generated image; `step` is the 1-based step number, `None` for the final image
    pub async fn save(
        &self,
        image: &ImagePayload,
        stamp: SessionStamp,
        step: Option<usize>,
    ) -> Result<ImageRef> {
        tokio::fs::create_dir_all(&self.root).await?;

        let kind = ImageKind::from_mime(&image.mime_type).unwrap_or(ImageKind::Png);
        let image_ref = ImageRef {
            file: result_file_name(stamp, step, kind),
        };
        let path = image_ref.path_in(&self.root);
        tokio::fs::write(&path, &image.data).await?;

        debug!("Saved result image {:?} ({} bytes)", path, image.data.len());
        Ok(image_ref)
    }

    /// Copy a step image to the session's final image name
    pub async fn copy_as_final(&self, step: &ImageRef, stamp: SessionStamp) -> Result<ImageRef> {
        let kind = ImageKind::from_path(Path::new(step.file_name())).unwrap_or(ImageKind::Png);
        let final_ref = ImageRef {
            file: result_file_name(stamp, None, kind),
        };
        tokio::fs::copy(step.path_in(&self.root), final_ref.path_in(&self.root)).await?;

        debug!("Copied {} to final image {}", step.file_name(), final_ref.file_name());
        Ok(final_ref)
    }

    /// Read a stored image back
    pub async fn read(&self, image_ref: &ImageRef) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(image_ref.path_in(&self.root)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(data: &[u8]) -> ImagePayload {
        ImagePayload {
            mime_type: "image/png".to_string(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_session_stamp_is_monotonic() {
        let stamps: Vec<SessionStamp> = (0..1000).map(|_| SessionStamp::now()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_file_names() {
        let stamp = SessionStamp::from_millis(1_700_000_000_000);
        assert_eq!(
            result_file_name(stamp, None, ImageKind::Png),
            "improved-1700000000000.png"
        );
        assert_eq!(
            result_file_name(stamp, Some(3), ImageKind::Jpeg),
            "improved-1700000000000-step-3.jpg"
        );
    }

    #[test]
    fn test_normalize_result_url() {
        assert_eq!(
            normalize_result_url("/results/improved-1.png"),
            "/results/improved-1.png"
        );
        assert_eq!(
            normalize_result_url("improved-1.png"),
            "/results/improved-1.png"
        );
        assert_eq!(
            normalize_result_url("/srv/app/public/results/improved-1-step-2.png"),
            "/results/improved-1-step-2.png"
        );
        assert_eq!(
            normalize_result_url("/results/improved-1.png?t=1712345"),
            "/results/improved-1.png"
        );
        assert_eq!(
            normalize_result_url("C:\\data\\results\\improved-9.png"),
            "/results/improved-9.png"
        );
    }

    #[test]
    fn test_image_ref_serializes_as_url() {
        let image_ref = ImageRef::from_url("improved-5-step-1.png");
        let json = serde_json::to_string(&image_ref).unwrap();
        assert_eq!(json, "\"/results/improved-5-step-1.png\"");
        let back: ImageRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, image_ref);
    }

    #[tokio::test]
    async fn test_save_read_and_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("results"));
        let stamp = SessionStamp::from_millis(42);

        let step = store.save(&png(b"step-one"), stamp, Some(1)).await.unwrap();
        assert_eq!(step.file_name(), "improved-42-step-1.png");
        assert_eq!(store.read(&step).await.unwrap(), b"step-one");

        let final_ref = store.copy_as_final(&step, stamp).await.unwrap();
        assert_eq!(final_ref.url(), "/results/improved-42.png");
        assert_eq!(store.read(&final_ref).await.unwrap(), b"step-one");
    }

    #[tokio::test]
    async fn test_save_uses_mime_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let jpeg = ImagePayload {
            mime_type: "image/jpeg".to_string(),
            data: vec![1, 2, 3],
        };
        let image_ref = store
            .save(&jpeg, SessionStamp::from_millis(7), None)
            .await
            .unwrap();
        assert_eq!(image_ref.file_name(), "improved-7.jpg");
    }
}
