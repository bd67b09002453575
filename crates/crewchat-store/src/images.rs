//! Local storage for picked images.
//!
//! Images are re-encoded as JPEG, saved next to a small thumbnail under the
//! `Images/` subdirectory, and referenced from messages by a path relative
//! to the data area (`Images/<uuid>.jpg`).

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::{debug, info};
use uuid::Uuid;

use crewchat_shared::constants::{DEFAULT_JPEG_QUALITY, IMAGES_DIR_NAME, THUMBNAIL_MAX_EDGE};

use crate::error::{Result, StoreError};
use crate::models::Attachment;
use crate::storage::write_atomic;

/// Result of [`ImageStore::save_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    /// Path relative to the data area.
    pub path: String,
    /// Size of the saved JPEG in bytes.
    pub byte_size: u64,
    pub thumbnail_path: Option<String>,
}

impl From<SavedImage> for Attachment {
    fn from(saved: SavedImage) -> Self {
        let attachment = Attachment::new(saved.path, saved.byte_size);
        match saved.thumbnail_path {
            Some(thumb) => attachment.with_thumbnail(thumb),
            None => attachment,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    jpeg_quality: u8,
}

impl ImageStore {
    /// `root` is the data area; images go in its `Images/` subdirectory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR_NAME)
    }

    /// Decode `bytes` (any supported format), save it as JPEG with a
    /// thumbnail, and return the relative paths.
    ///
    /// Nothing is written when the image cannot be decoded or encoded.
    pub async fn save_image(&self, bytes: &[u8]) -> Result<SavedImage> {
        let quality = self.jpeg_quality;
        let owned = bytes.to_vec();
        let (full, thumb) = tokio::task::spawn_blocking(move || encode_pair(&owned, quality))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        let dir = self.images_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let stem = Uuid::new_v4().to_string();
        let file_name = format!("{stem}.jpg");
        let thumb_name = format!("{stem}_thumb.jpg");

        write_atomic(&dir.join(&file_name), &full).await?;
        let thumbnail_path = match write_atomic(&dir.join(&thumb_name), &thumb).await {
            Ok(()) => Some(format!("{IMAGES_DIR_NAME}/{thumb_name}")),
            Err(e) => {
                debug!(error = %e, "thumbnail not saved");
                None
            }
        };

        let saved = SavedImage {
            path: format!("{IMAGES_DIR_NAME}/{file_name}"),
            byte_size: full.len() as u64,
            thumbnail_path,
        };

        info!(path = %saved.path, size = saved.byte_size, "saved image");
        Ok(saved)
    }

    /// Resolve a message's image reference to a local file.
    ///
    /// Absolute paths are used as-is, relative ones are looked up in the
    /// data area. Remote URLs and missing files resolve to `None`.
    pub async fn resolve(&self, path: &str) -> Option<PathBuf> {
        if is_remote_url(path) {
            return None;
        }
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return file_exists(candidate).await.then(|| candidate.to_path_buf());
        }
        let joined = self.root.join(candidate);
        file_exists(&joined).await.then_some(joined)
    }

    /// Delete an image stored in the data area by its relative path.
    pub async fn delete_image(&self, path: &str) -> Result<()> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidId(format!("not a data area path: {path:?}")));
        }

        match tokio::fs::remove_file(self.root.join(relative)).await {
            Ok(()) => {
                info!(path, "deleted image");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

/// True for `http://` and `https://` references.
pub fn is_remote_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

fn encode_pair(bytes: &[u8], quality: u8) -> Result<(Vec<u8>, Vec<u8>)> {
    let img = image::load_from_memory(bytes)?;
    let full = encode_jpeg(&img, quality)?;
    let thumb = encode_jpeg(&img.thumbnail(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE), quality)?;
    Ok((full, thumb))
}

// JPEG has no alpha channel, so flatten to RGB first.
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(buf)
}
