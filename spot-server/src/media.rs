//! Media store for issue and resolution photos
//!
//! Uploads are decoded, re-encoded as JPEG (dropping EXIF and any embedded
//! GPS data) and written under the upload directory with a random name.
//! Callers only ever see the opaque reference `uploads/<uuid>.jpg`.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

use shared::error::{AppError, ErrorCode};

/// Supported upload extensions
const SUPPORTED_FORMATS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// JPEG quality for stored photos
const JPEG_QUALITY: u8 = 85;

/// Public prefix of every media reference
const REFERENCE_PREFIX: &str = "uploads";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("File too large. Maximum size is {max} bytes")]
    TooLarge { max: usize },

    #[error("Unsupported file format '{0}'. Supported: png, jpg, jpeg, webp")]
    Unsupported(String),

    #[error("Empty file provided")]
    Empty,

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        let code = match &err {
            MediaError::TooLarge { .. } => ErrorCode::FileTooLarge,
            MediaError::Unsupported(_) | MediaError::InvalidImage(_) => {
                ErrorCode::UnsupportedFileFormat
            }
            MediaError::Empty => ErrorCode::EmptyFile,
            MediaError::Io(e) => {
                tracing::error!(error = %e, "Media write failed");
                ErrorCode::FileStorageFailed
            }
        };
        AppError::with_message(code, err.to_string())
    }
}

/// One uploaded file as received from a multipart field
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    max_bytes: usize,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate, normalise and persist an image; returns its reference
    ///
    /// CPU-bound; call from `spawn_blocking` in async code.
    pub fn store(&self, upload: &Upload) -> Result<String, MediaError> {
        if upload.data.is_empty() {
            return Err(MediaError::Empty);
        }
        if upload.data.len() > self.max_bytes {
            return Err(MediaError::TooLarge {
                max: self.max_bytes,
            });
        }
        if let Some(ext) = upload
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
        {
            let ext = ext.to_ascii_lowercase();
            if !SUPPORTED_FORMATS.contains(&ext.as_str()) {
                return Err(MediaError::Unsupported(ext));
            }
        }

        let img = image::load_from_memory(&upload.data)
            .map_err(|e| MediaError::InvalidImage(e.to_string()))?;
        let mut buffer = Vec::new();
        {
            let mut cursor = Cursor::new(&mut buffer);
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
            img.to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| MediaError::InvalidImage(e.to_string()))?;
        }

        std::fs::create_dir_all(&self.root)?;
        let file_name = format!("{}.jpg", uuid::Uuid::new_v4());
        std::fs::write(self.root.join(&file_name), &buffer)?;
        tracing::debug!(file = %file_name, bytes = buffer.len(), "Image stored");

        Ok(format!("{REFERENCE_PREFIX}/{file_name}"))
    }

    /// Best-effort removal of a stored image (e.g. after a rejected change)
    pub fn remove(&self, reference: &str) {
        let Some(name) = reference.strip_prefix(&format!("{REFERENCE_PREFIX}/")) else {
            return;
        };
        // References are generated names; refuse anything path-like
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return;
        }
        if let Err(e) = std::fs::remove_file(self.root.join(name)) {
            tracing::warn!(reference = %reference, error = %e, "Failed to remove orphaned image");
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 40, 40]));
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    buffer
}
