//! Upload validation
//!
//! Runs before the orchestrator sees the image. The declared content type
//! is not trusted; the format is taken from the file signature.

use crate::verification::ImagePayload;
use thiserror::Error;

/// Default upper bound on an accepted image
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("No image uploaded")]
    Missing,

    #[error("Uploaded image is empty")]
    Empty,

    #[error("Image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Unsupported image type (expected png, jpeg or gif)")]
    UnsupportedType,
}

/// Image formats accepted for verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    /// Identify the format from its leading bytes
    pub fn detect(data: &[u8]) -> Option<Self> {
        if infer::image::is_png(data) {
            Some(ImageFormat::Png)
        } else if infer::image::is_jpeg(data) {
            Some(ImageFormat::Jpeg)
        } else if infer::image::is_gif(data) {
            Some(ImageFormat::Gif)
        } else {
            None
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
        }
    }
}

/// Check an uploaded image and wrap it for the fan-out
pub fn validate_image(
    data: Vec<u8>,
    filename: Option<String>,
    max_bytes: usize,
) -> Result<ImagePayload, ValidationError> {
    if data.is_empty() {
        return Err(ValidationError::Empty);
    }
    if data.len() > max_bytes {
        return Err(ValidationError::TooLarge {
            size: data.len(),
            limit: max_bytes,
        });
    }

    let format = ImageFormat::detect(&data).ok_or(ValidationError::UnsupportedType)?;
    let payload = ImagePayload::new(data, format.mime_type());

    Ok(match filename.filter(|name| !name.trim().is_empty()) {
        Some(name) => payload.with_filename(name),
        None => payload,
    })
}
