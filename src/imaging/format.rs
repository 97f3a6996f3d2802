//! The format whitelist.
//!
//! Formats are identified by sniffing file content, never from the
//! client-supplied filename, so a PNG renamed to `.jpg` is stored and served
//! as PNG, and anything outside the whitelist is rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An accepted image format. Variants are always encoded in the original's format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported image format: {0}")]
pub struct UnsupportedFormat(pub String);

impl ImageFormat {
    pub const ALL: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Gif];

    /// Canonical extension used when storing files.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
        }
    }

    /// Case-insensitive extension lookup; accepts `jpg` as well as `jpeg`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    pub(crate) fn codec(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Gif => image::ImageFormat::Gif,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Accept a sniffed format only if it is on the whitelist.
pub fn validate_format(detected: image::ImageFormat) -> Result<ImageFormat, UnsupportedFormat> {
    match detected {
        image::ImageFormat::Jpeg => Ok(ImageFormat::Jpeg),
        image::ImageFormat::Png => Ok(ImageFormat::Png),
        image::ImageFormat::Gif => Ok(ImageFormat::Gif),
        other => Err(UnsupportedFormat(format!("{other:?}").to_lowercase())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_accepts_jpeg_png_gif() {
        assert_eq!(validate_format(image::ImageFormat::Jpeg), Ok(ImageFormat::Jpeg));
        assert_eq!(validate_format(image::ImageFormat::Png), Ok(ImageFormat::Png));
        assert_eq!(validate_format(image::ImageFormat::Gif), Ok(ImageFormat::Gif));
    }

    #[test]
    fn whitelist_rejects_everything_else() {
        for other in [
            image::ImageFormat::WebP,
            image::ImageFormat::Bmp,
            image::ImageFormat::Tiff,
            image::ImageFormat::Avif,
        ] {
            let err = validate_format(other).unwrap_err();
            assert!(err.to_string().starts_with("unsupported image format"));
        }
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(ImageFormat::from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("gif"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_extension("webp"), None);
    }

    #[test]
    fn canonical_extension_and_content_type() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpeg");
        assert_eq!(ImageFormat::Png.content_type(), "image/png");
        assert_eq!(ImageFormat::Gif.to_string(), "gif");
    }
}
