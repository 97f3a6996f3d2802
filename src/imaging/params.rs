//! Parameter types for image operations.
//!
//! These structs describe *what* to write, not *how*. They are the interface
//! between the [`processor`](crate::processor) (which decides names, widths and
//! formats) and the [`backend`](super::backend) (which does the pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`EncodeParams`]: Write an image as-is: output path, format, quality.
//! - [`ResizeParams`]: Resize to exact dimensions, then encode.

use super::format::ImageFormat;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100). Only JPEG uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Parameters for encoding an image without changing its dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParams {
    pub output: PathBuf,
    pub format: ImageFormat,
    pub quality: Quality,
}

/// Parameters for a resize operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub quality: Quality,
}

impl ResizeParams {
    pub fn encode_params(&self) -> EncodeParams {
        EncodeParams {
            output: self.output.clone(),
            format: self.format,
            quality: self.quality,
        }
    }
}
