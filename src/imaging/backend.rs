//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four operations every backend must
//! support: identify, decode, encode, and resize. Everything above this layer
//! (the processor, recovery, ingestion) talks to the trait, so tests can swap
//! in a recording mock or a backend that fails on purpose.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image` crate.

use super::format::{ImageFormat, UnsupportedFormat};
use super::params::{EncodeParams, ResizeParams};
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormat),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Result of an identify operation: sniffed format plus header dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identified {
    pub format: ImageFormat,
    pub dimensions: Dimensions,
}

/// A fully decoded image together with its sniffed format.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub format: ImageFormat,
    pub image: DynamicImage,
}

impl Decoded {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }
}

/// Trait for image processing backends.
///
/// Formats are always determined from file content. A backend must reject
/// anything outside the [`ImageFormat`] whitelist with
/// [`BackendError::UnsupportedFormat`].
pub trait ImageBackend: Send + Sync {
    /// Sniff the format and read dimensions without decoding pixel data.
    fn identify(&self, path: &Path) -> Result<Identified, BackendError>;

    /// Fully decode an image.
    fn decode(&self, path: &Path) -> Result<Decoded, BackendError>;

    /// Write an image unchanged. On failure no partial file is left behind.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<(), BackendError>;

    /// Resample to exact dimensions, then encode.
    fn resize(&self, image: &DynamicImage, params: &ResizeParams) -> Result<(), BackendError>;
}
